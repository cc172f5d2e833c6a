//! SFU Manager - owns the track and session registries and reconciles them
//!
//! All registry mutation and every reconciliation pass run under one
//! exclusive lock. A pass recomputes, for each session, the senders it
//! should have from the current track registry, fixes them through the
//! engine and pushes a fresh offer. Any failure aborts the pass and the
//! whole pass is retried; after `max_sync_attempts` consecutive failures the
//! lock is released and a single retry is scheduled after a cooldown.

use crate::channel::SignalMessage;
use crate::config::SfuConfig;
use crate::error::Result;
use crate::session::{Session, SessionStats};
use crate::track::{PublishedTrack, TrackInfo, TrackStats};
use crate::types::{SessionId, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one call to [`SfuManager::sync`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A pass completed for every session
    Synced { attempts: u32 },
    /// Every attempt failed; a retry runs after the cooldown
    Deferred,
}

/// Registry state guarded by the manager lock
#[derive(Default)]
struct Registries {
    sessions: Vec<Arc<Session>>,
    tracks: HashMap<TrackId, Arc<PublishedTrack>>,
}

/// Snapshot of manager counters
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SfuStats {
    /// Sessions currently registered
    pub sessions: usize,
    /// Tracks currently published
    pub tracks: usize,
    /// Reconciliation passes attempted since start
    pub sync_passes: u64,
    /// Deferred retries scheduled since start
    pub deferred_retries: u64,
    /// Keyframe requests sent since start
    pub keyframe_requests: u64,
    /// Per-track forwarding counters
    pub track_stats: Vec<TrackStats>,
    /// Registered sessions in join order
    pub session_stats: Vec<SessionStats>,
}

/// SFU Manager - coordination point for every session and published track
pub struct SfuManager {
    config: SfuConfig,
    state: RwLock<Registries>,
    retry_pending: AtomicBool,
    sync_passes: AtomicU64,
    deferred_retries: AtomicU64,
    keyframe_requests: AtomicU64,
}

impl SfuManager {
    /// Create a new SFU manager
    #[must_use]
    pub fn new(config: SfuConfig) -> Arc<Self> {
        info!(
            policy = ?config.policy,
            max_sync_attempts = config.max_sync_attempts,
            retry_cooldown_ms = config.sync_retry_cooldown.as_millis() as u64,
            "SFU manager initialized"
        );

        Arc::new(Self {
            config,
            state: RwLock::new(Registries::default()),
            retry_pending: AtomicBool::new(false),
            sync_passes: AtomicU64::new(0),
            deferred_retries: AtomicU64::new(0),
            keyframe_requests: AtomicU64::new(0),
        })
    }

    /// Add a session to the registry and reconcile so it receives every
    /// track already published.
    pub async fn add_session(self: &Arc<Self>, session: Arc<Session>) -> SyncOutcome {
        {
            let mut state = self.state.write().await;
            info!(
                session_id = %session.id(),
                role = ?session.role(),
                sessions = state.sessions.len() + 1,
                "Session joined"
            );
            state.sessions.push(session);
        }
        self.sync().await
    }

    /// Register a forwarding track for a newly observed inbound track and
    /// reconcile every session.
    pub async fn publish(self: &Arc<Self>, info: TrackInfo) -> Arc<PublishedTrack> {
        let track = Arc::new(PublishedTrack::new(info));
        {
            let mut state = self.state.write().await;
            if let Some(previous) = state.tracks.insert(track.id().clone(), Arc::clone(&track)) {
                warn!(
                    track_id = %track.id(),
                    previous_publisher = %previous.publisher(),
                    publisher = %track.publisher(),
                    "Track id already published, replacing"
                );
            }
            info!(
                track_id = %track.id(),
                publisher = %track.publisher(),
                kind = %track.kind(),
                codec = %track.codec(),
                tracks = state.tracks.len(),
                "Track published"
            );
        }
        self.sync().await;
        track
    }

    /// Remove a track from the registry and reconcile every session.
    /// Unknown ids are ignored.
    pub async fn unpublish(self: &Arc<Self>, track_id: &TrackId) {
        {
            let mut state = self.state.write().await;
            if state.tracks.remove(track_id).is_some() {
                info!(track_id = %track_id, tracks = state.tracks.len(), "Track unpublished");
            } else {
                debug!(track_id = %track_id, "Unpublish of unknown track ignored");
            }
        }
        self.sync().await;
    }

    /// Unpublish `track` only if it is still the registered entry for its id.
    ///
    /// A relay loop ending after its id was re-published must not remove the
    /// newer entry.
    pub async fn retire(self: &Arc<Self>, track: &Arc<PublishedTrack>) {
        {
            let mut state = self.state.write().await;
            let current = state
                .tracks
                .get(track.id())
                .is_some_and(|registered| Arc::ptr_eq(registered, track));
            if current {
                state.tracks.remove(track.id());
                let stats = track.stats();
                info!(
                    track_id = %track.id(),
                    packets = stats.packets_forwarded,
                    bytes = stats.bytes_forwarded,
                    tracks = state.tracks.len(),
                    "Track unpublished"
                );
            } else {
                debug!(track_id = %track.id(), "Track already replaced, leaving registry as is");
            }
        }
        self.sync().await;
    }

    /// Bring every session's senders in line with the track registry.
    ///
    /// Holds the registry lock across up to `max_sync_attempts` passes. If
    /// they all fail the lock is released, one retry is scheduled after the
    /// cooldown, and this returns without waiting for it. A successful pass
    /// is followed by a keyframe dispatch.
    pub async fn sync(self: &Arc<Self>) -> SyncOutcome {
        let outcome = {
            let mut state = self.state.write().await;
            let mut attempts = 0;
            loop {
                if attempts == self.config.max_sync_attempts {
                    break SyncOutcome::Deferred;
                }
                attempts += 1;
                self.sync_passes.fetch_add(1, Ordering::Relaxed);

                match self.attempt_sync(&mut state).await {
                    Ok(()) => break SyncOutcome::Synced { attempts },
                    Err(e) => {
                        debug!(attempt = attempts, error = %e, "Reconciliation pass failed, retrying");
                    }
                }
            }
        };

        match outcome {
            SyncOutcome::Synced { attempts } => {
                debug!(attempts, "Reconciliation complete");
                self.dispatch_keyframes().await;
            }
            SyncOutcome::Deferred => self.schedule_retry(),
        }

        outcome
    }

    /// One pass over every session. Terminal sessions are pruned in place:
    /// the last entry is swapped into the freed slot and that slot is visited
    /// next, so no entry is skipped or handled twice.
    async fn attempt_sync(&self, state: &mut Registries) -> Result<()> {
        let mut i = 0;
        while i < state.sessions.len() {
            let session = Arc::clone(&state.sessions[i]);
            let connection_state = session.connection().state();
            if connection_state.is_terminal() {
                state.sessions.swap_remove(i);
                info!(
                    session_id = %session.id(),
                    state = ?connection_state,
                    sessions = state.sessions.len(),
                    "Session removed"
                );
                continue;
            }

            self.reconcile_session(&session, &state.tracks).await?;
            i += 1;
        }
        Ok(())
    }

    async fn reconcile_session(
        &self,
        session: &Session,
        tracks: &HashMap<TrackId, Arc<PublishedTrack>>,
    ) -> Result<()> {
        let connection = session.connection();
        let mut accounted: HashSet<TrackId> = HashSet::new();

        for local in connection.sending_tracks().await {
            let track_id = TrackId::from(local.id());
            let current = tracks
                .get(&track_id)
                .is_some_and(|track| track.is_bound_to(&local));
            if current {
                accounted.insert(track_id);
            } else {
                debug!(session_id = %session.id(), track_id = %track_id, "Removing sender");
                connection.remove_sender(&local).await?;
            }
        }

        accounted.extend(connection.receiving_track_ids().await);

        for (track_id, track) in tracks {
            if accounted.contains(track_id)
                || track.publisher() == session.id()
                || !self.config.policy.permits(track)
            {
                continue;
            }
            debug!(session_id = %session.id(), track_id = %track_id, "Adding sender");
            connection.add_track(track).await?;
        }

        let offer = connection.create_offer().await?;
        session.channel().send(&SignalMessage::offer(offer)).await?;
        Ok(())
    }

    /// Schedule the cooldown retry unless one is already pending
    fn schedule_retry(self: &Arc<Self>) {
        if self
            .retry_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Deferred reconciliation already pending");
            return;
        }

        self.deferred_retries.fetch_add(1, Ordering::Relaxed);
        let cooldown = self.config.sync_retry_cooldown;
        warn!(
            attempts = self.config.max_sync_attempts,
            cooldown_ms = cooldown.as_millis() as u64,
            "Reconciliation did not converge, deferring retry"
        );

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            manager.retry_pending.store(false, Ordering::Release);
            manager.sync().await;
        });
    }

    /// Whether a deferred retry is waiting for its cooldown
    #[must_use]
    pub fn retry_pending(&self) -> bool {
        self.retry_pending.load(Ordering::Acquire)
    }

    /// Request a keyframe for every bound receiver of every session.
    ///
    /// Best effort; returns how many requests went out.
    pub async fn dispatch_keyframes(&self) -> usize {
        let state = self.state.write().await;
        let mut sent = 0;
        for session in &state.sessions {
            sent += session.connection().request_keyframes().await;
        }
        self.keyframe_requests
            .fetch_add(sent as u64, Ordering::Relaxed);
        sent
    }

    /// Background keyframe ticker. Stops once the manager is dropped.
    pub fn spawn_keyframe_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        let period = self.config.keyframe_interval;
        info!(interval_ms = period.as_millis() as u64, "Starting keyframe ticker");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(strong) = manager.upgrade() else {
                    break;
                };
                let sent = strong.dispatch_keyframes().await;
                if sent > 0 {
                    debug!(sent, "Periodic keyframe requests sent");
                }
            }
        })
    }

    /// Number of registered sessions
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Whether `session_id` is still registered
    pub async fn has_session(&self, session_id: &SessionId) -> bool {
        self.state
            .read()
            .await
            .sessions
            .iter()
            .any(|s| s.id() == session_id)
    }

    /// Ids of every published track, sorted
    pub async fn track_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.state.read().await.tracks.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get manager statistics
    pub async fn stats(&self) -> SfuStats {
        let state = self.state.read().await;
        SfuStats {
            sessions: state.sessions.len(),
            tracks: state.tracks.len(),
            sync_passes: self.sync_passes.load(Ordering::Relaxed),
            deferred_retries: self.deferred_retries.load(Ordering::Relaxed),
            keyframe_requests: self.keyframe_requests.load(Ordering::Relaxed),
            track_stats: state.tracks.values().map(|t| t.stats()).collect(),
            session_stats: state.sessions.iter().map(|s| s.stats()).collect(),
        }
    }

    /// Close every session's connection and signaling channel
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.state.read().await.sessions.clone();
        info!(sessions = sessions.len(), "Shutting down SFU manager");

        for session in sessions {
            if let Err(e) = session.connection().close().await {
                warn!(session_id = %session.id(), error = %e, "Failed to close connection");
            }
            if let Err(e) = session.channel().close().await {
                debug!(session_id = %session.id(), error = %e, "Failed to close signaling channel");
            }
        }
    }
}
