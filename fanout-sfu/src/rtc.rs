//! webrtc-rs backed engine
//!
//! Builds peer connections, adapts them to [`MediaConnection`], and wires the
//! engine callbacks of a new session into the manager.

use crate::channel::{SignalMessage, SignalReader, SignalingChannel};
use crate::config::SfuConfig;
use crate::engine::{ConnectionState, LocalTrack, MediaConnection, RtpSource};
use crate::error::{Error, Result};
use crate::manager::SfuManager;
use crate::relay::run_relay;
use crate::session::{Role, Session};
use crate::signaling::serve_session;
use crate::track::{PublishedTrack, TrackInfo};
use crate::types::{SessionId, TrackId, TrackKind};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_remote::TrackRemote;

/// Factory for peer connections sharing one media engine setup
pub struct RtcEngine {
    api: API,
    ice_servers: Vec<RTCIceServer>,
    rtp_buffer_size: usize,
}

impl RtcEngine {
    pub fn new(config: &SfuConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }]
        };

        info!(ice_servers = config.ice_servers.len(), "WebRTC engine initialized");

        Ok(Self {
            api,
            ice_servers,
            rtp_buffer_size: config.rtp_buffer_size,
        })
    }

    /// Create a connection with one receive-only transceiver per media kind
    async fn new_peer_connection(&self) -> Result<Arc<RTCPeerConnection>> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let pc = Arc::new(self.api.new_peer_connection(config).await?);

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            let init = RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: Vec::new(),
            };
            if let Err(e) = pc.add_transceiver_from_kind(kind, Some(init)).await {
                let _ = pc.close().await;
                return Err(e.into());
            }
        }

        Ok(pc)
    }

    /// Create the engine side of a session ahead of its signaling channel,
    /// so engine failures surface before the transport is upgraded.
    pub async fn prepare(&self) -> Result<PendingConnection> {
        let pc = self.new_peer_connection().await?;
        Ok(PendingConnection { pc })
    }

    /// Build a session around a prepared connection and a freshly upgraded
    /// signaling channel, and install its engine callbacks. The session is
    /// not registered yet.
    pub fn open_session(
        &self,
        pending: PendingConnection,
        manager: &Arc<SfuManager>,
        role: Role,
        channel: Arc<SignalingChannel>,
    ) -> Arc<Session> {
        let PendingConnection { pc } = pending;
        let id = SessionId::generate();

        install_candidate_handler(&pc, &id, Arc::clone(&channel));
        install_state_handler(&pc, &id, manager);
        install_track_handler(&pc, &id, role, manager, self.rtp_buffer_size);

        let connection = Arc::new(RtcConnection { pc });
        Arc::new(Session::new(id, role, connection, channel))
    }
}

/// Peer connection waiting for its signaling channel
pub struct PendingConnection {
    pc: Arc<RTCPeerConnection>,
}

/// Run one session from upgrade to teardown: open it, register it (which
/// reconciles it), then serve its signaling until the channel ends.
pub async fn accept_session<R>(
    engine: &RtcEngine,
    pending: PendingConnection,
    manager: &Arc<SfuManager>,
    role: Role,
    channel: Arc<SignalingChannel>,
    reader: &mut R,
) -> SessionId
where
    R: SignalReader + ?Sized,
{
    let session = engine.open_session(pending, manager, role, channel);
    let id = session.id().clone();

    manager.add_session(Arc::clone(&session)).await;
    serve_session(&session, reader).await;

    id
}

fn install_candidate_handler(pc: &RTCPeerConnection, id: &SessionId, channel: Arc<SignalingChannel>) {
    let id = id.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let channel = Arc::clone(&channel);
        let id = id.clone();
        Box::pin(async move {
            // None marks the end of gathering
            let Some(candidate) = candidate else {
                return;
            };
            if let Err(e) = send_candidate(&channel, &candidate).await {
                warn!(session_id = %id, error = %e, "Failed to send local candidate");
            }
        })
    }));
}

async fn send_candidate(channel: &SignalingChannel, candidate: &RTCIceCandidate) -> Result<()> {
    let init = candidate.to_json()?;
    let data = serde_json::to_string(&init)?;
    channel.send(&SignalMessage::candidate(data)).await
}

fn install_state_handler(pc: &Arc<RTCPeerConnection>, id: &SessionId, manager: &Arc<SfuManager>) {
    let id = id.clone();
    let pc_ref: Weak<RTCPeerConnection> = Arc::downgrade(pc);
    let manager: Weak<SfuManager> = Arc::downgrade(manager);
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let id = id.clone();
        let pc = pc_ref.clone();
        let manager = manager.clone();
        Box::pin(async move {
            debug!(session_id = %id, state = %state, "Connection state changed");
            match state {
                RTCPeerConnectionState::Failed => {
                    let Some(pc) = pc.upgrade() else {
                        return;
                    };
                    info!(session_id = %id, "Connection failed, closing");
                    tokio::spawn(async move {
                        if let Err(e) = pc.close().await {
                            warn!(session_id = %id, error = %e, "Failed to close connection");
                        }
                    });
                }
                RTCPeerConnectionState::Closed => {
                    if let Some(manager) = manager.upgrade() {
                        tokio::spawn(async move {
                            manager.sync().await;
                        });
                    }
                }
                _ => {}
            }
        })
    }));
}

fn install_track_handler(
    pc: &RTCPeerConnection,
    id: &SessionId,
    role: Role,
    manager: &Arc<SfuManager>,
    buffer_size: usize,
) {
    let publisher = id.clone();
    let manager: Weak<SfuManager> = Arc::downgrade(manager);
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
        let publisher = publisher.clone();
        let manager = manager.clone();
        Box::pin(async move {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let info = TrackInfo {
                id: TrackId::from(track.id()),
                stream_id: track.stream_id(),
                kind: TrackKind::from(track.kind()),
                codec: track.codec().capability,
                ssrc: track.ssrc(),
                publisher,
                publisher_role: role,
            };
            debug!(
                track_id = %info.id,
                publisher = %info.publisher,
                kind = %info.kind,
                ssrc = info.ssrc,
                "Inbound track"
            );
            let source = RemoteTrackSource::new(track, buffer_size);
            tokio::spawn(run_relay(manager, info, source));
        })
    }));
}

/// [`MediaConnection`] over a webrtc-rs peer connection
pub struct RtcConnection {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaConnection for RtcConnection {
    fn state(&self) -> ConnectionState {
        self.pc.connection_state().into()
    }

    async fn sending_tracks(&self) -> Vec<LocalTrack> {
        let mut tracks = Vec::new();
        for sender in self.pc.get_senders().await {
            if let Some(track) = sender.track().await {
                tracks.push(track);
            }
        }
        tracks
    }

    async fn receiving_track_ids(&self) -> Vec<TrackId> {
        let mut ids = Vec::new();
        for receiver in self.pc.get_receivers().await {
            for track in receiver.tracks().await {
                let id = track.id();
                if !id.is_empty() {
                    ids.push(TrackId::from(id));
                }
            }
        }
        ids
    }

    async fn remove_sender(&self, track: &LocalTrack) -> Result<()> {
        for sender in self.pc.get_senders().await {
            let bound = sender
                .track()
                .await
                .is_some_and(|local| std::ptr::addr_eq(Arc::as_ptr(&local), Arc::as_ptr(track)));
            if bound {
                self.pc.remove_track(&sender).await?;
                return Ok(());
            }
        }
        Err(Error::SenderNotFound(track.id().to_string()))
    }

    async fn add_track(&self, track: &PublishedTrack) -> Result<()> {
        let local: LocalTrack = track.local_track();
        let sender = self.pc.add_track(local).await?;

        // Drain RTCP so the interceptors keep processing it
        tokio::spawn(async move { while sender.read_rtcp().await.is_ok() {} });
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(serde_json::to_string(&offer)?)
    }

    async fn request_keyframes(&self) -> usize {
        let mut sent = 0;
        for receiver in self.pc.get_receivers().await {
            for track in receiver.tracks().await {
                let media_ssrc = track.ssrc();
                if media_ssrc == 0 {
                    continue;
                }
                let pli = PictureLossIndication {
                    sender_ssrc: 0,
                    media_ssrc,
                };
                if self.pc.write_rtcp(&[Box::new(pli)]).await.is_ok() {
                    sent += 1;
                }
            }
        }
        sent
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::from_str(candidate)?;
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn apply_answer(&self, answer: &str) -> Result<()> {
        let answer: RTCSessionDescription = serde_json::from_str(answer)?;
        self.pc.set_remote_description(answer).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

/// [`RtpSource`] reading from a publisher's remote track
pub struct RemoteTrackSource {
    track: Arc<TrackRemote>,
    buf: Vec<u8>,
}

impl RemoteTrackSource {
    #[must_use]
    pub fn new(track: Arc<TrackRemote>, buffer_size: usize) -> Self {
        Self {
            track,
            buf: vec![0u8; buffer_size],
        }
    }
}

#[async_trait]
impl RtpSource for RemoteTrackSource {
    async fn read_packet(&mut self) -> Result<Packet> {
        let (packet, _attributes) = self.track.read(&mut self.buf).await?;
        Ok(packet)
    }
}
