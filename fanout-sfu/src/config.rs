//! SFU Configuration

use crate::session::Role;
use crate::track::PublishedTrack;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decides which published tracks a session is offered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardingPolicy {
    /// Every track is forwarded to every other session
    #[default]
    Mesh,
    /// Only tracks published by broadcaster sessions are forwarded
    Broadcast,
}

impl ForwardingPolicy {
    /// Whether `track` may be added as a sender on another session
    #[must_use]
    pub fn permits(&self, track: &PublishedTrack) -> bool {
        match self {
            Self::Mesh => true,
            Self::Broadcast => track.publisher_role() == Role::Broadcaster,
        }
    }
}

/// SFU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfuConfig {
    /// Forwarding policy applied when adding senders
    pub policy: ForwardingPolicy,
    /// Consecutive failed passes before the retry is deferred
    pub max_sync_attempts: u32,
    /// Delay before a deferred reconciliation retry
    pub sync_retry_cooldown: Duration,
    /// Period of the keyframe request ticker
    pub keyframe_interval: Duration,
    /// Per-track RTP read buffer size
    pub rtp_buffer_size: usize,
    /// STUN/TURN URLs for the transport engine
    pub ice_servers: Vec<String>,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            policy: ForwardingPolicy::Mesh,
            max_sync_attempts: 25,
            sync_retry_cooldown: Duration::from_secs(3),
            keyframe_interval: Duration::from_secs(3),
            rtp_buffer_size: 1500,
            ice_servers: Vec::new(),
        }
    }
}
