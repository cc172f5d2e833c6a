//! Narrow view of the real-time transport engine
//!
//! The orchestration code only talks to the engine through these traits.
//! `crate::rtc` implements them on top of webrtc-rs.

use crate::error::Result;
use crate::track::PublishedTrack;
use crate::types::TrackId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp::packet::Packet;
use webrtc::track::track_local::TrackLocal;

/// Engine-side track a sender is bound to
pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

/// Connection state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// A connection in this state will never carry media again
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => Self::Connecting,
            RTCPeerConnectionState::Connected => Self::Connected,
            RTCPeerConnectionState::Disconnected => Self::Disconnected,
            RTCPeerConnectionState::Failed => Self::Failed,
            RTCPeerConnectionState::Closed => Self::Closed,
            _ => Self::New,
        }
    }
}

/// One session's connection inside the transport engine
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Local tracks bound to this connection's senders
    async fn sending_tracks(&self) -> Vec<LocalTrack>;

    /// Ids of the tracks bound to this connection's receivers
    async fn receiving_track_ids(&self) -> Vec<TrackId>;

    /// Remove the sender bound to `track` from the connection
    async fn remove_sender(&self, track: &LocalTrack) -> Result<()>;

    /// Add `track` as a new outgoing sender
    async fn add_track(&self, track: &PublishedTrack) -> Result<()>;

    /// Create an offer, install it as the local description and return it
    /// serialized as JSON
    async fn create_offer(&self) -> Result<String>;

    /// Ask whatever feeds each bound receiver for a keyframe.
    ///
    /// Individual failures are swallowed; returns how many requests went out.
    async fn request_keyframes(&self) -> usize;

    /// Apply a remote ICE candidate given as its JSON descriptor
    async fn add_ice_candidate(&self, candidate: &str) -> Result<()>;

    /// Apply a remote answer given as its JSON session description
    async fn apply_answer(&self, answer: &str) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Inbound RTP from a publisher
#[async_trait]
pub trait RtpSource: Send {
    /// Read and parse the next packet. Any error means the track is gone.
    async fn read_packet(&mut self) -> Result<Packet>;
}

/// Outbound RTP towards every subscriber of a published track
#[async_trait]
pub trait RtpSink: Send + Sync {
    async fn write_packet(&self, packet: &Packet) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
        assert!(!ConnectionState::New.is_terminal());
    }

    #[test]
    fn test_from_engine_state() {
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Closed),
            ConnectionState::Closed
        );
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Unspecified),
            ConnectionState::New
        );
    }
}
