//! Fanout SFU (Selective Forwarding Unit)
//!
//! Every participant may publish media tracks, and every published track is
//! forwarded to every other participant. The work here is session
//! orchestration: keeping what each session receives in line with what is
//! currently published, under constant joins, leaves and failures, using
//! offer/answer renegotiation as the only lever.
//!
//! ## Architecture
//!
//! - **`SfuManager`**: owns the track and session registries and runs reconciliation
//! - **`Session`**: one participant's engine connection plus signaling channel
//! - **`PublishedTrack`**: forwarding side of one publisher's inbound track
//! - **`SignalingChannel`**: serialized writes of the JSON signaling envelope
//! - **`RtcEngine`**: webrtc-rs peer connections behind [`MediaConnection`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fanout_sfu::{accept_session, RtcEngine, Role, SfuConfig, SfuManager, SignalingChannel};
//!
//! let config = SfuConfig::default();
//! let engine = RtcEngine::new(&config)?;
//! let manager = SfuManager::new(config);
//! manager.spawn_keyframe_ticker();
//!
//! // per websocket request, before the upgrade
//! let pending = engine.prepare().await?;
//! // once upgraded
//! let channel = Arc::new(SignalingChannel::new(writer));
//! accept_session(&engine, pending, &manager, Role::Participant, channel, &mut reader).await;
//! ```

mod channel;
mod config;
mod engine;
mod error;
mod manager;
mod relay;
mod rtc;
mod session;
mod signaling;
mod track;
mod types;

pub use channel::{SignalEvent, SignalMessage, SignalReader, SignalWriter, SignalingChannel};
pub use config::{ForwardingPolicy, SfuConfig};
pub use engine::{ConnectionState, LocalTrack, MediaConnection, RtpSink, RtpSource};
pub use error::{Error, Result};
pub use manager::{SfuManager, SfuStats, SyncOutcome};
pub use relay::{forward_packets, run_relay};
pub use rtc::{accept_session, PendingConnection, RemoteTrackSource, RtcConnection, RtcEngine};
pub use session::{Role, Session, SessionStats};
pub use signaling::{handle_message, serve_session};
pub use track::{PublishedTrack, TrackInfo, TrackStats};
pub use types::{SessionId, TrackId, TrackKind};

/// Engine types needed to describe tracks from outside the crate
pub use webrtc::rtp::packet::Packet;
pub use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
pub use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
