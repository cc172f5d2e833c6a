//! Published tracks
//!
//! A published track is the forwarding side of one publisher's inbound
//! stream: a local RTP track that every subscribed session sends from.

use crate::engine::{LocalTrack, RtpSink};
use crate::error::Result;
use crate::session::Role;
use crate::types::{SessionId, TrackId, TrackKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;

/// What the engine tells us about an inbound track when it first shows up
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub id: TrackId,
    pub stream_id: String,
    pub kind: TrackKind,
    pub codec: RTCRtpCodecCapability,
    pub ssrc: u32,
    pub publisher: SessionId,
    pub publisher_role: Role,
}

/// Media track available for forwarding
pub struct PublishedTrack {
    info: TrackInfo,
    local: Arc<TrackLocalStaticRTP>,
    packets_forwarded: AtomicU64,
    bytes_forwarded: AtomicU64,
}

impl PublishedTrack {
    /// Allocate a forwarding track with the inbound track's codec and ids
    #[must_use]
    pub fn new(info: TrackInfo) -> Self {
        let local = Arc::new(TrackLocalStaticRTP::new(
            info.codec.clone(),
            info.id.as_str().to_string(),
            info.stream_id.clone(),
        ));
        Self {
            info,
            local,
            packets_forwarded: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &TrackId {
        &self.info.id
    }

    #[must_use]
    pub const fn publisher(&self) -> &SessionId {
        &self.info.publisher
    }

    #[must_use]
    pub const fn publisher_role(&self) -> Role {
        self.info.publisher_role
    }

    #[must_use]
    pub const fn kind(&self) -> TrackKind {
        self.info.kind
    }

    #[must_use]
    pub fn codec(&self) -> &str {
        &self.info.codec.mime_type
    }

    /// The engine-side track that subscribers' senders are bound to
    #[must_use]
    pub fn local_track(&self) -> Arc<TrackLocalStaticRTP> {
        Arc::clone(&self.local)
    }

    /// Whether a sender bound to `local` receives this publication.
    ///
    /// A re-published id gets a new local track, so senders still bound to
    /// the previous one do not match.
    #[must_use]
    pub fn is_bound_to(&self, local: &LocalTrack) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(local), Arc::as_ptr(&self.local))
    }

    pub(crate) fn record_forwarded(&self, payload_len: usize) {
        self.packets_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn stats(&self) -> TrackStats {
        TrackStats {
            track_id: self.info.id.clone(),
            publisher: self.info.publisher.clone(),
            kind: self.info.kind,
            codec: self.info.codec.mime_type.clone(),
            ssrc: self.info.ssrc,
            packets_forwarded: self.packets_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl RtpSink for PublishedTrack {
    async fn write_packet(&self, packet: &Packet) -> Result<()> {
        self.local.write_rtp(packet).await?;
        Ok(())
    }
}

/// Per-track forwarding counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackStats {
    pub track_id: TrackId,
    pub publisher: SessionId,
    pub kind: TrackKind,
    pub codec: String,
    /// SSRC of the inbound stream
    pub ssrc: u32,
    pub packets_forwarded: u64,
    /// Payload bytes only
    pub bytes_forwarded: u64,
}
