//! RTP relay path
//!
//! One loop per published track: read from the publisher, strip header
//! extensions, write to the forwarding track. The loop ends on the first
//! read or write error and the track is unpublished.

use crate::engine::{RtpSink, RtpSource};
use crate::error::Error;
use crate::manager::SfuManager;
use crate::track::{PublishedTrack, TrackInfo};
use std::sync::Arc;
use tracing::{debug, info};

/// Forward packets from `source` to `sink` until either side fails.
///
/// Returns the error that ended the loop.
pub async fn forward_packets<S, K>(source: &mut S, sink: &K, track: &PublishedTrack) -> Error
where
    S: RtpSource + ?Sized,
    K: RtpSink + ?Sized,
{
    loop {
        let mut packet = match source.read_packet().await {
            Ok(packet) => packet,
            Err(e) => return e,
        };

        // Extensions are negotiated per sender and must not reach other subscribers
        packet.header.extension = false;
        packet.header.extension_profile = 0;
        packet.header.extensions.clear();

        if let Err(e) = sink.write_packet(&packet).await {
            return e;
        }
        track.record_forwarded(packet.payload.len());
    }
}

/// Publish `info`, relay its packets, and unpublish it when the source ends
pub async fn run_relay<S>(manager: Arc<SfuManager>, info: TrackInfo, mut source: S)
where
    S: RtpSource,
{
    let track = manager.publish(info).await;
    info!(track_id = %track.id(), publisher = %track.publisher(), "Relay started");

    let reason = forward_packets(&mut source, track.as_ref(), &track).await;

    let stats = track.stats();
    debug!(
        track_id = %track.id(),
        packets = stats.packets_forwarded,
        bytes = stats.bytes_forwarded,
        reason = %reason,
        "Relay stopped"
    );
    manager.retire(&track).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::session::Role;
    use crate::types::{SessionId, TrackId, TrackKind};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use webrtc::rtp::header::Extension;
    use webrtc::rtp::packet::Packet;
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

    struct ScriptedSource {
        packets: VecDeque<Packet>,
    }

    #[async_trait]
    impl RtpSource for ScriptedSource {
        async fn read_packet(&mut self) -> Result<Packet> {
            self.packets
                .pop_front()
                .ok_or_else(|| Error::Signaling("track ended".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<Vec<Packet>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl RtpSink for RecordingSink {
        async fn write_packet(&self, packet: &Packet) -> Result<()> {
            let mut written = self.written.lock();
            if self.fail_after.is_some_and(|limit| written.len() >= limit) {
                return Err(Error::Signaling("sink closed".to_string()));
            }
            written.push(packet.clone());
            Ok(())
        }
    }

    fn info() -> TrackInfo {
        TrackInfo {
            id: TrackId::from("mic"),
            stream_id: "stream".to_string(),
            kind: TrackKind::Audio,
            codec: RTCRtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            ssrc: 7,
            publisher: SessionId::from("alice"),
            publisher_role: Role::Participant,
        }
    }

    fn packet_with_extension(seq: u16) -> Packet {
        let mut packet = Packet::default();
        packet.header.sequence_number = seq;
        packet.header.extension = true;
        packet.header.extension_profile = 0xBEDE;
        packet.header.extensions.push(Extension {
            id: 1,
            payload: Bytes::from_static(&[0xAA]),
        });
        packet.payload = Bytes::from_static(&[1, 2, 3, 4]);
        packet
    }

    #[tokio::test]
    async fn test_extensions_are_stripped() {
        let track = PublishedTrack::new(info());
        let sink = RecordingSink::default();
        let mut source = ScriptedSource {
            packets: (0..3).map(packet_with_extension).collect(),
        };

        let reason = forward_packets(&mut source, &sink, &track).await;
        assert!(matches!(reason, Error::Signaling(_)));

        let written = sink.written.lock();
        assert_eq!(written.len(), 3);
        for (i, packet) in written.iter().enumerate() {
            assert_eq!(packet.header.sequence_number, i as u16);
            assert!(!packet.header.extension);
            assert!(packet.header.extensions.is_empty());
            assert_eq!(packet.payload.len(), 4);
        }
        assert_eq!(track.stats().packets_forwarded, 3);
        assert_eq!(track.stats().bytes_forwarded, 12);
    }

    #[tokio::test]
    async fn test_write_error_stops_relay() {
        let track = PublishedTrack::new(info());
        let sink = RecordingSink {
            fail_after: Some(1),
            ..Default::default()
        };
        let mut source = ScriptedSource {
            packets: (0..5).map(packet_with_extension).collect(),
        };

        forward_packets(&mut source, &sink, &track).await;

        assert_eq!(sink.written.lock().len(), 1);
        // Reading stops at the first write error
        assert_eq!(source.packets.len(), 3);
        assert_eq!(track.stats().packets_forwarded, 1);
    }
}
