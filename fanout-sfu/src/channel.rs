//! Signaling channel
//!
//! Every session owns one duplex signaling channel. Its outbound half is
//! written from several independent tasks (ICE candidate callbacks, the
//! reconciliation pass, error reporting), so writes go through a lock held
//! for the duration of one whole message.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Event carried by a signaling message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalEvent {
    /// Server to client: session description to apply, answer expected
    Offer,
    /// Client to server: answer to the last offer
    Answer,
    /// Both directions: trickled ICE candidate
    Candidate,
}

/// Signaling envelope. `data` holds engine JSON serialized to a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub event: SignalEvent,
    pub data: String,
}

impl SignalMessage {
    pub fn offer(data: impl Into<String>) -> Self {
        Self {
            event: SignalEvent::Offer,
            data: data.into(),
        }
    }

    pub fn candidate(data: impl Into<String>) -> Self {
        Self {
            event: SignalEvent::Candidate,
            data: data.into(),
        }
    }

    /// Parse one inbound text frame
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Protocol(format!("malformed message: {e}")))
    }
}

/// Raw outbound half of the transport carrying signaling text frames
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalWriter: Send {
    async fn write_text(&mut self, text: String) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of the transport carrying signaling text frames
#[async_trait]
pub trait SignalReader: Send {
    /// Next text frame. `None` once the peer closed the channel.
    async fn recv(&mut self) -> Option<Result<String>>;
}

/// Serializes concurrent writes to one session's signaling channel
pub struct SignalingChannel {
    writer: Mutex<Box<dyn SignalWriter>>,
}

impl SignalingChannel {
    pub fn new(writer: impl SignalWriter + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Serialize and write one message. Concurrent callers are queued.
    pub async fn send(&self, message: &SignalMessage) -> Result<()> {
        let text = serde_json::to_string(message)?;
        self.writer.lock().await.write_text(text).await
    }

    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_envelope_wire_format() {
        let msg = SignalMessage::offer("{\"type\":\"offer\",\"sdp\":\"v=0\"}");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"event":"offer","data":"{\"type\":\"offer\",\"sdp\":\"v=0\"}"}"#
        );
    }

    #[test]
    fn test_parse_answer_and_candidate() {
        let answer = SignalMessage::parse(r#"{"event":"answer","data":"{}"}"#).unwrap();
        assert_eq!(answer.event, SignalEvent::Answer);

        let candidate =
            SignalMessage::parse(r#"{"event":"candidate","data":"{\"candidate\":\"\"}"}"#).unwrap();
        assert_eq!(candidate.event, SignalEvent::Candidate);
    }

    #[test]
    fn test_parse_rejects_unknown_event_and_bad_json() {
        let err = SignalMessage::parse(r#"{"event":"hangup","data":""}"#).unwrap_err();
        assert!(err.is_protocol());

        let err = SignalMessage::parse("not json").unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn test_send_writes_serialized_message() {
        let mut writer = MockSignalWriter::new();
        writer
            .expect_write_text()
            .withf(|text| text.contains("\"event\":\"candidate\""))
            .times(1)
            .returning(|_| Ok(()));

        let channel = SignalingChannel::new(writer);
        channel
            .send(&SignalMessage::candidate("{}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let mut writer = MockSignalWriter::new();
        writer
            .expect_write_text()
            .returning(|_| Err(Error::Signaling("connection reset".to_string())));

        let channel = SignalingChannel::new(writer);
        let result = channel.send(&SignalMessage::offer("{}")).await;
        assert!(matches!(result, Err(Error::Signaling(_))));
    }

    #[tokio::test]
    async fn test_concurrent_senders_each_write_whole_messages() {
        let mut writer = MockSignalWriter::new();
        writer
            .expect_write_text()
            .withf(|text| SignalMessage::parse(text).is_ok())
            .times(20)
            .returning(|_| Ok(()));

        let channel = Arc::new(SignalingChannel::new(writer));
        let mut handles = Vec::new();
        for i in 0..20 {
            let channel = Arc::clone(&channel);
            handles.push(tokio::spawn(async move {
                channel
                    .send(&SignalMessage::candidate(format!("{{\"n\":{i}}}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }
}
