//! Shared fakes for the SFU integration tests
//!
//! `FakeConnection` models just enough of a peer connection to observe what
//! reconciliation does to it: which local tracks its senders are bound to,
//! how many offers it produced, and which remote descriptions were applied.

#![allow(dead_code)]

use async_trait::async_trait;
use fanout_sfu::{
    ConnectionState, Error, LocalTrack, MediaConnection, Packet, PublishedTrack,
    RTCRtpCodecCapability, Result, Role, RtpSource, Session, SessionId, SignalMessage,
    SignalReader, SignalWriter, SignalingChannel, TrackId, TrackInfo, TrackKind,
    TrackLocalStaticRTP,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct FakeConnection {
    state: Mutex<ConnectionState>,
    senders: Mutex<Vec<LocalTrack>>,
    receivers: Mutex<Vec<TrackId>>,
    answers: Mutex<Vec<String>>,
    candidates: Mutex<Vec<String>>,
    offers_created: AtomicUsize,
    keyframe_requests: AtomicUsize,
    failing_offers: AtomicUsize,
    always_fail: AtomicBool,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ConnectionState::Connected),
            senders: Mutex::new(Vec::new()),
            receivers: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
            candidates: Mutex::new(Vec::new()),
            offers_created: AtomicUsize::new(0),
            keyframe_requests: AtomicUsize::new(0),
            failing_offers: AtomicUsize::new(0),
            always_fail: AtomicBool::new(false),
        })
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    /// Sorted ids of the tracks this connection is sending
    pub fn senders(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self
            .senders
            .lock()
            .iter()
            .map(|local| TrackId::from(local.id()))
            .collect();
        ids.sort();
        ids
    }

    /// Whether some sender is bound to `track`'s own local track
    pub fn is_sending(&self, track: &PublishedTrack) -> bool {
        self.senders
            .lock()
            .iter()
            .any(|local| track.is_bound_to(local))
    }

    /// Bind a sender to a local track no publication owns
    pub fn add_stale_sender(&self, id: &str) {
        let local = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                ..Default::default()
            },
            id.to_string(),
            "stale".to_string(),
        ));
        self.senders.lock().push(local);
    }

    pub fn add_receiver(&self, id: &str) {
        self.receivers.lock().push(TrackId::from(id));
    }

    pub fn answers(&self) -> Vec<String> {
        self.answers.lock().clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.candidates.lock().clone()
    }

    pub fn offers_created(&self) -> usize {
        self.offers_created.load(Ordering::SeqCst)
    }

    pub fn keyframe_requests(&self) -> usize {
        self.keyframe_requests.load(Ordering::SeqCst)
    }

    /// Make the next `n` offers fail
    pub fn fail_next_offers(&self, n: usize) {
        self.failing_offers.store(n, Ordering::SeqCst);
    }

    pub fn fail_all_offers(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn sending_tracks(&self) -> Vec<LocalTrack> {
        self.senders.lock().clone()
    }

    async fn receiving_track_ids(&self) -> Vec<TrackId> {
        self.receivers.lock().clone()
    }

    async fn remove_sender(&self, track: &LocalTrack) -> Result<()> {
        let mut senders = self.senders.lock();
        let bound = senders
            .iter()
            .position(|local| std::ptr::addr_eq(Arc::as_ptr(local), Arc::as_ptr(track)));
        match bound {
            Some(index) => {
                senders.remove(index);
                Ok(())
            }
            None => Err(Error::SenderNotFound(track.id().to_string())),
        }
    }

    async fn add_track(&self, track: &PublishedTrack) -> Result<()> {
        self.senders.lock().push(track.local_track());
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        self.offers_created.fetch_add(1, Ordering::SeqCst);
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(Error::Signaling("offer rejected".to_string()));
        }
        let pending = self.failing_offers.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_offers.store(pending - 1, Ordering::SeqCst);
            return Err(Error::Signaling("offer rejected".to_string()));
        }
        Ok(r#"{"type":"offer","sdp":"v=0"}"#.to_string())
    }

    async fn request_keyframes(&self) -> usize {
        let count = self.receivers.lock().len();
        self.keyframe_requests.fetch_add(count, Ordering::SeqCst);
        count
    }

    async fn add_ice_candidate(&self, candidate: &str) -> Result<()> {
        serde_json::from_str::<serde_json::Value>(candidate)?;
        self.candidates.lock().push(candidate.to_string());
        Ok(())
    }

    async fn apply_answer(&self, answer: &str) -> Result<()> {
        serde_json::from_str::<serde_json::Value>(answer)?;
        self.answers.lock().push(answer.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.set_state(ConnectionState::Closed);
        Ok(())
    }
}

/// Outbound frames captured by a [`RecordingWriter`]
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    frames: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    broken: Arc<AtomicBool>,
}

impl Outbox {
    pub fn messages(&self) -> Vec<SignalMessage> {
        self.frames
            .lock()
            .iter()
            .map(|raw| SignalMessage::parse(raw).unwrap())
            .collect()
    }

    pub fn offer_count(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.event == fanout_sfu::SignalEvent::Offer)
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make every later write fail
    pub fn break_transport(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

pub struct RecordingWriter {
    outbox: Outbox,
}

#[async_trait]
impl SignalWriter for RecordingWriter {
    async fn write_text(&mut self, text: String) -> Result<()> {
        if self.outbox.broken.load(Ordering::SeqCst) {
            return Err(Error::Signaling("broken pipe".to_string()));
        }
        self.outbox.frames.lock().push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.outbox.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Inbound frames fed from the test body
pub struct ScriptedReader {
    rx: mpsc::UnboundedReceiver<Result<String>>,
}

#[async_trait]
impl SignalReader for ScriptedReader {
    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await
    }
}

pub fn scripted_reader() -> (mpsc::UnboundedSender<Result<String>>, ScriptedReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ScriptedReader { rx })
}

/// RTP fed from the test body; dropping the sender ends the track
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Packet>,
}

#[async_trait]
impl RtpSource for ChannelSource {
    async fn read_packet(&mut self) -> Result<Packet> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| Error::Signaling("publisher gone".to_string()))
    }
}

pub fn channel_source() -> (mpsc::UnboundedSender<Packet>, ChannelSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelSource { rx })
}

/// A registered-ready session over fakes
pub struct TestPeer {
    pub session: Arc<Session>,
    pub connection: Arc<FakeConnection>,
    pub outbox: Outbox,
}

impl TestPeer {
    pub fn new(id: &str) -> Self {
        Self::with_role(id, Role::Participant)
    }

    pub fn with_role(id: &str, role: Role) -> Self {
        let connection = FakeConnection::new();
        let outbox = Outbox::default();
        let channel = Arc::new(SignalingChannel::new(RecordingWriter {
            outbox: outbox.clone(),
        }));
        let session = Arc::new(Session::new(
            SessionId::from(id),
            role,
            Arc::clone(&connection) as Arc<dyn MediaConnection>,
            channel,
        ));
        Self {
            session,
            connection,
            outbox,
        }
    }

    pub fn id(&self) -> &SessionId {
        self.session.id()
    }
}

pub fn track_info(id: &str, publisher: &TestPeer) -> TrackInfo {
    TrackInfo {
        id: TrackId::from(id),
        stream_id: format!("{}-stream", publisher.id()),
        kind: TrackKind::Video,
        codec: RTCRtpCodecCapability {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90000,
            ..Default::default()
        },
        ssrc: 1000,
        publisher: publisher.id().clone(),
        publisher_role: publisher.session.role(),
    }
}

pub fn ids(ids: &[&str]) -> Vec<TrackId> {
    let mut ids: Vec<TrackId> = ids.iter().map(|id| TrackId::from(*id)).collect();
    ids.sort();
    ids
}
