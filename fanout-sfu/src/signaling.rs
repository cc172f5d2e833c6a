//! Inbound signaling protocol handler
//!
//! Interprets the JSON envelope a client sends over its signaling channel.
//! Every failure is fatal to the session: a peer whose descriptions or
//! candidates cannot be applied has no way to resynchronize.

use crate::channel::{SignalEvent, SignalMessage, SignalReader};
use crate::error::{Error, Result};
use crate::session::Session;
use tracing::{debug, info, warn};

/// Apply one inbound text frame to the session's connection
pub async fn handle_message(session: &Session, raw: &str) -> Result<()> {
    let message = SignalMessage::parse(raw)?;
    match message.event {
        SignalEvent::Candidate => {
            debug!(session_id = %session.id(), "Remote candidate");
            session.connection().add_ice_candidate(&message.data).await
        }
        SignalEvent::Answer => {
            debug!(session_id = %session.id(), "Remote answer");
            session.connection().apply_answer(&message.data).await
        }
        SignalEvent::Offer => Err(Error::Protocol(
            "offers are only sent by the server".to_string(),
        )),
    }
}

/// Read and apply signaling messages until the channel ends or a message
/// fails, then close the session's connection.
///
/// Registry removal is left to reconciliation, which the connection's
/// closed-state callback triggers.
pub async fn serve_session<R>(session: &Session, reader: &mut R)
where
    R: SignalReader + ?Sized,
{
    loop {
        let raw = match reader.recv().await {
            Some(Ok(raw)) => raw,
            Some(Err(e)) => {
                info!(session_id = %session.id(), error = %e, "Signaling channel failed");
                break;
            }
            None => {
                info!(session_id = %session.id(), "Signaling channel closed");
                break;
            }
        };

        if let Err(e) = handle_message(session, &raw).await {
            if e.is_protocol() {
                warn!(session_id = %session.id(), error = %e, "Malformed signaling message");
            } else {
                warn!(session_id = %session.id(), error = %e, "Failed to apply signaling message");
            }
            break;
        }
    }

    if let Err(e) = session.connection().close().await {
        warn!(session_id = %session.id(), error = %e, "Failed to close connection");
    }
    if let Err(e) = session.channel().close().await {
        debug!(session_id = %session.id(), error = %e, "Failed to close signaling channel");
    }
}
