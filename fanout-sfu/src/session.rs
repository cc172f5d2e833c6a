//! Connected sessions

use crate::channel::SignalingChannel;
use crate::engine::{ConnectionState, MediaConnection};
use crate::types::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a session is allowed to contribute under the broadcast policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Participant,
    Broadcaster,
    Viewer,
}

/// One connected participant: its engine connection plus its signaling channel
pub struct Session {
    id: SessionId,
    role: Role,
    connection: Arc<dyn MediaConnection>,
    channel: Arc<SignalingChannel>,
    joined_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn new(
        id: SessionId,
        role: Role,
        connection: Arc<dyn MediaConnection>,
        channel: Arc<SignalingChannel>,
    ) -> Self {
        Self {
            id,
            role,
            connection,
            channel,
            joined_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn connection(&self) -> &dyn MediaConnection {
        self.connection.as_ref()
    }

    #[must_use]
    pub fn channel(&self) -> &SignalingChannel {
        &self.channel
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.id.clone(),
            role: self.role,
            state: self.connection.state(),
            joined_at: self.joined_at,
        }
    }
}

/// Per-session entry of the stats snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: SessionId,
    pub role: Role,
    pub state: ConnectionState,
    pub joined_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.connection.state())
            .field("joined_at", &self.joined_at)
            .finish_non_exhaustive()
    }
}
