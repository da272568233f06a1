//! Session value objects

use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session state
///
/// The progression is fixed: an inbound session is `Incoming` until the
/// first provisional response goes out, then `Provisional`, `Ringing` and
/// finally `Established`. Media may only flow once `Established`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// INVITE received, nothing sent yet
    Incoming,
    /// 100 Trying sent
    Provisional,
    /// 180 Ringing sent
    Ringing,
    /// 200 OK sent and acknowledged
    Established,
}

impl SessionState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, new_state),
            (Incoming, Provisional) | (Provisional, Ringing) | (Ringing, Established)
        )
    }

    /// Check if media may flow
    pub fn is_established(&self) -> bool {
        matches!(self, SessionState::Established)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Incoming => "Incoming",
            SessionState::Provisional => "Provisional",
            SessionState::Ringing => "Ringing",
            SessionState::Established => "Established",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dialog identifier (Call-ID plus both tags)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId {
    call_id: String,
    remote_tag: String,
    local_tag: String,
}

impl DialogId {
    pub fn new(
        call_id: impl Into<String>,
        remote_tag: impl Into<String>,
        local_tag: impl Into<String>,
    ) -> Result<Self> {
        let call_id = call_id.into();
        if call_id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Call-ID must not be empty".to_string(),
            ));
        }

        Ok(Self {
            call_id,
            remote_tag: remote_tag.into(),
            local_tag: local_tag.into(),
        })
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn remote_tag(&self) -> &str {
        &self.remote_tag
    }

    pub fn local_tag(&self) -> &str {
        &self.local_tag
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}__{}", self.call_id, self.remote_tag, self.local_tag)
    }
}
