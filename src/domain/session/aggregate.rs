//! Session aggregate root

use crate::domain::session::value_object::{DialogId, SessionState};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use chrono::{DateTime, Utc};

/// Session aggregate root
///
/// Tracks where one inbound call stands in its establishment. The state only
/// ever moves forward; termination is not a state, the owner simply drops it.
#[derive(Debug, Clone)]
pub struct Session {
    id: DialogId,
    state: SessionState,
    /// When the INVITE was accepted
    created_at: DateTime<Utc>,
    /// When the session was established (if applicable)
    established_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a new session for an accepted INVITE
    pub fn new(id: DialogId) -> Self {
        Self {
            id,
            state: SessionState::Incoming,
            created_at: Utc::now(),
            established_at: None,
        }
    }

    /// Provisional response sent
    pub fn progress(&mut self) -> Result<()> {
        self.transition_to(SessionState::Provisional)
    }

    /// Alerting response sent
    pub fn ring(&mut self) -> Result<()> {
        self.transition_to(SessionState::Ringing)
    }

    /// Final accept sent and confirmed
    pub fn establish(&mut self) -> Result<()> {
        self.transition_to(SessionState::Established)?;
        self.established_at = Some(Utc::now());
        Ok(())
    }

    fn transition_to(&mut self, new_state: SessionState) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot transition from {} to {}",
                self.state, new_state
            )));
        }

        self.state = new_state;
        Ok(())
    }

    // Getters
    pub fn id(&self) -> &DialogId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state.is_established()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn established_at(&self) -> Option<DateTime<Utc>> {
        self.established_at
    }

    /// Time spent establishing the session
    pub fn setup_duration(&self) -> Option<chrono::Duration> {
        self.established_at.map(|at| at - self.created_at)
    }
}
