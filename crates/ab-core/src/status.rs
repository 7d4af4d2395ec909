//! # Ticket Workflow States
//!
//! The abuse desk tracks two independent states per ticket: its own
//! handling status and the status the contact reported back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    #[error("unknown {kind} '{value}'")]
    Unknown { kind: &'static str, value: String },

    #[error("ticket status cannot change from {from} to {to}")]
    Transition {
        from: TicketStatus,
        to: TicketStatus,
    },
}

/// Abuse desk handling status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    Closed,
    Escalated,
    Ignored,
    Resolved,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 5] = [
        Self::Open,
        Self::Closed,
        Self::Escalated,
        Self::Ignored,
        Self::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Escalated => "ESCALATED",
            Self::Ignored => "IGNORED",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
            Self::Escalated => "Escalated",
            Self::Ignored => "Ignored",
            Self::Resolved => "Resolved",
        }
    }

    /// A closed ticket only leaves `CLOSED` by being reopened.
    /// Setting the current status again is always allowed.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        match self {
            _ if *self == next => true,
            Self::Closed => next == Self::Open,
            _ => true,
        }
    }

    pub fn transition(&self, next: TicketStatus) -> Result<TicketStatus, StatusError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StatusError::Transition {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StatusError::Unknown {
                kind: "status",
                value: s.to_string(),
            })
    }
}

/// Status as reported by the contact of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactStatus {
    Open,
    Closed,
    Ignored,
    Resolved,
}

impl ContactStatus {
    pub const ALL: [ContactStatus; 4] = [Self::Open, Self::Closed, Self::Ignored, Self::Resolved];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Ignored => "IGNORED",
            Self::Resolved => "RESOLVED",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
            Self::Ignored => "Ignored",
            Self::Resolved => "Resolved",
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StatusError::Unknown {
                kind: "contact status",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), status);
        }
        assert_eq!("resolved".parse::<TicketStatus>().unwrap(), TicketStatus::Resolved);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "DONE".parse::<TicketStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown status 'DONE'");
    }

    #[test]
    fn test_closed_ticket_only_reopens() {
        assert!(TicketStatus::Closed.can_transition_to(TicketStatus::Open));
        assert!(TicketStatus::Closed.can_transition_to(TicketStatus::Closed));
        assert!(!TicketStatus::Closed.can_transition_to(TicketStatus::Escalated));
        assert!(TicketStatus::Closed.transition(TicketStatus::Resolved).is_err());
    }

    #[test]
    fn test_open_ticket_moves_anywhere() {
        for next in TicketStatus::ALL {
            assert_eq!(TicketStatus::Open.transition(next), Ok(next));
        }
    }

    #[test]
    fn test_contact_status_parse() {
        assert_eq!("ignored".parse::<ContactStatus>().unwrap(), ContactStatus::Ignored);
        assert!("ESCALATED".parse::<ContactStatus>().is_err());
    }
}
