//! # ab-core: the vocabulary of the Abuse Desk
//!
//! Everything the hub and the CLI must agree on without talking to each
//! other: ticket and contact statuses, ticket types, classifications,
//! contact kinds and the account edit rules.
//!
//! The hub stores these as their canonical string ids (`"OPEN"`,
//! `"SPAM"`, ...). The human labels here replace the translation files
//! used by the admin views.

pub mod account;
pub mod status;

pub use account::{AccountError, AccountUpdate, MAX_ACCOUNT_NAME_LEN};
pub use status::{ContactStatus, StatusError, TicketStatus};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Ticket types
// =============================================================================

/// How urgent a ticket is from the abuse desk's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    Info,
    Abuse,
    Escalation,
}

impl TicketType {
    pub const ALL: [TicketType; 3] = [Self::Info, Self::Abuse, Self::Escalation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Abuse => "ABUSE",
            Self::Escalation => "ESCALATION",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Abuse => "Abuse",
            Self::Escalation => "Escalation",
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketType {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StatusError::Unknown {
                kind: "type",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Classifications
// =============================================================================

/// Known classification ids and their labels.
pub const CLASSIFICATIONS: &[(&str, &str)] = &[
    ("BOTNET_CONTROLLER", "Botnet controller"),
    ("BOTNET_INFECTION", "Botnet infection"),
    ("COMPROMISED_SERVER", "Compromised server"),
    ("COMPROMISED_WEBSITE", "Compromised website"),
    ("COPYRIGHT_INFRINGEMENT", "Copyright infringement"),
    ("DDOS_SENDING_SERVER", "DDoS sending server"),
    ("HARMFUL_WEBSITE", "Harmful website"),
    ("OPEN_DNS_RESOLVER", "Open DNS resolver"),
    ("OPEN_PROXY_SERVER", "Open proxy server"),
    ("PHISING_WEBSITE", "Phishing website"),
    ("RBL_LISTED", "Blacklisted address"),
    ("SPAM", "Spam"),
    ("SPAMTRAP", "Spamtrap hit"),
    ("VULNERABLE_SERVER", "Vulnerable server"),
];

/// Label for a classification id, falling back to the id itself.
pub fn classification_label(id: &str) -> &str {
    CLASSIFICATIONS
        .iter()
        .find(|(cid, _)| *cid == id)
        .map(|(_, label)| *label)
        .unwrap_or(id)
}

pub fn is_classification(id: &str) -> bool {
    CLASSIFICATIONS.iter().any(|(cid, _)| *cid == id)
}

// =============================================================================
// Contact kinds
// =============================================================================

/// Which contact of a ticket an action targets (the `only` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Ip,
    Domain,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Domain => "domain",
        }
    }

    /// Both kinds unless narrowed by `only`.
    pub fn selected(only: Option<ContactKind>) -> Vec<ContactKind> {
        match only {
            Some(kind) => vec![kind],
            None => vec![Self::Ip, Self::Domain],
        }
    }
}

impl fmt::Display for ContactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactKind {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" => Ok(Self::Ip),
            "domain" => Ok(Self::Domain),
            _ => Err(StatusError::Unknown {
                kind: "contact",
                value: s.to_string(),
            }),
        }
    }
}
