//! # Response Serialization
//!
//! Tickets leave the hub as [`TicketItem`]s inside a `{"data": ...}`
//! envelope, both for single items and for collections.

use crate::store::{TableRow, Ticket};
use ab_core::{
    classification_label, ContactKind, ContactStatus, TicketStatus, TicketType, CLASSIFICATIONS,
};
use serde::Serialize;

/// `{"data": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactItem {
    pub account_id: Option<i64>,
    pub reference: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub auto_notify: bool,
    pub notified_count: i64,
}

/// External shape of one ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketItem {
    pub id: i64,
    pub ip: String,
    pub domain: Option<String>,
    pub class_id: String,
    pub class_name: String,
    pub type_id: String,
    pub type_name: String,
    pub status_id: String,
    pub status_name: String,
    pub contact_status_id: String,
    pub ip_contact: ContactItem,
    pub domain_contact: ContactItem,
    pub event_count: i64,
    pub last_notify_count: i64,
    pub last_notify_timestamp: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct TicketTransformer;

impl TicketTransformer {
    pub fn transform(ticket: &Ticket) -> TicketItem {
        let contact = |kind| {
            let c = ticket.contact(kind);
            ContactItem {
                account_id: c.account_id,
                reference: c.reference,
                name: c.name,
                email: c.email,
                auto_notify: c.auto_notify,
                notified_count: c.notified_count,
            }
        };

        TicketItem {
            id: ticket.id,
            ip: ticket.ip.clone(),
            domain: ticket.domain.clone(),
            class_id: ticket.class_id.clone(),
            class_name: classification_label(&ticket.class_id).to_string(),
            type_id: ticket.type_id.clone(),
            type_name: type_label(&ticket.type_id),
            status_id: ticket.status_id.clone(),
            status_name: status_label(&ticket.status_id),
            contact_status_id: ticket.contact_status_id.clone(),
            ip_contact: contact(ContactKind::Ip),
            domain_contact: contact(ContactKind::Domain),
            event_count: ticket.event_count,
            last_notify_count: ticket.last_notify_count,
            last_notify_timestamp: ticket.last_notify_timestamp.clone(),
            created_at: ticket.created_at.clone(),
            updated_at: ticket.updated_at.clone(),
        }
    }

    pub fn item(ticket: &Ticket) -> Envelope<TicketItem> {
        Envelope::new(Self::transform(ticket))
    }

    /// Collection envelope, in input order.
    pub fn collection(tickets: &[Ticket]) -> Envelope<Vec<TicketItem>> {
        Envelope::new(tickets.iter().map(Self::transform).collect())
    }
}

/// Row of the ticket table with display labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableItem {
    #[serde(flatten)]
    pub row: TableRow,
    pub type_name: String,
    pub class_name: String,
    pub status_name: String,
    pub actions: String,
}

impl From<TableRow> for TableItem {
    fn from(row: TableRow) -> Self {
        Self {
            type_name: type_label(&row.type_id),
            class_name: classification_label(&row.class_id).to_string(),
            status_name: status_label(&row.status_id),
            actions: format!("/api/tickets/{}", row.id),
            row,
        }
    }
}

/// An id with its display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub id: &'static str,
    pub name: &'static str,
}

/// Everything a client needs to render ticket filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    pub types: Vec<Label>,
    pub classifications: Vec<Label>,
    pub statuses: Vec<Label>,
    pub contact_statuses: Vec<Label>,
}

impl Meta {
    pub fn build() -> Self {
        Self {
            types: TicketType::ALL
                .iter()
                .map(|t| Label { id: t.as_str(), name: t.label() })
                .collect(),
            classifications: CLASSIFICATIONS
                .iter()
                .map(|&(id, name)| Label { id, name })
                .collect(),
            statuses: TicketStatus::ALL
                .iter()
                .map(|s| Label { id: s.as_str(), name: s.label() })
                .collect(),
            contact_statuses: ContactStatus::ALL
                .iter()
                .map(|s| Label { id: s.as_str(), name: s.label() })
                .collect(),
        }
    }
}

/// Human label of a stored type id, the raw id when unknown.
pub fn type_label(id: &str) -> String {
    id.parse::<TicketType>()
        .map(|t| t.label().to_string())
        .unwrap_or_else(|_| id.to_string())
}

/// Human label of a stored status id, the raw id when unknown.
pub fn status_label(id: &str) -> String {
    id.parse::<TicketStatus>()
        .map(|s| s.label().to_string())
        .unwrap_or_else(|_| id.to_string())
}
