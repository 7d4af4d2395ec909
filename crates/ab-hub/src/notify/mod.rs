//! # Contact Notifications
//!
//! A notification run has two steps. [`build_list`] decides which contacts
//! of a ticket should hear about it, [`walk_list`] hands each entry to a
//! [`Notifier`] and books successful deliveries on the ticket.
//!
//! Only [`LogNotifier`] ships with the hub; mail or webhook delivery plugs
//! in behind the same trait.

use crate::store::{StoreResult, Ticket, TicketStore};
use ab_core::{classification_label, ContactKind};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("contact {0} has no e-mail address")]
    NoAddress(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// One message to one contact about one ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub ticket_id: i64,
    pub kind: ContactKind,
    pub reference: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: String,
    pub event_count: i64,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes each notification to the log instead of sending it.
pub struct LogNotifier {
    sender: String,
}

impl LogNotifier {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let Some(email) = notification.email.as_deref() else {
            return Err(NotifyError::NoAddress(notification.reference.clone()));
        };
        tracing::info!(
            from = %self.sender,
            to = %email,
            ticket = notification.ticket_id,
            contact = %notification.reference,
            events = notification.event_count,
            subject = %notification.subject,
            "notification delivered"
        );
        Ok(())
    }
}

/// Contacts of `ticket` to notify. A side qualifies when it has a contact
/// reference and either auto-notify is on or `force` is set. Only sides
/// with new events since the last notification qualify unless forced.
pub fn build_list(ticket: &Ticket, force: bool, only: Option<ContactKind>) -> Vec<Notification> {
    let has_news = ticket.event_count > ticket.last_notify_count;

    ContactKind::selected(only)
        .into_iter()
        .filter_map(|kind| {
            let contact = ticket.contact(kind);
            let reference = contact.reference?;
            if !force && !(contact.auto_notify && has_news) {
                return None;
            }
            Some(Notification {
                ticket_id: ticket.id,
                kind,
                reference,
                name: contact.name,
                email: contact.email,
                subject: format!(
                    "[Ticket #{}] {} report for {}",
                    ticket.id,
                    classification_label(&ticket.class_id),
                    match kind {
                        ContactKind::Ip => ticket.ip.as_str(),
                        ContactKind::Domain => ticket.domain.as_deref().unwrap_or(&ticket.ip),
                    }
                ),
                event_count: ticket.event_count,
            })
        })
        .collect()
}

/// Result of walking a notification list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Deliver every entry in order. A failed delivery is logged and skipped;
/// store errors abort the walk.
pub async fn walk_list(
    notifier: &dyn Notifier,
    store: &TicketStore,
    list: &[Notification],
) -> StoreResult<WalkReport> {
    let mut report = WalkReport::default();
    for notification in list {
        match notifier.deliver(notification).await {
            Ok(()) => {
                store
                    .record_notification(
                        notification.ticket_id,
                        notification.kind,
                        notification.event_count,
                    )
                    .await?;
                report.delivered += 1;
            }
            Err(e) => {
                tracing::warn!(
                    notifier = notifier.name(),
                    ticket = notification.ticket_id,
                    contact = %notification.reference,
                    error = %e,
                    "notification not delivered"
                );
                report.failed += 1;
            }
        }
    }
    Ok(report)
}
