//! # Ticket Workflow
//!
//! Everything a handler does to a ticket besides querying it: checking who
//! may touch it, validating forms, moving it between statuses and
//! re-resolving its contacts from the netblock and domain tables.

pub mod export;

use crate::auth::Caller;
use crate::error::{ApiError, ApiResult};
use crate::store::{Ticket, TicketForm, TicketStore};
use ab_core::{is_classification, ContactKind, TicketStatus, TicketType};
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("field '{0}' is required")]
    MissingField(&'static str),

    #[error("'{0}' is not a valid IP address")]
    InvalidIp(String),

    #[error("unknown classification '{0}'")]
    UnknownClassification(String),

    #[error("unknown ticket type '{0}'")]
    UnknownType(String),
}

/// The system account sees every ticket, other accounts only the tickets
/// they are the IP or domain contact of.
pub fn authorize(caller: &Caller, ticket: &Ticket) -> ApiResult<()> {
    if caller.is_system() || ticket.belongs_to(caller.account.id) {
        Ok(())
    } else {
        tracing::warn!(
            account = caller.account.id,
            ticket = ticket.id,
            "ticket access denied"
        );
        Err(ApiError::Forbidden(format!(
            "account {} may not access ticket {}",
            caller.account.id, ticket.id
        )))
    }
}

/// Fetch a ticket the caller is allowed to see.
pub async fn load(store: &TicketStore, caller: &Caller, id: i64) -> ApiResult<Ticket> {
    let ticket = store
        .find_ticket(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ticket {id} not found")))?;
    authorize(caller, &ticket)?;
    Ok(ticket)
}

pub async fn visible_tickets(store: &TicketStore, caller: &Caller) -> ApiResult<Vec<Ticket>> {
    let tickets = if caller.is_system() {
        store.all_tickets().await?
    } else {
        store.tickets_for_account(caller.account.id).await?
    };
    Ok(tickets)
}

/// Check a ticket form. A new ticket needs ip, class and type; an update
/// only checks what it carries.
pub fn validate_form(form: &TicketForm, creating: bool) -> Result<(), WorkflowError> {
    match form.ip.as_deref() {
        Some(ip) if ip.trim().parse::<IpAddr>().is_err() => {
            return Err(WorkflowError::InvalidIp(ip.to_string()))
        }
        None if creating => return Err(WorkflowError::MissingField("ip")),
        _ => {}
    }
    match form.class_id.as_deref() {
        Some(class) if !is_classification(class) => {
            return Err(WorkflowError::UnknownClassification(class.to_string()))
        }
        None if creating => return Err(WorkflowError::MissingField("class_id")),
        _ => {}
    }
    match form.type_id.as_deref() {
        Some(ty) if ty.parse::<TicketType>().is_err() => {
            return Err(WorkflowError::UnknownType(ty.to_string()))
        }
        None if creating => return Err(WorkflowError::MissingField("type_id")),
        _ => {}
    }
    Ok(())
}

/// Normalize a validated form: trimmed ip, canonical type id, lowercase domain.
pub fn normalize_form(mut form: TicketForm) -> TicketForm {
    form.ip = form.ip.map(|ip| ip.trim().to_string());
    form.type_id = form
        .type_id
        .map(|ty| ty.parse::<TicketType>().map(|t| t.as_str().to_string()).unwrap_or(ty));
    form.domain = form
        .domain
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty());
    form
}

/// Move a ticket to `requested`, refusing transitions the status rules forbid.
pub async fn change_status(
    store: &TicketStore,
    ticket: &Ticket,
    requested: &str,
) -> ApiResult<Ticket> {
    let next: TicketStatus = requested.parse()?;
    let next = match ticket.status() {
        Some(current) => current.transition(next)?,
        None => next,
    };
    let updated = store.set_status(ticket.id, next).await?;
    tracing::info!(
        ticket = ticket.id,
        from = %ticket.status_id,
        to = %updated.status_id,
        "ticket status changed"
    );
    Ok(updated)
}

/// Look the ticket's contacts up again and write them onto it. A side
/// without a matching contact is cleared.
pub async fn update_contacts(
    store: &TicketStore,
    ticket: &Ticket,
    only: Option<ContactKind>,
) -> ApiResult<Ticket> {
    let mut current = ticket.clone();
    for kind in ContactKind::selected(only) {
        let contact = match kind {
            ContactKind::Ip => match ticket.ip.parse::<IpAddr>() {
                Ok(ip) => store.contact_for_ip(ip).await?,
                Err(_) => {
                    tracing::warn!(ticket = ticket.id, ip = %ticket.ip, "ticket ip does not parse");
                    None
                }
            },
            ContactKind::Domain => match ticket.domain.as_deref() {
                Some(domain) => store.contact_for_domain(domain).await?,
                None => None,
            },
        };
        tracing::debug!(
            ticket = ticket.id,
            kind = %kind,
            contact = contact.as_ref().map(|c| c.reference.as_str()),
            "contact resolved"
        );
        current = store.set_contact(ticket.id, kind, contact.as_ref()).await?;
    }
    Ok(current)
}
