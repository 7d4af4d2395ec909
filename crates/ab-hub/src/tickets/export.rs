//! CSV export of the tickets an account can see.

use crate::error::{ApiError, ApiResult};
use crate::store::{format_unix, Ticket, TicketStore};
use crate::transform::{status_label, type_label};
use ab_core::classification_label;
use csv::{QuoteStyle, WriterBuilder};

pub const EXPORT_FILENAME: &str = "Tickets.csv";

pub const HEADER: [&str; 8] = [
    "Ticket ID",
    "IP address",
    "Classification",
    "Type",
    "First seen",
    "Last seen",
    "Events",
    "Ticket Status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> ApiResult<Self> {
        match raw {
            "csv" => Ok(Self::Csv),
            other => Err(ApiError::BadRequest(format!(
                "The requested format {other} is not available for exports"
            ))),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
        }
    }
}

/// Render `tickets` as CSV, every field quoted, one row per ticket in
/// input order. Tickets without events get empty seen columns.
pub async fn tickets_csv(store: &TicketStore, tickets: &[Ticket]) -> ApiResult<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(HEADER).map_err(csv_error)?;

    for ticket in tickets {
        let (first_seen, last_seen) = match store.event_seen_range(ticket.id).await? {
            Some((first, last)) => (format_unix(first), format_unix(last)),
            None => (String::new(), String::new()),
        };
        writer
            .write_record([
                ticket.id.to_string(),
                ticket.ip.clone(),
                classification_label(&ticket.class_id).to_string(),
                type_label(&ticket.type_id),
                first_seen,
                last_seen,
                ticket.event_count.to_string(),
                status_label(&ticket.status_id),
            ])
            .map_err(csv_error)?;
    }

    let out = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("csv export: {}", e.error())))?;
    tracing::info!(rows = tickets.len(), bytes = out.len(), "tickets exported");
    Ok(out)
}

fn csv_error(err: csv::Error) -> ApiError {
    ApiError::Internal(format!("csv export: {err}"))
}
