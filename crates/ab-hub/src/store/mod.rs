//! # Ticket Store
//!
//! SQLite persistence for tickets, their events and notes, and the
//! account/contact tables tickets point at. A single connection sits
//! behind an async mutex; every method locks it for one short
//! synchronous transaction.

pub mod accounts;
pub mod contacts;
pub mod seed;

use crate::query::{Criterion, Record};
use ab_core::{ContactKind, TicketStatus};
use chrono::{TimeZone, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tokio::sync::Mutex;

pub use accounts::{Account, Brand};
pub use contacts::{Contact, Domain, Netblock};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no such column: {0}")]
    UnknownColumn(String),

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("unsupported value for column {column}: {value}")]
    UnsupportedValue { column: String, value: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Stored ticket columns, the only names a pushdown criterion may use.
pub const TICKET_COLUMNS: &[&str] = &[
    "id",
    "ip",
    "domain",
    "class_id",
    "type_id",
    "status_id",
    "contact_status_id",
    "ip_contact_account_id",
    "ip_contact_reference",
    "ip_contact_name",
    "ip_contact_email",
    "ip_contact_auto_notify",
    "ip_contact_notified_count",
    "domain_contact_account_id",
    "domain_contact_reference",
    "domain_contact_name",
    "domain_contact_email",
    "domain_contact_auto_notify",
    "domain_contact_notified_count",
    "last_notify_count",
    "last_notify_timestamp",
    "created_at",
    "updated_at",
];

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS brands (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    company_name TEXT NOT NULL DEFAULT '',
    introduction_text TEXT NOT NULL DEFAULT '',
    creator_id INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    disabled INTEGER NOT NULL DEFAULT 0,
    systemaccount INTEGER NOT NULL DEFAULT 0,
    brand_id INTEGER NOT NULL REFERENCES brands (id)
);
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY,
    reference TEXT NOT NULL,
    name TEXT NOT NULL,
    email TEXT,
    auto_notify INTEGER NOT NULL DEFAULT 0,
    enabled INTEGER NOT NULL DEFAULT 1,
    account_id INTEGER REFERENCES accounts (id)
);
CREATE TABLE IF NOT EXISTS netblocks (
    id INTEGER PRIMARY KEY,
    contact_id INTEGER NOT NULL REFERENCES contacts (id),
    first_ip TEXT NOT NULL,
    last_ip TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS domains (
    id INTEGER PRIMARY KEY,
    contact_id INTEGER NOT NULL REFERENCES contacts (id),
    name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS tickets (
    id INTEGER PRIMARY KEY,
    ip TEXT NOT NULL,
    domain TEXT,
    class_id TEXT NOT NULL,
    type_id TEXT NOT NULL,
    status_id TEXT NOT NULL DEFAULT 'OPEN',
    contact_status_id TEXT NOT NULL DEFAULT 'OPEN',
    ip_contact_account_id INTEGER,
    ip_contact_reference TEXT,
    ip_contact_name TEXT,
    ip_contact_email TEXT,
    ip_contact_auto_notify INTEGER NOT NULL DEFAULT 0,
    ip_contact_notified_count INTEGER NOT NULL DEFAULT 0,
    domain_contact_account_id INTEGER,
    domain_contact_reference TEXT,
    domain_contact_name TEXT,
    domain_contact_email TEXT,
    domain_contact_auto_notify INTEGER NOT NULL DEFAULT 0,
    domain_contact_notified_count INTEGER NOT NULL DEFAULT 0,
    last_notify_count INTEGER NOT NULL DEFAULT 0,
    last_notify_timestamp TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY,
    ticket_id INTEGER NOT NULL REFERENCES tickets (id),
    source TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    information TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY,
    ticket_id INTEGER NOT NULL REFERENCES tickets (id),
    submitter TEXT NOT NULL,
    text TEXT NOT NULL,
    hidden INTEGER NOT NULL DEFAULT 0,
    viewed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_ticket ON events (ticket_id);
CREATE INDEX IF NOT EXISTS idx_notes_ticket ON notes (ticket_id);
CREATE INDEX IF NOT EXISTS idx_tickets_ip ON tickets (ip);
";

const SELECT_TICKETS: &str = "SELECT t.id, t.ip, t.domain, t.class_id, t.type_id, t.status_id,
    t.contact_status_id, t.ip_contact_account_id, t.ip_contact_reference, t.ip_contact_name,
    t.ip_contact_email, t.ip_contact_auto_notify, t.ip_contact_notified_count,
    t.domain_contact_account_id, t.domain_contact_reference, t.domain_contact_name,
    t.domain_contact_email, t.domain_contact_auto_notify, t.domain_contact_notified_count,
    t.last_notify_count, t.last_notify_timestamp, t.created_at, t.updated_at,
    (SELECT COUNT(*) FROM events e WHERE e.ticket_id = t.id) AS event_count
    FROM tickets t";

// =============================================================================
// Ticket model
// =============================================================================

/// A ticket row plus its computed `event_count`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ticket {
    pub id: i64,
    pub ip: String,
    pub domain: Option<String>,
    pub class_id: String,
    pub type_id: String,
    pub status_id: String,
    pub contact_status_id: String,
    pub ip_contact_account_id: Option<i64>,
    pub ip_contact_reference: Option<String>,
    pub ip_contact_name: Option<String>,
    pub ip_contact_email: Option<String>,
    pub ip_contact_auto_notify: bool,
    pub ip_contact_notified_count: i64,
    pub domain_contact_account_id: Option<i64>,
    pub domain_contact_reference: Option<String>,
    pub domain_contact_name: Option<String>,
    pub domain_contact_email: Option<String>,
    pub domain_contact_auto_notify: bool,
    pub domain_contact_notified_count: i64,
    pub last_notify_count: i64,
    pub last_notify_timestamp: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub event_count: i64,
}

/// The contact columns of one side of a ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketContact {
    pub kind: ContactKind,
    pub account_id: Option<i64>,
    pub reference: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub auto_notify: bool,
    pub notified_count: i64,
}

impl Ticket {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ip: row.get(1)?,
            domain: row.get(2)?,
            class_id: row.get(3)?,
            type_id: row.get(4)?,
            status_id: row.get(5)?,
            contact_status_id: row.get(6)?,
            ip_contact_account_id: row.get(7)?,
            ip_contact_reference: row.get(8)?,
            ip_contact_name: row.get(9)?,
            ip_contact_email: row.get(10)?,
            ip_contact_auto_notify: row.get(11)?,
            ip_contact_notified_count: row.get(12)?,
            domain_contact_account_id: row.get(13)?,
            domain_contact_reference: row.get(14)?,
            domain_contact_name: row.get(15)?,
            domain_contact_email: row.get(16)?,
            domain_contact_auto_notify: row.get(17)?,
            domain_contact_notified_count: row.get(18)?,
            last_notify_count: row.get(19)?,
            last_notify_timestamp: row.get(20)?,
            created_at: row.get(21)?,
            updated_at: row.get(22)?,
            event_count: row.get(23)?,
        })
    }

    pub fn status(&self) -> Option<TicketStatus> {
        self.status_id.parse().ok()
    }

    pub fn contact(&self, kind: ContactKind) -> TicketContact {
        match kind {
            ContactKind::Ip => TicketContact {
                kind,
                account_id: self.ip_contact_account_id,
                reference: self.ip_contact_reference.clone(),
                name: self.ip_contact_name.clone(),
                email: self.ip_contact_email.clone(),
                auto_notify: self.ip_contact_auto_notify,
                notified_count: self.ip_contact_notified_count,
            },
            ContactKind::Domain => TicketContact {
                kind,
                account_id: self.domain_contact_account_id,
                reference: self.domain_contact_reference.clone(),
                name: self.domain_contact_name.clone(),
                email: self.domain_contact_email.clone(),
                auto_notify: self.domain_contact_auto_notify,
                notified_count: self.domain_contact_notified_count,
            },
        }
    }

    /// Whether `account_id` is the IP or domain contact of this ticket.
    pub fn belongs_to(&self, account_id: i64) -> bool {
        self.ip_contact_account_id == Some(account_id)
            || self.domain_contact_account_id == Some(account_id)
    }
}

impl Record for Ticket {
    fn field(&self, name: &str) -> Option<Value> {
        let v = match name {
            "id" => json!(self.id),
            "ip" => json!(self.ip),
            "domain" => json!(self.domain),
            "class_id" => json!(self.class_id),
            "type_id" => json!(self.type_id),
            "status_id" => json!(self.status_id),
            "contact_status_id" => json!(self.contact_status_id),
            "ip_contact_account_id" => json!(self.ip_contact_account_id),
            "ip_contact_reference" => json!(self.ip_contact_reference),
            "ip_contact_name" => json!(self.ip_contact_name),
            "ip_contact_email" => json!(self.ip_contact_email),
            "ip_contact_auto_notify" => json!(i64::from(self.ip_contact_auto_notify)),
            "ip_contact_notified_count" => json!(self.ip_contact_notified_count),
            "domain_contact_account_id" => json!(self.domain_contact_account_id),
            "domain_contact_reference" => json!(self.domain_contact_reference),
            "domain_contact_name" => json!(self.domain_contact_name),
            "domain_contact_email" => json!(self.domain_contact_email),
            "domain_contact_auto_notify" => json!(i64::from(self.domain_contact_auto_notify)),
            "domain_contact_notified_count" => json!(self.domain_contact_notified_count),
            "last_notify_count" => json!(self.last_notify_count),
            "last_notify_timestamp" => json!(self.last_notify_timestamp),
            "created_at" => json!(self.created_at),
            "updated_at" => json!(self.updated_at),
            "event_count" => json!(self.event_count),
            _ => return None,
        };
        Some(v)
    }
}

/// Fields accepted when creating or updating a ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketForm {
    pub ip: Option<String>,
    pub domain: Option<String>,
    pub class_id: Option<String>,
    pub type_id: Option<String>,
    pub ip_contact_account_id: Option<i64>,
    pub ip_contact_reference: Option<String>,
    pub ip_contact_name: Option<String>,
    pub ip_contact_email: Option<String>,
    pub ip_contact_auto_notify: Option<bool>,
    pub domain_contact_account_id: Option<i64>,
    pub domain_contact_reference: Option<String>,
    pub domain_contact_name: Option<String>,
    pub domain_contact_email: Option<String>,
    pub domain_contact_auto_notify: Option<bool>,
}

/// Row of the admin ticket table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub id: i64,
    pub ip: String,
    pub domain: Option<String>,
    pub type_id: String,
    pub class_id: String,
    pub status_id: String,
    pub ip_contact_account_id: Option<i64>,
    pub ip_contact_reference: Option<String>,
    pub ip_contact_name: Option<String>,
    pub domain_contact_account_id: Option<i64>,
    pub domain_contact_reference: Option<String>,
    pub domain_contact_name: Option<String>,
    pub event_count: i64,
    pub notes_count: i64,
}

impl TableRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            ip: row.get(1)?,
            domain: row.get(2)?,
            type_id: row.get(3)?,
            class_id: row.get(4)?,
            status_id: row.get(5)?,
            ip_contact_account_id: row.get(6)?,
            ip_contact_reference: row.get(7)?,
            ip_contact_name: row.get(8)?,
            domain_contact_account_id: row.get(9)?,
            domain_contact_reference: row.get(10)?,
            domain_contact_name: row.get(11)?,
            event_count: row.get(12)?,
            notes_count: row.get(13)?,
        })
    }
}

pub fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_unix(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

// =============================================================================
// Store
// =============================================================================

pub struct TicketStore {
    conn: Mutex<Connection>,
}

impl TicketStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run the pushdown half of a criteria query: one `AND` of all
    /// criteria, rows in id order.
    pub async fn select(&self, criteria: &[Criterion]) -> StoreResult<Vec<Ticket>> {
        self.select_scoped(criteria, None).await
    }

    /// [`select`](Self::select) limited to the tickets of one contact
    /// account when `account_id` is set.
    pub async fn select_scoped(
        &self,
        criteria: &[Criterion],
        account_id: Option<i64>,
    ) -> StoreResult<Vec<Ticket>> {
        let (mut clause, mut values) = build_where(criteria)?;
        if let Some(account_id) = account_id {
            values.push(SqlValue::Integer(account_id));
            let n = values.len();
            let scope = format!(
                "(t.ip_contact_account_id = ?{n} OR t.domain_contact_account_id = ?{n})"
            );
            clause = if clause.is_empty() {
                format!(" WHERE {scope}")
            } else {
                format!("{clause} AND {scope}")
            };
        }
        let sql = format!("{SELECT_TICKETS}{clause} ORDER BY t.id");
        tracing::debug!(%sql, params = values.len(), "ticket pushdown query");

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), Ticket::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub async fn all_tickets(&self) -> StoreResult<Vec<Ticket>> {
        self.select(&[]).await
    }

    /// Tickets where the account is the IP or the domain contact.
    pub async fn tickets_for_account(&self, account_id: i64) -> StoreResult<Vec<Ticket>> {
        let sql = format!(
            "{SELECT_TICKETS} WHERE t.ip_contact_account_id = ?1 \
             OR t.domain_contact_account_id = ?1 ORDER BY t.id"
        );
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([account_id], Ticket::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub async fn find_ticket(&self, id: i64) -> StoreResult<Option<Ticket>> {
        let conn = self.conn.lock().await;
        find_ticket(&conn, id)
    }

    pub async fn create_ticket(&self, form: &TicketForm) -> StoreResult<Ticket> {
        let conn = self.conn.lock().await;
        let now = now_timestamp();
        conn.execute(
            "INSERT INTO tickets (ip, domain, class_id, type_id, status_id, contact_status_id,
                ip_contact_account_id, ip_contact_reference, ip_contact_name, ip_contact_email,
                ip_contact_auto_notify, domain_contact_account_id, domain_contact_reference,
                domain_contact_name, domain_contact_email, domain_contact_auto_notify,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'OPEN', 'OPEN', ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
            params![
                form.ip.as_deref().unwrap_or_default(),
                form.domain,
                form.class_id.as_deref().unwrap_or_default(),
                form.type_id.as_deref().unwrap_or_default(),
                form.ip_contact_account_id,
                form.ip_contact_reference,
                form.ip_contact_name,
                form.ip_contact_email,
                form.ip_contact_auto_notify.unwrap_or(false),
                form.domain_contact_account_id,
                form.domain_contact_reference,
                form.domain_contact_name,
                form.domain_contact_email,
                form.domain_contact_auto_notify.unwrap_or(false),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        find_ticket(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))
    }

    /// Apply the fields present in `form`, leaving the rest untouched.
    pub async fn update_ticket(&self, id: i64, form: &TicketForm) -> StoreResult<Ticket> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        let mut push = |column: &'static str, value: Option<SqlValue>| {
            if let Some(v) = value {
                sets.push(column);
                values.push(v);
            }
        };
        push("ip", form.ip.clone().map(SqlValue::Text));
        push("domain", form.domain.clone().map(SqlValue::Text));
        push("class_id", form.class_id.clone().map(SqlValue::Text));
        push("type_id", form.type_id.clone().map(SqlValue::Text));
        push("ip_contact_account_id", form.ip_contact_account_id.map(SqlValue::Integer));
        push("ip_contact_reference", form.ip_contact_reference.clone().map(SqlValue::Text));
        push("ip_contact_name", form.ip_contact_name.clone().map(SqlValue::Text));
        push("ip_contact_email", form.ip_contact_email.clone().map(SqlValue::Text));
        push(
            "ip_contact_auto_notify",
            form.ip_contact_auto_notify.map(|b| SqlValue::Integer(b.into())),
        );
        push(
            "domain_contact_account_id",
            form.domain_contact_account_id.map(SqlValue::Integer),
        );
        push(
            "domain_contact_reference",
            form.domain_contact_reference.clone().map(SqlValue::Text),
        );
        push("domain_contact_name", form.domain_contact_name.clone().map(SqlValue::Text));
        push("domain_contact_email", form.domain_contact_email.clone().map(SqlValue::Text));
        push(
            "domain_contact_auto_notify",
            form.domain_contact_auto_notify.map(|b| SqlValue::Integer(b.into())),
        );

        let conn = self.conn.lock().await;
        if !sets.is_empty() {
            let assignments: Vec<String> = sets
                .iter()
                .enumerate()
                .map(|(i, column)| format!("{column} = ?{}", i + 1))
                .collect();
            values.push(SqlValue::Text(now_timestamp()));
            values.push(SqlValue::Integer(id));
            let sql = format!(
                "UPDATE tickets SET {}, updated_at = ?{} WHERE id = ?{}",
                assignments.join(", "),
                values.len() - 1,
                values.len()
            );
            conn.execute(&sql, params_from_iter(values.iter()))?;
        }
        find_ticket(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))
    }

    pub async fn set_status(&self, id: i64, status: TicketStatus) -> StoreResult<Ticket> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE tickets SET status_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_timestamp(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("ticket {id}")));
        }
        find_ticket(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))
    }

    /// Overwrite one side's contact columns. `None` clears them.
    pub async fn set_contact(
        &self,
        id: i64,
        kind: ContactKind,
        contact: Option<&Contact>,
    ) -> StoreResult<Ticket> {
        let prefix = kind.as_str();
        let sql = format!(
            "UPDATE tickets SET {prefix}_contact_account_id = ?1, {prefix}_contact_reference = ?2,
                {prefix}_contact_name = ?3, {prefix}_contact_email = ?4,
                {prefix}_contact_auto_notify = ?5, updated_at = ?6
             WHERE id = ?7"
        );
        let conn = self.conn.lock().await;
        conn.execute(
            &sql,
            params![
                contact.and_then(|c| c.account_id),
                contact.map(|c| c.reference.clone()),
                contact.map(|c| c.name.clone()),
                contact.and_then(|c| c.email.clone()),
                contact.map_or(false, |c| c.auto_notify),
                now_timestamp(),
                id,
            ],
        )?;
        find_ticket(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))
    }

    /// Book a delivered notification on the ticket.
    pub async fn record_notification(
        &self,
        id: i64,
        kind: ContactKind,
        event_count: i64,
    ) -> StoreResult<()> {
        let prefix = kind.as_str();
        let sql = format!(
            "UPDATE tickets SET {prefix}_contact_notified_count = {prefix}_contact_notified_count + 1,
                last_notify_count = ?1, last_notify_timestamp = ?2, updated_at = ?2
             WHERE id = ?3"
        );
        let conn = self.conn.lock().await;
        conn.execute(&sql, params![event_count, now_timestamp(), id])?;
        Ok(())
    }

    pub async fn add_event(
        &self,
        ticket_id: i64,
        source: &str,
        timestamp: i64,
        information: &Value,
    ) -> StoreResult<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO events (ticket_id, source, timestamp, information) VALUES (?1, ?2, ?3, ?4)",
            params![ticket_id, source, timestamp, information.to_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub async fn add_note(
        &self,
        ticket_id: i64,
        submitter: &str,
        text: &str,
        viewed: bool,
    ) -> StoreResult<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO notes (ticket_id, submitter, text, viewed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![ticket_id, submitter, text, viewed, now_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Unix timestamps of the first and last event of a ticket.
    pub async fn event_seen_range(&self, ticket_id: i64) -> StoreResult<Option<(i64, i64)>> {
        let conn = self.conn.lock().await;
        let range = conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM events WHERE ticket_id = ?1",
            [ticket_id],
            |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
        )?;
        Ok(match range {
            (Some(first), Some(last)) => Some((first, last)),
            _ => None,
        })
    }

    /// Rows for the admin table: event counts and unviewed note counts,
    /// optionally restricted to one contact account.
    pub async fn table_rows(&self, account_id: Option<i64>) -> StoreResult<Vec<TableRow>> {
        let mut sql = String::from(
            "SELECT t.id, t.ip, t.domain, t.type_id, t.class_id, t.status_id,
                t.ip_contact_account_id, t.ip_contact_reference, t.ip_contact_name,
                t.domain_contact_account_id, t.domain_contact_reference, t.domain_contact_name,
                COUNT(DISTINCT e.id) AS event_count,
                COUNT(DISTINCT n.id) AS notes_count
             FROM tickets t
             LEFT JOIN events e ON e.ticket_id = t.id
             LEFT JOIN notes n ON n.ticket_id = t.id AND n.viewed = 0",
        );
        if account_id.is_some() {
            sql.push_str(
                " WHERE (t.ip_contact_account_id = ?1 OR t.domain_contact_account_id = ?1)",
            );
        }
        sql.push_str(" GROUP BY t.id ORDER BY t.id");

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&sql)?;
        let rows = match account_id {
            Some(id) => stmt.query_map([id], TableRow::from_row)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], TableRow::from_row)?.collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }
}

fn find_ticket(conn: &Connection, id: i64) -> StoreResult<Option<Ticket>> {
    let sql = format!("{SELECT_TICKETS} WHERE t.id = ?1");
    conn.query_row(&sql, [id], Ticket::from_row)
        .optional()
        .map_err(StoreError::from)
}

/// Translate pushdown criteria into a `WHERE` clause with bound values.
fn build_where(criteria: &[Criterion]) -> StoreResult<(String, Vec<SqlValue>)> {
    let mut predicates = Vec::with_capacity(criteria.len());
    let mut values = Vec::with_capacity(criteria.len());

    for (i, c) in criteria.iter().enumerate() {
        let column = TICKET_COLUMNS
            .iter()
            .find(|col| **col == c.column)
            .ok_or_else(|| StoreError::UnknownColumn(c.column.clone()))?;
        let op = c
            .operator
            .as_sql()
            .ok_or_else(|| StoreError::UnsupportedOperator(c.operator.to_string()))?;
        predicates.push(format!("t.{column} {op} ?{}", i + 1));
        values.push(sql_value(&c.column, &c.value)?);
    }

    if predicates.is_empty() {
        Ok((String::new(), values))
    } else {
        Ok((format!(" WHERE {}", predicates.join(" AND ")), values))
    }
}

fn sql_value(column: &str, v: &Value) -> StoreResult<SqlValue> {
    match v {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer((*b).into())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Integer(i)),
            None => Ok(SqlValue::Real(n.as_f64().unwrap_or(0.0))),
        },
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(StoreError::UnsupportedValue {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}
