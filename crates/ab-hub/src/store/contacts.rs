//! Contacts and how tickets find them: netblocks for IP addresses,
//! domain entries for domains.

use super::{StoreError, StoreResult, TicketStore};
use rusqlite::{params, Row};
use serde::Serialize;
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub id: i64,
    pub reference: String,
    pub name: String,
    pub email: Option<String>,
    pub auto_notify: bool,
    pub enabled: bool,
    pub account_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Netblock {
    pub id: i64,
    pub contact_id: i64,
    pub first_ip: String,
    pub last_ip: String,
    pub description: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Domain {
    pub id: i64,
    pub contact_id: i64,
    pub name: String,
    pub enabled: bool,
}

/// Fields of a new contact.
#[derive(Debug, Clone, Default)]
pub struct NewContact<'a> {
    pub reference: &'a str,
    pub name: &'a str,
    pub email: Option<&'a str>,
    pub auto_notify: bool,
    pub account_id: Option<i64>,
}

impl Contact {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            reference: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            auto_notify: row.get(4)?,
            enabled: row.get(5)?,
            account_id: row.get(6)?,
        })
    }
}

/// Position of an address on one line: IPv4 is mapped into the IPv6
/// space so both families order consistently.
fn ip_key(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(v4.to_ipv6_mapped()),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

impl TicketStore {
    pub async fn create_contact(&self, new: NewContact<'_>) -> StoreResult<Contact> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO contacts (reference, name, email, auto_notify, account_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![new.reference, new.name, new.email, new.auto_notify, new.account_id],
        )?;
        Ok(Contact {
            id: conn.last_insert_rowid(),
            reference: new.reference.to_string(),
            name: new.name.to_string(),
            email: new.email.map(str::to_string),
            auto_notify: new.auto_notify,
            enabled: true,
            account_id: new.account_id,
        })
    }

    pub async fn create_netblock(
        &self,
        contact_id: i64,
        first_ip: IpAddr,
        last_ip: IpAddr,
        description: &str,
        enabled: bool,
    ) -> StoreResult<Netblock> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO netblocks (contact_id, first_ip, last_ip, description, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                contact_id,
                first_ip.to_string(),
                last_ip.to_string(),
                description,
                enabled
            ],
        )?;
        Ok(Netblock {
            id: conn.last_insert_rowid(),
            contact_id,
            first_ip: first_ip.to_string(),
            last_ip: last_ip.to_string(),
            description: description.to_string(),
            enabled,
        })
    }

    pub async fn create_domain(&self, contact_id: i64, name: &str) -> StoreResult<Domain> {
        let conn = self.conn.lock().await;
        let name = name.trim().to_ascii_lowercase();
        conn.execute(
            "INSERT INTO domains (contact_id, name) VALUES (?1, ?2)",
            params![contact_id, name],
        )?;
        Ok(Domain {
            id: conn.last_insert_rowid(),
            contact_id,
            name,
            enabled: true,
        })
    }

    /// Owner of the narrowest enabled netblock containing `ip`.
    pub async fn contact_for_ip(&self, ip: IpAddr) -> StoreResult<Option<Contact>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.reference, c.name, c.email, c.auto_notify, c.enabled, c.account_id,
                    n.first_ip, n.last_ip
             FROM netblocks n JOIN contacts c ON c.id = n.contact_id
             WHERE n.enabled = 1 AND c.enabled = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                Contact::from_row(row)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?;

        let target = ip_key(ip);
        let mut best: Option<(u128, Contact)> = None;
        for row in rows {
            let (contact, first, last) = row?;
            let (Ok(first), Ok(last)) = (first.parse::<IpAddr>(), last.parse::<IpAddr>()) else {
                tracing::warn!(contact = contact.id, "skipping netblock with unparsable bounds");
                continue;
            };
            let (lo, hi) = (ip_key(first), ip_key(last));
            if lo <= target && target <= hi {
                let width = hi - lo;
                if best.as_ref().map_or(true, |(w, _)| width < *w) {
                    best = Some((width, contact));
                }
            }
        }
        Ok(best.map(|(_, contact)| contact))
    }

    /// Owner of the most specific enabled domain entry for `domain`:
    /// an exact match or the longest registered parent domain.
    pub async fn contact_for_domain(&self, domain: &str) -> StoreResult<Option<Contact>> {
        let wanted = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }

        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.reference, c.name, c.email, c.auto_notify, c.enabled, c.account_id,
                    d.name
             FROM domains d JOIN contacts c ON c.id = d.contact_id
             WHERE d.enabled = 1 AND c.enabled = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((Contact::from_row(row)?, row.get::<_, String>(7)?))
        })?;

        let mut best: Option<(usize, Contact)> = None;
        for row in rows {
            let (contact, name) = row?;
            let matches = wanted == name || wanted.ends_with(&format!(".{name}"));
            if matches && best.as_ref().map_or(true, |(len, _)| name.len() > *len) {
                best = Some((name.len(), contact));
            }
        }
        Ok(best.map(|(_, contact)| contact))
    }

    pub async fn find_contact(&self, id: i64) -> StoreResult<Contact> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, reference, name, email, auto_notify, enabled, account_id
             FROM contacts WHERE id = ?1",
            [id],
            Contact::from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("contact {id}")),
            other => StoreError::from(other),
        })
    }
}
