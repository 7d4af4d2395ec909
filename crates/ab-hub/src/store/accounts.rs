//! Accounts and the brands they are shown under.

use super::{StoreError, StoreResult, TicketStore};
use ab_core::AccountUpdate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub disabled: bool,
    pub systemaccount: bool,
    pub brand_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Brand {
    pub id: i64,
    pub name: String,
    pub company_name: String,
}

impl Account {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            disabled: row.get(3)?,
            systemaccount: row.get(4)?,
            brand_id: row.get(5)?,
        })
    }

    pub fn is_system_account(&self) -> bool {
        self.systemaccount
    }
}

const SELECT_ACCOUNTS: &str =
    "SELECT id, name, description, disabled, systemaccount, brand_id FROM accounts";

impl TicketStore {
    pub async fn create_brand(&self, name: &str, company_name: &str) -> StoreResult<Brand> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO brands (name, company_name) VALUES (?1, ?2)",
            params![name, company_name],
        )?;
        Ok(Brand {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            company_name: company_name.to_string(),
        })
    }

    pub async fn brand_exists(&self, id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let found = conn
            .query_row("SELECT 1 FROM brands WHERE id = ?1", [id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub async fn create_account(
        &self,
        name: &str,
        brand_id: i64,
        systemaccount: bool,
    ) -> StoreResult<Account> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO accounts (name, brand_id, systemaccount) VALUES (?1, ?2, ?3)",
            params![name, brand_id, systemaccount],
        )?;
        let id = conn.last_insert_rowid();
        find_account(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("account {id}")))
    }

    pub async fn find_account(&self, id: i64) -> StoreResult<Option<Account>> {
        let conn = self.conn.lock().await;
        find_account(&conn, id)
    }

    pub async fn system_account(&self) -> StoreResult<Option<Account>> {
        let conn = self.conn.lock().await;
        let sql = format!("{SELECT_ACCOUNTS} WHERE systemaccount = 1 ORDER BY id LIMIT 1");
        conn.query_row(&sql, [], Account::from_row)
            .optional()
            .map_err(StoreError::from)
    }

    /// Whether another account than `except_id` already uses `name`.
    pub async fn account_name_taken(&self, name: &str, except_id: i64) -> StoreResult<bool> {
        let conn = self.conn.lock().await;
        let found = conn
            .query_row(
                "SELECT 1 FROM accounts WHERE name = ?1 AND id <> ?2",
                params![name, except_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub async fn update_account(&self, id: i64, update: &AccountUpdate) -> StoreResult<Account> {
        let conn = self.conn.lock().await;
        let current =
            find_account(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        conn.execute(
            "UPDATE accounts SET name = ?1, brand_id = ?2, disabled = ?3 WHERE id = ?4",
            params![
                update
                    .name
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or(current.name.as_str()),
                update.brand_id.unwrap_or(current.brand_id),
                update.disabled.unwrap_or(current.disabled),
                id,
            ],
        )?;
        find_account(&conn, id)?.ok_or_else(|| StoreError::NotFound(format!("account {id}")))
    }
}

fn find_account(conn: &Connection, id: i64) -> StoreResult<Option<Account>> {
    let sql = format!("{SELECT_ACCOUNTS} WHERE id = ?1");
    conn.query_row(&sql, [id], Account::from_row)
        .optional()
        .map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_account_lifecycle() {
        let store = TicketStore::open_in_memory().unwrap();
        let brand = store.create_brand("Default", "ISP Inc").await.unwrap();
        let system = store.create_account("System", brand.id, true).await.unwrap();
        let customer = store.create_account("Customer", brand.id, false).await.unwrap();

        assert_eq!(store.system_account().await.unwrap(), Some(system.clone()));
        assert!(store.account_name_taken("System", customer.id).await.unwrap());
        assert!(!store.account_name_taken("System", system.id).await.unwrap());

        let update = AccountUpdate {
            name: Some(" Renamed ".into()),
            disabled: Some(true),
            ..Default::default()
        };
        let updated = store.update_account(customer.id, &update).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        assert!(updated.disabled);
        assert_eq!(updated.brand_id, brand.id);
    }

    #[tokio::test]
    async fn test_brand_exists() {
        let store = TicketStore::open_in_memory().unwrap();
        let brand = store.create_brand("Default", "ISP Inc").await.unwrap();
        assert!(store.brand_exists(brand.id).await.unwrap());
        assert!(!store.brand_exists(brand.id + 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_account() {
        let store = TicketStore::open_in_memory().unwrap();
        let err = store
            .update_account(9, &AccountUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
