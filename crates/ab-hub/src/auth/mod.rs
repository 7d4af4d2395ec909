//! # Keys & Audit
//!
//! Every request to `/api` carries a bearer key. A key belongs to exactly
//! one account and grants `read`, `write` or `admin`; the middleware turns
//! it into a [`Caller`]. Only the SHA-256 of a key is kept, the raw value
//! leaves the hub once, in the response that created it.
//!
//! Key changes, status changes, notifications and account edits land in a
//! bounded in-memory audit trail.

use crate::store::Account;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub label: String,
    /// Raw key, set only on the value returned at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub key_hash: String,
    pub account_id: i64,
    pub scopes: Vec<Scope>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub revoked: bool,
}

impl ApiKey {
    fn redacted(&self) -> Self {
        Self {
            key: None,
            ..self.clone()
        }
    }

    /// `admin` grants everything.
    pub fn allows(&self, required: &Scope) -> bool {
        self.scopes.contains(&Scope::Admin) || self.scopes.contains(required)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub detail: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKeyRequest {
    pub label: String,
    pub account_id: i64,
    pub scopes: Vec<Scope>,
}

/// The authenticated side of a request, placed in the request extensions
/// by the auth middleware.
#[derive(Debug, Clone)]
pub struct Caller {
    pub key: ApiKey,
    pub account: Account,
}

impl Caller {
    pub fn is_system(&self) -> bool {
        self.account.is_system_account()
    }

    /// Name written to the audit log.
    pub fn actor(&self) -> String {
        format!("{}:{}", self.account.name, self.key.id)
    }
}

/// Key ring and audit trail shared by the middleware and the key handlers.
pub struct AuthLayer {
    /// Keyed by `key_hash`.
    keys: RwLock<HashMap<String, ApiKey>>,
    audit: RwLock<VecDeque<AuditEntry>>,
    audit_capacity: usize,
}

impl AuthLayer {
    pub fn new(audit_capacity: usize) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            audit: RwLock::new(VecDeque::with_capacity(audit_capacity)),
            audit_capacity,
        }
    }

    /// Mint a random `ab_` key. The returned value is the only copy of the
    /// raw key.
    pub async fn create_key(&self, req: CreateApiKeyRequest) -> ApiKey {
        let raw_key = format!("ab_{}", uuid::Uuid::new_v4().as_simple());
        self.register_key(raw_key, req).await
    }

    /// Store a key whose raw value is chosen by the operator, e.g. the
    /// configured bootstrap key of the system account.
    pub async fn register_key(&self, raw_key: String, req: CreateApiKeyRequest) -> ApiKey {
        let key_hash = sha256_hex(&raw_key);
        let api_key = ApiKey {
            id: format!("key-{}", uuid::Uuid::new_v4().as_simple()),
            label: req.label,
            key_hash: key_hash.clone(),
            key: Some(raw_key),
            account_id: req.account_id,
            scopes: req.scopes,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used_at: None,
            revoked: false,
        };
        self.keys.write().await.insert(key_hash, api_key.redacted());

        self.log_audit(
            "system".into(),
            "create_key".into(),
            format!("api_key:{}", api_key.id),
            format!("'{}' for account {}", api_key.label, api_key.account_id),
        )
        .await;
        api_key
    }

    pub async fn revoke_key(&self, key_id: &str) -> Result<(), String> {
        let mut keys = self.keys.write().await;
        let key = keys
            .values_mut()
            .find(|k| k.id == key_id)
            .ok_or_else(|| format!("Key '{}' not found", key_id))?;
        key.revoked = true;
        Ok(())
    }

    /// All keys, oldest first, never with raw values.
    pub async fn list_keys(&self) -> Vec<ApiKey> {
        let mut keys: Vec<ApiKey> = self.keys.read().await.values().cloned().collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        keys
    }

    /// Key for a bearer token, unless unknown or revoked. Marks it used.
    pub async fn validate_token(&self, token: &str) -> Option<ApiKey> {
        let mut keys = self.keys.write().await;
        let key = keys.get_mut(&sha256_hex(token)).filter(|k| !k.revoked)?;
        key.last_used_at = Some(chrono::Utc::now().to_rfc3339());
        Some(key.clone())
    }

    pub fn has_scope(&self, key: &ApiKey, required: Scope) -> bool {
        key.allows(&required)
    }

    pub async fn log_audit(&self, actor: String, action: String, resource: String, detail: String) {
        tracing::info!(%actor, %action, %resource, "audit");
        let entry = AuditEntry {
            id: format!("audit-{}", uuid::Uuid::new_v4().as_simple()),
            timestamp: chrono::Utc::now().to_rfc3339(),
            actor,
            action,
            resource,
            detail,
        };

        let mut audit = self.audit.write().await;
        if audit.len() >= self.audit_capacity {
            audit.pop_front();
        }
        audit.push_back(entry);
    }

    /// Newest first.
    pub async fn get_audit_log(&self, limit: usize) -> Vec<AuditEntry> {
        let audit = self.audit.read().await;
        audit.iter().rev().take(limit).cloned().collect()
    }
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scopes: Vec<Scope>) -> CreateApiKeyRequest {
        CreateApiKeyRequest {
            label: "test".into(),
            account_id: 1,
            scopes,
        }
    }

    #[tokio::test]
    async fn test_key_roundtrip_and_revoke() {
        let auth = AuthLayer::new(10);
        let created = auth.create_key(request(vec![Scope::Read])).await;
        let raw = created.key.clone().unwrap();
        assert!(raw.starts_with("ab_"));

        let found = auth.validate_token(&raw).await.unwrap();
        assert_eq!(found.account_id, 1);
        assert!(found.key.is_none());
        assert!(auth.has_scope(&found, Scope::Read));
        assert!(!auth.has_scope(&found, Scope::Write));

        auth.revoke_key(&created.id).await.unwrap();
        assert!(auth.validate_token(&raw).await.is_none());
        assert!(auth.revoke_key("key-missing").await.is_err());
    }

    #[tokio::test]
    async fn test_admin_implies_every_scope() {
        let auth = AuthLayer::new(10);
        let key = auth
            .register_key("fixed-key".into(), request(vec![Scope::Admin]))
            .await;
        assert!(auth.has_scope(&key, Scope::Write));
        assert!(auth.validate_token("fixed-key").await.is_some());
        assert!(auth.validate_token("other-key").await.is_none());
    }

    #[tokio::test]
    async fn test_audit_log_is_bounded_and_newest_first() {
        let auth = AuthLayer::new(2);
        for n in 0..3 {
            auth.log_audit("me".into(), format!("act{n}"), "r".into(), String::new())
                .await;
        }
        let log = auth.get_audit_log(10).await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, "act2");
        assert_eq!(log[1].action, "act1");
    }

    #[tokio::test]
    async fn test_list_hides_raw_keys() {
        let auth = AuthLayer::new(10);
        auth.create_key(request(vec![Scope::Read])).await;
        auth.create_key(request(vec![Scope::Write])).await;
        let keys = auth.list_keys().await;
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.key.is_none()));
    }

    #[tokio::test]
    async fn test_audit_records_key_creation() {
        let auth = AuthLayer::new(10);
        let key = auth.create_key(request(vec![Scope::Read])).await;
        let log = auth.get_audit_log(1).await;
        assert_eq!(log[0].action, "create_key");
        assert_eq!(log[0].resource, format!("api_key:{}", key.id));
        assert_eq!(log[0].detail, "'test' for account 1");
    }
}
