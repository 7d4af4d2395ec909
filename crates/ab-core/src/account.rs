//! # Account Edits
//!
//! The fields an operator may change on an account and the rules that
//! do not need the database. Uniqueness and brand existence are checked
//! by the hub against the store.

use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_ACCOUNT_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("account name must not be empty")]
    EmptyName,

    #[error("account name may not exceed {MAX_ACCOUNT_NAME_LEN} characters")]
    NameTooLong,

    #[error("account name '{0}' is already taken")]
    NameTaken(String),

    #[error("brand {0} does not exist")]
    UnknownBrand(i64),

    #[error("the system account cannot be disabled")]
    SystemAccountDisabled,

    #[error("'{0}' is not a valid flag, expected true or false")]
    InvalidFlag(String),

    #[error("nothing to update")]
    NothingToUpdate,
}

/// Partial update of an account. Absent fields stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<i64>,
    #[serde(
        default,
        deserialize_with = "deserialize_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub disabled: Option<bool>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.brand_id.is_none() && self.disabled.is_none()
    }

    /// Rules that hold regardless of what is stored.
    pub fn check(&self, is_system_account: bool) -> Result<(), AccountError> {
        if self.is_empty() {
            return Err(AccountError::NothingToUpdate);
        }
        if let Some(name) = &self.name {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(AccountError::EmptyName);
            }
            if trimmed.chars().count() > MAX_ACCOUNT_NAME_LEN {
                return Err(AccountError::NameTooLong);
            }
        }
        if is_system_account && self.disabled == Some(true) {
            return Err(AccountError::SystemAccountDisabled);
        }
        Ok(())
    }
}

/// Parse the `true|false` flag accepted on the command line.
pub fn parse_flag(raw: &str) -> Result<bool, AccountError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(AccountError::InvalidFlag(raw.to_string())),
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Int(0)) => Ok(Some(false)),
        Some(Flag::Int(1)) => Ok(Some(true)),
        Some(Flag::Int(n)) => Err(serde::de::Error::custom(AccountError::InvalidFlag(
            n.to_string(),
        ))),
        Some(Flag::Text(s)) => parse_flag(&s).map(Some).map_err(serde::de::Error::custom),
    }
}
