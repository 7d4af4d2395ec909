//! Account edits: the rules from `ab_core::AccountUpdate` plus the checks
//! that need the store (unique names, existing brands).

use crate::error::{ApiError, ApiResult};
use crate::store::{Account, TicketStore};
use ab_core::{AccountError, AccountUpdate};

pub async fn find(store: &TicketStore, id: i64) -> ApiResult<Account> {
    store
        .find_account(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("account {id} not found")))
}

pub async fn edit(store: &TicketStore, id: i64, update: &AccountUpdate) -> ApiResult<Account> {
    let account = find(store, id).await?;
    update.check(account.is_system_account())?;

    if let Some(name) = &update.name {
        let name = name.trim();
        if store.account_name_taken(name, id).await? {
            return Err(AccountError::NameTaken(name.to_string()).into());
        }
    }
    if let Some(brand_id) = update.brand_id {
        if !store.brand_exists(brand_id).await? {
            return Err(AccountError::UnknownBrand(brand_id).into());
        }
    }

    let updated = store.update_account(id, update).await?;
    tracing::info!(
        account = id,
        name = %updated.name,
        brand = updated.brand_id,
        disabled = updated.disabled,
        "account updated"
    );
    Ok(updated)
}
