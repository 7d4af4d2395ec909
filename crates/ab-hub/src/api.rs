//! # API Handlers
//!
//! Axum handlers for tickets, accounts and key management. Every handler
//! behind the auth middleware receives the [`Caller`] as an extension.

use crate::auth::{ApiKey, AuditEntry, Caller, CreateApiKeyRequest};
use crate::error::{ApiError, ApiResult};
use crate::notify::{build_list, walk_list};
use crate::query::{executor, parser};
use crate::store::{Account, TicketForm};
use crate::tickets::export::{self, ExportFormat, EXPORT_FILENAME};
use crate::transform::{Envelope, Meta, TableItem, TicketItem, TicketTransformer};
use crate::{accounts, tickets, AppState};
use ab_core::{AccountUpdate, ContactKind};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

type Item = Json<Envelope<TicketItem>>;
type Collection = Json<Envelope<Vec<TicketItem>>>;

#[derive(Debug, Deserialize)]
pub struct OnlyParams {
    only: Option<String>,
}

impl OnlyParams {
    fn kind(&self) -> ApiResult<Option<ContactKind>> {
        match self.only.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => Ok(Some(raw.parse()?)),
        }
    }
}

fn json_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Faulty JSON request: {e}")))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// =============================================================================
// Tickets
// =============================================================================

pub async fn search_tickets(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> ApiResult<Collection> {
    let query = parser::parse(&body)?;
    let scope = (!caller.is_system()).then_some(caller.account.id);
    let tickets = executor::execute(&query, &state.store, scope).await?;
    Ok(Json(TicketTransformer::collection(&tickets)))
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Collection> {
    let tickets = tickets::visible_tickets(&state.store, &caller).await?;
    Ok(Json(TicketTransformer::collection(&tickets)))
}

pub async fn show_ticket(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> ApiResult<Item> {
    let ticket = tickets::load(&state.store, &caller, id).await?;
    Ok(Json(TicketTransformer::item(&ticket)))
}

pub async fn store_ticket(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> ApiResult<(StatusCode, Item)> {
    let form: TicketForm = json_body(&body)?;
    tickets::validate_form(&form, true)?;
    let form = tickets::normalize_form(form);

    let mut ticket = state.store.create_ticket(&form).await?;
    let unresolved = match (
        form.ip_contact_reference.is_none(),
        form.domain_contact_reference.is_none() && form.domain.is_some(),
    ) {
        (true, true) => Some(None),
        (true, false) => Some(Some(ContactKind::Ip)),
        (false, true) => Some(Some(ContactKind::Domain)),
        (false, false) => None,
    };
    if let Some(only) = unresolved {
        ticket = tickets::update_contacts(&state.store, &ticket, only).await?;
    }

    state
        .auth_layer
        .log_audit(
            caller.actor(),
            "ticket_create".into(),
            format!("ticket:{}", ticket.id),
            format!("{} {}", ticket.class_id, ticket.ip),
        )
        .await;
    Ok((StatusCode::CREATED, Json(TicketTransformer::item(&ticket))))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Item> {
    let form: TicketForm = json_body(&body)?;
    tickets::validate_form(&form, false)?;
    let ticket = tickets::load(&state.store, &caller, id).await?;
    let updated = state
        .store
        .update_ticket(ticket.id, &tickets::normalize_form(form))
        .await?;
    Ok(Json(TicketTransformer::item(&updated)))
}

pub async fn set_ticket_status(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path((id, status)): Path<(i64, String)>,
) -> ApiResult<Item> {
    let ticket = tickets::load(&state.store, &caller, id).await?;
    let updated = tickets::change_status(&state.store, &ticket, &status).await?;
    state
        .auth_layer
        .log_audit(
            caller.actor(),
            "ticket_status".into(),
            format!("ticket:{id}"),
            format!("{} -> {}", ticket.status_id, updated.status_id),
        )
        .await;
    Ok(Json(TicketTransformer::item(&updated)))
}

pub async fn update_ticket_contacts(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Query(params): Query<OnlyParams>,
) -> ApiResult<Item> {
    let only = params.kind()?;
    let ticket = tickets::load(&state.store, &caller, id).await?;
    let updated = tickets::update_contacts(&state.store, &ticket, only).await?;
    Ok(Json(TicketTransformer::item(&updated)))
}

pub async fn notify_ticket(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Query(params): Query<OnlyParams>,
) -> ApiResult<Item> {
    let only = params.kind()?;
    if !state.config.notifications.enabled {
        return Err(ApiError::BadRequest("notifications are disabled".into()));
    }
    let ticket = tickets::load(&state.store, &caller, id).await?;

    let list = build_list(&ticket, true, only);
    let report = walk_list(state.notifier.as_ref(), &state.store, &list).await?;
    state
        .auth_layer
        .log_audit(
            caller.actor(),
            "ticket_notify".into(),
            format!("ticket:{id}"),
            format!("{} delivered, {} failed", report.delivered, report.failed),
        )
        .await;

    let refreshed = state
        .store
        .find_ticket(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ticket {id} not found")))?;
    Ok(Json(TicketTransformer::item(&refreshed)))
}

pub async fn ticket_table(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Envelope<Vec<TableItem>>>> {
    let scope = (!caller.is_system()).then_some(caller.account.id);
    let rows = state.store.table_rows(scope).await?;
    Ok(Json(Envelope::new(rows.into_iter().map(TableItem::from).collect())))
}

pub async fn ticket_meta() -> Json<Meta> {
    Json(Meta::build())
}

pub async fn export_tickets(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(format): Path<String>,
) -> ApiResult<Response> {
    let format = ExportFormat::parse(&format)?;
    let mut visible = tickets::visible_tickets(&state.store, &caller).await?;
    visible.truncate(state.config.server.max_limit);
    let body = export::tickets_csv(&state.store, &visible).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        body,
    )
        .into_response())
}

// =============================================================================
// Accounts
// =============================================================================

pub async fn show_account(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Envelope<Account>>> {
    if !caller.is_system() && caller.account.id != id {
        return Err(ApiError::Forbidden(format!("account {id} is not yours")));
    }
    let account = accounts::find(&state.store, id).await?;
    Ok(Json(Envelope::new(account)))
}

pub async fn edit_account(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    body: Bytes,
) -> ApiResult<Json<Envelope<Account>>> {
    let update: AccountUpdate = json_body(&body)?;
    let account = accounts::edit(&state.store, id, &update).await?;
    state
        .auth_layer
        .log_audit(
            caller.actor(),
            "account_edit".into(),
            format!("account:{id}"),
            serde_json::to_string(&update).unwrap_or_default(),
        )
        .await;
    Ok(Json(Envelope::new(account)))
}

// =============================================================================
// Auth
// =============================================================================

pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiKey>)> {
    let req: CreateApiKeyRequest = json_body(&body)?;
    accounts::find(&state.store, req.account_id).await?;
    let key = state.auth_layer.create_key(req).await;
    Ok((StatusCode::CREATED, Json(key)))
}

pub async fn list_api_keys(State(state): State<Arc<AppState>>) -> Json<Vec<ApiKey>> {
    let keys = state.auth_layer.list_keys().await;
    Json(keys)
}

pub async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .auth_layer
        .revoke_key(&id)
        .await
        .map_err(ApiError::NotFound)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_audit_log(State(state): State<Arc<AppState>>) -> Json<Vec<AuditEntry>> {
    let log = state.auth_layer.get_audit_log(100).await;
    Json(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Scope;
    use crate::store::contacts::NewContact;
    use crate::store::TicketStore;
    use crate::{build_router, Config};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SYSTEM_KEY: &str = "system-key";

    struct Fixture {
        state: Arc<AppState>,
        customer_key: String,
        customer_id: i64,
    }

    /// Four tickets: 1, 3 and 4 belong to the customer, 2 to nobody.
    /// Event counts are 10, 2, 7 and 9.
    async fn fixture() -> Fixture {
        let mut config = Config::default();
        config.auth.bootstrap_key = Some(SYSTEM_KEY.into());
        let state = Arc::new(AppState::new(TicketStore::open_in_memory().unwrap(), config));
        state.bootstrap(None).await.unwrap();

        let system = state.store.system_account().await.unwrap().unwrap();
        let customer = state
            .store
            .create_account("Customer", system.brand_id, false)
            .await
            .unwrap();
        let contact = state
            .store
            .create_contact(NewContact {
                reference: "CUST",
                name: "Customer",
                email: Some("noc@customer.example"),
                auto_notify: false,
                account_id: Some(customer.id),
            })
            .await
            .unwrap();
        state
            .store
            .create_netblock(
                contact.id,
                "10.9.0.0".parse().unwrap(),
                "10.9.0.255".parse().unwrap(),
                "customer range",
                true,
            )
            .await
            .unwrap();

        for (n, (owned, events)) in [(true, 10), (false, 2), (true, 7), (true, 9)].into_iter().enumerate() {
            let form = TicketForm {
                ip: Some(format!("10.0.0.{}", n + 1)),
                class_id: Some("SPAM".into()),
                type_id: Some("ABUSE".into()),
                ip_contact_account_id: owned.then_some(customer.id),
                ip_contact_reference: owned.then(|| "CUST".to_string()),
                ip_contact_email: owned.then(|| "noc@customer.example".to_string()),
                ..Default::default()
            };
            let ticket = state.store.create_ticket(&form).await.unwrap();
            for ts in 0..events {
                state
                    .store
                    .add_event(ticket.id, "spamcop", 1_700_000_000 + ts, &json!({}))
                    .await
                    .unwrap();
            }
        }

        let key = state
            .auth_layer
            .create_key(CreateApiKeyRequest {
                label: "customer".into(),
                account_id: customer.id,
                scopes: vec![Scope::Read, Scope::Write],
            })
            .await;

        Fixture {
            state,
            customer_key: key.key.unwrap(),
            customer_id: customer.id,
        }
    }

    async fn send(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        key: Option<&str>,
        body: &str,
    ) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            req = req.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        let req = req.body(Body::from(body.to_string())).unwrap();
        let response = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes.to_vec())
    }

    async fn send_json(
        state: &Arc<AppState>,
        method: Method,
        uri: &str,
        key: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = send(state, method, uri, key, body).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn ids(body: &Value) -> Vec<i64> {
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_health_is_public_and_api_needs_a_key() {
        let f = fixture().await;
        let (status, body) = send_json(&f.state, Method::GET, "/api/health", None, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send_json(&f.state, Method::GET, "/api/tickets", None, "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");

        let (status, _) =
            send_json(&f.state, Method::GET, "/api/tickets", Some("wrong"), "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_search_filters_sorts_and_limits() {
        let f = fixture().await;
        let body = r#"{"criteria":[{"column":"event_count","operator":">","value":5}],
                       "orderby":"event_count","limit":"2"}"#;
        let (status, result) = send_json(
            &f.state,
            Method::POST,
            "/api/tickets/search",
            Some(SYSTEM_KEY),
            body,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&result), vec![3, 4]);
        assert_eq!(result["data"][0]["event_count"], 7);
    }

    #[tokio::test]
    async fn test_search_pushdown_and_empty_query() {
        let f = fixture().await;
        let body = r#"{"criteria":[{"column":"id","operator":">","value":2}],"orderby":"ip"}"#;
        let (_, result) = send_json(
            &f.state,
            Method::POST,
            "/api/tickets/search",
            Some(SYSTEM_KEY),
            body,
        )
        .await;
        assert_eq!(ids(&result), vec![3, 4]);

        let (_, result) = send_json(
            &f.state,
            Method::POST,
            "/api/tickets/search",
            Some(SYSTEM_KEY),
            "{}",
        )
        .await;
        assert_eq!(ids(&result), vec![1, 2, 3, 4]);

        let (_, result) = send_json(
            &f.state,
            Method::POST,
            "/api/tickets/search",
            Some(&f.customer_key),
            "{}",
        )
        .await;
        assert_eq!(ids(&result), vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_search_errors() {
        let f = fixture().await;
        let cases = [
            ("{not json", StatusCode::BAD_REQUEST, "malformed_request"),
            (r#"{"limit":-1}"#, StatusCode::BAD_REQUEST, "malformed_request"),
            (
                r#"{"criteria":[{"column":"ip"}]}"#,
                StatusCode::BAD_REQUEST,
                "invalid_criterion",
            ),
            (
                r#"{"criteria":[{"column":"secret","value":1}]}"#,
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_query_failed",
            ),
        ];
        for (body, expected, code) in cases {
            let (status, result) = send_json(
                &f.state,
                Method::POST,
                "/api/tickets/search",
                Some(SYSTEM_KEY),
                body,
            )
            .await;
            assert_eq!(status, expected, "{body}");
            assert_eq!(result["error"]["code"], code);
            assert_eq!(result["error"]["http_code"], expected.as_u16());
        }
    }

    #[tokio::test]
    async fn test_ticket_access_per_account() {
        let f = fixture().await;
        let key = Some(f.customer_key.as_str());
        let (status, body) = send_json(&f.state, Method::GET, "/api/tickets/1", key, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ip_contact"]["account_id"], f.customer_id);

        let (status, _) = send_json(&f.state, Method::GET, "/api/tickets/2", key, "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) =
            send_json(&f.state, Method::GET, "/api/tickets/2", Some(SYSTEM_KEY), "").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) =
            send_json(&f.state, Method::GET, "/api/tickets/99", Some(SYSTEM_KEY), "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send_json(&f.state, Method::GET, "/api/tickets", key, "").await;
        assert_eq!(ids(&body), vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_status_changes() {
        let f = fixture().await;
        let key = Some(f.customer_key.as_str());
        let (status, body) =
            send_json(&f.state, Method::POST, "/api/tickets/1/status/closed", key, "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status_id"], "CLOSED");
        assert_eq!(body["data"]["status_name"], "Closed");

        let (status, body) =
            send_json(&f.state, Method::POST, "/api/tickets/1/status/ESCALATED", key, "").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "invalid_transition");

        let (status, _) =
            send_json(&f.state, Method::POST, "/api/tickets/1/status/bogus", key, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let audit = f.state.auth_layer.get_audit_log(10).await;
        assert!(audit.iter().any(|e| e.action == "ticket_status" && e.detail == "OPEN -> CLOSED"));
    }

    #[tokio::test]
    async fn test_export_csv() {
        let f = fixture().await;
        let (status, headers, body) = send(
            &f.state,
            Method::GET,
            "/api/tickets/export/csv",
            Some(&f.customer_key),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Tickets.csv\""
        );
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().nth(1).unwrap().starts_with(r#""1","10.0.0.1","Spam","Abuse""#));

        let (status, body) = send_json(
            &f.state,
            Method::GET,
            "/api/tickets/export/xml",
            Some(SYSTEM_KEY),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"]["message"],
            "The requested format xml is not available for exports"
        );
    }

    #[tokio::test]
    async fn test_notify_refreshes_ticket() {
        let f = fixture().await;
        let (status, body) = send_json(
            &f.state,
            Method::POST,
            "/api/tickets/1/notify?only=ip",
            Some(&f.customer_key),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ip_contact"]["notified_count"], 1);
        assert_eq!(body["data"]["last_notify_count"], 10);
        assert!(body["data"]["last_notify_timestamp"].is_string());

        let (status, _) = send_json(
            &f.state,
            Method::POST,
            "/api/tickets/1/notify?only=fax",
            Some(&f.customer_key),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_ticket_resolves_contact() {
        let f = fixture().await;
        let bad = r#"{"ip":"10.9.0.300","class_id":"SPAM","type_id":"ABUSE"}"#;
        let (status, body) =
            send_json(&f.state, Method::POST, "/api/tickets", Some(SYSTEM_KEY), bad).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "invalid_ticket");

        let good = r#"{"ip":"10.9.0.7","class_id":"SPAMTRAP","type_id":"info"}"#;
        let (status, body) =
            send_json(&f.state, Method::POST, "/api/tickets", Some(SYSTEM_KEY), good).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["type_id"], "INFO");
        assert_eq!(body["data"]["ip_contact"]["reference"], "CUST");
        assert_eq!(body["data"]["ip_contact"]["account_id"], f.customer_id);

        let (status, body) = send_json(
            &f.state,
            Method::PUT,
            "/api/tickets/5",
            Some(&f.customer_key),
            r#"{"domain":"Shop.Example"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["domain"], "shop.example");
    }

    #[tokio::test]
    async fn test_contact_update_and_table() {
        let f = fixture().await;
        // ticket 2 sits outside every netblock, so its ip contact is cleared
        let (status, body) = send_json(
            &f.state,
            Method::POST,
            "/api/tickets/2/contact",
            Some(SYSTEM_KEY),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["ip_contact"]["reference"].is_null());

        f.state.store.add_note(1, "customer", "fixed", false).await.unwrap();
        let (status, body) = send_json(
            &f.state,
            Method::GET,
            "/api/tickets/table",
            Some(&f.customer_key),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ids(&body), vec![1, 3, 4]);
        assert_eq!(body["data"][0]["notes_count"], 1);
        assert_eq!(body["data"][0]["event_count"], 10);
        assert_eq!(body["data"][0]["status_name"], "Open");
        assert_eq!(body["data"][0]["actions"], "/api/tickets/1");

        let (_, meta) =
            send_json(&f.state, Method::GET, "/api/tickets/meta", Some(SYSTEM_KEY), "").await;
        assert_eq!(meta["statuses"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_account_edit_rules() {
        let f = fixture().await;
        let uri = format!("/api/accounts/{}", f.customer_id);

        let (status, _) = send_json(
            &f.state,
            Method::PATCH,
            &uri,
            Some(&f.customer_key),
            r#"{"name":"Mine"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send_json(
            &f.state,
            Method::PATCH,
            &uri,
            Some(SYSTEM_KEY),
            r#"{"name":"Customer BV","disabled":"false"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Customer BV");

        let system = f.state.store.system_account().await.unwrap().unwrap();
        let (status, body) = send_json(
            &f.state,
            Method::PATCH,
            &format!("/api/accounts/{}", system.id),
            Some(SYSTEM_KEY),
            r#"{"disabled":true}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body["error"]["message"],
            "the system account cannot be disabled"
        );

        let (status, _) =
            send_json(&f.state, Method::GET, &uri, Some(&f.customer_key), "").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send_json(
            &f.state,
            Method::GET,
            &format!("/api/accounts/{}", system.id),
            Some(&f.customer_key),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_disabled_account_is_locked_out() {
        let f = fixture().await;
        let (status, _) = send_json(
            &f.state,
            Method::PATCH,
            &format!("/api/accounts/{}", f.customer_id),
            Some(SYSTEM_KEY),
            r#"{"disabled":1}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            send_json(&f.state, Method::GET, "/api/tickets", Some(&f.customer_key), "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_key_management_needs_admin() {
        let f = fixture().await;
        let (status, _) =
            send_json(&f.state, Method::GET, "/api/auth/keys", Some(&f.customer_key), "").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = format!(
            r#"{{"label":"ops","account_id":{},"scopes":["read"]}}"#,
            f.customer_id
        );
        let (status, body) =
            send_json(&f.state, Method::POST, "/api/auth/keys", Some(SYSTEM_KEY), &req).await;
        assert_eq!(status, StatusCode::CREATED);
        let raw = body["key"].as_str().unwrap().to_string();
        let id = body["id"].as_str().unwrap().to_string();

        let (status, _) =
            send_json(&f.state, Method::GET, "/api/tickets", Some(&raw), "").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send_json(
            &f.state,
            Method::POST,
            "/api/tickets/1/status/closed",
            Some(&raw),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, _) = send(
            &f.state,
            Method::DELETE,
            &format!("/api/auth/keys/{id}"),
            Some(SYSTEM_KEY),
            "",
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) =
            send_json(&f.state, Method::GET, "/api/tickets", Some(&raw), "").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let bad = r#"{"label":"x","account_id":999,"scopes":[]}"#;
        let (status, _) =
            send_json(&f.state, Method::POST, "/api/auth/keys", Some(SYSTEM_KEY), bad).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
