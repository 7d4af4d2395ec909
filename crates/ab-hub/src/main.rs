use axum::{
    extract::{Request, State},
    http::Method,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::{ApiKey, AuthLayer, Caller, CreateApiKeyRequest, Scope};
use crate::error::ApiError;
use crate::notify::{LogNotifier, Notifier};
use crate::store::{StoreResult, TicketStore};

mod accounts;
mod api;
mod auth;
mod error;
mod notify;
mod query;
mod store;
mod tickets;
mod transform;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "ab-hub", version, about = "Abuse Desk ticket hub")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: String,

    /// SQLite database file
    #[arg(long, default_value = "abusedesk.db")]
    database: PathBuf,

    /// Path to config file
    #[arg(long, default_value = "ab-hub.toml")]
    config: PathBuf,

    /// Fill an empty database with this many demo tickets
    #[arg(long)]
    seed: Option<usize>,
}

// =============================================================================
// Config
// =============================================================================

#[derive(Deserialize, Default, Clone)]
struct Config {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    notifications: NotificationConfig,
    #[serde(default)]
    auth: AuthConfig,
}

#[derive(Deserialize, Clone)]
struct ServerConfig {
    /// Most rows a single export returns.
    #[serde(default = "default_max_limit")]
    max_limit: usize,
    #[serde(default = "default_cors_permissive")]
    cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_limit: default_max_limit(),
            cors_permissive: default_cors_permissive(),
        }
    }
}

#[derive(Deserialize, Clone)]
struct NotificationConfig {
    #[serde(default = "default_notifications_enabled")]
    enabled: bool,
    #[serde(default = "default_sender")]
    sender: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
            sender: default_sender(),
        }
    }
}

#[derive(Deserialize, Clone, Default)]
struct AuthConfig {
    /// Fixed key for the system account. A random one is generated when unset.
    #[serde(default)]
    bootstrap_key: Option<String>,
}

fn default_max_limit() -> usize {
    50_000
}
fn default_cors_permissive() -> bool {
    true
}
fn default_notifications_enabled() -> bool {
    true
}
fn default_sender() -> String {
    "abuse@localhost".into()
}

impl Config {
    fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let parsed: Result<Config, String> = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| toml::from_str(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

// =============================================================================
// Application State
// =============================================================================

struct AppState {
    store: TicketStore,
    auth_layer: Arc<AuthLayer>,
    notifier: Arc<dyn Notifier>,
    config: Config,
}

impl AppState {
    fn new(store: TicketStore, config: Config) -> Self {
        Self {
            store,
            auth_layer: Arc::new(AuthLayer::new(1000)),
            notifier: Arc::new(LogNotifier::new(config.notifications.sender.clone())),
            config,
        }
    }

    /// Make sure a system account exists, optionally seed demo data, and
    /// register the system account's key.
    async fn bootstrap(&self, seed: Option<usize>) -> StoreResult<ApiKey> {
        if let Some(tickets) = seed {
            if self.store.all_tickets().await?.is_empty() {
                store::seed::seed_demo(&self.store, tickets).await?;
            } else {
                tracing::info!("Database already holds tickets, skipping seed");
            }
        }

        let system = match self.store.system_account().await? {
            Some(account) => account,
            None => {
                let brand = self.store.create_brand("Default", "AbuseDesk").await?;
                self.store.create_account("Default", brand.id, true).await?
            }
        };

        let req = CreateApiKeyRequest {
            label: "System Key (Startup)".into(),
            account_id: system.id,
            scopes: vec![Scope::Admin, Scope::Read, Scope::Write],
        };
        let key = match &self.config.auth.bootstrap_key {
            Some(raw) => self.auth_layer.register_key(raw.clone(), req).await,
            None => self.auth_layer.create_key(req).await,
        };
        Ok(key)
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = if state.config.server.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/api/health", get(api::health))
        .route(
            "/api/tickets",
            get(api::list_tickets).post(api::store_ticket),
        )
        .route("/api/tickets/search", post(api::search_tickets))
        .route("/api/tickets/table", get(api::ticket_table))
        .route("/api/tickets/meta", get(api::ticket_meta))
        .route("/api/tickets/export/:format", get(api::export_tickets))
        .route(
            "/api/tickets/:id",
            get(api::show_ticket).put(api::update_ticket),
        )
        .route(
            "/api/tickets/:id/status/:status",
            post(api::set_ticket_status),
        )
        .route("/api/tickets/:id/contact", post(api::update_ticket_contacts))
        .route("/api/tickets/:id/notify", post(api::notify_ticket))
        .route(
            "/api/accounts/:id",
            get(api::show_account).patch(api::edit_account),
        )
        .route(
            "/api/auth/keys",
            post(api::create_api_key).get(api::list_api_keys),
        )
        .route("/api/auth/keys/:id", delete(api::revoke_api_key))
        .route("/api/auth/audit", get(api::get_audit_log))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ab_hub=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config);

    let store = match TicketStore::open(&args.database) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open database at {:?}: {}", args.database, e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(store, config));
    let system_key = match state.bootstrap(args.seed).await {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("Failed to prepare database: {}", e);
            std::process::exit(1);
        }
    };
    if state.config.auth.bootstrap_key.is_none() {
        if let Some(raw) = &system_key.key {
            tracing::info!("🔑 GENERATED SYSTEM API KEY: {}", raw);
            tracing::warn!("⚠️  Copy this key! It will not be shown again.");
        }
    }

    let app = build_router(state);

    let addr: SocketAddr = match args.bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid bind address {}: {}", args.bind, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Abuse Desk hub listening on http://{}", addr);
    tracing::info!("Database: {:?}", args.database);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}

// =============================================================================
// Auth Middleware
// =============================================================================

async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    // Public routes bypass
    if path == "/api/health" || !path.starts_with("/api") || method == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));
    let Some(token) = token else {
        tracing::warn!("Missing Authorization header for {}", path);
        return Err(ApiError::Unauthorized("missing API key".into()));
    };

    let Some(key) = state.auth_layer.validate_token(token).await else {
        tracing::warn!("Invalid API Key for {}", path);
        return Err(ApiError::Unauthorized("invalid API key".into()));
    };

    if let Some(scope) = required_scope(&path, &method) {
        if !state.auth_layer.has_scope(&key, scope) {
            tracing::warn!("Insufficient scope for {} {}", method, path);
            return Err(ApiError::Forbidden("insufficient scope".into()));
        }
    }

    let account = match state.store.find_account(key.account_id).await? {
        Some(account) if !account.disabled => account,
        _ => {
            tracing::warn!(account = key.account_id, "API key of a missing or disabled account");
            return Err(ApiError::Forbidden("account is disabled".into()));
        }
    };

    req.extensions_mut().insert(Caller { key, account });
    Ok(next.run(req).await)
}

fn required_scope(path: &str, method: &Method) -> Option<Scope> {
    if !path.starts_with("/api") || path == "/api/health" {
        return None;
    }
    if path.starts_with("/api/auth") {
        return Some(Scope::Admin);
    }
    if path.starts_with("/api/accounts") && method != Method::GET {
        return Some(Scope::Admin);
    }
    if path == "/api/tickets/search" {
        return Some(Scope::Read);
    }
    match *method {
        Method::GET | Method::HEAD => Some(Scope::Read),
        _ => Some(Scope::Write),
    }
}
