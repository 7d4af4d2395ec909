//! # ab-cli
//!
//! Command line client for the Abuse Desk hub.
//!
//! - `ab hub --database <path>` launches the hub.
//! - `ab tickets search --where 'event_count>5'` runs a criteria query.
//! - `ab tickets export` writes the visible tickets to `Tickets.csv`.
//! - `ab account edit <id> --name ...` changes an account.
//!
//! The hub address and key come from `AB_BASE_URL` and `AB_API_KEY`.

use std::path::PathBuf;
use std::process::Command;

use ab_core::account::parse_flag;
use ab_core::{classification_label, AccountUpdate, ContactKind, TicketStatus};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

/// Abuse Desk: work abuse tickets from the terminal.
#[derive(Parser)]
#[command(name = "ab", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the ticket hub.
    Hub {
        /// SQLite database file.
        #[arg(long, default_value = "abusedesk.db")]
        database: PathBuf,

        /// Server bind address.
        #[arg(long, default_value = "127.0.0.1:3000")]
        bind: String,

        /// Seed an empty database with demo tickets.
        #[arg(long)]
        seed: Option<usize>,
    },

    /// Work tickets (list, search, export, status, notify).
    Tickets {
        #[command(subcommand)]
        action: TicketCmd,
    },

    /// Show or edit accounts.
    Account {
        #[command(subcommand)]
        action: AccountCmd,
    },

    /// Manage API keys.
    Keys {
        #[command(subcommand)]
        action: KeyCmd,
    },

    /// Show the audit log.
    Audit,
}

#[derive(Subcommand)]
enum TicketCmd {
    List,
    Show {
        id: i64,
    },
    /// Criteria query, e.g. `--where 'event_count>5' --orderby ip --limit 10`.
    Search {
        #[arg(long = "where")]
        criteria: Vec<String>,
        #[arg(long)]
        orderby: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Print the raw JSON response instead of a table.
        #[arg(long)]
        json: bool,
    },
    Export {
        #[arg(long, default_value = "csv")]
        format: String,
        #[arg(long, default_value = "Tickets.csv")]
        output: PathBuf,
    },
    Status {
        id: i64,
        status: String,
    },
    /// Re-resolve the contacts of a ticket.
    Contact {
        id: i64,
        #[arg(long)]
        only: Option<String>,
    },
    Notify {
        id: i64,
        #[arg(long)]
        only: Option<String>,
    },
    Meta,
}

#[derive(Subcommand)]
enum AccountCmd {
    Show {
        id: i64,
    },
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        brand_id: Option<i64>,
        /// true or false
        #[arg(long)]
        disabled: Option<String>,
    },
}

#[derive(Subcommand)]
enum KeyCmd {
    List,
    Create {
        label: String,
        #[arg(long)]
        account_id: i64,
        /// read, write or admin; repeatable
        #[arg(long = "scope", default_value = "read")]
        scopes: Vec<String>,
    },
    Revoke {
        id: String,
    },
}

#[derive(Tabled)]
struct TicketRow {
    id: i64,
    ip: String,
    domain: String,
    class: String,
    status: String,
    events: i64,
    contact: String,
}

impl TicketRow {
    fn from_json(item: &Value) -> Self {
        let text = |key: &str| item[key].as_str().unwrap_or("").to_string();
        Self {
            id: item["id"].as_i64().unwrap_or_default(),
            ip: text("ip"),
            domain: text("domain"),
            class: item["class_id"]
                .as_str()
                .map(|c| classification_label(c).to_string())
                .unwrap_or_default(),
            status: text("status_name"),
            events: item["event_count"].as_i64().unwrap_or_default(),
            contact: item["ip_contact"]["reference"]
                .as_str()
                .unwrap_or("")
                .to_string(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Hub {
            database,
            bind,
            seed,
        } => {
            eprintln!("Abuse Desk: launching hub...");
            eprintln!("   Database: {}", database.display());
            eprintln!("   Bind:     {}", bind);
            eprintln!();

            let database = database.display().to_string();
            let mut args = vec![
                "run".to_string(),
                "-p".into(),
                "ab-hub".into(),
                "--".into(),
                "--bind".into(),
                bind,
                "--database".into(),
                database,
            ];
            if let Some(n) = seed {
                args.push("--seed".into());
                args.push(n.to_string());
            }

            match Command::new("cargo").args(&args).status() {
                Ok(s) if s.success() => {}
                Ok(s) => {
                    eprintln!("Hub exited with: {}", s);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Failed to launch hub: {}", e);
                    std::process::exit(1);
                }
            }
        }

        cmd => {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("Failed to build tokio runtime: {}", e);
                    std::process::exit(1);
                }
            };

            if let Err(e) = rt.block_on(async_main(cmd)) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

struct Client {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl Client {
    fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: std::env::var("AB_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            api_key: std::env::var("AB_API_KEY").ok(),
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, String> {
        let req = match self.api_key.as_deref() {
            Some(k) => req.header("Authorization", format!("Bearer {}", k)),
            None => req,
        };
        let resp = req.send().await.map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Err(error_message(status.as_u16(), &body))
    }

    async fn get(&self, path: &str) -> Result<Value, String> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.send(self.http.get(&url)).await?;
        resp.json().await.map_err(|e| e.to_string())
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, String> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.send(self.http.post(&url).json(body)).await?;
        resp.json().await.map_err(|e| e.to_string())
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<Value, String> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.send(self.http.patch(&url).json(body)).await?;
        resp.json().await.map_err(|e| e.to_string())
    }

    async fn delete(&self, path: &str) -> Result<(), String> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.http.delete(&url)).await.map(|_| ())
    }
}

async fn async_main(cmd: Commands) -> Result<(), String> {
    let client = Client::from_env();

    match cmd {
        Commands::Tickets { action } => match action {
            TicketCmd::List => {
                let body = client.get("/api/tickets").await?;
                print_tickets(&body);
            }
            TicketCmd::Show { id } => {
                print_json(&client.get(&format!("/api/tickets/{}", id)).await?);
            }
            TicketCmd::Search {
                criteria,
                orderby,
                limit,
                json,
            } => {
                let payload = search_body(&criteria, orderby.as_deref(), limit)?;
                let body = client.post("/api/tickets/search", &payload).await?;
                if json {
                    print_json(&body);
                } else {
                    print_tickets(&body);
                }
            }
            TicketCmd::Export { format, output } => {
                let url = format!("{}/api/tickets/export/{}", client.base_url, format);
                let resp = client.send(client.http.get(&url)).await?;
                let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
                std::fs::write(&output, &bytes).map_err(|e| e.to_string())?;
                eprintln!("Exported {} bytes to {}", bytes.len(), output.display());
            }
            TicketCmd::Status { id, status } => {
                let status: TicketStatus = status.parse().map_err(|e| format!("{}", e))?;
                let path = format!("/api/tickets/{}/status/{}", id, status.as_str());
                print_json(&client.post(&path, &json!({})).await?);
            }
            TicketCmd::Contact { id, only } => {
                let path = with_only(&format!("/api/tickets/{}/contact", id), only.as_deref())?;
                print_json(&client.post(&path, &json!({})).await?);
            }
            TicketCmd::Notify { id, only } => {
                let path = with_only(&format!("/api/tickets/{}/notify", id), only.as_deref())?;
                print_json(&client.post(&path, &json!({})).await?);
            }
            TicketCmd::Meta => print_json(&client.get("/api/tickets/meta").await?),
        },

        Commands::Account { action } => match action {
            AccountCmd::Show { id } => {
                print_json(&client.get(&format!("/api/accounts/{}", id)).await?);
            }
            AccountCmd::Edit {
                id,
                name,
                brand_id,
                disabled,
            } => {
                let update = account_update(name, brand_id, disabled.as_deref())?;
                let body = serde_json::to_value(&update).map_err(|e| e.to_string())?;
                print_json(&client.patch(&format!("/api/accounts/{}", id), &body).await?);
            }
        },

        Commands::Keys { action } => match action {
            KeyCmd::List => print_json(&client.get("/api/auth/keys").await?),
            KeyCmd::Create {
                label,
                account_id,
                scopes,
            } => {
                let payload = json!({
                    "label": label,
                    "account_id": account_id,
                    "scopes": scopes,
                });
                let key = client.post("/api/auth/keys", &payload).await?;
                if let Some(raw) = key["key"].as_str() {
                    eprintln!("Store this key now, it is not shown again:");
                    println!("{}", raw);
                }
            }
            KeyCmd::Revoke { id } => {
                client.delete(&format!("/api/auth/keys/{}", id)).await?;
                println!("Key revoked: {}", id);
            }
        },

        Commands::Audit => print_json(&client.get("/api/auth/audit").await?),

        Commands::Hub { .. } => {}
    }
    Ok(())
}

const OPERATORS: [&str; 8] = [" not like ", " like ", ">=", "<=", "!=", "<>", ">", "<"];

/// Parse `column<op>value` into a search criterion. `=` is handled last so
/// that `>=`, `<=` and `!=` win.
fn parse_criterion(raw: &str) -> Result<Value, String> {
    let lower = raw.to_ascii_lowercase();
    let split = raw.char_indices().find_map(|(i, _)| {
        OPERATORS
            .iter()
            .chain(std::iter::once(&"="))
            .find(|op| lower[i..].starts_with(*op))
            .map(|op| (i, *op))
    });
    let Some((at, op)) = split else {
        return Err(format!(
            "criterion '{}' needs an operator, e.g. event_count>5",
            raw
        ));
    };

    let column = raw[..at].trim();
    if column.is_empty() {
        return Err(format!("criterion '{}' has no column", raw));
    }
    let value = raw[at + op.len()..].trim();
    Ok(json!({
        "column": column,
        "operator": op.trim().to_ascii_uppercase(),
        "value": serde_json::from_str::<Value>(value).unwrap_or_else(|_| json!(value)),
    }))
}

fn search_body(
    criteria: &[String],
    orderby: Option<&str>,
    limit: Option<usize>,
) -> Result<Value, String> {
    let criteria = criteria
        .iter()
        .map(|c| parse_criterion(c))
        .collect::<Result<Vec<_>, _>>()?;
    let mut body = json!({ "criteria": criteria });
    if let Some(column) = orderby {
        body["orderby"] = json!(column);
    }
    if let Some(n) = limit {
        body["limit"] = json!(n);
    }
    Ok(body)
}

fn with_only(path: &str, only: Option<&str>) -> Result<String, String> {
    match only {
        None => Ok(path.to_string()),
        Some(raw) => {
            let kind: ContactKind = raw.parse().map_err(|e| format!("{}", e))?;
            Ok(format!("{}?only={}", path, kind))
        }
    }
}

fn account_update(
    name: Option<String>,
    brand_id: Option<i64>,
    disabled: Option<&str>,
) -> Result<AccountUpdate, String> {
    let update = AccountUpdate {
        name,
        brand_id,
        disabled: disabled
            .map(parse_flag)
            .transpose()
            .map_err(|e| e.to_string())?,
    };
    if update.is_empty() {
        return Err("nothing to update: pass --name, --brand-id or --disabled".into());
    }
    Ok(update)
}

fn error_message(status: u16, body: &Value) -> String {
    match body["error"]["message"].as_str() {
        Some(message) => format!("{} ({})", message, status),
        None => format!("request failed with status {}", status),
    }
}

fn print_tickets(body: &Value) {
    let rows: Vec<TicketRow> = body["data"]
        .as_array()
        .map(|items| items.iter().map(TicketRow::from_json).collect())
        .unwrap_or_default();
    let count = rows.len();
    println!("{}", Table::new(rows));
    eprintln!("{} ticket(s)", count);
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }
}
