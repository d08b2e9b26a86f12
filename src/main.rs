//! Counter POS host.
//!
//! # Usage
//!
//! ```bash
//! # Run one command and print its JSON result
//! counter-pos invoke category_create '{"name": "Dairy"}'
//! counter-pos invoke sale_add_item '{"term": "Milk", "quantity": 2}'
//!
//! # Long-running session: one JSON request per stdin line
//! echo '{"cmd": "item_list"}' | counter-pos serve
//! ```
//!
//! `serve` keeps the sale composer and the settings draft alive between
//! requests; `invoke` starts from an empty cart every time.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use counter_pos_lib::{dispatch, init_logging, AppState};

#[derive(Parser)]
#[command(name = "counter-pos")]
#[command(author, version, about = "Counter POS: catalog, sales and receipts")]
struct Cli {
    /// Directory holding the store, logs and staged receipts
    #[arg(long, env = "COUNTER_POS_DATA_DIR", default_value = "./pos-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single command
    Invoke {
        /// Command name, e.g. `item_list`
        command: String,
        /// JSON payload; bare words are passed as strings
        payload: Option<String>,
    },
    /// Read `{"cmd", "args"}` requests from stdin, one per line
    Serve,
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(alias = "command")]
    cmd: String,
    #[serde(default, alias = "payload", alias = "arg0")]
    args: Option<Value>,
}

fn parse_cli_payload(raw: Option<String>) -> Option<Value> {
    raw.map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.data_dir);

    if let Err(e) = run(cli).await {
        error!("Command failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::open(&cli.data_dir)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("opening store in {}", cli.data_dir.display()))?;

    match cli.command {
        Commands::Invoke { command, payload } => {
            let result = dispatch(&state, &command, parse_cli_payload(payload))
                .await
                .map_err(|e| anyhow!(e))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Serve => serve(&state).await?,
    }
    Ok(())
}

async fn serve(state: &AppState) -> anyhow::Result<()> {
    info!("Serving commands on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => match dispatch(state, &request.cmd, request.args).await {
                Ok(result) => json!({ "ok": true, "result": result }),
                Err(e) => json!({ "ok": false, "error": e }),
            },
            Err(e) => {
                warn!(error = %e, "Malformed request line");
                json!({ "ok": false, "error": format!("Malformed request: {e}") })
            }
        };
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}
