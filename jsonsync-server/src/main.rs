//! jsonsync server.
//!
//! ```text
//! jsonsync-server                 serve rooms on JSONSYNC_BIND_ADDR, the API on JSONSYNC_HTTP_ADDR
//! jsonsync-server create <file>   upload a JSON document to a running server, print its room id
//! jsonsync-server get <id>        print the current document of a room from a running server
//! ```
//!
//! Configuration comes from `JSONSYNC_*` environment variables and logging
//! from `RUST_LOG`. `create` and `get` talk to the document API of the server
//! at `JSONSYNC_HTTP_ADDR`, so they never open the store themselves.

use std::process::ExitCode;

use jsonsync_collab::api::ApiClient;
use jsonsync_collab::server::{ServerConfig, SyncServer};
use jsonsync_collab::{RoomId, SyncError};
use log::{debug, error, info};
use serde_json::Value;

enum Command {
    Serve,
    Create(String),
    Get(String),
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    let command = match args.next().as_deref() {
        None | Some("serve") => Command::Serve,
        Some("create") => Command::Create(args.next().ok_or("usage: create <file.json>")?),
        Some("get") => Command::Get(args.next().ok_or("usage: get <room-id>")?),
        Some(other) => return Err(format!("unknown command `{other}`")),
    };
    match args.next() {
        Some(extra) => Err(format!("unexpected argument `{extra}`")),
        None => Ok(command),
    }
}

/// Read `file` and upload it, returning the new room id.
async fn create_document(api: &ApiClient, file: &str) -> Result<RoomId, SyncError> {
    let raw = std::fs::read(file)?;
    let value: Value = serde_json::from_slice(&raw)
        .map_err(|e| SyncError::MalformedMessage(format!("{file}: {e}")))?;
    api.upload(&value).await
}

async fn get_document(api: &ApiClient, id: &str) -> Result<Value, SyncError> {
    api.fetch(id).await
}

async fn run(command: Command, config: ServerConfig) -> Result<(), SyncError> {
    let api = ApiClient::new(config.api_url());
    match command {
        Command::Serve => {
            let server = SyncServer::new(config)?;
            info!("Starting jsonsync server on {}", server.bind_addr());
            server.run().await
        }
        Command::Create(file) => {
            debug!("Uploading {file} to {}", api.base_url());
            println!("{}", create_document(&api, &file).await?);
            Ok(())
        }
        Command::Get(id) => {
            let value = get_document(&api, &id).await?;
            let pretty = serde_json::to_string_pretty(&value)
                .map_err(|e| SyncError::MalformedMessage(e.to_string()))?;
            println!("{pretty}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    match run(command, ServerConfig::from_env()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
