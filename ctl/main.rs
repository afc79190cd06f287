#![forbid(unsafe_code)]

//! `agent-switchboard-ctl` — local CLI companion for `agent-switchboard`.
//!
//! Connects to the IPC socket and sends JSON commands to the server.
//! Designed for local operator control when physically present.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "agent-switchboard-ctl",
    about = "Local CLI for the agent-switchboard server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `gateway.ipc_name` config).
    #[arg(long, default_value = "agent-switchboard")]
    ipc_name: String,

    /// Shared-secret auth token printed by the server at startup.
    ///
    /// Falls back to the `SWITCHBOARD_IPC_TOKEN` environment variable.
    #[arg(long)]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show gateway counters (runs in flight, live processes, queues).
    Status,

    /// List session bindings.
    Sessions,

    /// Hard-stop a session and its sub-agent tree.
    Stop {
        /// Session key to stop.
        session_key: String,
    },
}

fn main() {
    let args = Cli::parse();

    let auth_token = args
        .auth_token
        .clone()
        .or_else(|| std::env::var("SWITCHBOARD_IPC_TOKEN").ok());

    let mut request_json = match &args.command {
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Sessions => serde_json::json!({ "command": "sessions" }),
        Command::Stop { session_key } => {
            serde_json::json!({ "command": "stop", "session_key": session_key })
        }
    };
    if let Some(token) = auth_token {
        request_json["auth_token"] = serde_json::Value::String(token);
    }

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to server: {err}");
            eprintln!(
                "Is agent-switchboard running with ipc_name '{}'?",
                args.ipc_name
            );
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    // Send request as a single JSON line.
    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    // Read response line.
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
