use std::io::Read;

use clap::{Parser, Subcommand};
use ghap_core::hooks::{self, PostToolUseInput, PreToolUseInput, UserPromptSubmitInput};
use ghap_core::{Config, SessionCounter};
use ghap_hooks::DaemonClient;
use serde_json::{json, Value as Json};

#[derive(Parser, Debug)]
#[command(name = "ghap-hooks", about = "Host-runtime hook entry points for the GHAP daemon")]
struct Args {
    #[command(subcommand)]
    event: Event,
}

#[derive(Subcommand, Debug)]
enum Event {
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
}

fn main() {
    let args = Args::parse();
    let input = read_stdin_json();
    let output = run(args.event, &input);
    println!("{output}");
}

fn run(event: Event, input: &Json) -> Json {
    let config = Config::from_env();
    let client = DaemonClient::new(&config.host, config.port);

    match event {
        Event::SessionStart => hooks::session_start(&client),
        Event::UserPromptSubmit => {
            let prompt = input.get("prompt").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            hooks::user_prompt_submit(&client, &UserPromptSubmitInput { prompt })
        }
        Event::PreToolUse => {
            let session_id = input.get("session_id").and_then(|v| v.as_str()).unwrap_or_default();
            let tool_name = input.get("tool_name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let tool_input = input.get("tool_input").cloned().unwrap_or(json!({}));
            let counter = SessionCounter::new(&config.home);
            hooks::pre_tool_use(
                &client,
                &counter,
                session_id,
                config.checkin_frequency,
                &PreToolUseInput { tool_name, tool_input },
            )
        }
        Event::PostToolUse => {
            let tool_name = input.get("tool_name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let tool_response = input.get("tool_response").cloned().unwrap_or(json!({}));
            hooks::post_tool_use(&PostToolUseInput { tool_name, tool_response })
        }
    }
}

/// Malformed or missing stdin is not an irrecoverable failure here — hooks
/// fail silently (§4.N) — so this falls back to an empty object rather than
/// exiting nonzero.
fn read_stdin_json() -> Json {
    let mut buf = String::new();
    if std::io::stdin().read_to_string(&mut buf).is_err() {
        return json!({});
    }
    serde_json::from_str(&buf).unwrap_or(json!({}))
}
