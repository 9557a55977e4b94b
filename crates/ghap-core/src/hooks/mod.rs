//! Hook Contract (§4.N): the four short-lived entry points through which a
//! host runtime coordinates with the daemon. Every function here is pure
//! with respect to I/O — it takes the already-parsed input and the
//! services it needs, and returns the exact JSON the hook process should
//! print to stdout. The `ghap-hooks` binary owns reading stdin, calling
//! these, writing stdout, and the "fail silently, exit 0" wrapper named in
//! §4.N.
//!
//! Hooks are separate short-lived processes with no shared memory with the
//! daemon (§5); they reach it only through dispatcher RPC. [`ToolCaller`]
//! is the seam that lets these functions run against an in-process
//! [`Dispatcher`] (tests, and a daemon that hosts its own hooks) or against
//! an HTTP client that speaks the same envelope (the `ghap-hooks` binary).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

use crate::dispatch::Dispatcher;
use crate::session::SessionCounter;

const USER_PROMPT_MAX_CHARS: usize = 50_000;
const CONTEXT_PACK_MAX_CHARS: usize = 1_200;
const CHECKIN_MAX_CHARS: usize = 800;

/// Anything that can answer a tool-dispatch call with the §4.M envelope.
pub trait ToolCaller {
    fn call(&self, tool: &str, arguments: &Json) -> Json;
}

impl ToolCaller for Dispatcher {
    fn call(&self, tool: &str, arguments: &Json) -> Json {
        self.dispatch(tool, arguments)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPromptSubmitInput {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreToolUseInput {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostToolUseInput {
    pub tool_name: String,
    #[serde(default)]
    pub tool_response: Json,
}

#[derive(Debug, Clone, Serialize)]
struct HookSpecificOutput {
    #[serde(rename = "hookEventName")]
    hook_event_name: &'static str,
    #[serde(rename = "additionalContext")]
    additional_context: String,
}

fn wrapped(hook_event_name: &'static str, additional_context: String) -> Json {
    json!({ "hookSpecificOutput": HookSpecificOutput { hook_event_name, additional_context } })
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

fn empty_output() -> Json {
    json!({})
}

/// `SessionStart` — input may be empty. Assembles a short markdown context
/// pack (pending handoff, active GHAP if any) for injection at session
/// start.
pub fn session_start(dispatcher: &dyn ToolCaller) -> Json {
    let response = dispatcher.call("get_active_ghap", &json!({}));
    let markdown = match response.get("goal").and_then(|v| v.as_str()) {
        Some(goal) => format!("## Active GHAP\n- goal: {goal}"),
        None => String::new(),
    };
    wrapped("SessionStart", markdown)
}

/// `UserPromptSubmit` — truncates the prompt to [`USER_PROMPT_MAX_CHARS`],
/// assembles a context pack capped at [`CONTEXT_PACK_MAX_CHARS`].
pub fn user_prompt_submit(dispatcher: &dyn ToolCaller, input: &UserPromptSubmitInput) -> Json {
    let prompt = truncate_chars(&input.prompt, USER_PROMPT_MAX_CHARS);
    if prompt.trim().is_empty() {
        return wrapped("UserPromptSubmit", String::new());
    }
    let response = dispatcher.call(
        "assemble_context",
        &json!({ "query": prompt, "token_budget": CONTEXT_PACK_MAX_CHARS / 4, "per_kind_cap": 3 }),
    );
    let markdown = response
        .get("markdown")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    wrapped("UserPromptSubmit", truncate_chars(markdown, CONTEXT_PACK_MAX_CHARS))
}

/// `PreToolUse` — increments the per-session counter; at the configured
/// frequency (with an active GHAP present) emits a plain-text check-in
/// reminder and resets the counter. Plain text, not the
/// `hookSpecificOutput` wrapper — §4.N describes this as a bare reminder,
/// distinct from the markdown-context hooks.
pub fn pre_tool_use(
    dispatcher: &dyn ToolCaller,
    counter: &SessionCounter,
    session_id: &str,
    checkin_frequency: u32,
    _input: &PreToolUseInput,
) -> Json {
    let count = match counter.increment(session_id) {
        Ok(c) => c,
        Err(_) => return empty_output(),
    };

    if checkin_frequency == 0 || (count as u32) % checkin_frequency != 0 {
        return empty_output();
    }

    let active = dispatcher.call("get_active_ghap", &json!({}));
    if active.get("active").is_some() {
        return empty_output();
    }

    let _ = counter.reset(session_id);
    let goal = active.get("goal").and_then(|v| v.as_str()).unwrap_or("(unnamed)");
    let reminder = format!("GHAP Check-in: you have an active hypothesis — \"{goal}\". Consider resolving it.");
    json!({ "systemMessage": truncate_chars(&reminder, CHECKIN_MAX_CHARS) })
}

/// `PostToolUse` — scans a tool's result text for test-outcome markers.
/// Out of scope beyond detection (§4.N): a richer remediation proposal is
/// left to the host runtime.
pub fn post_tool_use(input: &PostToolUseInput) -> Json {
    let text = input.tool_response.as_str().unwrap_or_default();
    let failed = text.contains("FAILED") || text.contains("test result: FAILED");
    if !failed {
        return empty_output();
    }
    json!({ "systemMessage": "Detected a failing test in the tool result. Consider starting or updating a GHAP entry to track the investigation." })
}
