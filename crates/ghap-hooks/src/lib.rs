//! A `ghap_core::hooks::ToolCaller` that reaches the daemon over HTTP,
//! letting the pure hook logic in `ghap-core` run unchanged inside this
//! short-lived process (§5: hooks share no memory with the daemon, only
//! files and dispatcher RPC).

use ghap_core::hooks::ToolCaller;
use serde_json::{json, Value as Json};

pub struct DaemonClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            client: reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new()),
        }
    }
}

impl ToolCaller for DaemonClient {
    /// Any transport failure (daemon not running, connection refused,
    /// timeout) becomes the same typed error envelope a tool failure
    /// would — callers here never distinguish "daemon down" from
    /// "tool errored", both must fail silently per §4.N.
    fn call(&self, tool: &str, arguments: &Json) -> Json {
        let request = json!({ "tool": tool, "arguments": arguments });
        self.client
            .post(format!("{}/api/call", self.base_url))
            .json(&request)
            .send()
            .and_then(|resp| resp.json::<Json>())
            .unwrap_or_else(|err| {
                json!({ "error": { "type": "timeout", "message": format!("daemon unreachable: {err}") } })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    /// Binds a one-shot listener, hands back its port, and answers the
    /// first request it receives with `body` as a `200 application/json`
    /// response on a background thread.
    fn serve_one_response(body: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        port
    }

    #[test]
    fn call_decodes_the_daemon_envelope_from_a_live_http_round_trip() {
        let port = serve_one_response(r#"{"result":"pong"}"#);
        let client = DaemonClient::new("127.0.0.1", port);
        let output = client.call("ping", &json!({}));
        assert_eq!(output["result"], "pong");
    }

    #[test]
    fn call_degrades_to_a_timeout_envelope_when_nothing_is_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = DaemonClient::new("127.0.0.1", port);
        let output = client.call("ping", &json!({}));
        assert_eq!(output["error"]["type"], "timeout");
    }
}
