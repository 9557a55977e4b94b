//! HTTP control plane for the daemon side of the Hook & Daemon Contract
//! (§4.L-N, §6): a single dispatcher instance behind two routes, `GET
//! /health` and `POST /api/call`, the latter carrying the uniform
//! tool-dispatch envelope described in §4.M.

pub mod process;

use std::sync::Arc;

use actix_web::{error::JsonPayloadError, web, App, HttpRequest, HttpResponse, HttpServer};
use ghap_core::Dispatcher;
use serde::Deserialize;
use serde_json::json;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.dispatcher.health())
}

async fn call(state: web::Data<AppState>, body: web::Json<CallRequest>) -> HttpResponse {
    let envelope = state.dispatcher.dispatch(&body.tool, &body.arguments);
    HttpResponse::Ok().json(envelope)
}

/// Malformed JSON bodies get the `bad_request` error envelope (§6) instead
/// of actix's default plain-text 400 response.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let envelope = json!({ "error": { "type": "bad_request", "message": err.to_string() } });
    actix_web::error::InternalError::from_response(err, HttpResponse::Ok().json(envelope)).into()
}

/// Builds the `actix-web` app, parameterized by the shared dispatcher state
/// so `main` and integration tests can wire it to different listeners.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .route("/health", web::get().to(health))
        .route("/api/call", web::post().to(call));
}

/// Binds and starts the server, returning the handle before it runs to
/// completion so the caller can request a graceful stop (§6: SIGTERM, wait
/// up to 5s, then SIGKILL).
pub fn bind(state: AppState, host: &str, port: u16) -> std::io::Result<actix_web::dev::Server> {
    let data = web::Data::new(state);
    Ok(HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .shutdown_timeout(5)
        .bind((host, port))?
        .run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use ghap_core::{InMemoryVectorStore, MetadataStore, MockEmbeddingService};

    fn state() -> AppState {
        AppState {
            dispatcher: Arc::new(Dispatcher::new(
                MetadataStore::in_memory().unwrap(),
                Arc::new(InMemoryVectorStore::new()),
                Arc::new(MockEmbeddingService::new(16)),
                "ghap-daemon",
                "0.1.0",
            )),
        }
    }

    #[actix_web::test]
    async fn health_route_reports_healthy_status() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["status"], "healthy");
    }

    #[actix_web::test]
    async fn call_route_dispatches_ping_through_the_envelope() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/call")
            .set_json(serde_json::json!({"tool": "ping", "arguments": {}}))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["result"], "pong");
    }

    #[actix_web::test]
    async fn call_route_returns_bad_request_envelope_for_malformed_json() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/call")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["error"]["type"], "bad_request");
    }

    #[actix_web::test]
    async fn call_route_returns_typed_error_envelope_for_unknown_tool() {
        let app = test::init_service(App::new().app_data(web::Data::new(state())).configure(configure)).await;
        let req = test::TestRequest::post()
            .uri("/api/call")
            .set_json(serde_json::json!({"tool": "not_a_real_tool", "arguments": {}}))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(resp.get("error").is_some());
    }
}
