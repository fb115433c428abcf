//! HTTP surface: one upload endpoint per registered tool.
//!
//! Routes:
//! - `POST /api/<tool>` multipart upload, field `apk`
//! - `GET /api/tools` registered tools
//! - `GET /health`

pub mod multipart;

use crate::config::ServiceConfig;
use crate::error::{ApkDockError, Result};
use crate::orchestrator::JobOrchestrator;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSummary {
    id: &'static str,
    name: &'static str,
    endpoint: String,
    partial_results: bool,
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &ServiceConfig, orchestrator: Arc<JobOrchestrator>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| ApkDockError::Config(format!("invalid listen address: {}", e)))?;

    let make_svc = make_service_fn(move |_| {
        let orchestrator = orchestrator.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let orchestrator = orchestrator.clone();
                async move { Ok::<_, Infallible>(route(req, &orchestrator).await) }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .map_err(|e| ApkDockError::Internal(format!("failed to bind {}: {}", addr, e)))?
        .serve(make_svc);
    info!("Server running on http://{}", addr);

    server
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await
        .map_err(|e| ApkDockError::Internal(format!("server error: {}", e)))
}

/// Dispatch one request.
pub async fn route(req: Request<Body>, orchestrator: &JobOrchestrator) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    info!(%method, %path, "Request");

    if method == Method::OPTIONS {
        return empty(StatusCode::NO_CONTENT);
    }

    match (method, path.as_str()) {
        (Method::GET, "/health") => json_response(StatusCode::OK, &json!({ "status": "ok" })),
        (Method::GET, "/api/tools") => {
            let tools: Vec<ToolSummary> = orchestrator
                .registry()
                .iter()
                .map(|t| ToolSummary {
                    id: t.id,
                    name: t.name,
                    endpoint: format!("/api/{}", t.id),
                    partial_results: t.supports_partial_results(),
                })
                .collect();
            json_response(StatusCode::OK, &tools)
        }
        (Method::POST, p) if p.starts_with("/api/") => {
            let tool_id = p.trim_start_matches("/api/").to_string();
            match analyze(req, &tool_id, orchestrator).await {
                Ok(resp) => resp,
                Err(e) => error_response(&e),
            }
        }
        _ => error_response(&ApkDockError::UnknownTool(path.clone())),
    }
}

async fn analyze(
    req: Request<Body>,
    tool_id: &str,
    orchestrator: &JobOrchestrator,
) -> Result<Response<Body>> {
    if orchestrator.registry().get(tool_id).is_none() {
        return Err(ApkDockError::UnknownTool(tool_id.to_string()));
    }
    let upload =
        multipart::extract_upload(req, orchestrator.budget().max_upload_bytes).await?;
    let report = orchestrator.analyze(tool_id, upload).await?;
    Ok(json_response(StatusCode::OK, &report))
}

fn with_cors(mut resp: Response<Body>) -> Response<Body> {
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    resp
}

fn empty(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = status;
    with_cors(resp)
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut resp = Response::new(Body::from(body));
            *resp.status_mut() = status;
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            with_cors(resp)
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `{"error": {"message": ..., "status": ...}}`
pub fn error_response(err: &ApkDockError) -> Response<Body> {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if err.is_client_error() {
        warn!(error = %err, "Request rejected");
    } else {
        error!(error = %err, "Request failed");
    }
    let message = match err {
        ApkDockError::UnknownTool(_) => "Not Found".to_string(),
        other => other.to_string(),
    };
    json_response(
        status,
        &json!({ "error": { "message": message, "status": status.as_u16() } }),
    )
}
