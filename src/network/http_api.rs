use std::convert::Infallible;
use std::future::Future;
use std::net::TcpListener;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{info, warn};
use serde_json::json;

use crate::network::metrics;
use crate::raft::DriverHandle;

/// Serve the client API on an already bound listener until `shutdown`
/// resolves.
pub async fn run_http_api(
    listener: TcpListener,
    handle: DriverHandle,
    shutdown: impl Future<Output = ()>,
) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let handle = handle.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handle = handle.clone();
                async move { handle_request(req, handle).await }
            }))
        }
    });

    let server = hyper::Server::from_tcp(listener)?.serve(make_svc);
    info!("HTTP API listening on {}", server.local_addr());
    server.with_graceful_shutdown(shutdown).await
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    respond(status, "application/json", body.to_string())
}

fn text_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    respond(status, "text/plain; charset=utf-8", body)
}

pub async fn handle_request(
    req: Request<Body>,
    handle: DriverHandle,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") => match serde_json::to_value(handle.status()) {
            Ok(status) => json_response(StatusCode::OK, status),
            Err(e) => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": e.to_string() }),
            ),
        },
        (Method::GET, "/metrics") => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4",
            metrics::render(&handle.status()),
        ),
        (method, p) if p.starts_with("/kv/") => match urlencoding::decode(&p["/kv/".len()..]) {
            Ok(key) => handle_kv(method, key.into_owned(), req, handle).await,
            Err(_) => text_response(StatusCode::BAD_REQUEST, "Key must be valid UTF-8"),
        },
        _ => text_response(StatusCode::NOT_FOUND, "Not found"),
    };

    Ok(response)
}

async fn handle_kv(
    method: Method,
    key: String,
    req: Request<Body>,
    handle: DriverHandle,
) -> Response<Body> {
    if key.is_empty() {
        return text_response(StatusCode::BAD_REQUEST, "Key is required");
    }

    match method {
        Method::PUT | Method::POST => {
            let bytes = match hyper::body::to_bytes(req.into_body()).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return json_response(
                        StatusCode::BAD_REQUEST,
                        json!({ "error": format!("failed to read body: {e}") }),
                    )
                }
            };
            let value = match String::from_utf8(bytes.to_vec()) {
                Ok(value) => value,
                Err(_) => {
                    return json_response(
                        StatusCode::BAD_REQUEST,
                        json!({ "error": "value must be UTF-8" }),
                    )
                }
            };

            match handle.propose(key.clone(), value).await {
                Ok(()) => json_response(
                    StatusCode::OK,
                    json!({ "status": "proposed", "key": key }),
                ),
                Err(e) => {
                    warn!("Proposal for key {} failed: {}", key, e);
                    json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": e.to_string() }),
                    )
                }
            }
        }
        Method::GET => match handle.get(&key) {
            Some(value) => text_response(StatusCode::OK, value),
            None => text_response(StatusCode::NOT_FOUND, "Key not found"),
        },
        _ => text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
    }
}
