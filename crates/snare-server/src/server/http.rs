//! HTTP capture listener.
//!
//! Every inbound request, whatever its method or path, becomes a captured
//! exchange and runs through the pipeline. Handler scripts are synchronous,
//! so each exchange is processed on the blocking pool.

use crate::model::Exchange;
use crate::pipeline::Pipeline;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

pub struct CaptureServer {
    addr: SocketAddr,
    max_body_bytes: usize,
    pipeline: Arc<Pipeline>,
}

impl CaptureServer {
    pub fn new(addr: SocketAddr, max_body_bytes: usize, pipeline: Arc<Pipeline>) -> Self {
        Self {
            addr,
            max_body_bytes,
            pipeline,
        }
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("HTTP capture listening on http://{}", self.addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let pipeline = Arc::clone(&self.pipeline);
            let max_body_bytes = self.max_body_bytes;

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let pipeline = Arc::clone(&pipeline);
                    async move { handle_request(req, peer, pipeline, max_body_bytes).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("capture connection error: {}", e);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    pipeline: Arc<Pipeline>,
    max_body_bytes: usize,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();

    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let query = parse_query(parts.uri.query());
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
        .collect();
    let host = parts
        .uri
        .authority()
        .map(|a| a.to_string())
        .or_else(|| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("host"))
                .map(|(_, v)| v.clone())
        })
        .unwrap_or_else(|| "localhost".to_string());
    let url = match parts.uri.query() {
        Some(q) => format!("http://{host}{path}?{q}"),
        None => format!("http://{host}{path}"),
    };

    let body = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            if bytes.is_empty() {
                None
            } else {
                Some(bytes.to_vec())
            }
        }
        Err(_) => {
            return Ok(plain_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body exceeds the capture limit",
            ))
        }
    };

    let exchange = Exchange::new_http(
        method,
        url,
        path,
        Some(peer.to_string()),
        headers,
        query,
        body,
    );

    let result = tokio::task::spawn_blocking(move || pipeline.run_http_exchange(exchange)).await;
    let snapshot = match result {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(e)) => {
            warn!("failed to process exchange: {}", e);
            return Ok(plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to process exchange",
            ));
        }
        Err(e) => {
            warn!("exchange worker panicked: {}", e);
            return Ok(plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
            ));
        }
    };

    Ok(build_client_response(
        snapshot.status,
        &snapshot.headers,
        snapshot.body,
    ))
}

/// Decode a query string into a key/value map. The last occurrence of a
/// repeated key wins.
fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for pair in query.unwrap_or("").split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        map.insert(decode_component(key), decode_component(value));
    }
    map
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn build_client_response(
    status: u16,
    headers: &[(String, String)],
    body: Option<Vec<u8>>,
) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    let body = Full::new(Bytes::from(body.unwrap_or_default()));
    builder.body(body).unwrap_or_else(|e| {
        // A script can set a header name hyper refuses to serialize.
        warn!("could not build response from handler output: {}", e);
        plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "invalid response produced by handlers",
        )
    })
}

fn plain_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from(message.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}
