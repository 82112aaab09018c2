//! HTTP server implementation.
//!
//! Routes:
//!
//! ```text
//! POST /definitions                   create a definition
//! GET  /definitions                   list definitions
//! GET  /definitions/{id}              get a definition
//! POST /instances                     start an instance {"definitionId"}
//! GET  /instances?definitionId=&state= list instances
//! GET  /instances/{id}                get an instance
//! POST /instances/{id}/execute        execute an action {"actionId"}
//! GET  /instances/{id}/actions        actions that may fire now
//! GET  /health                        liveness
//! ```

use crate::error::ServerError;
use crate::handler::{CommandHandler, Operation, Request, Response};
use crate::metrics::Metrics;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE, LOCATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Method;
use hyper_util::rt::TokioIo;
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use wfengine_core::WorkflowEngine;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_body_bytes: 1024 * 1024,
            metrics: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Sets the request body limit.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Where a request goes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Route {
    Health,
    /// Handler operation, with parameters taken from the path and query.
    Api(Operation, Map<String, Value>),
}

impl Route {
    fn api(op: Operation) -> Self {
        Route::Api(op, Map::new())
    }

    fn with(mut self, key: &str, value: String) -> Self {
        if let Route::Api(_, ref mut params) = self {
            params.insert(key.to_string(), Value::String(value));
        }
        self
    }
}

fn decode(raw: &str) -> Result<String, ServerError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| ServerError::InvalidRequest(format!("invalid percent-encoding in '{}'", raw)))
}

/// Resolves a method and path to a route.
pub(crate) fn route(method: &Method, path: &str, query: Option<&str>) -> Result<Route, ServerError> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let not_allowed = |allow: &'static str| ServerError::MethodNotAllowed {
        method: method.to_string(),
        path: path.to_string(),
        allow,
    };

    match segments.as_slice() {
        ["health"] | ["healthz"] => match *method {
            Method::GET => Ok(Route::Health),
            _ => Err(not_allowed("GET")),
        },
        ["definitions"] => match *method {
            Method::GET => Ok(Route::api(Operation::ListDefinitions)),
            Method::POST => Ok(Route::api(Operation::CreateDefinition)),
            _ => Err(not_allowed("GET, POST")),
        },
        ["definitions", id] => match *method {
            Method::GET => Ok(Route::api(Operation::GetDefinition).with("id", decode(id)?)),
            _ => Err(not_allowed("GET")),
        },
        ["instances"] => match *method {
            Method::GET => {
                let mut list = Route::api(Operation::ListInstances);
                for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    let value = decode(&value.replace('+', " "))?;
                    match key {
                        "definitionId" | "state" => list = list.with(key, value),
                        _ => {}
                    }
                }
                Ok(list)
            }
            Method::POST => Ok(Route::api(Operation::StartInstance)),
            _ => Err(not_allowed("GET, POST")),
        },
        ["instances", id] => match *method {
            Method::GET => {
                Ok(Route::api(Operation::GetInstance).with("instanceId", decode(id)?))
            }
            _ => Err(not_allowed("GET")),
        },
        ["instances", id, "execute"] => match *method {
            Method::POST => {
                Ok(Route::api(Operation::ExecuteAction).with("instanceId", decode(id)?))
            }
            _ => Err(not_allowed("POST")),
        },
        ["instances", id, "actions"] => match *method {
            Method::GET => {
                Ok(Route::api(Operation::ListActions).with("instanceId", decode(id)?))
            }
            _ => Err(not_allowed("GET")),
        },
        _ => Err(ServerError::RouteNotFound(path.to_string())),
    }
}

/// Reads a JSON body of at most `limit` bytes. An empty body reads as `{}`.
async fn read_json_body(body: Incoming, limit: usize) -> Result<Value, ServerError> {
    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.is::<LengthLimitError>() {
            ServerError::BodyTooLarge { limit }
        } else {
            ServerError::InvalidRequest(format!("failed to read body: {}", e))
        }
    })?;

    let bytes = collected.to_bytes();
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Merges path parameters into a JSON body. Path parameters win.
fn merge_params(body: Value, path_params: Map<String, Value>) -> Result<Value, ServerError> {
    if path_params.is_empty() {
        return Ok(body);
    }
    match body {
        Value::Object(mut map) => {
            map.extend(path_params);
            Ok(Value::Object(map))
        }
        _ => Err(ServerError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        )),
    }
}

fn json_response(response: Response) -> hyper::Response<Full<Bytes>> {
    let body = Bytes::from(response.body.to_string());
    let mut http = hyper::Response::new(Full::new(body));
    *http.status_mut() = response.status;
    http.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(location) = response.location {
        if let Ok(value) = HeaderValue::from_str(&location) {
            http.headers_mut().insert(LOCATION, value);
        }
    }
    http
}

fn health_response() -> hyper::Response<Full<Bytes>> {
    hyper::Response::new(Full::new(Bytes::from_static(b"OK")))
}

/// Routes one HTTP request through the handler.
async fn serve_request(
    req: hyper::Request<Incoming>,
    handler: Arc<CommandHandler>,
    max_body_bytes: usize,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::debug!("{} {}", method, req.uri());

    let routed = match route(&method, &path, req.uri().query()) {
        Ok(Route::Health) => return Ok(health_response()),
        Ok(Route::Api(op, path_params)) => {
            let params = if method == Method::POST {
                match read_json_body(req.into_body(), max_body_bytes).await {
                    Ok(body) => merge_params(body, path_params),
                    Err(e) => Err(e),
                }
            } else {
                Ok(Value::Object(path_params))
            };
            params.map(|params| Request::new(op, params))
        }
        Err(e) => Err(e),
    };

    match routed {
        Ok(request) => Ok(json_response(handler.handle(&request))),
        Err(e) => {
            tracing::debug!("Rejected {} {}: {}", method, path, e);
            let mut response = json_response(Response::error(&e));
            if let ServerError::MethodNotAllowed { allow, .. } = e {
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static(allow));
            }
            Ok(response)
        }
    }
}

/// HTTP server for wfengine.
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, engine: Arc<WorkflowEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handler = CommandHandler::new(engine);
        if let Some(ref metrics) = config.metrics {
            handler = handler.with_metrics(metrics.clone());
        }
        handler.update_gauge_metrics();

        Self {
            config,
            handler: Arc::new(handler),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Returns the command handler.
    pub fn handler(&self) -> &Arc<CommandHandler> {
        &self.handler
    }

    /// Returns whether the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on http://{}", listener.local_addr()?);

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if let Some(ref metrics) = self.config.metrics {
                                metrics.connections_total.inc();
                            }

                            let handler = self.handler.clone();
                            let max_body_bytes = self.config.max_body_bytes;

                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    serve_request(req, handler.clone(), max_body_bytes)
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Signals the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}
