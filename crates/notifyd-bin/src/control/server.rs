//! Control-socket server and client.
//!
//! The main application and the `stop`/`status` subcommands talk to the
//! daemon through this socket. One task per connection; a connection may
//! issue any number of requests, and a failed request never closes it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::control::protocol::{error_codes, Method, Request, Response};

/// Control server listening on a Unix domain socket.
pub struct ControlServer {
    socket_path: PathBuf,
    state: AppState,
    shutdown_tx: broadcast::Sender<()>,
}

impl ControlServer {
    /// Create a new control server.
    pub fn new(socket_path: PathBuf, state: AppState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            socket_path,
            state,
            shutdown_tx,
        }
    }

    /// Get a shutdown sender (for signal handlers that need to stop the server).
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Ask the accept loop to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Listen for connections until shutdown is requested.
    pub async fn run(&self) -> anyhow::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .with_context(|| format!("failed to remove {}", self.socket_path.display()))?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("failed to bind {}", self.socket_path.display()))?;
        info!(path = %self.socket_path.display(), "control server listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            let state = self.state.clone();
                            let shutdown_tx = self.shutdown_tx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, state, shutdown_tx).await {
                                    error!(error = %e, "control connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "control socket accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("control server shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);

        Ok(())
    }
}

/// Fallback shape for lines that fail to parse as a full [`Request`], so the
/// error response can still echo whatever id the caller sent.
#[derive(Debug, Deserialize)]
struct LooseRequest {
    #[serde(default)]
    id: String,
}

/// Serve one client: read requests line by line, write one response per line.
async fn handle_connection(
    stream: UnixStream,
    state: AppState,
    shutdown_tx: broadcast::Sender<()>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    debug!("control client connected");

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            debug!("control client disconnected");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!(request = %trimmed, "control request received");

        let response = match Request::from_json(trimmed) {
            Ok(request) => dispatch(&state, request, &shutdown_tx).await,
            Err(parse_err) => match serde_json::from_str::<LooseRequest>(trimmed) {
                Ok(loose) => {
                    warn!(error = %parse_err, "malformed control request");
                    Response::error(
                        &loose.id,
                        error_codes::INVALID_REQUEST,
                        "id and method are required",
                    )
                }
                Err(_) => {
                    warn!(error = %parse_err, "unparseable control request");
                    Response::error(
                        "",
                        error_codes::PARSE_ERROR,
                        &format!("parse error: {}", parse_err),
                    )
                }
            },
        };

        let response_json = response.to_json()?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Route one request to its handler.
async fn dispatch(state: &AppState, request: Request, shutdown_tx: &broadcast::Sender<()>) -> Response {
    let method = match Method::from_name(&request.method) {
        Some(method) => method,
        None => {
            return Response::error(
                &request.id,
                error_codes::METHOD_NOT_FOUND,
                &format!("unknown method: {}", request.method),
            );
        }
    };

    match method {
        Method::Health => Response::success(
            &request.id,
            serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        ),
        Method::Shutdown => {
            info!("shutdown requested over control socket");
            let _ = shutdown_tx.send(());
            Response::success(&request.id, serde_json::json!({ "stopping": true }))
        }
        Method::DeliveryTrigger => {
            let order_id = match order_id_param(&request) {
                Ok(order_id) => order_id,
                Err(response) => return response,
            };
            let accepted = state.delivery.trigger_delivery(&order_id);
            Response::success(&request.id, serde_json::json!({ "accepted": accepted }))
        }
        Method::DeliveryStatus => {
            let order_id = match order_id_param(&request) {
                Ok(order_id) => order_id,
                Err(response) => return response,
            };
            match state.delivery.delivery_status(&order_id).await {
                Some(snapshot) => serialized(&request.id, &snapshot),
                None => Response::success(&request.id, serde_json::Value::Null),
            }
        }
        Method::DeliveryStats => serialized(&request.id, &state.delivery.delivery_stats().await),
        Method::ChannelStatus => serialized(&request.id, &state.channel.status().await),
        Method::ChannelChallenge => Response::success(
            &request.id,
            serde_json::json!({ "challenge": state.channel.challenge().await }),
        ),
    }
}

/// Pull the required `orderId` string out of the request params.
fn order_id_param(request: &Request) -> Result<String, Response> {
    request
        .params
        .as_ref()
        .and_then(|params| params.get("orderId"))
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Response::error(
                &request.id,
                error_codes::INVALID_PARAMS,
                "orderId is required",
            )
        })
}

/// Wrap a serializable value in a success response.
fn serialized<T: Serialize>(id: &str, value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(json) => Response::success(id, json),
        Err(e) => Response::error(
            id,
            error_codes::INTERNAL_ERROR,
            &format!("serialization failed: {}", e),
        ),
    }
}

/// Client side of the control socket, used by the `stop` and `status`
/// subcommands and the startup singleton check.
pub struct ControlClient {
    socket_path: PathBuf,
}

impl ControlClient {
    /// Create a client for the given socket path.
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Send a request and wait for the response.
    pub async fn call(&self, request: Request) -> anyhow::Result<Response> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| format!("failed to connect to {}", self.socket_path.display()))?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let request_json = request.to_json()?;
        writer.write_all(request_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut line = String::new();
        reader.read_line(&mut line).await?;

        if line.is_empty() {
            anyhow::bail!("connection closed before a response arrived");
        }

        Ok(Response::from_json(line.trim())?)
    }

    /// Call a parameterless method.
    pub async fn call_method(&self, method: Method) -> anyhow::Result<Response> {
        self.call(Request::new(method)).await
    }

    /// Call a method that takes parameters.
    pub async fn call_method_with_params(
        &self,
        method: Method,
        params: serde_json::Value,
    ) -> anyhow::Result<Response> {
        self.call(Request::with_params(method, params)).await
    }
}
