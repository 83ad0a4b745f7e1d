//! Agent transports.
//!
//! Four wire shapes share one dispatch contract: a JSON
//! `{taskId, task, deadline}` payload goes out, task-status events come
//! back. Every transport also carries heartbeats; a missed heartbeat is
//! the orchestrator's signal to requeue (see
//! [`crate::AgentOrchestrator::check_heartbeats`]).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use taskforge_types::{
    Agent, AtomicTask, CoreError, CoreResult, TaskId, TaskStatus, TransportType,
};

/// Default dispatch timeout.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// The dispatch contract shared by every transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    /// Task being dispatched.
    pub task_id: TaskId,
    /// Full task body.
    pub task: AtomicTask,
    /// Completion deadline, when one exists.
    pub deadline: Option<DateTime<Utc>>,
}

/// A task-status event reported back by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportEvent {
    /// Task the event refers to.
    pub task_id: TaskId,
    /// New task status reported by the agent.
    pub status: TaskStatus,
    /// Optional agent-provided detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Frame discriminator for the WebSocket envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    /// Core-to-agent dispatch.
    Request,
    /// Agent-to-core status event.
    Response,
    /// Liveness signal, either direction.
    Heartbeat,
}

/// The JSON envelope carried in every WebSocket frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Frame kind.
    #[serde(rename = "type")]
    pub envelope_type: EnvelopeType,
    /// Correlation identifier.
    pub id: String,
    /// Frame body.
    pub payload: serde_json::Value,
}

/// One wire shape for reaching an agent.
#[async_trait]
pub trait AgentTransport: Send + Sync + std::fmt::Debug {
    /// Which transport this is.
    fn transport_type(&self) -> TransportType;

    /// Sends a task to the agent. Must complete (or fail) within the
    /// dispatch timeout; failure means the caller rolls the assignment
    /// back.
    async fn dispatch(&self, agent: &Agent, payload: &DispatchPayload) -> CoreResult<()>;

    /// Sends a liveness signal to the agent.
    async fn send_heartbeat(&self, agent: &Agent) -> CoreResult<()>;
}

/// Routes each agent to the transport implementation for its declared
/// transport type.
#[derive(Default)]
pub struct TransportRouter {
    transports: HashMap<TransportType, Arc<dyn AgentTransport>>,
}

impl TransportRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transport implementation.
    pub fn with(mut self, transport: Arc<dyn AgentTransport>) -> Self {
        self.transports.insert(transport.transport_type(), transport);
        self
    }

    /// The transport serving an agent.
    pub fn for_agent(&self, agent: &Agent) -> CoreResult<Arc<dyn AgentTransport>> {
        self.transports
            .get(&agent.transport_type)
            .cloned()
            .ok_or_else(|| {
                CoreError::TransportFailure(format!(
                    "no transport registered for {:?}",
                    agent.transport_type
                ))
            })
    }
}

//─────────────────────────────
//  stdio
//─────────────────────────────

/// Line-delimited JSON over a child process's stdin/stdout. One request
/// per line; response lines carry the task ID.
pub struct StdioTransport {
    stdin: Mutex<tokio::process::ChildStdin>,
    _child: Mutex<tokio::process::Child>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport").finish()
    }
}

impl StdioTransport {
    /// Spawns the agent process and wires its stdout into the event
    /// channel.
    pub fn spawn(
        program: &str,
        args: &[String],
        events: mpsc::Sender<TransportEvent>,
    ) -> CoreResult<Self> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::TransportFailure(format!("spawning {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CoreError::TransportFailure("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CoreError::TransportFailure("child stdout unavailable".into()))?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<TransportEvent>(&line) {
                    Ok(event) => {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "discarding unparseable stdio line"),
                }
            }
            debug!("stdio reader finished");
        });

        Ok(Self {
            stdin: Mutex::new(stdin),
            _child: Mutex::new(child),
        })
    }

    async fn write_line(&self, line: String) -> CoreResult<()> {
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| CoreError::TransportFailure(format!("stdio write: {e}")))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| CoreError::TransportFailure(format!("stdio write: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| CoreError::TransportFailure(format!("stdio flush: {e}")))
    }
}

#[async_trait]
impl AgentTransport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    async fn dispatch(&self, _agent: &Agent, payload: &DispatchPayload) -> CoreResult<()> {
        let line = serde_json::to_string(payload)
            .map_err(|e| CoreError::Internal(format!("encoding dispatch: {e}")))?;
        self.write_line(line).await
    }

    async fn send_heartbeat(&self, _agent: &Agent) -> CoreResult<()> {
        self.write_line("{\"type\":\"heartbeat\"}".to_string()).await
    }
}

//─────────────────────────────
//  HTTP
//─────────────────────────────

/// Authenticated POST to the agent's endpoint, with polling for agents
/// without a push channel.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish()
    }
}

impl HttpTransport {
    /// Creates the transport with the default dispatch timeout.
    pub fn new() -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_DISPATCH_TIMEOUT)
            .build()
            .map_err(|e| CoreError::TransportFailure(format!("building http client: {e}")))?;
        Ok(Self { client })
    }

    fn endpoint(agent: &Agent) -> CoreResult<String> {
        agent
            .metadata
            .http_endpoint
            .clone()
            .ok_or_else(|| {
                CoreError::TransportFailure(format!(
                    "agent {} has no http endpoint configured",
                    agent.agent_id
                ))
            })
    }

    fn authorized(&self, request: reqwest::RequestBuilder, agent: &Agent) -> reqwest::RequestBuilder {
        match &agent.metadata.http_auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Polls the agent for buffered status events.
    pub async fn poll_events(&self, agent: &Agent) -> CoreResult<Vec<TransportEvent>> {
        let url = format!("{}/events", Self::endpoint(agent)?);
        let response = self
            .authorized(self.client.get(&url), agent)
            .send()
            .await
            .map_err(|e| CoreError::TransportFailure(format!("polling {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::TransportFailure(format!(
                "polling {url}: status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| CoreError::TransportFailure(format!("decoding poll body: {e}")))
    }
}

#[async_trait]
impl AgentTransport for HttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }

    async fn dispatch(&self, agent: &Agent, payload: &DispatchPayload) -> CoreResult<()> {
        let url = format!("{}/tasks", Self::endpoint(agent)?);
        let response = self
            .authorized(self.client.post(&url), agent)
            .json(payload)
            .send()
            .await
            .map_err(|e| CoreError::TransportFailure(format!("dispatch to {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::TransportFailure(format!(
                "dispatch to {url}: status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn send_heartbeat(&self, agent: &Agent) -> CoreResult<()> {
        let url = format!("{}/heartbeat", Self::endpoint(agent)?);
        self.authorized(self.client.post(&url), agent)
            .send()
            .await
            .map_err(|e| CoreError::TransportFailure(format!("heartbeat to {url}: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::TransportFailure(format!("heartbeat to {url}: {e}")))?;
        Ok(())
    }
}

//─────────────────────────────
//  SSE
//─────────────────────────────

/// Server-sent events: requests are POSTed, responses arrive on the
/// agent's subscribed event stream.
pub struct SseTransport {
    http: HttpTransport,
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport").finish()
    }
}

impl SseTransport {
    /// Creates the transport.
    pub fn new() -> CoreResult<Self> {
        Ok(Self {
            http: HttpTransport::new()?,
        })
    }

    /// Subscribes to the agent's SSE channel, forwarding each `data:` line
    /// that parses as a [`TransportEvent`].
    pub async fn subscribe(
        &self,
        agent: &Agent,
        events: mpsc::Sender<TransportEvent>,
    ) -> CoreResult<()> {
        let url = format!("{}/stream", HttpTransport::endpoint(agent)?);
        let response = self
            .http
            .authorized(self.http.client.get(&url), agent)
            .send()
            .await
            .map_err(|e| CoreError::TransportFailure(format!("subscribing {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(CoreError::TransportFailure(format!(
                "subscribing {url}: status {}",
                response.status()
            )));
        }

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(newline) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline).collect();
                    let line = line.trim();
                    if let Some(data) = line.strip_prefix("data:") {
                        match serde_json::from_str::<TransportEvent>(data.trim()) {
                            Ok(event) => {
                                if events.send(event).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "discarding unparseable sse event"),
                        }
                    }
                }
            }
            debug!("sse stream closed");
        });
        Ok(())
    }
}

#[async_trait]
impl AgentTransport for SseTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Sse
    }

    async fn dispatch(&self, agent: &Agent, payload: &DispatchPayload) -> CoreResult<()> {
        self.http.dispatch(agent, payload).await
    }

    async fn send_heartbeat(&self, agent: &Agent) -> CoreResult<()> {
        self.http.send_heartbeat(agent).await
    }
}

//─────────────────────────────
//  WebSocket
//─────────────────────────────

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    tokio_tungstenite::tungstenite::Message,
>;

/// Bidirectional JSON envelopes over WebSocket frames.
pub struct WebSocketTransport {
    sink: Mutex<WsSink>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport").finish()
    }
}

impl WebSocketTransport {
    /// Connects to an agent's WebSocket endpoint and forwards response
    /// envelopes into the event channel.
    pub async fn connect(
        url: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> CoreResult<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| CoreError::TransportFailure(format!("connecting {url}: {e}")))?;
        let (sink, mut read) = stream.split();

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                let Ok(frame) = frame else { break };
                let Ok(text) = frame.into_text() else { continue };
                let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
                    warn!("discarding unparseable websocket frame");
                    continue;
                };
                if envelope.envelope_type != EnvelopeType::Response {
                    continue;
                }
                match serde_json::from_value::<TransportEvent>(envelope.payload) {
                    Ok(event) => {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "response envelope with bad payload"),
                }
            }
            debug!("websocket reader finished");
        });

        Ok(Self {
            sink: Mutex::new(sink),
        })
    }

    async fn send_envelope(&self, envelope: &Envelope) -> CoreResult<()> {
        let text = serde_json::to_string(envelope)
            .map_err(|e| CoreError::Internal(format!("encoding envelope: {e}")))?;
        self.sink
            .lock()
            .await
            .send(tokio_tungstenite::tungstenite::Message::Text(text))
            .await
            .map_err(|e| CoreError::TransportFailure(format!("websocket send: {e}")))
    }
}

#[async_trait]
impl AgentTransport for WebSocketTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Websocket
    }

    async fn dispatch(&self, _agent: &Agent, payload: &DispatchPayload) -> CoreResult<()> {
        self.send_envelope(&Envelope {
            envelope_type: EnvelopeType::Request,
            id: Uuid::new_v4().to_string(),
            payload: serde_json::to_value(payload)
                .map_err(|e| CoreError::Internal(format!("encoding dispatch: {e}")))?,
        })
        .await
    }

    async fn send_heartbeat(&self, _agent: &Agent) -> CoreResult<()> {
        self.send_envelope(&Envelope {
            envelope_type: EnvelopeType::Heartbeat,
            id: Uuid::new_v4().to_string(),
            payload: serde_json::Value::Null,
        })
        .await
    }
}
