//! Queue transport abstraction used by the request/reply exchange client.
//!
//! A [`QueueTransport`] opens a [`QueueSession`] against a named queue manager. Sessions open
//! queues for output or input, put [`OutboundEnvelope`]s and perform blocking gets filtered by
//! message id. Two implementations ship with the crate: [`NatsTransport`] for real deployments
//! and [`InMemoryTransport`] for tests and local demos.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

mod envelope;
mod memory;
mod nats;

pub use envelope::{
    DEFAULT_CHARACTER_SET, DEFAULT_ENCODING, FORMAT_STRING, MessageId, OutboundEnvelope,
    PUT_APPLICATION_NAME, PUT_APPLICATION_TYPE,
};
pub use memory::{BusEvent, Fault, InMemoryTransport, Published, Responder};
pub use nats::{NatsEndpoint, NatsTransport, headers};

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to queue manager {manager}: {source}")]
    Connect {
        manager: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to open queue {queue}: {reason}")]
    QueueOpen { queue: String, reason: String },
    #[error("queue {queue} is not open for {expected}")]
    WrongMode {
        queue: String,
        expected: &'static str,
    },
    #[error("put to {queue} failed: {reason}")]
    Put { queue: String, reason: String },
    #[error("get from {queue} failed: {reason}")]
    Get { queue: String, reason: String },
    #[error("no reply matching message id {message_id} on {queue} within {waited_ms} ms")]
    Timeout {
        queue: String,
        message_id: MessageId,
        waited_ms: u128,
    },
    #[error("close of {target} failed: {reason}")]
    Close { target: String, reason: String },
    #[error("session is disconnected")]
    Disconnected,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// How a queue is opened within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Output only; the session's own identity is stamped on put messages.
    Output,
    /// Output with authority to set every context field (user, application identity).
    OutputSetAllContext,
    /// Input shared with other readers of the same queue.
    InputShared,
    /// Input exclusive to this session.
    InputExclusive,
}

impl OpenMode {
    pub fn is_output(self) -> bool {
        matches!(self, OpenMode::Output | OpenMode::OutputSetAllContext)
    }

    pub fn is_input(self) -> bool {
        !self.is_output()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::Output => "output",
            OpenMode::OutputSetAllContext => "output+set-all-context",
            OpenMode::InputShared => "input-shared",
            OpenMode::InputExclusive => "input-exclusive",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a queue opened in a [`QueueSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    id: u64,
    name: String,
    mode: OpenMode,
}

impl QueueHandle {
    pub fn new(id: u64, name: impl Into<String>, mode: OpenMode) -> Self {
        Self {
            id,
            name: name.into(),
            mode,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }
}

/// Which identity context a put carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutContext {
    /// The transport stamps its own session identity.
    #[default]
    Default,
    /// The envelope's user and application identity are propagated as-is.
    SetAll,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    pub context: PutContext,
}

#[derive(Debug, Clone, Copy)]
pub struct GetOptions {
    pub wait: Duration,
    pub fail_if_quiescing: bool,
}

impl GetOptions {
    pub fn wait(wait: Duration) -> Self {
        Self {
            wait,
            fail_if_quiescing: true,
        }
    }
}

/// Selection criteria for a get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFilter {
    pub message_id: MessageId,
}

impl MatchFilter {
    pub fn message_id(message_id: MessageId) -> Self {
        Self { message_id }
    }

    pub fn matches(&self, candidate: &[u8]) -> bool {
        self.message_id.as_bytes() == candidate
    }
}

/// A message taken from an input queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub message_id: MessageId,
    pub payload: Vec<u8>,
}

impl ReplyMessage {
    pub fn new(message_id: MessageId, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id,
            payload: payload.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn open_session(&self, manager: &str) -> Result<Box<dyn QueueSession>, TransportError>;
}

#[async_trait]
pub trait QueueSession: Send {
    fn manager_name(&self) -> &str;

    async fn open_queue(&mut self, name: &str, mode: OpenMode)
    -> Result<QueueHandle, TransportError>;

    async fn put(
        &mut self,
        queue: &QueueHandle,
        envelope: &OutboundEnvelope,
        options: PutOptions,
    ) -> Result<(), TransportError>;

    async fn get(
        &mut self,
        queue: &QueueHandle,
        filter: &MatchFilter,
        options: GetOptions,
    ) -> Result<ReplyMessage, TransportError>;

    async fn close(&mut self, queue: QueueHandle) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

pub(crate) fn ensure_output(queue: &QueueHandle) -> Result<(), TransportError> {
    if queue.mode().is_output() {
        Ok(())
    } else {
        Err(TransportError::WrongMode {
            queue: queue.name().to_string(),
            expected: "output",
        })
    }
}

pub(crate) fn ensure_input(queue: &QueueHandle) -> Result<(), TransportError> {
    if queue.mode().is_input() {
        Ok(())
    } else {
        Err(TransportError::WrongMode {
            queue: queue.name().to_string(),
            expected: "input",
        })
    }
}
