use crate::{
    GetOptions, MatchFilter, MessageId, OpenMode, OutboundEnvelope, PutContext, PutOptions,
    QueueHandle, QueueSession, QueueTransport, ReplyMessage, TransportError, ensure_input,
    ensure_output,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Produces the reply (if any) for a request put on any queue of the in-memory broker.
pub type Responder = Arc<dyn Fn(&OutboundEnvelope) -> Option<ReplyMessage> + Send + Sync>;

/// Lifecycle record kept by [`InMemoryTransport`] for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    SessionOpened { manager: String },
    QueueOpened { name: String, mode: OpenMode },
    Put { queue: String, message_id: MessageId },
    Got { queue: String, message_id: MessageId },
    QueueClosed { name: String },
    Disconnected { manager: String },
}

/// Failure injected into the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Connect,
    OpenQueue(String),
    Put,
    Get,
}

/// A request observed by the broker, with the (Tokio) instant of the put.
#[derive(Debug, Clone)]
pub struct Published {
    pub queue: String,
    pub context: PutContext,
    pub envelope: OutboundEnvelope,
    pub at: Instant,
}

#[derive(Default)]
struct Broker {
    queues: HashMap<String, VecDeque<ReplyMessage>>,
    responder: Option<Responder>,
    faults: Vec<Fault>,
    events: Vec<BusEvent>,
    published: Vec<Published>,
    next_handle: u64,
}

impl Broker {
    fn has_fault(&self, fault: &Fault) -> bool {
        self.faults.contains(fault)
    }

    fn take_matching(&mut self, queue: &str, filter: &MatchFilter) -> Option<ReplyMessage> {
        let messages = self.queues.get_mut(queue)?;
        let position = messages
            .iter()
            .position(|msg| filter.matches(msg.message_id.as_bytes()))?;
        messages.remove(position)
    }
}

/// Queue transport backed by shared in-process queues.
///
/// Clones share the same broker, so a test can keep one handle for assertions while the
/// exchange client owns another.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    broker: Arc<Mutex<Broker>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replies to every request with its own payload under the same message id.
    pub fn echo() -> Self {
        Self::with_responder(|env| {
            Some(ReplyMessage::new(
                env.message_id.clone(),
                env.payload.as_bytes().to_vec(),
            ))
        })
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&OutboundEnvelope) -> Option<ReplyMessage> + Send + Sync + 'static,
    {
        Self {
            broker: Arc::new(Mutex::new(Broker {
                responder: Some(Arc::new(responder)),
                ..Broker::default()
            })),
        }
    }

    pub async fn set_responder(&self, responder: Option<Responder>) {
        self.broker.lock().await.responder = responder;
    }

    pub async fn inject(&self, fault: Fault) {
        self.broker.lock().await.faults.push(fault);
    }

    pub async fn clear_faults(&self) {
        self.broker.lock().await.faults.clear();
    }

    /// Places a message directly on a queue, as another producer would.
    pub async fn enqueue(&self, queue: &str, message: ReplyMessage) {
        self.broker
            .lock()
            .await
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
    }

    pub async fn depth(&self, queue: &str) -> usize {
        self.broker
            .lock()
            .await
            .queues
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub async fn events(&self) -> Vec<BusEvent> {
        self.broker.lock().await.events.clone()
    }

    pub async fn published(&self) -> Vec<Published> {
        self.broker.lock().await.published.clone()
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn open_session(&self, manager: &str) -> Result<Box<dyn QueueSession>, TransportError> {
        let mut broker = self.broker.lock().await;
        if broker.has_fault(&Fault::Connect) {
            return Err(TransportError::Connect {
                manager: manager.to_string(),
                source: anyhow::anyhow!("queue manager unavailable"),
            });
        }
        broker.events.push(BusEvent::SessionOpened {
            manager: manager.to_string(),
        });
        Ok(Box::new(InMemorySession {
            broker: Arc::clone(&self.broker),
            manager: manager.to_string(),
            connected: true,
        }))
    }
}

struct InMemorySession {
    broker: Arc<Mutex<Broker>>,
    manager: String,
    connected: bool,
}

impl InMemorySession {
    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

#[async_trait]
impl QueueSession for InMemorySession {
    fn manager_name(&self) -> &str {
        &self.manager
    }

    async fn open_queue(
        &mut self,
        name: &str,
        mode: OpenMode,
    ) -> Result<QueueHandle, TransportError> {
        self.ensure_connected()?;
        let mut broker = self.broker.lock().await;
        if broker.has_fault(&Fault::OpenQueue(name.to_string())) {
            return Err(TransportError::QueueOpen {
                queue: name.to_string(),
                reason: "unknown object name".into(),
            });
        }
        broker.next_handle += 1;
        let handle = QueueHandle::new(broker.next_handle, name, mode);
        broker.queues.entry(name.to_string()).or_default();
        broker.events.push(BusEvent::QueueOpened {
            name: name.to_string(),
            mode,
        });
        Ok(handle)
    }

    async fn put(
        &mut self,
        queue: &QueueHandle,
        envelope: &OutboundEnvelope,
        options: PutOptions,
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        ensure_output(queue)?;
        let mut broker = self.broker.lock().await;
        if broker.has_fault(&Fault::Put) {
            return Err(TransportError::Put {
                queue: queue.name().to_string(),
                reason: "put inhibited".into(),
            });
        }
        broker.events.push(BusEvent::Put {
            queue: queue.name().to_string(),
            message_id: envelope.message_id.clone(),
        });
        broker.published.push(Published {
            queue: queue.name().to_string(),
            context: options.context,
            envelope: envelope.clone(),
            at: Instant::now(),
        });
        let reply = broker.responder.as_ref().and_then(|respond| respond(envelope));
        if let Some(reply) = reply {
            broker
                .queues
                .entry(envelope.reply_to_queue.clone())
                .or_default()
                .push_back(reply);
        }
        Ok(())
    }

    async fn get(
        &mut self,
        queue: &QueueHandle,
        filter: &MatchFilter,
        options: GetOptions,
    ) -> Result<ReplyMessage, TransportError> {
        self.ensure_connected()?;
        ensure_input(queue)?;
        let started = Instant::now();
        let deadline = started + options.wait;
        loop {
            {
                let mut broker = self.broker.lock().await;
                if broker.has_fault(&Fault::Get) {
                    return Err(TransportError::Get {
                        queue: queue.name().to_string(),
                        reason: "get inhibited".into(),
                    });
                }
                if let Some(message) = broker.take_matching(queue.name(), filter) {
                    broker.events.push(BusEvent::Got {
                        queue: queue.name().to_string(),
                        message_id: message.message_id.clone(),
                    });
                    return Ok(message);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::Timeout {
                    queue: queue.name().to_string(),
                    message_id: filter.message_id.clone(),
                    waited_ms: now.duration_since(started).as_millis(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn close(&mut self, queue: QueueHandle) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.broker.lock().await.events.push(BusEvent::QueueClosed {
            name: queue.name().to_string(),
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.connected = false;
        self.broker.lock().await.events.push(BusEvent::Disconnected {
            manager: self.manager.clone(),
        });
        Ok(())
    }
}
