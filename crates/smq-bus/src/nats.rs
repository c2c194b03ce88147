use crate::{
    GetOptions, MatchFilter, MessageId, OpenMode, OutboundEnvelope, PutContext, PutOptions,
    QueueHandle, QueueSession, QueueTransport, ReplyMessage, TransportError, ensure_input,
    ensure_output,
};
use async_nats::{Client, ConnectOptions, HeaderMap, Subscriber, connection::State};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use time::format_description::well_known::Rfc3339;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Replies held for later gets when they do not match the id currently awaited.
const BACKLOG_LIMIT: usize = 256;

/// Header names carrying envelope metadata over NATS.
pub mod headers {
    pub const MSG_ID: &str = "Msg-Id";
    pub const REPLY_TO_QUEUE: &str = "Reply-To-Q";
    pub const USER_ID: &str = "User-Id";
    pub const PUT_APPL_NAME: &str = "Put-Appl-Name";
    pub const PUT_APPL_TYPE: &str = "Put-Appl-Type";
    pub const APPL_ID_DATA: &str = "Appl-Id-Data";
    pub const FORMAT: &str = "Format";
    pub const CCSID: &str = "Ccsid";
    pub const ENCODING: &str = "Encoding";
    pub const PUT_DATE_TIME: &str = "Put-Date-Time";
}

/// Where the NATS server lives and how queue names map onto subjects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatsEndpoint {
    pub host: String,
    pub port: u16,
    /// Subject prefix; queue `Q` becomes `<channel>.Q`.
    pub channel: String,
}

impl NatsEndpoint {
    pub fn url(&self) -> String {
        format!("nats://{}:{}", self.host, self.port)
    }

    pub fn subject_for(&self, queue: &str) -> String {
        if self.channel.is_empty() {
            queue.to_string()
        } else {
            format!("{}.{}", self.channel, queue)
        }
    }
}

pub struct NatsTransport {
    endpoint: NatsEndpoint,
}

impl NatsTransport {
    pub fn new(endpoint: NatsEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl QueueTransport for NatsTransport {
    async fn open_session(&self, manager: &str) -> Result<Box<dyn QueueSession>, TransportError> {
        let url = self.endpoint.url();
        let client = ConnectOptions::new()
            .name(manager)
            .connect(url.as_str())
            .await
            .map_err(|err| TransportError::Connect {
                manager: manager.to_string(),
                source: anyhow::Error::new(err),
            })?;
        debug!(%url, manager, "nats session opened");
        Ok(Box::new(NatsSession {
            client,
            endpoint: self.endpoint.clone(),
            manager: manager.to_string(),
            outputs: HashMap::new(),
            inputs: HashMap::new(),
            next_handle: 0,
            connected: true,
        }))
    }
}

/// Replies taken off a subscription while a different message id was awaited.
#[derive(Debug)]
struct ReplyBacklog {
    held: VecDeque<ReplyMessage>,
    limit: usize,
}

impl ReplyBacklog {
    fn new(limit: usize) -> Self {
        Self {
            held: VecDeque::new(),
            limit,
        }
    }

    fn take_matching(&mut self, filter: &MatchFilter) -> Option<ReplyMessage> {
        let position = self
            .held
            .iter()
            .position(|msg| filter.matches(msg.message_id.as_bytes()))?;
        self.held.remove(position)
    }

    /// Keeps `reply`; returns the oldest held reply when the backlog was already full.
    fn hold(&mut self, reply: ReplyMessage) -> Option<ReplyMessage> {
        let evicted = if self.held.len() >= self.limit {
            self.held.pop_front()
        } else {
            None
        };
        self.held.push_back(reply);
        evicted
    }
}

struct InputQueue {
    subject: String,
    subscriber: Subscriber,
    backlog: ReplyBacklog,
}

impl InputQueue {
    fn hold(&mut self, reply: ReplyMessage) {
        if let Some(dropped) = self.backlog.hold(reply) {
            warn!(
                subject = %self.subject,
                message_id = %dropped.message_id,
                "reply backlog full; dropping oldest"
            );
        }
    }
}

struct NatsSession {
    client: Client,
    endpoint: NatsEndpoint,
    manager: String,
    outputs: HashMap<u64, String>,
    inputs: HashMap<u64, InputQueue>,
    next_handle: u64,
    connected: bool,
}

impl NatsSession {
    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

#[async_trait]
impl QueueSession for NatsSession {
    fn manager_name(&self) -> &str {
        &self.manager
    }

    async fn open_queue(
        &mut self,
        name: &str,
        mode: OpenMode,
    ) -> Result<QueueHandle, TransportError> {
        self.ensure_connected()?;
        let subject = self.endpoint.subject_for(name);
        self.next_handle += 1;
        let handle = QueueHandle::new(self.next_handle, name, mode);
        if mode.is_output() {
            self.outputs.insert(handle.id(), subject);
        } else {
            let subscriber = self.client.subscribe(subject.clone()).await.map_err(|err| {
                TransportError::QueueOpen {
                    queue: name.to_string(),
                    reason: err.to_string(),
                }
            })?;
            self.inputs.insert(
                handle.id(),
                InputQueue {
                    subject,
                    subscriber,
                    backlog: ReplyBacklog::new(BACKLOG_LIMIT),
                },
            );
        }
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
        let subject = self
            .outputs
            .get(&queue.id())
            .cloned()
            .ok_or_else(|| TransportError::Put {
                queue: queue.name().to_string(),
                reason: "queue is not open in this session".into(),
            })?;
        let put_err = |reason: String| TransportError::Put {
            queue: queue.name().to_string(),
            reason,
        };
        self.client
            .publish_with_headers(
                subject,
                envelope_headers(envelope, options.context),
                envelope.payload.clone().into(),
            )
            .await
            .map_err(|err| put_err(err.to_string()))?;
        self.client
            .flush()
            .await
            .map_err(|err| put_err(err.to_string()))
    }

    async fn get(
        &mut self,
        queue: &QueueHandle,
        filter: &MatchFilter,
        options: GetOptions,
    ) -> Result<ReplyMessage, TransportError> {
        self.ensure_connected()?;
        ensure_input(queue)?;
        let quiescing = !matches!(self.client.connection_state(), State::Connected);
        if options.fail_if_quiescing && quiescing {
            return Err(TransportError::Get {
                queue: queue.name().to_string(),
                reason: "connection is quiescing".into(),
            });
        }
        let input = self
            .inputs
            .get_mut(&queue.id())
            .ok_or_else(|| TransportError::Get {
                queue: queue.name().to_string(),
                reason: "queue is not open in this session".into(),
            })?;
        if let Some(reply) = input.backlog.take_matching(filter) {
            return Ok(reply);
        }

        let started = Instant::now();
        let deadline = started + options.wait;
        loop {
            match tokio::time::timeout_at(deadline, input.subscriber.next()).await {
                Err(_) => {
                    return Err(TransportError::Timeout {
                        queue: queue.name().to_string(),
                        message_id: filter.message_id.clone(),
                        waited_ms: started.elapsed().as_millis(),
                    });
                }
                Ok(None) => {
                    return Err(TransportError::Get {
                        queue: queue.name().to_string(),
                        reason: "subscription closed".into(),
                    });
                }
                Ok(Some(message)) => {
                    let Some(id) = message
                        .headers
                        .as_ref()
                        .and_then(|map| map.get(headers::MSG_ID))
                        .map(|value| MessageId::from(value.as_str()))
                    else {
                        debug!(subject = %input.subject, "ignoring reply without message id");
                        continue;
                    };
                    let reply = ReplyMessage::new(id, message.payload.to_vec());
                    if filter.matches(reply.message_id.as_bytes()) {
                        return Ok(reply);
                    }
                    input.hold(reply);
                }
            }
        }
    }

    async fn close(&mut self, queue: QueueHandle) -> Result<(), TransportError> {
        self.ensure_connected()?;
        if self.outputs.remove(&queue.id()).is_some() {
            return Ok(());
        }
        match self.inputs.remove(&queue.id()) {
            Some(mut input) => {
                input
                    .subscriber
                    .unsubscribe()
                    .await
                    .map_err(|err| TransportError::Close {
                        target: queue.name().to_string(),
                        reason: err.to_string(),
                    })
            }
            None => Ok(()),
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.connected = false;
        self.outputs.clear();
        self.inputs.clear();
        self.client
            .flush()
            .await
            .map_err(|err| TransportError::Close {
                target: self.manager.clone(),
                reason: err.to_string(),
            })
    }
}

/// Maps envelope metadata onto NATS headers. Identity headers are only carried when the put
/// propagates the full context.
pub(crate) fn envelope_headers(envelope: &OutboundEnvelope, context: PutContext) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(headers::MSG_ID, envelope.message_id.to_string());
    map.insert(headers::REPLY_TO_QUEUE, envelope.reply_to_queue.as_str());
    map.insert(headers::FORMAT, envelope.format.as_str());
    map.insert(headers::CCSID, envelope.character_set.to_string());
    map.insert(headers::ENCODING, envelope.encoding.to_string());
    if let Ok(ts) = envelope.put_date_time.format(&Rfc3339) {
        map.insert(headers::PUT_DATE_TIME, ts);
    }
    if context == PutContext::SetAll {
        map.insert(headers::USER_ID, envelope.user_id.as_str());
        map.insert(headers::PUT_APPL_NAME, envelope.put_application_name.as_str());
        map.insert(
            headers::PUT_APPL_TYPE,
            envelope.put_application_type.to_string(),
        );
        if let Some(tag) = &envelope.application_id_data {
            map.insert(headers::APPL_ID_DATA, tag.as_str());
        }
    }
    map
}
