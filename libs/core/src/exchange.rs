//! Send-and-await-reply over a [`QueueTransport`] session.
use crate::config::SessionConfig;
use crate::correlation::{CorrelationIdGenerator, TimestampIdGenerator, local_now};
use crate::error::ExchangeError;
use crate::log::SharedEventLog;
use smq_bus::{
    GetOptions, MatchFilter, OpenMode, OutboundEnvelope, PutContext, PutOptions, QueueHandle,
    QueueSession, QueueTransport, TransportError,
};
use std::sync::Arc;

/// Message reported when no reply is awaited.
pub const SENT_WITHOUT_REPLY: &str = "Successfully Send Message";

/// Reply text on success, failure description on error.
pub type ExchangeOutcome = Result<String, ExchangeError>;

/// Owns one transport session for the lifetime of a run.
pub struct ExchangeClient {
    transport: Arc<dyn QueueTransport>,
    config: SessionConfig,
    ids: Box<dyn CorrelationIdGenerator>,
    log: SharedEventLog,
    session: Option<Box<dyn QueueSession>>,
    send_queue: Option<QueueHandle>,
    reply_queue: Option<QueueHandle>,
}

impl ExchangeClient {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        config: SessionConfig,
        log: SharedEventLog,
    ) -> Self {
        let ids = Box::new(TimestampIdGenerator::new(config.id_suffix));
        Self {
            transport,
            config,
            ids,
            log,
            session: None,
            send_queue: None,
            reply_queue: None,
        }
    }

    pub fn with_id_generator(mut self, ids: impl CorrelationIdGenerator + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some() && self.send_queue.is_some() && self.reply_queue.is_some()
    }

    /// Opens the session, the send queue for output with full context and the reply queue for
    /// shared input.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.connect_with(OpenMode::OutputSetAllContext, OpenMode::InputShared)
            .await
    }

    /// Like [`connect`](Self::connect) with caller-chosen open modes. Whatever was opened before
    /// a failure stays recorded so [`disconnect`](Self::disconnect) can release it.
    pub async fn connect_with(
        &mut self,
        output: OpenMode,
        input: OpenMode,
    ) -> Result<(), TransportError> {
        if self.session.is_none() {
            let session = self
                .transport
                .open_session(&self.config.manager_name)
                .await?;
            self.log.info(&format!(
                "Connect MQQueueManager[Name={}][Channel={}][ConnectionName={}]",
                session.manager_name(),
                self.config.channel,
                self.config.connection_name()
            ));
            self.session = Some(session);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(TransportError::Disconnected);
        };
        if self.send_queue.is_none() {
            let queue = session.open_queue(&self.config.queue_name, output).await?;
            self.log
                .info(&format!("Connect MQQueue[Gateway][Name={}]", queue.name()));
            self.send_queue = Some(queue);
        }
        if self.reply_queue.is_none() {
            let queue = session
                .open_queue(&self.config.reply_queue_name, input)
                .await?;
            self.log
                .info(&format!("Connect MQQueue[Reply][Name={}]", queue.name()));
            self.reply_queue = Some(queue);
        }
        Ok(())
    }

    /// Releases the send queue, the reply queue and the session, in that order. Safe to call
    /// repeatedly or without a prior connect.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.send_queue = None;
            self.reply_queue = None;
            return;
        };
        if let Some(queue) = self.send_queue.take() {
            self.log
                .info(&format!("Disconnect MQQueue[Gateway][Name={}]", queue.name()));
            if let Err(err) = session.close(queue).await {
                self.log.warn(&format!("close gateway queue failed: {err}"));
            }
        }
        if let Some(queue) = self.reply_queue.take() {
            self.log
                .info(&format!("Disconnect MQQueue[Reply][Name={}]", queue.name()));
            if let Err(err) = session.close(queue).await {
                self.log.warn(&format!("close reply queue failed: {err}"));
            }
        }
        if let Some(mut session) = self.session.take() {
            let manager = session.manager_name().to_string();
            if let Err(err) = session.disconnect().await {
                self.log
                    .warn(&format!("disconnect from {manager} failed: {err}"));
            }
            self.log
                .info(&format!("Disconnect MQQueueManager[Name={manager}]"));
        }
    }

    /// Puts `payload` on the send queue and, when replies are expected, waits for the reply whose
    /// message id matches the request. Never fails outright: every path yields an outcome.
    pub async fn send_message(&mut self, payload: &str, tag: &str) -> ExchangeOutcome {
        let outcome = self.exchange(payload, tag).await;
        if let Err(err) = &outcome {
            self.log.debug(&format!("exchange failed: {err}"));
        }
        outcome
    }

    async fn exchange(&mut self, payload: &str, tag: &str) -> ExchangeOutcome {
        let (Some(session), Some(send_queue), Some(reply_queue)) = (
            self.session.as_mut(),
            self.send_queue.as_ref(),
            self.reply_queue.as_ref(),
        ) else {
            return Err(ExchangeError::NotConnected);
        };

        let now = local_now();
        let message_id = self.ids.generate(now);
        let mut envelope = OutboundEnvelope::new(
            message_id.clone(),
            self.config.user_id.as_str(),
            self.config.reply_queue_name.as_str(),
            payload,
            now,
        )
        .with_coding(self.config.character_set, self.config.encoding);
        if self.config.include_application_tag {
            envelope = envelope.with_application_id_data(tag);
        }

        let put = PutOptions {
            context: PutContext::SetAll,
        };
        session
            .put(send_queue, &envelope, put)
            .await
            .map_err(ExchangeError::Put)?;
        self.log.debug(&format!(
            "put message {message_id} to {}",
            send_queue.name()
        ));

        if !self.config.need_reply {
            return Ok(SENT_WITHOUT_REPLY.to_string());
        }

        let reply = session
            .get(
                reply_queue,
                &MatchFilter::message_id(message_id),
                GetOptions::wait(self.config.wait_reply_interval),
            )
            .await
            .map_err(ExchangeError::Get)?;
        self.log
            .debug(&format!("reply matched message {}", reply.message_id));
        Ok(reply.text())
    }
}
