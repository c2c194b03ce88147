use std::fmt;
use time::OffsetDateTime;

/// Application name stamped on every request.
pub const PUT_APPLICATION_NAME: &str = "SendMQMessage";
/// Put-application type stamped on every request (0b11100).
pub const PUT_APPLICATION_TYPE: i32 = 28;
/// Format name for text payloads.
pub const FORMAT_STRING: &str = "MQSTR";
/// Coded character set advertised for the payload.
pub const DEFAULT_CHARACTER_SET: i32 = 950;
/// Numeric encoding advertised for the payload.
pub const DEFAULT_ENCODING: i32 = 546;

/// Message identifier used to correlate a request with its reply.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MessageId(Vec<u8>);

impl MessageId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<Vec<u8>> for MessageId {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({self})")
    }
}

/// Request put on the send queue. Built per message and dropped once the put returns.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEnvelope {
    pub message_id: MessageId,
    pub user_id: String,
    pub put_application_name: String,
    pub put_application_type: i32,
    pub application_id_data: Option<String>,
    pub format: String,
    pub character_set: i32,
    pub encoding: i32,
    pub put_date_time: OffsetDateTime,
    pub reply_to_queue: String,
    pub payload: String,
}

impl OutboundEnvelope {
    pub fn new(
        message_id: MessageId,
        user_id: impl Into<String>,
        reply_to_queue: impl Into<String>,
        payload: impl Into<String>,
        put_date_time: OffsetDateTime,
    ) -> Self {
        Self {
            message_id,
            user_id: user_id.into(),
            put_application_name: PUT_APPLICATION_NAME.to_string(),
            put_application_type: PUT_APPLICATION_TYPE,
            application_id_data: None,
            format: FORMAT_STRING.to_string(),
            character_set: DEFAULT_CHARACTER_SET,
            encoding: DEFAULT_ENCODING,
            put_date_time,
            reply_to_queue: reply_to_queue.into(),
            payload: payload.into(),
        }
    }

    pub fn with_application_id_data(mut self, tag: impl Into<String>) -> Self {
        self.application_id_data = Some(tag.into());
        self
    }

    pub fn with_coding(mut self, character_set: i32, encoding: i32) -> Self {
        self.character_set = character_set;
        self.encoding = encoding;
        self
    }

    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_bytes()
    }
}
