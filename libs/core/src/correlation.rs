//! Message identifiers of the form `<yyyyMMddHHmmss><suffix>`, suffix in `[0, 10000)`.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smq_bus::MessageId;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};
use time::{OffsetDateTime, UtcOffset};

pub const SUFFIX_BOUND: u32 = 10_000;

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Source of the numeric suffix appended to the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuffixStrategy {
    /// Thread-local CSPRNG; independent of the clock.
    #[default]
    Random,
    /// Fresh generator seeded with the timestamp's seconds field. Ids generated within the same
    /// second collide; kept for replaying legacy traffic.
    SecondSeeded,
}

impl FromStr for SuffixStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(SuffixStrategy::Random),
            "second-seeded" => Ok(SuffixStrategy::SecondSeeded),
            other => Err(format!(
                "unknown suffix strategy {other}; expected random | second-seeded"
            )),
        }
    }
}

impl SuffixStrategy {
    pub fn draw(self, now: OffsetDateTime) -> u32 {
        match self {
            SuffixStrategy::Random => rand::rng().random_range(0..SUFFIX_BOUND),
            SuffixStrategy::SecondSeeded => {
                StdRng::seed_from_u64(u64::from(now.second())).random_range(0..SUFFIX_BOUND)
            }
        }
    }
}

/// Renders an identifier from a timestamp and an already drawn suffix.
pub fn format_id(now: OffsetDateTime, suffix: u32) -> MessageId {
    MessageId::from(format!(
        "{:04}{:02}{:02}{:02}{:02}{:02}{}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        suffix % SUFFIX_BOUND
    ))
}

/// Local UTC offset, resolved on first use and cached. The lookup only succeeds while the process
/// is single-threaded, so binaries call this before starting any worker threads; UTC otherwise.
pub fn local_offset() -> UtcOffset {
    *LOCAL_OFFSET.get_or_init(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC))
}

pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(local_offset())
}

pub trait CorrelationIdGenerator: Send + Sync {
    fn generate(&self, now: OffsetDateTime) -> MessageId;
}

/// Default generator. With [`SuffixStrategy::Random`] it never returns the same id twice in a
/// row.
#[derive(Debug, Default)]
pub struct TimestampIdGenerator {
    strategy: SuffixStrategy,
    last: Mutex<Option<MessageId>>,
}

impl TimestampIdGenerator {
    pub fn new(strategy: SuffixStrategy) -> Self {
        Self {
            strategy,
            last: Mutex::new(None),
        }
    }
}

impl CorrelationIdGenerator for TimestampIdGenerator {
    fn generate(&self, now: OffsetDateTime) -> MessageId {
        let mut id = format_id(now, self.strategy.draw(now));
        if self.strategy == SuffixStrategy::SecondSeeded {
            return id;
        }
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        while last.as_ref() == Some(&id) {
            id = format_id(now, SuffixStrategy::Random.draw(now));
        }
        *last = Some(id.clone());
        id
    }
}
