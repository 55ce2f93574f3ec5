use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// Identity of a worker node, usually its `host:port` transfer address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a new NodeId from anything string-like
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Wall-clock instant with nanosecond precision
///
/// Deserialized values carry `nanos >= 1_000_000_000` over into `secs`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawTimestamp")]
pub struct Timestamp {
    /// Seconds since Unix epoch
    pub secs: u64,
    /// Nanoseconds within the second
    pub nanos: u32,
}

#[derive(Deserialize)]
struct RawTimestamp {
    secs: u64,
    #[serde(default)]
    nanos: u32,
}

impl From<RawTimestamp> for Timestamp {
    fn from(raw: RawTimestamp) -> Self {
        Timestamp {
            secs: raw.secs.saturating_add(u64::from(raw.nanos / NANOS_PER_SEC)),
            nanos: raw.nanos % NANOS_PER_SEC,
        }
    }
}

impl Timestamp {
    /// Returns the current timestamp.
    ///
    /// A clock set before the epoch reads as the epoch itself.
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: now.as_secs(),
            nanos: now.subsec_nanos(),
        }
    }

    /// Creates a timestamp from whole seconds since the epoch
    pub fn from_secs(secs: u64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// Duration since the epoch
    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.secs)
            .saturating_add(Duration::from_nanos(u64::from(self.nanos)))
    }

    /// Time elapsed between `earlier` and `self`, zero if `earlier` is later
    pub fn saturating_since(&self, earlier: Timestamp) -> Duration {
        self.as_duration().saturating_sub(earlier.as_duration())
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        let total = self.as_duration().saturating_add(rhs);
        Timestamp {
            secs: total.as_secs(),
            nanos: total.subsec_nanos(),
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.secs
            .cmp(&other.secs)
            .then_with(|| self.nanos.cmp(&other.nanos))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

/// `part / whole * 100`, or 0 when `whole` is zero
pub fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64) * 100.0
}
