use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, Utc};

use crate::config::constants::session::SESSION_ID_TIME_FORMAT;

/// Time provider trait for dependency injection and testing
pub trait TimeProvider: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// System time provider using actual system clock
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> u64 {
        current_timestamp_millis()
    }
}

/// Mock time provider for deterministic testing
pub struct MockTimeProvider {
    current_time: AtomicU64,
}

impl MockTimeProvider {
    pub fn new(initial_time_millis: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_time_millis),
        }
    }

    pub fn advance_by(&self, millis: u64) {
        self.current_time.fetch_add(millis, Ordering::Relaxed);
    }

    pub fn set_time(&self, millis: u64) {
        self.current_time.store(millis, Ordering::Relaxed);
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_millis(&self) -> u64 {
        self.current_time.load(Ordering::Relaxed)
    }
}

pub fn current_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Host clock plus a correction offset towards UTC.
///
/// Samples and sync marks carry both the host timestamp and the corrected
/// one so streams recorded on different machines can be aligned later.
#[derive(Clone)]
pub struct SyncClock {
    provider: Arc<dyn TimeProvider>,
    utc_offset_ms: Arc<AtomicI64>,
}

impl SyncClock {
    pub fn new(provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            provider,
            utc_offset_ms: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeProvider))
    }

    pub fn now_millis(&self) -> u64 {
        self.provider.now_millis()
    }

    /// Underlying time source, for handing to devices
    pub fn provider(&self) -> Arc<dyn TimeProvider> {
        Arc::clone(&self.provider)
    }

    pub fn utc_offset_ms(&self) -> i64 {
        self.utc_offset_ms.load(Ordering::Relaxed)
    }

    pub fn set_utc_offset_ms(&self, offset_ms: i64) {
        self.utc_offset_ms.store(offset_ms, Ordering::Relaxed);
    }

    pub fn system_to_utc(&self, system_ms: u64) -> u64 {
        apply_offset(system_ms, self.utc_offset_ms())
    }

    pub fn utc_to_system(&self, utc_ms: u64) -> u64 {
        apply_offset(utc_ms, -self.utc_offset_ms())
    }

    /// Current time as `(system, utc)`
    pub fn stamp(&self) -> (u64, u64) {
        let now = self.now_millis();
        (now, self.system_to_utc(now))
    }
}

impl std::fmt::Debug for SyncClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClock")
            .field("utc_offset_ms", &self.utc_offset_ms())
            .finish()
    }
}

fn apply_offset(millis: u64, offset_ms: i64) -> u64 {
    if offset_ms >= 0 {
        millis.saturating_add(offset_ms as u64)
    } else {
        millis.saturating_sub(offset_ms.unsigned_abs())
    }
}

/// Strictly increasing millisecond stamps for one stream.
///
/// When the clock has not moved since the previous stamp the value is bumped
/// by one millisecond, so insertion order and timestamp order always agree.
#[derive(Debug, Default)]
pub struct MonotonicStamp {
    last: Option<u64>,
}

impl MonotonicStamp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, now: u64) -> u64 {
        let stamp = match self.last {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last = Some(stamp);
        stamp
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

/// `"{prefix}_yyyyMMdd_HHmmss"` in local time
pub fn generate_session_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Local::now().format(SESSION_ID_TIME_FORMAT))
}

/// Render epoch milliseconds as an RFC 3339 UTC string
pub fn format_utc_millis(millis: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
