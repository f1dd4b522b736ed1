use axum::http::{HeaderMap, HeaderName, HeaderValue};
use dashmap::DashMap;
use std::time::{Duration, Instant};

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

// Named category of request, each with its own budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    AiCategorize,
    AiSearch,
    Default,
}

impl OperationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::AiCategorize => "ai_categorize",
            OperationClass::AiSearch => "ai_search",
            OperationClass::Default => "default",
        }
    }

    /// Unknown class names fall back to the default budget.
    pub fn parse(name: &str) -> Self {
        match name {
            "ai_categorize" => OperationClass::AiCategorize,
            "ai_search" => OperationClass::AiSearch,
            _ => OperationClass::Default,
        }
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub max_requests: u32,
    pub window: Duration,
}

impl Limit {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_millis(window_ms),
        }
    }
}

// Per-class budgets
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub categorize: Limit,
    pub search: Limit,
    pub default: Limit,
}

impl RateLimits {
    pub fn for_class(&self, class: OperationClass) -> Limit {
        match class {
            OperationClass::AiCategorize => self.categorize,
            OperationClass::AiSearch => self.search,
            OperationClass::Default => self.default,
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            categorize: Limit::new(20, 60_000),
            search: Limit::new(10, 60_000),
            default: Limit::new(100, 60_000),
        }
    }
}

// Rate limit entry - tracks requests per (caller, class) in the current window
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: Instant,
}

impl RateLimitEntry {
    fn fresh(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_time: now + window,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_time
    }
}

/// Outcome of a single check. `reset_in` is in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub success: bool,
    pub remaining: u32,
    pub reset_in: u64,
}

impl RateLimitResult {
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(REMAINING_HEADER),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static(RESET_HEADER),
            HeaderValue::from(self.reset_in),
        );
        headers
    }
}

/// Fixed-window counter keyed by `(caller, class)`.
///
/// The DashMap entry guard holds the shard write lock for the whole
/// read-increment-write, so concurrent checks on one key are serialized.
pub struct RateLimiter {
    entries: DashMap<(String, OperationClass), RateLimitEntry>,
    limits: RateLimits,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            entries: DashMap::new(),
            limits,
        }
    }

    pub fn check(&self, caller: &str, class: OperationClass) -> RateLimitResult {
        self.check_at(caller, class, Instant::now())
    }

    /// Counts the attempt even when it is rejected.
    pub fn check_at(&self, caller: &str, class: OperationClass, now: Instant) -> RateLimitResult {
        let limit = self.limits.for_class(class);

        let mut entry = self
            .entries
            .entry((caller.to_string(), class))
            .or_insert_with(|| RateLimitEntry::fresh(now, limit.window));

        // window over? start a new one
        if entry.is_expired(now) {
            *entry = RateLimitEntry::fresh(now, limit.window);
        }

        entry.count = entry.count.saturating_add(1);

        let reset_in = entry.reset_time.saturating_duration_since(now).as_millis();
        RateLimitResult {
            success: entry.count <= limit.max_requests,
            remaining: limit.max_requests.saturating_sub(entry.count),
            reset_in: u64::try_from(reset_in).unwrap_or(u64::MAX),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drops entries whose window already ended. Expiry is re-checked under
    /// the shard lock, so a window refreshed by a concurrent check survives.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }
}
