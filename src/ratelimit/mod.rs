//! Rate-limit oracle boundary and a fixed-window implementation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Answers whether a provider/model may be called right now.
///
/// Implementations synchronize internally; the orchestrator only reads the
/// boolean and reports each request it sends.
pub trait RateLimitOracle: Send + Sync {
    fn is_available(&self, provider: &str, model: &str) -> bool;

    /// Share of the current window still available, 0–100.
    fn percent_remaining(&self, _provider: &str, _model: &str) -> Option<f64> {
        None
    }

    /// Time until the current window resets.
    fn time_until_reset(&self, _provider: &str, _model: &str) -> Option<Duration> {
        None
    }

    /// Called once per request actually sent to a provider.
    fn record_request(&self, _provider: &str, _model: &str) {}
}

/// Every target is always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateLimitOracle for Unlimited {
    fn is_available(&self, _provider: &str, _model: &str) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by provider or by `provider/model`.
///
/// A target is available when neither its provider limit nor its model limit
/// is spent for the current window. Targets without limits are unlimited.
#[derive(Debug)]
pub struct WindowLimiter {
    window: Duration,
    limits: HashMap<String, u32>,
    windows: Mutex<HashMap<String, Window>>,
}

impl WindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            limits: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Per-minute limits, the usual provider quota unit.
    pub fn per_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    pub fn with_provider_limit(mut self, provider: &str, limit: u32) -> Self {
        self.limits.insert(provider.to_string(), limit);
        self
    }

    pub fn with_model_limit(mut self, provider: &str, model: &str, limit: u32) -> Self {
        self.limits.insert(format!("{provider}/{model}"), limit);
        self
    }

    fn keys(provider: &str, model: &str) -> [String; 2] {
        [provider.to_string(), format!("{provider}/{model}")]
    }

    /// Requests counted in the live window for `key`.
    fn used(&self, windows: &HashMap<String, Window>, key: &str, now: Instant) -> u32 {
        windows
            .get(key)
            .filter(|w| now.duration_since(w.started) < self.window)
            .map(|w| w.count)
            .unwrap_or(0)
    }
}

impl RateLimitOracle for WindowLimiter {
    fn is_available(&self, provider: &str, model: &str) -> bool {
        let windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        Self::keys(provider, model).iter().all(|key| {
            self.limits
                .get(key)
                .map_or(true, |limit| self.used(&windows, key, now) < *limit)
        })
    }

    /// The tighter of the provider and model windows.
    fn percent_remaining(&self, provider: &str, model: &str) -> Option<f64> {
        let windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        Self::keys(provider, model)
            .iter()
            .filter_map(|key| {
                let limit = *self.limits.get(key)?;
                if limit == 0 {
                    return Some(0.0);
                }
                let used = self.used(&windows, key, now).min(limit);
                Some(f64::from(limit - used) / f64::from(limit) * 100.0)
            })
            .reduce(f64::min)
    }

    fn time_until_reset(&self, provider: &str, model: &str) -> Option<Duration> {
        let windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        Self::keys(provider, model)
            .iter()
            .filter(|key| self.limits.contains_key(key.as_str()))
            .filter_map(|key| windows.get(key))
            .map(|w| self.window.saturating_sub(now.duration_since(w.started)))
            .max()
    }

    fn record_request(&self, provider: &str, model: &str) {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        for key in Self::keys(provider, model) {
            if !self.limits.contains_key(&key) {
                continue;
            }
            let window = windows.entry(key).or_insert(Window {
                started: now,
                count: 0,
            });
            if now.duration_since(window.started) >= self.window {
                *window = Window {
                    started: now,
                    count: 0,
                };
            }
            window.count += 1;
        }
    }
}
