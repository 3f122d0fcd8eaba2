//! Rate-limit backoff computation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::traits::Response;

/// Lower bound for jittered delays.
const MIN_JITTERED_DELAY: Duration = Duration::from_millis(100);

/// Maximum jitter as a fraction of the delay (±20%).
const JITTER_FRACTION: f64 = 0.2;

/// `RateLimit-Reset` values at or above this are epoch timestamps.
const EPOCH_THRESHOLD: u64 = 1_000_000_000;

/// `min(initial × 2^attempt, max)` without jitter.
pub fn exponential_delay(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Apply symmetric jitter of up to ±20%, floored at 100 ms and capped at `max`.
pub fn jittered(delay: Duration, max: Duration, rng: &mut impl Rng) -> Duration {
    let factor = 1.0 + rng.gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    let jittered = Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX);
    jittered.max(MIN_JITTERED_DELAY.min(max)).min(max)
}

/// Delay before retry `attempt` (0-based).
///
/// A positive server hint wins, capped at `max`; otherwise exponential backoff
/// with jitter.
pub fn retry_delay(attempt: u32, hint: Option<Duration>, initial: Duration, max: Duration) -> Duration {
    match hint.filter(|hint| !hint.is_zero()) {
        Some(hint) => hint.min(max),
        None => jittered(
            exponential_delay(attempt, initial, max),
            max,
            &mut rand::thread_rng(),
        ),
    }
}

/// Server-provided wait hint from a 429 response.
///
/// `Retry-After` is read as delta-seconds or an HTTP-date. Without it,
/// `RateLimit-Reset` is read as delta-seconds, or as an epoch timestamp when
/// large enough to be one.
pub fn retry_after(response: &Response, now: DateTime<Utc>) -> Option<Duration> {
    if let Some(value) = response.header("retry-after") {
        let value = value.trim();
        if let Ok(secs) = value.parse::<f64>() {
            // Too large to represent still means "wait as long as allowed".
            return (secs.is_finite() && secs >= 0.0)
                .then(|| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX));
        }
        return DateTime::parse_from_rfc2822(value)
            .ok()
            .map(|date| until(date.with_timezone(&Utc), now));
    }

    let reset = response.header("ratelimit-reset")?.trim().parse::<u64>().ok()?;
    if reset >= EPOCH_THRESHOLD {
        let date = DateTime::<Utc>::from_timestamp(reset as i64, 0)?;
        Some(until(date, now))
    } else {
        Some(Duration::from_secs(reset))
    }
}

fn until(date: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (date - now).to_std().unwrap_or(Duration::ZERO)
}
