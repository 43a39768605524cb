//! Retry policy: exponential backoff with jitter, and the pluggable
//! transient-error classifier from Design Note §9 (never string-substring
//! matching on error messages).

use std::time::Duration;

use rand::Rng;

/// Coarse category a scheduler-level failure falls into. Attached by the
/// scheduler itself (it knows whether a failure was a timeout, a method
/// error, etc.) rather than parsed back out of an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    Timeout,
    Unavailable,
    RateLimited,
    Unknown,
}

/// Decides whether a failed attempt is worth retrying. The scheduler's
/// `retryCount` budget is the primary gate; a classifier lets callers carve
/// out categories that should never be retried regardless of budget.
pub trait TransientClassifier: Send + Sync {
    fn is_transient(&self, category: ErrorCategory) -> bool;
}

/// Retries every category. This matches spec.md's default scheduling
/// algorithm, which gates retries purely on `retryCount` remaining (or
/// `onError` returning true) with no transience filter of its own; a
/// stricter classifier is something callers opt into.
pub struct PermissiveClassifier;

impl TransientClassifier for PermissiveClassifier {
    fn is_transient(&self, _category: ErrorCategory) -> bool {
        true
    }
}

/// Retries everything except categories a caller has decided are permanent.
pub struct CategoryClassifier {
    pub retryable: Vec<ErrorCategory>,
}

impl TransientClassifier for CategoryClassifier {
    fn is_transient(&self, category: ErrorCategory) -> bool {
        self.retryable.contains(&category)
    }
}

/// Exponential backoff with full jitter, bounded by `max_delay_ms`.
/// `attempt` is 1-based (the delay before the *next* attempt, i.e. after the
/// first failure `attempt == 1`).
pub fn backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> Duration {
    let exp = base_delay_ms.saturating_mul(1u64 << attempt.min(20));
    let capped = exp.min(max_delay_ms.max(base_delay_ms));
    let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_max_delay() {
        for attempt in 1..10 {
            let d = backoff_delay(attempt, 10, 100);
            assert!(d.as_millis() <= 100);
        }
    }

    #[test]
    fn permissive_classifier_always_transient() {
        let c = PermissiveClassifier;
        assert!(c.is_transient(ErrorCategory::Unknown));
        assert!(c.is_transient(ErrorCategory::RateLimited));
    }

    #[test]
    fn category_classifier_honors_allowlist() {
        let c = CategoryClassifier { retryable: vec![ErrorCategory::Timeout] };
        assert!(c.is_transient(ErrorCategory::Timeout));
        assert!(!c.is_transient(ErrorCategory::Unknown));
    }
}
