//! Telemetry utilities for cache operation timing and tracing spans.

use std::time::Instant;

/// Guard for timing a cache operation.
///
/// Logs the elapsed time at debug level when dropped.
pub struct OpTimer {
    op: &'static str,
    start: Instant,
}

impl OpTimer {
    /// Start timing an operation.
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
        }
    }
}

impl Drop for OpTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(op = self.op, elapsed_ms, "Cache operation finished");
    }
}

/// Standard span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span covering cold-start hydration.
    pub fn hydrate() -> Span {
        info_span!("hydrate")
    }

    /// Create a span for one write-through operation.
    pub fn cache_op(op: &str, conversation: Option<&str>) -> Span {
        if let Some(conversation) = conversation {
            info_span!("cache_op", op = %op, conversation = %conversation)
        } else {
            info_span!("cache_op", op = %op)
        }
    }
}
