//! Error-tracking sink.
//!
//! Failures isolated inside a batch (a build that could not be dropped, a
//! migration batch that raised) are reported here together with a context
//! object instead of being propagated to the cron layer.

use serde_json::Value as JsonValue;

/// Receives an error plus a context object describing the item it concerns.
pub trait ErrorTracker: Send + Sync {
    fn track_exception(&self, error: &(dyn std::error::Error + 'static), context: JsonValue);
}

/// Tracker that emits a structured `tracing` event on the `error_tracking`
/// target. Ship that target to an external sink through the log pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorTracker;

impl ErrorTracker for LogErrorTracker {
    fn track_exception(&self, error: &(dyn std::error::Error + 'static), context: JsonValue) {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        tracing::error!(
            target: "error_tracking",
            error = %error,
            causes = ?causes,
            context = %context,
            "Exception tracked"
        );
    }
}
