//! Error classification and recovery handling.
//!
//! [`classify_error`] is a pure mapping from an error signal to a
//! classification; [`ErrorHandler`] keeps the audit log and statistics and
//! drives optional recovery operations. Every error is logged, even when a
//! recovery operation succeeds.

use crate::errors::SetupError;
use crate::utils::Timestamp;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;

/// Taxonomy of classified errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// A collaborator could not be reached.
    ServiceUnavailable,
    /// A call exceeded its time budget.
    Timeout,
    /// The host ran out of a resource.
    ResourceExhaustion,
    /// A call was rejected for lack of permissions.
    Permission,
    /// Data was malformed or unparsable.
    DataCorruption,
    /// Input or environment validation failed.
    Validation,
    /// Nothing matched.
    Unknown,
}

/// Severity of a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational, no operator action expected.
    Low,
    /// Degraded but recoverable.
    Medium,
    /// Requires attention.
    High,
    /// The run cannot reasonably continue.
    Critical,
}

/// The recovery policy selected for a classified error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStrategy {
    /// The caller may re-invoke a recovery operation.
    Retry,
    /// Surface immediately, no automatic recovery.
    FailFast,
    /// Logged for operator action, never auto-retried.
    ManualIntervention,
    /// Substitute degraded or cached data.
    Fallback,
}

/// Derived classification of one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorClassification {
    /// The error taxonomy bucket.
    pub kind: ErrorKind,
    /// How bad it is.
    pub severity: Severity,
    /// The selected recovery policy.
    pub strategy: RecoveryStrategy,
}

const fn classification(
    kind: ErrorKind,
    severity: Severity,
    strategy: RecoveryStrategy,
) -> ErrorClassification {
    ErrorClassification {
        kind,
        severity,
        strategy,
    }
}

/// Classifies an error into `{kind, severity, strategy}`.
///
/// Structured variants map directly; free-form messages fall back to
/// pattern matching, so errors surfaced by collaborators as plain text
/// (`ECONNREFUSED`, `ETIMEDOUT`, ...) still classify usefully.
#[must_use]
pub fn classify_error(error: &SetupError) -> ErrorClassification {
    use RecoveryStrategy as S;

    match error {
        SetupError::ServiceUnavailable(_) => {
            classification(ErrorKind::ServiceUnavailable, Severity::High, S::Retry)
        }
        SetupError::Timeout(_) => classification(ErrorKind::Timeout, Severity::Medium, S::Retry),
        SetupError::ResourceExhausted(_) => {
            classification(ErrorKind::ResourceExhaustion, Severity::Critical, S::FailFast)
        }
        SetupError::PermissionDenied(_) => {
            classification(ErrorKind::Permission, Severity::High, S::ManualIntervention)
        }
        SetupError::DataCorruption(_) | SetupError::Serialization(_) => {
            classification(ErrorKind::DataCorruption, Severity::High, S::Fallback)
        }
        SetupError::Validation(_)
        | SetupError::UnknownOperation(_)
        | SetupError::UnknownStage(_)
        | SetupError::AlreadyRunning
        | SetupError::CircularDependency { .. } => {
            classification(ErrorKind::Validation, Severity::Medium, S::FailFast)
        }
        SetupError::StageFailed { message, .. } => classify_message(message),
        SetupError::Internal(message) => classify_message(message),
    }
}

fn classify_message(message: &str) -> ErrorClassification {
    use RecoveryStrategy as S;

    let text = message.to_lowercase();
    if ["econnrefused", "connection refused", "enotfound", "network"]
        .iter()
        .any(|p| text.contains(p))
    {
        classification(ErrorKind::ServiceUnavailable, Severity::High, S::Retry)
    } else if ["etimedout", "timed out", "timeout"].iter().any(|p| text.contains(p)) {
        classification(ErrorKind::Timeout, Severity::Medium, S::Retry)
    } else if ["out of memory", "enomem", "heap limit"].iter().any(|p| text.contains(p)) {
        classification(ErrorKind::ResourceExhaustion, Severity::Critical, S::FailFast)
    } else if ["eacces", "permission denied", "access denied", "forbidden"]
        .iter()
        .any(|p| text.contains(p))
    {
        classification(ErrorKind::Permission, Severity::High, S::ManualIntervention)
    } else if ["unexpected token", "invalid json", "malformed", "syntax"]
        .iter()
        .any(|p| text.contains(p))
    {
        classification(ErrorKind::DataCorruption, Severity::High, S::Fallback)
    } else if text.contains("validation") {
        classification(ErrorKind::Validation, Severity::Medium, S::FailFast)
    } else {
        classification(ErrorKind::Unknown, Severity::Medium, S::FailFast)
    }
}

/// Caller-supplied context accompanying a handled error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    /// The stage during which the error occurred.
    pub stage: Option<String>,
    /// A short label for the failed operation.
    pub operation: Option<String>,
    /// Degraded data to substitute when no recovery succeeds.
    pub fallback: Option<serde_json::Value>,
    /// Free-form detail.
    pub details: HashMap<String, serde_json::Value>,
}

impl ErrorContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stage name.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Sets the operation label.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Sets fallback data.
    #[must_use]
    pub fn with_fallback(mut self, fallback: serde_json::Value) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// One entry of the error audit log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    /// The error message.
    pub message: String,
    /// Caller-supplied context.
    pub context: ErrorContext,
    /// The derived classification.
    pub classification: ErrorClassification,
    /// When the error was recorded.
    pub timestamp: Timestamp,
}

/// Aggregate error statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    /// Total recorded errors.
    pub total_errors: u64,
    /// Count per taxonomy bucket.
    pub errors_by_kind: HashMap<ErrorKind, u64>,
    /// Count per severity.
    pub errors_by_severity: HashMap<Severity, u64>,
}

/// Outcome of a successful recovery operation.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryOutcome {
    /// Always true when returned.
    pub success: bool,
    /// The recovery operation's result.
    pub result: serde_json::Value,
}

/// Records, classifies and optionally recovers from errors.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    log: RwLock<Vec<ErrorLogEntry>>,
    stats: RwLock<ErrorStats>,
}

impl ErrorHandler {
    /// Creates a new handler with an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies and records an error without attempting recovery.
    pub fn record(&self, error: &SetupError, context: ErrorContext) -> ErrorClassification {
        let classification = classify_error(error);

        tracing::warn!(
            error = %error,
            kind = ?classification.kind,
            severity = ?classification.severity,
            strategy = ?classification.strategy,
            stage = context.stage.as_deref().unwrap_or("-"),
            "Recorded pipeline error"
        );

        self.log.write().push(ErrorLogEntry {
            message: error.to_string(),
            context,
            classification,
            timestamp: crate::utils::now_utc(),
        });

        let mut stats = self.stats.write();
        stats.total_errors += 1;
        *stats.errors_by_kind.entry(classification.kind).or_insert(0) += 1;
        *stats
            .errors_by_severity
            .entry(classification.severity)
            .or_insert(0) += 1;

        classification
    }

    /// Records an error and rethrows it.
    ///
    /// # Errors
    ///
    /// Always returns the original error.
    pub fn handle_error(
        &self,
        error: SetupError,
        context: ErrorContext,
    ) -> Result<RecoveryOutcome, SetupError> {
        self.record(&error, context);
        Err(error)
    }

    /// Records an error, then runs a caller-supplied recovery operation.
    ///
    /// # Errors
    ///
    /// Returns the *original* error when the recovery operation fails, so a
    /// recovery failure never masks the root cause.
    pub async fn handle_error_with<F, Fut>(
        &self,
        error: SetupError,
        context: ErrorContext,
        recovery: F,
    ) -> Result<RecoveryOutcome, SetupError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, SetupError>>,
    {
        self.record(&error, context);

        match recovery().await {
            Ok(result) => Ok(RecoveryOutcome {
                success: true,
                result,
            }),
            Err(recovery_err) => {
                tracing::warn!(
                    original = %error,
                    recovery_error = %recovery_err,
                    "Recovery operation failed, propagating original error"
                );
                Err(error)
            }
        }
    }

    /// Runs an operation, routing any failure through the handler.
    ///
    /// When the context carries fallback data, it is substituted as a last
    /// resort and the call succeeds with it; otherwise the original error
    /// propagates after logging.
    ///
    /// # Errors
    ///
    /// Returns the operation's error when it fails and no fallback is set.
    pub async fn wrap<F, Fut>(
        &self,
        context: ErrorContext,
        operation: F,
    ) -> Result<serde_json::Value, SetupError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, SetupError>>,
    {
        match operation().await {
            Ok(value) => Ok(value),
            Err(error) => {
                let fallback = context.fallback.clone();
                self.record(&error, context);
                match fallback {
                    Some(value) => Ok(value),
                    None => Err(error),
                }
            }
        }
    }

    /// Returns up to `n` most recent log entries, or the whole log.
    #[must_use]
    pub fn error_log(&self, n: Option<usize>) -> Vec<ErrorLogEntry> {
        let log = self.log.read();
        let start = n.map_or(0, |n| log.len().saturating_sub(n));
        log[start..].to_vec()
    }

    /// Clears the error log. Statistics are kept.
    pub fn clear_error_log(&self) {
        self.log.write().clear();
    }

    /// Returns a copy of the aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> ErrorStats {
        self.stats.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_connection_refused() {
        let err = SetupError::Internal("connect ECONNREFUSED 127.0.0.1:5432".to_string());
        let c = classify_error(&err);
        assert_eq!(c.kind, ErrorKind::ServiceUnavailable);
        assert_eq!(c.strategy, RecoveryStrategy::Retry);
    }

    #[test]
    fn test_classify_timeout() {
        let err = SetupError::StageFailed {
            stage: "seed-database".to_string(),
            message: "request timed out after 30s".to_string(),
        };
        let c = classify_error(&err);
        assert_eq!(c.kind, ErrorKind::Timeout);
        assert_eq!(c.strategy, RecoveryStrategy::Retry);
    }

    #[test]
    fn test_classify_permission_denied() {
        let err = SetupError::PermissionDenied("s3 bucket".to_string());
        let c = classify_error(&err);
        assert_eq!(c.kind, ErrorKind::Permission);
        assert_eq!(c.strategy, RecoveryStrategy::ManualIntervention);
    }

    #[test]
    fn test_classify_out_of_memory() {
        let err = SetupError::Internal("JavaScript heap limit reached".to_string());
        let c = classify_error(&err);
        assert_eq!(c.kind, ErrorKind::ResourceExhaustion);
        assert_eq!(c.strategy, RecoveryStrategy::FailFast);
        assert_eq!(c.severity, Severity::Critical);
    }

    #[test]
    fn test_classify_malformed_json() {
        let err = SetupError::Internal("Unexpected token < in JSON at position 0".to_string());
        let c = classify_error(&err);
        assert_eq!(c.kind, ErrorKind::DataCorruption);
        assert_eq!(c.strategy, RecoveryStrategy::Fallback);
    }

    #[test]
    fn test_classify_unknown_fails_fast() {
        let err = SetupError::Internal("something odd happened".to_string());
        let c = classify_error(&err);
        assert_eq!(c.kind, ErrorKind::Unknown);
        assert_eq!(c.strategy, RecoveryStrategy::FailFast);
    }

    #[test]
    fn test_handle_error_logs_and_rethrows() {
        let handler = ErrorHandler::new();
        let err = SetupError::Timeout("upload".to_string());

        let result = handler.handle_error(err, ErrorContext::new().with_stage("process-images"));
        assert!(matches!(result, Err(SetupError::Timeout(_))));

        assert_eq!(handler.error_log(None).len(), 1);
        assert_eq!(handler.stats().total_errors, 1);
        assert_eq!(handler.stats().errors_by_kind[&ErrorKind::Timeout], 1);
    }

    #[tokio::test]
    async fn test_recovery_success_still_logs() {
        let handler = ErrorHandler::new();
        let err = SetupError::ServiceUnavailable("db".to_string());

        let outcome = handler
            .handle_error_with(err, ErrorContext::new(), || async {
                Ok(serde_json::json!({"retried": true}))
            })
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.result["retried"], true);
        // The original error is logged exactly once even though recovery
        // succeeded.
        assert_eq!(handler.error_log(None).len(), 1);
    }

    #[tokio::test]
    async fn test_recovery_failure_propagates_original() {
        let handler = ErrorHandler::new();
        let original = SetupError::Timeout("seed".to_string());

        let result = handler
            .handle_error_with(original, ErrorContext::new(), || async {
                Err(SetupError::Internal("recovery broke too".to_string()))
            })
            .await;

        match result {
            Err(SetupError::Timeout(msg)) => assert_eq!(msg, "seed"),
            other => panic!("expected original timeout error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrap_substitutes_fallback() {
        let handler = ErrorHandler::new();
        let fallback = serde_json::json!({"cached": true});

        let value = handler
            .wrap(ErrorContext::new().with_fallback(fallback.clone()), || async {
                Err(SetupError::DataCorruption("manifest".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(value, fallback);
        assert_eq!(handler.stats().total_errors, 1);
    }

    #[tokio::test]
    async fn test_wrap_without_fallback_propagates() {
        let handler = ErrorHandler::new();

        let result = handler
            .wrap(ErrorContext::new(), || async {
                Err(SetupError::Validation("bad counts".to_string()))
            })
            .await;

        assert!(matches!(result, Err(SetupError::Validation(_))));
    }

    #[test]
    fn test_error_log_tail_and_clear() {
        let handler = ErrorHandler::new();
        for i in 0..5 {
            let _ = handler.handle_error(
                SetupError::Internal(format!("error {i}")),
                ErrorContext::new(),
            );
        }

        let tail = handler.error_log(Some(2));
        assert_eq!(tail.len(), 2);
        assert!(tail[1].message.contains("error 4"));

        handler.clear_error_log();
        assert!(handler.error_log(None).is_empty());
        // Stats survive a log clear.
        assert_eq!(handler.stats().total_errors, 5);
    }
}
