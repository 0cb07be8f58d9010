//! Test doubles for the collaborator services.
//!
//! [`MockService`] implements every collaborator trait with scriptable
//! behavior (canned result, delay, failure, unreachability); [`MockEnv`]
//! bundles one mock per service and hands out a [`Collaborators`] set.

use crate::errors::SetupError;
use crate::services::{
    ChangeReport, Collaborators, DataValidation, DatabaseService, DataValidator, FrontendService,
    ImageService, ProgressFn, StageOptions, StateService,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A scriptable mock standing in for any collaborator service.
#[derive(Debug)]
pub struct MockService {
    reachable: bool,
    delay: Option<Duration>,
    error: Option<String>,
    result: serde_json::Value,
    changes: ChangeReport,
    validation: DataValidation,
    calls: AtomicUsize,
}

impl MockService {
    /// A reachable mock returning the given result.
    #[must_use]
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            reachable: true,
            delay: None,
            error: None,
            result,
            changes: ChangeReport::everything(),
            validation: DataValidation {
                valid: true,
                checks: HashMap::new(),
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleeps for `delay` before every primary call. Pings stay instant.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails every primary call with the given message.
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Makes pings report the service as unreachable.
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Sets the change report returned by `detect_changes`.
    #[must_use]
    pub fn with_changes(mut self, changes: ChangeReport) -> Self {
        self.changes = changes;
        self
    }

    /// Sets the report returned by `validate_data`.
    #[must_use]
    pub fn with_validation(mut self, validation: DataValidation) -> Self {
        self.validation = validation;
        self
    }

    /// Number of primary calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn behave(&self) -> Result<serde_json::Value, SetupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.error {
            return Err(SetupError::Internal(message.clone()));
        }
        Ok(self.result.clone())
    }
}

#[async_trait]
impl ImageService for MockService {
    async fn ping(&self) -> bool {
        self.reachable
    }

    async fn process_images(
        &self,
        _options: &StageOptions,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, SetupError> {
        progress(100);
        self.behave().await
    }
}

#[async_trait]
impl DatabaseService for MockService {
    async fn ping(&self) -> bool {
        self.reachable
    }

    async fn seed_all(
        &self,
        _options: &StageOptions,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, SetupError> {
        progress(100);
        self.behave().await
    }
}

#[async_trait]
impl FrontendService for MockService {
    async fn ping(&self) -> bool {
        self.reachable
    }

    async fn sync_mock_data(
        &self,
        _options: &StageOptions,
        progress: ProgressFn,
    ) -> Result<serde_json::Value, SetupError> {
        progress(100);
        self.behave().await
    }
}

#[async_trait]
impl StateService for MockService {
    async fn ping(&self) -> bool {
        self.reachable
    }

    async fn detect_changes(&self) -> Result<ChangeReport, SetupError> {
        self.behave().await?;
        Ok(self.changes.clone())
    }

    async fn save_current_state(&self) -> Result<(), SetupError> {
        self.behave().await.map(|_| ())
    }
}

#[async_trait]
impl DataValidator for MockService {
    async fn ping(&self) -> bool {
        self.reachable
    }

    async fn validate_data(&self) -> Result<DataValidation, SetupError> {
        self.behave().await?;
        Ok(self.validation.clone())
    }
}

fn images_result() -> serde_json::Value {
    serde_json::json!({ "uploaded": 42, "skipped": 3 })
}

fn database_result() -> serde_json::Value {
    serde_json::json!({ "tables_seeded": 5, "rows": 120 })
}

fn frontend_result() -> serde_json::Value {
    serde_json::json!({ "files_written": 12 })
}

/// One mock per collaborator, with handles kept for assertions.
#[derive(Debug)]
pub struct MockEnv {
    /// Image service mock.
    pub images: Arc<MockService>,
    /// Database service mock.
    pub database: Arc<MockService>,
    /// Frontend service mock.
    pub frontend: Arc<MockService>,
    /// State service mock.
    pub state: Arc<MockService>,
    /// Validator mock.
    pub validator: Arc<MockService>,
}

impl MockEnv {
    /// An environment where every service is reachable and succeeds.
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            images: Arc::new(MockService::ok(images_result())),
            database: Arc::new(MockService::ok(database_result())),
            frontend: Arc::new(MockService::ok(frontend_result())),
            state: Arc::new(MockService::ok(serde_json::Value::Null)),
            validator: Arc::new(MockService::ok(serde_json::Value::Null)),
        }
    }

    /// Delays image processing.
    #[must_use]
    pub fn with_image_delay(mut self, delay: Duration) -> Self {
        self.images = Arc::new(MockService::ok(images_result()).with_delay(delay));
        self
    }

    /// Delays every state service call.
    #[must_use]
    pub fn with_state_delay(mut self, delay: Duration) -> Self {
        self.state = Arc::new(MockService::ok(serde_json::Value::Null).with_delay(delay));
        self
    }

    /// Makes database seeding fail.
    #[must_use]
    pub fn with_database_error(mut self, message: impl Into<String>) -> Self {
        self.database = Arc::new(MockService::ok(database_result()).with_error(message));
        self
    }

    /// Makes frontend sync fail.
    #[must_use]
    pub fn with_frontend_error(mut self, message: impl Into<String>) -> Self {
        self.frontend = Arc::new(MockService::ok(frontend_result()).with_error(message));
        self
    }

    /// Makes every state service call fail.
    #[must_use]
    pub fn with_state_error(mut self, message: impl Into<String>) -> Self {
        self.state = Arc::new(MockService::ok(serde_json::Value::Null).with_error(message));
        self
    }

    /// Makes the database unreachable to prerequisite pings.
    #[must_use]
    pub fn with_unreachable_database(mut self) -> Self {
        self.database = Arc::new(MockService::ok(database_result()).unreachable());
        self
    }

    /// Returns a collaborator set backed by these mocks.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            images: Arc::clone(&self.images) as Arc<dyn ImageService>,
            database: Arc::clone(&self.database) as Arc<dyn DatabaseService>,
            frontend: Arc::clone(&self.frontend) as Arc<dyn FrontendService>,
            state: Arc::clone(&self.state) as Arc<dyn StateService>,
            validator: Arc::clone(&self.validator) as Arc<dyn DataValidator>,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts_calls() {
        let mock = MockService::ok(serde_json::json!({"ok": true}));
        let progress: ProgressFn = Arc::new(|_| {});

        let value = mock
            .process_images(&StageOptions::new(), Arc::clone(&progress))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);

        mock.seed_all(&StageOptions::new(), progress).await.unwrap();
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockService::ok(serde_json::Value::Null).with_error("boom");
        let err = StateService::detect_changes(&mock).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_unreachable_ping() {
        let mock = MockService::ok(serde_json::Value::Null).unreachable();
        assert!(!ImageService::ping(&mock).await);
    }
}
