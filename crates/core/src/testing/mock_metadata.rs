//! Mock metadata policy for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::catalog::DeliveryId;
use crate::codec::ImageFile;
use crate::metadata::{
    post_write, pre_write, ApplyResult, DerivedTimestamp, ExifTimestampField, MetadataError,
    MetadataPolicy, MetadataPolicyMode,
};

/// A recorded `apply_timestamp` call.
#[derive(Debug, Clone)]
pub struct RecordedApply {
    pub name: String,
    pub delivery: DeliveryId,
    pub mode: MetadataPolicyMode,
}

/// Mock implementation of the MetadataPolicy trait.
///
/// Derives a fixed timestamp and classifies writes with the real outcome
/// table, without touching the bytes.
#[derive(Debug)]
pub struct MockMetadataPolicy {
    derived: Arc<RwLock<DerivedTimestamp>>,
    write_fails: Arc<RwLock<bool>>,
    next_derive_error: Arc<RwLock<Option<MetadataError>>>,
    next_apply_error: Arc<RwLock<Option<MetadataError>>>,
    derive_delay: Arc<RwLock<Duration>>,
    applied: Arc<RwLock<Vec<RecordedApply>>>,
}

impl Default for MockMetadataPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMetadataPolicy {
    pub fn new() -> Self {
        Self {
            derived: Arc::new(RwLock::new(DerivedTimestamp::Exif {
                field: ExifTimestampField::DateTimeOriginal,
                value: "2024:01:02 03:04:05".to_string(),
                offset: Some("+00:00".to_string()),
            })),
            write_fails: Arc::new(RwLock::new(false)),
            next_derive_error: Arc::new(RwLock::new(None)),
            next_apply_error: Arc::new(RwLock::new(None)),
            derive_delay: Arc::new(RwLock::new(Duration::ZERO)),
            applied: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Timestamp returned by every `derive_timestamp` call.
    pub async fn set_derived(&self, derived: DerivedTimestamp) {
        *self.derived.write().await = derived;
    }

    /// Make every write report failure.
    pub async fn set_write_fails(&self, fails: bool) {
        *self.write_fails.write().await = fails;
    }

    pub async fn set_next_derive_error(&self, error: MetadataError) {
        *self.next_derive_error.write().await = Some(error);
    }

    pub async fn set_next_apply_error(&self, error: MetadataError) {
        *self.next_apply_error.write().await = Some(error);
    }

    pub async fn set_derive_delay(&self, delay: Duration) {
        *self.derive_delay.write().await = delay;
    }

    pub async fn applied(&self) -> Vec<RecordedApply> {
        self.applied.read().await.clone()
    }
}

#[async_trait]
impl MetadataPolicy for MockMetadataPolicy {
    fn name(&self) -> &str {
        "mock"
    }

    async fn derive_timestamp(&self, _file: &ImageFile) -> Result<DerivedTimestamp, MetadataError> {
        let delay = *self.derive_delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.next_derive_error.write().await.take() {
            return Err(err);
        }
        Ok(self.derived.read().await.clone())
    }

    async fn apply_timestamp(
        &self,
        file: ImageFile,
        derived: &DerivedTimestamp,
        delivery: DeliveryId,
        mode: MetadataPolicyMode,
    ) -> Result<ApplyResult, MetadataError> {
        if let Some(err) = self.next_apply_error.write().await.take() {
            return Err(err);
        }
        self.applied.write().await.push(RecordedApply {
            name: file.name.clone(),
            delivery,
            mode,
        });

        let decision = match pre_write(file.is_jpeg(), derived.kind()) {
            Some(decision) => decision,
            None => post_write(!*self.write_fails.read().await, delivery.definition()),
        };
        Ok(ApplyResult {
            file,
            status: decision.status,
            warning_reason: decision.reason,
        })
    }
}
