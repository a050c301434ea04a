//! Mock image codec for testing.

use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};

use crate::codec::{CodecError, DecodedImage, EncodedImage, ImageCodec, ImageFile, JPEG_MIME};

/// Mock implementation of the ImageCodec trait.
///
/// Provides controllable behavior for testing:
/// - Record which sources were loaded
/// - Fail loads or encodes on demand
/// - Hold calls behind a gate until the test releases them
/// - Choose the size and MIME type of the encoded output
///
/// # Example
///
/// ```rust,ignore
/// use jpegstamp_core::testing::MockCodec;
///
/// let codec = MockCodec::new();
/// codec.set_gated(true).await;
///
/// // ... submit work ...
/// codec.wait_for_started(2).await;
/// codec.release(2);
/// ```
#[derive(Debug)]
pub struct MockCodec {
    loaded: Arc<RwLock<Vec<String>>>,
    next_load_error: Arc<RwLock<Option<CodecError>>>,
    next_encode_error: Arc<RwLock<Option<CodecError>>>,
    failing_names: Arc<RwLock<HashSet<String>>>,
    panicking_names: Arc<RwLock<HashSet<String>>>,
    output_size: Arc<RwLock<usize>>,
    output_mime: Arc<RwLock<String>>,
    delay: Arc<RwLock<Duration>>,
    gated: Arc<RwLock<bool>>,
    gate: Arc<Semaphore>,
    started: watch::Sender<usize>,
}

impl Default for MockCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCodec {
    /// Create a new mock codec producing 400-byte JPEGs.
    pub fn new() -> Self {
        let (started, _) = watch::channel(0);
        Self {
            loaded: Arc::new(RwLock::new(Vec::new())),
            next_load_error: Arc::new(RwLock::new(None)),
            next_encode_error: Arc::new(RwLock::new(None)),
            failing_names: Arc::new(RwLock::new(HashSet::new())),
            panicking_names: Arc::new(RwLock::new(HashSet::new())),
            output_size: Arc::new(RwLock::new(400)),
            output_mime: Arc::new(RwLock::new(JPEG_MIME.to_string())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            gated: Arc::new(RwLock::new(false)),
            gate: Arc::new(Semaphore::new(0)),
            started,
        }
    }

    /// Names of every source passed to `load_image`, in call order.
    pub async fn loaded(&self) -> Vec<String> {
        self.loaded.read().await.clone()
    }

    pub async fn load_count(&self) -> usize {
        self.loaded.read().await.len()
    }

    /// Configure the next load to fail with the given error.
    pub async fn set_next_load_error(&self, error: CodecError) {
        *self.next_load_error.write().await = Some(error);
    }

    /// Configure the next encode to fail with the given error.
    pub async fn set_next_encode_error(&self, error: CodecError) {
        *self.next_encode_error.write().await = Some(error);
    }

    /// Every load of a source with this name fails.
    pub async fn fail_loads_for(&self, name: impl Into<String>) {
        self.failing_names.write().await.insert(name.into());
    }

    pub async fn clear_failures(&self) {
        self.failing_names.write().await.clear();
    }

    /// Every load of a source with this name panics.
    pub async fn panic_on(&self, name: impl Into<String>) {
        self.panicking_names.write().await.insert(name.into());
    }

    pub async fn set_output_size(&self, size: usize) {
        *self.output_size.write().await = size;
    }

    /// MIME type reported by `encode_jpeg`.
    pub async fn set_output_mime(&self, mime: impl Into<String>) {
        *self.output_mime.write().await = mime.into();
    }

    /// Simulated decode duration.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// When gated, every load waits for a permit from `release`.
    pub async fn set_gated(&self, gated: bool) {
        *self.gated.write().await = gated;
    }

    /// Let `count` gated loads proceed.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    /// Number of loads that have started (gated or not).
    pub fn started_count(&self) -> usize {
        *self.started.borrow()
    }

    /// Wait until at least `count` loads have started.
    pub async fn wait_for_started(&self, count: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= count).await;
    }
}

#[async_trait]
impl ImageCodec for MockCodec {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load_image(&self, file: &ImageFile) -> Result<DecodedImage, CodecError> {
        self.loaded.write().await.push(file.name.clone());
        self.started.send_modify(|started| *started += 1);

        if *self.gated.read().await {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.panicking_names.read().await.contains(&file.name) {
            panic!("mock codec panic for {}", file.name);
        }
        if let Some(err) = self.next_load_error.write().await.take() {
            return Err(err);
        }
        if self.failing_names.read().await.contains(&file.name) {
            return Err(CodecError::decode(format!("mock decode failure for {}", file.name)));
        }

        Ok(DecodedImage::new(DynamicImage::new_rgb8(1, 1)))
    }

    async fn encode_jpeg(
        &self,
        _image: DecodedImage,
        _quality: f32,
    ) -> Result<EncodedImage, CodecError> {
        if let Some(err) = self.next_encode_error.write().await.take() {
            return Err(err);
        }
        let size = *self.output_size.read().await;
        let mut data = vec![0u8; size];
        if size >= 2 {
            data[0] = 0xFF;
            data[1] = 0xD8;
        }
        Ok(EncodedImage {
            mime: self.output_mime.read().await.clone(),
            data: Bytes::from(data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> ImageFile {
        ImageFile::new(name, "image/png", vec![1u8; 10])
    }

    #[tokio::test]
    async fn test_records_loads() {
        let codec = MockCodec::new();
        codec.load_image(&source("a.png")).await.unwrap();
        codec.load_image(&source("b.png")).await.unwrap();
        assert_eq!(codec.loaded().await, vec!["a.png", "b.png"]);
        assert_eq!(codec.started_count(), 2);
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let codec = MockCodec::new();
        codec.set_next_load_error(CodecError::decode("boom")).await;
        assert!(codec.load_image(&source("a.png")).await.is_err());
        assert!(codec.load_image(&source("a.png")).await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_names_persist() {
        let codec = MockCodec::new();
        codec.fail_loads_for("bad.png").await;
        assert!(codec.load_image(&source("bad.png")).await.is_err());
        assert!(codec.load_image(&source("bad.png")).await.is_err());
        assert!(codec.load_image(&source("good.png")).await.is_ok());
    }

    #[tokio::test]
    async fn test_output_size_and_mime() {
        let codec = MockCodec::new();
        codec.set_output_size(123).await;
        codec.set_output_mime("image/png").await;
        let decoded = codec.load_image(&source("a.png")).await.unwrap();
        let encoded = codec.encode_jpeg(decoded, 0.5).await.unwrap();
        assert_eq!(encoded.data.len(), 123);
        assert_eq!(encoded.mime, "image/png");
    }

    #[tokio::test]
    async fn test_gate_holds_until_released() {
        let codec = Arc::new(MockCodec::new());
        codec.set_gated(true).await;

        let task = {
            let codec = Arc::clone(&codec);
            tokio::spawn(async move { codec.load_image(&source("a.png")).await })
        };
        codec.wait_for_started(1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        codec.release(1);
        assert!(task.await.unwrap().is_ok());
    }
}
