//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use taleforge::moderation::{Category, ClassificationError, ImageClassifier, ModerationRawResult};
use taleforge::storage::{
    MediaCandidate, StorageGateway, StorageReference, StorageResult, UploadTarget,
};

pub const MIB: usize = 1024 * 1024;

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

fn padded(magic: &[u8], size: usize) -> Vec<u8> {
    let mut data = magic.to_vec();
    data.resize(size.max(magic.len()), 0);
    data
}

/// PNG-signed payload of exactly `size` bytes
pub fn png(size: usize) -> MediaCandidate {
    MediaCandidate::new("image/png", padded(PNG_MAGIC, size)).with_filename("avatar.png")
}

/// JPEG-signed payload of exactly `size` bytes
pub fn jpeg(size: usize) -> MediaCandidate {
    MediaCandidate::new("image/jpeg", padded(JPEG_MAGIC, size)).with_filename("cover.jpg")
}

/// Raw result with the same score in every category
pub fn uniform_scores(value: f64) -> ModerationRawResult {
    ModerationRawResult::from_scores(Category::ALL.map(|category| (category, value)))
        .expect("uniform scores are valid")
}

/// Serves `router` on an ephemeral local port and returns its base URL
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{addr}")
}

/// Classifier returning a canned result and recording the URLs it saw
pub struct FakeClassifier {
    result: Result<ModerationRawResult, ClassificationError>,
    seen: Mutex<Vec<String>>,
}

impl FakeClassifier {
    pub fn returning(result: Result<ModerationRawResult, ClassificationError>) -> Self {
        Self {
            result,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ImageClassifier for FakeClassifier {
    async fn classify(&self, image_url: &str) -> Result<ModerationRawResult, ClassificationError> {
        self.seen.lock().push(image_url.to_string());
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        "Fake Classifier"
    }
}

/// Storage wrapper counting calls into the wrapped gateway
pub struct CountingStorage {
    inner: Arc<dyn StorageGateway>,
    pub destinations: AtomicUsize,
    pub commits: AtomicUsize,
    pub resolves: AtomicUsize,
}

impl CountingStorage {
    pub fn new(inner: Arc<dyn StorageGateway>) -> Self {
        Self {
            inner,
            destinations: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            resolves: AtomicUsize::new(0),
        }
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn destinations(&self) -> usize {
        self.destinations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageGateway for CountingStorage {
    async fn request_upload_destination(&self) -> StorageResult<UploadTarget> {
        self.destinations.fetch_add(1, Ordering::SeqCst);
        self.inner.request_upload_destination().await
    }

    async fn commit_upload(
        &self,
        target: UploadTarget,
        candidate: &MediaCandidate,
    ) -> StorageResult<StorageReference> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit_upload(target, candidate).await
    }

    async fn resolve(&self, reference: &StorageReference) -> StorageResult<Option<String>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(reference).await
    }

    fn name(&self) -> &'static str {
        "Counting Storage"
    }
}
