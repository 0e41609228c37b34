//! End-to-end sync, trigger and fan-out tests
//!
//! Drive the sync engine and the trigger against a scripted remote and the
//! in-memory store.
//!
//! Run with: cargo test --test sync_tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use mirrorcast::config::SyncOptions;
use mirrorcast::error::{ErrorKind, MirrorError, Result};
use mirrorcast::ingest::{run_trigger, TriggerContext, TriggerRequest};
use mirrorcast::remote::RemoteSource;
use mirrorcast::storage::{InMemoryObjectStore, ObjectStore};
use mirrorcast::sync::{fingerprint, SyncEngine};
use mirrorcast::types::{FileMap, FileOperation, RemoteFileEntry, RemoteListing};

const BUCKET: &str = "data";
const PREFIX: &str = "pub/time.series/pr/";
const ROOT: &str = "http://bls-app:5000/pub/time.series/pr/";
const POPULATION_URL: &str = "http://population.test/api";

/// Remote whose listing and file bodies are set by the test
#[derive(Default)]
struct ScriptedRemote {
    files: Mutex<HashMap<String, Vec<u8>>>,
    /// Listed but answered with this HTTP status
    broken: Mutex<HashMap<String, u16>>,
    listing_status: Mutex<Option<u16>>,
    extra: Mutex<HashMap<String, Vec<u8>>>,
    /// Downloads of listed files so far
    fetches: AtomicUsize,
}

impl ScriptedRemote {
    fn with_files(files: &[(&str, &str)]) -> Self {
        let remote = Self::default();
        for (name, body) in files {
            remote.set_file(name, body);
        }
        remote
    }

    fn url(name: &str) -> String {
        format!("{}{}", ROOT, name)
    }

    fn set_file(&self, name: &str, body: &str) {
        self.files
            .lock()
            .insert(name.to_string(), body.as_bytes().to_vec());
    }

    fn remove_file(&self, name: &str) {
        self.files.lock().remove(name);
    }

    fn break_file(&self, name: &str, status: u16) {
        self.broken.lock().insert(name.to_string(), status);
    }

    fn fail_listing(&self, status: u16) {
        *self.listing_status.lock() = Some(status);
    }

    /// Serve `body` at an unlisted URL
    fn serve(&self, url: &str, body: &str) {
        self.extra
            .lock()
            .insert(url.to_string(), body.as_bytes().to_vec());
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn list_files(&self) -> Result<RemoteListing> {
        if let Some(status) = *self.listing_status.lock() {
            return Err(MirrorError::fetch_status(ROOT, status));
        }
        let files = self.files.lock();
        let broken = self.broken.lock();
        Ok(files
            .keys()
            .chain(broken.keys())
            .map(|name| RemoteFileEntry {
                filename: name.clone(),
                url: Self::url(name),
            })
            .collect())
    }

    async fn fetch_file(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(body) = self.extra.lock().get(url) {
            return Ok(body.clone());
        }
        let name = url.trim_start_matches(ROOT);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.broken.lock().get(name) {
            return Err(MirrorError::fetch_status(url, *status));
        }
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| MirrorError::fetch_status(url, 404))
    }
}

/// In-memory store that records how its writes overlap
struct ObservedStore {
    inner: InMemoryObjectStore,
    put_delay: Duration,
    remote: Arc<ScriptedRemote>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight_per_key: AtomicUsize,
    fetched_at_first_put: Mutex<Option<usize>>,
}

impl ObservedStore {
    fn new(remote: Arc<ScriptedRemote>, put_delay: Duration) -> Self {
        Self {
            inner: InMemoryObjectStore::with_bucket(BUCKET),
            put_delay,
            remote,
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight_per_key: AtomicUsize::new(0),
            fetched_at_first_put: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ObjectStore for ObservedStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.inner.get(bucket, key).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        self.fetched_at_first_put
            .lock()
            .get_or_insert(self.remote.fetches.load(Ordering::SeqCst));
        {
            let mut in_flight = self.in_flight.lock();
            let count = in_flight.entry(key.to_string()).or_default();
            *count += 1;
            self.max_in_flight_per_key
                .fetch_max(*count, Ordering::SeqCst);
        }

        if !self.put_delay.is_zero() {
            tokio::time::sleep(self.put_delay).await;
        }
        let result = self.inner.put(bucket, key, body, content_type).await;

        if let Some(count) = self.in_flight.lock().get_mut(key) {
            *count -= 1;
        }
        result
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner.delete(bucket, key).await
    }

    async fn list_by_prefix(&self, bucket: &str, prefix: &str) -> Result<FileMap> {
        self.inner.list_by_prefix(bucket, prefix).await
    }

    async fn create_bucket_if_absent(&self, bucket: &str) -> Result<()> {
        self.inner.create_bucket_if_absent(bucket).await
    }

    fn backend_name(&self) -> &'static str {
        "observed"
    }
}

fn setup(files: &[(&str, &str)]) -> (Arc<ScriptedRemote>, Arc<InMemoryObjectStore>, SyncEngine) {
    let remote = Arc::new(ScriptedRemote::with_files(files));
    let store = Arc::new(InMemoryObjectStore::with_bucket(BUCKET));
    let engine = SyncEngine::new(store.clone(), remote.clone());
    (remote, store, engine)
}

async fn seed(store: &InMemoryObjectStore, name: &str, body: &str) {
    store
        .put(
            BUCKET,
            &format!("{}{}", PREFIX, name),
            body.as_bytes().to_vec(),
            None,
        )
        .await
        .unwrap();
}

async fn stored_names(store: &InMemoryObjectStore) -> Vec<String> {
    store
        .list_by_prefix(BUCKET, PREFIX)
        .await
        .unwrap()
        .into_keys()
        .collect()
}

// ============================================================================
// SYNC ENGINE
// ============================================================================

#[tokio::test]
async fn first_sync_uploads_everything() {
    let (_remote, store, engine) = setup(&[("pr.txt", "series"), ("pr.class", "classes")]);

    let report = engine.sync(BUCKET, PREFIX).await.unwrap();

    assert_eq!(report.uploaded, vec!["pr.class", "pr.txt"]);
    assert!(report.deleted.is_empty());
    assert_eq!(report.unchanged, 0);
    assert!(report.is_clean());
    assert_eq!(
        store.keys(BUCKET),
        vec![
            "pub/time.series/pr/pr.class".to_string(),
            "pub/time.series/pr/pr.txt".to_string()
        ]
    );
}

#[tokio::test]
async fn second_sync_is_idempotent() {
    let (_remote, store, engine) = setup(&[("pr.txt", "series"), ("pr.class", "classes")]);

    engine.sync(BUCKET, PREFIX).await.unwrap();
    let puts = store.put_count();

    let report = engine.sync(BUCKET, PREFIX).await.unwrap();
    assert_eq!(report.changes(), 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(store.put_count(), puts);
    assert_eq!(store.delete_count(), 0);
}

#[tokio::test]
async fn changed_content_is_reuploaded_and_vanished_files_deleted() {
    let (_remote, store, engine) =
        setup(&[("a.txt", "v2"), ("b.txt", "same"), ("c.txt", "brand new")]);
    seed(&store, "a.txt", "v1").await;
    seed(&store, "b.txt", "same").await;
    seed(&store, "old.txt", "gone upstream").await;

    let report = engine.sync(BUCKET, PREFIX).await.unwrap();

    assert_eq!(report.uploaded, vec!["a.txt", "c.txt"]);
    assert_eq!(report.deleted, vec!["old.txt"]);
    assert_eq!(report.unchanged, 1);

    let stored = store.list_by_prefix(BUCKET, PREFIX).await.unwrap();
    assert_eq!(stored.get("a.txt"), Some(&fingerprint(b"v2")));
    assert!(!stored.contains_key("old.txt"));
}

#[tokio::test]
async fn rename_is_upload_plus_delete() {
    let (_remote, store, engine) = setup(&[("renamed.txt", "payload")]);
    seed(&store, "original.txt", "payload").await;

    let report = engine.sync(BUCKET, PREFIX).await.unwrap();

    assert_eq!(report.uploaded, vec!["renamed.txt"]);
    assert_eq!(report.deleted, vec!["original.txt"]);
    assert_eq!(stored_names(&store).await, vec!["renamed.txt"]);
}

#[tokio::test]
async fn failed_listing_touches_nothing() {
    let (remote, store, engine) = setup(&[("pr.txt", "series")]);
    seed(&store, "keep.txt", "precious").await;
    let puts = store.put_count();
    remote.fail_listing(503);

    let err = engine.sync(BUCKET, PREFIX).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Fetch);
    assert_eq!(store.put_count(), puts);
    assert_eq!(store.delete_count(), 0);
    assert_eq!(stored_names(&store).await, vec!["keep.txt"]);
}

#[tokio::test]
async fn unavailable_store_fails_the_pass() {
    let (_remote, store, engine) = setup(&[("pr.txt", "series")]);
    store.set_unavailable(true);

    let err = engine.sync(BUCKET, PREFIX).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
}

#[tokio::test]
async fn upload_failure_is_isolated() {
    let (_remote, store, engine) = setup(&[("good.txt", "ok"), ("bad.txt", "nope")]);
    store.fail_key("pub/time.series/pr/bad.txt");

    let report = engine.sync(BUCKET, PREFIX).await.unwrap();

    assert_eq!(report.uploaded, vec!["good.txt"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].filename, "bad.txt");
    assert_eq!(report.errors[0].operation, FileOperation::Upload);
    assert_eq!(report.errors[0].kind, ErrorKind::StoreUnavailable);

    // Next pass picks it up once the store recovers
    store.clear_failures();
    let report = engine.sync(BUCKET, PREFIX).await.unwrap();
    assert_eq!(report.uploaded, vec!["bad.txt"]);
    assert!(report.is_clean());
}

#[tokio::test]
async fn delete_failure_is_isolated() {
    let (_remote, store, engine) = setup(&[("good.txt", "ok")]);
    seed(&store, "old.txt", "gone upstream").await;
    store.fail_key("pub/time.series/pr/old.txt");

    let report = engine.sync(BUCKET, PREFIX).await.unwrap();

    assert_eq!(report.uploaded, vec!["good.txt"]);
    assert!(report.deleted.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].filename, "old.txt");
    assert_eq!(report.errors[0].operation, FileOperation::Delete);
    assert_eq!(report.errors[0].kind, ErrorKind::StoreUnavailable);
    assert!(store
        .keys(BUCKET)
        .contains(&"pub/time.series/pr/old.txt".to_string()));

    store.clear_failures();
    let report = engine.sync(BUCKET, PREFIX).await.unwrap();
    assert_eq!(report.deleted, vec!["old.txt"]);
    assert!(report.is_clean());
}

#[tokio::test]
async fn prefix_without_slash_is_a_directory() {
    let (_remote, store, engine) = setup(&[("pr.txt", "series")]);
    seed(&store, "pr.txt", "series").await;

    let report = engine.sync(BUCKET, "pub/time.series/pr").await.unwrap();

    assert_eq!(report.prefix, PREFIX);
    assert!(report.uploaded.is_empty());
    assert!(report.deleted.is_empty());
    assert_eq!(report.unchanged, 1);
    assert_eq!(
        store.keys(BUCKET),
        vec!["pub/time.series/pr/pr.txt".to_string()]
    );
}

#[tokio::test]
async fn overlapping_passes_are_serialized() {
    let remote = Arc::new(ScriptedRemote::with_files(&[
        ("f0", "zero"),
        ("f1", "one"),
        ("f2", "two"),
        ("f3", "three"),
    ]));
    let store = Arc::new(ObservedStore::new(remote.clone(), Duration::from_millis(50)));
    let engine = SyncEngine::new(store.clone(), remote);

    // Both spellings name the same prefix
    let (first, second) = tokio::join!(
        engine.sync(BUCKET, PREFIX),
        engine.sync(BUCKET, "pub/time.series/pr")
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(store.max_in_flight_per_key.load(Ordering::SeqCst), 1);
    assert_eq!(store.inner.put_count(), 4);
    assert_eq!(first.uploaded.len() + second.uploaded.len(), 4);
    assert_eq!(first.unchanged + second.unchanged, 4);
}

#[tokio::test]
async fn uploads_start_before_all_downloads() {
    let names: Vec<String> = (0..20).map(|i| format!("f{:02}", i)).collect();
    let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), n.as_str())).collect();
    let remote = Arc::new(ScriptedRemote::with_files(&files));
    let store = Arc::new(ObservedStore::new(remote.clone(), Duration::ZERO));
    let engine = SyncEngine::new(store.clone(), remote.clone())
        .with_options(SyncOptions { concurrency: 2 });

    let report = engine.sync(BUCKET, PREFIX).await.unwrap();

    assert_eq!(report.uploaded.len(), 20);
    assert_eq!(remote.fetches.load(Ordering::SeqCst), 20);
    let first_put = store.fetched_at_first_put.lock().unwrap_or(usize::MAX);
    assert!(first_put <= 2, "first put after {} downloads", first_put);
}

#[tokio::test]
async fn fetch_failure_never_deletes() {
    let (remote, store, engine) = setup(&[("pr.txt", "series")]);
    seed(&store, "flaky.txt", "old copy").await;
    remote.break_file("flaky.txt", 500);

    let report = engine.sync(BUCKET, PREFIX).await.unwrap();

    assert!(report.deleted.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].operation, FileOperation::Fetch);
    assert_eq!(report.errors[0].kind, ErrorKind::Fetch);
    assert_eq!(stored_names(&store).await, vec!["flaky.txt", "pr.txt"]);
}

#[tokio::test]
async fn upstream_removal_then_return() {
    let (remote, store, engine) = setup(&[("pr.txt", "series"), ("pr.foot", "footnotes")]);
    engine.sync(BUCKET, PREFIX).await.unwrap();

    remote.remove_file("pr.foot");
    let report = engine.sync(BUCKET, PREFIX).await.unwrap();
    assert_eq!(report.deleted, vec!["pr.foot"]);

    remote.set_file("pr.foot", "footnotes");
    let report = engine.sync(BUCKET, PREFIX).await.unwrap();
    assert_eq!(report.uploaded, vec!["pr.foot"]);
    assert_eq!(stored_names(&store).await, vec!["pr.foot", "pr.txt"]);
}

#[tokio::test]
async fn objects_outside_prefix_untouched() {
    let (_remote, store, engine) = setup(&[("pr.txt", "series")]);
    store
        .put(BUCKET, "population/other.json", b"{}".to_vec(), None)
        .await
        .unwrap();

    engine.sync(BUCKET, PREFIX).await.unwrap();

    assert!(store
        .keys(BUCKET)
        .contains(&"population/other.json".to_string()));
}

// ============================================================================
// TRIGGER
// ============================================================================

fn trigger_context(remote: Arc<ScriptedRemote>, store: Arc<InMemoryObjectStore>) -> TriggerContext {
    TriggerContext {
        engine: Arc::new(SyncEngine::new(store, remote)),
        population_url: POPULATION_URL.to_string(),
        population_prefix: "population".to_string(),
        sync_prefix: PREFIX.to_string(),
    }
}

#[tokio::test]
async fn trigger_success_creates_bucket_and_stages_both() {
    let remote = Arc::new(ScriptedRemote::with_files(&[("pr.txt", "series")]));
    remote.serve(POPULATION_URL, r#"{"data":[{"Year":"2019","Population":328239523}]}"#);
    let store = Arc::new(InMemoryObjectStore::new());
    let ctx = trigger_context(remote, store.clone());

    let response = run_trigger(
        &ctx,
        TriggerRequest {
            bucket_name: Some("fresh".to_string()),
        },
    )
    .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body.message, "Sync completed.");
    assert_eq!(
        store.keys("fresh"),
        vec![
            "population/honolulu_population_data.json".to_string(),
            "pub/time.series/pr/pr.txt".to_string()
        ]
    );
    assert_eq!(
        store
            .content_type("fresh", "population/honolulu_population_data.json")
            .as_deref(),
        Some("application/json")
    );
}

#[tokio::test]
async fn trigger_defaults_bucket() {
    let remote = Arc::new(ScriptedRemote::with_files(&[]));
    remote.serve(POPULATION_URL, "[]");
    let store = Arc::new(InMemoryObjectStore::new());
    let ctx = trigger_context(remote, store.clone());

    let response = run_trigger(&ctx, TriggerRequest::default()).await;

    assert!(response.is_success());
    assert_eq!(
        store.keys("data"),
        vec!["population/honolulu_population_data.json".to_string()]
    );
}

#[tokio::test]
async fn trigger_population_failure_skips_sync() {
    let remote = Arc::new(ScriptedRemote::with_files(&[("pr.txt", "series")]));
    remote.serve(POPULATION_URL, "<html>maintenance</html>");
    let store = Arc::new(InMemoryObjectStore::new());
    let ctx = trigger_context(remote, store.clone());

    let response = run_trigger(&ctx, TriggerRequest::default()).await;

    assert_eq!(response.status_code, 500);
    assert!(response
        .body
        .message
        .starts_with("Error pulling population data:"));
    assert!(response.body.report.is_none());
    assert_eq!(store.put_count(), 0);
}

#[tokio::test]
async fn trigger_sync_failure_keeps_population() {
    let remote = Arc::new(ScriptedRemote::with_files(&[("pr.txt", "series")]));
    remote.serve(POPULATION_URL, "{}");
    remote.fail_listing(503);
    let store = Arc::new(InMemoryObjectStore::new());
    let ctx = trigger_context(remote, store.clone());

    let response = run_trigger(&ctx, TriggerRequest::default()).await;

    assert_eq!(response.status_code, 500);
    assert!(response
        .body
        .message
        .starts_with("Error syncing time-series files:"));
    assert_eq!(
        store.keys("data"),
        vec!["population/honolulu_population_data.json".to_string()]
    );
}

#[tokio::test]
async fn trigger_bucket_failure() {
    let remote = Arc::new(ScriptedRemote::with_files(&[]));
    let store = Arc::new(InMemoryObjectStore::new());
    store.set_unavailable(true);
    let ctx = trigger_context(remote, store);

    let response = run_trigger(&ctx, TriggerRequest::default()).await;

    assert_eq!(response.status_code, 500);
    assert!(response.body.message.starts_with("Error preparing bucket"));
}

// ============================================================================
// HTTP SURFACE
// ============================================================================

#[tokio::test]
async fn sync_route_runs_trigger() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mirrorcast::realtime::{Broadcaster, RealtimeServer, ServerState};
    use tower::ServiceExt;

    let remote = Arc::new(ScriptedRemote::with_files(&[("pr.txt", "series")]));
    remote.serve(POPULATION_URL, "{}");
    let store = Arc::new(InMemoryObjectStore::new());
    let ctx = Arc::new(trigger_context(remote, store.clone()));

    let app = RealtimeServer::router(ServerState::new(Broadcaster::new()).with_trigger(ctx));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sync")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"bucketName":"raw"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["message"], "Sync completed.");
    assert_eq!(value["report"]["uploaded"][0], "pr.txt");
    assert_eq!(
        store.keys("raw"),
        vec![
            "population/honolulu_population_data.json".to_string(),
            "pub/time.series/pr/pr.txt".to_string()
        ]
    );
}

#[tokio::test]
async fn webhook_fans_out_to_every_subscriber() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mirrorcast::realtime::{Broadcaster, RealtimeServer, ServerState};
    use tower::ServiceExt;

    let broadcaster = Broadcaster::new();
    let mut first = broadcaster.connect();
    let mut second = broadcaster.connect();
    let gone = broadcaster.connect();
    let gone_id = gone.id;
    drop(gone);

    let app = RealtimeServer::router(ServerState::new(broadcaster.clone()));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/store-webhook")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"Records":[{"s3":{"bucket":{"name":"data"},"object":{"key":"pub/time.series/pr/pr.txt"}}}]}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    for sub in [&mut first, &mut second] {
        assert_eq!(
            &*sub.receiver.recv().await.unwrap(),
            "New file dropped: pub/time.series/pr/pr.txt in bucket 'data'"
        );
    }
    assert!(!broadcaster.is_connected(gone_id));
    assert_eq!(broadcaster.subscriber_count(), 2);
}
