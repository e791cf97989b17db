//! Consistency of cached reads across writes, driven through the public client
//! against an in-memory backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use atelier::api::keys;
use atelier::cache::{CacheConfig, CacheEntry, EntryStatus, QueryKey, fetcher_fn};
use atelier::transport::{Transport, TransportResponse};
use atelier::{RequestError, Session};
use atelier_api_types::{JournalCreateRequest, PostCreateRequest};
use reqwest::Method;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};

/// Journals backend: list and create, with an optional gate on the next read.
#[derive(Default)]
struct Backend {
    journals: Mutex<Vec<Value>>,
    requests: Mutex<Vec<String>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Backend {
    fn with_journals(count: i64) -> Arc<Self> {
        let backend = Self::default();
        {
            let mut journals = backend.journals.lock().expect("journals lock");
            for id in 1..=count {
                journals.push(json!({"id": id, "author_id": 7, "title": format!("Journal {id}")}));
            }
        }
        Arc::new(backend)
    }

    /// Hold the next GET until the returned sender fires.
    fn hold_next_read(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().expect("gate lock") = Some(rx);
        tx
    }

    fn reads_of(&self, path: &str) -> usize {
        let wanted = format!("GET {path}");
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|line| **line == wanted)
            .count()
    }

    fn list(&self) -> Value {
        let items = self.journals.lock().expect("journals lock").clone();
        json!({"items": items, "page": 1})
    }
}

#[async_trait]
impl Transport for Backend {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<TransportResponse, RequestError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(format!("{method} {path}"));

        if method == Method::GET {
            let gate = self.gate.lock().expect("gate lock").take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
        }

        let response = match (method.as_str(), path) {
            ("GET", "/api/journals?page=1") => {
                TransportResponse::new(200, self.list().to_string())
            }
            ("POST", "/api/journals") => {
                let title = body
                    .as_ref()
                    .and_then(|body| body.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if title.is_empty() {
                    TransportResponse::new(422, r#"{"message":"title must not be empty"}"#)
                } else {
                    let mut journals = self.journals.lock().expect("journals lock");
                    let created = json!({
                        "id": i64::try_from(journals.len()).expect("count fits") + 1,
                        "author_id": 7,
                        "title": title,
                    });
                    journals.push(created.clone());
                    TransportResponse::new(201, created.to_string())
                }
            }
            ("POST", "/api/posts") => TransportResponse::new(
                201,
                json!({"id": 1, "author_id": 7, "journal_id": 3, "title": "t", "body": "b"})
                    .to_string(),
            ),
            _ => TransportResponse::new(404, r#"{"message":"not found"}"#),
        };
        Ok(response)
    }
}

fn session(backend: &Arc<Backend>) -> Session {
    Session::new(&CacheConfig::default(), Arc::clone(backend) as Arc<dyn Transport>)
}

fn journal_request(title: &str) -> JournalCreateRequest {
    JournalCreateRequest {
        title: title.to_string(),
        description: None,
    }
}

#[tokio::test]
async fn concurrent_reads_issue_one_request() {
    let backend = Backend::with_journals(3);
    let session = session(&backend);
    let release = backend.hold_next_read();

    let readers: Vec<_> = (0..6)
        .map(|_| {
            let client = session.client().clone();
            tokio::spawn(async move { client.journals(1).await })
        })
        .collect();
    tokio::task::yield_now().await;
    release.send(()).expect("release");

    for reader in readers {
        let page = reader.await.expect("join").expect("read");
        assert_eq!(page.len(), 3);
    }
    assert_eq!(backend.reads_of("/api/journals?page=1"), 1);
}

#[tokio::test]
async fn create_journal_makes_list_stale_then_refetch_sees_new_item() {
    let backend = Backend::with_journals(3);
    let session = session(&backend);
    let client = session.client();

    assert_eq!(client.journals(1).await.expect("initial read").len(), 3);
    assert!(session.store().get(&keys::journal_list(1)).is_fresh());

    client
        .create_journal(7, &journal_request("Glaze tests"))
        .await
        .expect("create");

    let entry = session.store().get(&keys::journal_list(1));
    assert_eq!(entry.status, EntryStatus::Stale);
    assert_eq!(
        entry.data.as_ref().and_then(|data| data["items"].as_array()).map(Vec::len),
        Some(3)
    );

    assert_eq!(client.journals(1).await.expect("refetch").len(), 4);
    assert_eq!(backend.reads_of("/api/journals?page=1"), 2);
}

#[tokio::test]
async fn prefix_invalidation_reaches_every_journal_view() {
    let backend = Backend::with_journals(0);
    let session = session(&backend);
    let store = session.store();
    let global = keys::journal_list(1);
    let by_author = keys::journals_by_author(7);
    let unrelated = keys::categories();
    for key in [&global, &by_author, &unrelated] {
        store.put(key, json!([]));
    }

    let marked = store.invalidate(&keys::journals());

    assert_eq!(marked.len(), 2);
    assert_eq!(store.get(&global).status, EntryStatus::Stale);
    assert_eq!(store.get(&by_author).status, EntryStatus::Stale);
    assert_eq!(store.get(&unrelated).status, EntryStatus::Fresh);
}

#[tokio::test]
async fn rejected_write_keeps_cache_fresh() {
    let backend = Backend::with_journals(3);
    let session = session(&backend);
    let client = session.client();
    client.journals(1).await.expect("initial read");

    let err = client
        .create_journal(7, &journal_request(""))
        .await
        .expect_err("validation error");

    assert_eq!(err.user_message(), "title must not be empty");
    assert!(session.store().get(&keys::journal_list(1)).is_fresh());
    assert_eq!(backend.journals.lock().expect("journals lock").len(), 3);
}

#[tokio::test]
async fn read_started_before_write_cannot_overwrite_newer_data() {
    let backend = Backend::with_journals(3);
    let session = session(&backend);
    let key = keys::journal_list(1);
    let release = backend.hold_next_read();

    let early = {
        let client = session.client().clone();
        tokio::spawn(async move { client.journals(1).await })
    };
    settle(|| backend.reads_of("/api/journals?page=1") == 1).await;

    // The held read was issued before this write and carries three journals.
    let snapshot_before_write = backend.list();
    session
        .client()
        .create_journal(7, &journal_request("Kiln log"))
        .await
        .expect("create");
    let fresh = session.client().journals(1).await.expect("post-write read");
    assert_eq!(fresh.len(), 4);

    release.send(()).expect("release");
    // The early caller follows the newer request instead of returning its own result.
    let early = early.await.expect("join").expect("early read");
    assert_eq!(early.len(), 4);

    let entry = session.store().get(&key);
    assert_eq!(entry.status, EntryStatus::Fresh);
    assert_ne!(entry.data, Some(snapshot_before_write));
    assert_eq!(
        entry.data.as_ref().and_then(|data| data["items"].as_array()).map(Vec::len),
        Some(4)
    );
}

#[tokio::test]
async fn resolving_out_of_issue_order_keeps_latest_request() {
    let backend = Backend::with_journals(0);
    let session = session(&backend);
    let engine = session.engine().clone();
    let key = QueryKey::new("journals").param("page", 1);

    let (tx_a, rx_a) = oneshot::channel::<Value>();
    let (tx_b, rx_b) = oneshot::channel::<Value>();
    let rx_a = Arc::new(tokio::sync::Mutex::new(Some(rx_a)));
    let rx_b = Arc::new(tokio::sync::Mutex::new(Some(rx_b)));

    let fetch_a = fetcher_fn(move || {
        let rx = Arc::clone(&rx_a);
        async move {
            let rx = rx.lock().await.take().ok_or_else(|| RequestError::network("used"))?;
            rx.await.map_err(|_| RequestError::network("dropped"))
        }
    });
    let fetch_b = fetcher_fn(move || {
        let rx = Arc::clone(&rx_b);
        async move {
            let rx = rx.lock().await.take().ok_or_else(|| RequestError::network("used"))?;
            rx.await.map_err(|_| RequestError::network("dropped"))
        }
    });

    let a = {
        let engine = engine.clone();
        let key = key.clone();
        tokio::spawn(async move { engine.load(&key, fetch_a).await })
    };
    settle(|| session.store().peek(&key).is_some_and(|entry| entry.is_fetching())).await;
    let b = {
        let engine = engine.clone();
        let key = key.clone();
        tokio::spawn(async move { engine.refetch(&key, fetch_b).await })
    };
    settle(|| {
        session
            .store()
            .peek(&key)
            .and_then(|entry| entry.in_flight)
            .is_some_and(|id| id.0 == 2)
    })
    .await;

    tx_b.send(json!("B")).expect("resolve b");
    assert_eq!(b.await.expect("join").expect("b"), json!("B"));
    tx_a.send(json!("A")).expect("resolve a");
    a.await.expect("join").expect("a");

    assert_eq!(session.store().get(&key).data, Some(json!("B")));
}

#[tokio::test]
async fn watched_list_refreshes_after_write_without_explicit_read() {
    let backend = Backend::with_journals(3);
    let session = session(&backend);
    let key = keys::journal_list(1);
    let (tx, mut rx) = mpsc::unbounded_channel::<CacheEntry>();

    let _watch = session.client().watch(
        &key,
        "/api/journals?page=1",
        Arc::new(move |entry: &CacheEntry| {
            let _ = tx.send(entry.clone());
        }),
    );
    wait_for_items(&mut rx, 3).await;

    session
        .client()
        .create_journal(7, &journal_request("Slip casting"))
        .await
        .expect("create");

    wait_for_items(&mut rx, 4).await;
    assert_eq!(backend.reads_of("/api/journals?page=1"), 2);
}

#[tokio::test]
async fn post_in_journal_invalidates_journal_detail() {
    let backend = Backend::with_journals(0);
    let session = session(&backend);
    let store = session.store();
    store.put(&keys::journal(3), json!({"id": 3}));
    store.put(&keys::posts_in_journal(3), json!({"items": []}));
    store.put(&keys::journal(4), json!({"id": 4}));

    session
        .client()
        .create_post(&PostCreateRequest {
            title: "t".to_string(),
            body: "b".to_string(),
            journal_id: Some(3),
            project_id: None,
        })
        .await
        .expect("create post");

    assert_eq!(store.get(&keys::journal(3)).status, EntryStatus::Stale);
    assert_eq!(store.get(&keys::posts_in_journal(3)).status, EntryStatus::Stale);
    assert_eq!(store.get(&keys::journal(4)).status, EntryStatus::Fresh);
}

/// Yield to spawned tasks until `ready` holds.
async fn settle(mut ready: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if ready() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("spawned tasks never reached the expected state");
}

async fn wait_for_items(rx: &mut mpsc::UnboundedReceiver<CacheEntry>, expected: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(entry) = rx.recv().await {
            let items = entry
                .data
                .as_ref()
                .and_then(|data| data["items"].as_array())
                .map(Vec::len);
            if entry.status == EntryStatus::Fresh && items == Some(expected) {
                return;
            }
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {expected} items");
}
