//! Bootstrap retry tests
//!
//! A backend that comes up late is used as soon as it answers; one that
//! never does fails startup after exactly the configured number of attempts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use zap_sidecar::adapters::kv::{KvAdapter, KvClient};
use zap_sidecar::adapters::{BackendError, BackendResult};
use zap_sidecar::bootstrap::{connect_with_retry, BootstrapError, Connector, RetryPolicy};
use zap_sidecar::dispatch::{Bridge, Dispatcher};

/// Store that only accepts connections from attempt `ready_at` onward
struct LateStore {
    ready_at: u32,
    attempts: AtomicU32,
}

impl LateStore {
    fn new(ready_at: u32) -> Self {
        Self {
            ready_at,
            attempts: AtomicU32::new(0),
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct StoreHandle {
    data: Mutex<HashMap<String, String>>,
}

impl Connector for LateStore {
    type Handle = StoreHandle;

    fn backend(&self) -> &str {
        "late store"
    }

    fn connect(&self) -> BoxFuture<'_, BackendResult<StoreHandle>> {
        Box::pin(async {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt < self.ready_at {
                return Err(BackendError::driver("connection refused"));
            }
            Ok(StoreHandle::default())
        })
    }

    fn probe<'a>(&'a self, _handle: &'a StoreHandle) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn discard(&self, _handle: StoreHandle) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

impl KvClient for StoreHandle {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BackendResult<Option<String>>> {
        Box::pin(async move { Ok(self.data.lock().unwrap().get(key).cloned()) })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        _ttl: Option<Duration>,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            self.data.lock().unwrap().insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn mget<'a>(&'a self, keys: &'a [String]) -> BoxFuture<'a, BackendResult<Vec<Option<String>>>> {
        Box::pin(async move {
            let data = self.data.lock().unwrap();
            Ok(keys.iter().map(|k| data.get(k).cloned()).collect())
        })
    }

    fn command<'a>(&'a self, _name: &'a str, _args: &'a [String]) -> BoxFuture<'a, BackendResult<Value>> {
        Box::pin(async { Ok(Value::Null) })
    }

    fn ping(&self) -> BoxFuture<'_, BackendResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

fn instant(attempts: u32) -> RetryPolicy {
    RetryPolicy::fixed(attempts, Duration::ZERO)
}

#[tokio::test]
async fn test_backend_ready_on_fifth_attempt_starts_after_five() {
    let store = LateStore::new(5);
    let handle = connect_with_retry(&instant(30), &store).await.unwrap();
    assert_eq!(store.attempts(), 5);

    // the handle that won the race is the one the bridge serves from
    let bridge = Dispatcher::new(KvAdapter::new(handle));
    let reply = bridge.handle("/health", Default::default()).await;
    assert_eq!(reply.body_json().unwrap(), json!({"status": "ok", "service": "zap-kv"}));
}

#[tokio::test]
async fn test_unreachable_backend_fails_after_thirty() {
    let store = LateStore::new(u32::MAX);
    let err = match connect_with_retry(&instant(30), &store).await {
        Ok(_) => panic!("bootstrap should fail"),
        Err(err) => err,
    };

    assert_eq!(store.attempts(), 30);
    let BootstrapError::Exhausted {
        backend,
        attempts,
        last_error,
    } = err;
    assert_eq!(backend, "late store");
    assert_eq!(attempts, 30);
    assert_eq!(last_error, BackendError::driver("connection refused"));
}

#[tokio::test]
async fn test_delay_is_applied_between_attempts_only() {
    let store = LateStore::new(3);
    let started = tokio::time::Instant::now();
    connect_with_retry(&RetryPolicy::fixed(3, Duration::from_millis(20)), &store)
        .await
        .unwrap();

    // two pauses for three attempts
    assert!(started.elapsed() >= Duration::from_millis(40));
    assert_eq!(store.attempts(), 3);
}
