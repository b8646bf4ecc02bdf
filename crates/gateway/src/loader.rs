//! Request-scoped batch loader.
//!
//! Every `load` issued within one coalescing window is collected into a single
//! call to the [`BatchFn`]. Keys are deduplicated, a key already in flight
//! joins that batch, and successful values are cached for the life of the
//! loader. Loaders are built per incoming request and never shared, so the
//! cache cannot leak data between callers. Batch tasks belong to the loader:
//! once the last handle is dropped, timers and batches still running are
//! aborted.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::LoadError;

pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(5);
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Fetches many keys in one downstream call.
///
/// Keys missing from the returned map resolve to [`LoadError::NotFound`]; an
/// `Err` fails every key of the batch.
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync + 'static {
    /// Resource name used in errors, logs and metrics.
    fn resource(&self) -> &'static str;

    async fn load(&self, keys: &[K]) -> Result<HashMap<K, V>, LoadError>;
}

/// Batching parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// How long the first key of a batch waits for companions.
    pub window: Duration,
    /// A batch reaching this size is dispatched immediately.
    pub max_batch_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_BATCH_WINDOW,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

type Waiter<V> = oneshot::Sender<Result<V, LoadError>>;

struct State<K, V> {
    cache: HashMap<K, V>,
    pending: Vec<K>,
    /// Callers per key, for keys that are pending or in flight.
    waiters: HashMap<K, Vec<Waiter<V>>>,
    timer_armed: bool,
}

struct Inner<K, V> {
    batch_fn: Arc<dyn BatchFn<K, V>>,
    config: LoaderConfig,
    state: Mutex<State<K, V>>,
}

/// Window timers and batches spawned by one loader.
///
/// Only loader handles hold it, never the tasks themselves, so it is
/// dropped with the last handle and takes the tasks with it.
#[derive(Default)]
struct Tasks(Mutex<Vec<JoinHandle<()>>>);

impl Tasks {
    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        let mut handles = self.0.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(tokio::spawn(task));
    }

    fn running(&self) -> usize {
        self.0.lock().iter().filter(|h| !h.is_finished()).count()
    }
}

impl Drop for Tasks {
    fn drop(&mut self) {
        for handle in self.0.get_mut().drain(..) {
            handle.abort();
        }
    }
}

/// Coalesces single-key loads into batch calls.
pub struct BatchLoader<K, V> {
    inner: Arc<Inner<K, V>>,
    tasks: Arc<Tasks>,
}

impl<K, V> Clone for BatchLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl<K, V> BatchLoader<K, V>
where
    K: Clone + Eq + Hash + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(batch_fn: impl BatchFn<K, V>, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                batch_fn: Arc::new(batch_fn),
                config: LoaderConfig {
                    max_batch_size: config.max_batch_size.max(1),
                    ..config
                },
                state: Mutex::new(State {
                    cache: HashMap::new(),
                    pending: Vec::new(),
                    waiters: HashMap::new(),
                    timer_armed: false,
                }),
            }),
            tasks: Arc::default(),
        }
    }

    pub fn resource(&self) -> &'static str {
        self.inner.batch_fn.resource()
    }

    /// Loads one key, joining whatever batch is being collected.
    pub async fn load(&self, key: K) -> Result<V, LoadError> {
        let receiver = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if let Some(value) = state.cache.get(&key) {
                return Ok(value.clone());
            }

            let (sender, receiver) = oneshot::channel();
            let waiters = state.waiters.entry(key.clone()).or_default();
            let first_request = waiters.is_empty();
            waiters.push(sender);
            if first_request {
                state.pending.push(key);
            }

            if state.pending.len() >= self.inner.config.max_batch_size {
                let keys = std::mem::take(&mut state.pending);
                let inner = self.inner.clone();
                self.tasks.spawn(async move { inner.execute(keys).await });
            } else if !state.timer_armed && !state.pending.is_empty() {
                state.timer_armed = true;
                let inner = self.inner.clone();
                self.tasks.spawn(async move {
                    tokio::time::sleep(inner.config.window).await;
                    inner.dispatch_pending().await;
                });
            }
            receiver
        };

        receiver
            .await
            .unwrap_or_else(|_| Err(LoadError::Cancelled(self.resource())))
    }

    /// Loads several keys; results follow the order of `keys`.
    pub async fn load_many(&self, keys: impl IntoIterator<Item = K>) -> Vec<Result<V, LoadError>> {
        join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Dispatches the pending batch now instead of waiting for the window.
    pub async fn flush(&self) {
        let keys = std::mem::take(&mut self.inner.state.lock().pending);
        if !keys.is_empty() {
            self.inner.execute(keys).await;
        }
    }

    /// Number of values cached so far.
    pub fn cached(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    /// Number of timers and batches that have not finished yet.
    pub fn running_tasks(&self) -> usize {
        self.tasks.running()
    }
}

impl<K, V> Inner<K, V>
where
    K: Clone + Eq + Hash + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn dispatch_pending(&self) {
        let keys = {
            let mut state = self.state.lock();
            state.timer_armed = false;
            std::mem::take(&mut state.pending)
        };
        if !keys.is_empty() {
            self.execute(keys).await;
        }
    }

    async fn execute(&self, keys: Vec<K>) {
        let resource = self.batch_fn.resource();
        metrics::counter!("gateway_batch_calls_total", "resource" => resource).increment(1);
        metrics::histogram!("gateway_batch_size", "resource" => resource).record(keys.len() as f64);
        tracing::debug!(resource, size = keys.len(), "dispatching batch");

        let result = self.batch_fn.load(&keys).await;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match result {
            Ok(mut values) => {
                for key in keys {
                    let outcome = match values.remove(&key) {
                        Some(value) => {
                            state.cache.insert(key.clone(), value.clone());
                            Ok(value)
                        }
                        None => Err(LoadError::NotFound {
                            resource,
                            key: key.to_string(),
                        }),
                    };
                    notify(state.waiters.remove(&key), outcome);
                }
            }
            Err(e) => {
                tracing::warn!(resource, size = keys.len(), error = %e, "batch load failed");
                for key in keys {
                    notify(state.waiters.remove(&key), Err(e.clone()));
                }
            }
        }
    }
}

fn notify<V: Clone>(waiters: Option<Vec<Waiter<V>>>, outcome: Result<V, LoadError>) {
    for waiter in waiters.into_iter().flatten() {
        // The caller may have gone away.
        let _ = waiter.send(outcome.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[derive(Clone, Default)]
    struct Recording {
        calls: Arc<Mutex<Vec<Vec<u32>>>>,
        missing: HashSet<u32>,
        fail: Arc<Mutex<bool>>,
    }

    impl Recording {
        fn calls(&self) -> Vec<Vec<u32>> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl BatchFn<u32, String> for Recording {
        fn resource(&self) -> &'static str {
            "numbers"
        }

        async fn load(&self, keys: &[u32]) -> Result<HashMap<u32, String>, LoadError> {
            self.calls.lock().push(keys.to_vec());
            if *self.fail.lock() {
                return Err(LoadError::Downstream {
                    resource: "numbers",
                    message: "boom".into(),
                });
            }
            Ok(keys
                .iter()
                .filter(|k| !self.missing.contains(k))
                .map(|k| (*k, format!("value-{k}")))
                .collect())
        }
    }

    fn loader(batch_fn: Recording, max_batch_size: usize) -> BatchLoader<u32, String> {
        BatchLoader::new(
            batch_fn,
            LoaderConfig {
                window: Duration::from_millis(5),
                max_batch_size,
            },
        )
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_deduplicated_batch() {
        let recording = Recording::default();
        let loader = loader(recording.clone(), 100);

        let results = loader.load_many([3, 1, 3, 2, 1]).await;
        let values: Vec<String> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, ["value-3", "value-1", "value-3", "value-2", "value-1"]);

        let calls = recording.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_missing_key_fails_alone() {
        let recording = Recording {
            missing: HashSet::from([2]),
            ..Default::default()
        };
        let loader = loader(recording, 100);

        let results = loader.load_many([1, 2, 3]).await;
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(LoadError::NotFound { resource: "numbers", key }) if key == "2"
        ));
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_batch_error_fails_every_key_and_is_not_cached() {
        let recording = Recording::default();
        *recording.fail.lock() = true;
        let loader = loader(recording.clone(), 100);

        let results = loader.load_many([1, 2]).await;
        assert!(results.iter().all(|r| matches!(r, Err(LoadError::Downstream { .. }))));
        assert_eq!(loader.cached(), 0);

        *recording.fail.lock() = false;
        assert_eq!(loader.load(1).await.unwrap(), "value-1");
        assert_eq!(recording.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_values_are_cached() {
        let recording = Recording::default();
        let loader = loader(recording.clone(), 100);

        loader.load_many([1, 2]).await;
        loader.load_many([2, 1]).await;
        assert_eq!(recording.calls().len(), 1);
        assert_eq!(loader.cached(), 2);
    }

    #[tokio::test]
    async fn test_full_batch_dispatches_without_waiting() {
        let recording = Recording::default();
        let loader = loader(recording.clone(), 2);

        let results = loader.load_many([1, 2, 3, 4, 5]).await;
        assert!(results.iter().all(Result::is_ok));

        let mut sizes: Vec<usize> = recording.calls().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_flush_drains_before_window() {
        let recording = Recording::default();
        let loader = BatchLoader::new(
            recording.clone(),
            LoaderConfig {
                window: Duration::from_secs(3600),
                max_batch_size: 100,
            },
        );

        let (results, ()) = tokio::join!(loader.load_many([7, 8]), loader.flush());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(recording.calls(), vec![vec![7, 8]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_loader_cancels_its_window_timer() {
        let recording = Recording::default();
        let loader = BatchLoader::new(
            recording.clone(),
            LoaderConfig {
                window: Duration::from_secs(1),
                max_batch_size: 100,
            },
        );

        // The request gives up while the key waits for the window.
        let gave_up = tokio::time::timeout(Duration::from_millis(10), loader.load(1)).await;
        assert!(gave_up.is_err());
        assert_eq!(loader.running_tasks(), 1);

        drop(loader);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(recording.calls().is_empty());
    }

    #[tokio::test]
    async fn test_finished_tasks_are_reaped() {
        let recording = Recording::default();
        let loader = loader(recording.clone(), 100);

        loader.load(1).await.unwrap();
        loader.load(2).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(loader.running_tasks(), 0);
        assert_eq!(recording.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_key_in_flight_is_joined() {
        let recording = Recording::default();
        let loader = loader(recording.clone(), 100);

        let first = loader.load(9);
        let second = async {
            tokio::task::yield_now().await;
            loader.load(9).await
        };
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(recording.calls().len(), 1);
    }
}
