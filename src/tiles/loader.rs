//! Per-source tile loading with a bounded pool of background workers.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use image::DynamicImage;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::fetch::{TileFetcher, decode_tile};
use super::{LoadingQueue, RecencyCache};
use crate::error::{Result, TileError};
use crate::models::{BoundingBox, WmsSource};

/// Anything usable as a tile key.
pub trait TileId: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + Debug + Send + Sync + 'static> TileId for T {}

/// Notification from a loader to the draw context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent<K> {
    /// A worker began draining the queue
    WorkerStarted {
        /// Source name
        source: String,
    },
    /// A tile was fetched, decoded and cached; redraw to show it
    TileReady {
        /// Source name
        source: String,
        /// The cached tile
        key: K,
    },
    /// A tile could not be fetched or decoded, or its fetcher panicked
    TileFailed {
        /// Source name
        source: String,
        /// The failed tile, free to be requested again
        key: K,
        /// Human-readable cause
        error: String,
    },
    /// A worker found the queue empty and exited
    WorkerStopped {
        /// Source name
        source: String,
    },
}

impl<K> LoaderEvent<K> {
    /// Name of the source that sent the event
    pub fn source(&self) -> &str {
        match self {
            Self::WorkerStarted { source }
            | Self::TileReady { source, .. }
            | Self::TileFailed { source, .. }
            | Self::WorkerStopped { source } => source,
        }
    }
}

/// Sending half of a loader event stream
pub type EventSender<K> = mpsc::UnboundedSender<LoaderEvent<K>>;

/// Receiving half of a loader event stream
pub type EventReceiver<K> = mpsc::UnboundedReceiver<LoaderEvent<K>>;

/// Create an event stream shared by one or more loaders.
pub fn channel<K>() -> (EventSender<K>, EventReceiver<K>) {
    mpsc::unbounded_channel()
}

/// Sizing for one loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Cache size after eviction
    pub target_size: usize,
    /// Cache size that triggers eviction
    pub tolerated_size: usize,
    /// Upper bound on concurrently running workers
    pub max_workers: usize,
    /// Requested tile width and height in pixels
    pub tile_size: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            target_size: 40,
            tolerated_size: 50,
            max_workers: 2,
            tile_size: 256,
        }
    }
}

/// State shared between a loader and its workers
struct Shared<K, F> {
    name: String,
    tile_size: u32,
    cache: RecencyCache<K, Arc<DynamicImage>>,
    queue: LoadingQueue<K, String>,
    fetcher: F,
    events: EventSender<K>,
    max_workers: usize,
    active_workers: AtomicUsize,
    closed: AtomicBool,
}

impl<K: TileId, F: TileFetcher> Shared<K, F> {
    fn emit(&self, event: LoaderEvent<K>) {
        // The draw context may already be gone; workers finish regardless
        let _ = self.events.send(event);
    }

    fn try_reserve_worker(&self) -> bool {
        self.active_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_workers).then_some(n + 1)
            })
            .is_ok()
    }
}

/// Releases a claimed key when dropped, even if the fetch panics.
struct Claim<'a, K: TileId> {
    queue: &'a LoadingQueue<K, String>,
    key: &'a K,
}

impl<K: TileId> Drop for Claim<'_, K> {
    fn drop(&mut self) {
        self.queue.complete_loading(self.key);
    }
}

/// Gives back a worker slot when dropped.
struct WorkerSlot<'a>(&'a AtomicUsize);

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Loads tiles of one WMS source into its own cache.
///
/// [`request_tile`](Self::request_tile) never blocks: a cache hit is returned
/// immediately, a miss is queued and picked up by one of at most
/// `max_workers` tokio tasks. Workers are spawned lazily and exit when the
/// queue runs dry. Progress is reported as [`LoaderEvent`]s.
pub struct TileLoader<K: TileId, F: TileFetcher> {
    source: WmsSource,
    shared: Arc<Shared<K, F>>,
    handle: Handle,
}

impl<K: TileId, F: TileFetcher> TileLoader<K, F> {
    /// Create a loader whose workers run on the current tokio runtime.
    pub fn new(
        source: WmsSource,
        config: LoaderConfig,
        fetcher: F,
        events: EventSender<K>,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| TileError::NoRuntime)?;
        Self::with_handle(handle, source, config, fetcher, events)
    }

    /// Create a loader whose workers run on `handle`.
    pub fn with_handle(
        handle: Handle,
        source: WmsSource,
        config: LoaderConfig,
        fetcher: F,
        events: EventSender<K>,
    ) -> Result<Self> {
        if config.max_workers == 0 {
            return Err(TileError::InvalidConfig(
                "loader needs at least one worker".to_string(),
            ));
        }
        if config.tile_size == 0 {
            return Err(TileError::InvalidConfig(
                "tile size must be positive".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            name: source.name.clone(),
            tile_size: config.tile_size,
            cache: RecencyCache::new(config.target_size, config.tolerated_size)?,
            queue: LoadingQueue::new(),
            fetcher,
            events,
            max_workers: config.max_workers,
            active_workers: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });

        Ok(Self {
            source,
            shared,
            handle,
        })
    }

    /// Return the cached tile, or queue it for loading and return `None`.
    ///
    /// `bbox` is the tile's geographic extent, used to build the request URL
    /// when the tile is neither cached nor already pending.
    pub fn request_tile(&self, key: K, bbox: &BoundingBox) -> Option<Arc<DynamicImage>> {
        if let Some(image) = self.shared.cache.get_with_update(&key) {
            return Some(image);
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return None;
        }
        if self.shared.queue.thread_runs_or_is_in_queue(&key) {
            return None;
        }

        let size = self.shared.tile_size;
        let url = self.source.get_map_url(bbox, size, size);
        self.shared.queue.insert_into_loading_queue(key, url);
        self.maybe_spawn_worker();
        None
    }

    fn maybe_spawn_worker(&self) {
        if !self.shared.try_reserve_worker() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        self.handle.spawn(run_worker(shared));
    }

    /// Drop all queued requests. Fetches already running complete normally.
    pub fn stop_loading(&self) {
        let dropped = self.shared.queue.clear_loading_queue();
        if dropped > 0 {
            tracing::debug!("Dropped {dropped} queued tiles for {}", self.source.name);
        }
    }

    /// Stop loading and refuse new requests. Cached tiles are still served.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.stop_loading();
        tracing::info!("Closed tile loader for {}", self.source.name);
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// The source this loader fetches from.
    pub const fn source(&self) -> &WmsSource {
        &self.source
    }

    /// Edge length in pixels of the tiles this loader requests.
    pub fn tile_size(&self) -> u32 {
        self.shared.tile_size
    }

    /// Number of workers currently alive.
    pub fn active_workers(&self) -> usize {
        self.shared.active_workers.load(Ordering::SeqCst)
    }

    /// Whether a key is queued or being fetched.
    pub fn is_pending(&self, key: &K) -> bool {
        self.shared.queue.thread_runs_or_is_in_queue(key)
    }

    /// Number of cached tiles.
    pub fn cached_len(&self) -> usize {
        self.shared.cache.len()
    }

    /// Number of queued, not yet claimed, tiles.
    pub fn queued_len(&self) -> usize {
        self.shared.queue.len()
    }
}

impl<K: TileId, F: TileFetcher> Drop for TileLoader<K, F> {
    fn drop(&mut self) {
        self.shared.queue.clear_loading_queue();
    }
}

/// Drain the queue, then exit.
///
/// The caller has already reserved a worker slot for this task.
async fn run_worker<K: TileId, F: TileFetcher>(shared: Arc<Shared<K, F>>) {
    let source = shared.name.clone();
    tracing::debug!("Tile worker started for {source}");
    shared.emit(LoaderEvent::WorkerStarted {
        source: source.clone(),
    });

    let mut slot = WorkerSlot(&shared.active_workers);
    loop {
        drain_queue(&shared, &source).await;
        drop(slot);
        // A request may have queued work while every slot looked taken
        if shared.queue.is_empty() || !shared.try_reserve_worker() {
            break;
        }
        slot = WorkerSlot(&shared.active_workers);
    }

    tracing::debug!("Tile worker stopped for {source}");
    shared.emit(LoaderEvent::WorkerStopped { source });
}

async fn drain_queue<K: TileId, F: TileFetcher>(shared: &Arc<Shared<K, F>>, source: &str) {
    while let Some((key, url)) = shared.queue.remove_first_and_start_loading() {
        let claim = Claim {
            queue: &shared.queue,
            key: &key,
        };
        // A panicking fetcher takes down its own task, not the worker
        let result = match tokio::spawn(load_tile(Arc::clone(shared), url)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TileError::Interrupted("fetch panicked".to_string())),
            Err(_) => Err(TileError::Interrupted("fetch cancelled".to_string())),
        };
        if let Ok(image) = &result {
            shared
                .cache
                .insert_without_update(key.clone(), Arc::clone(image));
        }
        drop(claim);

        match result {
            Ok(_) => shared.emit(LoaderEvent::TileReady {
                source: source.to_string(),
                key,
            }),
            Err(e) => {
                tracing::warn!("Failed to load tile {key:?} from {source}: {e}");
                shared.emit(LoaderEvent::TileFailed {
                    source: source.to_string(),
                    key,
                    error: e.to_string(),
                });
            }
        }
    }
}

async fn load_tile<K: TileId, F: TileFetcher>(
    shared: Arc<Shared<K, F>>,
    url: String,
) -> Result<Arc<DynamicImage>> {
    let bytes = shared.fetcher.fetch(&url).await?;
    let image = decode_tile(&bytes, shared.tile_size, shared.tile_size)?;
    Ok(Arc::new(image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TileKey;
    use crate::tiles::png_tile;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[derive(Clone, Copy)]
    enum Reply {
        Png,
        Garbage,
        NotFound,
        Panic,
    }

    #[derive(Clone)]
    struct MockFetcher {
        calls: Arc<Mutex<Vec<String>>>,
        gate: Option<Arc<Semaphore>>,
        reply: Reply,
    }

    impl MockFetcher {
        fn new(reply: Reply) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                gate: None,
                reply,
            }
        }

        /// Fetches wait for a permit from the returned semaphore
        fn gated(reply: Reply) -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            let mut fetcher = Self::new(reply);
            fetcher.gate = Some(Arc::clone(&gate));
            (fetcher, gate)
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl TileFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.calls.lock().unwrap().push(url.to_string());
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }
            match self.reply {
                Reply::Png => Ok(png_tile(4, 4, [0, 128, 0, 255])),
                Reply::Garbage => Ok(b"not an image".to_vec()),
                Reply::NotFound => Err(TileError::Status {
                    status: 404,
                    url: url.to_string(),
                }),
                Reply::Panic => panic!("fetcher blew up"),
            }
        }
    }

    fn config(max_workers: usize) -> LoaderConfig {
        LoaderConfig {
            target_size: 8,
            tolerated_size: 10,
            max_workers,
            tile_size: 4,
        }
    }

    fn source() -> WmsSource {
        WmsSource::new("test", "http://wms.invalid/wms", &["base"])
    }

    fn bbox(key: TileKey) -> BoundingBox {
        let (x, y) = (key.x as f64, key.y as f64);
        BoundingBox::new(x, y, x + 1.0, y + 1.0)
    }

    fn new_loader(
        fetcher: MockFetcher,
        max_workers: usize,
    ) -> (TileLoader<TileKey, MockFetcher>, EventReceiver<TileKey>) {
        let (tx, rx) = channel();
        let loader = TileLoader::new(source(), config(max_workers), fetcher, tx).unwrap();
        (loader, rx)
    }

    /// Wait for the next tile outcome, skipping worker lifecycle events.
    async fn next_outcome(rx: &mut EventReceiver<TileKey>) -> LoaderEvent<TileKey> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for loader event")
                .expect("event channel closed");
            if matches!(
                event,
                LoaderEvent::TileReady { .. } | LoaderEvent::TileFailed { .. }
            ) {
                return event;
            }
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let (tx, _rx) = channel::<TileKey>();
        let result = TileLoader::new(source(), config(1), MockFetcher::new(Reply::Png), tx);
        assert!(matches!(result, Err(TileError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_rejects_zero_workers() {
        let (tx, _rx) = channel::<TileKey>();
        let result = TileLoader::new(source(), config(0), MockFetcher::new(Reply::Png), tx);
        assert!(matches!(result, Err(TileError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let fetcher = MockFetcher::new(Reply::Png);
        let (loader, mut rx) = new_loader(fetcher.clone(), 2);
        let key = TileKey::new(3, 1, 2);

        assert!(loader.request_tile(key, &bbox(key)).is_none());
        assert_eq!(
            next_outcome(&mut rx).await,
            LoaderEvent::TileReady {
                source: "test".to_string(),
                key
            }
        );

        let image = loader.request_tile(key, &bbox(key)).expect("tile cached");
        assert_eq!((image.width(), image.height()), (4, 4));
        assert_eq!(
            fetcher.calls(),
            vec![source().get_map_url(&bbox(key), 4, 4)]
        );
        assert!(!loader.is_pending(&key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_requests_fetch_once() {
        let (fetcher, gate) = MockFetcher::gated(Reply::Png);
        let (loader, mut rx) = new_loader(fetcher.clone(), 2);
        let loader = Arc::new(loader);
        let key = TileKey::new(7, -2, 5);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                std::thread::spawn(move || loader.request_tile(key, &bbox(key)).is_none())
            })
            .collect();
        for thread in threads {
            assert!(thread.join().unwrap());
        }

        gate.add_permits(8);
        assert!(matches!(
            next_outcome(&mut rx).await,
            LoaderEvent::TileReady { .. }
        ));
        assert!(loader.request_tile(key, &bbox(key)).is_some());
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_releases_claim() {
        let fetcher = MockFetcher::new(Reply::NotFound);
        let (loader, mut rx) = new_loader(fetcher.clone(), 1);
        let key = TileKey::new(1, 0, 0);

        loader.request_tile(key, &bbox(key));
        match next_outcome(&mut rx).await {
            LoaderEvent::TileFailed { key: failed, error, .. } => {
                assert_eq!(failed, key);
                assert!(error.contains("404"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!loader.is_pending(&key));
        assert_eq!(loader.cached_len(), 0);

        // A later draw pass retries
        assert!(loader.request_tile(key, &bbox(key)).is_none());
        assert!(matches!(
            next_outcome(&mut rx).await,
            LoaderEvent::TileFailed { .. }
        ));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_tile_fails() {
        let (loader, mut rx) = new_loader(MockFetcher::new(Reply::Garbage), 1);
        let key = TileKey::new(1, 1, 1);

        loader.request_tile(key, &bbox(key));
        match next_outcome(&mut rx).await {
            LoaderEvent::TileFailed { error, .. } => assert!(error.contains("decode")),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!loader.is_pending(&key));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pool_is_bounded_and_drains() {
        let (fetcher, gate) = MockFetcher::gated(Reply::Png);
        let (loader, mut rx) = new_loader(fetcher.clone(), 2);

        for x in 0..5 {
            let key = TileKey::new(4, x, 0);
            loader.request_tile(key, &bbox(key));
        }
        wait_until(|| fetcher.calls().len() == 2).await;
        assert_eq!(loader.active_workers(), 2);
        assert_eq!(loader.queued_len(), 3);

        gate.add_permits(5);
        for _ in 0..5 {
            assert!(matches!(
                next_outcome(&mut rx).await,
                LoaderEvent::TileReady { .. }
            ));
        }
        wait_until(|| loader.active_workers() == 0).await;
        assert_eq!(loader.cached_len(), 5);
        assert_eq!(fetcher.calls().len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_most_recent_request_served_first() {
        let (fetcher, gate) = MockFetcher::gated(Reply::Png);
        let (loader, mut rx) = new_loader(fetcher.clone(), 1);
        let keys: Vec<_> = (0..3).map(|x| TileKey::new(2, x, 0)).collect();

        loader.request_tile(keys[0], &bbox(keys[0]));
        wait_until(|| fetcher.calls().len() == 1).await;
        loader.request_tile(keys[1], &bbox(keys[1]));
        loader.request_tile(keys[2], &bbox(keys[2]));

        gate.add_permits(3);
        for _ in 0..3 {
            next_outcome(&mut rx).await;
        }
        let expected: Vec<_> = [keys[0], keys[2], keys[1]]
            .iter()
            .map(|k| source().get_map_url(&bbox(*k), 4, 4))
            .collect();
        assert_eq!(fetcher.calls(), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_loading_lets_in_flight_finish() {
        let (fetcher, gate) = MockFetcher::gated(Reply::Png);
        let (loader, mut rx) = new_loader(fetcher.clone(), 1);
        let first = TileKey::new(5, 0, 0);

        loader.request_tile(first, &bbox(first));
        wait_until(|| fetcher.calls().len() == 1).await;
        for x in 1..4 {
            let key = TileKey::new(5, x, 0);
            loader.request_tile(key, &bbox(key));
        }
        assert_eq!(loader.queued_len(), 3);

        loader.stop_loading();
        assert_eq!(loader.queued_len(), 0);
        assert!(loader.is_pending(&first));

        gate.add_permits(4);
        assert_eq!(
            next_outcome(&mut rx).await,
            LoaderEvent::TileReady {
                source: "test".to_string(),
                key: first
            }
        );
        wait_until(|| loader.active_workers() == 0).await;
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(loader.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_worker_lifecycle_events() {
        let (loader, mut rx) = new_loader(MockFetcher::new(Reply::Png), 1);
        let key = TileKey::new(0, 0, 0);
        loader.request_tile(key, &bbox(key));

        let mut events = Vec::new();
        while events.len() < 3 {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            events.push(event);
        }
        assert!(matches!(events[0], LoaderEvent::WorkerStarted { .. }));
        assert!(matches!(events[1], LoaderEvent::TileReady { .. }));
        assert!(matches!(events[2], LoaderEvent::WorkerStopped { .. }));
        assert!(events.iter().all(|e| e.source() == "test"));
    }

    #[tokio::test]
    async fn test_closed_loader_serves_cache_only() {
        let (loader, mut rx) = new_loader(MockFetcher::new(Reply::Png), 1);
        let cached = TileKey::new(2, 0, 0);
        loader.request_tile(cached, &bbox(cached));
        next_outcome(&mut rx).await;

        loader.close();
        assert!(loader.is_closed());
        assert!(loader.request_tile(cached, &bbox(cached)).is_some());

        let fresh = TileKey::new(2, 1, 0);
        assert!(loader.request_tile(fresh, &bbox(fresh)).is_none());
        assert_eq!(loader.queued_len(), 0);
        assert!(!loader.is_pending(&fresh));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_fetch_releases_claim() {
        let fetcher = MockFetcher::new(Reply::Panic);
        let (loader, mut rx) = new_loader(fetcher.clone(), 1);
        let key = TileKey::new(6, 3, -1);

        loader.request_tile(key, &bbox(key));
        match next_outcome(&mut rx).await {
            LoaderEvent::TileFailed { key: failed, error, .. } => {
                assert_eq!(failed, key);
                assert!(error.contains("panicked"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        wait_until(|| loader.active_workers() == 0).await;
        assert!(!loader.is_pending(&key));

        // The worker survived to report its exit
        let stopped = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(stopped, LoaderEvent::WorkerStopped { .. }));

        assert!(loader.request_tile(key, &bbox(key)).is_none());
        assert!(matches!(
            next_outcome(&mut rx).await,
            LoaderEvent::TileFailed { .. }
        ));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_clears_queue() {
        let (fetcher, gate) = MockFetcher::gated(Reply::Png);
        let (loader, mut rx) = new_loader(fetcher.clone(), 1);

        for x in 0..4 {
            let key = TileKey::new(8, x, 0);
            loader.request_tile(key, &bbox(key));
        }
        wait_until(|| fetcher.calls().len() == 1).await;
        assert_eq!(loader.queued_len(), 3);

        let shared = Arc::clone(&loader.shared);
        drop(loader);
        assert!(shared.queue.is_empty());

        // The in-flight fetch still completes, nothing else is fetched
        gate.add_permits(4);
        assert!(matches!(
            next_outcome(&mut rx).await,
            LoaderEvent::TileReady { .. }
        ));
        wait_until(|| shared.active_workers.load(Ordering::SeqCst) == 0).await;
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(shared.queue.claimed_len(), 0);
    }
}
