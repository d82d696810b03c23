//! Read-side cache in front of another `EventRepository`.
//!
//! Loads are served from a bounded, least-recently-used map of streams.
//! Appends write through to the inner store; a conflicting append drops the
//! cached stream, since it is evidently stale. When the inner store has a
//! change feed, [`CachedEventRepository::follow`] keeps cached streams in
//! step with writes made through other handles.
//!
//! The cache never weakens the conditional append: a stale stream can only
//! produce a conflict, which the transition protocol answers by reloading.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use avalon_core::error::DomainError;
use avalon_core::repository::{EventRepository, StoredEvent};

#[derive(Debug)]
struct CachedStream {
    events: Vec<StoredEvent>,
    last_used: u64,
}

#[derive(Debug)]
struct StreamCache {
    capacity: usize,
    clock: u64,
    /// Bumped whenever a stream changes outside a load, so a load that raced
    /// with the change does not cache what it read.
    epoch: u64,
    streams: HashMap<Uuid, CachedStream>,
}

impl StreamCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            epoch: 0,
            streams: HashMap::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, id: Uuid) -> Option<Vec<StoredEvent>> {
        let now = self.tick();
        let stream = self.streams.get_mut(&id)?;
        stream.last_used = now;
        Some(stream.events.clone())
    }

    fn put(&mut self, id: Uuid, events: Vec<StoredEvent>) {
        if self.capacity == 0 {
            return;
        }
        if !self.streams.contains_key(&id) && self.streams.len() >= self.capacity {
            let oldest = self
                .streams
                .iter()
                .min_by_key(|(_, stream)| stream.last_used)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                self.streams.remove(&oldest);
            }
        }
        let last_used = self.tick();
        self.streams.insert(id, CachedStream { events, last_used });
    }

    fn len_of(&self, id: Uuid) -> Option<usize> {
        self.streams.get(&id).map(|s| s.events.len())
    }

    fn invalidate(&mut self, id: Uuid) {
        self.epoch += 1;
        self.streams.remove(&id);
    }

    fn clear(&mut self) {
        self.epoch += 1;
        self.streams.clear();
    }

    /// Records a successful append of `events` at `expected_version`.
    fn appended(&mut self, id: Uuid, expected_version: i64, events: &[StoredEvent]) {
        self.epoch += 1;
        let Some(stream) = self.streams.get_mut(&id) else {
            return;
        };
        let cached = i64::try_from(stream.events.len()).unwrap_or(i64::MAX);
        let committed = expected_version + i64::try_from(events.len()).unwrap_or(i64::MAX);
        if cached == expected_version {
            stream.events.extend_from_slice(events);
        } else if cached != committed {
            self.streams.remove(&id);
        }
    }

    /// Applies one event from the change feed.
    fn observed(&mut self, event: StoredEvent) {
        self.epoch += 1;
        let id = event.aggregate_id;
        let Some(stream) = self.streams.get_mut(&id) else {
            return;
        };
        let cached = i64::try_from(stream.events.len()).unwrap_or(i64::MAX);
        if event.sequence_number == cached + 1 {
            stream.events.push(event);
        } else if event.sequence_number > cached {
            // A gap; the feed lost something for this stream.
            self.streams.remove(&id);
        }
    }
}

/// An `EventRepository` that caches whole streams in memory.
#[derive(Clone)]
pub struct CachedEventRepository {
    inner: Arc<dyn EventRepository>,
    cache: Arc<Mutex<StreamCache>>,
}

impl std::fmt::Debug for CachedEventRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEventRepository")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn poisoned<T>(e: &std::sync::PoisonError<T>) -> DomainError {
    DomainError::Infrastructure(format!("stream cache mutex poisoned: {e}"))
}

impl CachedEventRepository {
    /// Wraps `inner`, caching at most `capacity` streams.
    #[must_use]
    pub fn new(inner: Arc<dyn EventRepository>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Arc::new(Mutex::new(StreamCache::new(capacity))),
        }
    }

    /// Mirrors `feed` into the cache until the feed closes. A lagging
    /// receiver has missed events, so the whole cache is dropped.
    #[must_use]
    pub fn follow(&self, mut feed: broadcast::Receiver<StoredEvent>) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(event) => {
                        let Ok(mut streams) = cache.lock() else {
                            warn!("stream cache mutex poisoned, no longer following");
                            return;
                        };
                        streams.observed(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "change feed lagged, clearing stream cache");
                        let Ok(mut streams) = cache.lock() else {
                            return;
                        };
                        streams.clear();
                    }
                    Err(RecvError::Closed) => {
                        debug!("change feed closed");
                        return;
                    }
                }
            }
        })
    }

    /// Number of events cached for `aggregate_id`, if the stream is cached.
    #[must_use]
    pub fn cached_len(&self, aggregate_id: Uuid) -> Option<usize> {
        self.cache.lock().ok()?.len_of(aggregate_id)
    }
}

#[async_trait]
impl EventRepository for CachedEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let epoch = {
            let mut cache = self.cache.lock().map_err(|e| poisoned(&e))?;
            if let Some(events) = cache.get(aggregate_id) {
                return Ok(events);
            }
            cache.epoch
        };

        let events = self.inner.load_events(aggregate_id).await?;

        // Unknown games are not cached, so a game created elsewhere is seen.
        if !events.is_empty() {
            let mut cache = self.cache.lock().map_err(|e| poisoned(&e))?;
            if cache.epoch == epoch {
                cache.put(aggregate_id, events.clone());
            }
        }
        Ok(events)
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let result = self
            .inner
            .append_events(aggregate_id, expected_version, events)
            .await;

        let mut cache = self.cache.lock().map_err(|e| poisoned(&e))?;
        match &result {
            Ok(()) => cache.appended(aggregate_id, expected_version, events),
            Err(e) if e.is_conflict() => cache.invalidate(aggregate_id),
            Err(_) => {}
        }
        result
    }
}
