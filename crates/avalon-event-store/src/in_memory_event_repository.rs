//! In-process implementation of the `EventRepository` trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use avalon_core::error::DomainError;
use avalon_core::repository::{EventRepository, StoredEvent};

/// Events buffered per change-feed subscriber before it starts lagging.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Event repository holding every stream in a mutex-guarded map.
///
/// The version check and the write happen under one lock, so the
/// conditional append is atomic. Committed events are then published, in
/// order, on a broadcast change feed.
#[derive(Debug)]
pub struct InMemoryEventRepository {
    streams: Mutex<HashMap<Uuid, Vec<StoredEvent>>>,
    feed: broadcast::Sender<StoredEvent>,
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty repository whose change feed buffers `capacity`
    /// events per subscriber.
    #[must_use]
    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity.max(1));
        Self {
            streams: Mutex::new(HashMap::new()),
            feed,
        }
    }

    /// Subscribes to every event committed from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoredEvent> {
        self.feed.subscribe()
    }
}

fn poisoned<T>(e: &std::sync::PoisonError<T>) -> DomainError {
    DomainError::Infrastructure(format!("event stream mutex poisoned: {e}"))
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = self.streams.lock().map_err(|e| poisoned(&e))?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        {
            let mut streams = self.streams.lock().map_err(|e| poisoned(&e))?;
            let stream = streams.entry(aggregate_id).or_default();
            let actual = i64::try_from(stream.len()).unwrap_or(i64::MAX);
            if actual != expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual,
                });
            }
            stream.extend_from_slice(events);
        } // Release lock before publishing

        for event in events {
            // No subscribers is fine.
            let _ = self.feed.send(event.clone());
        }
        Ok(())
    }
}
