use crate::buffer::{BufferFull, ScrapeBuffer};
use crate::encoder;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use promsnap_core::{CollectError, CollectorConfig, MetricsPipeline};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

/// How many failed reclaim attempts between stall warnings while waiting
/// for outstanding readers.
const DRAIN_WARN_EVERY: u32 = 4096;

/// One published scrape: an immutable byte view over the shared buffer, the
/// instant it was generated, and whether it was served from cache.
///
/// Clones are cheap (reference-counted view). Dropping the snapshot releases
/// it; the next collection pass reuses the buffer only after every
/// outstanding snapshot has been dropped, so hold one no longer than it takes
/// to write the response body.
#[derive(Debug, Clone)]
pub struct Snapshot {
    body: Bytes,
    generated_at: DateTime<Utc>,
    from_cache: bool,
}

impl Snapshot {
    fn fresh(body: Bytes, generated_at: DateTime<Utc>) -> Self {
        Self { body, generated_at, from_cache: false }
    }

    /// A failed pass publishes a zero-length view.
    fn failure(generated_at: DateTime<Utc>) -> Self {
        Self { body: Bytes::new(), generated_at, from_cache: false }
    }

    fn cached(&self) -> Self {
        Self {
            body: self.body.clone(),
            generated_at: self.generated_at,
            from_cache: true,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// True for failure snapshots and empty batches; the scrape boundary
    /// answers these with 204.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// The buffer between collection passes: writable after startup or a failed
/// pass, frozen behind the published snapshot after a successful one.
enum Retained {
    Writable(BytesMut),
    Frozen(Bytes),
}

struct CoordState {
    /// Published view, served on cache hits. Holds one reference to the
    /// frozen buffer alongside `retained`.
    snapshot: Option<Snapshot>,
    /// Cache clock. Unset while a pass is in flight and after a failed pass,
    /// so the next caller drives a retry instead of trusting a bad entry.
    last_generated: Option<Instant>,
    /// Present while a pass is in flight; joiners subscribe, the driver
    /// resolves every waiter with the pass result.
    in_flight: Option<watch::Sender<Option<Snapshot>>>,
    retained: Option<Retained>,
    /// Logical buffer capacity — the high-water mark across passes.
    capacity: usize,
}

enum Decision {
    Join(watch::Receiver<Option<Snapshot>>),
    Drive { retained: Option<Retained>, capacity: usize },
}

/// Decides, per scrape, whether to serve the cached snapshot, join the
/// in-flight collection, or drive a fresh one; owns the shared scrape buffer
/// and the single-flight bookkeeping.
///
/// The internal mutex guards bookkeeping only and is never held across the
/// pipeline pull, the encode loop, or an await.
pub struct CollectionCoordinator {
    pipeline: Arc<dyn MetricsPipeline>,
    cache_window: Duration,
    max_buffer_bytes: usize,
    state: Mutex<CoordState>,
}

impl CollectionCoordinator {
    pub fn new(pipeline: Arc<dyn MetricsPipeline>, config: &CollectorConfig) -> Self {
        let capacity = config.initial_buffer_bytes.min(config.max_buffer_bytes);
        Self {
            pipeline,
            cache_window: config.cache_window(),
            max_buffer_bytes: config.max_buffer_bytes,
            state: Mutex::new(CoordState {
                snapshot: None,
                last_generated: None,
                in_flight: None,
                retained: Some(Retained::Writable(BytesMut::with_capacity(capacity))),
                capacity,
            }),
        }
    }

    /// Obtain the current snapshot, collecting a fresh one if the cached
    /// result has expired.
    ///
    /// Concurrent callers share one underlying collection: whichever caller
    /// arrives first drives it, everyone arriving before it finishes awaits
    /// the same result. Collection failures surface as empty snapshots,
    /// never as errors.
    pub async fn acquire(&self) -> Snapshot {
        let decision = {
            let mut st = self.lock_state();

            if let (Some(at), Some(snapshot)) = (st.last_generated, st.snapshot.as_ref()) {
                if !self.cache_window.is_zero() && at.elapsed() < self.cache_window {
                    // Cloning the view registers this reader before the
                    // bookkeeping lock is released.
                    return snapshot.cached();
                }
            }

            if let Some(tx) = st.in_flight.as_ref() {
                Decision::Join(tx.subscribe())
            } else {
                let (tx, _rx) = watch::channel(None);
                st.in_flight = Some(tx);
                st.last_generated = None;
                st.snapshot = None;
                Decision::Drive { retained: st.retained.take(), capacity: st.capacity }
            }
        };

        match decision {
            Decision::Join(mut rx) => {
                let _ = rx.changed().await;
                let result = rx.borrow().clone();
                result.unwrap_or_else(|| Snapshot::failure(Utc::now()))
            }
            Decision::Drive { retained, capacity } => self.drive(retained, capacity).await,
        }
    }

    async fn drive(&self, retained: Option<Retained>, capacity: usize) -> Snapshot {
        debug!("Driving a fresh metrics collection");
        let mut guard = DriveGuard { coordinator: self, retained, capacity, defused: false };

        // Drain: the previous snapshot's buffer can only be reused once
        // every reader has dropped its view.
        let writable = guard.reclaim().await;

        // No suspension points from here until publish.
        let outcome = self.collect_and_encode(writable, capacity);
        let snapshot = self.publish(outcome);
        guard.defused = true;
        snapshot
    }

    fn collect_and_encode(
        &self,
        buf: BytesMut,
        capacity: usize,
    ) -> Result<(Bytes, usize), (CollectError, BytesMut)> {
        let records = match self.pipeline.collect() {
            Ok(records) => records,
            Err(err) => return Err((CollectError::Pipeline(err), buf)),
        };
        if records.is_empty() {
            return Err((CollectError::EmptyBatch, buf));
        }

        let mut buf = ScrapeBuffer::new(buf, capacity);
        'pass: loop {
            buf.clear();
            for record in &records {
                match encoder::write_metric(&mut buf, record) {
                    Ok(()) => {}
                    Err(BufferFull) => {
                        // Growth restarts the whole batch from offset 0;
                        // there is no partial-write checkpoint to resume.
                        if let Err(err) = buf.grow(self.max_buffer_bytes) {
                            return Err((err, buf.into_inner()));
                        }
                        continue 'pass;
                    }
                }
            }
            break;
        }

        let capacity = buf.capacity();
        // The final blank-line separator is not part of the published view.
        buf.truncate(buf.len().saturating_sub(1));
        Ok((buf.freeze(), capacity))
    }

    fn publish(&self, outcome: Result<(Bytes, usize), (CollectError, BytesMut)>) -> Snapshot {
        let mut st = self.lock_state();
        let snapshot = match outcome {
            Ok((body, capacity)) => {
                let snapshot = Snapshot::fresh(body.clone(), Utc::now());
                st.capacity = capacity;
                st.retained = Some(Retained::Frozen(body));
                st.snapshot = Some(snapshot.clone());
                st.last_generated = Some(Instant::now());
                snapshot
            }
            Err((err, buf)) => {
                warn!(error = %err, "Metrics collection failed; serving empty snapshot");
                st.retained = Some(Retained::Writable(buf));
                Snapshot::failure(Utc::now())
            }
        };
        if let Some(tx) = st.in_flight.take() {
            let _ = tx.send(Some(snapshot.clone()));
        }
        snapshot
    }

    fn lock_state(&self) -> MutexGuard<'_, CoordState> {
        // Bookkeeping sections are short and never panic mid-update; a
        // poisoned lock still holds consistent state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps bookkeeping consistent if the driving future is dropped at the
/// drain suspension point: the buffer handle goes back, waiters resolve
/// with a failure snapshot instead of hanging.
struct DriveGuard<'a> {
    coordinator: &'a CollectionCoordinator,
    retained: Option<Retained>,
    capacity: usize,
    defused: bool,
}

impl DriveGuard<'_> {
    async fn reclaim(&mut self) -> BytesMut {
        let mut attempts: u32 = 0;
        loop {
            match self.retained.take() {
                None => return BytesMut::with_capacity(self.capacity),
                Some(Retained::Writable(buf)) => return buf,
                Some(Retained::Frozen(bytes)) => match bytes.try_into_mut() {
                    Ok(buf) => return buf,
                    Err(bytes) => {
                        self.retained = Some(Retained::Frozen(bytes));
                        attempts = attempts.saturating_add(1);
                        if attempts % DRAIN_WARN_EVERY == 0 {
                            // No drain timeout: a snapshot that is never
                            // dropped stalls all future collections.
                            warn!(
                                attempts,
                                "Previous snapshot still held; waiting for readers to release"
                            );
                        }
                        tokio::task::yield_now().await;
                    }
                },
            }
        }
    }
}

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        if self.defused {
            return;
        }
        let mut st = self.coordinator.lock_state();
        if let Some(retained) = self.retained.take() {
            st.retained = Some(retained);
        }
        if let Some(tx) = st.in_flight.take() {
            let _ = tx.send(Some(Snapshot::failure(Utc::now())));
        }
    }
}
