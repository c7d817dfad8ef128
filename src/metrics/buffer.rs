use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::Sample;

// ─── Thread-local side ───────────────────────────────────────────

/// One thread's pending samples. Only the owning thread pushes; the
/// reporting thread takes the contents once per cycle.
type Bucket = Mutex<Vec<Sample>>;

/// Source of unique ids so several `SampleBuffers` can share a thread.
static NEXT_BUFFERS_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Buckets owned by this thread, keyed by `SampleBuffers::id`.
    /// Almost always holds a single entry.
    static LOCAL_BUCKETS: RefCell<Vec<(u64, Arc<Bucket>)>> = const { RefCell::new(Vec::new()) };
}

// ─── Public types ────────────────────────────────────────────────

/// Per-thread sample buffers drained by the reporting thread.
///
/// Workers call `record()` from anywhere (including deep inside a model's
/// forward pass); the reporting cycle calls `drain_all()`.
pub struct SampleBuffers {
    id: u64,
    /// Every bucket ever handed out, in creation order.
    /// The lock only guards insert/iterate of this list.
    buckets: Mutex<Vec<Arc<Bucket>>>,
    /// Set once the first dropped sample has been reported.
    warned: AtomicBool,
    dropped: AtomicU64,
}

impl SampleBuffers {
    pub fn new() -> Self {
        Self {
            id: NEXT_BUFFERS_ID.fetch_add(1, Ordering::Relaxed),
            buckets: Mutex::new(Vec::new()),
            warned: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a sample to the calling thread's bucket. Never panics; if the
    /// sample cannot be stored it is dropped.
    pub fn record(&self, sample: Sample) {
        let stored = LOCAL_BUCKETS
            .try_with(|local| {
                // Re-entrant use (e.g. from a Drop impl) lands here
                let Ok(mut local) = local.try_borrow_mut() else {
                    return false;
                };
                let bucket = match local.iter().position(|(id, _)| *id == self.id) {
                    Some(idx) => &local[idx].1,
                    None => {
                        // Forget buckets whose SampleBuffers is gone
                        local.retain(|(_, b)| Arc::strong_count(b) > 1);
                        let bucket = Arc::new(Mutex::new(Vec::new()));
                        self.buckets.lock().push(Arc::clone(&bucket));
                        local.push((self.id, bucket));
                        &local[local.len() - 1].1
                    }
                };

                let mut samples = bucket.lock();
                if samples.try_reserve(1).is_err() {
                    return false;
                }
                samples.push(sample);
                true
            })
            // Thread-local already torn down (thread exiting)
            .unwrap_or(false);

        if !stored {
            self.note_dropped();
        }
    }

    /// Take every thread's pending samples, leaving each bucket empty but
    /// allocated. Buckets are visited in creation order and each keeps its
    /// thread's recording order.
    pub fn drain_all(&self) -> Vec<Sample> {
        let mut buckets = self.buckets.lock();

        let mut drained = Vec::new();
        for bucket in buckets.iter() {
            drained.append(&mut bucket.lock());
        }

        // A bucket only we still reference belongs to an exited thread, but
        // that thread may have pushed once more after the loop above took its
        // samples. Such a bucket is kept for the next drain.
        buckets.retain(|b| Arc::strong_count(b) > 1 || !b.lock().is_empty());

        drained
    }

    /// Number of live per-thread buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Samples dropped because they could not be stored.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn note_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!("metric sample dropped: thread-local buffer unavailable");
        }
    }
}

impl Default for SampleBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of buckets the current thread holds across all `SampleBuffers`.
/// Does not allocate.
pub fn local_bucket_count() -> usize {
    LOCAL_BUCKETS
        .try_with(|local| local.try_borrow().map(|l| l.len()).unwrap_or(0))
        .unwrap_or(0)
}
