//! Deferred release of native handles
//!
//! Handles may be dropped from threads that must not call into the native
//! toolkit, or while the stage is not installed at all. In both cases the
//! release is queued here and performed later on the stage thread, once per
//! render/update tick.

use crate::error::{LumenError, Result};
use crate::ffi::{DestroyFn, FfiStatus, RawHandle};
use crate::library::ToolkitLibrary;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A native destructor call that has been detached from its handle.
///
/// Holding the library `Arc` keeps the destructor code mapped until the
/// release actually runs.
pub struct PendingRelease {
    raw: RawHandle,
    destroy: Option<DestroyFn>,
    library: Option<Arc<ToolkitLibrary>>,
}

impl PendingRelease {
    pub fn new(
        raw: RawHandle,
        destroy: Option<DestroyFn>,
        library: Option<Arc<ToolkitLibrary>>,
    ) -> Self {
        Self { raw, destroy, library }
    }

    /// Invoke the native destructor.
    fn release(self) -> Result<()> {
        if self.raw.is_null() {
            return Ok(());
        }
        let Some(destroy) = self.destroy else {
            return Ok(());
        };
        let status = destroy(self.raw);
        if status.is_ok() {
            Ok(())
        } else {
            Err(self.status_error(status))
        }
    }

    fn status_error(&self, status: FfiStatus) -> LumenError {
        match &self.library {
            Some(lib) => lib.status_error(status),
            None => LumenError::native(status.code(), "native destructor reported failure"),
        }
    }
}

impl std::fmt::Debug for PendingRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRelease")
            .field("raw", &self.raw)
            .finish()
    }
}

/// Queue of native releases awaiting a safe drain point.
///
/// `add` is callable from any thread at any time, including during
/// shutdown. `drain` runs on the stage thread and releases entries in
/// enqueue order.
pub struct DisposeQueue {
    /// Releases pending execution
    queue: Mutex<VecDeque<PendingRelease>>,
    /// Fast check for pending items (avoids lock acquisition on hot path)
    pending: AtomicU64,
    /// Drain in progress; concurrent drains return without work
    draining: AtomicBool,
}

impl Default for DisposeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DisposeQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(8)),
            pending: AtomicU64::new(0),
            draining: AtomicBool::new(false),
        }
    }

    /// Queue a release for deferred execution.
    pub fn add(&self, release: PendingRelease) {
        {
            // Counter and queue move together; drain decrements under the
            // same lock.
            let mut queue = self.queue.lock();
            queue.push_back(release);
            self.pending.fetch_add(1, Ordering::Release);
        }

        log::trace!("Deferred native release (pending: {})", self.len());
    }

    /// Check if there are pending releases.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    /// Get the number of pending releases.
    #[inline]
    pub fn len(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Execute all pending releases in enqueue order and clear the queue.
    ///
    /// Must only run on the thread that owns the native rendering context.
    /// Not re-entrant: a drain started while another is in progress returns
    /// 0 immediately. Entries added concurrently are left for the next
    /// cycle. A release that fails is logged and dropped; the drain
    /// continues with the remaining entries.
    ///
    /// Returns the number of entries processed.
    pub fn drain(&self) -> usize {
        if !self.has_pending() {
            return 0;
        }

        if self.draining.swap(true, Ordering::Acquire) {
            return 0;
        }

        let taken: VecDeque<PendingRelease> = {
            let mut queue = self.queue.lock();
            let taken = std::mem::take(&mut *queue);
            self.pending.fetch_sub(taken.len() as u64, Ordering::Release);
            taken
        };

        let count = taken.len();

        for entry in taken {
            if let Err(e) = entry.release() {
                log::error!("Deferred native release failed: {}", e);
            }
        }

        self.draining.store(false, Ordering::Release);

        if count > 0 {
            log::trace!("Processed {} deferred release(s)", count);
        }
        count
    }
}

impl std::fmt::Debug for DisposeQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposeQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;
    use std::sync::OnceLock;

    fn fake_raw(id: usize) -> RawHandle {
        RawHandle { ptr: id as *mut c_void }
    }

    #[test]
    fn new_queue_is_empty() {
        let queue = DisposeQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(!queue.has_pending());
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn drain_preserves_enqueue_order() {
        static ORDER: Mutex<Vec<usize>> = Mutex::new(Vec::new());

        extern "C" fn record(raw: RawHandle) -> FfiStatus {
            ORDER.lock().push(raw.ptr as usize);
            FfiStatus::OK
        }

        let queue = DisposeQueue::new();
        for id in [1usize, 2, 3] {
            queue.add(PendingRelease::new(fake_raw(id), Some(record), None));
        }

        assert_eq!(queue.drain(), 3);
        assert!(queue.is_empty());
        assert_eq!(*ORDER.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        static RELEASED: AtomicU64 = AtomicU64::new(0);

        extern "C" fn count(_raw: RawHandle) -> FfiStatus {
            RELEASED.fetch_add(1, Ordering::SeqCst);
            FfiStatus::OK
        }

        let queue = Arc::new(DisposeQueue::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    queue.add(PendingRelease::new(fake_raw(i + 1), Some(count), None));
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(queue.len(), 8);
        assert_eq!(queue.drain(), 8);
        assert_eq!(RELEASED.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn pending_count_stays_consistent_under_concurrent_add_and_drain() {
        static RELEASED: AtomicU64 = AtomicU64::new(0);

        extern "C" fn count(_raw: RawHandle) -> FfiStatus {
            RELEASED.fetch_add(1, Ordering::SeqCst);
            FfiStatus::OK
        }

        const THREADS: usize = 4;
        const PER_THREAD: usize = 64;
        const TOTAL: u64 = (THREADS * PER_THREAD) as u64;

        let queue = Arc::new(DisposeQueue::new());
        let adders: Vec<_> = (0..THREADS)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        queue.add(PendingRelease::new(
                            fake_raw(t * PER_THREAD + i + 1),
                            Some(count),
                            None,
                        ));
                    }
                })
            })
            .collect();

        // Drain concurrently with the adders. A counter that ever runs
        // ahead of the queue would wrap below zero and show up here as an
        // absurd length.
        let stop = Arc::new(AtomicBool::new(false));
        let drainer = {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    queue.drain();
                    let len = queue.len();
                    assert!(len <= TOTAL, "pending count corrupted: {}", len);
                }
            })
        };

        for t in adders {
            t.join().unwrap();
        }
        stop.store(true, Ordering::SeqCst);
        drainer.join().unwrap();

        queue.drain();
        assert_eq!(queue.len(), 0);
        assert_eq!(RELEASED.load(Ordering::SeqCst), TOTAL);
    }

    #[test]
    fn drain_is_not_reentrant() {
        static QUEUE: OnceLock<Arc<DisposeQueue>> = OnceLock::new();
        static INNER: AtomicU64 = AtomicU64::new(u64::MAX);
        static LATE: AtomicU64 = AtomicU64::new(0);

        extern "C" fn late(_raw: RawHandle) -> FfiStatus {
            LATE.fetch_add(1, Ordering::SeqCst);
            FfiStatus::OK
        }

        extern "C" fn reenter(_raw: RawHandle) -> FfiStatus {
            let queue = QUEUE.get().unwrap();
            // Keep the queue non-empty so the nested drain runs into the
            // guard rather than the empty fast path.
            queue.add(PendingRelease::new(fake_raw(9), Some(late), None));
            INNER.store(queue.drain() as u64, Ordering::SeqCst);
            FfiStatus::OK
        }

        let queue = QUEUE.get_or_init(|| Arc::new(DisposeQueue::new()));
        queue.add(PendingRelease::new(fake_raw(1), Some(reenter), None));

        assert_eq!(queue.drain(), 1);
        // The drain attempted from inside a release saw the guard and did
        // no work.
        assert_eq!(INNER.load(Ordering::SeqCst), 0);
        // The entry added mid-drain waited for the next cycle.
        assert_eq!(LATE.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(), 1);
        assert_eq!(LATE.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_release_does_not_stop_the_drain() {
        static RELEASED: Mutex<Vec<usize>> = Mutex::new(Vec::new());

        extern "C" fn fail(_raw: RawHandle) -> FfiStatus {
            FfiStatus(7)
        }

        extern "C" fn record(raw: RawHandle) -> FfiStatus {
            RELEASED.lock().push(raw.ptr as usize);
            FfiStatus::OK
        }

        let queue = DisposeQueue::new();
        queue.add(PendingRelease::new(fake_raw(1), Some(fail), None));
        queue.add(PendingRelease::new(fake_raw(2), Some(record), None));

        assert_eq!(queue.drain(), 2);
        assert_eq!(*RELEASED.lock(), vec![2]);
    }
}
