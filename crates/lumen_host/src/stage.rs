//! Stage lifecycle and the per-tick disposal drain
//!
//! The stage models the native rendering/window context. Native destructors
//! may only run while the stage is installed, and only on the thread that
//! installed it, so all deferred releases funnel through the stage's
//! [`DisposeQueue`] and are drained once per render/update tick.

use crate::dispose_queue::DisposeQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;

/// The native rendering context lifecycle, plus the queue of deferred
/// releases tied to it.
pub struct Stage {
    /// Whether the native rendering context is up
    installed: AtomicBool,
    /// Thread that installed the stage; native destructors run here
    stage_thread: Mutex<Option<ThreadId>>,
    /// Releases awaiting a safe drain point
    disposals: DisposeQueue,
}

impl Stage {
    /// Create a new, uninstalled stage.
    pub fn new() -> Self {
        Self {
            installed: AtomicBool::new(false),
            stage_thread: Mutex::new(None),
            disposals: DisposeQueue::new(),
        }
    }

    /// The process-wide stage.
    pub fn global() -> &'static Arc<Stage> {
        static GLOBAL: OnceLock<Arc<Stage>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Stage::new()))
    }

    /// Mark the native rendering context as up. The calling thread becomes
    /// the stage thread.
    pub fn install(&self) {
        *self.stage_thread.lock() = Some(std::thread::current().id());
        self.installed.store(true, Ordering::Release);
        log::info!("Stage installed");
    }

    /// Mark the native rendering context as torn down. Pending releases
    /// stay queued until the stage is installed again.
    pub fn uninstall(&self) {
        self.installed.store(false, Ordering::Release);
        *self.stage_thread.lock() = None;
        log::info!("Stage uninstalled ({} release(s) pending)", self.disposals.len());
    }

    /// Check if the native rendering context is up.
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// The deferred-release queue owned by this stage.
    pub fn disposals(&self) -> &DisposeQueue {
        &self.disposals
    }

    /// Drain the deferred-release queue. Call once per render/update tick,
    /// on the stage thread.
    ///
    /// A no-op while the stage is not installed: entries stay queued until
    /// it is safe to call into the native layer. Returns the number of
    /// releases processed.
    pub fn process_disposals(&self) -> usize {
        if !self.is_installed() {
            if self.disposals.has_pending() {
                log::trace!(
                    "Stage not installed; {} release(s) left queued",
                    self.disposals.len()
                );
            }
            return 0;
        }

        #[cfg(debug_assertions)]
        {
            if let Some(owner) = *self.stage_thread.lock() {
                debug_assert_eq!(
                    std::thread::current().id(),
                    owner,
                    "disposals must be processed on the stage thread"
                );
            }
        }

        self.disposals.drain()
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}
