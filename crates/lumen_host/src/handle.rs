//! Native object handle with explicit disposal
//!
//! A [`NativeHandle`] wraps one native allocation: an opaque address plus an
//! ownership flag. Disposal nulls the handle exactly once and invokes the
//! native destructor at most once, from whichever context is safe:
//! synchronously when the stage is installed, or deferred through the
//! stage's dispose queue otherwise.

use crate::dispose_queue::PendingRelease;
use crate::error::{LumenError, Result};
use crate::ffi::{DestroyFn, RawHandle};
use crate::library::ToolkitLibrary;
use crate::stage::Stage;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Clone, Copy)]
struct HandleState {
    raw: RawHandle,
    owns: bool,
}

/// Owning (or adopted) reference to a native toolkit object.
pub struct NativeHandle {
    /// Guarded so exactly one disposal path wins under concurrent calls
    state: Mutex<HandleState>,
    /// Destructor for the wrapped class
    destroy: Option<DestroyFn>,
    /// Stage whose lifecycle gates native destructor calls
    stage: Arc<Stage>,
    /// Keeps the toolkit library mapped while the object is alive
    library: Option<Arc<ToolkitLibrary>>,
}

impl NativeHandle {
    /// Wrap a pre-existing native address without allocating.
    ///
    /// With `owns = true` the handle releases the object on disposal; with
    /// `owns = false` disposal only nulls the handle.
    pub fn adopt(
        raw: RawHandle,
        owns: bool,
        destroy: Option<DestroyFn>,
        stage: Arc<Stage>,
    ) -> Self {
        Self {
            state: Mutex::new(HandleState { raw, owns }),
            destroy,
            stage,
            library: None,
        }
    }

    /// Wrap an address produced by a toolkit factory, keeping the library
    /// loaded for as long as the object lives.
    pub(crate) fn from_library(
        raw: RawHandle,
        owns: bool,
        destroy: Option<DestroyFn>,
        stage: Arc<Stage>,
        library: Arc<ToolkitLibrary>,
    ) -> Self {
        Self {
            state: Mutex::new(HandleState { raw, owns }),
            destroy,
            stage,
            library: Some(library),
        }
    }

    /// A new handle over a different address, sharing this handle's
    /// destructor, stage, and library.
    pub(crate) fn sibling(&self, raw: RawHandle, owns: bool) -> Self {
        Self {
            state: Mutex::new(HandleState { raw, owns }),
            destroy: self.destroy,
            stage: Arc::clone(&self.stage),
            library: self.library.clone(),
        }
    }

    /// The wrapped address, or `None` once disposed.
    ///
    /// The snapshot can go stale as soon as it is returned; to call into
    /// the native object use [`NativeHandle::with_raw`], which keeps the
    /// object alive for the duration of the call.
    pub fn raw(&self) -> Option<RawHandle> {
        let state = self.state.lock();
        if state.raw.is_null() {
            None
        } else {
            Some(state.raw)
        }
    }

    /// Run `f` against the wrapped address, or fail with
    /// [`LumenError::Disposed`] once the handle is nulled.
    ///
    /// The state lock is held for the duration of the call, so a
    /// concurrent `dispose` cannot free the object while `f` is still
    /// using it. `f` must not touch this handle again or it will
    /// deadlock.
    pub fn with_raw<T>(&self, f: impl FnOnce(RawHandle) -> T) -> Result<T> {
        let state = self.state.lock();
        if state.raw.is_null() {
            return Err(LumenError::Disposed);
        }
        Ok(f(state.raw))
    }

    /// Check if the handle has been nulled.
    pub fn is_disposed(&self) -> bool {
        self.state.lock().raw.is_null()
    }

    /// Whether this handle owns the native object.
    pub fn owns(&self) -> bool {
        let state = self.state.lock();
        !state.raw.is_null() && state.owns
    }

    pub(crate) fn library(&self) -> Option<&Arc<ToolkitLibrary>> {
        self.library.as_ref()
    }

    /// Release the native object.
    ///
    /// Nulls the handle exactly once; a second call is a no-op. If the
    /// handle owns its object, the native destructor runs synchronously
    /// while the stage is installed, and is queued on the stage's dispose
    /// queue otherwise. Once nulled, the `Drop` finalizer path does
    /// nothing.
    pub fn dispose(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.raw.is_null() {
            return Ok(());
        }

        let raw = state.raw;
        let owns = state.owns;
        state.raw = RawHandle::null();
        state.owns = false;
        drop(state);

        if !owns {
            return Ok(());
        }

        if !self.stage.is_installed() {
            log::trace!("Stage not installed; deferring release of {:p}", raw.ptr);
            self.stage
                .disposals()
                .add(PendingRelease::new(raw, self.destroy, self.library.clone()));
            return Ok(());
        }

        if let Some(destroy) = self.destroy {
            let status = destroy(raw);
            if !status.is_ok() {
                return Err(match &self.library {
                    Some(lib) => lib.status_error(status),
                    None => LumenError::native(status.code(), "native destructor reported failure"),
                });
            }
        }
        Ok(())
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if state.raw.is_null() || !state.owns {
            return;
        }

        // Drop may run on any thread at any time, so never call the native
        // destructor here; hand the release to the stage thread instead.
        log::trace!("Deferring release of un-disposed handle {:p}", state.raw.ptr);
        self.stage
            .disposals()
            .add(PendingRelease::new(state.raw, self.destroy, self.library.take()));
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NativeHandle")
            .field("raw", &state.raw)
            .field("owns", &state.owns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::FfiStatus;
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn fake_raw(id: usize) -> RawHandle {
        RawHandle { ptr: id as *mut c_void }
    }

    fn installed_stage() -> Arc<Stage> {
        let stage = Arc::new(Stage::new());
        stage.install();
        stage
    }

    #[test]
    fn dispose_is_idempotent() {
        static DESTROYED: AtomicU64 = AtomicU64::new(0);

        extern "C" fn count(_raw: RawHandle) -> FfiStatus {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
            FfiStatus::OK
        }

        let handle = NativeHandle::adopt(fake_raw(1), true, Some(count), installed_stage());
        assert!(!handle.is_disposed());

        handle.dispose().unwrap();
        assert!(handle.is_disposed());
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);

        // Second call is a no-op.
        handle.dispose().unwrap();
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_owning_handle_never_destroys() {
        static DESTROYED: AtomicU64 = AtomicU64::new(0);

        extern "C" fn count(_raw: RawHandle) -> FfiStatus {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
            FfiStatus::OK
        }

        let stage = installed_stage();
        let handle = NativeHandle::adopt(fake_raw(1), false, Some(count), Arc::clone(&stage));
        handle.dispose().unwrap();
        assert!(handle.is_disposed());

        drop(handle);
        assert_eq!(stage.process_disposals(), 0);
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispose_defers_while_stage_uninstalled() {
        static DESTROYED: AtomicU64 = AtomicU64::new(0);

        extern "C" fn count(_raw: RawHandle) -> FfiStatus {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
            FfiStatus::OK
        }

        let stage = Arc::new(Stage::new());
        let handle = NativeHandle::adopt(fake_raw(1), true, Some(count), Arc::clone(&stage));

        handle.dispose().unwrap();
        assert!(handle.is_disposed());
        // Nothing released yet, the entry is queued.
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 0);
        assert_eq!(stage.disposals().len(), 1);

        stage.install();
        assert_eq!(stage.process_disposals(), 1);
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_handle_is_released_exactly_once_by_the_drain() {
        static DESTROYED: AtomicU64 = AtomicU64::new(0);

        extern "C" fn count(_raw: RawHandle) -> FfiStatus {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
            FfiStatus::OK
        }

        let stage = installed_stage();
        let handle = NativeHandle::adopt(fake_raw(1), true, Some(count), Arc::clone(&stage));

        drop(handle);
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 0);
        assert_eq!(stage.process_disposals(), 1);
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);

        // Nothing left for subsequent ticks.
        assert_eq!(stage.process_disposals(), 0);
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposed_handle_does_not_enqueue_on_drop() {
        extern "C" fn noop(_raw: RawHandle) -> FfiStatus {
            FfiStatus::OK
        }

        let stage = installed_stage();
        let handle = NativeHandle::adopt(fake_raw(1), true, Some(noop), Arc::clone(&stage));
        handle.dispose().unwrap();

        drop(handle);
        assert!(stage.disposals().is_empty());
    }

    #[test]
    fn with_raw_rejects_disposed_handles() {
        extern "C" fn noop(_raw: RawHandle) -> FfiStatus {
            FfiStatus::OK
        }

        let handle = NativeHandle::adopt(fake_raw(7), true, Some(noop), installed_stage());
        assert_eq!(handle.with_raw(|raw| raw.ptr as usize).unwrap(), 7);

        handle.dispose().unwrap();
        assert!(matches!(
            handle.with_raw(|_| ()).unwrap_err(),
            LumenError::Disposed
        ));
    }

    #[test]
    fn concurrent_dispose_runs_destructor_once() {
        static DESTROYED: AtomicU64 = AtomicU64::new(0);

        extern "C" fn count(_raw: RawHandle) -> FfiStatus {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
            FfiStatus::OK
        }

        let handle = Arc::new(NativeHandle::adopt(
            fake_raw(1),
            true,
            Some(count),
            installed_stage(),
        ));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.dispose().unwrap())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_destructor_surfaces_and_still_nulls() {
        extern "C" fn fail(_raw: RawHandle) -> FfiStatus {
            FfiStatus(5)
        }

        let handle = NativeHandle::adopt(fake_raw(1), true, Some(fail), installed_stage());
        let err = handle.dispose().unwrap_err();
        assert!(matches!(err, LumenError::Native { code: 5, .. }));

        // The handle is never reused after nulling, even on failure.
        assert!(handle.is_disposed());
        handle.dispose().unwrap();
    }
}
