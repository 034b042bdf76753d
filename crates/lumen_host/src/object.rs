//! Polymorphic root for native wrapper types

use crate::error::Result;
use crate::handle::NativeHandle;

/// Implemented by every wrapper over a native toolkit object.
///
/// Provides the shared disposal surface: a wrapper is disposed by nulling
/// its handle, after which all operations on it fail rather than touching
/// freed native memory.
pub trait NativeObject {
    /// The handle owning the native allocation.
    fn native_handle(&self) -> &NativeHandle;

    /// Release the native object. Idempotent; see [`NativeHandle::dispose`].
    fn dispose(&self) -> Result<()> {
        self.native_handle().dispose()
    }

    /// Check if the native object has been released.
    fn is_disposed(&self) -> bool {
        self.native_handle().is_disposed()
    }
}
