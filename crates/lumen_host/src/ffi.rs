//! FFI types and function signatures for the native toolkit boundary
//!
//! This module defines the C ABI types used to communicate between the
//! Rust host and the Lumen toolkit. All types use `#[repr(C)]` for ABI
//! compatibility.
//!
//! The toolkit reports failures as per-call status values rather than
//! through a process-wide pending-error slot: every fallible entry point
//! returns an [`FfiStatus`], and the detail message for the most recent
//! failure is fetched through the `lumen_last_error` symbol.

use std::ffi::{c_char, c_void};

/// API version for compatibility checking
pub const LUMEN_API_VERSION: u32 = 1;

/// Opaque handle to a native toolkit object
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    /// Pointer to the native object
    pub ptr: *mut c_void,
}

impl RawHandle {
    /// Create a null handle
    pub const fn null() -> Self {
        Self { ptr: std::ptr::null_mut() }
    }

    /// Check if handle is null
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }
}

unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

/// Status code returned by every fallible native call
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FfiStatus(pub i32);

impl FfiStatus {
    /// Success
    pub const OK: Self = Self(0);

    /// Check if the call succeeded
    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }

    /// Raw status code
    pub fn code(&self) -> i32 {
        self.0
    }
}

/// Vector2 for FFI (sizes, positions)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FfiVec2 {
    pub x: f32,
    pub y: f32,
}

impl FfiVec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Constructor function for a visual class
pub type CreateFn = extern "C" fn() -> RawHandle;
/// Destructor function for a visual class
pub type DestroyFn = extern "C" fn(RawHandle) -> FfiStatus;
/// Copy-constructor function for a visual class
pub type CloneFn = extern "C" fn(RawHandle) -> RawHandle;

/// Class metadata exported by the toolkit
#[repr(C)]
pub struct FfiClassInfo {
    /// Class name (null-terminated)
    pub name: *const c_char,
    /// API version the class was built with
    pub api_version: u32,
    /// Constructor function
    pub create_fn: Option<CreateFn>,
    /// Destructor function
    pub destroy_fn: Option<DestroyFn>,
    /// Copy-constructor function
    pub clone_fn: Option<CloneFn>,
}

/// Function pointer types for visual methods
pub type SetNameFn = extern "C" fn(RawHandle, *const c_char) -> FfiStatus;
pub type GetNameFn = extern "C" fn(RawHandle, *mut *const c_char) -> FfiStatus;
pub type SetTransformAndSizeFn = extern "C" fn(RawHandle, *const u8, usize, FfiVec2) -> FfiStatus;
pub type HeightForWidthFn = extern "C" fn(RawHandle, f32, *mut f32) -> FfiStatus;
pub type WidthForHeightFn = extern "C" fn(RawHandle, f32, *mut f32) -> FfiStatus;
pub type NaturalSizeFn = extern "C" fn(RawHandle, *mut FfiVec2) -> FfiStatus;
pub type SetDepthIndexFn = extern "C" fn(RawHandle, f32) -> FfiStatus;
pub type GetDepthIndexFn = extern "C" fn(RawHandle, *mut f32) -> FfiStatus;
/// Returns the encoded size of the visual's property map
pub type PropertyMapSizeFn = extern "C" fn(RawHandle) -> usize;
/// Fills the buffer with the encoded property map, returns bytes written
pub type CreatePropertyMapFn = extern "C" fn(RawHandle, *mut u8, usize) -> usize;

/// Virtual table for visual methods
#[repr(C)]
pub struct FfiVisualVTable {
    pub set_name: Option<SetNameFn>,
    pub get_name: Option<GetNameFn>,
    pub set_transform_and_size: Option<SetTransformAndSizeFn>,
    pub height_for_width: Option<HeightForWidthFn>,
    pub width_for_height: Option<WidthForHeightFn>,
    pub natural_size: Option<NaturalSizeFn>,
    pub set_depth_index: Option<SetDepthIndexFn>,
    pub get_depth_index: Option<GetDepthIndexFn>,

    // Property map transfer
    pub property_map_size: Option<PropertyMapSizeFn>,
    pub create_property_map: Option<CreatePropertyMapFn>,
}

impl Default for FfiVisualVTable {
    fn default() -> Self {
        Self {
            set_name: None,
            get_name: None,
            set_transform_and_size: None,
            height_for_width: None,
            width_for_height: None,
            natural_size: None,
            set_depth_index: None,
            get_depth_index: None,
            property_map_size: None,
            create_property_map: None,
        }
    }
}

/// Library info returned by lumen_library_info
#[repr(C)]
pub struct FfiLibraryInfo {
    /// API version
    pub api_version: u32,
    /// Number of visual classes in the library
    pub class_count: u32,
    /// Library name (null-terminated)
    pub name: *const c_char,
    /// Library version string (null-terminated)
    pub version: *const c_char,
}

/// Type alias for the library info function
pub type LibraryInfoFn = extern "C" fn() -> FfiLibraryInfo;

/// Type alias for getting class info by index
pub type ClassInfoFn = extern "C" fn(u32) -> *const FfiClassInfo;

/// Type alias for getting the visual vtable of a class
pub type VisualVTableFn = extern "C" fn(*const c_char) -> *const FfiVisualVTable;

/// Type alias for fetching the most recent failure message
pub type LastErrorFn = extern "C" fn() -> *const c_char;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_is_inert() {
        let handle = RawHandle::null();
        assert!(handle.is_null());

        let other = RawHandle { ptr: 0x10 as *mut c_void };
        assert!(!other.is_null());
    }

    #[test]
    fn status_codes() {
        assert!(FfiStatus::OK.is_ok());
        assert!(!FfiStatus(3).is_ok());
        assert_eq!(FfiStatus(3).code(), 3);
    }
}
