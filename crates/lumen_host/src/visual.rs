//! Visual wrapper over a native toolkit object
//!
//! A [`Visual`] forwards each operation through the class vtable, checking
//! the status after every call. Once disposed, every operation fails with
//! [`LumenError::Disposed`] instead of touching freed native memory. Each
//! forwarded call holds the handle's state lock, so a dispose racing a
//! call waits for it to return instead of freeing the object mid-call.

use crate::error::{LumenError, Result};
use crate::ffi::{CloneFn, FfiStatus, FfiVec2, FfiVisualVTable};
use crate::handle::NativeHandle;
use crate::object::NativeObject;
use crate::properties::{decode_map, encode_map, PropertyMap};
use std::ffi::{c_char, CStr, CString};

/// A live visual backed by a native toolkit object
pub struct Visual {
    /// Class name
    class_name: String,
    /// Handle to the native object
    handle: NativeHandle,
    /// Cached vtable pointer
    vtable: *const FfiVisualVTable,
    /// Copy constructor, if the class exports one
    clone_fn: Option<CloneFn>,
}

// Safety: the native object is managed by the library which is Send + Sync;
// the vtable pointer refers to static data inside the loaded library.
unsafe impl Send for Visual {}
unsafe impl Sync for Visual {}

impl Visual {
    pub(crate) fn new(
        class_name: String,
        handle: NativeHandle,
        vtable: *const FfiVisualVTable,
        clone_fn: Option<CloneFn>,
    ) -> Self {
        Self {
            class_name,
            handle,
            vtable,
            clone_fn,
        }
    }

    /// Get the class name
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    fn vtable(&self) -> &FfiVisualVTable {
        unsafe { &*self.vtable }
    }

    fn check(&self, status: FfiStatus) -> Result<()> {
        if status.is_ok() {
            Ok(())
        } else {
            Err(match self.handle.library() {
                Some(lib) => lib.status_error(status),
                None => LumenError::native(status.code(), "native call failed"),
            })
        }
    }

    /// Set the visual's name
    pub fn set_name(&self, name: &str) -> Result<()> {
        let set_name = self
            .vtable()
            .set_name
            .ok_or(LumenError::Unsupported("set_name"))?;

        let name_c = CString::new(name)
            .map_err(|_| LumenError::InvalidState("Name contains interior NUL".into()))?;
        let status = self.handle.with_raw(|raw| set_name(raw, name_c.as_ptr()))?;
        self.check(status)
    }

    /// Get the visual's name
    pub fn name(&self) -> Result<String> {
        let get_name = self
            .vtable()
            .get_name
            .ok_or(LumenError::Unsupported("get_name"))?;

        self.handle.with_raw(|raw| {
            let mut out: *const c_char = std::ptr::null();
            self.check(get_name(raw, &mut out))?;

            if out.is_null() {
                return Ok(String::new());
            }
            // The native string lives only as long as the object; copy it
            // while the handle still pins the object alive.
            Ok(unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned())
        })?
    }

    /// Apply a transform map and the hosting control's size
    pub fn set_transform_and_size(&self, transform: &PropertyMap, control_size: FfiVec2) -> Result<()> {
        let set_transform = self
            .vtable()
            .set_transform_and_size
            .ok_or(LumenError::Unsupported("set_transform_and_size"))?;

        let encoded = encode_map(transform)?;
        let status = self
            .handle
            .with_raw(|raw| set_transform(raw, encoded.as_ptr(), encoded.len(), control_size))?;
        self.check(status)
    }

    /// Height the visual wants for the given width
    pub fn height_for_width(&self, width: f32) -> Result<f32> {
        let height_for_width = self
            .vtable()
            .height_for_width
            .ok_or(LumenError::Unsupported("height_for_width"))?;

        let mut out = 0.0f32;
        let status = self.handle.with_raw(|raw| height_for_width(raw, width, &mut out))?;
        self.check(status)?;
        Ok(out)
    }

    /// Width the visual wants for the given height
    pub fn width_for_height(&self, height: f32) -> Result<f32> {
        let width_for_height = self
            .vtable()
            .width_for_height
            .ok_or(LumenError::Unsupported("width_for_height"))?;

        let mut out = 0.0f32;
        let status = self.handle.with_raw(|raw| width_for_height(raw, height, &mut out))?;
        self.check(status)?;
        Ok(out)
    }

    /// The visual's preferred size
    pub fn natural_size(&self) -> Result<FfiVec2> {
        let natural_size = self
            .vtable()
            .natural_size
            .ok_or(LumenError::Unsupported("natural_size"))?;

        let mut out = FfiVec2::ZERO;
        let status = self.handle.with_raw(|raw| natural_size(raw, &mut out))?;
        self.check(status)?;
        Ok(out)
    }

    /// Set the visual's depth index
    pub fn set_depth_index(&self, index: f32) -> Result<()> {
        let set_depth_index = self
            .vtable()
            .set_depth_index
            .ok_or(LumenError::Unsupported("set_depth_index"))?;

        let status = self.handle.with_raw(|raw| set_depth_index(raw, index))?;
        self.check(status)
    }

    /// Get the visual's depth index
    pub fn depth_index(&self) -> Result<f32> {
        let get_depth_index = self
            .vtable()
            .get_depth_index
            .ok_or(LumenError::Unsupported("depth_index"))?;

        let mut out = 0.0f32;
        let status = self.handle.with_raw(|raw| get_depth_index(raw, &mut out))?;
        self.check(status)?;
        Ok(out)
    }

    /// Snapshot the visual's full property map
    pub fn create_property_map(&self) -> Result<PropertyMap> {
        let vtable = self.vtable();

        let (map_size, fill) = match (vtable.property_map_size, vtable.create_property_map) {
            (Some(s), Some(f)) => (s, f),
            _ => return Err(LumenError::Unsupported("create_property_map")),
        };

        // Size query and fill must see the same live object.
        self.handle.with_raw(|raw| {
            let size = map_size(raw);
            if size == 0 {
                return Ok(PropertyMap::new());
            }

            let mut buffer = vec![0u8; size];
            let written = fill(raw, buffer.as_mut_ptr(), buffer.len());
            buffer.truncate(written);

            Ok(decode_map(&buffer)?)
        })?
    }

    /// Create a new visual from this one through the class's copy
    /// constructor.
    pub fn try_clone(&self) -> Result<Visual> {
        let clone_fn = self.clone_fn.ok_or(LumenError::Unsupported("clone"))?;

        let new_raw = self.handle.with_raw(|raw| clone_fn(raw))?;
        if new_raw.is_null() {
            return Err(LumenError::creation_failed(
                self.class_name.as_str(),
                "Copy constructor returned null",
            ));
        }

        Ok(Visual {
            class_name: self.class_name.clone(),
            handle: self.handle.sibling(new_raw, true),
            vtable: self.vtable,
            clone_fn: self.clone_fn,
        })
    }
}

impl NativeObject for Visual {
    fn native_handle(&self) -> &NativeHandle {
        &self.handle
    }
}

impl std::fmt::Debug for Visual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visual")
            .field("class_name", &self.class_name)
            .field("handle", &self.handle)
            .finish()
    }
}
