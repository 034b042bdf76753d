//! Dynamic loading of the native toolkit
//!
//! Handles loading the toolkit shared library, symbol resolution, class
//! enumeration, and creation of wrapped visuals.

use crate::error::{LumenError, Result};
use crate::ffi::*;
use crate::handle::NativeHandle;
use crate::stage::Stage;
use crate::visual::Visual;
use libloading::{Library, Symbol};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Information about a visual class exported by the toolkit
#[derive(Debug, Clone)]
pub struct ClassInfo {
    /// Class name
    pub name: String,
    /// Index of the class in the library's own enumeration. Entries the
    /// library returns as null or unnamed are skipped, so this is not the
    /// position in [`LibraryInfo::classes`].
    pub index: u32,
    /// Whether the class exports a copy constructor
    pub cloneable: bool,
}

/// Information about a loaded toolkit library
#[derive(Debug, Clone)]
pub struct LibraryInfo {
    /// Library file path
    pub path: PathBuf,
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// API version
    pub api_version: u32,
    /// Available visual classes
    pub classes: Vec<ClassInfo>,
}

/// A loaded native toolkit library
pub struct ToolkitLibrary {
    /// The underlying library handle
    library: Library,
    /// Library info
    pub info: LibraryInfo,
    /// Cached class info pointers
    class_info_cache: RwLock<HashMap<String, *const FfiClassInfo>>,
    /// Cached visual vtables
    vtable_cache: RwLock<HashMap<String, *const FfiVisualVTable>>,
    /// Function to get a class vtable
    get_visual_vtable: Option<VisualVTableFn>,
    /// Function to fetch the most recent failure message
    last_error: Option<LastErrorFn>,
    /// Stage that gates disposal of objects created from this library
    stage: Arc<Stage>,
}

// Safety: Library handle is thread-safe when properly used; the cached
// pointers refer to static data inside the loaded library.
unsafe impl Send for ToolkitLibrary {}
unsafe impl Sync for ToolkitLibrary {}

impl ToolkitLibrary {
    /// Load the toolkit library, tying its objects to the global stage.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::load_with_stage(path, Arc::clone(Stage::global()))
    }

    /// Load the toolkit library with an explicit stage.
    pub fn load_with_stage(path: impl AsRef<Path>, stage: Arc<Stage>) -> Result<Arc<Self>> {
        let path = path.as_ref();

        let library = unsafe {
            Library::new(path).map_err(|e| LumenError::load_error(path, e.to_string()))?
        };

        let get_info: Symbol<LibraryInfoFn> = unsafe {
            library.get(b"lumen_library_info\0").map_err(|_| {
                LumenError::symbol_not_found(path.display().to_string(), "lumen_library_info")
            })?
        };

        let ffi_info = get_info();

        if ffi_info.api_version != LUMEN_API_VERSION {
            return Err(LumenError::VersionMismatch {
                library_version: ffi_info.api_version.to_string(),
                expected_version: LUMEN_API_VERSION.to_string(),
            });
        }

        let name = if ffi_info.name.is_null() {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string()
        } else {
            unsafe { CStr::from_ptr(ffi_info.name) }
                .to_string_lossy()
                .into_owned()
        };

        let version = if ffi_info.version.is_null() {
            "0.0.0".to_string()
        } else {
            unsafe { CStr::from_ptr(ffi_info.version) }
                .to_string_lossy()
                .into_owned()
        };

        let get_class_info: Symbol<ClassInfoFn> = unsafe {
            library.get(b"lumen_class_info\0").map_err(|_| {
                LumenError::symbol_not_found(path.display().to_string(), "lumen_class_info")
            })?
        };

        let mut classes = Vec::new();
        for i in 0..ffi_info.class_count {
            let class_info_ptr = get_class_info(i);
            if !class_info_ptr.is_null() {
                let class_info = unsafe { &*class_info_ptr };
                if class_info.name.is_null() {
                    continue;
                }
                let class_name = unsafe { CStr::from_ptr(class_info.name) }
                    .to_string_lossy()
                    .into_owned();

                classes.push(ClassInfo {
                    name: class_name,
                    index: i,
                    cloneable: class_info.clone_fn.is_some(),
                });
            }
        }

        let get_visual_vtable: Option<VisualVTableFn> = unsafe {
            library
                .get(b"lumen_visual_vtable\0")
                .ok()
                .map(|s: Symbol<VisualVTableFn>| *s)
        };

        let last_error: Option<LastErrorFn> = unsafe {
            library
                .get(b"lumen_last_error\0")
                .ok()
                .map(|s: Symbol<LastErrorFn>| *s)
        };

        let info = LibraryInfo {
            path: path.to_path_buf(),
            name,
            version,
            api_version: ffi_info.api_version,
            classes,
        };

        log::info!(
            "Loaded toolkit library '{}' v{} with {} visual classes",
            info.name,
            info.version,
            info.classes.len()
        );

        Ok(Arc::new(Self {
            library,
            info,
            class_info_cache: RwLock::new(HashMap::new()),
            vtable_cache: RwLock::new(HashMap::new()),
            get_visual_vtable,
            last_error,
            stage,
        }))
    }

    /// Get information about a specific class
    pub fn get_class_info(&self, class_name: &str) -> Option<&ClassInfo> {
        self.info.classes.iter().find(|c| c.name == class_name)
    }

    /// Check if the library exports a class
    pub fn has_class(&self, class_name: &str) -> bool {
        self.info.classes.iter().any(|c| c.name == class_name)
    }

    /// Get the library path
    pub fn path(&self) -> &Path {
        &self.info.path
    }

    /// Get the library name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Get the list of class names
    pub fn class_names(&self) -> Vec<&str> {
        self.info.classes.iter().map(|c| c.name.as_str()).collect()
    }

    /// The stage disposal of this library's objects is tied to.
    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    /// Get the raw class info pointer
    fn class_info_ptr(&self, class_name: &str) -> Result<*const FfiClassInfo> {
        {
            let cache = self.class_info_cache.read();
            if let Some(ptr) = cache.get(class_name) {
                return Ok(*ptr);
            }
        }

        // The library is indexed by its own enumeration order, which the
        // stored index preserves even when enumeration skipped entries.
        let index = self
            .info
            .classes
            .iter()
            .find(|c| c.name == class_name)
            .map(|c| c.index)
            .ok_or_else(|| LumenError::ClassNotFound(class_name.to_string()))?;

        let get_class_info: Symbol<ClassInfoFn> = unsafe {
            self.library.get(b"lumen_class_info\0").map_err(|_| {
                LumenError::symbol_not_found(
                    self.info.path.display().to_string(),
                    "lumen_class_info",
                )
            })?
        };

        let ptr = get_class_info(index);
        if ptr.is_null() {
            return Err(LumenError::ClassNotFound(class_name.to_string()));
        }

        self.class_info_cache
            .write()
            .insert(class_name.to_string(), ptr);

        Ok(ptr)
    }

    /// Get the visual vtable for a class
    fn visual_vtable(&self, class_name: &str) -> Result<*const FfiVisualVTable> {
        {
            let cache = self.vtable_cache.read();
            if let Some(ptr) = cache.get(class_name) {
                return Ok(*ptr);
            }
        }

        let get_vtable = self.get_visual_vtable.ok_or_else(|| {
            LumenError::symbol_not_found(
                self.info.path.display().to_string(),
                "lumen_visual_vtable",
            )
        })?;

        let class_name_c = CString::new(class_name)
            .map_err(|_| LumenError::InvalidState("Invalid class name".into()))?;
        let ptr = get_vtable(class_name_c.as_ptr());

        if ptr.is_null() {
            return Err(LumenError::ClassNotFound(class_name.to_string()));
        }

        self.vtable_cache
            .write()
            .insert(class_name.to_string(), ptr);

        Ok(ptr)
    }

    /// Create a visual of the given class, owned by the returned wrapper.
    pub fn create_visual(self: &Arc<Self>, class_name: &str) -> Result<Visual> {
        let class_info_ptr = self.class_info_ptr(class_name)?;
        let class_info = unsafe { &*class_info_ptr };

        let create_fn = class_info
            .create_fn
            .ok_or_else(|| LumenError::creation_failed(class_name, "No create function"))?;

        let raw = create_fn();
        if raw.is_null() {
            return Err(LumenError::creation_failed(
                class_name,
                "Create function returned null",
            ));
        }

        let vtable = self.visual_vtable(class_name)?;
        let handle = NativeHandle::from_library(
            raw,
            true,
            class_info.destroy_fn,
            Arc::clone(&self.stage),
            Arc::clone(self),
        );

        log::debug!("Created native visual of class '{}'", class_name);

        Ok(Visual::new(
            class_name.to_string(),
            handle,
            vtable,
            class_info.clone_fn,
        ))
    }

    /// Wrap a pre-existing native visual without allocating.
    ///
    /// With `owns = true` the wrapper releases the object on disposal.
    pub fn adopt_visual(
        self: &Arc<Self>,
        class_name: &str,
        raw: RawHandle,
        owns: bool,
    ) -> Result<Visual> {
        if raw.is_null() {
            return Err(LumenError::InvalidState("Cannot adopt a null handle".into()));
        }

        let class_info_ptr = self.class_info_ptr(class_name)?;
        let class_info = unsafe { &*class_info_ptr };
        let vtable = self.visual_vtable(class_name)?;

        let destroy = if owns { class_info.destroy_fn } else { None };
        let handle = NativeHandle::from_library(
            raw,
            owns,
            destroy,
            Arc::clone(&self.stage),
            Arc::clone(self),
        );

        Ok(Visual::new(
            class_name.to_string(),
            handle,
            vtable,
            class_info.clone_fn,
        ))
    }

    /// Convert a non-OK status into an error carrying the library's most
    /// recent failure message.
    pub(crate) fn status_error(&self, status: FfiStatus) -> LumenError {
        let message = self
            .last_error
            .and_then(|f| {
                let ptr = f();
                if ptr.is_null() {
                    None
                } else {
                    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
                }
            })
            .unwrap_or_else(|| "no detail reported".to_string());

        LumenError::Native {
            code: status.code(),
            message,
        }
    }
}

impl Drop for ToolkitLibrary {
    fn drop(&mut self) {
        log::debug!("Unloading toolkit library '{}'", self.info.name);
        // Library is automatically unloaded when dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_info() {
        let info = LibraryInfo {
            path: PathBuf::from("liblumen.so"),
            name: "lumen".to_string(),
            version: "1.0.0".to_string(),
            api_version: LUMEN_API_VERSION,
            classes: vec![ClassInfo {
                name: "ColorVisual".to_string(),
                index: 0,
                cloneable: true,
            }],
        };

        assert_eq!(info.name, "lumen");
        assert_eq!(info.classes.len(), 1);
        assert_eq!(info.classes[0].name, "ColorVisual");
        assert!(info.classes[0].cloneable);
    }

    #[test]
    fn class_lookup_keeps_the_library_index() {
        // Simulates an enumeration where slots 0 and 2 were unnamed and
        // skipped: positions in the vec must not stand in for library
        // indices.
        let info = LibraryInfo {
            path: PathBuf::from("liblumen.so"),
            name: "lumen".to_string(),
            version: "1.0.0".to_string(),
            api_version: LUMEN_API_VERSION,
            classes: vec![
                ClassInfo {
                    name: "ColorVisual".to_string(),
                    index: 1,
                    cloneable: true,
                },
                ClassInfo {
                    name: "ImageVisual".to_string(),
                    index: 3,
                    cloneable: false,
                },
            ],
        };

        let found = info.classes.iter().find(|c| c.name == "ImageVisual").unwrap();
        assert_eq!(found.index, 3);
        assert_ne!(
            found.index as usize,
            info.classes.iter().position(|c| c.name == "ImageVisual").unwrap()
        );
    }
}
