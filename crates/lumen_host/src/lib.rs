//! # lumen_host - Native Toolkit Handle Lifetime Layer
//!
//! Host-side bindings core for the Lumen native UI toolkit. The toolkit is
//! compiled into a dynamic library (DLL/SO/DYLIB) loaded at runtime; this
//! crate owns the lifetime of every native object handed across that
//! boundary.
//!
//! ## Overview
//!
//! Native objects are held through [`NativeHandle`]: an opaque address plus
//! an ownership flag. Disposal nulls the handle exactly once and calls the
//! native destructor at most once. Destructors may only run while the
//! rendering context (the [`Stage`]) is installed, and only on the stage
//! thread, so releases from other contexts are queued on the stage's
//! [`DisposeQueue`] and drained once per render/update tick.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  Lumen Toolkit  │────▶│  Dynamic Lib    │
//! │  (C++ visuals)  │     │  (liblumen.so)  │
//! └─────────────────┘     └────────┬────────┘
//!                                  │
//!                                  ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ ToolkitLibrary  │◀────│   libloading    │
//! │   (Rust FFI)    │     │                 │
//! └────────┬────────┘     └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Visual      │────▶│  NativeHandle   │
//! │ (per object)    │     │ (address, owns) │
//! └─────────────────┘     └────────┬────────┘
//!                                  │ deferred release
//!                                  ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Stage       │────▶│  DisposeQueue   │
//! │ (render context)│     │ (drain per tick)│
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use lumen_host::{Stage, ToolkitLibrary};
//!
//! // Bring up the rendering context on this thread.
//! Stage::global().install();
//!
//! // Load the toolkit and create a visual.
//! let toolkit = ToolkitLibrary::load("liblumen.so")?;
//! let visual = toolkit.create_visual("ColorVisual")?;
//! visual.set_name("background")?;
//!
//! // Each tick, release whatever was dropped elsewhere.
//! Stage::global().process_disposals();
//! ```
//!
//! Every fallible native call returns a status checked immediately; there
//! is no process-wide pending-error slot.

mod dispose_queue;
mod error;
mod ffi;
mod handle;
mod library;
mod object;
mod properties;
mod stage;
mod visual;

pub use dispose_queue::{DisposeQueue, PendingRelease};
pub use error::{LumenError, Result};
pub use ffi::*;
pub use handle::NativeHandle;
pub use library::{ClassInfo, LibraryInfo, ToolkitLibrary};
pub use object::NativeObject;
pub use properties::{decode_map, encode_map, PropertyMap, PropertyMapExt, PropertyValue};
pub use stage::Stage;
pub use visual::Visual;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::dispose_queue::DisposeQueue;
    pub use crate::error::{LumenError, Result};
    pub use crate::handle::NativeHandle;
    pub use crate::library::ToolkitLibrary;
    pub use crate::object::NativeObject;
    pub use crate::properties::{PropertyMap, PropertyMapExt, PropertyValue};
    pub use crate::stage::Stage;
    pub use crate::visual::Visual;
}
