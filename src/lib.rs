//! flow-placer
//!
//! The spatial placement core of a level editor. Objects are dropped into an
//! edited scene either as individual nodes or as slots in shared per-mesh
//! instance buffers, snapped edge to edge against previously placed neighbours,
//! and laid out in rows by dragging.
//!
//! High-level modules
//! - `data_structures`: instances, bounding boxes and the arena scene graph
//! - `resources`: mesh identities and their bounds
//! - `settings`: editor settings and the key/value provider trait
//! - `collision`: collision shape selection and the body factory seam
//! - `placement`: waypoint registry, snapping, instancing, spawning and drag batches
//! - `input`: translation of window events into placement input
//! - `session`: the editing session owning all of the above
//!

pub mod collision;
pub mod data_structures;
pub mod input;
pub mod placement;
pub mod resources;
pub mod session;
pub mod settings;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use winit::dpi::PhysicalPosition;
pub use winit::event::WindowEvent;
