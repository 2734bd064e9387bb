//! Spatial placement for the level editor.
//!
//! - `waypoint` keeps the registry of placed objects used as snap targets
//! - `snap` resolves neighbour-relative and grid snapping
//! - `instancing` holds per-mesh instance buffers for optimized placement
//! - `spawn` orchestrates a single placement in either mode
//! - `drag` lays out rows of copies by dragging

pub mod drag;
pub mod instancing;
pub mod snap;
pub mod spawn;
pub mod waypoint;
