//! Scene data: instances, bounding boxes and the scene graph.
//!
//! - `instance` holds per-instance transformation data and its GPU layout
//! - `aabb` is the axis-aligned box used for footprints and snapping
//! - `scene_graph` owns every node behind generational handles

pub mod aabb;
pub mod instance;
pub mod scene_graph;
