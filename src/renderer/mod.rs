//! Render views
//!
//! Read-only instance data built from a `Level` for an external renderer.
//! Everything here is plain `bytemuck::Pod` records ready for upload; no GPU
//! API is touched.

pub mod shapes;
pub mod vertex;

pub use shapes::{fragment_instances, object_instances, tile_instances, unit_quad};
pub use vertex::{ObjectInstance, TileInstance, Vertex};
