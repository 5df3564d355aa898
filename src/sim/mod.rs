//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity index)
//! - No rendering or platform dependencies

pub mod collision;
pub mod entity;
pub mod error;
pub mod grid;
pub mod layout;
pub mod rules;
pub mod snapshot;
pub mod state;
pub mod tick;
pub mod view;

pub use entity::{Direction, Entity, EntityId, EntityState, EntityType};
pub use error::{SimError, SimResult};
pub use grid::{BlockType, Grid, Tile};
pub use layout::{EntityLayout, LevelLayout, TileLayout};
pub use rules::{Effect, RULES, Rule, Trigger};
pub use snapshot::{Snapshot, SnapshotStack};
pub use state::{Level, LevelMode, SimEvent};
pub use tick::{StepInput, tick};
pub use view::ViewParams;
