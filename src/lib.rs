//! Penguins Puzzle - grid-based puzzle simulation core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (grid, entities, rules, undo stack)
//! - `renderer`: Read-only instance data handed to an external renderer
//! - `persistence`: Save/load of level state in a versioned envelope
//! - `settings`: Tuning constants and undo policy

pub mod persistence;
pub mod renderer;
pub mod settings;
pub mod sim;

pub use settings::{Settings, SimSettings, UndoPolicy};
pub use sim::{Level, LevelLayout, SimError, StepInput};

/// Game configuration constants
pub mod consts {
    /// Maximum number of entity slots in a level
    pub const MAX_PENGS: usize = 100;
    /// Maximum number of tiles in a level grid
    pub const MAX_SQUARES: usize = 64 * 64;
    /// Maximum number of undo snapshots kept
    pub const MAX_BACKUPS: usize = 64;

    /// Default edge length of one grid cell in world units
    pub const DEFAULT_CELL_SIZE: f32 = 1.0;
    /// Tallest height difference a grounded entity can climb in one step
    pub const STEP_UP: f32 = 0.5;
    /// Velocities below this are treated as rest
    pub const REST_EPSILON: f32 = 1e-4;
}

/// Normalized angle to [-π, π]
///
/// Non-finite input is returned unchanged.
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    if !angle.is_finite() {
        return angle;
    }
    (angle + PI).rem_euclid(TAU) - PI
}
