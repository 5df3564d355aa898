//! Simulation error taxonomy
//!
//! Every variant is recoverable at the `Level` boundary. Nothing raised inside
//! a single step is allowed to escape as a panic.

use thiserror::Error;

use super::entity::{EntityState, EntityType};

/// Errors reported by grid, level and snapshot operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("tile ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },
    #[error("{what} index {index} is out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("{what} capacity of {capacity} exceeded")]
    CapacityExceeded { what: &'static str, capacity: usize },
    #[error("tile {square} is already occupied")]
    Occupied { square: usize },
    #[error("no snapshot available to restore")]
    EmptyStack,
    #[error("no transition for {kind:?} in state {state:?}")]
    InvalidTransition { kind: EntityType, state: EntityState },
    #[error("invalid level layout: {0}")]
    InvalidLayout(String),
}

pub type SimResult<T> = Result<T, SimError>;
