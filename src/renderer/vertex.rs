//! Vertex and instance records

use bytemuck::{Pod, Zeroable};

/// Quad corner in cell units with a colour
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

impl Vertex {
    pub const fn new(x: f32, y: f32, color: [f32; 4]) -> Self {
        Self {
            position: [x, y],
            color,
        }
    }
}

/// Per-tile instance: world offset of the tile corner, height and colour
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TileInstance {
    pub offset: [f32; 2],
    pub height: f32,
    /// Bit 0: door open, bit 1: slippery
    pub flags: u32,
    pub color: [f32; 4],
}

impl TileInstance {
    pub const FLAG_OPEN: u32 = 1;
    pub const FLAG_SLIPPERY: u32 = 1 << 1;
}

/// Per-entity instance for objects and effects
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ObjectInstance {
    /// x, height, y
    pub position: [f32; 3],
    pub facing: f32,
    pub color: [f32; 4],
    /// Bounce phase in [0, 1)
    pub bounce: f32,
    pub scale: f32,
    /// `EntityType` discriminant
    pub kind: u32,
    /// `EntityState` discriminant
    pub state: u32,
}

/// Colours for level elements
pub mod colors {
    pub const ICE: [f32; 4] = [0.75, 0.9, 1.0, 1.0];
    pub const CRACKED: [f32; 4] = [0.6, 0.75, 0.85, 1.0];
    pub const SEA: [f32; 4] = [0.05, 0.15, 0.4, 1.0];
    pub const SNOW: [f32; 4] = [0.95, 0.95, 0.97, 1.0];
    pub const EXIT: [f32; 4] = [0.3, 0.9, 0.4, 1.0];
    pub const DOOR: [f32; 4] = [0.45, 0.3, 0.2, 1.0];
    pub const FISHING_ROD: [f32; 4] = [0.8, 0.6, 0.3, 1.0];
    pub const SKIS: [f32; 4] = [0.85, 0.85, 1.0, 1.0];
    pub const TILE: [f32; 4] = [0.7, 0.7, 0.75, 1.0];
    pub const POLE: [f32; 4] = [0.9, 0.2, 0.2, 1.0];
    pub const BUTTON: [f32; 4] = [0.9, 0.8, 0.2, 1.0];
    pub const FRAGILE: [f32; 4] = [0.8, 0.85, 0.9, 1.0];

    pub const PENGUIN: [f32; 4] = [0.1, 0.1, 0.15, 1.0];
    pub const BABY_PENGUIN: [f32; 4] = [0.55, 0.55, 0.6, 1.0];
    pub const PROP: [f32; 4] = [0.6, 0.45, 0.3, 1.0];
    pub const HAZARD: [f32; 4] = [1.0, 0.4, 0.2, 1.0];
    pub const MACHINE: [f32; 4] = [0.5, 0.55, 0.65, 1.0];
    pub const TREASURE: [f32; 4] = [0.9, 0.85, 0.3, 1.0];

    pub const FLASH: [f32; 4] = [1.0, 1.0, 0.8, 1.0];
    pub const EXPLOSION: [f32; 4] = [1.0, 0.6, 0.1, 1.0];
    pub const DEBRIS: [f32; 4] = [0.3, 0.25, 0.2, 1.0];
    pub const SMOKE: [f32; 4] = [0.7, 0.7, 0.7, 0.6];
}
