//! Tile grid
//!
//! A row-major array of tiles. Each tile carries the block type governing
//! passability, the index of the entity occupying it, and the height/flow
//! fields used by the physics pass.

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityType};
use super::error::{SimError, SimResult};
use crate::consts::{MAX_SQUARES, STEP_UP};

/// Block types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockType {
    #[default]
    Ice,
    Cracked,
    Sea,
    Snow,
    Exit,
    Door,
    FishingRod,
    Skis,
    Tile,
    Pole,
    Button,
    Fragile,
}

impl BlockType {
    /// Entities keep sliding on these instead of stopping at the tile centre
    pub fn is_slippery(self) -> bool {
        matches!(self, BlockType::Ice | BlockType::Cracked | BlockType::Skis)
    }

    /// Next stage of degradation, if this block degrades under weight
    pub fn degrades_to(self) -> Option<BlockType> {
        match self {
            BlockType::Tile | BlockType::Fragile => Some(BlockType::Cracked),
            BlockType::Cracked => Some(BlockType::Sea),
            _ => None,
        }
    }

    /// Rank used to check that degradation only moves forward
    pub fn wear_rank(self) -> u8 {
        match self {
            BlockType::Cracked => 1,
            BlockType::Sea => 2,
            _ => 0,
        }
    }
}

/// One grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub block: BlockType,
    /// Entity standing on this tile as its occupant
    pub occupant: Option<EntityId>,
    /// Local elevation
    pub height: f32,
    /// Current/wind pushing grounded entities
    pub flow: Vec2,
    /// Weight counter driving degradation
    #[serde(default)]
    pub visits: u8,
    /// Door state, toggled by buttons
    #[serde(default)]
    pub open: bool,
}

impl Tile {
    pub fn new(block: BlockType) -> Self {
        Self {
            block,
            occupant: None,
            height: 0.0,
            flow: Vec2::ZERO,
            visits: 0,
            open: false,
        }
    }

    /// Closed doors stop everything, flyers included
    #[inline]
    pub fn is_closed_door(&self) -> bool {
        self.block == BlockType::Door && !self.open
    }

    /// Whether an entity of `kind` at elevation `from_height` may enter
    ///
    /// Grounded entities climb at most `STEP_UP` cells of height.
    pub fn is_passable_for(&self, kind: EntityType, from_height: f32, cell_size: f32) -> bool {
        if self.is_closed_door() {
            return false;
        }
        if kind.is_flyer() {
            return true;
        }
        if self.height - from_height > STEP_UP * cell_size {
            return false;
        }
        !matches!(self.block, BlockType::Sea | BlockType::Pole)
    }

    /// Whether a laser beam passes over this tile
    pub fn passes_beam(&self) -> bool {
        match self.block {
            BlockType::Pole => false,
            BlockType::Door => self.open,
            _ => true,
        }
    }
}

/// Visit thresholds per degradable block type
#[derive(Debug, Clone, Copy)]
pub struct WearThresholds {
    pub tile: u8,
    pub fragile: u8,
    pub cracked: u8,
}

/// The level grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
}

impl Grid {
    /// Build a grid from row-major tiles, enforcing the tile capacity
    pub fn new(width: usize, height: usize, tiles: Vec<Tile>) -> SimResult<Self> {
        if width == 0 || height == 0 {
            return Err(SimError::InvalidLayout(format!(
                "grid must be at least 1x1, got {width}x{height}"
            )));
        }
        let expected = width.checked_mul(height).unwrap_or(usize::MAX);
        if expected > MAX_SQUARES {
            return Err(SimError::CapacityExceeded {
                what: "tile",
                capacity: MAX_SQUARES,
            });
        }
        if tiles.len() != expected {
            return Err(SimError::InvalidLayout(format!(
                "tile count mismatch: expected {expected}, got {}",
                tiles.len()
            )));
        }
        Ok(Self {
            width,
            height,
            tiles,
        })
    }

    /// A 1x1 grid
    pub fn single(block: BlockType) -> Self {
        Self {
            width: 1,
            height: 1,
            tiles: vec![Tile::new(block)],
        }
    }

    /// A grid filled with a single block type
    pub fn filled(width: usize, height: usize, block: BlockType) -> SimResult<Self> {
        let count = width.checked_mul(height).filter(|&n| n <= MAX_SQUARES).ok_or(SimError::CapacityExceeded {
            what: "tile",
            capacity: MAX_SQUARES,
        })?;
        Self::new(width, height, vec![Tile::new(block); count])
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Whole-array replacement used by snapshot restore
    pub(crate) fn replace_tiles(&mut self, tiles: Vec<Tile>) {
        debug_assert_eq!(tiles.len(), self.tiles.len());
        self.tiles = tiles;
    }

    /// Tile index for a coordinate, failing outside `[0,w)×[0,h)`
    pub fn index_of(&self, x: i32, y: i32) -> SimResult<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return Err(SimError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(y as usize * self.width + x as usize)
    }

    /// Coordinates of a tile index
    #[inline]
    pub fn coords_of(&self, index: usize) -> IVec2 {
        IVec2::new((index % self.width) as i32, (index / self.width) as i32)
    }

    pub fn tile_at(&self, x: i32, y: i32) -> SimResult<&Tile> {
        let index = self.index_of(x, y)?;
        Ok(&self.tiles[index])
    }

    pub fn tile(&self, index: usize) -> SimResult<&Tile> {
        let len = self.tiles.len();
        self.tiles.get(index).ok_or(SimError::IndexOutOfRange {
            what: "tile",
            index,
            len,
        })
    }

    pub fn tile_mut(&mut self, index: usize) -> SimResult<&mut Tile> {
        let len = self.tiles.len();
        self.tiles.get_mut(index).ok_or(SimError::IndexOutOfRange {
            what: "tile",
            index,
            len,
        })
    }

    /// Tile index one step away from `index`, if still on the grid
    pub fn neighbor(&self, index: usize, dir: IVec2) -> Option<usize> {
        let at = self.coords_of(index) + dir;
        self.index_of(at.x, at.y).ok()
    }

    /// Set the occupant back-reference of a tile
    pub fn set_occupant(&mut self, index: usize, occupant: Option<EntityId>) -> SimResult<()> {
        self.tile_mut(index)?.occupant = occupant;
        Ok(())
    }

    /// Make `id` the occupant of a tile (ignored off the grid)
    pub fn claim(&mut self, index: usize, id: EntityId) {
        if let Some(tile) = self.tiles.get_mut(index) {
            tile.occupant = Some(id);
        }
    }

    /// Clear the occupant of a tile only if it is `id`
    pub fn release(&mut self, index: usize, id: EntityId) {
        if let Some(tile) = self.tiles.get_mut(index) {
            if tile.occupant == Some(id) {
                tile.occupant = None;
            }
        }
    }

    /// Tile index under a continuous position, clamped into the grid
    pub fn square_of(&self, pos: Vec2, cell_size: f32) -> usize {
        let x = ((pos.x / cell_size).floor() as i32).clamp(0, self.width as i32 - 1);
        let y = ((pos.y / cell_size).floor() as i32).clamp(0, self.height as i32 - 1);
        y as usize * self.width + x as usize
    }

    /// Whether a continuous position lies on the grid
    pub fn contains_pos(&self, pos: Vec2, cell_size: f32) -> bool {
        pos.x >= 0.0
            && pos.y >= 0.0
            && pos.x < self.width as f32 * cell_size
            && pos.y < self.height as f32 * cell_size
    }

    /// World-space centre of a tile
    pub fn center_of(&self, index: usize, cell_size: f32) -> Vec2 {
        let c = self.coords_of(index);
        Vec2::new((c.x as f32 + 0.5) * cell_size, (c.y as f32 + 0.5) * cell_size)
    }

    /// Register one unit of weight on a tile; returns the new block type if
    /// the tile degraded
    pub fn degrade(&mut self, index: usize, thresholds: WearThresholds) -> SimResult<Option<BlockType>> {
        let tile = self.tile_mut(index)?;
        let Some(next) = tile.block.degrades_to() else {
            return Ok(None);
        };
        let limit = match tile.block {
            BlockType::Tile => thresholds.tile,
            BlockType::Fragile => thresholds.fragile,
            _ => thresholds.cracked,
        }
        .max(1);
        tile.visits = tile.visits.saturating_add(1);
        if tile.visits < limit {
            return Ok(None);
        }
        tile.visits = 0;
        tile.block = next;
        Ok(Some(next))
    }

    /// Flip every door; returns how many doors changed
    pub fn toggle_doors(&mut self) -> usize {
        let mut toggled = 0;
        for tile in self.tiles.iter_mut().filter(|t| t.block == BlockType::Door) {
            tile.open = !tile.open;
            toggled += 1;
        }
        toggled
    }
}
