//! Normalized level layout
//!
//! The loader collaborator hands the core one of these: grid dimensions, one
//! block per tile and the initial entity list. `build` validates everything
//! before producing the live arrays, so a bad layout never reaches a level.

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use super::entity::{Direction, Entity, EntityId, EntityState, EntityType};
use super::error::{SimError, SimResult};
use super::grid::{BlockType, Grid, Tile};
use crate::consts::{DEFAULT_CELL_SIZE, MAX_PENGS, MAX_SQUARES};
use crate::settings::SimSettings;

fn default_cell_size() -> f32 {
    DEFAULT_CELL_SIZE
}

/// One tile of a layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileLayout {
    pub block: BlockType,
    #[serde(default)]
    pub height: f32,
    #[serde(default)]
    pub flow: Vec2,
}

impl TileLayout {
    pub fn new(block: BlockType) -> Self {
        Self {
            block,
            height: 0.0,
            flow: Vec2::ZERO,
        }
    }
}

/// One initial entity of a layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLayout {
    pub kind: EntityType,
    pub x: i32,
    pub y: i32,
    /// Overrides the type's initial state
    #[serde(default)]
    pub state: Option<EntityState>,
    #[serde(default)]
    pub heading: Option<Direction>,
    #[serde(default)]
    pub fish: u32,
    /// Overrides the type's initial countdown
    #[serde(default)]
    pub steps: Option<u32>,
    /// Index into the layout's entity list of the entity held inside this one
    #[serde(default)]
    pub contents: Option<usize>,
}

impl EntityLayout {
    pub fn new(kind: EntityType, x: i32, y: i32) -> Self {
        Self {
            kind,
            x,
            y,
            state: None,
            heading: None,
            fish: 0,
            steps: None,
            contents: None,
        }
    }

    pub fn with_state(mut self, state: EntityState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_heading(mut self, heading: Direction) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_fish(mut self, fish: u32) -> Self {
        self.fish = fish;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn containing(mut self, index: usize) -> Self {
        self.contents = Some(index);
        self
    }
}

/// A complete level description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelLayout {
    #[serde(default)]
    pub level_number: u32,
    pub width: usize,
    pub height: usize,
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    pub tiles: Vec<TileLayout>,
    #[serde(default)]
    pub entities: Vec<EntityLayout>,
}

impl LevelLayout {
    /// A layout with every tile set to `block` and no entities
    ///
    /// Oversized dimensions get no tiles; `build` rejects them.
    pub fn filled(width: usize, height: usize, block: BlockType) -> Self {
        let count = width.checked_mul(height).filter(|&n| n <= MAX_SQUARES).unwrap_or(0);
        Self {
            level_number: 0,
            width,
            height,
            cell_size: DEFAULT_CELL_SIZE,
            tiles: vec![TileLayout::new(block); count],
            entities: Vec::new(),
        }
    }

    /// Parse a layout from JSON
    pub fn from_json(json: &str) -> SimResult<Self> {
        serde_json::from_str(json).map_err(|e| SimError::InvalidLayout(e.to_string()))
    }

    fn tile_slot(&mut self, x: usize, y: usize) -> Option<&mut TileLayout> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = y.checked_mul(self.width)?.checked_add(x)?;
        self.tiles.get_mut(index)
    }

    pub fn with_block(mut self, x: usize, y: usize, block: BlockType) -> Self {
        if let Some(slot) = self.tile_slot(x, y) {
            slot.block = block;
        }
        self
    }

    pub fn with_tile(mut self, x: usize, y: usize, tile: TileLayout) -> Self {
        if let Some(slot) = self.tile_slot(x, y) {
            *slot = tile;
        }
        self
    }

    pub fn with_entity(mut self, entity: EntityLayout) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validate the layout and produce the live grid and entity arena
    pub fn build(&self, settings: &SimSettings) -> SimResult<(Grid, Vec<Entity>)> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(SimError::InvalidLayout(format!(
                "cell size must be positive, got {}",
                self.cell_size
            )));
        }
        let tiles = self
            .tiles
            .iter()
            .map(|t| Tile {
                height: t.height,
                flow: t.flow,
                ..Tile::new(t.block)
            })
            .collect();
        let mut grid = Grid::new(self.width, self.height, tiles)?;

        if self.entities.len() > MAX_PENGS {
            return Err(SimError::CapacityExceeded {
                what: "entity",
                capacity: MAX_PENGS,
            });
        }

        let mut entities = Vec::with_capacity(self.entities.len());
        for (i, placed) in self.entities.iter().enumerate() {
            if placed.kind == EntityType::Empty {
                return Err(SimError::InvalidLayout(format!("entity {i} has no type")));
            }
            let square = grid
                .index_of(placed.x, placed.y)
                .map_err(|e| SimError::InvalidLayout(format!("entity {i}: {e}")))?;
            entities.push(self.spawn_entity(placed, square, &grid, settings));
        }

        self.link_contents(&mut entities)?;

        let controlled = entities
            .iter()
            .filter(|e| e.state == EntityState::Controlled)
            .count();
        if controlled > 1 {
            return Err(SimError::InvalidLayout(format!(
                "{controlled} entities start player-controlled, at most one allowed"
            )));
        }

        Self::claim_tiles(&mut grid, &mut entities)?;
        Ok((grid, entities))
    }

    fn spawn_entity(&self, placed: &EntityLayout, square: usize, grid: &Grid, settings: &SimSettings) -> Entity {
        let mut entity = Entity::new(placed.kind, square, grid.center_of(square, self.cell_size));
        if let Some(state) = placed.state {
            entity.state = state;
        }
        entity.step = placed.heading.map(Direction::delta).unwrap_or(IVec2::ZERO);
        entity.facing = (entity.step.y as f32).atan2(entity.step.x as f32);
        entity.fish = placed.fish;
        entity.steps = placed.steps.unwrap_or_else(|| settings.initial_steps(placed.kind));
        entity.speed = settings.speed_for(placed.kind);
        entity.turn_rate = settings.turn_rate;
        entity.height = grid.tiles()[square].height;
        if placed.kind.is_projectile() {
            entity.vel = entity.step.as_vec2() * entity.speed * self.cell_size;
        }
        entity
    }

    fn link_contents(&self, entities: &mut [Entity]) -> SimResult<()> {
        for (owner, placed) in self.entities.iter().enumerate() {
            let Some(held) = placed.contents else { continue };
            if held >= entities.len() || held == owner {
                return Err(SimError::InvalidLayout(format!(
                    "entity {owner} holds invalid entity {held}"
                )));
            }
            if self.entities[held].contents.is_some() {
                return Err(SimError::InvalidLayout(format!(
                    "entity {held} is held by {owner} but holds another entity"
                )));
            }
            if entities[held].inside.is_some() {
                return Err(SimError::InvalidLayout(format!(
                    "entity {held} is held by more than one container"
                )));
            }
            let square = entities[owner].square;
            let pos = entities[owner].pos;
            entities[owner].contents = Some(EntityId(held));
            let inner = &mut entities[held];
            inner.inside = Some(EntityId(owner));
            inner.square = square;
            inner.pos = pos;
        }
        Ok(())
    }

    fn claim_tiles(grid: &mut Grid, entities: &mut [Entity]) -> SimResult<()> {
        for i in 0..entities.len() {
            if !entities[i].occupies_tile() {
                continue;
            }
            let square = entities[i].square;
            match grid.tile(square)?.occupant {
                None => grid.set_occupant(square, Some(EntityId(i)))?,
                Some(EntityId(other)) => {
                    let (carrier, rider) = if entities[other].kind.supports() && entities[i].kind.can_ride() {
                        (other, i)
                    } else if entities[i].kind.supports() && entities[other].kind.can_ride() {
                        (i, other)
                    } else {
                        let at = grid.coords_of(square);
                        return Err(SimError::InvalidLayout(format!(
                            "entities {other} and {i} both occupy tile ({}, {})",
                            at.x, at.y
                        )));
                    };
                    entities[rider].standing_on = Some(EntityId(carrier));
                    grid.set_occupant(square, Some(EntityId(carrier)))?;
                }
            }
        }
        Ok(())
    }
}
