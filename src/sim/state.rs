//! Level state
//!
//! `Level` owns everything the simulation mutates: the tile grid, the entity
//! arena and the undo ring. All operations take the level by reference; there
//! is no global game state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityState, EntityType};
use super::error::{SimError, SimResult};
use super::grid::{BlockType, Grid, Tile};
use super::layout::LevelLayout;
use super::snapshot::SnapshotStack;
use super::tick::{self, StepInput};
use super::view::ViewParams;
use crate::consts::{DEFAULT_CELL_SIZE, MAX_PENGS};
use crate::settings::{Settings, UndoPolicy};

/// Current mode of a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelMode {
    /// Active gameplay
    Playing,
    /// Steps are ignored until unpaused
    Paused,
    /// Every penguin reached the exit or was fed
    Won,
    /// A penguin was destroyed
    Lost,
}

/// Things that happened during the last step, for renderers and audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    TileDegraded { square: usize, block: BlockType },
    DoorsToggled,
    Exploded { id: EntityId },
    Destroyed { id: EntityId },
    Removed { id: EntityId },
    Solved { id: EntityId },
    StartedFeeding { id: EntityId, pail: EntityId },
    Fed { id: EntityId },
    ChestOpened { chest: EntityId, released: EntityId },
    PickedUp { by: EntityId, item: EntityId },
    /// A fragment was placed on the pole; the level takes a checkpoint
    Checkpoint { by: EntityId },
    Fired { by: EntityId, projectile: EntityId },
    SpawnRejected { kind: EntityType },
    ControlSwitched { id: EntityId },
}

/// A playable level
#[derive(Debug, Clone)]
pub struct Level {
    pub(crate) grid: Grid,
    pub(crate) entities: Vec<Entity>,
    snapshots: SnapshotStack,
    pub(crate) tick: u64,
    mode: LevelMode,
    level_number: u32,
    pub(crate) cell_size: f32,
    pub(crate) settings: Settings,
    pub(crate) view: ViewParams,
    pub(crate) events: Vec<SimEvent>,
}

impl Default for Level {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Level {
    /// An empty 1x1 level; call `load` to populate it
    pub fn new(settings: Settings) -> Self {
        Self {
            grid: Grid::single(BlockType::Ice),
            entities: Vec::with_capacity(MAX_PENGS),
            snapshots: SnapshotStack::new(),
            tick: 0,
            mode: LevelMode::Playing,
            level_number: 0,
            cell_size: DEFAULT_CELL_SIZE,
            settings,
            view: ViewParams::default(),
            events: Vec::new(),
        }
    }

    /// Build a level directly from a layout
    pub fn from_layout(layout: &LevelLayout, settings: Settings) -> SimResult<Self> {
        let mut level = Self::new(settings);
        level.load(layout)?;
        Ok(level)
    }

    /// Replace the whole level state from a layout
    ///
    /// The layout is validated in full first; on error the current state is
    /// left untouched.
    pub fn load(&mut self, layout: &LevelLayout) -> SimResult<()> {
        let (grid, entities) = layout.build(&self.settings.sim)?;
        self.grid = grid;
        self.entities = entities;
        self.snapshots.clear();
        self.tick = 0;
        self.level_number = layout.level_number;
        self.cell_size = layout.cell_size;
        self.events.clear();
        self.view = ViewParams::default();
        self.mode = LevelMode::Playing;
        self.mode = self.evaluate_mode();
        log::info!(
            "Loaded level {} ({}x{}, {} entities)",
            self.level_number,
            self.grid.width(),
            self.grid.height(),
            self.entities.len()
        );
        Ok(())
    }

    /// Advance one tick
    ///
    /// Returns the events produced by the step.
    pub fn step(&mut self, input: &StepInput) -> &[SimEvent] {
        self.events.clear();

        if input.pause {
            match self.mode {
                LevelMode::Playing => {
                    self.mode = LevelMode::Paused;
                    return &self.events;
                }
                LevelMode::Paused => self.mode = LevelMode::Playing,
                _ => {}
            }
        }
        if self.mode != LevelMode::Playing {
            return &self.events;
        }

        if input.switch_penguin {
            self.switch_control();
        }
        if self.settings.undo_policy == UndoPolicy::EveryMove && self.commits_move(input) {
            self.push_snapshot();
        }

        tick::tick(self, input);

        if self.mode == LevelMode::Playing {
            self.mode = self.evaluate_mode();
            match self.mode {
                LevelMode::Won => log::info!("Level {} solved at tick {}", self.level_number, self.tick),
                LevelMode::Lost => log::info!("Level {} lost at tick {}", self.level_number, self.tick),
                _ => {}
            }
        }

        let checkpoint = self.events.iter().any(|e| matches!(e, SimEvent::Checkpoint { .. }));
        let periodic = self.settings.undo_policy == UndoPolicy::Periodic
            && self.settings.snapshot_interval > 0
            && self.tick % u64::from(self.settings.snapshot_interval) == 0;
        if checkpoint || periodic {
            self.push_snapshot();
        }

        #[cfg(debug_assertions)]
        for problem in self.check_invariants() {
            log::error!("Invariant violated at tick {}: {problem}", self.tick);
        }

        &self.events
    }

    /// Whether this input starts a move of the controlled entity
    fn commits_move(&self, input: &StepInput) -> bool {
        let Some(dir) = input.direction else {
            return false;
        };
        let Some(id) = self.controlled() else {
            return false;
        };
        let entity = &self.entities[id.index()];
        entity.is_at_rest() && self.grid.neighbor(entity.square, dir.delta()).is_some()
    }

    /// Save the current arrays on the undo ring
    pub fn push_snapshot(&mut self) {
        let evicted = self.snapshots.push(&self.entities, self.grid.tiles());
        if evicted {
            log::debug!("Undo ring full, dropped oldest snapshot");
        }
        log::debug!("Snapshot pushed at tick {} ({} held)", self.tick, self.snapshots.len());
    }

    /// Undo: restore the most recent snapshot and drop it from the ring
    ///
    /// Reports `EmptyStack` and leaves the level unchanged when there is
    /// nothing to restore.
    pub fn restore(&mut self) -> SimResult<()> {
        let snapshot = self.snapshots.pop()?;
        if snapshot.tiles.len() != self.grid.len() {
            return Err(SimError::InvalidLayout(format!(
                "snapshot holds {} tiles, level has {}",
                snapshot.tiles.len(),
                self.grid.len()
            )));
        }
        self.entities = snapshot.entities;
        self.grid.replace_tiles(snapshot.tiles);
        self.events.clear();
        let mode = self.evaluate_mode();
        self.mode = if self.mode == LevelMode::Paused && mode == LevelMode::Playing {
            LevelMode::Paused
        } else {
            mode
        };
        log::debug!("Restored snapshot ({} left)", self.snapshots.len());
        Ok(())
    }

    /// Place a new entity in the first free slot
    ///
    /// Fails with `Occupied` when the entity needs a tile that already has an
    /// occupant, and with `CapacityExceeded` when all `MAX_PENGS` slots are live.
    pub fn spawn(&mut self, mut entity: Entity) -> SimResult<EntityId> {
        let square = entity.square;
        let tile = self.grid.tile(square)?;
        if entity.occupies_tile() && tile.occupant.is_some() {
            return Err(SimError::Occupied { square });
        }
        let id = match self.entities.iter().position(|e| !e.is_active()) {
            Some(slot) => EntityId(slot),
            None if self.entities.len() < MAX_PENGS => {
                self.entities.push(Entity::default());
                EntityId(self.entities.len() - 1)
            }
            None => {
                return Err(SimError::CapacityExceeded {
                    what: "entity",
                    capacity: MAX_PENGS,
                });
            }
        };
        if self.grid.square_of(entity.pos, self.cell_size) != square {
            entity.pos = self.grid.center_of(square, self.cell_size);
        }
        if entity.occupies_tile() {
            self.grid.set_occupant(square, Some(id))?;
        }
        self.entities[id.index()] = entity;
        Ok(id)
    }

    /// Delete an entity (and anything it holds) from the active set
    pub fn remove(&mut self, id: EntityId) -> SimResult<()> {
        let entity = self.entity(id)?.clone();
        if !entity.is_active() {
            return Ok(());
        }
        self.grid.release(entity.square, id);
        if let Some(held) = entity.contents {
            self.grid.release(entity.square, held);
            self.entities[held.index()] = Entity::default();
        }
        if let Some(owner) = entity.inside {
            self.entities[owner.index()].contents = None;
        }
        for other in self.entities.iter_mut() {
            if other.standing_on == Some(id) {
                other.standing_on = None;
            }
        }
        self.entities[id.index()] = Entity::default();
        self.events.push(SimEvent::Removed { id });
        Ok(())
    }

    /// The entity under player control, if any
    pub fn controlled(&self) -> Option<EntityId> {
        self.entities
            .iter()
            .position(|e| e.is_active() && e.state == EntityState::Controlled)
            .map(EntityId)
    }

    /// Hand control to the next idle penguin after the current one
    pub fn switch_control(&mut self) -> Option<EntityId> {
        let current = self.controlled();
        let start = current.map_or(0, |id| id.index() + 1);
        let count = self.entities.len();
        let next = (0..count)
            .map(|offset| (start + offset) % count.max(1))
            .find(|&i| {
                let e = &self.entities[i];
                e.kind == EntityType::Penguin
                    && matches!(e.state, EntityState::Bopping | EntityState::Walking)
                    && !e.is_contained()
            })
            .map(EntityId)?;
        if let Some(old) = current {
            self.entities[old.index()].state = EntityState::Bopping;
        }
        let entity = &mut self.entities[next.index()];
        entity.state = EntityState::Controlled;
        entity.vel = glam::Vec2::ZERO;
        self.events.push(SimEvent::ControlSwitched { id: next });
        Some(next)
    }

    /// Mode implied by the current entities
    ///
    /// Lost as soon as any penguin is destroyed; won once every penguin has
    /// reached a terminal state (solved at the exit or fed).
    fn evaluate_mode(&self) -> LevelMode {
        let mut penguins = 0;
        let mut done = 0;
        for e in self.entities.iter().filter(|e| e.is_active() && e.kind.is_penguin()) {
            if matches!(e.state, EntityState::Debris | EntityState::Exploding) {
                return LevelMode::Lost;
            }
            penguins += 1;
            done += usize::from(e.state.is_terminal());
        }
        if penguins > 0 && penguins == done {
            LevelMode::Won
        } else {
            LevelMode::Playing
        }
    }

    /// Describe every broken structural invariant (empty when consistent)
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut claimed = HashSet::new();

        for (square, tile) in self.grid.tiles().iter().enumerate() {
            let Some(id) = tile.occupant else { continue };
            match self.entities.get(id.index()) {
                Some(e) if e.is_active() && e.square == square => {}
                Some(e) => problems.push(format!(
                    "tile {square} claims entity {} which sits on {}",
                    id.index(),
                    e.square
                )),
                None => problems.push(format!("tile {square} claims missing entity {}", id.index())),
            }
            if !claimed.insert(id) {
                problems.push(format!("entity {} is occupant of two tiles", id.index()));
            }
        }

        for (i, e) in self.entities.iter().enumerate().filter(|(_, e)| e.is_active()) {
            let under = self.grid.square_of(e.pos, self.cell_size);
            if !self.grid.contains_pos(e.pos, self.cell_size) || under != e.square {
                problems.push(format!("entity {i} at {:?} records square {} not {under}", e.pos, e.square));
            }
            if let Some(held) = e.contents {
                let inner = &self.entities[held.index()];
                if inner.inside != Some(EntityId(i)) || inner.contents.is_some() {
                    problems.push(format!("entity {i} holds {} inconsistently", held.index()));
                }
            }
            if let Some(carrier) = e.standing_on {
                if self.entities[carrier.index()].standing_on.is_some() {
                    problems.push(format!("entity {i} rides a riding entity"));
                }
            }
        }
        problems
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Read-only tile array for renderers
    pub fn tiles(&self) -> &[Tile] {
        self.grid.tiles()
    }

    /// Read-only entity arena (free slots included) for renderers
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> SimResult<&Entity> {
        let len = self.entities.len();
        self.entities.get(id.index()).ok_or(SimError::IndexOutOfRange {
            what: "entity",
            index: id.index(),
            len,
        })
    }

    /// Live entities in index order
    pub fn active_entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_active())
            .map(|(i, e)| (EntityId(i), e))
    }

    /// Entities drawn by the effects pass: released fragments, smoke,
    /// explosions and debris
    pub fn fragments(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.active_entities().filter(|(_, e)| {
            e.state.is_effect() || matches!(e.state, EntityState::Fragment | EntityState::Flash)
        })
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn mode(&self) -> LevelMode {
        self.mode
    }

    pub fn level_number(&self) -> u32 {
        self.level_number
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn view(&self) -> &ViewParams {
        &self.view
    }

    /// Overwrite the live arrays from saved state (persistence restore)
    pub(crate) fn install(&mut self, grid: Grid, entities: Vec<Entity>, tick: u64, level_number: u32, cell_size: f32) {
        self.grid = grid;
        self.entities = entities;
        self.tick = tick;
        self.level_number = level_number;
        self.cell_size = cell_size;
        self.snapshots.clear();
        self.events.clear();
        self.view = ViewParams::default();
        self.mode = LevelMode::Playing;
        self.mode = self.evaluate_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::entity::Direction;
    use crate::sim::layout::EntityLayout;

    fn two_penguins(settings: Settings) -> Level {
        let layout = LevelLayout::filled(4, 3, BlockType::Snow)
            .with_entity(EntityLayout::new(EntityType::Penguin, 0, 0).with_state(EntityState::Controlled))
            .with_entity(EntityLayout::new(EntityType::Penguin, 3, 2));
        Level::from_layout(&layout, settings).unwrap()
    }

    #[test]
    fn test_spawn_capacity() {
        let layout = LevelLayout::filled(11, 10, BlockType::Snow);
        let mut level = Level::from_layout(&layout, Settings::default()).unwrap();
        for square in 0..MAX_PENGS {
            let pos = level.grid().center_of(square, level.cell_size());
            level.spawn(Entity::new(EntityType::Tree, square, pos)).unwrap();
        }
        let pos = level.grid().center_of(MAX_PENGS, level.cell_size());
        let err = level.spawn(Entity::new(EntityType::Tree, MAX_PENGS, pos)).unwrap_err();
        assert!(matches!(err, SimError::CapacityExceeded { what: "entity", .. }));
        assert_eq!(level.tiles()[MAX_PENGS].occupant, None);
    }

    #[test]
    fn test_spawn_onto_occupied_tile() {
        let mut level = two_penguins(Settings::default());
        let pos = level.grid().center_of(0, level.cell_size());
        let err = level.spawn(Entity::new(EntityType::Barrel, 0, pos)).unwrap_err();
        assert_eq!(err, SimError::Occupied { square: 0 });
        assert_eq!(level.tiles()[0].occupant, Some(EntityId(0)));
        assert_eq!(level.active_entities().count(), 2);

        // Airborne entities share the tile
        let bullet = level.spawn(Entity::new(EntityType::Bullet, 0, pos)).unwrap();
        assert_eq!(level.tiles()[0].occupant, Some(EntityId(0)));
        assert_eq!(level.entities()[bullet.index()].square, 0);
    }

    #[test]
    fn test_removed_slot_is_reused() {
        let mut level = two_penguins(Settings::default());
        let square = level.entities()[0].square;
        level.remove(EntityId(0)).unwrap();
        assert_eq!(level.tiles()[square].occupant, None);
        assert!(!level.entities()[0].is_active());
        assert_eq!(level.controlled(), None);

        let pos = level.grid().center_of(5, level.cell_size());
        let id = level.spawn(Entity::new(EntityType::Barrel, 5, pos)).unwrap();
        assert_eq!(id, EntityId(0));
        assert_eq!(level.tiles()[5].occupant, Some(id));
        assert!(level.check_invariants().is_empty());
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let mut level = two_penguins(Settings::default());
        level.step(&StepInput::moving(Direction::East));
        let before = level.entities().to_vec();
        let tick = level.tick();

        let bad = LevelLayout::filled(2, 2, BlockType::Snow)
            .with_entity(EntityLayout::new(EntityType::Penguin, 5, 5));
        assert!(level.load(&bad).is_err());
        assert_eq!(level.entities(), before.as_slice());
        assert_eq!(level.tick(), tick);
        assert_eq!(level.grid().width(), 4);
    }

    #[test]
    fn test_restore_empty_stack_changes_nothing() {
        let mut level = two_penguins(Settings::from_policy(UndoPolicy::CheckpointsOnly));
        level.step(&StepInput::moving(Direction::East));
        let before = level.entities().to_vec();
        assert!(matches!(level.restore(), Err(SimError::EmptyStack)));
        assert_eq!(level.entities(), before.as_slice());
    }

    #[test]
    fn test_pause_freezes_level() {
        let mut level = two_penguins(Settings::default());
        let pause = StepInput {
            pause: true,
            ..Default::default()
        };
        level.step(&pause);
        assert_eq!(level.mode(), LevelMode::Paused);
        level.step(&StepInput::moving(Direction::East));
        assert_eq!(level.tick(), 0);

        level.step(&pause);
        assert_eq!(level.mode(), LevelMode::Playing);
        assert_eq!(level.tick(), 1);
    }

    #[test]
    fn test_switch_control_cycles() {
        let mut level = two_penguins(Settings::default());
        assert_eq!(level.switch_control(), Some(EntityId(1)));
        assert_eq!(level.entities()[0].state, EntityState::Bopping);
        assert_eq!(level.controlled(), Some(EntityId(1)));
        assert_eq!(level.switch_control(), Some(EntityId(0)));
    }

    #[test]
    fn test_undo_policies() {
        let mut level = two_penguins(Settings::default());
        level.step(&StepInput::default());
        assert_eq!(level.snapshot_count(), 0);
        level.step(&StepInput::moving(Direction::East));
        assert_eq!(level.snapshot_count(), 1);

        let mut level = two_penguins(Settings::from_policy(UndoPolicy::CheckpointsOnly));
        level.step(&StepInput::moving(Direction::East));
        assert_eq!(level.snapshot_count(), 0);

        let mut level = two_penguins(Settings::from_policy(UndoPolicy::Periodic));
        for _ in 0..60 {
            level.step(&StepInput::default());
        }
        assert_eq!(level.snapshot_count(), 2);
    }
}
