//! Fixed simulation tick
//!
//! Applies the control input, integrates every mobile entity in index order,
//! carries riders and contained entities along, then hands the recorded
//! contacts to the rule table.

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use super::collision::{self, MoveOutcome};
use super::entity::{Direction, Entity, EntityId, EntityState};
use super::grid::BlockType;
use super::rules;
use super::state::Level;
use crate::consts::STEP_UP;
use crate::settings::SimSettings;

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInput {
    /// Move the controlled penguin one tile (or start a slide on ice)
    pub direction: Option<Direction>,
    /// Hand control to the next idle penguin
    pub switch_penguin: bool,
    /// Pause toggle
    pub pause: bool,
}

impl StepInput {
    pub fn moving(direction: Direction) -> Self {
        Self {
            direction: Some(direction),
            ..Default::default()
        }
    }
}

/// Something a mover ran into this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Contact {
    /// The tile ahead was held by `target`; `vel` is the mover's velocity
    /// at impact
    Entity {
        mover: EntityId,
        target: EntityId,
        vel: Vec2,
    },
    /// Grid edge or impassable block
    Wall { mover: EntityId },
}

/// A grounded entity crossing into a new tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub id: EntityId,
    pub square: usize,
    /// Block type at the moment of entry
    pub block: BlockType,
}

/// What the kinematics pass observed, consumed by the rules
#[derive(Debug, Default)]
pub struct StepContext {
    pub contacts: Vec<Contact>,
    pub entries: Vec<Entry>,
}

/// Advance the level by one tick
///
/// Pause, control switching and snapshots are handled by `Level::step`
/// before this is called.
pub fn tick(level: &mut Level, input: &StepInput) {
    let mut ctx = StepContext::default();

    apply_control(level, input);
    update_support(level);
    integrate(level, &mut ctx);
    carry_riders(level);
    sync_contents(level);
    settle_claims(level);

    let period = level.settings.sim.bounce_period;
    for entity in level.entities.iter_mut().filter(|e| e.is_active()) {
        entity.animate(period);
    }

    rules::apply(level, &ctx);
    level.tick += 1;
}

/// Start a move of the controlled entity if it is at rest
fn apply_control(level: &mut Level, input: &StepInput) {
    let Some(dir) = input.direction else { return };
    let Some(id) = level.controlled() else { return };
    let cell = level.cell_size;
    let slide_speed = level.settings.sim.slide_speed;
    let square = level.entities[id.index()].square;
    let slippery = level.grid.tiles()[square].block.is_slippery();

    let entity = &mut level.entities[id.index()];
    if !entity.is_at_rest() {
        return;
    }
    let speed = if slippery { slide_speed } else { entity.speed };
    entity.step = dir.delta();
    entity.vel = dir.delta().as_vec2() * speed * cell;
    if entity.standing_on.take().is_some() {
        log::debug!("Entity {} dismounts", id.index());
    }
}

/// Recompute `standing_on` for every rider at rest
fn update_support(level: &mut Level) {
    for i in 0..level.entities.len() {
        let e = &level.entities[i];
        let carrier = if e.is_mobile() && e.kind.can_ride() && e.is_at_rest() {
            level.grid.tiles()[e.square].occupant.filter(|&c| {
                let c_entity = &level.entities[c.index()];
                c.index() != i && c_entity.kind.supports() && c_entity.standing_on.is_none()
            })
        } else {
            None
        };
        level.entities[i].standing_on = carrier;
    }
}

/// Height seeking, flow, walking impulses and the speed clamp
fn apply_forces(e: &mut Entity, tile_height: f32, flow: Vec2, sim: &SimSettings, cell: f32) {
    if e.state == EntityState::Fragment {
        e.potential = (e.potential - sim.potential_decay * cell).max(0.0);
        e.height = tile_height + e.potential;
    } else if !e.kind.is_flyer() {
        e.height = if e.height > tile_height {
            (e.height - sim.fall_rate * cell).max(tile_height)
        } else {
            tile_height
        };
        e.potential = sim.gravity * (e.height - tile_height);

        if e.state == EntityState::Feeding {
            e.vel = Vec2::ZERO;
            return;
        }
        e.vel += flow * sim.flow_gain * cell;
        if e.state == EntityState::Walking && e.is_at_rest() && e.step != IVec2::ZERO {
            e.vel = e.step.as_vec2() * e.speed * cell;
        }
    }
    e.vel = e.vel.clamp_length_max(sim.max_speed * cell);
}

/// Move every mobile, non-riding entity in index order
fn integrate(level: &mut Level, ctx: &mut StepContext) {
    let cell = level.cell_size;
    for i in 0..level.entities.len() {
        let id = EntityId(i);
        if !level.entities[i].is_mobile() || level.entities[i].standing_on.is_some() {
            continue;
        }
        let square = level.entities[i].square;
        let (tile_height, flow) = {
            let tile = &level.grid.tiles()[square];
            (tile.height, tile.flow)
        };
        apply_forces(&mut level.entities[i], tile_height, flow, &level.settings.sim, cell);

        let entity = &mut level.entities[i];
        if entity.is_at_rest() {
            entity.vel = Vec2::ZERO;
            if entity.state == EntityState::Fragment && entity.potential <= 0.0 {
                land(level, id);
            }
            continue;
        }

        let old = entity.pos;
        let new_pos = old + entity.vel;
        match collision::resolve_move(&level.grid, &level.entities, id, new_pos, cell) {
            MoveOutcome::Stay => level.entities[i].pos = new_pos,
            MoveOutcome::Enter(dest) => {
                level.grid.release(square, id);
                let block = level.grid.tiles()[dest].block;
                let entity = &mut level.entities[i];
                entity.pos = new_pos;
                entity.square = dest;
                if entity.occupies_tile() {
                    level.grid.claim(dest, id);
                }
                if !entity.is_airborne() {
                    ctx.entries.push(Entry { id, square: dest, block });
                }
            }
            MoveOutcome::Mount(dest, carrier) => {
                level.grid.release(square, id);
                let carrier_pos = level.entities[carrier.index()].pos;
                let entity = &mut level.entities[i];
                entity.pos = carrier_pos;
                entity.square = dest;
                entity.standing_on = Some(carrier);
                entity.vel = Vec2::ZERO;
                log::debug!("Entity {i} mounts entity {}", carrier.index());
                continue;
            }
            MoveOutcome::Wall => {
                stop_at_center(level, id);
                ctx.contacts.push(Contact::Wall { mover: id });
                continue;
            }
            MoveOutcome::Bump(target) => {
                let vel = level.entities[i].vel;
                stop_at_center(level, id);
                ctx.contacts.push(Contact::Entity { mover: id, target, vel });
                continue;
            }
        }

        apply_friction(level, id, old);
    }
}

/// Grounded movers stop at the centre of a non-slippery tile; flying
/// fragments lose speed and eventually land
fn apply_friction(level: &mut Level, id: EntityId, old: Vec2) {
    let cell = level.cell_size;
    let entity = &mut level.entities[id.index()];

    if entity.state == EntityState::Fragment {
        entity.vel *= level.settings.sim.fragment_drag;
        if entity.vel.length() < 0.01 * cell && entity.potential <= 0.0 {
            land(level, id);
        }
        return;
    }
    if entity.kind.is_flyer() || level.grid.tiles()[entity.square].block.is_slippery() {
        return;
    }
    let center = level.grid.center_of(entity.square, cell);
    if collision::passes_point(old, entity.pos, center) {
        entity.pos = center;
        entity.vel = Vec2::ZERO;
    }
}

/// Blocked grounded movers settle back onto their own tile centre
fn stop_at_center(level: &mut Level, id: EntityId) {
    let cell = level.cell_size;
    let square = level.entities[id.index()].square;
    let entity = &mut level.entities[id.index()];
    entity.vel = Vec2::ZERO;
    if !entity.is_airborne() {
        entity.pos = level.grid.center_of(square, cell);
    }
}

/// A flying fragment comes to rest on the tile below it
fn land(level: &mut Level, id: EntityId) {
    let cell = level.cell_size;
    let square = level.entities[id.index()].square;
    let center = level.grid.center_of(square, cell);
    let tile_height = level.grid.tiles()[square].height;
    let entity = &mut level.entities[id.index()];
    entity.state = EntityState::Still;
    entity.vel = Vec2::ZERO;
    entity.potential = 0.0;
    entity.pos = center;
    entity.height = tile_height;
    if level.grid.tiles()[square].occupant.is_none() {
        level.grid.claim(square, id);
    }
    log::debug!("Fragment {} landed on tile {square}", id.index());
}

/// Riders take their carrier's position and tile
fn carry_riders(level: &mut Level) {
    let cell = level.cell_size;
    for i in 0..level.entities.len() {
        let Some(carrier) = level.entities[i].standing_on else { continue };
        let (pos, square, height) = {
            let c = &level.entities[carrier.index()];
            (c.pos, c.square, c.height)
        };
        let rider = &mut level.entities[i];
        rider.pos = pos;
        rider.square = square;
        rider.height = height + STEP_UP * cell;
    }
}

/// Contained entities travel with their owner
fn sync_contents(level: &mut Level) {
    for i in 0..level.entities.len() {
        let Some(owner) = level.entities[i].inside else { continue };
        let (pos, square, height) = {
            let o = &level.entities[owner.index()];
            (o.pos, o.square, o.height)
        };
        let inner = &mut level.entities[i];
        inner.pos = pos;
        inner.square = square;
        inner.height = height;
    }
}

/// Entities at rest on an unclaimed tile take it over
fn settle_claims(level: &mut Level) {
    for i in 0..level.entities.len() {
        let e = &level.entities[i];
        if e.occupies_tile() && e.is_at_rest() && level.grid.tiles()[e.square].occupant.is_none() {
            let square = e.square;
            level.grid.claim(square, EntityId(i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::entity::EntityType;
    use crate::sim::layout::{EntityLayout, LevelLayout, TileLayout};
    use crate::sim::state::LevelMode;
    use proptest::prelude::*;

    fn level_from(layout: LevelLayout) -> Level {
        Level::from_layout(&layout, Settings::default()).unwrap()
    }

    fn controlled_penguin(x: i32, y: i32) -> EntityLayout {
        EntityLayout::new(EntityType::Penguin, x, y).with_state(EntityState::Controlled)
    }

    fn run(level: &mut Level, input: StepInput, ticks: usize) {
        for _ in 0..ticks {
            level.step(&input);
        }
    }

    #[test]
    fn test_idle_penguin_stays_put() {
        let mut level = level_from(
            LevelLayout::filled(3, 3, BlockType::Tile).with_entity(EntityLayout::new(EntityType::Penguin, 1, 1)),
        );
        let before = level.entities()[0].clone();
        level.step(&StepInput::default());
        let after = &level.entities()[0];
        assert_eq!(after.state, EntityState::Bopping);
        assert_eq!(after.pos, before.pos);
        assert_eq!(after.square, before.square);
        assert_eq!(level.tiles()[4].block, BlockType::Tile);
    }

    #[test]
    fn test_walk_stops_at_next_centre() {
        let mut level = level_from(LevelLayout::filled(4, 1, BlockType::Snow).with_entity(controlled_penguin(0, 0)));
        level.step(&StepInput::moving(Direction::East));
        run(&mut level, StepInput::default(), 12);

        let peng = &level.entities()[0];
        assert_eq!(peng.pos, Vec2::new(1.5, 0.5));
        assert_eq!(peng.square, 1);
        assert!(peng.is_at_rest());
        assert_eq!(level.tiles()[0].occupant, None);
        assert_eq!(level.tiles()[1].occupant, Some(EntityId(0)));
    }

    #[test]
    fn test_slide_on_ice_until_wall() {
        let mut level = level_from(LevelLayout::filled(5, 1, BlockType::Ice).with_entity(controlled_penguin(0, 0)));
        level.step(&StepInput::moving(Direction::East));
        run(&mut level, StepInput::default(), 30);

        let peng = &level.entities()[0];
        assert_eq!(peng.square, 4);
        assert_eq!(peng.pos, Vec2::new(4.5, 0.5));
        assert!(peng.is_at_rest());
    }

    #[test]
    fn test_sea_blocks_walking() {
        let layout = LevelLayout::filled(3, 1, BlockType::Snow)
            .with_block(1, 0, BlockType::Sea)
            .with_entity(controlled_penguin(0, 0));
        let mut level = level_from(layout);
        level.step(&StepInput::moving(Direction::East));
        run(&mut level, StepInput::default(), 10);
        assert_eq!(level.entities()[0].square, 0);
        assert_eq!(level.entities()[0].state, EntityState::Controlled);
    }

    #[test]
    fn test_exit_solves_and_wins() {
        let layout = LevelLayout::filled(2, 1, BlockType::Snow)
            .with_block(1, 0, BlockType::Exit)
            .with_entity(controlled_penguin(0, 0));
        let mut level = level_from(layout);
        level.step(&StepInput::moving(Direction::East));
        run(&mut level, StepInput::default(), 8);

        assert_eq!(level.entities()[0].state, EntityState::Solved);
        assert_eq!(level.tiles()[1].occupant, None);
        assert_eq!(level.mode(), LevelMode::Won);
    }

    #[test]
    fn test_bomb_fuse_blast() {
        let layout = LevelLayout::filled(8, 8, BlockType::Snow)
            .with_entity(EntityLayout::new(EntityType::Bomb, 5, 5).with_steps(3))
            .with_entity(EntityLayout::new(EntityType::Penguin, 5, 6));
        let mut level = level_from(layout);

        run(&mut level, StepInput::default(), 2);
        assert_eq!(level.entities()[0].state, EntityState::Still);
        assert_eq!(level.entities()[1].state, EntityState::Bopping);

        level.step(&StepInput::default());
        assert_eq!(level.entities()[0].state, EntityState::Exploding);
        assert_eq!(level.entities()[1].state, EntityState::Debris);
        assert_eq!(level.mode(), LevelMode::Lost);
    }

    #[test]
    fn test_empty_single_tile_level() {
        let level = level_from(LevelLayout::filled(1, 1, BlockType::Ice));
        assert_eq!(level.tick(), 0);
        assert_eq!(level.snapshot_count(), 0);
        assert!(level.entities().is_empty());
    }

    #[test]
    fn test_undo_restores_previous_position() {
        let mut level = level_from(LevelLayout::filled(4, 1, BlockType::Snow).with_entity(controlled_penguin(0, 0)));
        let start = level.entities().to_vec();
        let tiles = level.tiles().to_vec();

        level.step(&StepInput::moving(Direction::East));
        run(&mut level, StepInput::default(), 10);
        assert_ne!(level.entities()[0].pos, start[0].pos);

        level.restore().unwrap();
        assert_eq!(level.entities(), &start[..]);
        assert_eq!(level.tiles(), &tiles[..]);
    }

    #[test]
    fn test_robot_carries_rider() {
        let layout = LevelLayout::filled(5, 1, BlockType::Snow)
            .with_entity(EntityLayout::new(EntityType::Robot, 1, 0).with_heading(Direction::East))
            .with_entity(EntityLayout::new(EntityType::Penguin, 1, 0));
        let mut level = level_from(layout);
        run(&mut level, StepInput::default(), 20);

        let robot = &level.entities()[0];
        let rider = &level.entities()[1];
        assert!(robot.square > 1);
        assert_eq!(rider.standing_on, Some(EntityId(0)));
        assert_eq!(rider.pos, robot.pos);
        assert_eq!(rider.square, robot.square);
        assert!(level.check_invariants().is_empty());
    }

    #[test]
    fn test_walker_reverses_at_wall() {
        let layout = LevelLayout::filled(3, 1, BlockType::Snow)
            .with_entity(EntityLayout::new(EntityType::Robot, 1, 0).with_heading(Direction::East));
        let mut level = level_from(layout);
        run(&mut level, StepInput::default(), 40);
        assert_eq!(level.entities()[0].step, IVec2::new(-1, 0));
    }

    #[test]
    fn test_determinism() {
        let layout = LevelLayout::filled(6, 6, BlockType::Ice)
            .with_block(2, 2, BlockType::Snow)
            .with_entity(controlled_penguin(0, 0))
            .with_entity(EntityLayout::new(EntityType::Chest, 3, 0).containing(2))
            .with_entity(EntityLayout::new(EntityType::Fragment, 3, 0))
            .with_entity(EntityLayout::new(EntityType::Robot, 5, 5).with_heading(Direction::North));
        let inputs = [
            StepInput::moving(Direction::East),
            StepInput::default(),
            StepInput::moving(Direction::South),
            StepInput::default(),
        ];
        let mut a = level_from(layout.clone());
        let mut b = level_from(layout);
        for n in 0..60 {
            let input = inputs[n % inputs.len()];
            a.step(&input);
            b.step(&input);
        }
        assert_eq!(a.entities(), b.entities());
        assert_eq!(a.tiles(), b.tiles());
        assert_eq!(a.tick(), b.tick());
    }

    fn raised(block: BlockType, height: f32) -> TileLayout {
        TileLayout {
            height,
            ..TileLayout::new(block)
        }
    }

    #[test]
    fn test_flow_drifts_idle_penguin() {
        let current = TileLayout {
            flow: Vec2::new(1.0, 0.0),
            ..TileLayout::new(BlockType::Snow)
        };
        let layout = LevelLayout::filled(4, 1, BlockType::Snow)
            .with_tile(0, 0, current)
            .with_entity(EntityLayout::new(EntityType::Penguin, 0, 0));
        let mut level = level_from(layout);
        run(&mut level, StepInput::default(), 3);
        assert!(level.entities()[0].pos.x > 0.5);
        assert_eq!(level.entities()[0].square, 0);

        run(&mut level, StepInput::default(), 27);
        let peng = &level.entities()[0];
        assert_eq!(peng.square, 1);
        assert_eq!(peng.pos, Vec2::new(1.5, 0.5));
        assert!(peng.is_at_rest());
        assert_eq!(level.tiles()[1].occupant, Some(EntityId(0)));
    }

    #[test]
    fn test_raised_entity_falls_to_tile_height() {
        let layout = LevelLayout::filled(3, 1, BlockType::Snow).with_entity(EntityLayout::new(EntityType::Penguin, 2, 0));
        let mut level = level_from(layout);
        let pos = level.grid().center_of(0, level.cell_size());
        let mut barrel = Entity::new(EntityType::Barrel, 0, pos);
        barrel.height = 2.0;
        let id = level.spawn(barrel).unwrap();

        level.step(&StepInput::default());
        let fall_rate = level.settings().sim.fall_rate;
        let barrel = &level.entities()[id.index()];
        assert!((barrel.height - (2.0 - fall_rate)).abs() < 1e-5);
        assert!((barrel.potential - barrel.height).abs() < 1e-5);

        run(&mut level, StepInput::default(), 30);
        let barrel = &level.entities()[id.index()];
        assert_eq!(barrel.height, 0.0);
        assert_eq!(barrel.potential, 0.0);
        assert_eq!(barrel.square, 0);
    }

    #[test]
    fn test_climb_limited_to_step_up() {
        let layout = LevelLayout::filled(3, 1, BlockType::Snow)
            .with_tile(1, 0, raised(BlockType::Snow, 1.0))
            .with_entity(controlled_penguin(0, 0));
        let mut level = level_from(layout);
        level.step(&StepInput::moving(Direction::East));
        run(&mut level, StepInput::default(), 12);
        assert_eq!(level.entities()[0].square, 0);
        assert_eq!(level.entities()[0].pos, Vec2::new(0.5, 0.5));

        let layout = LevelLayout::filled(3, 1, BlockType::Snow)
            .with_tile(1, 0, raised(BlockType::Snow, STEP_UP - 0.1))
            .with_entity(controlled_penguin(0, 0));
        let mut level = level_from(layout);
        level.step(&StepInput::moving(Direction::East));
        run(&mut level, StepInput::default(), 12);
        let peng = &level.entities()[0];
        assert_eq!(peng.square, 1);
        assert!((peng.height - (STEP_UP - 0.1)).abs() < 1e-5);
    }

    #[test]
    fn test_climb_limit_scales_with_cell_size() {
        let step_onto_ledge = |cell_size: f32| {
            let mut layout = LevelLayout::filled(3, 1, BlockType::Snow)
                .with_tile(1, 0, raised(BlockType::Snow, 0.8))
                .with_entity(controlled_penguin(0, 0));
            layout.cell_size = cell_size;
            let mut level = level_from(layout);
            level.step(&StepInput::moving(Direction::East));
            run(&mut level, StepInput::default(), 12);
            level.entities()[0].square
        };
        assert_eq!(step_onto_ledge(1.0), 0);
        assert_eq!(step_onto_ledge(2.0), 1);
    }

    #[test]
    fn test_skis_carry_penguin_onwards() {
        let layout = LevelLayout::filled(5, 1, BlockType::Snow)
            .with_block(1, 0, BlockType::Skis)
            .with_entity(controlled_penguin(0, 0));
        let mut level = level_from(layout);
        level.step(&StepInput::moving(Direction::East));
        run(&mut level, StepInput::default(), 30);

        let peng = &level.entities()[0];
        assert_eq!(peng.square, 2);
        assert_eq!(peng.pos, Vec2::new(2.5, 0.5));
        assert!(peng.is_at_rest());
    }

    fn direction() -> impl Strategy<Value = Option<Direction>> {
        prop_oneof![
            Just(None),
            Just(Some(Direction::North)),
            Just(Some(Direction::South)),
            Just(Some(Direction::East)),
            Just(Some(Direction::West)),
        ]
    }

    proptest! {
        #[test]
        fn prop_grid_and_entities_stay_consistent(
            moves in proptest::collection::vec((direction(), any::<bool>()), 1..80)
        ) {
            let layout = LevelLayout::filled(6, 5, BlockType::Snow)
                .with_block(2, 1, BlockType::Ice)
                .with_block(3, 1, BlockType::Ice)
                .with_block(4, 3, BlockType::Sea)
                .with_block(1, 3, BlockType::Tile)
                .with_entity(controlled_penguin(0, 0))
                .with_entity(EntityLayout::new(EntityType::Penguin, 5, 0))
                .with_entity(EntityLayout::new(EntityType::Barrel, 2, 2))
                .with_entity(EntityLayout::new(EntityType::Tree, 3, 3))
                .with_entity(EntityLayout::new(EntityType::Robot, 0, 4).with_heading(Direction::East));
            let mut level = level_from(layout);
            for (dir, switch) in moves {
                level.step(&StepInput { direction: dir, switch_penguin: switch, pause: false });
                let problems = level.check_invariants();
                prop_assert!(problems.is_empty(), "{:?}", problems);
            }
        }

        #[test]
        fn prop_degradation_never_reverses(
            moves in proptest::collection::vec(direction(), 1..120)
        ) {
            let layout = LevelLayout::filled(3, 3, BlockType::Tile)
                .with_block(1, 1, BlockType::Fragile)
                .with_entity(controlled_penguin(0, 0));
            let mut level = level_from(layout);
            let mut ranks: Vec<u8> = level.tiles().iter().map(|t| t.block.wear_rank()).collect();
            for dir in moves {
                level.step(&StepInput { direction: dir, ..Default::default() });
                for (rank, tile) in ranks.iter_mut().zip(level.tiles()) {
                    prop_assert!(tile.block.wear_rank() >= *rank);
                    *rank = tile.block.wear_rank();
                }
            }
        }
    }
}
