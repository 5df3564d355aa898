//! Instance generation from level state

use super::vertex::{ObjectInstance, TileInstance, Vertex, colors};
use crate::sim::view::world_point;
use crate::sim::{BlockType, Entity, EntityState, EntityType, Level};

fn block_color(block: BlockType) -> [f32; 4] {
    match block {
        BlockType::Ice => colors::ICE,
        BlockType::Cracked => colors::CRACKED,
        BlockType::Sea => colors::SEA,
        BlockType::Snow => colors::SNOW,
        BlockType::Exit => colors::EXIT,
        BlockType::Door => colors::DOOR,
        BlockType::FishingRod => colors::FISHING_ROD,
        BlockType::Skis => colors::SKIS,
        BlockType::Tile => colors::TILE,
        BlockType::Pole => colors::POLE,
        BlockType::Button => colors::BUTTON,
        BlockType::Fragile => colors::FRAGILE,
    }
}

fn object_color(kind: EntityType) -> [f32; 4] {
    match kind {
        EntityType::Penguin => colors::PENGUIN,
        EntityType::BabyPenguin => colors::BABY_PENGUIN,
        EntityType::Bomb
        | EntityType::Fire
        | EntityType::Bullet
        | EntityType::Rocket
        | EntityType::Barrel
        | EntityType::Explosion => colors::HAZARD,
        EntityType::Robot
        | EntityType::Gun
        | EntityType::RocketLauncher
        | EntityType::Laser
        | EntityType::Mirror
        | EntityType::Shield
        | EntityType::ShieldBlock
        | EntityType::Camera
        | EntityType::Spotlight
        | EntityType::Detonator => colors::MACHINE,
        EntityType::Fragment | EntityType::Hat | EntityType::SouthPole => colors::TREASURE,
        _ => colors::PROP,
    }
}

/// Effect colour, fading out as the counter runs down
fn effect_color(entity: &Entity, duration: u32) -> [f32; 4] {
    let mut color = match entity.state {
        EntityState::Exploding => colors::EXPLOSION,
        EntityState::Debris => colors::DEBRIS,
        EntityState::Smoke => colors::SMOKE,
        EntityState::Flash => colors::FLASH,
        _ => object_color(entity.kind),
    };
    if duration > 0 && entity.state.is_effect() {
        color[3] *= (entity.steps as f32 / duration as f32).clamp(0.0, 1.0);
    }
    color
}

fn instance(entity: &Entity, color: [f32; 4], bounce_period: u32) -> ObjectInstance {
    ObjectInstance {
        position: world_point(entity.pos, entity.height).to_array(),
        facing: entity.facing,
        color,
        bounce: entity.bounce as f32 / bounce_period.max(1) as f32,
        scale: entity.size as f32,
        kind: entity.kind as u32,
        state: entity.state as u32,
    }
}

/// Two triangles covering one cell, origin at the top-left corner
pub fn unit_quad(cell_size: f32, color: [f32; 4]) -> [Vertex; 6] {
    let s = cell_size;
    [
        Vertex::new(0.0, 0.0, color),
        Vertex::new(s, 0.0, color),
        Vertex::new(0.0, s, color),
        Vertex::new(0.0, s, color),
        Vertex::new(s, 0.0, color),
        Vertex::new(s, s, color),
    ]
}

/// One instance per tile, row-major
pub fn tile_instances(level: &Level) -> Vec<TileInstance> {
    let grid = level.grid();
    let cell = level.cell_size();
    grid.tiles()
        .iter()
        .enumerate()
        .map(|(index, tile)| {
            let at = grid.coords_of(index).as_vec2() * cell;
            let mut flags = 0;
            if tile.open {
                flags |= TileInstance::FLAG_OPEN;
            }
            if tile.block.is_slippery() {
                flags |= TileInstance::FLAG_SLIPPERY;
            }
            TileInstance {
                offset: at.to_array(),
                height: tile.height,
                flags,
                color: block_color(tile.block),
            }
        })
        .collect()
}

/// Solid objects: live, visible and not part of the effects pass
pub fn object_instances(level: &Level) -> Vec<ObjectInstance> {
    let period = level.settings().sim.bounce_period;
    level
        .active_entities()
        .filter(|(_, e)| {
            !e.is_contained()
                && !e.state.is_effect()
                && !matches!(e.state, EntityState::Fragment | EntityState::Flash | EntityState::Solved)
        })
        .map(|(_, e)| instance(e, object_color(e.kind), period))
        .collect()
}

/// Flying fragments, flashes, explosions, debris and smoke
pub fn fragment_instances(level: &Level) -> Vec<ObjectInstance> {
    let sim = &level.settings().sim;
    level
        .fragments()
        .map(|(_, e)| {
            let duration = match e.state {
                EntityState::Exploding => sim.explosion_ticks,
                EntityState::Debris => sim.debris_ticks,
                EntityState::Smoke => sim.smoke_ticks,
                _ => 0,
            };
            instance(e, effect_color(e, duration), sim.bounce_period)
        })
        .collect()
}
