//! Grid collision queries
//!
//! Pure lookups over the grid and entity arena: whether a move may enter a
//! tile, which entities a blast reaches, and where a laser beam ends up. None
//! of these mutate state; the step and rule passes act on the answers.

use glam::{IVec2, Vec2};

use super::entity::{Entity, EntityId, EntityType};
use super::grid::Grid;

/// Result of probing a move towards a new position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Still inside the current tile
    Stay,
    /// Crosses into a free, passable tile
    Enter(usize),
    /// Climbs onto a supporting entity on that tile
    Mount(usize, EntityId),
    /// Grid edge or impassable block
    Wall,
    /// Tile held by another entity
    Bump(EntityId),
}

/// Decide what happens when entity `id` tries to move to `new_pos`
pub fn resolve_move(grid: &Grid, entities: &[Entity], id: EntityId, new_pos: Vec2, cell_size: f32) -> MoveOutcome {
    let entity = &entities[id.index()];
    if !grid.contains_pos(new_pos, cell_size) {
        return MoveOutcome::Wall;
    }
    let dest = grid.square_of(new_pos, cell_size);
    if dest == entity.square {
        return MoveOutcome::Stay;
    }
    let tile = &grid.tiles()[dest];
    let passable = if entity.is_airborne() {
        !tile.is_closed_door()
    } else {
        tile.is_passable_for(entity.kind, entity.height, cell_size)
    };
    if !passable {
        return MoveOutcome::Wall;
    }
    match tile.occupant {
        Some(other) if other != id => {
            let target = &entities[other.index()];
            if entity.kind.is_projectile() {
                MoveOutcome::Bump(other)
            } else if entity.is_airborne() {
                // Released fragments sail over whatever is below
                MoveOutcome::Enter(dest)
            } else if entity.kind.can_ride() && target.kind.supports() && entity.contents.is_none() {
                MoveOutcome::Mount(dest, other)
            } else {
                MoveOutcome::Bump(other)
            }
        }
        _ => MoveOutcome::Enter(dest),
    }
}

/// Whether moving from `old` to `new` reaches or passes `point` along the
/// direction of motion (starting exactly on it does not count)
pub fn passes_point(old: Vec2, new: Vec2, point: Vec2) -> bool {
    let motion = new - old;
    let len_sq = motion.length_squared();
    if len_sq <= f32::EPSILON {
        return false;
    }
    let t = (point - old).dot(motion) / len_sq;
    t > 1e-6 && t <= 1.0
}

/// Entities within a Chebyshev `radius` of `center`, in index order
///
/// Skips free slots, contained entities, effect states and `exclude`.
pub fn blast_targets(grid: &Grid, entities: &[Entity], center: usize, radius: i32, exclude: EntityId) -> Vec<EntityId> {
    let origin = grid.coords_of(center);
    entities
        .iter()
        .enumerate()
        .filter(|&(i, e)| {
            i != exclude.index()
                && e.is_active()
                && !e.is_contained()
                && !e.state.is_effect()
                && !e.state.is_terminal()
        })
        .filter(|(_, e)| {
            let at = grid.coords_of(e.square);
            (at.x - origin.x).abs() <= radius && (at.y - origin.y).abs() <= radius
        })
        .map(|(i, _)| EntityId(i))
        .collect()
}

/// Where a laser beam stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamHit {
    /// First vulnerable entity on the path
    Target(EntityId),
    /// Blocked by a tile or a beam-proof entity
    Stopped,
    /// Left the grid
    Edge,
}

/// Turn a beam travelling along `dir` off a mirror oriented by `mirror_step`
///
/// Mirrors whose step has matching signs (or none) act as `\`, the others
/// as `/`.
pub fn reflect_off_mirror(dir: IVec2, mirror_step: IVec2) -> IVec2 {
    if mirror_step.x * mirror_step.y >= 0 {
        IVec2::new(dir.y, dir.x)
    } else {
        IVec2::new(-dir.y, -dir.x)
    }
}

/// Follow a beam from `origin` along `dir` until it hits something
///
/// Returns the hit together with the tiles the beam crossed.
pub fn trace_beam(grid: &Grid, entities: &[Entity], origin: usize, dir: IVec2) -> (BeamHit, Vec<usize>) {
    let mut path = Vec::new();
    if dir == IVec2::ZERO {
        return (BeamHit::Stopped, path);
    }
    let mut dir = dir;
    let mut at = origin;
    // Mirror loops cannot outlast visiting every tile from every side
    for _ in 0..grid.len() * 4 {
        let Some(next) = grid.neighbor(at, dir) else {
            return (BeamHit::Edge, path);
        };
        let tile = &grid.tiles()[next];
        if !tile.passes_beam() {
            return (BeamHit::Stopped, path);
        }
        path.push(next);
        if let Some(id) = tile.occupant {
            let target = &entities[id.index()];
            if target.kind == EntityType::Mirror {
                dir = reflect_off_mirror(dir, target.step);
            } else if target.kind.blocks_beam() || target.kind.is_blast_immune() || target.state.is_terminal() {
                return (BeamHit::Stopped, path);
            } else {
                return (BeamHit::Target(id), path);
            }
        }
        at = next;
    }
    (BeamHit::Stopped, path)
}

/// First entity in the four neighbouring tiles matching `pred`
pub fn adjacent_partner(grid: &Grid, entities: &[Entity], square: usize, pred: impl Fn(&Entity) -> bool) -> Option<EntityId> {
    [IVec2::new(0, -1), IVec2::new(1, 0), IVec2::new(0, 1), IVec2::new(-1, 0)]
        .into_iter()
        .filter_map(|dir| grid.neighbor(square, dir))
        .filter_map(|n| grid.tiles()[n].occupant)
        .find(|id| pred(&entities[id.index()]))
}
