//! Entity model
//!
//! Every movable or interactive object in a level is an `Entity` living in a
//! slot of the level's entity arena. References between entities and from
//! tiles to entities are plain slot indices (`EntityId`), so whole-array
//! copies stay valid without fixups.

use glam::{IVec2, Vec2};
use serde::{Deserialize, Serialize};

use crate::normalize_angle;

/// Index of an entity slot in the level arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub usize);

impl EntityId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Object types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityType {
    Penguin,
    Tree,
    Chest,
    /// Free slot
    #[default]
    Empty,
    Fragment,
    FishPail,
    Robot,
    Gun,
    Bullet,
    Bomb,
    Detonator,
    Fire,
    Spotlight,
    Snowball,
    Rocket,
    Explosion,
    Barrel,
    Camera,
    SouthPole,
    Hat,
    Laser,
    Mirror,
    Shield,
    RocketLauncher,
    ShieldBlock,
    BabyPenguin,
}

impl EntityType {
    /// State a freshly spawned entity of this type starts in
    pub fn initial_state(self) -> EntityState {
        match self {
            EntityType::Penguin | EntityType::BabyPenguin => EntityState::Bopping,
            EntityType::Robot => EntityState::Walking,
            EntityType::Laser => EntityState::Laser,
            EntityType::Explosion => EntityState::Exploding,
            _ => EntityState::Still,
        }
    }

    #[inline]
    pub fn is_penguin(self) -> bool {
        matches!(self, EntityType::Penguin | EntityType::BabyPenguin)
    }

    /// Projectiles and effects pass over every block type
    #[inline]
    pub fn is_flyer(self) -> bool {
        matches!(
            self,
            EntityType::Bullet | EntityType::Rocket | EntityType::Snowball | EntityType::Explosion
        )
    }

    #[inline]
    pub fn is_projectile(self) -> bool {
        matches!(self, EntityType::Bullet | EntityType::Rocket | EntityType::Snowball)
    }

    /// Explodes when its fuse or lifetime runs out or when it hits something
    #[inline]
    pub fn is_explosive(self) -> bool {
        matches!(self, EntityType::Bomb | EntityType::Rocket | EntityType::Bullet)
    }

    /// Can carry a rider standing on top of it
    #[inline]
    pub fn supports(self) -> bool {
        matches!(self, EntityType::Robot)
    }

    #[inline]
    pub fn can_ride(self) -> bool {
        self.is_penguin()
    }

    /// Slides away when bumped by a grounded mover
    #[inline]
    pub fn is_pushable(self) -> bool {
        matches!(self, EntityType::Chest | EntityType::Barrel | EntityType::Bomb)
    }

    /// Can be picked up into a penguin's `contents`
    #[inline]
    pub fn is_carryable(self) -> bool {
        matches!(self, EntityType::Fragment | EntityType::Hat)
    }

    #[inline]
    pub fn is_blast_immune(self) -> bool {
        matches!(self, EntityType::ShieldBlock | EntityType::SouthPole)
    }

    /// Stops a laser beam without being harmed
    #[inline]
    pub fn blocks_beam(self) -> bool {
        matches!(
            self,
            EntityType::Shield | EntityType::ShieldBlock | EntityType::Tree | EntityType::Laser
        )
    }
}

/// Object states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityState {
    Bopping,
    Walking,
    #[default]
    Still,
    Feeding,
    Controlled,
    Fed,
    /// Reached the exit
    Solved,
    /// Flying fragment released from a container
    Fragment,
    Smoke,
    Flash,
    Exploding,
    Debris,
    /// Laser emitter firing its beam
    Laser,
}

impl EntityState {
    /// Visual effect states that take no part in movement or occupancy
    #[inline]
    pub fn is_effect(self) -> bool {
        matches!(
            self,
            EntityState::Smoke | EntityState::Exploding | EntityState::Debris
        )
    }

    /// No further transitions leave these states
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, EntityState::Fed | EntityState::Solved)
    }
}

/// A level object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityType,
    pub state: EntityState,
    /// Tile index under `pos`
    pub square: usize,
    /// Continuous world position
    pub pos: Vec2,
    /// Elevation above the world floor
    pub height: f32,
    /// Discrete step direction (walk heading, aim of guns and lasers)
    pub step: IVec2,
    /// Continuous velocity in world units per tick
    pub vel: Vec2,
    /// Presentation heading (radians)
    pub facing: f32,
    /// Maximum presentation turn per tick (radians)
    pub turn_rate: f32,
    /// Presentation bounce accumulator
    pub bounce: u32,
    pub speed: f32,
    /// Per-type countdown: fuse, lifetime, feeding time or fire period
    pub steps: u32,
    pub size: u32,
    pub fish: u32,
    pub potential: f32,
    /// The one entity owned by this one
    pub contents: Option<EntityId>,
    /// Owner of this entity while it is contained
    pub inside: Option<EntityId>,
    /// Supporting entity beneath this one, recomputed every step
    pub standing_on: Option<EntityId>,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            kind: EntityType::Empty,
            state: EntityState::Still,
            square: 0,
            pos: Vec2::ZERO,
            height: 0.0,
            step: IVec2::ZERO,
            vel: Vec2::ZERO,
            facing: 0.0,
            turn_rate: 0.3,
            bounce: 0,
            speed: 0.0,
            steps: 0,
            size: 1,
            fish: 0,
            potential: 0.0,
            contents: None,
            inside: None,
            standing_on: None,
        }
    }
}

impl Entity {
    pub fn new(kind: EntityType, square: usize, pos: Vec2) -> Self {
        Self {
            kind,
            state: kind.initial_state(),
            square,
            pos,
            ..Default::default()
        }
    }

    /// Slot holds a live entity
    #[inline]
    pub fn is_active(&self) -> bool {
        self.kind != EntityType::Empty
    }

    #[inline]
    pub fn is_contained(&self) -> bool {
        self.inside.is_some()
    }

    /// Crosses any block type (projectiles, effects, flying fragments)
    #[inline]
    pub fn is_airborne(&self) -> bool {
        self.kind.is_flyer() || self.state == EntityState::Fragment
    }

    #[inline]
    pub fn is_at_rest(&self) -> bool {
        self.vel.length_squared() <= crate::consts::REST_EPSILON * crate::consts::REST_EPSILON
    }

    /// Whether this entity claims its tile as occupant
    pub fn occupies_tile(&self) -> bool {
        self.is_active()
            && !self.is_contained()
            && self.standing_on.is_none()
            && !self.is_airborne()
            && !self.state.is_effect()
            && self.state != EntityState::Solved
    }

    /// Takes part in the kinematics pass
    pub fn is_mobile(&self) -> bool {
        self.is_active()
            && !self.is_contained()
            && !self.state.is_effect()
            && !self.state.is_terminal()
    }

    /// Advance the presentation accumulators; never touches grid state
    pub fn animate(&mut self, bounce_period: u32) {
        if matches!(self.state, EntityState::Bopping | EntityState::Walking) {
            self.bounce = (self.bounce + 1) % bounce_period.max(1);
        }
        if !self.is_at_rest() {
            let target = self.vel.y.atan2(self.vel.x);
            let delta = normalize_angle(target - self.facing);
            let turn = delta.clamp(-self.turn_rate, self.turn_rate);
            self.facing = normalize_angle(self.facing + turn);
        }
    }
}

/// Unit grid direction for a control or walk heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Grid delta; north is towards row 0
    pub fn delta(self) -> IVec2 {
        match self {
            Direction::North => IVec2::new(0, -1),
            Direction::South => IVec2::new(0, 1),
            Direction::East => IVec2::new(1, 0),
            Direction::West => IVec2::new(-1, 0),
        }
    }

    pub fn from_delta(delta: IVec2) -> Option<Self> {
        match (delta.x, delta.y) {
            (0, -1) => Some(Direction::North),
            (0, 1) => Some(Direction::South),
            (1, 0) => Some(Direction::East),
            (-1, 0) => Some(Direction::West),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_states() {
        assert_eq!(EntityType::Penguin.initial_state(), EntityState::Bopping);
        assert_eq!(EntityType::Laser.initial_state(), EntityState::Laser);
        assert_eq!(EntityType::Chest.initial_state(), EntityState::Still);
    }

    #[test]
    fn test_occupancy_rules() {
        let mut peng = Entity::new(EntityType::Penguin, 0, Vec2::splat(0.5));
        assert!(peng.occupies_tile());
        peng.standing_on = Some(EntityId(3));
        assert!(!peng.occupies_tile());

        let bullet = Entity::new(EntityType::Bullet, 0, Vec2::splat(0.5));
        assert!(!bullet.occupies_tile());

        let mut frag = Entity::new(EntityType::Fragment, 0, Vec2::splat(0.5));
        frag.inside = Some(EntityId(0));
        assert!(!frag.occupies_tile());
        assert!(!frag.is_mobile());
    }

    #[test]
    fn test_animate_turns_towards_velocity() {
        let mut peng = Entity::new(EntityType::Penguin, 0, Vec2::ZERO);
        peng.turn_rate = 0.5;
        peng.vel = Vec2::new(0.0, 1.0);
        peng.animate(16);
        assert!((peng.facing - 0.5).abs() < 1e-6);
        assert_eq!(peng.bounce, 1);
        assert_eq!(peng.pos, Vec2::ZERO);
    }
}
