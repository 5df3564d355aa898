//! Interaction and transition rules
//!
//! After kinematics every live entity is matched, in index order, against
//! `RULES`. The first rule whose type, state and trigger all match fires its
//! effect; an entity transitions at most once per tick, except when a blast
//! or beam hits it. Pairs with no matching rule are left alone.
//!
//! Blasts and laser hits are dispatched immediately through the same table
//! using the `Blasted` and `Beamed` triggers.

use std::collections::HashSet;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::collision::{self, BeamHit};
use super::entity::{Entity, EntityId, EntityState, EntityType};
use super::error::{SimError, SimResult};
use super::grid::BlockType;
use super::state::{Level, SimEvent};
use super::tick::{Contact, StepContext};

/// Which entity types a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindMatch {
    Any,
    Is(EntityType),
    /// Penguin or baby penguin
    Penguins,
    Pushable,
    Carryable,
    /// Anything explosions can harm
    Vulnerable,
}

impl KindMatch {
    pub fn matches(self, kind: EntityType) -> bool {
        match self {
            KindMatch::Any => true,
            KindMatch::Is(k) => k == kind,
            KindMatch::Penguins => kind.is_penguin(),
            KindMatch::Pushable => kind.is_pushable(),
            KindMatch::Carryable => kind.is_carryable(),
            KindMatch::Vulnerable => !kind.is_blast_immune(),
        }
    }
}

/// Which states a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMatch {
    Any,
    Is(EntityState),
    /// Bopping, walking or player-controlled
    Roaming,
    /// Bopping or walking
    Idle,
    /// On the ground and not yet finished: no effect, terminal or flying state
    Live,
}

impl StateMatch {
    pub fn matches(self, state: EntityState) -> bool {
        match self {
            StateMatch::Any => true,
            StateMatch::Is(s) => s == state,
            StateMatch::Roaming => matches!(
                state,
                EntityState::Bopping | EntityState::Walking | EntityState::Controlled
            ),
            StateMatch::Idle => matches!(state, EntityState::Bopping | EntityState::Walking),
            StateMatch::Live => {
                !state.is_effect() && !state.is_terminal() && state != EntityState::Fragment
            }
        }
    }
}

/// What sets a rule off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Standing on a tile of this block type
    OnBlock(BlockType),
    /// Crossed into a tile that had this block type this tick
    Entered(BlockType),
    /// Ran into an entity matching this
    Bumped(KindMatch),
    BumpedWall,
    /// The `steps` counter reached zero this tick
    Expired,
    /// A fish pail with fish in one of the four neighbouring tiles
    NextToFish,
    Always,
    /// Inside an explosion's radius
    Blasted,
    /// Hit by a laser beam
    Beamed,
}

/// What a rule does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Reach the exit and leave the grid
    Solve,
    /// Fall into the sea
    Sink,
    /// Register weight on the tile just entered
    Wear,
    ToggleDoors,
    CatchFish,
    Explode,
    /// Break open, throwing out anything inside, then turn to debris
    BurstOpen,
    /// Turn to debris
    Wreck,
    /// Explosion burns down to debris
    Settle,
    /// Leave the level
    Vanish,
    /// Launch a projectile along `step`
    Shoot,
    /// Ready the weapon for its next shot
    Rearm,
    StartFeeding,
    FinishFeeding,
    /// Open a chest that holds something, otherwise push it
    OpenOrPush,
    Push,
    PickUp,
    /// Hand a carried fragment to the pole
    PlaceFragment,
    /// Light every bomb
    Detonate,
    Burn,
    Extinguish,
    /// Burst into a puff of smoke
    Puff,
    /// Walk back the other way
    Reverse,
    EmitBeam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub kind: KindMatch,
    pub state: StateMatch,
    pub trigger: Trigger,
    pub effect: Effect,
}

const fn rule(kind: KindMatch, state: StateMatch, trigger: Trigger, effect: Effect) -> Rule {
    Rule {
        kind,
        state,
        trigger,
        effect,
    }
}

use Effect as E;
use KindMatch as K;
use StateMatch as S;
use Trigger as T;

/// Transition table, in priority order
pub const RULES: &[Rule] = &[
    // Counters
    rule(K::Any, S::Is(EntityState::Exploding), T::Expired, E::Settle),
    rule(K::Any, S::Is(EntityState::Debris), T::Expired, E::Vanish),
    rule(K::Any, S::Is(EntityState::Smoke), T::Expired, E::Vanish),
    rule(K::Any, S::Is(EntityState::Flash), T::Expired, E::Rearm),
    rule(K::Any, S::Is(EntityState::Feeding), T::Expired, E::FinishFeeding),
    rule(K::Is(EntityType::Bomb), S::Is(EntityState::Still), T::Expired, E::Explode),
    rule(K::Is(EntityType::Bullet), S::Is(EntityState::Still), T::Expired, E::Explode),
    rule(K::Is(EntityType::Rocket), S::Is(EntityState::Still), T::Expired, E::Explode),
    rule(K::Is(EntityType::Snowball), S::Is(EntityState::Still), T::Expired, E::Puff),
    rule(K::Is(EntityType::Gun), S::Is(EntityState::Still), T::Expired, E::Shoot),
    rule(K::Is(EntityType::RocketLauncher), S::Is(EntityState::Still), T::Expired, E::Shoot),
    // Projectile hits
    rule(K::Is(EntityType::Bullet), S::Is(EntityState::Still), T::Bumped(K::Any), E::Explode),
    rule(K::Is(EntityType::Rocket), S::Is(EntityState::Still), T::Bumped(K::Any), E::Explode),
    rule(K::Is(EntityType::Bullet), S::Is(EntityState::Still), T::BumpedWall, E::Explode),
    rule(K::Is(EntityType::Rocket), S::Is(EntityState::Still), T::BumpedWall, E::Explode),
    rule(
        K::Is(EntityType::Snowball),
        S::Is(EntityState::Still),
        T::Bumped(K::Is(EntityType::Fire)),
        E::Extinguish,
    ),
    rule(K::Is(EntityType::Snowball), S::Is(EntityState::Still), T::Bumped(K::Any), E::Puff),
    rule(K::Is(EntityType::Snowball), S::Is(EntityState::Still), T::BumpedWall, E::Puff),
    // Tiles
    rule(K::Penguins, S::Roaming, T::OnBlock(BlockType::Exit), E::Solve),
    rule(K::Any, S::Live, T::OnBlock(BlockType::Sea), E::Sink),
    rule(K::Any, S::Live, T::Entered(BlockType::Tile), E::Wear),
    rule(K::Any, S::Live, T::Entered(BlockType::Fragile), E::Wear),
    rule(K::Any, S::Live, T::Entered(BlockType::Cracked), E::Wear),
    rule(K::Any, S::Live, T::Entered(BlockType::Button), E::ToggleDoors),
    rule(K::Penguins, S::Roaming, T::Entered(BlockType::FishingRod), E::CatchFish),
    // Collisions
    rule(K::Penguins, S::Roaming, T::Bumped(K::Is(EntityType::Fire)), E::Burn),
    rule(K::Penguins, S::Roaming, T::Bumped(K::Is(EntityType::Detonator)), E::Detonate),
    rule(K::Penguins, S::Roaming, T::Bumped(K::Is(EntityType::SouthPole)), E::PlaceFragment),
    rule(K::Penguins, S::Roaming, T::Bumped(K::Carryable), E::PickUp),
    rule(K::Penguins, S::Roaming, T::Bumped(K::Is(EntityType::Chest)), E::OpenOrPush),
    rule(K::Any, S::Live, T::Bumped(K::Pushable), E::Push),
    rule(K::Any, S::Is(EntityState::Walking), T::Bumped(K::Any), E::Reverse),
    rule(K::Any, S::Is(EntityState::Walking), T::BumpedWall, E::Reverse),
    // Neighbours
    rule(K::Penguins, S::Idle, T::NextToFish, E::StartFeeding),
    // Emitters
    rule(K::Is(EntityType::Laser), S::Is(EntityState::Laser), T::Always, E::EmitBeam),
    // Explosions
    rule(K::Is(EntityType::Bomb), S::Live, T::Blasted, E::Explode),
    rule(K::Is(EntityType::Barrel), S::Live, T::Blasted, E::Explode),
    rule(K::Is(EntityType::Bullet), S::Live, T::Blasted, E::Explode),
    rule(K::Is(EntityType::Rocket), S::Live, T::Blasted, E::Explode),
    rule(K::Is(EntityType::Chest), S::Live, T::Blasted, E::BurstOpen),
    rule(K::Vulnerable, S::Live, T::Blasted, E::Wreck),
    // Laser hits
    rule(K::Is(EntityType::Bomb), S::Live, T::Beamed, E::Explode),
    rule(K::Is(EntityType::Barrel), S::Live, T::Beamed, E::Explode),
    rule(K::Is(EntityType::Chest), S::Live, T::Beamed, E::BurstOpen),
    rule(K::Vulnerable, S::Live, T::Beamed, E::Wreck),
];

/// First rule for `(kind, state)` with the given trigger
pub fn lookup(kind: EntityType, state: EntityState, trigger: Trigger) -> Option<&'static Rule> {
    RULES
        .iter()
        .find(|r| r.trigger == trigger && r.kind.matches(kind) && r.state.matches(state))
}

/// Details of what set a rule off
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cause {
    Plain,
    Tile(usize),
    Contact { target: EntityId, vel: Vec2 },
    Partner(EntityId),
}

/// Bookkeeping for one rule pass
struct RulePass<'a> {
    ctx: &'a StepContext,
    expired: HashSet<EntityId>,
    touched: HashSet<EntityId>,
}

impl RulePass<'_> {
    fn triggered(&self, level: &Level, id: EntityId, trigger: Trigger) -> Option<Cause> {
        let entity = &level.entities[id.index()];
        match trigger {
            Trigger::Always => Some(Cause::Plain),
            Trigger::Expired => self.expired.contains(&id).then_some(Cause::Plain),
            Trigger::OnBlock(block) => {
                let grounded = !entity.is_airborne() && entity.standing_on.is_none();
                (grounded && level.grid.tiles()[entity.square].block == block).then_some(Cause::Tile(entity.square))
            }
            Trigger::Entered(block) => self
                .ctx
                .entries
                .iter()
                .find(|e| e.id == id && e.block == block)
                .map(|e| Cause::Tile(e.square)),
            Trigger::Bumped(kind) => self.ctx.contacts.iter().find_map(|c| match *c {
                Contact::Entity { mover, target, vel }
                    if mover == id && level.entities[target.index()].is_active()
                        && kind.matches(level.entities[target.index()].kind) =>
                {
                    Some(Cause::Contact { target, vel })
                }
                _ => None,
            }),
            Trigger::BumpedWall => self
                .ctx
                .contacts
                .contains(&Contact::Wall { mover: id })
                .then_some(Cause::Plain),
            Trigger::NextToFish => collision::adjacent_partner(&level.grid, &level.entities, entity.square, |p| {
                p.kind == EntityType::FishPail && p.fish > 0 && p.is_active()
            })
            .map(Cause::Partner),
            Trigger::Blasted | Trigger::Beamed => None,
        }
    }

    fn first_match(&self, level: &Level, id: EntityId) -> Option<(Effect, Cause)> {
        let entity = &level.entities[id.index()];
        RULES
            .iter()
            .filter(|r| r.kind.matches(entity.kind) && r.state.matches(entity.state))
            .find_map(|r| self.triggered(level, id, r.trigger).map(|cause| (r.effect, cause)))
    }
}

/// Run the rule pass for one tick
pub fn apply(level: &mut Level, ctx: &StepContext) {
    let mut pass = RulePass {
        ctx,
        expired: count_down(level),
        touched: HashSet::new(),
    };
    // Entities spawned during the pass act from the next tick on
    let count = level.entities.len();
    for i in 0..count {
        let id = EntityId(i);
        let entity = &level.entities[i];
        if pass.touched.contains(&id) || !entity.is_active() || entity.is_contained() {
            continue;
        }
        let Some((effect, cause)) = pass.first_match(level, id) else {
            continue;
        };
        pass.touched.insert(id);
        if let Err(err) = fire(level, &mut pass, id, effect, cause) {
            log::warn!("Rule {effect:?} on entity {i} failed: {err}");
        }
    }
}

/// Decrement every running counter; returns the entities whose counter
/// reached zero
fn count_down(level: &mut Level) -> HashSet<EntityId> {
    let mut expired = HashSet::new();
    for (i, entity) in level.entities.iter_mut().enumerate() {
        if !entity.is_active() || entity.is_contained() || entity.steps == 0 {
            continue;
        }
        entity.steps -= 1;
        if entity.steps == 0 {
            expired.insert(EntityId(i));
        }
    }
    expired
}

/// Dispatch an immediate stimulus (blast or beam) through the table
fn strike(level: &mut Level, pass: &mut RulePass, id: EntityId, trigger: Trigger) {
    let entity = &level.entities[id.index()];
    let Some(rule) = lookup(entity.kind, entity.state, trigger) else {
        return;
    };
    pass.touched.insert(id);
    if let Err(err) = fire(level, pass, id, rule.effect, Cause::Plain) {
        log::warn!("{trigger:?} on entity {} failed: {err}", id.index());
    }
}

fn fire(level: &mut Level, pass: &mut RulePass, id: EntityId, effect: Effect, cause: Cause) -> SimResult<()> {
    let entity = level.entity(id)?;
    if entity.state.is_terminal() {
        return Err(SimError::InvalidTransition {
            kind: entity.kind,
            state: entity.state,
        });
    }
    log::trace!("Entity {} {:?}/{:?} -> {effect:?}", id.index(), entity.kind, entity.state);

    match effect {
        Effect::Solve => solve(level, id),
        Effect::Sink => wreck(level, id),
        Effect::Wear => {
            let Cause::Tile(square) = cause else { return Ok(()) };
            let wear = level.settings.sim.wear();
            if let Some(block) = level.grid.degrade(square, wear)? {
                log::debug!("Tile {square} degraded to {block:?}");
                level.events.push(SimEvent::TileDegraded { square, block });
                if block == BlockType::Sea {
                    wreck(level, id)?;
                }
            }
            Ok(())
        }
        Effect::ToggleDoors => {
            let toggled = level.grid.toggle_doors();
            log::debug!("Button toggled {toggled} doors");
            level.events.push(SimEvent::DoorsToggled);
            Ok(())
        }
        Effect::CatchFish => {
            let Cause::Tile(square) = cause else { return Ok(()) };
            level.grid.tile_mut(square)?.block = BlockType::Snow;
            level.entities[id.index()].fish += 1;
            Ok(())
        }
        Effect::Explode => {
            if let Cause::Contact { target, .. } = cause {
                move_onto(level, id, target);
            }
            explode(level, pass, id)
        }
        Effect::BurstOpen => {
            let dir = scatter_direction(level, id);
            release_contents(level, id, dir);
            wreck(level, id)
        }
        Effect::Wreck => wreck(level, id),
        Effect::Settle => {
            let ticks = level.settings.sim.debris_ticks;
            become_effect(level, id, EntityState::Debris, ticks);
            Ok(())
        }
        Effect::Vanish => level.remove(id),
        Effect::Shoot => shoot(level, id),
        Effect::Rearm => {
            let period = level.settings.sim.gun_period;
            let entity = &mut level.entities[id.index()];
            entity.state = EntityState::Still;
            entity.steps = period;
            Ok(())
        }
        Effect::StartFeeding => {
            let Cause::Partner(pail) = cause else { return Ok(()) };
            let ticks = level.settings.sim.feed_ticks;
            level.entities[pail.index()].fish -= 1;
            let entity = &mut level.entities[id.index()];
            entity.fish += 1;
            entity.state = EntityState::Feeding;
            entity.steps = ticks.max(1);
            entity.vel = Vec2::ZERO;
            level.events.push(SimEvent::StartedFeeding { id, pail });
            Ok(())
        }
        Effect::FinishFeeding => {
            level.entities[id.index()].state = EntityState::Fed;
            level.events.push(SimEvent::Fed { id });
            Ok(())
        }
        Effect::OpenOrPush => {
            let Cause::Contact { target, vel } = cause else { return Ok(()) };
            if level.entities[target.index()].contents.is_some() {
                let away = level.entities[target.index()].pos - level.entities[id.index()].pos;
                release_contents(level, target, away.normalize_or_zero());
                Ok(())
            } else {
                push(level, target, vel);
                Ok(())
            }
        }
        Effect::Push => {
            let Cause::Contact { target, vel } = cause else { return Ok(()) };
            push(level, target, vel);
            Ok(())
        }
        Effect::PickUp => {
            let Cause::Contact { target, .. } = cause else { return Ok(()) };
            pick_up(level, id, target);
            Ok(())
        }
        Effect::PlaceFragment => {
            let Cause::Contact { target, .. } = cause else { return Ok(()) };
            place_fragment(level, id, target)
        }
        Effect::Detonate => {
            let mut lit = 0;
            for bomb in level
                .entities
                .iter_mut()
                .filter(|e| e.kind == EntityType::Bomb && e.state == EntityState::Still && !e.is_contained())
            {
                bomb.steps = 1;
                lit += 1;
            }
            log::debug!("Detonator lit {lit} bombs");
            Ok(())
        }
        Effect::Burn => wreck(level, id),
        Effect::Extinguish => {
            let Cause::Contact { target, .. } = cause else { return Ok(()) };
            let ticks = level.settings.sim.smoke_ticks;
            pass.touched.insert(target);
            become_effect(level, target, EntityState::Smoke, ticks);
            become_effect(level, id, EntityState::Smoke, ticks);
            Ok(())
        }
        Effect::Puff => {
            let ticks = level.settings.sim.smoke_ticks;
            become_effect(level, id, EntityState::Smoke, ticks);
            Ok(())
        }
        Effect::Reverse => {
            let entity = &mut level.entities[id.index()];
            entity.step = -entity.step;
            Ok(())
        }
        Effect::EmitBeam => {
            let (square, dir) = {
                let e = &level.entities[id.index()];
                (e.square, e.step)
            };
            let (hit, _) = collision::trace_beam(&level.grid, &level.entities, square, dir);
            if let BeamHit::Target(target) = hit {
                log::debug!("Laser {} hits entity {}", id.index(), target.index());
                strike(level, pass, target, Trigger::Beamed);
            }
            Ok(())
        }
    }
}

/// Put an entity into an effect state that no longer holds a tile
fn become_effect(level: &mut Level, id: EntityId, state: EntityState, ticks: u32) {
    let entity = &mut level.entities[id.index()];
    entity.state = state;
    entity.steps = ticks.max(1);
    entity.vel = Vec2::ZERO;
    entity.standing_on = None;
    let square = entity.square;
    level.grid.release(square, id);
}

fn solve(level: &mut Level, id: EntityId) -> SimResult<()> {
    let was_controlled = level.entity(id)?.state == EntityState::Controlled;
    let entity = &mut level.entities[id.index()];
    entity.state = EntityState::Solved;
    entity.vel = Vec2::ZERO;
    let square = entity.square;
    level.grid.release(square, id);
    level.events.push(SimEvent::Solved { id });
    log::info!("Penguin {} reached the exit", id.index());
    if was_controlled {
        level.switch_control();
    }
    Ok(())
}

/// Turn an entity into debris, throwing out whatever it held
fn wreck(level: &mut Level, id: EntityId) -> SimResult<()> {
    if level.entity(id)?.contents.is_some() {
        let dir = scatter_direction(level, id);
        release_contents(level, id, dir);
    }
    let ticks = level.settings.sim.debris_ticks;
    become_effect(level, id, EntityState::Debris, ticks);
    level.events.push(SimEvent::Destroyed { id });
    Ok(())
}

/// Become an explosion in place and hit everything in range
fn explode(level: &mut Level, pass: &mut RulePass, id: EntityId) -> SimResult<()> {
    if level.entity(id)?.contents.is_some() {
        let dir = scatter_direction(level, id);
        release_contents(level, id, dir);
    }
    let ticks = level.settings.sim.explosion_ticks;
    become_effect(level, id, EntityState::Exploding, ticks);
    level.entities[id.index()].kind = EntityType::Explosion;
    level.events.push(SimEvent::Exploded { id });

    let center = level.entities[id.index()].square;
    let radius = level.settings.sim.blast_radius;
    let targets = collision::blast_targets(&level.grid, &level.entities, center, radius, id);
    log::debug!("Explosion at tile {center} reaches {} entities", targets.len());
    for target in targets {
        // Chained explosions may already have consumed this one
        let entity = &level.entities[target.index()];
        if !entity.is_active() || entity.state.is_effect() {
            continue;
        }
        strike(level, pass, target, Trigger::Blasted);
    }
    Ok(())
}

/// Move a projectile onto the tile of the entity it hit
fn move_onto(level: &mut Level, id: EntityId, target: EntityId) {
    let (pos, square) = {
        let t = &level.entities[target.index()];
        (t.pos, t.square)
    };
    let entity = &mut level.entities[id.index()];
    entity.pos = pos;
    entity.square = square;
}

/// Seeded direction for debris and blast scatter
fn scatter_direction(level: &Level, id: EntityId) -> Vec2 {
    let seed = level.settings.sim.seed ^ level.tick.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ id.index() as u64;
    let mut rng = Pcg32::seed_from_u64(seed);
    let angle: f32 = rng.random_range(0.0..std::f32::consts::TAU);
    Vec2::from_angle(angle)
}

/// Let the contained entity fly out of `owner` along `dir`
fn release_contents(level: &mut Level, owner: EntityId, dir: Vec2) {
    let Some(held) = level.entities[owner.index()].contents.take() else {
        return;
    };
    let cell = level.cell_size;
    let sim = &level.settings.sim;
    let (pos, square) = {
        let o = &level.entities[owner.index()];
        (o.pos, o.square)
    };
    let tile_height = level.grid.tiles()[square].height;
    let inner = &mut level.entities[held.index()];
    inner.inside = None;
    inner.state = EntityState::Fragment;
    inner.pos = pos;
    inner.square = square;
    inner.vel = dir * sim.fragment_launch_speed * cell;
    inner.potential = sim.fragment_launch_potential * cell;
    inner.height = tile_height + inner.potential;
    level.events.push(SimEvent::ChestOpened {
        chest: owner,
        released: held,
    });
    log::debug!("Entity {} released entity {}", owner.index(), held.index());
}

/// Hand the mover's velocity to a resting pushable entity
fn push(level: &mut Level, target: EntityId, vel: Vec2) {
    let entity = &mut level.entities[target.index()];
    if !entity.kind.is_pushable() || !entity.is_at_rest() || entity.is_contained() {
        return;
    }
    entity.vel = vel;
}

fn pick_up(level: &mut Level, by: EntityId, item: EntityId) {
    let target = &level.entities[item.index()];
    if level.entities[by.index()].contents.is_some() || target.state != EntityState::Still || target.is_contained() {
        return;
    }
    let square = target.square;
    level.grid.release(square, item);

    let (pos, carrier_square, height) = {
        let b = &level.entities[by.index()];
        (b.pos, b.square, b.height)
    };
    let inner = &mut level.entities[item.index()];
    inner.inside = Some(by);
    inner.vel = Vec2::ZERO;
    inner.pos = pos;
    inner.square = carrier_square;
    inner.height = height;
    level.entities[by.index()].contents = Some(item);
    level.events.push(SimEvent::PickedUp { by, item });
}

fn place_fragment(level: &mut Level, by: EntityId, pole: EntityId) -> SimResult<()> {
    let Some(held) = level.entities[by.index()].contents else {
        return Ok(());
    };
    if level.entity(held)?.kind != EntityType::Fragment {
        return Ok(());
    }
    level.remove(held)?;
    level.entities[pole.index()].size += 1;
    log::info!(
        "Fragment placed on the pole ({} so far)",
        level.entities[pole.index()].size - 1
    );
    level.events.push(SimEvent::Checkpoint { by });
    Ok(())
}

/// Fire a bullet or rocket from the weapon's own tile along its `step`
fn shoot(level: &mut Level, id: EntityId) -> SimResult<()> {
    let (kind, square, step) = {
        let e = level.entity(id)?;
        let kind = if e.kind == EntityType::RocketLauncher {
            EntityType::Rocket
        } else {
            EntityType::Bullet
        };
        (kind, e.square, e.step)
    };
    let cell = level.cell_size;
    let sim = &level.settings.sim;
    let mut projectile = Entity::new(kind, square, level.grid.center_of(square, cell));
    projectile.step = step;
    projectile.speed = sim.speed_for(kind);
    projectile.steps = sim.initial_steps(kind);
    projectile.turn_rate = sim.turn_rate;
    projectile.height = level.entities[id.index()].height;
    projectile.vel = step.as_vec2() * projectile.speed * cell;
    projectile.facing = (step.y as f32).atan2(step.x as f32);

    {
        let weapon = &mut level.entities[id.index()];
        weapon.state = EntityState::Flash;
        weapon.steps = 1;
    }

    if step == glam::IVec2::ZERO {
        log::debug!("Weapon {} has no aim, not firing", id.index());
        return Ok(());
    }
    match level.spawn(projectile) {
        Ok(shot) => {
            level.events.push(SimEvent::Fired { by: id, projectile: shot });
            Ok(())
        }
        Err(err) => {
            log::warn!("Weapon {} could not fire: {err}", id.index());
            level.events.push(SimEvent::SpawnRejected { kind });
            Ok(())
        }
    }
}
