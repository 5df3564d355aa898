//! Simulation settings and undo policy
//!
//! Tuning lives here instead of in constants so levels can be replayed with a
//! recorded configuration. Settings are plain serde structs; a JSON file can
//! override any subset of the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::grid::WearThresholds;
use crate::sim::EntityType;

/// When the level pushes undo snapshots on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UndoPolicy {
    /// Before every move the player commits, plus checkpoints
    #[default]
    EveryMove,
    /// Only on checkpoint events (fragment placement) and explicit calls
    CheckpointsOnly,
    /// Every `snapshot_interval` ticks, plus checkpoints
    Periodic,
}

impl UndoPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UndoPolicy::EveryMove => "EveryMove",
            UndoPolicy::CheckpointsOnly => "CheckpointsOnly",
            UndoPolicy::Periodic => "Periodic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "everymove" | "every-move" | "move" => Some(UndoPolicy::EveryMove),
            "checkpointsonly" | "checkpoints" => Some(UndoPolicy::CheckpointsOnly),
            "periodic" => Some(UndoPolicy::Periodic),
            _ => None,
        }
    }
}

/// Physics and rule tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Seed for debris and fragment scatter
    pub seed: u64,

    // === Movement (cells per tick, always below one) ===
    pub walk_speed: f32,
    pub slide_speed: f32,
    pub robot_speed: f32,
    pub bullet_speed: f32,
    pub rocket_speed: f32,
    pub max_speed: f32,
    /// Velocity gained per tick from a tile's flow vector
    pub flow_gain: f32,
    /// Height lost per tick while above the tile
    pub fall_rate: f32,
    pub gravity: f32,

    // === Tile wear ===
    pub tile_crack_visits: u8,
    pub fragile_crack_visits: u8,
    pub cracked_break_visits: u8,

    // === Counters (ticks) ===
    /// Zero leaves bombs unlit until a detonator or blast sets them off
    pub bomb_fuse: u32,
    pub bullet_lifetime: u32,
    pub rocket_lifetime: u32,
    pub explosion_ticks: u32,
    pub debris_ticks: u32,
    pub smoke_ticks: u32,
    pub feed_ticks: u32,
    pub gun_period: u32,

    /// Chebyshev radius of an explosion in tiles
    pub blast_radius: i32,

    // === Released fragments ===
    pub fragment_launch_speed: f32,
    pub fragment_launch_potential: f32,
    pub fragment_drag: f32,
    pub potential_decay: f32,

    // === Presentation ===
    pub bounce_period: u32,
    pub turn_rate: f32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            seed: 0x5EED,

            walk_speed: 0.125,
            slide_speed: 0.25,
            robot_speed: 0.0625,
            bullet_speed: 0.5,
            rocket_speed: 0.25,
            max_speed: 0.5,
            flow_gain: 0.02,
            fall_rate: 0.1,
            gravity: 1.0,

            tile_crack_visits: 3,
            fragile_crack_visits: 1,
            cracked_break_visits: 2,

            bomb_fuse: 0,
            bullet_lifetime: 24,
            rocket_lifetime: 48,
            explosion_ticks: 6,
            debris_ticks: 12,
            smoke_ticks: 4,
            feed_ticks: 8,
            gun_period: 40,

            blast_radius: 1,

            fragment_launch_speed: 0.3,
            fragment_launch_potential: 1.0,
            fragment_drag: 0.85,
            potential_decay: 0.1,

            bounce_period: 16,
            turn_rate: 0.3,
        }
    }
}

impl SimSettings {
    pub fn wear(&self) -> WearThresholds {
        WearThresholds {
            tile: self.tile_crack_visits,
            fragile: self.fragile_crack_visits,
            cracked: self.cracked_break_visits,
        }
    }

    /// Cruise speed for self-propelled types
    pub fn speed_for(&self, kind: EntityType) -> f32 {
        match kind {
            EntityType::Penguin | EntityType::BabyPenguin => self.walk_speed,
            EntityType::Robot => self.robot_speed,
            EntityType::Bullet => self.bullet_speed,
            EntityType::Rocket => self.rocket_speed,
            EntityType::Snowball => self.slide_speed,
            _ => 0.0,
        }
    }

    /// Starting countdown for types that use one
    pub fn initial_steps(&self, kind: EntityType) -> u32 {
        match kind {
            EntityType::Bomb => self.bomb_fuse,
            EntityType::Bullet | EntityType::Snowball => self.bullet_lifetime,
            EntityType::Rocket => self.rocket_lifetime,
            EntityType::Gun | EntityType::RocketLauncher => self.gun_period,
            EntityType::Explosion => self.explosion_ticks,
            _ => 0,
        }
    }
}

/// Camera tracking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Horizontal distance from the tracked entity to the eye
    pub eye_distance: f32,
    pub eye_height: f32,
    /// Fraction of the remaining distance covered each update (0-1)
    pub smoothing: f32,
    /// Height of the mirror plane used for ice reflections
    pub reflect_plane_height: f32,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            eye_distance: 6.0,
            eye_height: 5.0,
            smoothing: 0.25,
            reflect_plane_height: 0.0,
        }
    }
}

/// Settings loading failures
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub undo_policy: UndoPolicy,
    /// Ticks between automatic snapshots under `UndoPolicy::Periodic`
    pub snapshot_interval: u32,
    pub sim: SimSettings,
    pub view: ViewSettings,
}

impl Settings {
    /// Environment variable naming a JSON settings file
    const PATH_VAR: &'static str = "PENGUINS_SETTINGS";

    /// Create settings from an undo policy (other values default)
    pub fn from_policy(policy: UndoPolicy) -> Self {
        Self {
            undo_policy: policy,
            snapshot_interval: if policy == UndoPolicy::Periodic { 30 } else { 0 },
            ..Self::default()
        }
    }

    /// Parse settings from JSON text
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Load settings from the file named by `PENGUINS_SETTINGS`, falling back
    /// to defaults
    pub fn load() -> Self {
        let Ok(path) = std::env::var(Self::PATH_VAR) else {
            log::info!("Using default settings");
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from {path}");
                settings
            }
            Err(err) => {
                log::warn!("Ignoring settings file {path}: {err}");
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        log::info!("Settings saved");
        Ok(())
    }
}
