//! Save/load persistence
//!
//! Features:
//! - Versioned JSON envelope holding the grid and entity arrays
//! - Full validation before a save reaches a level
//! - Backup rotation on disk (tmp → save, old save → backup)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::MAX_PENGS;
use crate::settings::Settings;
use crate::sim::{Entity, EntityId, Grid, Level, SimError};

/// Current envelope format
pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("save data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to access save file: {0}")]
    Io(#[from] std::io::Error),
    #[error("save version {found} is not supported (expected {SAVE_VERSION})")]
    Version { found: u32 },
    #[error("save data is inconsistent: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sim(#[from] SimError),
}

/// Serialized level state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveEnvelope {
    pub version: u32,
    pub level_number: u32,
    pub cell_size: f32,
    pub tick: u64,
    pub grid: Grid,
    pub entities: Vec<Entity>,
}

impl SaveEnvelope {
    pub fn capture(level: &Level) -> Self {
        Self {
            version: SAVE_VERSION,
            level_number: level.level_number(),
            cell_size: level.cell_size(),
            tick: level.tick(),
            grid: level.grid().clone(),
            entities: level.entities().to_vec(),
        }
    }

    /// Check every index and capacity before the arrays are installed
    fn validate(&self) -> Result<Grid, PersistError> {
        if self.version != SAVE_VERSION {
            return Err(PersistError::Version { found: self.version });
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(PersistError::Corrupt(format!("cell size {}", self.cell_size)));
        }
        // Re-run the grid constructor so dimensions and capacity are checked
        let grid = Grid::new(self.grid.width(), self.grid.height(), self.grid.tiles().to_vec())?;
        if self.entities.len() > MAX_PENGS {
            return Err(SimError::CapacityExceeded {
                what: "entity",
                capacity: MAX_PENGS,
            }
            .into());
        }

        let count = self.entities.len();
        let in_range = |id: Option<EntityId>| id.is_none_or(|id| id.index() < count);
        for (i, e) in self.entities.iter().enumerate() {
            if e.square >= grid.len() {
                return Err(PersistError::Corrupt(format!("entity {i} on missing tile {}", e.square)));
            }
            if !(in_range(e.contents) && in_range(e.inside) && in_range(e.standing_on)) {
                return Err(PersistError::Corrupt(format!("entity {i} references a missing entity")));
            }
        }
        if let Some(square) = grid.tiles().iter().position(|t| !in_range(t.occupant)) {
            return Err(PersistError::Corrupt(format!("tile {square} claims a missing entity")));
        }
        Ok(grid)
    }
}

/// Serialize a level to JSON
pub fn save_level(level: &Level) -> Result<String, PersistError> {
    let json = serde_json::to_string(&SaveEnvelope::capture(level))?;
    log::debug!("Saved level {} at tick {} ({} bytes)", level.level_number(), level.tick(), json.len());
    Ok(json)
}

/// Rebuild a level from JSON produced by `save_level`
///
/// The undo ring starts empty; the snapshots are not part of a save.
pub fn load_level(json: &str, settings: Settings) -> Result<Level, PersistError> {
    let envelope: SaveEnvelope = serde_json::from_str(json)?;
    let grid = envelope.validate()?;

    let mut level = Level::new(settings);
    level.install(grid, envelope.entities, envelope.tick, envelope.level_number, envelope.cell_size);
    let problems = level.check_invariants();
    if let Some(first) = problems.first() {
        return Err(PersistError::Corrupt(first.clone()));
    }
    log::info!("Loaded save of level {} at tick {}", level.level_number(), level.tick());
    Ok(level)
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(extension);
    PathBuf::from(name)
}

/// Write a save file, keeping the previous one as `<path>.bak`
pub fn save_to_file(level: &Level, path: impl AsRef<Path>) -> Result<(), PersistError> {
    let path = path.as_ref();
    let json = save_level(level)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, json)?;

    let rotated = if path.exists() {
        fs::rename(path, sibling(path, ".bak"))
    } else {
        Ok(())
    };
    if let Err(err) = rotated.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    log::info!("Level saved to {}", path.display());
    Ok(())
}

/// Load a save file, falling back to the backup if the main file is
/// unreadable or corrupt
pub fn load_from_file(path: impl AsRef<Path>, settings: Settings) -> Result<Level, PersistError> {
    let path = path.as_ref();
    let primary = fs::read_to_string(path)
        .map_err(PersistError::from)
        .and_then(|json| load_level(&json, settings.clone()));
    match primary {
        Ok(level) => Ok(level),
        Err(err) => {
            let backup = sibling(path, ".bak");
            if !backup.exists() {
                return Err(err);
            }
            log::warn!("Save {} unusable ({err}), trying backup", path.display());
            load_level(&fs::read_to_string(backup)?, settings)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{BlockType, Direction, EntityLayout, EntityState, EntityType, LevelLayout, StepInput};

    fn played_level() -> Level {
        let layout = LevelLayout::filled(5, 4, BlockType::Snow)
            .with_block(2, 0, BlockType::Tile)
            .with_entity(EntityLayout::new(EntityType::Penguin, 0, 0).with_state(EntityState::Controlled))
            .with_entity(EntityLayout::new(EntityType::Chest, 4, 3).containing(2))
            .with_entity(EntityLayout::new(EntityType::Fragment, 4, 3));
        let mut level = Level::from_layout(&layout, Settings::default()).unwrap();
        level.step(&StepInput::moving(Direction::East));
        for _ in 0..12 {
            level.step(&StepInput::default());
        }
        level
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("penguins-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn test_round_trip_preserves_state() {
        let level = played_level();
        let json = save_level(&level).unwrap();
        let loaded = load_level(&json, Settings::default()).unwrap();
        assert_eq!(loaded.entities(), level.entities());
        assert_eq!(loaded.tiles(), level.tiles());
        assert_eq!(loaded.tick(), level.tick());
        assert_eq!(loaded.snapshot_count(), 0);
    }

    #[test]
    fn test_rejects_other_versions() {
        let mut envelope = SaveEnvelope::capture(&played_level());
        envelope.version = SAVE_VERSION + 1;
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(matches!(
            load_level(&json, Settings::default()),
            Err(PersistError::Version { .. })
        ));
    }

    #[test]
    fn test_rejects_dangling_references() {
        let mut envelope = SaveEnvelope::capture(&played_level());
        envelope.entities[1].contents = Some(EntityId(42));
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(matches!(
            load_level(&json, Settings::default()),
            Err(PersistError::Corrupt(_))
        ));

        let mut envelope = SaveEnvelope::capture(&played_level());
        envelope.entities[0].square = 3;
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(matches!(
            load_level(&json, Settings::default()),
            Err(PersistError::Corrupt(_))
        ));
    }

    #[test]
    fn test_file_rotation_and_backup_fallback() {
        let path = temp_path("rotation");
        let first = played_level();
        save_to_file(&first, &path).unwrap();

        let mut second = first.clone();
        second.step(&StepInput::moving(Direction::South));
        save_to_file(&second, &path).unwrap();
        assert!(sibling(&path, ".bak").exists());

        fs::write(&path, "{ truncated").unwrap();
        let recovered = load_from_file(&path, Settings::default()).unwrap();
        assert_eq!(recovered.tick(), first.tick());

        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(sibling(&path, ".bak"));
    }
}
