//! Penguins Puzzle - headless driver
//!
//! Usage: `penguins-puzzle [layout.json] [moves]`
//!
//! Moves are letters: `N E S W` push the controlled penguin, `T` switches
//! penguin, `U` undoes, `P` toggles pause. Each move is followed by idle
//! ticks so the level settles. Set `PENGUINS_SAVE` to write the final state.

#[cfg(not(target_arch = "wasm32"))]
use penguins::{
    Level, LevelLayout, Settings, StepInput, persistence, renderer,
    sim::{BlockType, Direction, EntityLayout, EntityState, EntityType, LevelMode},
};

/// Idle ticks run after every scripted move
#[cfg(not(target_arch = "wasm32"))]
const SETTLE_TICKS: u32 = 24;

#[cfg(not(target_arch = "wasm32"))]
fn demo_layout() -> LevelLayout {
    LevelLayout::filled(7, 5, BlockType::Snow)
        .with_block(1, 2, BlockType::Ice)
        .with_block(2, 2, BlockType::Ice)
        .with_block(3, 2, BlockType::Ice)
        .with_block(6, 2, BlockType::Exit)
        .with_block(3, 0, BlockType::Sea)
        .with_block(3, 4, BlockType::Fragile)
        .with_entity(EntityLayout::new(EntityType::Penguin, 0, 2).with_state(EntityState::Controlled))
        .with_entity(EntityLayout::new(EntityType::Barrel, 5, 4))
        .with_entity(EntityLayout::new(EntityType::Chest, 4, 0).containing(3))
        .with_entity(EntityLayout::new(EntityType::Fragment, 4, 0))
        .with_entity(EntityLayout::new(EntityType::SouthPole, 6, 0))
}

#[cfg(not(target_arch = "wasm32"))]
fn load_layout(path: Option<&str>) -> Result<LevelLayout, String> {
    let Some(path) = path else {
        return Ok(demo_layout());
    };
    let json = std::fs::read_to_string(path).map_err(|e| format!("cannot read {path}: {e}"))?;
    LevelLayout::from_json(&json).map_err(|e| format!("bad layout {path}: {e}"))
}

#[cfg(not(target_arch = "wasm32"))]
fn apply_move(level: &mut Level, letter: char) {
    let direction = match letter.to_ascii_uppercase() {
        'N' => Some(Direction::North),
        'E' => Some(Direction::East),
        'S' => Some(Direction::South),
        'W' => Some(Direction::West),
        'U' => {
            if let Err(e) = level.restore() {
                log::warn!("Undo failed: {e}");
            }
            return;
        }
        'T' => {
            level.step(&StepInput {
                switch_penguin: true,
                ..Default::default()
            });
            return;
        }
        'P' => {
            level.step(&StepInput {
                pause: true,
                ..Default::default()
            });
            log::info!("Mode now {:?}", level.mode());
            return;
        }
        other => {
            log::warn!("Ignoring unknown move {other:?}");
            return;
        }
    };
    level.step(&StepInput {
        direction,
        ..Default::default()
    });
}

#[cfg(not(target_arch = "wasm32"))]
fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    let layout = load_layout(args.get(1).map(String::as_str))?;
    let moves = args.get(2).cloned().unwrap_or_else(|| "EEES".to_string());

    let settings = Settings::load();
    let mut level = Level::from_layout(&layout, settings).map_err(|e| e.to_string())?;
    log::info!(
        "Level {} loaded: {}x{} tiles, {} entities",
        level.level_number(),
        level.grid().width(),
        level.grid().height(),
        level.active_entities().count()
    );

    for letter in moves.chars() {
        apply_move(&mut level, letter);
        for event in level.events() {
            log::info!("tick {}: {event:?}", level.tick());
        }
        for _ in 0..SETTLE_TICKS {
            level.step(&StepInput::default());
            level.update_view();
            for event in level.events() {
                log::info!("tick {}: {event:?}", level.tick());
            }
        }
        if matches!(level.mode(), LevelMode::Won | LevelMode::Lost) {
            break;
        }
    }

    let problems = level.check_invariants();
    for problem in &problems {
        log::error!("Invariant broken: {problem}");
    }

    log::info!(
        "Finished at tick {} in mode {:?}: {} tiles, {} objects, {} effects, {} undo snapshots",
        level.tick(),
        level.mode(),
        renderer::tile_instances(&level).len(),
        renderer::object_instances(&level).len(),
        renderer::fragment_instances(&level).len(),
        level.snapshot_count()
    );
    log::debug!("Camera eye {:?}", level.view().eye);

    if let Ok(path) = std::env::var("PENGUINS_SAVE") {
        persistence::save_to_file(&level, &path).map_err(|e| e.to_string())?;
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!("{} invariant violations", problems.len()))
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Penguins Puzzle (headless) starting...");
    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}
