//! Headless demo driver for the world crate: loads a map, runs a
//! scripted session against the simulation core, then round-trips a
//! savegame through disk.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use world::{
    load_map_file, load_map_str, preload_tilesets, Direction4, EntityId, EntityRegistry,
    EntityType, HeroInput, HeroStateKind, Point, SaveGame, TilesetSource, TilesetStore, WorldHooks,
};

const SAVE_DIR_ENV_VAR: &str = "WORLD_SAVE_DIR";
const MAP_FILE_ENV_VAR: &str = "WORLD_MAP_FILE";
const SAVE_FILE_NAME: &str = "demo.save.json";
const SESSION_TICKS: u64 = 300;

const DEMO_TILESET: &str = r#"<tileset>
    <pattern id="1" ground="traversable"/>
    <pattern id="2" ground="wall"/>
    <pattern id="3" ground="deep_water"/>
    <pattern id="4" ground="hole"/>
    <pattern id="5" ground="grass"/>
</tileset>"#;

const DEMO_MAP: &str = r#"<map width="256" height="256" min_layer="0" max_layer="1" tileset="field">
    <grounds layer="0">
        <rect x8="0" y8="0" width8="32" height8="1" pattern="2"/>
        <rect x8="0" y8="31" width8="32" height8="1" pattern="2"/>
        <rect x8="0" y8="1" width8="1" height8="30" pattern="2"/>
        <rect x8="31" y8="1" width8="1" height8="30" pattern="2"/>
        <rect x8="20" y8="4" width8="8" height8="6" pattern="3"/>
        <rect x8="4" y8="20" width8="4" height8="4" pattern="4"/>
        <rect x8="12" y8="12" width8="6" height8="6" pattern="5"/>
    </grounds>
    <entities>
        <entity type="hero" name="hero" layer="0" x="32" y="32"/>
        <entity type="door" name="cellar_door" layer="0" x="96" y="32"
                savegame_variable="cellar_open"/>
        <entity type="block" name="well_block" layer="0" x="64" y="80" max_moves="1"/>
        <entity type="dynamic_tile" name="bridge" layer="0" x="48" y="160"
                width="32" height="16" ground="traversable"/>
        <entity type="crystal_block" name="orange_gate" layer="0" x="144" y="96"
                orientation="orange"/>
        <entity type="stream" name="east_current" layer="0" x="32" y="192"
                width="48" height="16" direction="right"/>
        <entity type="separator" name="mid_separator" layer="0" x="120" y="128"
                width="16" height="128"/>
        <entity type="enemy" name="patrol" layer="0" x="208" y="208"/>
    </entities>
</map>"#;

type RunResult<T> = Result<T, String>;

fn main() {
    init_tracing();
    info!("=== world demo startup ===");

    if let Err(err) = run() {
        error!(error = %err, "session_failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn run() -> RunResult<()> {
    // Tilesets decode on a worker thread while the rest of startup runs.
    let preload = preload_tilesets(vec![TilesetSource {
        id: "field".to_string(),
        xml: DEMO_TILESET.to_string(),
    }]);
    let tilesets = preload
        .wait()
        .map_err(|error| format!("preload tilesets: {error}"))?;

    let mut registry = load_demo_map(&tilesets)?;
    registry.set_hooks(Box::new(SessionLog));

    run_session(&mut registry);
    report(&registry);

    let save_path = round_trip_save(&registry, &tilesets)?;
    info!(path = %save_path.display(), "save round-trip complete");
    Ok(())
}

fn load_demo_map(tilesets: &TilesetStore) -> RunResult<EntityRegistry> {
    match std::env::var(MAP_FILE_ENV_VAR) {
        Ok(path) => {
            let path = PathBuf::from(path);
            load_map_file(&path, tilesets).map_err(|error| format!("load map: {error}"))
        }
        Err(_) => load_map_str(DEMO_MAP, Path::new("demo.map.xml"), tilesets)
            .map_err(|error| format!("load built-in map: {error}")),
    }
}

/// Scripted player input: walk east toward the door, wander the middle
/// of the map, then drift south into the stream.
fn scripted_input(tick: u64) -> HeroInput {
    let wanted_direction = match tick {
        0..=39 => Some(Direction4::Right),
        40..=79 => Some(Direction4::Down),
        80..=159 => Some(Direction4::Up),
        160..=239 => Some(Direction4::Down),
        _ => None,
    };
    HeroInput {
        wanted_direction,
        attack_pressed: (100..=104).contains(&tick),
        action_pressed: false,
        item_pressed: false,
    }
}

fn run_session(registry: &mut EntityRegistry) {
    // The door opens by script partway through, as a dungeon switch
    // would do it.
    let door = registry.find_entity("cellar_door");

    for tick in 0..SESSION_TICKS {
        registry.set_hero_input(scripted_input(tick));
        if tick == 60 {
            if let Some(door_id) = door {
                if let Some(door) = registry
                    .entity_mut(door_id)
                    .and_then(|entity| entity.as_door_mut())
                {
                    door.open();
                }
            }
        }
        if tick == 200 {
            registry.toggle_crystal_state();
        }
        registry.update();
    }
}

fn report(registry: &EntityRegistry) {
    let hero_state = registry
        .hero_state_kind()
        .map(HeroStateKind::name)
        .unwrap_or("none");
    let door_open = registry
        .find_entity("cellar_door")
        .and_then(|id| registry.entity(id))
        .and_then(|entity| entity.as_door())
        .map(|door| door.is_open())
        .unwrap_or(false);
    info!(
        entities = registry.entity_count(),
        hero_state,
        door_open,
        crystal_toggled = registry.crystal_state_toggled(),
        "session finished"
    );
}

/// Writes the savegame to disk, reads it back through the
/// path-reporting deserializer, and applies it to a fresh copy of the
/// map to prove the terminal-state contract holds.
fn round_trip_save(registry: &EntityRegistry, tilesets: &TilesetStore) -> RunResult<PathBuf> {
    let save = SaveGame::capture(registry);
    let path = save_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|error| format!("create save dir '{}': {error}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&save)
        .map_err(|error| format!("encode save json: {error}"))?;
    fs::write(&path, json).map_err(|error| format!("write save '{}': {error}", path.display()))?;

    let raw = fs::read_to_string(&path)
        .map_err(|error| format!("read save '{}': {error}", path.display()))?;
    let loaded = parse_save_game_json(&raw)?;

    let mut reloaded = load_demo_map(tilesets)?;
    loaded
        .apply(&mut reloaded)
        .map_err(|error| format!("apply save: {error}"))?;
    debug!(
        doors = loaded.doors_open.len(),
        blocks = loaded.block_moves_remaining.len(),
        "save re-applied to a fresh map"
    );
    Ok(path)
}

fn save_file_path() -> PathBuf {
    let dir = std::env::var(SAVE_DIR_ENV_VAR).unwrap_or_else(|_| "saves".to_string());
    PathBuf::from(dir).join(SAVE_FILE_NAME)
}

fn parse_save_game_json(raw: &str) -> RunResult<SaveGame> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, SaveGame>(&mut deserializer) {
        Ok(save) => Ok(save),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse save json: {source}"))
            } else {
                Err(format!("parse save json at {path}: {source}"))
            }
        }
    }
}

/// Stand-in for the scripting subsystem: every notification becomes a
/// log line.
#[derive(Debug, Default)]
struct SessionLog;

impl WorldHooks for SessionLog {
    fn on_entity_created(&mut self, id: EntityId, entity_type: EntityType, name: Option<&str>) {
        debug!(?id, kind = entity_type.name(), name, "entity created");
    }

    fn on_entity_removed(&mut self, id: EntityId, entity_type: EntityType, name: Option<&str>) {
        debug!(?id, kind = entity_type.name(), name, "entity removed");
    }

    fn on_position_changed(&mut self, id: EntityId, position: Point, layer: i32) {
        debug!(?id, x = position.x, y = position.y, layer, "entity moved");
    }

    fn on_collision(&mut self, mover: EntityId, obstacle: EntityId) {
        debug!(?mover, ?obstacle, "collision");
    }

    fn on_hero_state_changed(&mut self, previous: Option<HeroStateKind>, current: HeroStateKind) {
        info!(
            from = previous.map(HeroStateKind::name).unwrap_or("none"),
            to = current.name(),
            "hero state changed"
        );
    }
}
