//! Tile-world simulation core: entity registry with a spatial index,
//! per-layer ground grids, an obstacle resolver and the hero state
//! machine. Rendering, audio and scripting live elsewhere and talk to
//! this crate through [`hooks::WorldHooks`] and plain data types.

pub mod entities;
pub mod geom;
pub mod ground;
pub mod hero;
pub mod hooks;
pub mod map;
pub mod movement;
pub mod obstacle;
pub mod resources;
pub mod save;
pub mod spatial;


pub use entities::{
    block::{Block, BLOCK_MOVE_STEP, BLOCK_PUSH_DELAY_TICKS},
    door::{Door, DoorState, DOOR_TRANSITION_TICKS},
    separator::{Separator, SeparatorOrientation},
    CrystalBlockOrientation, DynamicTile, Entity, EntityAddError, EntityId, EntityKind,
    EntityRegistry, EntitySpec, EntityType, Stream,
};
pub use geom::{Point, Rectangle, Size};
pub use ground::{Ground, GroundGrid, MapGeometry};
pub use hero::{HeroContext, HeroInput, HeroStateKind, StateBehavior, HERO_WALKING_SPEED};
pub use hooks::{NullHooks, WorldHooks};
pub use map::{load_map_file, load_map_str, MapErrorCode, MapLoadError, SourceLocation};
pub use movement::{Direction4, Movement};
pub use obstacle::{Obstruction, TraversalRules};
pub use resources::{
    build_store, preload_tilesets, ResourceError, Tileset, TilesetPreload, TilesetSource,
    TilesetStore,
};
pub use save::{SaveError, SaveGame, SAVE_VERSION};
pub use spatial::{SpatialIndex, SpatialPlacement};
