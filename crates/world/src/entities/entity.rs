use crate::entities::block::Block;
use crate::entities::door::Door;
use crate::entities::separator::Separator;
use crate::geom::{Point, Rectangle};
use crate::ground::Ground;
use crate::movement::Movement;

/// Stable handle to an entity owned by the registry. Ids are allocated
/// monotonically, so id order is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Closed set of entity type tags. Lookup tables and the obstacle
/// dispatch table are keyed by this tag, never by downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Hero,
    Camera,
    Tile,
    DynamicTile,
    Destination,
    Teletransporter,
    Pickable,
    Destructible,
    CarriedObject,
    Chest,
    Jumper,
    Enemy,
    Npc,
    Block,
    Switch,
    Wall,
    Sensor,
    Crystal,
    CrystalBlock,
    ShopTreasure,
    Boomerang,
    Explosion,
    Arrow,
    Bomb,
    Fire,
    Stream,
    Hookshot,
    Door,
    Stairs,
    Separator,
    Custom,
}

impl EntityType {
    pub fn name(self) -> &'static str {
        match self {
            EntityType::Hero => "hero",
            EntityType::Camera => "camera",
            EntityType::Tile => "tile",
            EntityType::DynamicTile => "dynamic_tile",
            EntityType::Destination => "destination",
            EntityType::Teletransporter => "teletransporter",
            EntityType::Pickable => "pickable",
            EntityType::Destructible => "destructible",
            EntityType::CarriedObject => "carried_object",
            EntityType::Chest => "chest",
            EntityType::Jumper => "jumper",
            EntityType::Enemy => "enemy",
            EntityType::Npc => "npc",
            EntityType::Block => "block",
            EntityType::Switch => "switch",
            EntityType::Wall => "wall",
            EntityType::Sensor => "sensor",
            EntityType::Crystal => "crystal",
            EntityType::CrystalBlock => "crystal_block",
            EntityType::ShopTreasure => "shop_treasure",
            EntityType::Boomerang => "boomerang",
            EntityType::Explosion => "explosion",
            EntityType::Arrow => "arrow",
            EntityType::Bomb => "bomb",
            EntityType::Fire => "fire",
            EntityType::Stream => "stream",
            EntityType::Hookshot => "hookshot",
            EntityType::Door => "door",
            EntityType::Stairs => "stairs",
            EntityType::Separator => "separator",
            EntityType::Custom => "custom",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "hero" => EntityType::Hero,
            "camera" => EntityType::Camera,
            "tile" => EntityType::Tile,
            "dynamic_tile" => EntityType::DynamicTile,
            "destination" => EntityType::Destination,
            "teletransporter" => EntityType::Teletransporter,
            "pickable" => EntityType::Pickable,
            "destructible" => EntityType::Destructible,
            "carried_object" => EntityType::CarriedObject,
            "chest" => EntityType::Chest,
            "jumper" => EntityType::Jumper,
            "enemy" => EntityType::Enemy,
            "npc" => EntityType::Npc,
            "block" => EntityType::Block,
            "switch" => EntityType::Switch,
            "wall" => EntityType::Wall,
            "sensor" => EntityType::Sensor,
            "crystal" => EntityType::Crystal,
            "crystal_block" => EntityType::CrystalBlock,
            "shop_treasure" => EntityType::ShopTreasure,
            "boomerang" => EntityType::Boomerang,
            "explosion" => EntityType::Explosion,
            "arrow" => EntityType::Arrow,
            "bomb" => EntityType::Bomb,
            "fire" => EntityType::Fire,
            "stream" => EntityType::Stream,
            "hookshot" => EntityType::Hookshot,
            "door" => EntityType::Door,
            "stairs" => EntityType::Stairs,
            "separator" => EntityType::Separator,
            "custom" => EntityType::Custom,
            _ => return None,
        })
    }
}

/// State of a dynamic tile. When enabled it participates both as an
/// obstacle source (if its ground says so) and as a ground observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicTile {
    pub ground: Ground,
    pub enabled: bool,
}

/// Orientation group of a crystal block. Whether the block is currently
/// raised depends on the global crystal state held by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrystalBlockOrientation {
    /// Raised while the crystal state is the initial one.
    Orange,
    /// Raised after the crystal state has been toggled.
    Blue,
}

impl CrystalBlockOrientation {
    pub fn is_raised(self, crystal_state_toggled: bool) -> bool {
        match self {
            CrystalBlockOrientation::Orange => !crystal_state_toggled,
            CrystalBlockOrientation::Blue => crystal_state_toggled,
        }
    }
}

/// A stream drags whatever stands on it one pixel per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stream {
    pub direction: crate::movement::Direction4,
}

/// Per-kind data. Tags with no runtime state of their own share
/// `Plain`; the tag on the owning [`Entity`] still distinguishes them.
#[derive(Debug, Clone)]
pub enum EntityKind {
    Plain,
    Door(Door),
    Block(Block),
    Separator(Separator),
    DynamicTile(DynamicTile),
    CrystalBlock(CrystalBlockOrientation),
    Stream(Stream),
}

/// One dynamic object on the map. Owned exclusively by the registry;
/// every other table refers to it by [`EntityId`].
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) name: Option<String>,
    pub(crate) entity_type: EntityType,
    pub(crate) layer: i32,
    pub(crate) bounding_box: Rectangle,
    pub(crate) z: i32,
    pub(crate) enabled: bool,
    pub(crate) marked_for_removal: bool,
    pub(crate) movement: Option<Movement>,
    pub(crate) kind: EntityKind,
}

impl Entity {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn layer(&self) -> i32 {
        self.layer
    }

    pub fn bounding_box(&self) -> Rectangle {
        self.bounding_box
    }

    pub fn position(&self) -> Point {
        self.bounding_box.top_left()
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    pub fn movement(&self) -> Option<&Movement> {
        self.movement.as_ref()
    }

    pub fn movement_mut(&mut self) -> Option<&mut Movement> {
        self.movement.as_mut()
    }

    pub fn set_movement(&mut self, movement: Option<Movement>) {
        self.movement = movement;
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut EntityKind {
        &mut self.kind
    }

    pub fn as_door(&self) -> Option<&Door> {
        match &self.kind {
            EntityKind::Door(door) => Some(door),
            _ => None,
        }
    }

    pub fn as_door_mut(&mut self) -> Option<&mut Door> {
        match &mut self.kind {
            EntityKind::Door(door) => Some(door),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match &self.kind {
            EntityKind::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match &mut self.kind {
            EntityKind::Block(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_separator(&self) -> Option<&Separator> {
        match &self.kind {
            EntityKind::Separator(separator) => Some(separator),
            _ => None,
        }
    }

    /// Whether this entity can override the effective ground under it.
    /// The registry keeps ground observers in a dedicated per-layer set
    /// so the override scan never walks the full entity list.
    pub fn is_ground_observer(&self) -> bool {
        matches!(
            self.kind,
            EntityKind::DynamicTile(_) | EntityKind::Stream(_)
        )
    }

    /// The ground this entity imposes at `point`, if any. Must be
    /// idempotent: repeated calls without a state change agree.
    pub fn ground_modifier(&self, point: Point) -> Option<Ground> {
        if !self.enabled || !self.bounding_box.contains(point) {
            return None;
        }
        match &self.kind {
            EntityKind::DynamicTile(tile) if tile.enabled => Some(tile.ground),
            EntityKind::Stream(_) => Some(Ground::Traversable),
            _ => None,
        }
    }
}
