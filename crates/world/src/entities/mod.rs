//! Entity ownership and indexing.
//!
//! The registry owns every dynamic entity on the map and mediates all
//! structural changes so that the spatial index, the name table, the
//! per-type tables and the z-order trackers never disagree. Removal is
//! deferred: entities are marked and detached at the end of the tick,
//! never in the middle of an update iteration.

pub mod block;
pub mod door;
pub mod separator;
pub mod zorder;

mod entity;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;
use tracing::{debug, info};

pub use entity::{
    CrystalBlockOrientation, DynamicTile, Entity, EntityId, EntityKind, EntityType, Stream,
};

use crate::geom::{Point, Rectangle};
use crate::ground::{Ground, GroundGrid, MapGeometry};
use crate::hero::{HeroInput, HeroStateKind, HeroStateMachine, StateBehavior};
use crate::hooks::{NullHooks, WorldHooks};
use crate::movement::{Direction4, Movement};
use crate::obstacle::{self, Obstruction, TraversalRules};
use crate::spatial::{SpatialIndex, SpatialPlacement};
use block::{Block, BLOCK_MOVE_STEP};
use door::Door;
use separator::Separator;
use zorder::ZOrderTracker;

/// Construction record for [`EntityRegistry::add_entity`].
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub name: Option<String>,
    pub entity_type: EntityType,
    pub layer: i32,
    pub bounding_box: Rectangle,
    pub enabled: bool,
    pub movement: Option<Movement>,
    pub kind: EntityKind,
}

impl EntitySpec {
    pub fn new(entity_type: EntityType, layer: i32, bounding_box: Rectangle) -> Self {
        Self {
            name: None,
            entity_type,
            layer,
            bounding_box,
            enabled: true,
            movement: None,
            kind: EntityKind::Plain,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_movement(mut self, movement: Movement) -> Self {
        self.movement = Some(movement);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Error)]
pub enum EntityAddError {
    #[error("layer {layer} is outside the map's layer range [{min}, {max}]")]
    InvalidLayer { layer: i32, min: i32, max: i32 },
    #[error("entity type '{type_name}' does not accept the provided kind data")]
    MismatchedKind { type_name: &'static str },
    #[error("the map already has a hero entity")]
    DuplicateHero,
}

/// Statically-typed lookup: kinds that can be extracted from
/// [`EntityKind`] without the caller matching on the enum.
pub trait TypedKind: Sized {
    const TYPE: EntityType;

    fn from_kind(kind: &EntityKind) -> Option<&Self>;
}

impl TypedKind for Door {
    const TYPE: EntityType = EntityType::Door;

    fn from_kind(kind: &EntityKind) -> Option<&Self> {
        match kind {
            EntityKind::Door(door) => Some(door),
            _ => None,
        }
    }
}

impl TypedKind for Block {
    const TYPE: EntityType = EntityType::Block;

    fn from_kind(kind: &EntityKind) -> Option<&Self> {
        match kind {
            EntityKind::Block(block) => Some(block),
            _ => None,
        }
    }
}

impl TypedKind for Separator {
    const TYPE: EntityType = EntityType::Separator;

    fn from_kind(kind: &EntityKind) -> Option<&Self> {
        match kind {
            EntityKind::Separator(separator) => Some(separator),
            _ => None,
        }
    }
}

impl TypedKind for DynamicTile {
    const TYPE: EntityType = EntityType::DynamicTile;

    fn from_kind(kind: &EntityKind) -> Option<&Self> {
        match kind {
            EntityKind::DynamicTile(tile) => Some(tile),
            _ => None,
        }
    }
}

impl TypedKind for Stream {
    const TYPE: EntityType = EntityType::Stream;

    fn from_kind(kind: &EntityKind) -> Option<&Self> {
        match kind {
            EntityKind::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

pub struct EntityRegistry {
    geometry: MapGeometry,
    ground_grid: GroundGrid,
    spatial: SpatialIndex,
    /// Creation order is id order: ids are allocated monotonically.
    entities: BTreeMap<EntityId, Entity>,
    named_entities: HashMap<String, EntityId>,
    by_type_by_layer: BTreeMap<(EntityType, i32), BTreeSet<EntityId>>,
    ground_observers_by_layer: BTreeMap<i32, BTreeSet<EntityId>>,
    z_orders: BTreeMap<i32, ZOrderTracker>,
    entities_to_remove: Vec<EntityId>,
    hero: Option<HeroStateMachine>,
    hero_id: Option<EntityId>,
    crystal_state_toggled: bool,
    tick: u64,
    next_entity_id: u64,
    hooks: Box<dyn WorldHooks>,
}

impl EntityRegistry {
    pub fn new(geometry: MapGeometry) -> Self {
        Self {
            geometry,
            ground_grid: GroundGrid::new(geometry),
            spatial: SpatialIndex::new(geometry.width, geometry.height),
            entities: BTreeMap::new(),
            named_entities: HashMap::new(),
            by_type_by_layer: BTreeMap::new(),
            ground_observers_by_layer: BTreeMap::new(),
            z_orders: BTreeMap::new(),
            entities_to_remove: Vec::new(),
            hero: None,
            hero_id: None,
            crystal_state_toggled: false,
            tick: 0,
            next_entity_id: 0,
            hooks: Box::new(NullHooks),
        }
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn WorldHooks>) {
        self.hooks = hooks;
    }

    pub fn geometry(&self) -> MapGeometry {
        self.geometry
    }

    pub fn ground_grid(&self) -> &GroundGrid {
        &self.ground_grid
    }

    pub(crate) fn set_ground_cell(&mut self, layer: i32, x8: i32, y8: i32, ground: Ground) {
        self.ground_grid.set_cell(layer, x8, y8, ground);
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // Structural changes.

    /// Adds an entity, assigning it the next Z on its layer. A name
    /// collision is resolved by suffixing, the way scripted duplicates
    /// expect; map files reject duplicates before getting here.
    pub fn add_entity(&mut self, spec: EntitySpec) -> Result<EntityId, EntityAddError> {
        if !self.geometry.is_valid_layer(spec.layer) {
            return Err(EntityAddError::InvalidLayer {
                layer: spec.layer,
                min: self.geometry.min_layer,
                max: self.geometry.max_layer,
            });
        }
        if !kind_matches(spec.entity_type, &spec.kind) {
            return Err(EntityAddError::MismatchedKind {
                type_name: spec.entity_type.name(),
            });
        }
        if spec.entity_type == EntityType::Hero && self.hero_id.is_some() {
            return Err(EntityAddError::DuplicateHero);
        }

        let id = EntityId::from_raw(self.next_entity_id);
        self.next_entity_id += 1;

        let name = spec.name.map(|wanted| self.unique_name(wanted));
        let z = self.z_orders.entry(spec.layer).or_default().next_front();

        let entity = Entity {
            id,
            name: name.clone(),
            entity_type: spec.entity_type,
            layer: spec.layer,
            bounding_box: spec.bounding_box,
            z,
            enabled: spec.enabled,
            marked_for_removal: false,
            movement: spec.movement,
            kind: spec.kind,
        };

        self.spatial.insert(SpatialPlacement {
            id,
            bounding_box: entity.bounding_box,
            layer: entity.layer,
            z,
        });
        if let Some(name) = &name {
            self.named_entities.insert(name.clone(), id);
        }
        self.by_type_by_layer
            .entry((entity.entity_type, entity.layer))
            .or_default()
            .insert(id);
        if entity.is_ground_observer() {
            self.ground_observers_by_layer
                .entry(entity.layer)
                .or_default()
                .insert(id);
        }
        if entity.entity_type == EntityType::Hero {
            self.hero_id = Some(id);
            self.hero = Some(HeroStateMachine::new(id, entity.bounding_box.top_left()));
        }
        let entity_type = entity.entity_type;
        self.entities.insert(id, entity);
        self.hooks.on_entity_created(id, entity_type, name.as_deref());
        Ok(id)
    }

    fn unique_name(&self, wanted: String) -> String {
        if !self.named_entities.contains_key(&wanted) {
            return wanted;
        }
        let mut suffix = 2u32;
        loop {
            let candidate = format!("{wanted}_{suffix}");
            if !self.named_entities.contains_key(&candidate) {
                debug!(wanted, renamed = candidate, "entity name already taken");
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Marks an entity for removal. It stays visible to queries for the
    /// rest of the current tick; detachment happens at the end of the
    /// tick, after all updates ran.
    pub fn remove_entity(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            if !entity.marked_for_removal {
                entity.marked_for_removal = true;
                self.entities_to_remove.push(id);
            }
        }
    }

    pub fn remove_entity_named(&mut self, name: &str) {
        if let Some(id) = self.named_entities.get(name).copied() {
            self.remove_entity(id);
        }
    }

    pub fn remove_entities_with_prefix(&mut self, prefix: &str) {
        for id in self.entities_with_prefix(prefix) {
            self.remove_entity(id);
        }
    }

    fn remove_marked_entities(&mut self) {
        let ids = std::mem::take(&mut self.entities_to_remove);
        for id in ids {
            let Some(entity) = self.entities.remove(&id) else {
                continue;
            };
            self.spatial.remove(&SpatialPlacement {
                id,
                bounding_box: entity.bounding_box,
                layer: entity.layer,
                z: entity.z,
            });
            if let Some(name) = &entity.name {
                self.named_entities.remove(name);
            }
            if let Some(set) = self
                .by_type_by_layer
                .get_mut(&(entity.entity_type, entity.layer))
            {
                set.remove(&id);
            }
            if let Some(set) = self.ground_observers_by_layer.get_mut(&entity.layer) {
                set.remove(&id);
            }
            let layer = entity.layer;
            let z = entity.z;
            let remaining: Vec<i32> = self.z_values_on_layer(layer).collect();
            if let Some(tracker) = self.z_orders.get_mut(&layer) {
                tracker.note_removed(z, remaining.into_iter());
            }
            if self.hero_id == Some(id) {
                self.hero_id = None;
                self.hero = None;
            }
            self.hooks
                .on_entity_removed(id, entity.entity_type, entity.name.as_deref());
        }
    }

    fn z_values_on_layer(&self, layer: i32) -> impl Iterator<Item = i32> + '_ {
        self.entities
            .values()
            .filter(move |entity| entity.layer == layer)
            .map(|entity| entity.z)
    }

    fn placement_of(entity: &Entity) -> SpatialPlacement {
        SpatialPlacement {
            id: entity.id,
            bounding_box: entity.bounding_box,
            layer: entity.layer,
            z: entity.z,
        }
    }

    /// Reassigns the entity's Z to one past the current layer maximum
    /// and repositions it in the index. Nobody else's Z changes.
    pub fn bring_to_front(&mut self, id: EntityId) {
        let Some(layer) = self.entities.get(&id).map(|entity| entity.layer) else {
            return;
        };
        let z = self.z_orders.entry(layer).or_default().next_front();
        self.reassign_z(id, z);
    }

    /// Reassigns the entity's Z to one below the current layer minimum.
    pub fn bring_to_back(&mut self, id: EntityId) {
        let Some(layer) = self.entities.get(&id).map(|entity| entity.layer) else {
            return;
        };
        let z = self.z_orders.entry(layer).or_default().next_back();
        self.reassign_z(id, z);
    }

    fn reassign_z(&mut self, id: EntityId, z: i32) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let old = Self::placement_of(entity);
        entity.z = z;
        let new = Self::placement_of(entity);
        self.spatial.notify_placement_changed(&old, new);
    }

    /// Moves the entity to another layer. Z-wise this is a fresh
    /// insertion under the target layer's tracker.
    pub fn set_entity_layer(&mut self, id: EntityId, layer: i32) -> Result<(), EntityAddError> {
        if !self.geometry.is_valid_layer(layer) {
            return Err(EntityAddError::InvalidLayer {
                layer,
                min: self.geometry.min_layer,
                max: self.geometry.max_layer,
            });
        }
        let Some(entity) = self.entities.get(&id) else {
            return Ok(());
        };
        let old_layer = entity.layer;
        if old_layer == layer {
            return Ok(());
        }
        let old_z = entity.z;
        let old_placement = Self::placement_of(entity);
        let entity_type = entity.entity_type;
        let is_observer = entity.is_ground_observer();

        let remaining: Vec<i32> = self
            .z_values_on_layer(old_layer)
            .filter(|&z| z != old_z)
            .collect();
        if let Some(tracker) = self.z_orders.get_mut(&old_layer) {
            tracker.note_removed(old_z, remaining.into_iter());
        }
        let z = self.z_orders.entry(layer).or_default().next_front();

        if let Some(set) = self.by_type_by_layer.get_mut(&(entity_type, old_layer)) {
            set.remove(&id);
        }
        self.by_type_by_layer
            .entry((entity_type, layer))
            .or_default()
            .insert(id);
        if is_observer {
            if let Some(set) = self.ground_observers_by_layer.get_mut(&old_layer) {
                set.remove(&id);
            }
            self.ground_observers_by_layer
                .entry(layer)
                .or_default()
                .insert(id);
        }

        let Some(entity) = self.entities.get_mut(&id) else {
            return Ok(());
        };
        entity.layer = layer;
        entity.z = z;
        let new_placement = Self::placement_of(entity);
        self.spatial
            .notify_placement_changed(&old_placement, new_placement);
        self.hooks.on_layer_changed(id, layer);
        Ok(())
    }

    /// Moves the entity and keeps the spatial index in step with the
    /// new bounding box.
    pub fn set_entity_position(&mut self, id: EntityId, position: Point) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if entity.bounding_box.top_left() == position {
            return;
        }
        let old = Self::placement_of(entity);
        entity.bounding_box = entity.bounding_box.at(position);
        let new = Self::placement_of(entity);
        let layer = entity.layer;
        self.spatial.notify_placement_changed(&old, new);
        self.hooks.on_position_changed(id, position, layer);
    }

    pub fn set_entity_enabled(&mut self, id: EntityId, enabled: bool) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.enabled = enabled;
        }
    }

    pub fn set_entity_movement(&mut self, id: EntityId, movement: Option<Movement>) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.movement = movement;
        }
    }

    // Lookups.

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable access to an entity's own state. Position, layer and Z
    /// are not reachable this way; those go through registry
    /// operations so the indices stay consistent.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// By-name lookup; a miss is an ordinary `None`, never an error.
    pub fn find_entity(&self, name: &str) -> Option<EntityId> {
        self.named_entities.get(name).copied()
    }

    pub fn entities_with_prefix(&self, prefix: &str) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .named_entities
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn has_entity_with_prefix(&self, prefix: &str) -> bool {
        self.named_entities
            .keys()
            .any(|name| name.starts_with(prefix))
    }

    pub fn entities_by_type(&self, entity_type: EntityType) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .by_type_by_layer
            .range((entity_type, i32::MIN)..=(entity_type, i32::MAX))
            .flat_map(|(_, set)| set.iter().copied())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn entities_by_type_on_layer(&self, entity_type: EntityType, layer: i32) -> Vec<EntityId> {
        self.by_type_by_layer
            .get(&(entity_type, layer))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Statically-typed convenience over [`entities_by_type`],
    /// optionally filtered by layer.
    pub fn entities_of<T: TypedKind>(&self, layer: Option<i32>) -> Vec<(EntityId, &T)> {
        let ids = match layer {
            Some(layer) => self.entities_by_type_on_layer(T::TYPE, layer),
            None => self.entities_by_type(T::TYPE),
        };
        ids.into_iter()
            .filter_map(|id| {
                let entity = self.entities.get(&id)?;
                T::from_kind(&entity.kind).map(|typed| (id, typed))
            })
            .collect()
    }

    // Spatial queries.

    /// Entities whose box overlaps the rectangle, sorted by (layer, z).
    pub fn query_rect(&self, rect: &Rectangle) -> Vec<EntityId> {
        self.spatial
            .query_rect(rect)
            .into_iter()
            .map(|placement| placement.id)
            .collect()
    }

    pub(crate) fn query_rect_placements(&self, rect: &Rectangle) -> Vec<SpatialPlacement> {
        self.spatial.query_rect(rect)
    }

    /// The rectangle reachable from `point` without crossing a
    /// separator, clipped to the map bounds.
    pub fn region_box(&self, point: Point) -> Rectangle {
        let mut region = Rectangle::new(0, 0, self.geometry.width, self.geometry.height);
        if !region.contains(point) {
            return Rectangle::default();
        }
        for id in self.entities_by_type(EntityType::Separator) {
            if let Some(entity) = self.entities.get(&id) {
                region = Separator::clip_region(&entity.bounding_box, point, region);
            }
        }
        region
    }

    /// Entities in the same separator region as `point`, (layer, z)
    /// sorted. Off-map points yield an empty vec.
    pub fn query_region_around(&self, point: Point) -> Vec<EntityId> {
        let region = self.region_box(point);
        if region.is_empty() {
            return Vec::new();
        }
        self.query_rect(&region)
    }

    // Ground and obstacle support.

    pub(crate) fn ground_observers_on_layer(
        &self,
        layer: i32,
    ) -> impl Iterator<Item = &Entity> + '_ {
        self.ground_observers_by_layer
            .get(&layer)
            .into_iter()
            .flat_map(|set| set.iter())
            .filter_map(|id| self.entities.get(id))
    }

    pub fn effective_ground(&self, layer: i32, point: Point) -> Ground {
        obstacle::effective_ground(self, layer, point)
    }

    pub fn overlaps_raised_blocks(&self, layer: i32, rect: &Rectangle) -> bool {
        obstacle::overlaps_raised_blocks(self, layer, rect)
    }

    pub fn crystal_state_toggled(&self) -> bool {
        self.crystal_state_toggled
    }

    pub fn toggle_crystal_state(&mut self) {
        self.crystal_state_toggled = !self.crystal_state_toggled;
        info!(toggled = self.crystal_state_toggled, "crystal state changed");
    }

    pub(crate) fn stream_direction_at(&self, layer: i32, point: Point) -> Option<Direction4> {
        let mut best: Option<(i32, Direction4)> = None;
        for observer in self.ground_observers_on_layer(layer) {
            if let EntityKind::Stream(stream) = observer.kind() {
                if observer.is_enabled() && observer.bounding_box().contains(point) {
                    match best {
                        Some((z, _)) if z >= observer.z() => {}
                        _ => best = Some((observer.z(), stream.direction)),
                    }
                }
            }
        }
        best.map(|(_, direction)| direction)
    }

    pub(crate) fn enemy_overlapping(&self, layer: i32, rect: &Rectangle) -> Option<EntityId> {
        self.query_rect_placements(rect)
            .into_iter()
            .filter(|placement| placement.layer == layer)
            .find(|placement| {
                self.entities
                    .get(&placement.id)
                    .map(|entity| {
                        entity.entity_type == EntityType::Enemy
                            && entity.enabled
                            && !entity.marked_for_removal
                    })
                    .unwrap_or(false)
            })
            .map(|placement| placement.id)
    }

    pub(crate) fn notify_collision(&mut self, mover: EntityId, obstacle: EntityId) {
        self.hooks.on_collision(mover, obstacle);
    }

    /// Starts a one-cell slide of a pushable block if its move budget
    /// and the first pixel of the path allow it. Exhausted budgets
    /// leave the block in place without an error: the block is still
    /// pushable by configuration, it just no longer moves.
    pub fn try_push_block(&mut self, id: EntityId, direction: Direction4) -> bool {
        let Some(entity) = self.entities.get(&id) else {
            return false;
        };
        let Some(block) = entity.as_block() else {
            return false;
        };
        if !block.is_pushable() || !block.has_moves_left() || entity.movement.is_some() {
            return false;
        }
        let (dx, dy) = direction.delta();
        let candidate = entity.bounding_box.translated(dx, dy);
        let layer = entity.layer;
        let rules = obstacle::traversal_rules_for(self, id);
        if obstacle::first_obstruction(self, id, layer, &candidate, &rules).is_some() {
            return false;
        }
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        entity.movement = Some(Movement::bounded(direction, 2, BLOCK_MOVE_STEP));
        if let Some(block) = entity.as_block_mut() {
            block.record_move();
        }
        true
    }

    // Hero access.

    pub fn hero_id(&self) -> Option<EntityId> {
        self.hero_id
    }

    pub fn hero_state_kind(&self) -> Option<HeroStateKind> {
        self.hero.as_ref().map(HeroStateMachine::state_kind)
    }

    pub fn hero_facing(&self) -> Option<Direction4> {
        self.hero.as_ref().map(HeroStateMachine::facing)
    }

    pub fn hero_can_be_hurt(&self) -> Option<bool> {
        self.hero.as_ref().map(HeroStateMachine::can_be_hurt)
    }

    pub fn hero_sword_damage_factor(&self) -> Option<u32> {
        self.hero
            .as_ref()
            .map(HeroStateMachine::sword_damage_factor)
    }

    pub fn hero_movement_player_controlled(&self) -> Option<bool> {
        self.hero
            .as_ref()
            .map(HeroStateMachine::is_movement_player_controlled)
    }

    pub(crate) fn hero_traversal_rules(&self) -> Option<TraversalRules> {
        self.hero.as_ref().map(HeroStateMachine::traversal_rules)
    }

    pub fn set_hero_input(&mut self, input: HeroInput) {
        if let Some(machine) = self.hero.as_mut() {
            machine.set_input(input);
        }
    }

    /// Queues a hero state transition; it takes effect at the start of
    /// the next tick.
    pub fn request_hero_state(&mut self, state: Box<dyn StateBehavior>) {
        if let Some(machine) = self.hero.as_mut() {
            machine.request_state(state);
        }
    }

    // Game loop.

    /// Advances one tick: applies the pending hero transition, updates
    /// every entity in creation order, resolves ground effects, then
    /// detaches entities marked for removal.
    pub fn update(&mut self) {
        self.tick += 1;

        if let Some(mut machine) = self.hero.take() {
            let change = machine.apply_pending_transition(self);
            if self.hero.is_none() {
                self.hero = Some(machine);
            }
            if let Some((previous, current)) = change {
                self.hooks.on_hero_state_changed(Some(previous), current);
            }
        }

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            let Some(entity) = self.entities.get(&id) else {
                continue;
            };
            if entity.marked_for_removal || !entity.enabled {
                continue;
            }
            if entity.entity_type == EntityType::Hero {
                if let Some(mut machine) = self.hero.take() {
                    machine.update(self);
                    if self.hero.is_none() {
                        self.hero = Some(machine);
                    }
                }
                continue;
            }
            self.update_door(id);
            self.step_entity_movement(id);
        }

        if let Some(mut machine) = self.hero.take() {
            machine.resolve_ground(self);
            if self.hero.is_none() {
                self.hero = Some(machine);
            }
        }

        self.remove_marked_entities();
    }

    fn update_door(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if let Some(door) = entity.as_door_mut() {
            if door.update() {
                debug!(id = ?id, open = door.is_open(), "door reached terminal state");
            }
        }
    }

    fn step_entity_movement(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let Some(mut movement) = entity.movement else {
            return;
        };
        let entity_type = entity.entity_type;
        let rules = obstacle::traversal_rules_for(self, id);
        let steps = movement.steps_this_tick();
        let (dx, dy) = movement.direction.delta();
        for _ in 0..steps {
            let Some(entity) = self.entities.get(&id) else {
                return;
            };
            let candidate = entity.bounding_box.translated(dx, dy);
            let layer = entity.layer;
            match obstacle::first_obstruction(self, id, layer, &candidate, &rules) {
                None => {
                    self.set_entity_position(id, candidate.top_left());
                    movement.record_step();
                }
                Some(obstruction) => {
                    movement.blocked = true;
                    if let Obstruction::Entity(other) = obstruction {
                        self.notify_collision(id, other);
                    }
                    break;
                }
            }
        }
        let done = movement.blocked || movement.is_finished();
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.movement = if done { None } else { Some(movement) };
        }
        if done && is_projectile(entity_type) {
            self.remove_entity(id);
        }
    }
}

fn is_projectile(entity_type: EntityType) -> bool {
    matches!(
        entity_type,
        EntityType::Boomerang
            | EntityType::Arrow
            | EntityType::Hookshot
            | EntityType::CarriedObject
    )
}

fn kind_matches(entity_type: EntityType, kind: &EntityKind) -> bool {
    match entity_type {
        EntityType::Door => matches!(kind, EntityKind::Door(_)),
        EntityType::Block => matches!(kind, EntityKind::Block(_)),
        EntityType::Separator => matches!(kind, EntityKind::Separator(_)),
        EntityType::DynamicTile => matches!(kind, EntityKind::DynamicTile(_)),
        EntityType::CrystalBlock => matches!(kind, EntityKind::CrystalBlock(_)),
        EntityType::Stream => matches!(kind, EntityKind::Stream(_)),
        _ => matches!(kind, EntityKind::Plain),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_256() -> EntityRegistry {
        EntityRegistry::new(MapGeometry {
            width: 256,
            height: 256,
            min_layer: 0,
            max_layer: 1,
        })
    }

    fn npc_spec(x: i32, y: i32, layer: i32) -> EntitySpec {
        EntitySpec::new(EntityType::Npc, layer, Rectangle::new(x, y, 16, 16))
    }

    #[test]
    fn add_assigns_increasing_z_per_layer() {
        let mut registry = registry_256();
        let a = registry.add_entity(npc_spec(0, 0, 0)).unwrap();
        let b = registry.add_entity(npc_spec(32, 0, 0)).unwrap();
        let c = registry.add_entity(npc_spec(64, 0, 1)).unwrap();
        let za = registry.entity(a).unwrap().z();
        let zb = registry.entity(b).unwrap().z();
        let zc = registry.entity(c).unwrap().z();
        assert!(za < zb);
        // A fresh layer starts its own sequence.
        assert_eq!(zc, za);
    }

    #[test]
    fn add_rejects_out_of_range_layer() {
        let mut registry = registry_256();
        let error = registry.add_entity(npc_spec(0, 0, 7)).unwrap_err();
        assert!(matches!(error, EntityAddError::InvalidLayer { layer: 7, .. }));
    }

    #[test]
    fn add_rejects_mismatched_kind_data() {
        let mut registry = registry_256();
        let spec = EntitySpec::new(EntityType::Door, 0, Rectangle::new(0, 0, 16, 16));
        let error = registry.add_entity(spec).unwrap_err();
        assert!(matches!(error, EntityAddError::MismatchedKind { .. }));
    }

    #[test]
    fn name_collisions_are_suffixed() {
        let mut registry = registry_256();
        let a = registry
            .add_entity(npc_spec(0, 0, 0).with_name("guard"))
            .unwrap();
        let b = registry
            .add_entity(npc_spec(32, 0, 0).with_name("guard"))
            .unwrap();
        assert_eq!(registry.find_entity("guard"), Some(a));
        assert_eq!(registry.find_entity("guard_2"), Some(b));
        assert_eq!(registry.entities_with_prefix("guard"), vec![a, b]);
    }

    #[test]
    fn lookup_miss_returns_none() {
        let registry = registry_256();
        assert_eq!(registry.find_entity("nobody"), None);
        assert!(!registry.has_entity_with_prefix("no"));
    }

    #[test]
    fn removal_is_deferred_to_end_of_tick() {
        let mut registry = registry_256();
        let id = registry.add_entity(npc_spec(0, 0, 0)).unwrap();
        registry.remove_entity(id);
        // Still visible to queries in the same tick.
        assert_eq!(registry.query_rect(&Rectangle::new(0, 0, 32, 32)), vec![id]);
        assert!(registry.entity(id).unwrap().is_marked_for_removal());
        registry.update();
        assert!(registry.entity(id).is_none());
        assert!(registry.query_rect(&Rectangle::new(0, 0, 32, 32)).is_empty());
    }

    #[test]
    fn bring_to_front_and_back_only_move_the_target() {
        let mut registry = registry_256();
        let a = registry.add_entity(npc_spec(0, 0, 0)).unwrap();
        let b = registry.add_entity(npc_spec(4, 4, 0)).unwrap();
        let c = registry.add_entity(npc_spec(8, 8, 0)).unwrap();
        let full = Rectangle::new(0, 0, 256, 256);

        registry.bring_to_front(a);
        assert_eq!(registry.query_rect(&full), vec![b, c, a]);

        registry.bring_to_back(c);
        assert_eq!(registry.query_rect(&full), vec![c, b, a]);
    }

    #[test]
    fn set_entity_layer_is_a_fresh_insertion_for_z() {
        let mut registry = registry_256();
        let a = registry.add_entity(npc_spec(0, 0, 1)).unwrap();
        let b = registry.add_entity(npc_spec(4, 4, 0)).unwrap();
        registry.set_entity_layer(a, 0).unwrap();
        let full = Rectangle::new(0, 0, 256, 256);
        // `a` re-enters layer 0 above `b`.
        assert_eq!(registry.query_rect(&full), vec![b, a]);
        assert_eq!(registry.entity(a).unwrap().layer(), 0);
        assert!(registry.set_entity_layer(a, 9).is_err());
    }

    #[test]
    fn remove_by_name_marks_the_named_entity() {
        let mut registry = registry_256();
        let id = registry
            .add_entity(npc_spec(0, 0, 0).with_name("ghost"))
            .unwrap();
        registry.remove_entity_named("ghost");
        assert!(registry.entity(id).unwrap().is_marked_for_removal());
        registry.update();
        assert_eq!(registry.find_entity("ghost"), None);
        // Unknown names are a no-op.
        registry.remove_entity_named("nobody");
    }

    #[test]
    fn straight_movement_stops_flush_against_an_obstacle() {
        let mut registry = registry_256();
        registry
            .add_entity(
                EntitySpec::new(EntityType::Wall, 0, Rectangle::new(32, 0, 16, 16)).disabled(),
            )
            .unwrap();
        registry
            .add_entity(EntitySpec::new(
                EntityType::Wall,
                0,
                Rectangle::new(64, 0, 16, 16),
            ))
            .unwrap();
        let runner = registry
            .add_entity(npc_spec(0, 0, 0).with_movement(Movement::straight(Direction4::Right, 4)))
            .unwrap();

        for _ in 0..20 {
            registry.update();
        }

        // Straight through the disabled wall, flush against the live one.
        let entity = registry.entity(runner).unwrap();
        assert_eq!(entity.bounding_box().top_left(), Point::new(48, 0));
        assert!(entity.movement().is_none());

        registry.set_entity_movement(runner, Some(Movement::bounded(Direction4::Down, 2, 8)));
        for _ in 0..10 {
            registry.update();
        }
        assert_eq!(
            registry.entity(runner).unwrap().bounding_box().top_left(),
            Point::new(48, 8)
        );
    }

    #[test]
    fn moving_an_entity_updates_queries() {
        let mut registry = registry_256();
        let id = registry.add_entity(npc_spec(0, 0, 0)).unwrap();
        registry.set_entity_position(id, Point::new(200, 200));
        assert!(registry.query_rect(&Rectangle::new(0, 0, 32, 32)).is_empty());
        assert_eq!(
            registry.query_rect(&Rectangle::new(192, 192, 64, 64)),
            vec![id]
        );
    }

    #[test]
    fn typed_lookup_filters_by_layer() {
        let mut registry = registry_256();
        let spec = EntitySpec::new(EntityType::Door, 0, Rectangle::new(0, 0, 16, 16))
            .with_kind(EntityKind::Door(Door::new(false, None)));
        let a = registry.add_entity(spec).unwrap();
        let spec = EntitySpec::new(EntityType::Door, 1, Rectangle::new(32, 0, 16, 16))
            .with_kind(EntityKind::Door(Door::new(true, None)));
        let b = registry.add_entity(spec).unwrap();

        let all: Vec<EntityId> = registry
            .entities_of::<Door>(None)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(all, vec![a, b]);
        let layer1: Vec<EntityId> = registry
            .entities_of::<Door>(Some(1))
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(layer1, vec![b]);
    }

    #[test]
    fn duplicate_hero_is_rejected() {
        let mut registry = registry_256();
        registry
            .add_entity(EntitySpec::new(
                EntityType::Hero,
                0,
                Rectangle::new(8, 8, 16, 16),
            ))
            .unwrap();
        let error = registry
            .add_entity(EntitySpec::new(
                EntityType::Hero,
                0,
                Rectangle::new(48, 8, 16, 16),
            ))
            .unwrap_err();
        assert!(matches!(error, EntityAddError::DuplicateHero));
    }

    #[test]
    fn region_query_stops_at_separators() {
        let mut registry = registry_256();
        let left = registry.add_entity(npc_spec(16, 16, 0)).unwrap();
        let right = registry.add_entity(npc_spec(200, 16, 0)).unwrap();
        let separator_spec =
            EntitySpec::new(EntityType::Separator, 0, Rectangle::new(120, 0, 16, 256))
                .with_kind(EntityKind::Separator(Separator));
        registry.add_entity(separator_spec).unwrap();

        let hits = registry.query_region_around(Point::new(20, 20));
        assert!(hits.contains(&left));
        assert!(!hits.contains(&right));

        let hits = registry.query_region_around(Point::new(220, 20));
        assert!(hits.contains(&right));
        assert!(!hits.contains(&left));

        // Off-map point: empty, not an error.
        assert!(registry.query_region_around(Point::new(-50, 20)).is_empty());
    }
}
