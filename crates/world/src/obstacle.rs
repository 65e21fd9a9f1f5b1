//! Collision capability dispatch.
//!
//! Two questions are answered here, both consulted synchronously during
//! movement stepping:
//!
//! - is this candidate box free for the mover? Static terrain is read
//!   through the effective ground (grid plus dynamic overrides), dynamic
//!   entities through a single (stationary kind, mover) dispatch table.
//! - what is the effective ground at a point? Grid value, unless a
//!   ground observer above it overrides; the closest-to-top observer
//!   wins.

use crate::entities::{Entity, EntityId, EntityKind, EntityRegistry, EntityType};
use crate::geom::{Point, Rectangle};
use crate::ground::Ground;

/// Which ground classifications block a mover right now. For the hero
/// this is derived from the active state every time it is consulted;
/// for everything else it is fixed per entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraversalRules {
    pub hole_is_obstacle: bool,
    pub deep_water_is_obstacle: bool,
    pub shallow_water_is_obstacle: bool,
    pub lava_is_obstacle: bool,
    pub prickles_is_obstacle: bool,
    pub ladder_is_obstacle: bool,
    pub low_wall_is_obstacle: bool,
}

impl TraversalRules {
    /// Ground walker: hazards block, low walls block.
    pub fn walker() -> Self {
        Self {
            hole_is_obstacle: true,
            deep_water_is_obstacle: true,
            shallow_water_is_obstacle: false,
            lava_is_obstacle: true,
            prickles_is_obstacle: true,
            ladder_is_obstacle: false,
            low_wall_is_obstacle: true,
        }
    }

    /// Airborne projectile: only true walls block.
    pub fn flyer() -> Self {
        Self {
            hole_is_obstacle: false,
            deep_water_is_obstacle: false,
            shallow_water_is_obstacle: false,
            lava_is_obstacle: false,
            prickles_is_obstacle: false,
            ladder_is_obstacle: false,
            low_wall_is_obstacle: false,
        }
    }

    /// The hero walks onto hazards and lets the ground-effect pass
    /// react (falling, plunging, being hurt). States tighten or relax
    /// this through their own predicates.
    pub fn hero_default() -> Self {
        Self {
            hole_is_obstacle: false,
            deep_water_is_obstacle: false,
            shallow_water_is_obstacle: false,
            lava_is_obstacle: false,
            prickles_is_obstacle: false,
            ladder_is_obstacle: false,
            low_wall_is_obstacle: true,
        }
    }

    pub fn for_entity_type(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Hero => Self::hero_default(),
            EntityType::Boomerang | EntityType::Arrow | EntityType::Hookshot => Self::flyer(),
            _ => Self::walker(),
        }
    }

    pub fn ground_is_obstacle(&self, ground: Ground) -> bool {
        match ground {
            Ground::Empty | Ground::Wall => true,
            Ground::LowWall => self.low_wall_is_obstacle,
            Ground::Hole => self.hole_is_obstacle,
            Ground::DeepWater => self.deep_water_is_obstacle,
            Ground::ShallowWater => self.shallow_water_is_obstacle,
            Ground::Lava => self.lava_is_obstacle,
            Ground::Prickles => self.prickles_is_obstacle,
            Ground::Ladder => self.ladder_is_obstacle,
            Ground::Traversable | Ground::Grass | Ground::Ice => false,
        }
    }
}

/// What stopped a candidate step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Obstruction {
    Ground(Ground),
    Entity(EntityId),
}

/// Rules the given mover uses for terrain, consulting the hero's active
/// state when the mover is the hero.
pub fn traversal_rules_for(registry: &EntityRegistry, mover_id: EntityId) -> TraversalRules {
    let Some(mover) = registry.entity(mover_id) else {
        return TraversalRules::walker();
    };
    if mover.entity_type() == EntityType::Hero {
        if let Some(rules) = registry.hero_traversal_rules() {
            return rules;
        }
    }
    TraversalRules::for_entity_type(mover.entity_type())
}

/// First thing that blocks `candidate_box` for the mover, or `None`
/// when the box is free. Terrain is tested before dynamic entities;
/// among entities the lowest (layer, z) one wins the tie-break, which
/// the spatial index's ordering gives us for free.
pub fn first_obstruction(
    registry: &EntityRegistry,
    mover_id: EntityId,
    layer: i32,
    candidate_box: &Rectangle,
    rules: &TraversalRules,
) -> Option<Obstruction> {
    // Terrain at 8-pixel granularity: probe every cell the box covers.
    let mut y = candidate_box.y;
    while y < candidate_box.bottom() {
        let mut x = candidate_box.x;
        while x < candidate_box.right() {
            let ground = effective_ground(registry, layer, Point::new(x, y));
            if rules.ground_is_obstacle(ground) {
                return Some(Obstruction::Ground(ground));
            }
            x = (x & !7) + 8;
        }
        y = (y & !7) + 8;
    }
    // The bottom-right corner cells are not always hit by the stride.
    for corner in [
        Point::new(candidate_box.right() - 1, candidate_box.y),
        Point::new(candidate_box.x, candidate_box.bottom() - 1),
        Point::new(candidate_box.right() - 1, candidate_box.bottom() - 1),
    ] {
        let ground = effective_ground(registry, layer, corner);
        if rules.ground_is_obstacle(ground) {
            return Some(Obstruction::Ground(ground));
        }
    }

    for placement in registry.query_rect_placements(candidate_box) {
        if placement.id == mover_id || placement.layer != layer {
            continue;
        }
        let Some(stationary) = registry.entity(placement.id) else {
            continue;
        };
        let Some(mover) = registry.entity(mover_id) else {
            break;
        };
        if entity_blocks(registry, stationary, mover) {
            return Some(Obstruction::Entity(placement.id));
        }
    }
    None
}

/// Per-pair obstruction dispatch, keyed by the stationary entity's kind
/// and the mover's identity. Intentionally asymmetric: a separator
/// stops everything except the hero and the camera, an npc blocks the
/// hero but not another npc.
fn entity_blocks(registry: &EntityRegistry, stationary: &Entity, mover: &Entity) -> bool {
    if !stationary.is_enabled() || stationary.is_marked_for_removal() {
        return false;
    }
    let mover_type = mover.entity_type();
    match stationary.kind() {
        EntityKind::Door(door) => door.is_obstacle(),
        // Every pixel the block still covers stays solid, for the
        // pusher too; the pusher only advances into cells the slide
        // has vacated.
        EntityKind::Block(_) => true,
        EntityKind::CrystalBlock(orientation) => {
            orientation.is_raised(registry.crystal_state_toggled())
        }
        EntityKind::Separator(_) => {
            !matches!(mover_type, EntityType::Hero | EntityType::Camera)
        }
        EntityKind::DynamicTile(_) | EntityKind::Stream(_) => false,
        EntityKind::Plain => match stationary.entity_type() {
            EntityType::Wall | EntityType::Chest | EntityType::Destructible => true,
            EntityType::Npc => mover_type != EntityType::Npc,
            EntityType::Enemy => mover_type == EntityType::Block,
            EntityType::Hero => matches!(mover_type, EntityType::Block | EntityType::Npc),
            _ => false,
        },
    }
}

/// Effective ground at a point: the static grid value unless a ground
/// observer overlapping the point overrides it. Observers are scanned
/// in descending z so the closest-to-top override wins. Idempotent:
/// no state changes here.
pub fn effective_ground(registry: &EntityRegistry, layer: i32, point: Point) -> Ground {
    let mut best: Option<(i32, Ground)> = None;
    for observer in registry.ground_observers_on_layer(layer) {
        if let Some(ground) = observer.ground_modifier(point) {
            match best {
                Some((z, _)) if z >= observer.z() => {}
                _ => best = Some((observer.z(), ground)),
            }
        }
    }
    match best {
        Some((_, ground)) => ground,
        None => registry.ground_grid().get(layer, point),
    }
}

/// Whether any raised crystal block overlaps the rectangle on the
/// given layer.
pub fn overlaps_raised_blocks(registry: &EntityRegistry, layer: i32, rect: &Rectangle) -> bool {
    registry
        .query_rect_placements(rect)
        .iter()
        .filter(|placement| placement.layer == layer)
        .filter_map(|placement| registry.entity(placement.id))
        .any(|entity| match entity.kind() {
            EntityKind::CrystalBlock(orientation) => {
                entity.is_enabled() && orientation.is_raised(registry.crystal_state_toggled())
            }
            _ => false,
        })
}
