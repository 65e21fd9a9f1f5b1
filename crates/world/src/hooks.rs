//! Notification seam toward the scripting subsystem.
//!
//! The core calls these hooks after each structural change completes;
//! it never re-enters scripting in the middle of a spatial mutation.
//! Scripting reacts by calling the registry's ordinary public
//! operations, there is no privileged path back in.

use crate::entities::{EntityId, EntityType};
use crate::geom::Point;
use crate::hero::HeroStateKind;

#[allow(unused_variables)]
pub trait WorldHooks {
    fn on_entity_created(&mut self, id: EntityId, entity_type: EntityType, name: Option<&str>) {}

    fn on_entity_removed(&mut self, id: EntityId, entity_type: EntityType, name: Option<&str>) {}

    fn on_position_changed(&mut self, id: EntityId, position: Point, layer: i32) {}

    fn on_layer_changed(&mut self, id: EntityId, layer: i32) {}

    fn on_collision(&mut self, mover: EntityId, obstacle: EntityId) {}

    fn on_hero_state_changed(&mut self, previous: Option<HeroStateKind>, current: HeroStateKind) {}
}

/// Default sink when no scripting subsystem is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHooks;

impl WorldHooks for NullHooks {}
