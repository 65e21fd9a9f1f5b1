//! Savegame snapshots.
//!
//! Only terminal state is persisted: a door in the middle of an
//! opening animation saves as open, a closing one as closed. Restoring
//! jumps doors straight to the saved terminal state with no transition.
//! Blocks persist their remaining move budget so an exhausted block
//! stays exhausted across a reload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::entities::{block::Block, door::Door, EntityRegistry};

pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("unsupported save version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("malformed save at {path}: {message}")]
    Malformed { path: String, message: String },
}

/// Terminal-state snapshot of the savable entities of one map.
///
/// Doors are keyed by their savegame variable, blocks by entity name;
/// unsaved doors (no variable) and unnamed blocks are skipped. Entries
/// with no matching entity on the current map are ignored at apply
/// time, which is what makes saves tolerant of map edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveGame {
    pub version: u32,
    pub doors_open: BTreeMap<String, bool>,
    pub block_moves_remaining: BTreeMap<String, Option<u32>>,
    pub crystal_state_toggled: bool,
}

impl SaveGame {
    pub fn capture(registry: &EntityRegistry) -> Self {
        let mut doors_open = BTreeMap::new();
        for (_, door) in registry.entities_of::<Door>(None) {
            if let Some(variable) = door.savegame_variable() {
                doors_open.insert(variable.to_string(), door.saved_as_open());
            }
        }
        let mut block_moves_remaining = BTreeMap::new();
        for (id, block) in registry.entities_of::<Block>(None) {
            let name = registry
                .entity(id)
                .and_then(|entity| entity.name())
                .map(str::to_string);
            if let Some(name) = name {
                block_moves_remaining.insert(name, block.moves_remaining());
            }
        }
        Self {
            version: SAVE_VERSION,
            doors_open,
            block_moves_remaining,
            crystal_state_toggled: registry.crystal_state_toggled(),
        }
    }

    /// Applies the snapshot to a freshly loaded map. Doors jump to
    /// their saved terminal state; blocks get their remaining budget
    /// back.
    pub fn apply(&self, registry: &mut EntityRegistry) -> Result<(), SaveError> {
        if self.version != SAVE_VERSION {
            return Err(SaveError::UnsupportedVersion {
                found: self.version,
                expected: SAVE_VERSION,
            });
        }
        let door_ids: Vec<_> = registry
            .entities_of::<Door>(None)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for id in door_ids {
            let Some(entity) = registry.entity_mut(id) else {
                continue;
            };
            let Some(door) = entity.as_door_mut() else {
                continue;
            };
            let saved = door
                .savegame_variable()
                .and_then(|variable| self.doors_open.get(variable).copied());
            if let Some(open) = saved {
                door.set_open(open);
            }
        }
        let block_ids: Vec<_> = registry
            .entities_of::<Block>(None)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        for id in block_ids {
            let name = registry
                .entity(id)
                .and_then(|entity| entity.name())
                .map(str::to_string);
            let Some(name) = name else { continue };
            let Some(&moves) = self.block_moves_remaining.get(&name) else {
                continue;
            };
            if let Some(block) = registry.entity_mut(id).and_then(|e| e.as_block_mut()) {
                block.restore_moves_remaining(moves);
            }
        }
        if registry.crystal_state_toggled() != self.crystal_state_toggled {
            registry.toggle_crystal_state();
        }
        info!(
            doors = self.doors_open.len(),
            blocks = self.block_moves_remaining.len(),
            "save applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{EntityKind, EntitySpec, EntityType};
    use crate::geom::Rectangle;
    use crate::ground::MapGeometry;

    fn empty_registry() -> EntityRegistry {
        EntityRegistry::new(MapGeometry {
            width: 128,
            height: 128,
            min_layer: 0,
            max_layer: 0,
        })
    }

    fn add_door(registry: &mut EntityRegistry, variable: &str, open: bool) {
        registry
            .add_entity(
                EntitySpec::new(EntityType::Door, 0, Rectangle::new(0, 0, 16, 16))
                    .with_name(variable)
                    .with_kind(EntityKind::Door(Door::new(
                        open,
                        Some(variable.to_string()),
                    ))),
            )
            .expect("door");
    }

    #[test]
    fn transitional_doors_persist_as_terminal() {
        let mut registry = empty_registry();
        add_door(&mut registry, "b_opening", false);
        add_door(&mut registry, "b_closing", true);
        let opening = registry.find_entity("b_opening").unwrap();
        let closing = registry.find_entity("b_closing").unwrap();
        registry
            .entity_mut(opening)
            .unwrap()
            .as_door_mut()
            .unwrap()
            .open();
        registry
            .entity_mut(closing)
            .unwrap()
            .as_door_mut()
            .unwrap()
            .close();

        let save = SaveGame::capture(&registry);
        assert_eq!(save.doors_open.get("b_opening"), Some(&true));
        assert_eq!(save.doors_open.get("b_closing"), Some(&false));

        // Restoring onto a fresh copy of the map yields stable doors.
        let mut reloaded = empty_registry();
        add_door(&mut reloaded, "b_opening", false);
        add_door(&mut reloaded, "b_closing", true);
        save.apply(&mut reloaded).expect("apply");
        let opening = reloaded.find_entity("b_opening").unwrap();
        let closing = reloaded.find_entity("b_closing").unwrap();
        assert!(reloaded
            .entity(opening)
            .unwrap()
            .as_door()
            .unwrap()
            .is_open());
        assert!(reloaded
            .entity(closing)
            .unwrap()
            .as_door()
            .unwrap()
            .is_closed());
    }

    #[test]
    fn block_budget_survives_a_round_trip() {
        let mut registry = empty_registry();
        let id = registry
            .add_entity(
                EntitySpec::new(EntityType::Block, 0, Rectangle::new(32, 32, 16, 16))
                    .with_name("budget_block")
                    .with_kind(EntityKind::Block(Block::new(true, Some(3)))),
            )
            .expect("block");
        registry
            .entity_mut(id)
            .unwrap()
            .as_block_mut()
            .unwrap()
            .record_move();

        let json = serde_json::to_string(&SaveGame::capture(&registry)).expect("serialize");
        let save: SaveGame = serde_json::from_str(&json).expect("deserialize");

        let mut reloaded = registry;
        reloaded.entity_mut(id).unwrap().as_block_mut().unwrap().reset_moves();
        save.apply(&mut reloaded).expect("apply");
        assert_eq!(
            reloaded
                .entity(id)
                .unwrap()
                .as_block()
                .unwrap()
                .moves_remaining(),
            Some(2)
        );
    }

    #[test]
    fn stale_entries_are_ignored() {
        let mut save = SaveGame::capture(&empty_registry());
        save.doors_open.insert("gone".to_string(), true);
        let mut registry = empty_registry();
        save.apply(&mut registry).expect("apply");
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let save = SaveGame {
            version: SAVE_VERSION + 1,
            ..SaveGame::default()
        };
        let mut registry = empty_registry();
        assert!(matches!(
            save.apply(&mut registry),
            Err(SaveError::UnsupportedVersion { .. })
        ));
    }
}
