//! The hero's finite-state machine.
//!
//! Exactly one state is active at a time. A transition is requested by
//! handing the machine the next state object; the machine applies it at
//! the start of the following tick by calling `stop` on the outgoing
//! state and then `start` on the incoming one. Requesting a transition
//! from inside `start` itself is a contract violation and panics.

pub mod states;

use std::fmt;

use tracing::debug;

use crate::entities::{EntityId, EntityKind, EntityRegistry, EntityType};
use crate::geom::{Point, Rectangle};
use crate::ground::Ground;
use crate::movement::{Direction4, Movement};
use crate::obstacle::{self, Obstruction, TraversalRules};

pub use states::FreeState;

/// Pixels the hero attempts to walk per tick under player control.
pub const HERO_WALKING_SPEED: i32 = 2;
/// Ticks of invulnerability granted when a hurt knockback ends.
pub const HERO_INVULNERABILITY_TICKS: u64 = 48;

/// Tag identifying a state's flavor. Custom states carry their own name
/// on the state object; the tag stays closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeroStateKind {
    Free,
    Carrying,
    Swimming,
    Pushing,
    Pulling,
    Grabbing,
    SwordLoading,
    SwordTapping,
    SwordSwinging,
    SpinAttack,
    Lifting,
    Treasure,
    Running,
    ForcedWalking,
    Jumping,
    Hurt,
    Plunging,
    Falling,
    BackToSolidGround,
    Stairs,
    Victory,
    UsingItem,
    Boomerang,
    Hookshot,
    Bow,
    Frozen,
    Custom,
}

impl HeroStateKind {
    pub fn name(self) -> &'static str {
        match self {
            HeroStateKind::Free => "free",
            HeroStateKind::Carrying => "carrying",
            HeroStateKind::Swimming => "swimming",
            HeroStateKind::Pushing => "pushing",
            HeroStateKind::Pulling => "pulling",
            HeroStateKind::Grabbing => "grabbing",
            HeroStateKind::SwordLoading => "sword_loading",
            HeroStateKind::SwordTapping => "sword_tapping",
            HeroStateKind::SwordSwinging => "sword_swinging",
            HeroStateKind::SpinAttack => "spin_attack",
            HeroStateKind::Lifting => "lifting",
            HeroStateKind::Treasure => "treasure",
            HeroStateKind::Running => "running",
            HeroStateKind::ForcedWalking => "forced_walking",
            HeroStateKind::Jumping => "jumping",
            HeroStateKind::Hurt => "hurt",
            HeroStateKind::Plunging => "plunging",
            HeroStateKind::Falling => "falling",
            HeroStateKind::BackToSolidGround => "back_to_solid_ground",
            HeroStateKind::Stairs => "stairs",
            HeroStateKind::Victory => "victory",
            HeroStateKind::UsingItem => "using_item",
            HeroStateKind::Boomerang => "boomerang",
            HeroStateKind::Hookshot => "hookshot",
            HeroStateKind::Bow => "bow",
            HeroStateKind::Frozen => "frozen",
            HeroStateKind::Custom => "custom",
        }
    }
}

impl fmt::Display for HeroStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Player commands for one tick, pushed in by the driver before
/// `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeroInput {
    pub wanted_direction: Option<Direction4>,
    pub attack_pressed: bool,
    pub action_pressed: bool,
    pub item_pressed: bool,
}

/// Outcome of a player-controlled walk attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkResult {
    pub pixels_moved: i32,
    pub obstruction: Option<Obstruction>,
}

/// Narrow mutation surface a state sees while running. States never
/// touch the registry's indices directly; everything goes through
/// registry operations so the spatial index stays consistent.
pub struct HeroContext<'a> {
    registry: &'a mut EntityRegistry,
    hero_id: EntityId,
    input: HeroInput,
    tick: u64,
    walking_speed: i32,
    respawn_point: Point,
    facing: &'a mut Direction4,
    pending: &'a mut Option<Box<dyn StateBehavior>>,
    starting: bool,
}

impl HeroContext<'_> {
    pub fn hero_id(&self) -> EntityId {
        self.hero_id
    }

    pub fn input(&self) -> HeroInput {
        self.input
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn facing(&self) -> Direction4 {
        *self.facing
    }

    pub fn set_facing(&mut self, direction: Direction4) {
        *self.facing = direction;
    }

    pub fn position(&self) -> Point {
        self.bounding_box().top_left()
    }

    pub fn bounding_box(&self) -> Rectangle {
        self.registry
            .entity(self.hero_id)
            .map(|hero| hero.bounding_box())
            .unwrap_or_default()
    }

    pub fn layer(&self) -> i32 {
        self.registry
            .entity(self.hero_id)
            .map(|hero| hero.layer())
            .unwrap_or_default()
    }

    /// The point a falling hero is brought back to.
    pub fn respawn_point(&self) -> Point {
        self.respawn_point
    }

    /// Queues the next state. Panics when called from inside the new
    /// state's own `start`, which would corrupt the single-active-state
    /// invariant. A later request in the same tick replaces an earlier
    /// one.
    pub fn request_state(&mut self, state: Box<dyn StateBehavior>) {
        if self.starting {
            panic!(
                "hero state '{}' requested a transition from inside its own start()",
                state.kind()
            );
        }
        if let Some(replaced) = self.pending.replace(state) {
            debug!(replaced = %replaced.kind(), "hero state request replaced within one tick");
        }
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending.is_some()
    }

    /// Walks up to `walking_speed` pixels, one at a time, stopping at
    /// the first obstruction. Updates facing.
    pub fn walk(&mut self, direction: Direction4, rules: &TraversalRules) -> WalkResult {
        self.walk_with_speed(direction, rules, self.walking_speed)
    }

    pub fn walk_with_speed(
        &mut self,
        direction: Direction4,
        rules: &TraversalRules,
        speed: i32,
    ) -> WalkResult {
        *self.facing = direction;
        let (dx, dy) = direction.delta();
        let mut pixels_moved = 0;
        let mut obstruction = None;
        for _ in 0..speed {
            let bbox = self.bounding_box();
            let layer = self.layer();
            let candidate = bbox.translated(dx, dy);
            match obstacle::first_obstruction(self.registry, self.hero_id, layer, &candidate, rules)
            {
                None => {
                    self.registry
                        .set_entity_position(self.hero_id, candidate.top_left());
                    pixels_moved += 1;
                }
                Some(found) => {
                    if let Obstruction::Entity(other) = found {
                        self.registry.notify_collision(self.hero_id, other);
                    }
                    obstruction = Some(found);
                    break;
                }
            }
        }
        WalkResult {
            pixels_moved,
            obstruction,
        }
    }

    /// Moves the hero without obstacle checks (falling recovery,
    /// stairs snapping).
    pub fn teleport(&mut self, position: Point) {
        self.registry.set_entity_position(self.hero_id, position);
    }

    pub fn effective_ground_under_hero(&self) -> Ground {
        obstacle::effective_ground(self.registry, self.layer(), self.bounding_box().center())
    }

    pub fn entity_is_pushable_block(&self, id: EntityId) -> bool {
        self.registry
            .entity(id)
            .and_then(|entity| entity.as_block())
            .map(|block| block.is_pushable())
            .unwrap_or(false)
    }

    pub fn block_is_sliding(&self, id: EntityId) -> bool {
        self.registry
            .entity(id)
            .map(|entity| entity.movement().is_some())
            .unwrap_or(false)
    }

    /// Starts a one-cell slide of the block if its budget and the
    /// destination allow it.
    pub fn try_push_block(&mut self, id: EntityId, direction: Direction4) -> bool {
        self.registry.try_push_block(id, direction)
    }

    /// The entity the hero would collide with one pixel ahead, if any.
    pub fn entity_ahead(&self, direction: Direction4, rules: &TraversalRules) -> Option<EntityId> {
        let (dx, dy) = direction.delta();
        let candidate = self.bounding_box().translated(dx, dy);
        match obstacle::first_obstruction(
            self.registry,
            self.hero_id,
            self.layer(),
            &candidate,
            rules,
        ) {
            Some(Obstruction::Entity(id)) => Some(id),
            _ => None,
        }
    }

    /// Spawns a projectile entity at the hero's center, flying in
    /// `direction`. The registry reaps it when its movement ends.
    pub fn spawn_projectile(&mut self, entity_type: EntityType, direction: Direction4) {
        let center = self.bounding_box().center();
        let layer = self.layer();
        let spec = crate::entities::EntitySpec {
            name: None,
            entity_type,
            layer,
            bounding_box: Rectangle::new(center.x - 4, center.y - 4, 8, 8),
            enabled: true,
            movement: Some(Movement::bounded(direction, 4, 96)),
            kind: EntityKind::Plain,
        };
        if let Err(error) = self.registry.add_entity(spec) {
            tracing::warn!(%error, kind = entity_type.name(), "failed to spawn hero projectile");
        }
    }
}

/// Behavior policy of one hero state. Predicates default to the common
/// case so most states only override the few answers they change.
#[allow(unused_variables)]
pub trait StateBehavior {
    fn kind(&self) -> HeroStateKind;

    fn start(&mut self, ctx: &mut HeroContext<'_>, previous: Option<HeroStateKind>) {}

    fn stop(&mut self, ctx: &mut HeroContext<'_>, next: HeroStateKind) {}

    fn update(&mut self, ctx: &mut HeroContext<'_>) {}

    /// Whether the player's direction commands drive the hero.
    fn can_control_movement(&self) -> bool {
        true
    }

    fn can_be_hurt(&self) -> bool {
        true
    }

    fn can_start_sword(&self) -> bool {
        false
    }

    fn can_push(&self) -> bool {
        false
    }

    fn can_pull(&self) -> bool {
        false
    }

    fn can_grab(&self) -> bool {
        false
    }

    fn can_take_stairs(&self) -> bool {
        false
    }

    fn can_use_item(&self) -> bool {
        false
    }

    fn sword_damage_factor(&self) -> u32 {
        1
    }

    /// Which grounds block the hero while this state is active.
    fn traversal_rules(&self) -> TraversalRules {
        TraversalRules::hero_default()
    }

    /// Whether standing on `ground` triggers its effect (falling into a
    /// hole, plunging into deep water, being burnt by lava).
    fn is_affected_by_ground(&self, ground: Ground) -> bool {
        matches!(
            ground,
            Ground::Hole | Ground::DeepWater | Ground::Lava | Ground::Prickles
        )
    }
}

/// Single-active-state machine owned by the registry alongside the hero
/// entity.
pub struct HeroStateMachine {
    hero_id: EntityId,
    current: Box<dyn StateBehavior>,
    pending: Option<Box<dyn StateBehavior>>,
    input: HeroInput,
    facing: Direction4,
    walking_speed: i32,
    invulnerable_until_tick: u64,
    last_solid_position: Point,
}

impl HeroStateMachine {
    pub(crate) fn new(hero_id: EntityId, start_position: Point) -> Self {
        Self {
            hero_id,
            current: Box::new(FreeState::default()),
            pending: None,
            input: HeroInput::default(),
            facing: Direction4::Down,
            walking_speed: HERO_WALKING_SPEED,
            invulnerable_until_tick: 0,
            last_solid_position: start_position,
        }
    }

    pub fn hero_id(&self) -> EntityId {
        self.hero_id
    }

    pub fn state_kind(&self) -> HeroStateKind {
        self.current.kind()
    }

    pub fn facing(&self) -> Direction4 {
        self.facing
    }

    pub fn set_input(&mut self, input: HeroInput) {
        self.input = input;
    }

    pub fn can_be_hurt(&self) -> bool {
        self.current.can_be_hurt()
    }

    pub fn can_start_sword(&self) -> bool {
        self.current.can_start_sword()
    }

    pub fn can_take_stairs(&self) -> bool {
        self.current.can_take_stairs()
    }

    pub fn is_movement_player_controlled(&self) -> bool {
        self.current.can_control_movement()
    }

    pub fn sword_damage_factor(&self) -> u32 {
        self.current.sword_damage_factor()
    }

    pub fn traversal_rules(&self) -> TraversalRules {
        self.current.traversal_rules()
    }

    /// Queues a transition from outside the machine (scripting, the
    /// ground-effect pass). Applied at the start of the next tick.
    pub fn request_state(&mut self, state: Box<dyn StateBehavior>) {
        if let Some(replaced) = self.pending.replace(state) {
            debug!(replaced = %replaced.kind(), "hero state request replaced before applying");
        }
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending.is_some()
    }

    fn context<'a>(
        registry: &'a mut EntityRegistry,
        hero_id: EntityId,
        input: HeroInput,
        walking_speed: i32,
        respawn_point: Point,
        facing: &'a mut Direction4,
        pending: &'a mut Option<Box<dyn StateBehavior>>,
        starting: bool,
    ) -> HeroContext<'a> {
        let tick = registry.tick();
        HeroContext {
            registry,
            hero_id,
            input,
            tick,
            walking_speed,
            respawn_point,
            facing,
            pending,
            starting,
        }
    }

    /// Applies a queued transition: `old.stop(new)` then
    /// `new.start(old)`, in that order. Returns the pair of kinds for
    /// the state-change hook.
    pub(crate) fn apply_pending_transition(
        &mut self,
        registry: &mut EntityRegistry,
    ) -> Option<(HeroStateKind, HeroStateKind)> {
        let new_state = self.pending.take()?;
        let old_kind = self.current.kind();
        let new_kind = new_state.kind();
        debug!(from = %old_kind, to = %new_kind, "hero state transition");

        let mut old_state = std::mem::replace(&mut self.current, new_state);
        let mut ctx = Self::context(
            registry,
            self.hero_id,
            self.input,
            self.walking_speed,
            self.last_solid_position,
            &mut self.facing,
            &mut self.pending,
            false,
        );
        old_state.stop(&mut ctx, new_kind);

        let mut start_ctx = Self::context(
            registry,
            self.hero_id,
            self.input,
            self.walking_speed,
            self.last_solid_position,
            &mut self.facing,
            &mut self.pending,
            true,
        );
        self.current.start(&mut start_ctx, Some(old_kind));
        // The outgoing state object is destroyed here; no history is
        // kept beyond the kind passed to start().
        Some((old_kind, new_kind))
    }

    /// Forwards the tick to the active state only. Transitions the
    /// state requests now take effect next tick.
    pub(crate) fn update(&mut self, registry: &mut EntityRegistry) {
        let mut ctx = Self::context(
            registry,
            self.hero_id,
            self.input,
            self.walking_speed,
            self.last_solid_position,
            &mut self.facing,
            &mut self.pending,
            false,
        );
        self.current.update(&mut ctx);
    }

    /// Fixed-order pass after all positions moved: classifies the
    /// ground under the hero, tracks the last solid position, and
    /// triggers ground and contact effects at most once each.
    pub(crate) fn resolve_ground(&mut self, registry: &mut EntityRegistry) {
        let Some(hero) = registry.entity(self.hero_id) else {
            return;
        };
        let layer = hero.layer();
        let bbox = hero.bounding_box();
        let ground_point = bbox.center();
        let ground = obstacle::effective_ground(registry, layer, ground_point);

        if matches!(
            ground,
            Ground::Traversable
                | Ground::Grass
                | Ground::Ice
                | Ground::ShallowWater
                | Ground::Ladder
        ) {
            self.last_solid_position = bbox.top_left();
        }

        if self.pending.is_none() && self.current.is_affected_by_ground(ground) {
            match ground {
                Ground::Hole => {
                    self.request_state(Box::new(states::FallingState::default()));
                }
                Ground::DeepWater => {
                    self.request_state(Box::new(states::PlungingState::default()));
                }
                Ground::Lava | Ground::Prickles => {
                    let away = self.facing.opposite();
                    self.invulnerable_until_tick =
                        registry.tick() + states::HURT_TICKS as u64 + HERO_INVULNERABILITY_TICKS;
                    self.request_state(Box::new(states::HurtState::new(Some(away))));
                }
                _ => {}
            }
        }

        // Stream drag: one checked pixel per tick, regardless of player
        // control.
        if let Some(direction) = registry.stream_direction_at(layer, ground_point) {
            let rules = self.current.traversal_rules();
            let (dx, dy) = direction.delta();
            let candidate = bbox.translated(dx, dy);
            if obstacle::first_obstruction(registry, self.hero_id, layer, &candidate, &rules)
                .is_none()
            {
                registry.set_entity_position(self.hero_id, candidate.top_left());
            }
        }

        // Enemy contact.
        if self.pending.is_none()
            && self.current.can_be_hurt()
            && registry.tick() >= self.invulnerable_until_tick
        {
            if let Some(enemy_id) = registry.enemy_overlapping(layer, &bbox) {
                registry.notify_collision(self.hero_id, enemy_id);
                let away = knockback_direction(registry, enemy_id, &bbox);
                self.invulnerable_until_tick =
                    registry.tick() + states::HURT_TICKS as u64 + HERO_INVULNERABILITY_TICKS;
                self.request_state(Box::new(states::HurtState::new(away)));
            }
        }
    }
}

fn knockback_direction(
    registry: &EntityRegistry,
    enemy_id: EntityId,
    hero_box: &Rectangle,
) -> Option<Direction4> {
    let enemy = registry.entity(enemy_id)?;
    let enemy_center = enemy.bounding_box().center();
    let hero_center = hero_box.center();
    let dx = hero_center.x - enemy_center.x;
    let dy = hero_center.y - enemy_center.y;
    Some(if dx.abs() >= dy.abs() {
        if dx >= 0 {
            Direction4::Right
        } else {
            Direction4::Left
        }
    } else if dy >= 0 {
        Direction4::Down
    } else {
        Direction4::Up
    })
}
