//! The hero state catalog.
//!
//! Each state is a small policy struct; the machine owns exactly one at
//! a time behind the [`StateBehavior`] trait. Timers are state-local
//! and die with the state object.

use crate::entities::{block::BLOCK_PUSH_DELAY_TICKS, EntityId, EntityType};
use crate::ground::Ground;
use crate::hero::{HeroContext, HeroStateKind, StateBehavior};
use crate::movement::Direction4;
use crate::obstacle::{Obstruction, TraversalRules};

/// Ticks of pressing against a pushable block before Free hands over to
/// Pushing.
pub const PUSH_TRIGGER_TICKS: u32 = 8;
/// Ticks a hurt knockback lasts.
pub const HURT_TICKS: u32 = 12;
/// Of which this many actually push the hero backwards.
const HURT_KNOCKBACK_TICKS: u32 = 8;
const FALL_TICKS: u32 = 24;
const PLUNGE_TICKS: u32 = 20;
const BACK_TO_GROUND_TICKS: u32 = 12;
const SWING_TICKS: u32 = 8;
const SPIN_TICKS: u32 = 14;
const SPIN_CHARGE_TICKS: u32 = 30;
const TAP_RETRY_TICKS: u32 = 8;
const LIFT_TICKS: u32 = 10;
const USE_ITEM_TICKS: u32 = 10;
const PROJECTILE_STATE_TICKS: u32 = 6;
const RUNNING_SPEED_BONUS: i32 = 1;

fn rules_ignoring_all_grounds() -> TraversalRules {
    TraversalRules::flyer()
}

/// Default state: the player walks freely, may draw the sword, push,
/// grab, lift, take stairs.
#[derive(Debug, Default)]
pub struct FreeState {
    pushing_against: Option<(EntityId, Direction4)>,
    push_ticks: u32,
}

impl StateBehavior for FreeState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Free
    }

    fn can_start_sword(&self) -> bool {
        true
    }

    fn can_push(&self) -> bool {
        true
    }

    fn can_grab(&self) -> bool {
        true
    }

    fn can_take_stairs(&self) -> bool {
        true
    }

    fn can_use_item(&self) -> bool {
        true
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        let input = ctx.input();
        if input.attack_pressed {
            ctx.request_state(Box::new(SwordSwingingState::default()));
            return;
        }
        if input.item_pressed {
            ctx.request_state(Box::new(UsingItemState::default()));
            return;
        }
        let Some(direction) = input.wanted_direction else {
            self.pushing_against = None;
            self.push_ticks = 0;
            return;
        };
        let rules = self.traversal_rules();
        let walk = ctx.walk(direction, &rules);
        let blocker = match walk.obstruction {
            Some(Obstruction::Entity(id)) if walk.pixels_moved == 0 => Some(id),
            _ => None,
        };
        match blocker {
            Some(id) if ctx.entity_is_pushable_block(id) => {
                if self.pushing_against == Some((id, direction)) {
                    self.push_ticks += 1;
                } else {
                    self.pushing_against = Some((id, direction));
                    self.push_ticks = 1;
                }
                if self.push_ticks >= PUSH_TRIGGER_TICKS {
                    ctx.request_state(Box::new(PushingState::new(id, direction)));
                }
            }
            Some(id) if input.action_pressed => {
                ctx.request_state(Box::new(GrabbingState::new(Some(id))));
            }
            _ => {
                self.pushing_against = None;
                self.push_ticks = 0;
            }
        }
    }
}

/// Walking while holding something overhead. No sword, no pushing;
/// the action command throws and returns to Free.
#[derive(Debug, Default)]
pub struct CarryingState;

impl StateBehavior for CarryingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Carrying
    }

    fn can_take_stairs(&self) -> bool {
        true
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        let input = ctx.input();
        if input.action_pressed {
            let facing = ctx.facing();
            ctx.spawn_projectile(EntityType::CarriedObject, facing);
            ctx.request_state(Box::new(FreeState::default()));
            return;
        }
        if let Some(direction) = input.wanted_direction {
            let rules = self.traversal_rules();
            ctx.walk(direction, &rules);
        }
    }
}

/// In deep water. Leaves for Free as soon as the ground under the hero
/// is solid again.
#[derive(Debug, Default)]
pub struct SwimmingState;

impl StateBehavior for SwimmingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Swimming
    }

    fn is_affected_by_ground(&self, ground: Ground) -> bool {
        // Already in the water; only holes and burns still apply.
        matches!(ground, Ground::Hole | Ground::Lava | Ground::Prickles)
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        if let Some(direction) = ctx.input().wanted_direction {
            let rules = self.traversal_rules();
            ctx.walk(direction, &rules);
        }
        if ctx.effective_ground_under_hero() != Ground::DeepWater {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Pushing a block. Tracks elapsed push time; the push only registers
/// as a move after a minimum delay.
#[derive(Debug)]
pub struct PushingState {
    block: EntityId,
    direction: Direction4,
    elapsed_ticks: u32,
}

impl PushingState {
    pub fn new(block: EntityId, direction: Direction4) -> Self {
        Self {
            block,
            direction,
            elapsed_ticks: 0,
        }
    }
}

impl StateBehavior for PushingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Pushing
    }

    fn can_push(&self) -> bool {
        true
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        if ctx.input().wanted_direction != Some(self.direction) {
            ctx.request_state(Box::new(FreeState::default()));
            return;
        }
        self.elapsed_ticks += 1;
        if self.elapsed_ticks >= BLOCK_PUSH_DELAY_TICKS && !ctx.block_is_sliding(self.block) {
            ctx.try_push_block(self.block, self.direction);
        }
        let rules = self.traversal_rules();
        ctx.walk(self.direction, &rules);
    }
}

/// Pulling a grabbed block while walking backwards.
#[derive(Debug)]
pub struct PullingState {
    block: Option<EntityId>,
    elapsed_ticks: u32,
}

impl PullingState {
    pub fn new(block: Option<EntityId>) -> Self {
        Self {
            block,
            elapsed_ticks: 0,
        }
    }
}

impl StateBehavior for PullingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Pulling
    }

    fn can_pull(&self) -> bool {
        true
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        let input = ctx.input();
        if !input.action_pressed {
            ctx.request_state(Box::new(FreeState::default()));
            return;
        }
        let backwards = ctx.facing().opposite();
        if input.wanted_direction != Some(backwards) {
            ctx.request_state(Box::new(GrabbingState::new(self.block)));
            return;
        }
        self.elapsed_ticks += 1;
        if self.elapsed_ticks < BLOCK_PUSH_DELAY_TICKS {
            return;
        }
        let rules = self.traversal_rules();
        let facing = ctx.facing();
        let walked = ctx.walk_with_speed(backwards, &rules, 1);
        // walk() updates facing; keep facing the block.
        ctx.set_facing(facing);
        if walked.pixels_moved > 0 {
            if let Some(block) = self.block {
                if !ctx.block_is_sliding(block) {
                    ctx.try_push_block(block, backwards);
                }
            }
        }
    }
}

/// Holding an obstacle with the action command.
#[derive(Debug)]
pub struct GrabbingState {
    grabbed: Option<EntityId>,
}

impl GrabbingState {
    pub fn new(grabbed: Option<EntityId>) -> Self {
        Self { grabbed }
    }
}

impl StateBehavior for GrabbingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Grabbing
    }

    fn can_grab(&self) -> bool {
        true
    }

    fn can_pull(&self) -> bool {
        true
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        let input = ctx.input();
        if !input.action_pressed {
            ctx.request_state(Box::new(FreeState::default()));
            return;
        }
        if input.wanted_direction == Some(ctx.facing().opposite()) {
            let pullable = self
                .grabbed
                .filter(|id| ctx.entity_is_pushable_block(*id));
            ctx.request_state(Box::new(PullingState::new(pullable)));
        }
    }
}

/// Sword held, charging a spin attack. Walking is allowed; running into
/// an obstacle switches to tapping.
#[derive(Debug, Default)]
pub struct SwordLoadingState {
    charge_ticks: u32,
}

impl SwordLoadingState {
    fn with_charge(charge_ticks: u32) -> Self {
        Self { charge_ticks }
    }

    fn release(charge_ticks: u32, ctx: &mut HeroContext<'_>) {
        if charge_ticks >= SPIN_CHARGE_TICKS {
            ctx.request_state(Box::new(SpinAttackState::default()));
        } else {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

impl StateBehavior for SwordLoadingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::SwordLoading
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.charge_ticks += 1;
        if !ctx.input().attack_pressed {
            Self::release(self.charge_ticks, ctx);
            return;
        }
        if let Some(direction) = ctx.input().wanted_direction {
            let rules = self.traversal_rules();
            let walk = ctx.walk(direction, &rules);
            if walk.pixels_moved == 0 && walk.obstruction.is_some() && direction == ctx.facing() {
                ctx.request_state(Box::new(SwordTappingState::new(self.charge_ticks)));
            }
        }
    }
}

/// Tapping the sword against the obstacle ahead.
#[derive(Debug)]
pub struct SwordTappingState {
    charge_ticks: u32,
    ticks: u32,
}

impl SwordTappingState {
    pub fn new(charge_ticks: u32) -> Self {
        Self {
            charge_ticks,
            ticks: 0,
        }
    }
}

impl StateBehavior for SwordTappingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::SwordTapping
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.charge_ticks += 1;
        self.ticks += 1;
        if !ctx.input().attack_pressed {
            SwordLoadingState::release(self.charge_ticks, ctx);
            return;
        }
        if self.ticks >= TAP_RETRY_TICKS && ctx.input().wanted_direction != Some(ctx.facing()) {
            ctx.request_state(Box::new(SwordLoadingState::with_charge(self.charge_ticks)));
        }
    }
}

/// The sword swing animation.
#[derive(Debug, Default)]
pub struct SwordSwingingState {
    ticks: u32,
}

impl StateBehavior for SwordSwingingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::SwordSwinging
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.ticks += 1;
        if self.ticks < SWING_TICKS {
            return;
        }
        if ctx.input().attack_pressed {
            ctx.request_state(Box::new(SwordLoadingState::default()));
        } else {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Spinning with the sword out. The hero crosses holes, deep water and
/// lava during the spin, and the sword hits twice as hard.
#[derive(Debug, Default)]
pub struct SpinAttackState {
    ticks: u32,
}

impl StateBehavior for SpinAttackState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::SpinAttack
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn sword_damage_factor(&self) -> u32 {
        2
    }

    fn traversal_rules(&self) -> TraversalRules {
        rules_ignoring_all_grounds()
    }

    fn is_affected_by_ground(&self, _ground: Ground) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.ticks += 1;
        if self.ticks >= SPIN_TICKS {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Lifting something off the ground; hands over to Carrying.
#[derive(Debug, Default)]
pub struct LiftingState {
    ticks: u32,
}

impl StateBehavior for LiftingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Lifting
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.ticks += 1;
        if self.ticks >= LIFT_TICKS {
            ctx.request_state(Box::new(CarryingState));
        }
    }
}

/// Brandishing a treasure. Frozen until the action command.
#[derive(Debug, Default)]
pub struct TreasureState;

impl StateBehavior for TreasureState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Treasure
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn can_be_hurt(&self) -> bool {
        false
    }

    fn is_affected_by_ground(&self, _ground: Ground) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        if ctx.input().action_pressed {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Sprinting in the facing direction until something stops it.
#[derive(Debug, Default)]
pub struct RunningState;

impl StateBehavior for RunningState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Running
    }

    fn can_start_sword(&self) -> bool {
        true
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        let rules = self.traversal_rules();
        let direction = ctx.facing();
        let speed = crate::hero::HERO_WALKING_SPEED + RUNNING_SPEED_BONUS;
        let walk = ctx.walk_with_speed(direction, &rules, speed);
        if walk.pixels_moved == 0 || !ctx.input().action_pressed {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Movement imposed by the map (conveyors, scripted walks). Not under
/// player control.
#[derive(Debug)]
pub struct ForcedWalkingState {
    direction: Direction4,
    remaining_pixels: i32,
}

impl ForcedWalkingState {
    pub fn new(direction: Direction4, distance: i32) -> Self {
        Self {
            direction,
            remaining_pixels: distance.max(0),
        }
    }
}

impl StateBehavior for ForcedWalkingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::ForcedWalking
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        let rules = self.traversal_rules();
        let walk = ctx.walk(self.direction, &rules);
        self.remaining_pixels -= walk.pixels_moved;
        if self.remaining_pixels <= 0 || walk.pixels_moved == 0 {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Airborne: jumps over low walls and hazards.
#[derive(Debug)]
pub struct JumpingState {
    direction: Direction4,
    remaining_pixels: i32,
}

impl JumpingState {
    pub fn new(direction: Direction4, distance: i32) -> Self {
        Self {
            direction,
            remaining_pixels: distance.max(0),
        }
    }
}

impl StateBehavior for JumpingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Jumping
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn can_be_hurt(&self) -> bool {
        false
    }

    fn traversal_rules(&self) -> TraversalRules {
        rules_ignoring_all_grounds()
    }

    fn is_affected_by_ground(&self, _ground: Ground) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        let rules = self.traversal_rules();
        let walk = ctx.walk(self.direction, &rules);
        self.remaining_pixels -= walk.pixels_moved;
        if self.remaining_pixels <= 0 || walk.pixels_moved == 0 {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Knocked back after taking damage. Cannot be hurt again while it
/// lasts, and ignores every ground effect except holes.
#[derive(Debug)]
pub struct HurtState {
    knockback: Option<Direction4>,
    ticks: u32,
}

impl HurtState {
    pub fn new(knockback: Option<Direction4>) -> Self {
        Self { knockback, ticks: 0 }
    }
}

impl StateBehavior for HurtState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Hurt
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn can_be_hurt(&self) -> bool {
        false
    }

    fn is_affected_by_ground(&self, ground: Ground) -> bool {
        ground == Ground::Hole
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.ticks += 1;
        if self.ticks <= HURT_KNOCKBACK_TICKS {
            if let Some(direction) = self.knockback {
                let rules = self.traversal_rules();
                let facing = ctx.facing();
                ctx.walk(direction, &rules);
                ctx.set_facing(facing);
            }
        }
        if self.ticks >= HURT_TICKS {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Splashing into deep water; resolves to Swimming or Free.
#[derive(Debug, Default)]
pub struct PlungingState {
    ticks: u32,
}

impl StateBehavior for PlungingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Plunging
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn can_be_hurt(&self) -> bool {
        false
    }

    fn is_affected_by_ground(&self, _ground: Ground) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.ticks += 1;
        if self.ticks < PLUNGE_TICKS {
            return;
        }
        if ctx.effective_ground_under_hero() == Ground::DeepWater {
            ctx.request_state(Box::new(SwimmingState));
        } else {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Falling into a hole. Does not re-trigger on the hole it is already
/// falling into; ends by returning to solid ground.
#[derive(Debug, Default)]
pub struct FallingState {
    ticks: u32,
}

impl StateBehavior for FallingState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Falling
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn can_be_hurt(&self) -> bool {
        false
    }

    fn traversal_rules(&self) -> TraversalRules {
        rules_ignoring_all_grounds()
    }

    fn is_affected_by_ground(&self, _ground: Ground) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.ticks += 1;
        if self.ticks >= FALL_TICKS {
            ctx.request_state(Box::new(BackToSolidGroundState::default()));
        }
    }
}

/// Reappearing on the last solid ground after a fall or drowning.
#[derive(Debug, Default)]
pub struct BackToSolidGroundState {
    ticks: u32,
}

impl StateBehavior for BackToSolidGroundState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::BackToSolidGround
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn can_be_hurt(&self) -> bool {
        false
    }

    fn is_affected_by_ground(&self, _ground: Ground) -> bool {
        false
    }

    fn start(&mut self, ctx: &mut HeroContext<'_>, _previous: Option<HeroStateKind>) {
        let respawn = ctx.respawn_point();
        ctx.teleport(respawn);
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.ticks += 1;
        if self.ticks >= BACK_TO_GROUND_TICKS {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Walking a staircase: forced diagonal-free walk, untouchable.
#[derive(Debug)]
pub struct StairsState {
    direction: Direction4,
    remaining_pixels: i32,
}

impl StairsState {
    pub fn new(direction: Direction4, distance: i32) -> Self {
        Self {
            direction,
            remaining_pixels: distance.max(0),
        }
    }
}

impl StateBehavior for StairsState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Stairs
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn can_be_hurt(&self) -> bool {
        false
    }

    fn is_affected_by_ground(&self, _ground: Ground) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        let rules = rules_ignoring_all_grounds();
        let walk = ctx.walk_with_speed(self.direction, &rules, 1);
        self.remaining_pixels -= walk.pixels_moved;
        if self.remaining_pixels <= 0 {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// End-of-dungeon pose. Only a script (or the action command) ends it.
#[derive(Debug, Default)]
pub struct VictoryState;

impl StateBehavior for VictoryState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Victory
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn can_be_hurt(&self) -> bool {
        false
    }

    fn is_affected_by_ground(&self, _ground: Ground) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        if ctx.input().action_pressed {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

/// Generic equipment-item animation.
#[derive(Debug, Default)]
pub struct UsingItemState {
    ticks: u32,
}

impl StateBehavior for UsingItemState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::UsingItem
    }

    fn can_control_movement(&self) -> bool {
        false
    }

    fn update(&mut self, ctx: &mut HeroContext<'_>) {
        self.ticks += 1;
        if self.ticks >= USE_ITEM_TICKS {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }
}

macro_rules! projectile_state {
    ($name:ident, $kind:ident, $entity_type:ident) => {
        #[derive(Debug, Default)]
        pub struct $name {
            ticks: u32,
        }

        impl StateBehavior for $name {
            fn kind(&self) -> HeroStateKind {
                HeroStateKind::$kind
            }

            fn can_control_movement(&self) -> bool {
                false
            }

            fn start(&mut self, ctx: &mut HeroContext<'_>, _previous: Option<HeroStateKind>) {
                let facing = ctx.facing();
                ctx.spawn_projectile(EntityType::$entity_type, facing);
            }

            fn update(&mut self, ctx: &mut HeroContext<'_>) {
                self.ticks += 1;
                if self.ticks >= PROJECTILE_STATE_TICKS {
                    ctx.request_state(Box::new(FreeState::default()));
                }
            }
        }
    };
}

projectile_state!(BoomerangState, Boomerang, Boomerang);
projectile_state!(HookshotState, Hookshot, Hookshot);
projectile_state!(BowState, Bow, Arrow);

/// Scripted freeze: the hero stands still until a script releases it.
#[derive(Debug, Default)]
pub struct FrozenState;

impl StateBehavior for FrozenState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Frozen
    }

    fn can_control_movement(&self) -> bool {
        false
    }
}

/// Script-defined state: every predicate keeps its default answer; the
/// script drives behavior through the ordinary public operations.
#[derive(Debug)]
pub struct CustomState {
    name: String,
}

impl CustomState {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl StateBehavior for CustomState {
    fn kind(&self) -> HeroStateKind {
        HeroStateKind::Custom
    }
}
