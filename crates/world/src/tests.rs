    use std::cell::RefCell;
    use std::rc::Rc;

    use super::entities::block::Block;
    use super::entities::door::Door;
    use super::hero::states::FrozenState;
    use super::hero::{FreeState, HeroContext, StateBehavior};
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Removed(EntityType, Option<String>),
        HeroState(Option<HeroStateKind>, HeroStateKind),
    }

    #[derive(Clone, Default)]
    struct EventLog {
        events: Rc<RefCell<Vec<Event>>>,
    }

    impl EventLog {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut self.events.borrow_mut())
        }

        fn snapshot(&self) -> Vec<Event> {
            self.events.borrow().clone()
        }
    }

    impl WorldHooks for EventLog {
        fn on_entity_removed(&mut self, _id: EntityId, entity_type: EntityType, name: Option<&str>) {
            self.events
                .borrow_mut()
                .push(Event::Removed(entity_type, name.map(str::to_string)));
        }

        fn on_hero_state_changed(&mut self, previous: Option<HeroStateKind>, current: HeroStateKind) {
            self.events
                .borrow_mut()
                .push(Event::HeroState(previous, current));
        }
    }

    fn new_registry(width: i32, height: i32, max_layer: i32) -> EntityRegistry {
        EntityRegistry::new(MapGeometry {
            width,
            height,
            min_layer: 0,
            max_layer,
        })
    }

    fn add_wall(registry: &mut EntityRegistry, layer: i32, rect: Rectangle) -> EntityId {
        registry
            .add_entity(EntitySpec::new(EntityType::Wall, layer, rect))
            .expect("wall")
    }

    fn add_hero(registry: &mut EntityRegistry, x: i32, y: i32) -> EntityId {
        registry
            .add_entity(EntitySpec::new(
                EntityType::Hero,
                0,
                Rectangle::new(x, y, 16, 16),
            ))
            .expect("hero")
    }

    fn add_dynamic_tile(
        registry: &mut EntityRegistry,
        layer: i32,
        rect: Rectangle,
        ground: Ground,
    ) -> EntityId {
        registry
            .add_entity(
                EntitySpec::new(EntityType::DynamicTile, layer, rect).with_kind(
                    EntityKind::DynamicTile(DynamicTile {
                        ground,
                        enabled: true,
                    }),
                ),
            )
            .expect("dynamic tile")
    }

    fn hero_position(registry: &EntityRegistry) -> Point {
        let id = registry.hero_id().expect("hero id");
        registry
            .entity(id)
            .expect("hero entity")
            .bounding_box()
            .top_left()
    }

    fn hold_input(registry: &mut EntityRegistry, direction: Option<Direction4>) {
        registry.set_hero_input(HeroInput {
            wanted_direction: direction,
            ..HeroInput::default()
        });
    }

    #[test]
    fn spatial_queries_come_back_in_layer_then_z_order() {
        let mut registry = new_registry(256, 256, 1);
        let on_upper = add_wall(&mut registry, 1, Rectangle::new(32, 32, 16, 16));
        let first_low = add_wall(&mut registry, 0, Rectangle::new(40, 40, 16, 16));
        let second_low = add_wall(&mut registry, 0, Rectangle::new(36, 36, 16, 16));

        let hits = registry.query_rect(&Rectangle::new(0, 0, 128, 128));
        // Layer before Z, never insertion order.
        assert_eq!(hits, vec![first_low, second_low, on_upper]);
    }

    #[test]
    fn bring_to_front_and_back_reorder_within_the_layer() {
        let mut registry = new_registry(256, 256, 0);
        let rect = Rectangle::new(64, 64, 16, 16);
        let a = add_wall(&mut registry, 0, rect);
        let b = add_wall(&mut registry, 0, rect);
        let c = add_wall(&mut registry, 0, rect);

        registry.bring_to_front(a);
        assert_eq!(registry.query_rect(&rect), vec![b, c, a]);

        registry.bring_to_back(c);
        assert_eq!(registry.query_rect(&rect), vec![c, b, a]);

        // The untouched entity kept its original Z.
        assert_eq!(registry.entity(b).expect("b").z(), 1);
    }

    #[test]
    fn removal_is_deferred_until_the_end_of_the_tick() {
        let log = EventLog::default();
        let mut registry = new_registry(256, 256, 0);
        registry.set_hooks(Box::new(log.clone()));
        let rect = Rectangle::new(16, 16, 16, 16);
        let id = add_wall(&mut registry, 0, rect);

        registry.remove_entity(id);
        // Still visible to queries and lookups for the rest of the tick.
        assert_eq!(registry.query_rect(&rect), vec![id]);
        assert!(registry.entity(id).is_some());
        // Marking twice must not double-remove.
        registry.remove_entity(id);

        registry.update();
        assert!(registry.query_rect(&rect).is_empty());
        assert!(registry.entity(id).is_none());
        assert_eq!(
            log.take(),
            vec![Event::Removed(EntityType::Wall, None)]
        );
    }

    #[test]
    fn hero_transitions_apply_at_the_next_tick_boundary() {
        let log = EventLog::default();
        let mut registry = new_registry(256, 256, 0);
        registry.set_hooks(Box::new(log.clone()));
        add_hero(&mut registry, 64, 64);
        assert_eq!(registry.hero_state_kind(), Some(HeroStateKind::Free));

        registry.request_hero_state(Box::new(FrozenState));
        // Not yet: the request is applied at the start of the next tick.
        assert_eq!(registry.hero_state_kind(), Some(HeroStateKind::Free));

        registry.update();
        assert_eq!(registry.hero_state_kind(), Some(HeroStateKind::Frozen));

        registry.request_hero_state(Box::new(FreeState::default()));
        registry.update();
        assert_eq!(registry.hero_state_kind(), Some(HeroStateKind::Free));

        assert_eq!(
            log.take(),
            vec![
                Event::HeroState(Some(HeroStateKind::Free), HeroStateKind::Frozen),
                Event::HeroState(Some(HeroStateKind::Frozen), HeroStateKind::Free),
            ]
        );
    }

    /// Records every lifecycle call a hero state receives.
    struct TracedState {
        tag: &'static str,
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl TracedState {
        fn new(tag: &'static str, calls: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                tag,
                calls: Rc::clone(calls),
            }
        }
    }

    impl StateBehavior for TracedState {
        fn kind(&self) -> HeroStateKind {
            HeroStateKind::Custom
        }

        fn start(&mut self, _ctx: &mut HeroContext<'_>, _previous: Option<HeroStateKind>) {
            self.calls.borrow_mut().push(format!("{}:start", self.tag));
        }

        fn stop(&mut self, _ctx: &mut HeroContext<'_>, _next: HeroStateKind) {
            self.calls.borrow_mut().push(format!("{}:stop", self.tag));
        }

        fn update(&mut self, _ctx: &mut HeroContext<'_>) {
            self.calls.borrow_mut().push(format!("{}:update", self.tag));
        }
    }

    #[test]
    fn a_state_never_updates_between_its_stop_and_the_next_start() {
        let mut registry = new_registry(128, 128, 0);
        add_hero(&mut registry, 32, 32);
        let calls: Rc<RefCell<Vec<String>>> = Rc::default();

        registry.request_hero_state(Box::new(TracedState::new("first", &calls)));
        registry.update();
        registry.update();
        registry.request_hero_state(Box::new(TracedState::new("second", &calls)));
        registry.update();

        assert_eq!(
            calls.borrow().as_slice(),
            [
                "first:start",
                "first:update",
                "first:update",
                "first:stop",
                "second:start",
                "second:update",
            ]
        );
    }

    /// A state that immediately asks for another transition from inside
    /// its own `start`.
    struct OvereagerState;

    impl StateBehavior for OvereagerState {
        fn kind(&self) -> HeroStateKind {
            HeroStateKind::Custom
        }

        fn start(&mut self, ctx: &mut HeroContext<'_>, _previous: Option<HeroStateKind>) {
            ctx.request_state(Box::new(FreeState::default()));
        }
    }

    #[test]
    #[should_panic(expected = "inside its own start()")]
    fn requesting_a_state_from_inside_start_panics() {
        let mut registry = new_registry(128, 128, 0);
        add_hero(&mut registry, 32, 32);
        registry.request_hero_state(Box::new(OvereagerState));
        registry.update();
    }

    #[test]
    fn crystal_blocks_obstruct_only_while_raised() {
        let mut registry = new_registry(256, 256, 0);
        let orange_box = Rectangle::new(80, 64, 16, 16);
        let blue_box = Rectangle::new(16, 16, 16, 16);
        registry
            .add_entity(
                EntitySpec::new(EntityType::CrystalBlock, 0, orange_box)
                    .with_kind(EntityKind::CrystalBlock(CrystalBlockOrientation::Orange)),
            )
            .expect("orange block");
        registry
            .add_entity(
                EntitySpec::new(EntityType::CrystalBlock, 0, blue_box)
                    .with_kind(EntityKind::CrystalBlock(CrystalBlockOrientation::Blue)),
            )
            .expect("blue block");
        add_hero(&mut registry, 80, 80);

        // Initial crystal state: orange raised, blue lowered.
        assert!(registry.overlaps_raised_blocks(0, &orange_box));
        assert!(!registry.overlaps_raised_blocks(0, &blue_box));
        hold_input(&mut registry, Some(Direction4::Up));
        registry.update();
        assert_eq!(hero_position(&registry), Point::new(80, 80));

        registry.toggle_crystal_state();
        assert!(!registry.overlaps_raised_blocks(0, &orange_box));
        assert!(registry.overlaps_raised_blocks(0, &blue_box));
        hold_input(&mut registry, Some(Direction4::Up));
        registry.update();
        // The lowered orange block no longer obstructs.
        assert_eq!(hero_position(&registry), Point::new(80, 78));
    }

    #[test]
    fn topmost_ground_observer_wins_the_override() {
        let mut registry = new_registry(256, 256, 0);
        let rect = Rectangle::new(48, 48, 16, 16);
        let point = Point::new(52, 52);
        let under = add_dynamic_tile(&mut registry, 0, rect, Ground::Hole);
        let over = add_dynamic_tile(&mut registry, 0, rect, Ground::Ice);

        // Later insertion is closer to the top.
        assert_eq!(registry.effective_ground(0, point), Ground::Ice);

        registry.bring_to_front(under);
        assert_eq!(registry.effective_ground(0, point), Ground::Hole);

        // A disabled observer stops overriding; the grid value shows.
        registry.set_entity_enabled(under, false);
        assert_eq!(registry.effective_ground(0, point), Ground::Ice);
        registry.set_entity_enabled(over, false);
        assert_eq!(registry.effective_ground(0, point), Ground::Traversable);
    }

    #[test]
    fn door_reloads_as_its_terminal_state() {
        let mut registry = new_registry(256, 256, 0);
        let opening = registry
            .add_entity(
                EntitySpec::new(EntityType::Door, 0, Rectangle::new(0, 0, 16, 16))
                    .with_name("north_door")
                    .with_kind(EntityKind::Door(Door::new(false, Some("d1".to_string())))),
            )
            .expect("door");
        registry
            .entity_mut(opening)
            .expect("door")
            .as_door_mut()
            .expect("door kind")
            .open();
        assert_eq!(
            registry.entity(opening).expect("door").as_door().expect("door kind").state(),
            DoorState::Opening
        );

        let save = SaveGame::capture(&registry);

        let mut reloaded = new_registry(256, 256, 0);
        let door_id = reloaded
            .add_entity(
                EntitySpec::new(EntityType::Door, 0, Rectangle::new(0, 0, 16, 16))
                    .with_name("north_door")
                    .with_kind(EntityKind::Door(Door::new(false, Some("d1".to_string())))),
            )
            .expect("door");
        save.apply(&mut reloaded).expect("apply save");
        let door = reloaded.entity(door_id).expect("door").as_door().expect("door kind");
        assert_eq!(door.state(), DoorState::Open);
        assert!(!door.is_obstacle());
    }

    #[test]
    fn pushed_block_moves_one_cell_and_exhausts_its_budget() {
        let mut registry = new_registry(256, 256, 0);
        let block = registry
            .add_entity(
                EntitySpec::new(EntityType::Block, 0, Rectangle::new(80, 80, 16, 16))
                    .with_kind(EntityKind::Block(Block::new(true, Some(1)))),
            )
            .expect("block");
        let hero = add_hero(&mut registry, 80, 96);

        // Hold Up long enough to trigger the push, the push delay and
        // the full one-cell slide. The hero follows the block but never
        // enters a pixel the block still covers.
        for _ in 0..80 {
            hold_input(&mut registry, Some(Direction4::Up));
            registry.update();
            let hero_box = registry.entity(hero).expect("hero").bounding_box();
            let block_box = registry.entity(block).expect("block").bounding_box();
            assert!(!hero_box.overlaps(&block_box));
        }

        let block_entity = registry.entity(block).expect("block entity");
        assert_eq!(block_entity.bounding_box(), Rectangle::new(80, 64, 16, 16));
        assert_eq!(
            block_entity.as_block().expect("block kind").moves_remaining(),
            Some(0)
        );
        // The hero followed into the vacated cell and is still pressing
        // against the now-immovable block.
        assert_eq!(hero_position(&registry), Point::new(80, 80));

        // Budget exhausted: more pushing moves nothing.
        for _ in 0..40 {
            hold_input(&mut registry, Some(Direction4::Up));
            registry.update();
        }
        assert_eq!(
            registry.entity(block).expect("block entity").bounding_box(),
            Rectangle::new(80, 64, 16, 16)
        );
    }

    #[test]
    fn walking_into_a_hole_triggers_exactly_one_fall() {
        let log = EventLog::default();
        let mut registry = new_registry(64, 64, 0);
        registry.set_hooks(Box::new(log.clone()));
        for y8 in 0..8 {
            for x8 in 4..8 {
                registry.set_ground_cell(0, x8, y8, Ground::Hole);
            }
        }
        add_hero(&mut registry, 8, 8);

        // Walk right until the fall starts, then release the stick.
        for _ in 0..80 {
            let falling_seen = log
                .snapshot()
                .iter()
                .any(|event| matches!(event, Event::HeroState(_, HeroStateKind::Falling)));
            hold_input(
                &mut registry,
                if falling_seen {
                    None
                } else {
                    Some(Direction4::Right)
                },
            );
            registry.update();
        }

        let falls: Vec<Event> = log
            .snapshot()
            .into_iter()
            .filter(|event| matches!(event, Event::HeroState(_, HeroStateKind::Falling)))
            .collect();
        assert_eq!(
            falls,
            vec![Event::HeroState(
                Some(HeroStateKind::Free),
                HeroStateKind::Falling
            )]
        );
        // Back on the last solid ground, in the Free state.
        assert_eq!(registry.hero_state_kind(), Some(HeroStateKind::Free));
        assert_eq!(hero_position(&registry), Point::new(22, 8));
        assert_eq!(
            registry.effective_ground(0, Rectangle::new(22, 8, 16, 16).center()),
            Ground::Traversable
        );
    }

    #[test]
    fn separators_split_region_queries() {
        let mut registry = new_registry(256, 256, 0);
        registry
            .add_entity(
                EntitySpec::new(EntityType::Separator, 0, Rectangle::new(120, 0, 16, 256))
                    .with_kind(EntityKind::Separator(entities::separator::Separator)),
            )
            .expect("separator");
        let west = add_wall(&mut registry, 0, Rectangle::new(16, 16, 16, 16));
        let east = add_wall(&mut registry, 0, Rectangle::new(200, 16, 16, 16));

        let west_side = registry.query_region_around(Point::new(32, 32));
        assert!(west_side.contains(&west));
        assert!(!west_side.contains(&east));

        let east_side = registry.query_region_around(Point::new(200, 32));
        assert!(east_side.contains(&east));
        assert!(!east_side.contains(&west));

        // A point off the map belongs to no region.
        assert!(registry.query_region_around(Point::new(-4, 0)).is_empty());
    }

    #[test]
    fn loaded_map_plays_a_full_scenario() {
        let store = build_store(vec![TilesetSource {
            id: "field".to_string(),
            xml: r#"<tileset>
                <pattern id="1" ground="traversable"/>
                <pattern id="7" ground="deep_water"/>
            </tileset>"#
                .to_string(),
        }])
        .expect("tilesets");

        let mut registry = load_map_str(
            r#"<map width="128" height="128" min_layer="0" max_layer="0" tileset="field">
                <grounds layer="0">
                    <rect x8="12" y8="0" width8="4" height8="16" pattern="7"/>
                </grounds>
                <entities>
                    <entity type="hero" name="hero" layer="0" x="16" y="16"/>
                    <entity type="door" name="cellar_door" layer="0" x="64" y="16"
                            savegame_variable="cellar"/>
                </entities>
            </map>"#,
            std::path::Path::new("field.map.xml"),
            &store,
        )
        .expect("map");

        // The closed door blocks; opening it takes the transition time.
        let door = registry.find_entity("cellar_door").expect("door id");
        assert!(registry
            .entity(door)
            .expect("door")
            .as_door()
            .expect("door kind")
            .is_obstacle());
        registry
            .entity_mut(door)
            .expect("door")
            .as_door_mut()
            .expect("door kind")
            .open();
        for _ in 0..DOOR_TRANSITION_TICKS {
            registry.update();
        }
        assert!(registry
            .entity(door)
            .expect("door")
            .as_door()
            .expect("door kind")
            .is_open());

        // The pattern-painted water plunges the hero when walked into.
        for _ in 0..60 {
            hold_input(&mut registry, Some(Direction4::Right));
            registry.update();
            if registry.hero_state_kind() == Some(HeroStateKind::Plunging) {
                break;
            }
        }
        assert_eq!(registry.hero_state_kind(), Some(HeroStateKind::Plunging));
    }
