//! Event-tracker invariants (spec §8 invariants 3, 4, 5) and scenarios S2, S3, S4, exercised
//! purely through the crate's public API.

use std::any::Any;
use std::sync::Arc;

use ecsim::{
    Body, Capability, ComponentDesc, ComponentId, EntityId, EventSink, ExecutionContext, ExecutionOptions,
    ExecutionOrder, Registry, SystemDesc, SystemId, SystemRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Health {
    hp: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tag;

#[derive(Default)]
struct Recorder {
    inits: Vec<(EntityId, ComponentId)>,
    updates: Vec<(EntityId, ComponentId)>,
    removes: Vec<(EntityId, ComponentId)>,
}

impl EventSink for Recorder {
    fn on_init(&mut self, entity: EntityId, component: ComponentId, _value: &dyn Any) {
        self.inits.push((entity, component));
    }
    fn on_update(&mut self, entity: EntityId, component: ComponentId, _value: &dyn Any) {
        self.updates.push((entity, component));
    }
    fn on_remove(&mut self, entity: EntityId, component: ComponentId, _value: &dyn Any) {
        self.removes.push((entity, component));
    }
}

#[test]
fn s2_tick_scoped_init_event() {
    // Given
    let mut registry = Registry::new(None);
    let position = ComponentId::new(0);
    registry.register_component(ComponentDesc::new::<Health>(position));
    let entity = registry.create_entity();

    let mut systems = SystemRegistry::new();
    systems.register(
        SystemDesc::new(
            SystemId::new(0),
            Body::Native(Arc::new(move |ctx: &mut ExecutionContext<'_>| {
                ctx.add(position, Health { hp: 10 });
            })),
        )
        .with_capability(position, Capability::Adds),
    );
    let order = ExecutionOrder::new(vec![SystemId::new(0)]);
    let _ = entity;
    let mut sink = Recorder::default();

    // When
    ecsim::execute_systems(&mut registry, &systems, &order, ExecutionOptions::new(), None, &mut sink);

    // Then
    assert_eq!(sink.inits.len(), 1);
    assert!(sink.updates.is_empty());
}

#[test]
fn s3_update_write_equal_is_suppressed() {
    // Given
    let mut registry = Registry::new(None);
    let health = ComponentId::new(0);
    registry.register_component(ComponentDesc::new::<Health>(health).with_compare::<Health>());
    let entity = registry.create_entity();
    registry.add_component(entity, health, Health { hp: 10 }).unwrap();

    let mut systems = SystemRegistry::new();
    systems.register(
        SystemDesc::new(
            SystemId::new(0),
            Body::Native(Arc::new(move |ctx: &mut ExecutionContext<'_>| {
                ctx.update(health, Health { hp: 10 });
            })),
        )
        .with_capability(health, Capability::Readwrite { optional: false }),
    );
    let order = ExecutionOrder::new(vec![SystemId::new(0)]);
    let mut sink = Recorder::default();

    // When
    ecsim::execute_systems(&mut registry, &systems, &order, ExecutionOptions::new(), None, &mut sink);

    // Then
    assert!(sink.updates.is_empty());
}

#[test]
fn invariant_5_genuine_update_fires() {
    // Given
    let mut registry = Registry::new(None);
    let health = ComponentId::new(0);
    registry.register_component(ComponentDesc::new::<Health>(health).with_compare::<Health>());
    let entity = registry.create_entity();
    registry.add_component(entity, health, Health { hp: 10 }).unwrap();

    let mut systems = SystemRegistry::new();
    systems.register(
        SystemDesc::new(
            SystemId::new(0),
            Body::Native(Arc::new(move |ctx: &mut ExecutionContext<'_>| {
                ctx.update(health, Health { hp: 3 });
            })),
        )
        .with_capability(health, Capability::Readwrite { optional: false }),
    );
    let order = ExecutionOrder::new(vec![SystemId::new(0)]);
    let mut sink = Recorder::default();

    // When
    ecsim::execute_systems(&mut registry, &systems, &order, ExecutionOptions::new(), None, &mut sink);

    // Then
    assert_eq!(sink.updates, vec![(entity, health)]);
}

#[test]
fn s4_add_then_remove_in_the_same_tick_suppresses_the_init_event() {
    // Given: system A adds Tag; system B, later in the same tick's order, removes it. A
    // child-system variant of this cannot observe the add at all — pending adds aren't visible
    // to a child's view until the parent's own flush (spec §4.5 step 3d) — so this drives the
    // cancellation through two top-level systems, where B's view is built only after A's flush
    // has already materialized the add.
    let mut registry = Registry::new(None);
    let tag = ComponentId::new(0);
    registry.register_component(ComponentDesc::new::<Tag>(tag));
    let entity = registry.create_entity();

    let mut systems = SystemRegistry::new();
    systems.register(
        SystemDesc::new(
            SystemId::new(0),
            Body::Native(Arc::new(move |ctx: &mut ExecutionContext<'_>| {
                ctx.add(tag, Tag);
            })),
        )
        .with_capability(tag, Capability::Adds),
    );
    systems.register(
        SystemDesc::new(
            SystemId::new(1),
            Body::Native(Arc::new(move |ctx: &mut ExecutionContext<'_>| {
                ctx.remove(tag);
            })),
        )
        .with_capability(tag, Capability::Removes),
    );
    let order = ExecutionOrder::new(vec![SystemId::new(0), SystemId::new(1)]);
    let _ = entity;
    let mut sink = Recorder::default();

    // When
    ecsim::execute_systems(&mut registry, &systems, &order, ExecutionOptions::new(), None, &mut sink);

    // Then: the entity no longer holds Tag at tick end, so no init callback fires for it
    // (invariant 3); the component did genuinely exist in live storage before B's removal, so a
    // remove callback still fires with its value.
    assert!(sink.inits.is_empty());
    assert_eq!(sink.removes, vec![(entity, tag)]);
    assert!(!registry.has_component(entity, tag));
}

#[test]
fn invariant_4_remove_fires_with_the_last_live_value() {
    // Given
    let mut registry = Registry::new(None);
    let health = ComponentId::new(0);
    registry.register_component(ComponentDesc::new::<Health>(health));
    let entity = registry.create_entity();
    registry.add_component(entity, health, Health { hp: 42 }).unwrap();

    let mut systems = SystemRegistry::new();
    systems.register(
        SystemDesc::new(
            SystemId::new(0),
            Body::Native(Arc::new(move |ctx: &mut ExecutionContext<'_>| {
                ctx.remove(health);
            })),
        )
        .with_capability(health, Capability::Removes),
    );
    let order = ExecutionOrder::new(vec![SystemId::new(0)]);
    let mut sink = Recorder::default();

    // When
    ecsim::execute_systems(&mut registry, &systems, &order, ExecutionOptions::new(), None, &mut sink);

    // Then
    assert_eq!(sink.removes, vec![(entity, health)]);
    assert!(!registry.has_component(entity, health));
}
