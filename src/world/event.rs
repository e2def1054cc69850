use std::marker::PhantomData;

use super::World;
use crate::entity::EntityId;
use crate::event::{Event, EventRef};

/// Configures the target of an event.
///
/// Events without a target entity are broadcast to every matching entity of each subscriber.
#[must_use = "events are only sent by `emit` or `emit_immediately`"]
pub struct EventBuilder<'w, E> {
    world:  &'w World,
    entity: EntityId,
    _ph:    PhantomData<fn(E)>,
}

impl<'w, E: Event> EventBuilder<'w, E> {
    pub(super) fn new(world: &'w World) -> Self {
        Self { world, entity: EntityId::INVALID, _ph: PhantomData }
    }

    /// Only sends the event to this entity.
    pub fn entity(mut self, entity: EntityId) -> Self {
        self.entity = entity;
        self
    }

    /// Queues the event for the next [`World::process_deferred_events`].
    pub fn emit(self, event: E) { self.world.events.push(self.entity, event); }

    /// Dispatches the event to its subscribers before returning.
    pub fn emit_immediately(self, event: E) {
        self.world.dispatch_event(self.entity, EventRef::new(&event));
    }
}
