use std::ops::Deref;

use super::{Fetch, FetchContext, Signature};
use crate::archetype::{Archetype, ColumnBorrow};
use crate::component::Component;
use crate::entity::{ArchetypeEntityIndex, EntityId};
use crate::event::{Event, EventRef};
use crate::id::ComponentId;
use crate::world::World;

fn column_of<T: Component>(archetype: &Archetype) -> usize {
    archetype.column_of(ComponentId::of::<T>()).unwrap_or_else(|| {
        panic!(
            "Archetype {:?} matched a query without the required component {}",
            archetype.id(),
            std::any::type_name::<T>()
        )
    })
}

// Safety: accesses no component.
unsafe impl Fetch for EntityId {
    type Item<'a> = EntityId;
    type State = ();

    fn describe(_: &mut Signature) {}

    fn prepare(_: &Archetype) {}

    unsafe fn fetch<'a>(
        _: (),
        context: &FetchContext<'a>,
        index: ArchetypeEntityIndex,
    ) -> EntityId {
        context.archetype.entity_at(index)
    }
}

// Safety: reads are declared.
unsafe impl<'x, T: Component> Fetch for &'x T {
    type Item<'a> = &'a T;
    type State = usize;

    fn describe(signature: &mut Signature) { signature.read::<T>(); }

    fn prepare(archetype: &Archetype) -> usize { column_of::<T>(archetype) }

    fn borrow(archetype: &Archetype, column: usize) -> Option<ColumnBorrow<'_>> {
        Some(archetype.borrow_column(column, false))
    }

    unsafe fn fetch<'a>(
        column: usize,
        context: &FetchContext<'a>,
        index: ArchetypeEntityIndex,
    ) -> &'a T {
        context.archetype.component_ptr(column, index).cast::<T>().as_ref()
    }
}

// Safety: writes are declared.
unsafe impl<'x, T: Component> Fetch for &'x mut T {
    type Item<'a> = &'a mut T;
    type State = usize;

    fn describe(signature: &mut Signature) { signature.write::<T>(); }

    fn prepare(archetype: &Archetype) -> usize { column_of::<T>(archetype) }

    fn borrow(archetype: &Archetype, column: usize) -> Option<ColumnBorrow<'_>> {
        Some(archetype.borrow_column(column, true))
    }

    unsafe fn fetch<'a>(
        column: usize,
        context: &FetchContext<'a>,
        index: ArchetypeEntityIndex,
    ) -> &'a mut T {
        context.archetype.component_ptr(column, index).cast::<T>().as_mut()
    }
}

// Safety: the world only exposes operations that are deferred while it is locked.
unsafe impl<'x> Fetch for &'x World {
    type Item<'a> = &'a World;
    type State = ();

    fn describe(_: &mut Signature) {}

    fn prepare(_: &Archetype) {}

    unsafe fn fetch<'a>(_: (), context: &FetchContext<'a>, _: ArchetypeEntityIndex) -> &'a World {
        context.world
    }
}

// Safety: accesses no component.
unsafe impl<'x> Fetch for EventRef<'x> {
    type Item<'a> = EventRef<'a>;
    type State = ();

    fn describe(_: &mut Signature) {}

    fn prepare(_: &Archetype) {}

    unsafe fn fetch<'a>(
        _: (),
        context: &FetchContext<'a>,
        _: ArchetypeEntityIndex,
    ) -> EventRef<'a> {
        context.event.unwrap_or_else(|| panic!("EventRef parameters require an event dispatch"))
    }
}

/// The payload of a typed event.
///
/// Systems taking this parameter are subscribed to `E`
/// and only run when an `E` is dispatched.
#[derive(Debug)]
pub struct On<'a, E>(&'a E);

impl<'a, E> Clone for On<'a, E> {
    fn clone(&self) -> Self { *self }
}

impl<'a, E> Copy for On<'a, E> {}

impl<'a, E> On<'a, E> {
    /// Returns the payload with the lifetime of the dispatch.
    pub fn get(self) -> &'a E { self.0 }
}

impl<'a, E> Deref for On<'a, E> {
    type Target = E;

    fn deref(&self) -> &E { self.0 }
}

// Safety: accesses no component.
unsafe impl<'x, E: Event> Fetch for On<'x, E> {
    type Item<'a> = On<'a, E>;
    type State = ();

    fn describe(signature: &mut Signature) { signature.subscribe::<E>(); }

    fn prepare(_: &Archetype) {}

    fn accepts(event: Option<EventRef<'_>>) -> bool {
        event.map_or(false, |event| event.is::<E>())
    }

    unsafe fn fetch<'a>(_: (), context: &FetchContext<'a>, _: ArchetypeEntityIndex) -> On<'a, E> {
        let event = context.event.and_then(|event| event.downcast::<E>());
        On(event.unwrap_or_else(|| {
            panic!("On<{}> requires a dispatch of that event", std::any::type_name::<E>())
        }))
    }
}
