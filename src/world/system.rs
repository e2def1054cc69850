use std::cell::RefCell;
use std::rc::Rc;

use super::World;
use crate::component::Component;
use crate::event::{Event, EventRef};
use crate::id::{ComponentId, EventId, QueryId, SystemId};
use crate::query::{self, ErasedQueryFn, QueryDescription, QueryFn};
use crate::scheduler::SystemDescription;

/// The runtime state of a registered system.
pub(crate) struct SystemState {
    pub(crate) name:     String,
    pub(crate) query:    QueryDescription,
    pub(crate) query_id: QueryId,
    pub(crate) accepts:  fn(Option<EventRef<'_>>) -> bool,
    pub(crate) callback: RefCell<Box<ErasedQueryFn>>,
}

/// Configures a system before registering it with [`SystemBuilder::for_each`].
#[must_use = "the system is only registered by `for_each`"]
pub struct SystemBuilder<'w> {
    world:   &'w World,
    name:    String,
    with:    Vec<ComponentId>,
    without: Vec<ComponentId>,
    events:  Vec<EventId>,
    before:  Vec<String>,
    after:   Vec<String>,
}

impl<'w> SystemBuilder<'w> {
    pub(super) fn new(world: &'w World, name: String) -> Self {
        Self {
            world,
            name,
            with: Vec::new(),
            without: Vec::new(),
            events: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Only matches entities with the component.
    pub fn with<T: Component>(mut self) -> Self {
        self.with.push(ComponentId::of::<T>());
        self
    }

    /// Only matches entities without the component.
    pub fn without<T: Component>(mut self) -> Self {
        self.without.push(ComponentId::of::<T>());
        self
    }

    /// Subscribes the system to an event type.
    ///
    /// Subscribing to [`OnChange`](crate::event::OnChange)
    /// tracks changes of the trackable components in the `with` list.
    pub fn on_event<E: Event>(mut self) -> Self {
        let id = EventId::of::<E>();
        if !self.events.contains(&id) {
            self.events.push(id);
        }
        self
    }

    /// Runs this system before the named system.
    pub fn before(mut self, name: impl Into<String>) -> Self {
        self.before.push(name.into());
        self
    }

    /// Runs this system after the named system.
    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.after.push(name.into());
        self
    }

    /// Registers the system with its callable.
    ///
    /// Components accessed by the parameters of `func` are implicitly required,
    /// and [`On`](crate::query::On) parameters implicitly subscribe to their event.
    /// If a system with the same name exists, it is kept and the new one is discarded.
    ///
    /// # Panics
    /// Panics if the name is empty or the parameters alias a component mutably.
    pub fn for_each<Func, Marker>(self, func: Func) -> System<'w>
    where
        Func: QueryFn<Marker> + 'static,
        Marker: 'static,
    {
        let signature = query::signature_of::<Func, Marker>();
        let with = self.with.into_iter().chain(signature.components()).collect();
        let query = QueryDescription::new(with, self.without);
        let query_id = self.world.register_query(&query);

        let state = SystemState {
            name: self.name.clone(),
            query,
            query_id,
            accepts: Func::accepts,
            callback: RefCell::new(query::erase(func)),
        };

        let mut description = SystemDescription::new(self.name, Rc::new(state));
        description.on_events = self.events;
        for &event in signature.events() {
            if !description.on_events.contains(&event) {
                description.on_events.push(event);
            }
        }
        description.before = self.before;
        description.after = self.after;

        let id = self.world.register_system(description);
        System { world: self.world, id }
    }
}

/// A handle to a registered system.
#[derive(Clone, Copy)]
pub struct System<'w> {
    world: &'w World,
    id:    SystemId,
}

impl<'w> System<'w> {
    /// The identity of the system.
    pub fn id(&self) -> SystemId { self.id }

    /// Runs the system over all matching entities.
    ///
    /// Systems whose parameters require an event do not run.
    pub fn run(&self) { self.world.run_system(self.id) }
}
