//! The world owns all entities, archetypes, systems and pending changes.
//!
//! Structural changes (creating, editing and destroying entities)
//! are applied immediately when the world is unlocked.
//! While the world is locked, which is always the case while a view or system runs,
//! they are staged in the [`CommandBuffer`] and applied when the outermost lock is released.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;

use auto_enums::auto_enum;
use xias::Xias;

use crate::archetype::{Archetype, ArchetypeIndex, TrackedChangeSink};
use crate::command::{CommandBuffer, CommandExecutor, PendingComponent};
use crate::component::{Bundle, Component, ComponentInfo};
use crate::entity::{ArchetypeEntityIndex, EntityId, EntityState, EntityStorage};
use crate::event::{Event, EventRef, EventStorage, OnAppear, OnChange, OnDisappear};
use crate::id::{ArchetypeId, ComponentId, EventId, QueryId, SystemId};
use crate::query::{FetchContext, QueryDescription, QueryCache};
use crate::scheduler::{OrderingIssue, SystemDescription, SystemStorage};

mod builder;
pub use builder::EntityBuilder;

mod config;
pub use config::Config;

mod event;
pub use event::EventBuilder;

mod system;
pub use system::{System, SystemBuilder};
use system::SystemState;

mod view;
pub use view::ViewBuilder;


/// The container of all ECS data.
pub struct World {
    config:        Config,
    entities:      RefCell<EntityStorage>,
    archetypes:    RefCell<Vec<Box<Archetype>>>,
    archetype_map: RefCell<HashMap<ArchetypeId, ArchetypeIndex>>,
    queries:       RefCell<QueryCache>,
    systems:       RefCell<SystemStorage<Rc<SystemState>>>,
    commands:      CommandBuffer,
    events:        EventStorage,
    lock_depth:    Cell<u32>,
}

impl Default for World {
    fn default() -> Self { Self::new() }
}

impl World {
    /// Creates an empty world with the default [`Config`].
    pub fn new() -> Self { Self::with_config(Config::default()) }

    /// Creates an empty world.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            entities: RefCell::default(),
            archetypes: RefCell::default(),
            archetype_map: RefCell::default(),
            queries: RefCell::default(),
            systems: RefCell::default(),
            commands: CommandBuffer::new(config.arena_chunk_size),
            events: EventStorage::new(config.arena_chunk_size),
            lock_depth: Cell::new(0),
        }
    }

    /// The configuration the world was created with.
    pub fn config(&self) -> &Config { &self.config }

    /// Starts building a new entity.
    pub fn entity(&self) -> EntityBuilder<'_, ()> { EntityBuilder::create(self) }

    /// Starts editing the components of an existing entity.
    ///
    /// Editing an entity that is not alive does nothing.
    pub fn edit(&self, entity: EntityId) -> EntityBuilder<'_, ()> {
        EntityBuilder::edit(self, entity)
    }

    /// Destroys an entity, dropping all its components.
    ///
    /// The destruction is deferred while the world is locked.
    /// Destroying an entity that is not alive does nothing.
    pub fn destroy(&self, entity: EntityId) {
        if !self.is_alive(entity) {
            return;
        }

        if self.is_locked() {
            self.entities.borrow_mut().mark_destroying(entity);
            self.commands.destroy(entity);
        } else {
            self.destroy_now(entity);
        }
    }

    /// Whether the entity exists and is not scheduled for destruction.
    pub fn is_alive(&self, entity: EntityId) -> bool { self.entities.borrow().is_alive(entity) }

    /// Whether the entity has the component, including changes staged while locked.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        let Some(record) = self.entities.borrow().get_any(entity) else { return false };
        record
            .effective_archetype()
            .map_or(false, |index| self.archetype(index).has(ComponentId::of::<T>()))
    }

    /// Starts building a one-off iteration over matching entities.
    pub fn view(&self) -> ViewBuilder<'_> { ViewBuilder::new(self) }

    /// Starts building a system with the given unique name.
    pub fn system(&self, name: impl Into<String>) -> SystemBuilder<'_> {
        SystemBuilder::new(self, name.into())
    }

    /// Starts building an event of type `E`.
    pub fn event<E: Event>(&self) -> EventBuilder<'_, E> { EventBuilder::new(self) }

    /// Queues a broadcast event for the next [`World::process_deferred_events`].
    pub fn emit<E: Event>(&self, event: E) { self.event::<E>().emit(event) }

    /// Dispatches a broadcast event to its subscribers right away.
    pub fn emit_immediately<E: Event>(&self, event: E) {
        self.event::<E>().emit_immediately(event)
    }

    /// The number of archetypes created so far.
    pub fn archetype_count(&self) -> usize { self.archetypes.borrow().len() }

    /// The number of entities that have not been destroyed.
    pub fn entity_count(&self) -> usize { self.entities.borrow().len() }

    /// Runs one frame: orders systems, dispatches the queued events,
    /// then runs every system without event subscriptions in order.
    pub fn tick(&self) {
        self.order_systems();
        self.process_deferred_events();

        let systems: Vec<Rc<SystemState>> = self
            .systems
            .borrow()
            .ordered()
            .filter(|description| description.on_events.is_empty())
            .map(|description| Rc::clone(&description.state))
            .collect();
        for state in systems {
            self.run_broadcast(&state, None);
        }
    }

    /// Resolves the run order of systems registered since the last call.
    pub fn order_systems(&self) -> Vec<OrderingIssue> {
        self.systems.borrow_mut().register_deferred()
    }

    /// Dispatches every queued event.
    ///
    /// Events emitted by the subscribers are queued for the next call.
    pub fn process_deferred_events(&self) {
        self.events.process_events(|entity, event| self.dispatch_event(entity, event));
    }

    /// Compares every tracked component with its snapshot
    /// and sends [`OnChange`] to the tracking systems for each changed span.
    pub fn process_tracked_changes(&self) {
        let _guard = self.lock_guard();
        for index in 0..self.archetype_count() {
            let index = ArchetypeIndex::from_raw(index.small_int());
            self.archetype(index).process_tracked_changes(&Hooks(self));
        }
    }

    /// Defers structural changes until the matching [`World::unlock`].
    ///
    /// Locks nest.
    pub fn lock(&self) { self.lock_depth.set(self.lock_depth.get() + 1); }

    /// Releases a lock, applying the staged changes when the last lock is released.
    ///
    /// # Panics
    /// Panics if the world is not locked.
    pub fn unlock(&self) {
        let depth = self.lock_depth.get();
        assert!(depth > 0, "World is not locked");
        self.lock_depth.set(depth - 1);

        if depth == 1 {
            self.commands.process_commands(&Hooks(self));
        }
    }

    /// Whether structural changes are currently deferred.
    pub fn is_locked(&self) -> bool { self.lock_depth.get() > 0 }

    fn lock_guard(&self) -> LockGuard<'_> {
        self.lock();
        LockGuard(self)
    }

    pub(crate) fn archetype(&self, index: ArchetypeIndex) -> &Archetype {
        let archetypes = self.archetypes.borrow();
        let archetype: *const Archetype =
            &**archetypes.get(index.usize()).expect("archetype index is out of bounds");
        // Safety: archetypes are boxed and never removed before the world is dropped.
        unsafe { &*archetype }
    }

    fn get_or_create_archetype(&self, mut components: Vec<ComponentInfo>) -> ArchetypeIndex {
        components.sort_unstable_by_key(|info| info.id);
        let ids: Vec<ComponentId> = components.iter().map(|info| info.id).collect();
        let id = ArchetypeId::of(&ids);

        if let Some(&index) = self.archetype_map.borrow().get(&id) {
            return index;
        }

        let index = ArchetypeIndex::from_raw(self.archetype_count().small_int());
        let archetype = Archetype::new(index, components, &self.config);
        log::debug!("Created archetype {archetype:?}");
        self.archetypes.borrow_mut().push(Box::new(archetype));
        self.archetype_map.borrow_mut().insert(id, index);

        if self.is_locked() && !self.commands.is_processing() {
            self.commands.init_cache(index);
        } else {
            self.init_cache_for_archetype(index);
        }

        index
    }

    fn init_cache_for_archetype(&self, index: ArchetypeIndex) {
        let archetype = self.archetype(index);
        self.queries.borrow_mut().add_archetype(archetype);

        let on_change = EventId::of::<OnChange>();
        for description in self.systems.borrow().iter() {
            let query = &description.state.query;
            if description.is_subscribed(on_change) && archetype.matches(query) {
                archetype.update_tracked_cache(description.id, query.with());
            }
        }
    }

    pub(crate) fn register_query(&self, description: &QueryDescription) -> QueryId {
        let archetypes = self.archetypes.borrow();
        let archetypes = archetypes.iter().map(|archetype| &**archetype);
        self.queries.borrow_mut().insert(description, archetypes)
    }

    pub(crate) fn query_archetypes(&self, query: QueryId) -> Vec<ArchetypeIndex> {
        self.queries.borrow().archetypes(query).to_vec()
    }

    pub(crate) fn register_system(
        &self,
        description: SystemDescription<Rc<SystemState>>,
    ) -> SystemId {
        let id = description.id;
        let state = Rc::clone(&description.state);
        let tracks_changes = description.is_subscribed(EventId::of::<OnChange>());

        if !self.systems.borrow_mut().push(description) {
            return id;
        }

        if tracks_changes {
            for index in self.query_archetypes(state.query_id) {
                self.archetype(index).update_tracked_cache(id, state.query.with());
            }
        }

        id
    }

    /// Applies the changes collected by an [`EntityBuilder`].
    ///
    /// `entity` is `None` for a new entity.
    pub(crate) fn apply_change<B: Bundle>(
        &self,
        entity: Option<EntityId>,
        added: Vec<ComponentInfo>,
        removed: &[ComponentId],
        bundle: B,
    ) -> EntityId {
        let (entity, source) = match entity {
            Some(entity) => {
                let Some(record) = self.entities.borrow().get_any(entity) else { return entity };
                if !self.is_alive(entity) {
                    return entity;
                }
                (entity, record.effective_archetype())
            }
            None => (self.entities.borrow_mut().create(EntityState::AsyncCreation), None),
        };

        let mut components: Vec<ComponentInfo> = source
            .map(|index| self.archetype(index).components().to_vec())
            .unwrap_or_default();
        components.retain(|info| !removed.contains(&info.id));
        components.extend(added);
        let target = self.get_or_create_archetype(components);

        if source == Some(target) {
            return entity;
        }

        if self.is_locked() {
            self.entities.borrow_mut().set_pending(entity, target);
            self.commands.commit(entity, source, self.archetype(target), bundle);
            log::trace!("Staged move of entity {entity} to archetype {target:?}");
        } else {
            self.move_entity(entity, source, target, |placement| match placement {
                Some((archetype, index)) => write_bundle(archetype, index, bundle),
                None => drop(bundle),
            });
        }

        entity
    }

    /// Moves an entity between archetypes, notifying the affected systems.
    ///
    /// `fill` initializes the components that are new in `to`,
    /// or receives `None` if the entity was destroyed by an [`OnDisappear`] subscriber.
    fn move_entity(
        &self,
        entity: EntityId,
        from: Option<ArchetypeIndex>,
        to: ArchetypeIndex,
        fill: impl FnOnce(Option<(&Archetype, ArchetypeEntityIndex)>),
    ) {
        let _guard = self.lock_guard();
        let source = from.map(|index| self.archetype(index));
        let target = self.archetype(to);

        if let Some(source) = source {
            {
                let mut entities = self.entities.borrow_mut();
                let pending = entities.get_any(entity).and_then(|record| record.pending_archetype);
                if pending.is_none() {
                    entities.set_pending(entity, to);
                }
            }

            self.dispatch_transition(entity, EventRef::new(&OnDisappear), |query| {
                source.matches(query) && !target.matches(query)
            });

            if !self.is_alive(entity) {
                fill(None);
                // The staged destroy becomes a no-op once the record is gone.
                self.remove_placed(entity, source, |query| target.matches(query));
                return;
            }
        }

        let index = {
            let mut entities = self.entities.borrow_mut();
            match source {
                Some(source) => {
                    let record = entities.get(entity).expect("checked by is_alive");
                    target.mutate(&mut entities, source, record.index)
                }
                None => {
                    let index = target.insert(entity);
                    let placed = entities.mutate(entity, to, index);
                    debug_assert!(placed, "created entity {entity} is not alive");
                    index
                }
            }
        };
        fill(Some((target, index)));
        log::trace!("Moved entity {entity} to archetype {to:?}");

        self.dispatch_transition(entity, EventRef::new(&OnAppear), |query| {
            target.matches(query) && !source.map_or(false, |source| source.matches(query))
        });
    }

    fn destroy_now(&self, entity: EntityId) {
        let Some(record) = self.entities.borrow().get_any(entity) else { return };

        match record.archetype {
            Some(index) => self.remove_placed(entity, self.archetype(index), |_| true),
            None => {
                self.entities.borrow_mut().destroy(entity);
            }
        }
    }

    /// Destroys an entity placed in `archetype`.
    ///
    /// [`OnDisappear`] is only sent to the matching systems accepted by `notify`.
    fn remove_placed(
        &self,
        entity: EntityId,
        archetype: &Archetype,
        notify: impl Fn(&QueryDescription) -> bool,
    ) {
        let _guard = self.lock_guard();
        self.entities.borrow_mut().mark_destroying(entity);

        self.dispatch_transition(entity, EventRef::new(&OnDisappear), |query| {
            archetype.matches(query) && notify(query)
        });

        let mut entities = self.entities.borrow_mut();
        let index = entities.get(entity).expect("destroyed entity is accessible").index;
        archetype.delete(&mut entities, index, true);
    }

    /// The subscribers of an event type in run order.
    fn subscribers(&self, event: EventId) -> Vec<Rc<SystemState>> {
        self.order_systems();
        self.systems
            .borrow()
            .ordered()
            .filter(|description| description.is_subscribed(event))
            .map(|description| Rc::clone(&description.state))
            .collect()
    }

    /// Sends an event to every subscriber, or only for `entity` if it is valid.
    pub(crate) fn dispatch_event(&self, entity: EntityId, event: EventRef<'_>) {
        log::trace!("Dispatching {event:?} to entity {entity}");
        for state in self.subscribers(event.id()) {
            if (state.accepts)(Some(event)) {
                self.run_on(&state, entity, Some(event));
            }
        }
    }

    fn dispatch_transition(
        &self,
        entity: EntityId,
        event: EventRef<'_>,
        filter: impl Fn(&QueryDescription) -> bool,
    ) {
        for state in self.subscribers(event.id()) {
            if filter(&state.query) && (state.accepts)(Some(event)) {
                self.run_on(&state, entity, Some(event));
            }
        }
    }

    pub(crate) fn run_system(&self, id: SystemId) {
        let state = self.systems.borrow().get(id).map(|description| Rc::clone(&description.state));
        let Some(state) = state else { return };

        if (state.accepts)(None) {
            self.run_broadcast(&state, None);
        } else {
            log::debug!("System <{}> only runs on its events", state.name);
        }
    }

    fn run_broadcast(&self, state: &SystemState, event: Option<EventRef<'_>>) {
        self.run_on(state, EntityId::INVALID, event);
    }

    /// Runs a system over `entity`, or over all its matching entities if `entity` is invalid.
    fn run_on(&self, state: &SystemState, entity: EntityId, event: Option<EventRef<'_>>) {
        let _guard = self.lock_guard();
        for (archetype, chunk, range) in self.targets(state, entity) {
            self.run_callback(state, archetype, chunk, range, event);
        }
    }

    #[auto_enum(Iterator)]
    fn targets(
        &self,
        state: &SystemState,
        entity: EntityId,
    ) -> impl Iterator<Item = (&Archetype, u32, Range<u32>)> + '_ {
        if entity.is_valid() {
            self.entity_slot(&state.query, entity).into_iter()
        } else {
            self.chunks_of(state.query_id)
        }
    }

    /// The slot of an entity, if it is placed in an archetype matching `query`.
    pub(crate) fn entity_slot(
        &self,
        query: &QueryDescription,
        entity: EntityId,
    ) -> Option<(&Archetype, u32, Range<u32>)> {
        let record = self.entities.borrow().get(entity)?;
        let archetype = self.archetype(record.archetype?);
        if !archetype.matches(query) {
            return None;
        }

        let in_chunk = record.index.index_in_chunk();
        Some((archetype, record.index.chunk(), in_chunk..in_chunk + 1))
    }

    /// Every non-empty chunk of the archetypes matching a query.
    pub(crate) fn chunks_of(
        &self,
        query: QueryId,
    ) -> impl Iterator<Item = (&Archetype, u32, Range<u32>)> + '_ {
        self.query_archetypes(query).into_iter().flat_map(move |index| {
            let archetype = self.archetype(index);
            (0..archetype.chunk_count()).filter_map(move |chunk| {
                let len = archetype.chunk_len(chunk);
                (len > 0).then(|| (archetype, chunk, 0..len))
            })
        })
    }

    fn run_callback(
        &self,
        state: &SystemState,
        archetype: &Archetype,
        chunk: u32,
        range: Range<u32>,
        event: Option<EventRef<'_>>,
    ) {
        let _guard = self.lock_guard();
        let mut callback = state
            .callback
            .try_borrow_mut()
            .unwrap_or_else(|_| panic!("System <{}> is already running", state.name));
        let context = FetchContext { world: self, archetype, event };
        callback(&context, chunk, range);
    }
}

fn write_bundle<B: Bundle>(archetype: &Archetype, index: ArchetypeEntityIndex, bundle: B) {
    bundle.take(&mut |info, src| {
        let column = archetype.column_of(info.id).expect("added components are in the target");
        // Safety: `src` is a value of the component moved out of the bundle,
        // and the slot of a newly added component is uninitialized.
        unsafe { archetype.write_component(column, index, src) };
    });
}

/// Releases a lock on drop.
///
/// Staged changes are not applied while unwinding.
struct LockGuard<'w>(&'w World);

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let depth = &self.0.lock_depth;
            depth.set(depth.get().saturating_sub(1));
        } else {
            self.0.unlock();
        }
    }
}

/// Applies staged commands and dispatches tracked changes on behalf of a world.
struct Hooks<'w>(&'w World);

impl CommandExecutor for Hooks<'_> {
    fn mutate_entity(
        &self,
        entity: EntityId,
        from: Option<ArchetypeIndex>,
        to: ArchetypeIndex,
        added: &[PendingComponent],
    ) {
        let world = self.0;
        let drop_all = || {
            for pending in added {
                // Safety: the payload was never moved into an archetype.
                unsafe { pending.drop_value() };
            }
        };

        if !world.is_alive(entity) {
            drop_all();
            return;
        }

        let record = world.entities.borrow().get_any(entity).expect("checked by is_alive");
        assert_eq!(
            record.archetype, from,
            "Staged move of entity {entity} does not start from its current archetype"
        );

        world.move_entity(entity, from, to, |placement| match placement {
            Some((archetype, index)) => {
                for pending in added {
                    // Safety: the payload is moved into the uninitialized slot exactly once.
                    unsafe {
                        archetype.write_component(pending.column, index, pending.data.as_ptr());
                    }
                }
            }
            None => drop_all(),
        });
    }

    fn destroy_entity(&self, entity: EntityId) { self.0.destroy_now(entity); }

    fn init_cache_for_archetype(&self, archetype: ArchetypeIndex) {
        self.0.init_cache_for_archetype(archetype);
    }
}

impl TrackedChangeSink for Hooks<'_> {
    fn dispatch_changes(
        &self,
        system: SystemId,
        archetype: &Archetype,
        chunk: u32,
        range: Range<u32>,
    ) {
        let world = self.0;
        let state =
            world.systems.borrow().get(system).map(|description| Rc::clone(&description.state));
        let Some(state) = state else { return };

        let event = EventRef::new(&OnChange);
        if (state.accepts)(Some(event)) {
            world.run_callback(&state, archetype, chunk, range, Some(event));
        }
    }
}
