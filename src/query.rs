//! Archetype queries and the typed parameters of query callables.
//!
//! A query is a with/without predicate over component sets.
//! [`QueryCache`] remembers which archetypes match each registered query,
//! and is updated incrementally whenever a new archetype is created.
//!
//! Views and systems run callables whose parameters implement [`Fetch`],
//! e.g. `|entity: EntityId, position: &mut Position, velocity: &Velocity| { ... }`.

use std::ops::Range;

use indexmap::IndexMap;

use crate::archetype::{Archetype, ArchetypeIndex, ColumnBorrow};
use crate::component::Component;
use crate::entity::ArchetypeEntityIndex;
use crate::event::{Event, EventRef};
use crate::id::{fnv1a_u64s, ComponentId, EventId, QueryId};
use crate::world::World;

mod fetch;
pub use fetch::On;

mod tuple_impls;


/// A with/without predicate over component sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescription {
    with:    Vec<ComponentId>,
    without: Vec<ComponentId>,
}

impl QueryDescription {
    /// Creates a predicate; the lists are sorted and deduplicated.
    ///
    /// # Panics
    /// Panics if a component is both required and excluded.
    pub fn new(mut with: Vec<ComponentId>, mut without: Vec<ComponentId>) -> Self {
        with.sort_unstable();
        with.dedup();
        without.sort_unstable();
        without.dedup();

        if let Some(conflict) = with.iter().find(|id| without.binary_search(id).is_ok()) {
            panic!("Component {conflict:?} is both required and excluded by the query");
        }

        Self { with, without }
    }

    /// The sorted required components.
    pub fn with(&self) -> &[ComponentId] { &self.with }

    /// The sorted excluded components.
    pub fn without(&self) -> &[ComponentId] { &self.without }

    /// The identity of the predicate.
    pub fn id(&self) -> QueryId {
        let with = self.with.iter().map(|id| id.raw());
        let without = self.without.iter().map(|id| id.raw());
        QueryId::from_raw(fnv1a_u64s(with.chain([0]).chain(without)))
    }
}

struct CachedQuery {
    description: QueryDescription,
    archetypes:  Vec<ArchetypeIndex>,
}

/// Remembers the archetypes matching each registered query.
#[derive(Default)]
pub struct QueryCache {
    queries: IndexMap<QueryId, CachedQuery>,
}

impl QueryCache {
    /// Registers a query and matches it against the existing `archetypes`.
    ///
    /// Registering an existing query only returns its id.
    pub fn insert<'a>(
        &mut self,
        description: &QueryDescription,
        archetypes: impl IntoIterator<Item = &'a Archetype>,
    ) -> QueryId {
        let id = description.id();
        self.queries.entry(id).or_insert_with(|| {
            let archetypes = archetypes
                .into_iter()
                .filter(|archetype| archetype.matches(description))
                .map(|archetype| archetype.index())
                .collect();
            CachedQuery { description: description.clone(), archetypes }
        });
        id
    }

    /// Adds a new archetype to every query it matches.
    pub fn add_archetype(&mut self, archetype: &Archetype) {
        for query in self.queries.values_mut() {
            let index = archetype.index();
            if archetype.matches(&query.description) && !query.archetypes.contains(&index) {
                query.archetypes.push(index);
            }
        }
    }

    /// The archetypes matching a query, in archetype creation order.
    pub fn archetypes(&self, id: QueryId) -> &[ArchetypeIndex] {
        self.queries.get(&id).map_or(&[], |query| &query.archetypes)
    }

    /// The number of registered queries.
    pub fn len(&self) -> usize { self.queries.len() }

    /// Whether no query is registered.
    pub fn is_empty(&self) -> bool { self.queries.is_empty() }
}

/// The accesses and subscriptions declared by the parameters of a callable.
#[derive(Debug, Default)]
pub struct Signature {
    reads:  Vec<(ComponentId, &'static str)>,
    writes: Vec<(ComponentId, &'static str)>,
    events: Vec<EventId>,
}

impl Signature {
    /// Declares shared access to a component.
    ///
    /// # Panics
    /// Panics if the component is also accessed mutably.
    pub fn read<T: Component>(&mut self) {
        let id = ComponentId::of::<T>();
        let name = std::any::type_name::<T>();
        if self.writes.iter().any(|&(write, _)| write == id) {
            panic!("Component {name} is accessed both mutably and immutably");
        }
        self.reads.push((id, name));
    }

    /// Declares exclusive access to a component.
    ///
    /// # Panics
    /// Panics if the component is accessed anywhere else in the same callable.
    pub fn write<T: Component>(&mut self) {
        let id = ComponentId::of::<T>();
        let name = std::any::type_name::<T>();
        if self.writes.iter().any(|&(write, _)| write == id) {
            panic!("Component {name} is accessed mutably more than once");
        }
        if self.reads.iter().any(|&(read, _)| read == id) {
            panic!("Component {name} is accessed both mutably and immutably");
        }
        self.writes.push((id, name));
    }

    /// Declares a subscription to an event type.
    pub fn subscribe<E: Event>(&mut self) {
        let id = EventId::of::<E>();
        if !self.events.contains(&id) {
            self.events.push(id);
        }
    }

    /// Every component accessed by the callable.
    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.reads.iter().chain(&self.writes).map(|&(id, _)| id)
    }

    /// Every event the callable subscribes to.
    pub fn events(&self) -> &[EventId] { &self.events }
}

/// The environment a callable runs in.
pub struct FetchContext<'w> {
    /// The world running the callable.
    pub world:     &'w World,
    /// The archetype being iterated.
    pub archetype: &'w Archetype,
    /// The event being dispatched, if any.
    pub event:     Option<EventRef<'w>>,
}

/// A parameter type of query callables.
///
/// # Safety
/// `describe` must declare every component that `fetch` accesses,
/// with mutable access declared through [`Signature::write`].
pub unsafe trait Fetch {
    /// The value passed to the callable.
    type Item<'a>;

    /// Data computed once per archetype, such as a column index.
    type State: Copy;

    /// Declares the accesses of this parameter.
    fn describe(signature: &mut Signature);

    /// Computes the state for an archetype matching the query.
    fn prepare(archetype: &Archetype) -> Self::State;

    /// Borrows the accessed column while the callable runs over a chunk.
    fn borrow(_archetype: &Archetype, _state: Self::State) -> Option<ColumnBorrow<'_>> { None }

    /// Whether the callable should run for the dispatched event.
    fn accepts(_event: Option<EventRef<'_>>) -> bool { true }

    /// Produces the parameter for the entity at `index`.
    ///
    /// # Safety
    /// `index` must be a live slot of `context.archetype`,
    /// and no other reference to the accessed components of that entity may be live.
    unsafe fn fetch<'a>(
        state: Self::State,
        context: &FetchContext<'a>,
        index: ArchetypeEntityIndex,
    ) -> Self::Item<'a>;
}

/// The item type of a [`Fetch`] parameter.
pub type FetchItem<'a, F> = <F as Fetch>::Item<'a>;

/// A callable whose parameters all implement [`Fetch`].
///
/// `Marker` is the function pointer type of the parameters,
/// which distinguishes the implementations for different arities.
pub trait QueryFn<Marker> {
    /// Declares the accesses of all parameters.
    fn describe(signature: &mut Signature);

    /// Whether the callable should run for the dispatched event.
    fn accepts(event: Option<EventRef<'_>>) -> bool;

    /// Runs the callable for each entity in `range` of a chunk of `context.archetype`.
    fn run(&mut self, context: &FetchContext<'_>, chunk: u32, range: Range<u32>);
}

/// A type-erased [`QueryFn`].
pub type ErasedQueryFn = dyn FnMut(&FetchContext<'_>, u32, Range<u32>);

/// Boxes a callable into an [`ErasedQueryFn`].
pub fn erase<Func, Marker>(mut func: Func) -> Box<ErasedQueryFn>
where
    Func: QueryFn<Marker> + 'static,
    Marker: 'static,
{
    Box::new(move |context: &FetchContext<'_>, chunk: u32, range: Range<u32>| {
        func.run(context, chunk, range);
    })
}

/// Collects the [`Signature`] of a callable type.
pub fn signature_of<Func: QueryFn<Marker>, Marker>() -> Signature {
    let mut signature = Signature::default();
    Func::describe(&mut signature);
    signature
}
