use super::World;
use crate::component::Component;
use crate::entity::EntityId;
use crate::id::ComponentId;
use crate::query::{self, FetchContext, QueryDescription, QueryFn};

/// Configures a one-off iteration over matching entities.
#[must_use = "views only run through `for_each` or `for_entity`"]
pub struct ViewBuilder<'w> {
    world:   &'w World,
    with:    Vec<ComponentId>,
    without: Vec<ComponentId>,
}

impl<'w> ViewBuilder<'w> {
    pub(super) fn new(world: &'w World) -> Self {
        Self { world, with: Vec::new(), without: Vec::new() }
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

    fn describe<Func: QueryFn<Marker>, Marker>(&mut self) -> QueryDescription {
        assert!(Func::accepts(None), "View callables cannot take event parameters");
        let signature = query::signature_of::<Func, Marker>();
        let with = self.with.drain(..).chain(signature.components()).collect();
        QueryDescription::new(with, std::mem::take(&mut self.without))
    }

    /// Runs `func` for every matching entity.
    ///
    /// The world is locked during the iteration.
    pub fn for_each<Func, Marker>(mut self, mut func: Func)
    where
        Func: QueryFn<Marker>,
    {
        let description = self.describe::<Func, Marker>();
        let query_id = self.world.register_query(&description);

        let world = self.world;
        let _guard = world.lock_guard();
        for (archetype, chunk, range) in world.chunks_of(query_id) {
            let context = FetchContext { world, archetype, event: None };
            func.run(&context, chunk, range);
        }
    }

    /// Runs `func` for a single entity.
    ///
    /// Returns `false` if the entity is not placed in a matching archetype.
    pub fn for_entity<Func, Marker>(mut self, entity: EntityId, mut func: Func) -> bool
    where
        Func: QueryFn<Marker>,
    {
        let description = self.describe::<Func, Marker>();

        let world = self.world;
        let _guard = world.lock_guard();
        let Some((archetype, chunk, range)) = world.entity_slot(&description, entity) else {
            return false;
        };
        let context = FetchContext { world, archetype, event: None };
        func.run(&context, chunk, range);
        true
    }
}
