use super::World;
use crate::component::{Bundle, Component, ComponentInfo};
use crate::entity::EntityId;
use crate::id::ComponentId;

enum Target {
    Create,
    /// `components` is `None` if the entity was not alive when editing started.
    Edit { entity: EntityId, components: Option<Vec<ComponentId>> },
}

/// Collects component changes for a new or existing entity.
///
/// Nothing happens until [`EntityBuilder::apply`] is called.
#[must_use = "changes are only applied by `apply`"]
pub struct EntityBuilder<'w, B: Bundle> {
    world:   &'w World,
    target:  Target,
    removed: Vec<ComponentId>,
    bundle:  B,
}

impl<'w> EntityBuilder<'w, ()> {
    pub(super) fn create(world: &'w World) -> Self {
        Self { world, target: Target::Create, removed: Vec::new(), bundle: () }
    }

    pub(super) fn edit(world: &'w World, entity: EntityId) -> Self {
        let components = world.is_alive(entity).then(|| {
            let record = world.entities.borrow().get_any(entity);
            record
                .and_then(|record| record.effective_archetype())
                .map(|index| world.archetype(index).component_ids().to_vec())
                .unwrap_or_default()
        });

        Self { world, target: Target::Edit { entity, components }, removed: Vec::new(), bundle: () }
    }
}

impl<'w, B: Bundle> EntityBuilder<'w, B> {
    /// Adds a component value.
    ///
    /// # Panics
    /// Panics if the component is already added or removed in this builder,
    /// or if the edited entity already has it.
    pub fn add<T: Component>(self, value: T) -> EntityBuilder<'w, (B, T)> {
        let id = ComponentId::of::<T>();
        let name = std::any::type_name::<T>();

        let mut added = Vec::new();
        B::infos(&mut added);
        if added.iter().any(|info| info.id == id) {
            panic!("Component {name} is added twice");
        }
        if self.removed.contains(&id) {
            panic!("Component {name} is both added and removed");
        }
        if let Target::Edit { entity, components: Some(components) } = &self.target {
            if components.contains(&id) {
                panic!("Entity {entity} already has component {name}");
            }
        }

        EntityBuilder {
            world:   self.world,
            target:  self.target,
            removed: self.removed,
            bundle:  (self.bundle, value),
        }
    }

    /// Adds the default value of a component.
    pub fn add_default<T: Component + Default>(self) -> EntityBuilder<'w, (B, T)> {
        self.add(T::default())
    }

    /// Removes a component from the edited entity.
    ///
    /// # Panics
    /// Panics when creating an entity, if the component is also added in this builder,
    /// or if the edited entity does not have it.
    pub fn remove<T: Component>(mut self) -> Self {
        let id = ComponentId::of::<T>();
        let name = std::any::type_name::<T>();

        match &self.target {
            Target::Create => panic!("Cannot remove component {name} while creating an entity"),
            Target::Edit { entity, components: Some(components) } => {
                if !components.contains(&id) {
                    panic!("Entity {entity} does not have component {name}");
                }
            }
            Target::Edit { components: None, .. } => {}
        }

        let mut added = Vec::new();
        B::infos(&mut added);
        if added.iter().any(|info| info.id == id) {
            panic!("Component {name} is both added and removed");
        }

        if !self.removed.contains(&id) {
            self.removed.push(id);
        }
        self
    }

    /// Applies the changes and returns the entity.
    ///
    /// While the world is locked, the changes are staged until it is unlocked.
    /// Editing an entity that is no longer alive drops the added values.
    pub fn apply(self) -> EntityId {
        let mut added: Vec<ComponentInfo> = Vec::new();
        B::infos(&mut added);

        let entity = match self.target {
            Target::Create => None,
            Target::Edit { entity, components: None } => {
                log::trace!("Ignored changes to dead entity {entity}");
                return entity;
            }
            Target::Edit { entity, components: Some(_) } => Some(entity),
        };

        self.world.apply_change(entity, added, &self.removed, self.bundle)
    }
}
