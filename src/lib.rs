//! An archetype-based ECS data engine.
//!
//! # Entities, components and archetypes
//! Entities are lightweight [`EntityId`] handles.
//! The data of an entity is a set of components,
//! which are plain Rust types implementing [`Component`]:
//!
//! ```
//! #[derive(rrecs::Component)]
//! struct Position(f32, f32);
//!
//! #[derive(rrecs::Component)]
//! struct Velocity(f32, f32);
//!
//! let world = rrecs::World::new();
//! let entity = world.entity().add(Position(0.0, 0.0)).add(Velocity(1.0, 0.5)).apply();
//! assert!(world.has::<Velocity>(entity));
//! ```
//!
//! All entities with exactly the same set of components belong to the same archetype.
//! An archetype stores its entities in fixed-size chunks,
//! where every component has its own contiguous column,
//! so iterating over a component touches consecutive memory.
//! Adding or removing components moves the entity to another archetype.
//!
//! # Views and systems
//! A view iterates over all entities matching a query once:
//!
//! ```
//! # #[derive(rrecs::Component)] struct Position(f32, f32);
//! # #[derive(rrecs::Component)] struct Velocity(f32, f32);
//! # let world = rrecs::World::new();
//! world.view().for_each(|position: &mut Position, velocity: &Velocity| {
//!     position.0 += velocity.0;
//!     position.1 += velocity.1;
//! });
//! ```
//!
//! The components named by the parameters are implicitly required by the query;
//! `with` and `without` add further constraints.
//! Systems are named views that are kept in the world.
//! Systems without event subscriptions run on every [`World::tick`]
//! in the order resolved from their `before`/`after` declarations,
//! while subscribed systems only run when their events are dispatched.
//!
//! # Structural changes
//! The world is locked while views and systems run.
//! Creating, editing and destroying entities in a locked world is deferred
//! until the outermost lock is released,
//! so iterations never observe a half-moved entity.
//!
//! # Events
//! Events are delivered to the systems subscribed to them,
//! either for all matching entities or for a single target entity.
//! The world itself emits [`OnAppear`](event::OnAppear) and [`OnDisappear`](event::OnDisappear)
//! when an entity starts or stops matching the query of a subscribed system,
//! and [`OnChange`](event::OnChange) for components declared as `trackable`
//! whose value differs from the snapshot taken at the last [`World::process_tracked_changes`].

#![cfg_attr(debug_assertions, allow(dead_code, unused_variables))]
#![cfg_attr(not(debug_assertions), deny(missing_docs))]
#![cfg_attr(doc, warn(missing_docs))]

pub mod archetype;
pub use archetype::Archetype;

pub mod command;

pub mod component;
pub use component::Component;

pub mod entity;
pub use entity::EntityId;

pub mod event;
pub use event::Event;

pub mod id;

pub mod query;
pub use query::On;

pub mod scheduler;

#[cfg(any(test, feature = "internal-bench"))]
pub mod test_util;

pub mod world;
pub use world::{Config, World};

/// Derives [`Component`](trait@Component).
///
/// Pass `#[rrecs(trackable)]` to track value changes,
/// which requires the type to implement `Clone` and `PartialEq`.
pub use rrecs_codegen::Component;
/// Derives [`Event`](trait@Event).
pub use rrecs_codegen::Event;
