#![allow(missing_docs)]

use std::cell::Cell;
use std::rc::Rc;

use parking_lot::Once;

use crate::{component, Component, Event};

pub fn init() {
    static SET_LOGGER_ONCE: Once = Once::new();
    SET_LOGGER_ONCE.call_once(env_logger::init);
}

/// A plain copyable component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Component)]
#[rrecs(rrecs_as(crate))]
pub struct Int(pub i32);

/// Another plain copyable component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Component)]
#[rrecs(rrecs_as(crate))]
pub struct Float(pub f32);

/// A component with drop glue.
#[derive(Debug, Clone, PartialEq, Default, Component)]
#[rrecs(rrecs_as(crate))]
pub struct Name(pub String);

/// A zero-sized component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Component)]
#[rrecs(rrecs_as(crate))]
pub struct Tag;

/// A component with change tracking.
#[derive(Debug, Clone, Copy, PartialEq, Default, Component)]
#[rrecs(rrecs_as(crate), trackable)]
pub struct TrackableInt(pub i32);

/// Counts how many times its values have been dropped.
#[derive(Debug, Component)]
#[rrecs(rrecs_as(crate))]
pub struct DropCounter(pub Rc<Cell<usize>>);

impl Drop for DropCounter {
    fn drop(&mut self) { self.0.set(self.0.get() + 1); }
}

/// A generic component.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompN<const N: usize>(pub i32);

impl<const N: usize> component::Component for CompN<N> {}

/// An event without payload.
#[derive(Debug, Event)]
#[rrecs(rrecs_as(crate))]
pub struct TestEvent;

/// An event carrying an integer.
#[derive(Debug, Clone, Copy, PartialEq, Event)]
#[rrecs(rrecs_as(crate))]
pub struct IntEvent(pub i32);

/// An event carrying a float.
#[derive(Debug, Clone, Copy, PartialEq, Event)]
#[rrecs(rrecs_as(crate))]
pub struct FloatEvent(pub f32);

/// An event that counts how many times it has been dropped.
#[derive(Debug, Event)]
#[rrecs(rrecs_as(crate))]
pub struct DropEvent(pub Rc<Cell<usize>>);

impl Drop for DropEvent {
    fn drop(&mut self) { self.0.set(self.0.get() + 1); }
}
