//! Component types and their type-erased operation tables.

use std::alloc::Layout;
use std::{fmt, mem, ptr};

use crate::id::ComponentId;

pub mod bundle;
pub use bundle::Bundle;


/// A type that can be stored as a component of an entity.
///
/// Usually implemented through `#[derive(Component)]`.
/// Add `#[rrecs(trackable)]` to enable change tracking for the component,
/// which requires the type to implement [`Clone`] and [`PartialEq`].
pub trait Component: 'static + Sized {
    /// Returns the tracking operations if the component is trackable.
    fn tracking() -> Option<TrackingFns> { None }
}

/// Operations required to keep a shadow copy of a trackable component.
#[derive(Clone, Copy)]
pub struct TrackingFns {
    /// Compares the shadow value with the current value,
    /// overwriting the shadow with the current value if they differ.
    /// Returns `true` if they differed.
    pub compare_and_assign: unsafe fn(shadow: *mut u8, current: *const u8) -> bool,
    /// Clones the current value into an uninitialized shadow slot.
    pub clone_into:         unsafe fn(shadow: *mut u8, current: *const u8),
}

impl TrackingFns {
    /// Creates the tracking operations for `T`.
    pub fn of<T: Clone + PartialEq + 'static>() -> Self {
        Self { compare_and_assign: compare_and_assign::<T>, clone_into: clone_into::<T> }
    }
}

unsafe fn compare_and_assign<T: Clone + PartialEq>(shadow: *mut u8, current: *const u8) -> bool {
    let shadow = &mut *shadow.cast::<T>();
    let current = &*current.cast::<T>();
    if shadow == current {
        false
    } else {
        shadow.clone_from(current);
        true
    }
}

unsafe fn clone_into<T: Clone>(shadow: *mut u8, current: *const u8) {
    let current = &*current.cast::<T>();
    ptr::write(shadow.cast::<T>(), current.clone());
}

unsafe fn move_value<T>(dst: *mut u8, src: *mut u8) {
    ptr::copy_nonoverlapping(src.cast::<T>(), dst.cast::<T>(), 1);
}

unsafe fn drop_value<T>(ptr: *mut u8) { ptr::drop_in_place(ptr.cast::<T>()) }

/// The operation table of a component type, built once per type.
#[derive(Clone, Copy)]
pub struct ComponentInfo {
    /// The identity of the component type.
    pub id:       ComponentId,
    /// The type name, used in diagnostics.
    pub name:     &'static str,
    /// The size and alignment of a value.
    pub layout:   Layout,
    /// Moves a value from `src` to the uninitialized `dst`, leaving `src` logically uninitialized.
    pub move_fn:  unsafe fn(dst: *mut u8, src: *mut u8),
    /// Drops a value in place, if the type has drop glue.
    pub drop_fn:  Option<unsafe fn(*mut u8)>,
    /// Change tracking operations, if the component is trackable.
    pub tracking: Option<TrackingFns>,
}

impl ComponentInfo {
    /// Builds the operation table of `T`.
    pub fn of<T: Component>() -> Self {
        Self {
            id:       ComponentId::of::<T>(),
            name:     std::any::type_name::<T>(),
            layout:   Layout::new::<T>(),
            move_fn:  move_value::<T>,
            drop_fn:  mem::needs_drop::<T>().then_some(drop_value::<T> as unsafe fn(*mut u8)),
            tracking: T::tracking(),
        }
    }

    /// Whether a shadow column is kept for this component.
    pub fn is_trackable(&self) -> bool { self.tracking.is_some() }

    /// Whether the component is zero-sized.
    pub fn is_tag(&self) -> bool { self.layout.size() == 0 }
}

impl fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .field("trackable", &self.is_trackable())
            .finish()
    }
}
