//! Typed lists of component values passed to the entity builder.

use std::mem::ManuallyDrop;

use super::{Component, ComponentInfo};

/// A statically typed list of component values.
///
/// Bundles are built as nested pairs, `((((), A), B), C)`,
/// by successive calls to [`EntityBuilder::add`](crate::world::EntityBuilder::add).
///
/// # Safety
/// `take` must call `sink` exactly once for each component reported by `infos`,
/// in the same order, each time with a pointer to a valid value of that component.
/// The sink takes ownership of the value and the bundle must not drop it afterwards.
pub unsafe trait Bundle {
    /// Appends the operation tables of the components in this bundle.
    fn infos(out: &mut Vec<ComponentInfo>);

    /// Hands each value to `sink`, which moves it out.
    fn take(self, sink: &mut dyn FnMut(&ComponentInfo, *mut u8));
}

unsafe impl Bundle for () {
    fn infos(_: &mut Vec<ComponentInfo>) {}

    fn take(self, _: &mut dyn FnMut(&ComponentInfo, *mut u8)) {}
}

unsafe impl<B: Bundle, T: Component> Bundle for (B, T) {
    fn infos(out: &mut Vec<ComponentInfo>) {
        B::infos(out);
        out.push(ComponentInfo::of::<T>());
    }

    fn take(self, sink: &mut dyn FnMut(&ComponentInfo, *mut u8)) {
        let (rest, value) = self;
        rest.take(sink);

        let mut value = ManuallyDrop::new(value);
        sink(&ComponentInfo::of::<T>(), (&mut *value as *mut T).cast());
    }
}
