//! Stable 64-bit identities derived from type names and system names.
//!
//! Identities are FNV-1a hashes rather than [`std::any::TypeId`]
//! so that they can be used as plain map keys and compared across builds.

use std::fmt;


/// Hashes `bytes` with 64-bit FNV-1a.
pub fn fnv1a(bytes: &[u8]) -> u64 { const_fnv1a_hash::fnv1a_hash_64(bytes, None) }

/// Hashes a string with 64-bit FNV-1a.
pub fn fnv1a_str(string: &str) -> u64 { const_fnv1a_hash::fnv1a_hash_str_64(string) }

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Combines a sequence of 64-bit values with FNV-1a, one whole word per round.
pub(crate) fn fnv1a_u64s(values: impl IntoIterator<Item = u64>) -> u64 {
    values
        .into_iter()
        .fold(FNV_OFFSET_BASIS, |hash, value| (hash ^ value).wrapping_mul(FNV_PRIME))
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw hash value.
            pub const fn from_raw(raw: u64) -> Self { Self(raw) }

            /// Returns the raw hash value.
            pub const fn raw(self) -> u64 { self.0 }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#018x})"), self.0)
            }
        }
    };
}

define_id! {
    /// Identifies a Rust type by the hash of its type name.
    StableTypeId
}

impl StableTypeId {
    /// Computes the identity of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self { Self(fnv1a_str(std::any::type_name::<T>())) }
}

define_id! {
    /// Identifies a component type.
    ComponentId
}

impl ComponentId {
    /// Computes the identity of the component type `T`.
    pub fn of<T: 'static>() -> Self { Self(StableTypeId::of::<T>().raw()) }
}

define_id! {
    /// Identifies an archetype by the hash of its sorted component set.
    ArchetypeId
}

impl ArchetypeId {
    /// Computes the identity of an archetype with the given components.
    ///
    /// `components` must be sorted and deduplicated.
    pub fn of(components: &[ComponentId]) -> Self {
        debug_assert!(components.windows(2).all(|pair| pair[0] < pair[1]));
        Self(fnv1a_u64s(components.iter().map(|id| id.raw())))
    }
}

define_id! {
    /// Identifies an event type.
    EventId
}

impl EventId {
    /// Computes the identity of the event type `T`.
    pub fn of<T: 'static>() -> Self { Self(StableTypeId::of::<T>().raw()) }
}

define_id! {
    /// Identifies a system by the hash of its name.
    SystemId
}

impl SystemId {
    /// Computes the identity of the system named `name`.
    pub fn of(name: &str) -> Self { Self(fnv1a_str(name)) }
}

define_id! {
    /// Identifies a query by its with/without predicate.
    QueryId
}
