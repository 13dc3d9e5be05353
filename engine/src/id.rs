//! Newtype identifiers for the four id spaces the runtime deals in.
//!
//! Every id is a dense `u32` index, never a pointer, so it survives any container
//! reallocation. Each space carries its own `INVALID` sentinel rather than using `Option`,
//! matching how identifiers are threaded through the hot paths of the scheduler and views.

use std::fmt;

macro_rules! dense_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel value representing "no id". Never returned by an allocator.
            pub const INVALID: Self = Self(u32::MAX);

            /// Construct an id from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// The raw index, suitable for use as a `Vec`/bitset index.
            #[inline]
            pub const fn index(&self) -> usize {
                self.0 as usize
            }

            /// Whether this id is the `INVALID` sentinel.
            #[inline]
            pub const fn is_valid(&self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(raw: u32) -> Self {
                Self::new(raw)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(raw: usize) -> Self {
                Self::new(raw as u32)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}(INVALID)", stringify!($name))
                }
            }
        }
    };
}

dense_id!(RegistryId, "Identifies one registry instance.");
dense_id!(EntityId, "Identifies one entity, unique for the lifetime of its registry.");
dense_id!(ComponentId, "Identifies one component type, shared across all registries.");
dense_id!(SystemId, "Identifies one system or action (actions share this id space).");
