//! Identity type for model components.
//!
//! `ComponentId` is a newtype over `u32` that serves as a direct index into
//! the repository's slot vector, providing O(1) lookup.

use std::fmt;

/// Index into `Repository::slots`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub const INVALID: ComponentId = ComponentId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ComponentId(INVALID)")
        } else {
            write!(f, "ComponentId({})", self.0)
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id() {
        let id = ComponentId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!ComponentId::INVALID.is_valid());
    }

    #[test]
    fn test_component_id_debug() {
        assert_eq!(format!("{:?}", ComponentId(3)), "ComponentId(3)");
        assert_eq!(format!("{}", ComponentId::INVALID), "ComponentId(INVALID)");
    }
}
