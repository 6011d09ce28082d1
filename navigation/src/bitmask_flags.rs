//! Small typed bitmasks.
//!
//! Path point flags, move message flags and the resource lock all store a handful of bits.
//! Each flag set is an enum whose discriminant is the bit index; [`BitmaskFlags`] wraps the
//! backing integer so call sites never shift by hand.

use num_traits::{One, PrimInt};

/// Implemented by flag enums declared with [`define_bitmask_flags!`](crate::define_bitmask_flags).
pub trait FlagBitmask: Copy {
    type Storage: PrimInt;

    fn bit_index(&self) -> u8;

    fn mask(&self) -> Self::Storage {
        // bit_index() must stay below the bit width of Storage.
        Self::Storage::one() << (self.bit_index() as usize)
    }
}

/// A set of flags stored in a primitive integer.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitmaskFlags<T: PrimInt> {
    pub bits: T,
}

impl<T: PrimInt> BitmaskFlags<T> {
    pub fn new(bits: T) -> Self {
        Self { bits }
    }

    pub fn empty() -> Self {
        Self { bits: T::zero() }
    }

    /// Builds a set holding exactly `tags`.
    pub fn from_flags<U: FlagBitmask<Storage = T>>(tags: &[U]) -> Self {
        let mut flags = Self::empty();
        flags.add_many(tags);
        flags
    }

    pub fn add<U: FlagBitmask<Storage = T>>(&mut self, tag: U) {
        self.bits = self.bits | tag.mask();
    }

    pub fn with<U: FlagBitmask<Storage = T>>(mut self, tag: U) -> Self {
        self.add(tag);
        self
    }

    pub fn remove<U: FlagBitmask<Storage = T>>(&mut self, tag: U) {
        self.bits = self.bits & !tag.mask();
    }

    pub fn has<U: FlagBitmask<Storage = T>>(&self, tag: U) -> bool {
        (self.bits & tag.mask()) != T::zero()
    }

    pub fn add_many<U: FlagBitmask<Storage = T>>(&mut self, tags: &[U]) {
        for &tag in tags {
            self.add(tag);
        }
    }

    pub fn has_any<U: FlagBitmask<Storage = T>>(&self, tags: &[U]) -> bool {
        let combined = tags.iter().fold(T::zero(), |acc, t| acc | t.mask());
        (self.bits & combined) != T::zero()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == T::zero()
    }

    pub fn clear(&mut self) {
        self.bits = T::zero();
    }

    /// Index of the highest set bit, if any.
    pub fn highest_bit(&self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let width = (std::mem::size_of::<T>() * 8) as u32;
        Some((width - 1 - self.bits.leading_zeros()) as u8)
    }
}

/// Declare a flag enum and implement [`FlagBitmask`] for it.
///
/// ```ignore
/// define_bitmask_flags!(PathPointFlag, u8, {
///     Start,
///     End,
///     OffMeshConnection,
/// });
/// ```
#[macro_export]
macro_rules! define_bitmask_flags {
    ($(#[$meta:meta])* $name:ident, $storage:ty, { $($variant:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($variant),*
        }

        impl $crate::bitmask_flags::FlagBitmask for $name {
            type Storage = $storage;

            fn bit_index(&self) -> u8 {
                *self as u8
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    define_bitmask_flags!(Probe, u8, { Low, Mid, High });

    #[test]
    fn add_remove_and_query() {
        let mut flags = BitmaskFlags::<u8>::empty();
        assert!(flags.is_empty());

        flags.add(Probe::Mid);
        assert!(flags.has(Probe::Mid));
        assert!(!flags.has(Probe::Low));
        assert_eq!(flags.bits, 0b010);

        flags.add(Probe::High);
        assert!(flags.has_any(&[Probe::Low, Probe::High]));
        flags.remove(Probe::High);
        assert!(!flags.has_any(&[Probe::Low, Probe::High]));
    }

    #[test]
    fn highest_bit_tracks_most_significant_flag() {
        let flags = BitmaskFlags::from_flags(&[Probe::Low, Probe::High]);
        assert_eq!(flags.highest_bit(), Some(Probe::High as u8));

        let empty = BitmaskFlags::<u8>::empty();
        assert_eq!(empty.highest_bit(), None);
    }

    #[test]
    fn has_any_of_nothing_is_false() {
        let flags = BitmaskFlags::<u8>::empty().with(Probe::Low);
        assert!(!flags.has_any::<Probe>(&[]));
    }
}
