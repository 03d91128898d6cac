//! # Granularity Resolver
//!
//! Every piece of a multi-node array is a separate OS region, so its length
//! must be a whole number of allocation units. The unit is the largest of the
//! allocation granularity, the page size and, when requested, the smallest
//! large page.

use silo_hal::SystemInfo;

/// Allocation unit and the rounding rules built on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Granularity {
    unit: usize,
}

impl Granularity {
    /// Unit for this system
    pub fn from_system(info: &SystemInfo, large_pages: bool) -> Self {
        let mut unit = info.allocation_granularity.max(info.page_size);
        if large_pages {
            if let Some(large) = info.large_page_minimum {
                unit = unit.max(large);
            }
        }
        // A system that reports no quantum at all gets byte granularity.
        Self { unit: unit.max(1) }
    }

    /// Explicit unit, `None` if it is zero
    pub const fn new(unit: usize) -> Option<Self> {
        if unit == 0 {
            None
        } else {
            Some(Self { unit })
        }
    }

    /// Explicit unit
    ///
    /// # Panics
    ///
    /// Panics if `unit` is zero. Use [`new`](Self::new) for untrusted values.
    pub const fn with_unit(unit: usize) -> Self {
        assert!(unit > 0, "allocation unit must be non-zero");
        Self { unit }
    }

    /// Unit size in bytes
    #[inline]
    pub const fn unit(&self) -> usize {
        self.unit
    }

    /// Round to the nearest multiple of the unit, ties rounding up
    ///
    /// Anything below half a unit becomes zero. `None` on overflow.
    pub const fn round(&self, size: usize) -> Option<usize> {
        let quotient = size / self.unit;
        let remainder = size % self.unit;
        let units = if remainder >= self.unit / 2 {
            quotient + 1
        } else {
            quotient
        };
        self.unit.checked_mul(units)
    }

    /// Round up to a multiple of the unit. `None` on overflow.
    pub const fn round_up(&self, size: usize) -> Option<usize> {
        match size.checked_add(self.unit - 1) {
            Some(padded) => Some(padded / self.unit * self.unit),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 4096;

    fn info(page: usize, granularity: usize, large: Option<usize>) -> SystemInfo {
        SystemInfo {
            page_size: page,
            allocation_granularity: granularity,
            large_page_minimum: large,
        }
    }

    #[test]
    fn test_unit_is_largest_quantum() {
        let win = info(PAGE, 65536, Some(2 << 20));
        assert_eq!(Granularity::from_system(&win, false).unit(), 65536);
        assert_eq!(Granularity::from_system(&win, true).unit(), 2 << 20);

        let linux = info(PAGE, PAGE, None);
        assert_eq!(Granularity::from_system(&linux, true).unit(), PAGE);
    }

    #[test]
    fn test_zero_quantum_does_not_panic() {
        let broken = info(0, 0, None);
        assert_eq!(Granularity::from_system(&broken, false).unit(), 1);
        assert_eq!(Granularity::from_system(&broken, true).unit(), 1);
        assert_eq!(Granularity::new(0), None);
        assert_eq!(Granularity::new(PAGE), Some(Granularity::with_unit(PAGE)));
    }

    #[test]
    fn test_round_to_nearest() {
        let g = Granularity::with_unit(PAGE);
        assert_eq!(g.round(6144), Some(8192));
        assert_eq!(g.round(2048), Some(4096));
        assert_eq!(g.round(2047), Some(0));
        assert_eq!(g.round(10000), Some(8192));
        assert_eq!(g.round(5000), Some(4096));
        assert_eq!(g.round(8192), Some(8192));
        assert_eq!(g.round(0), Some(0));
    }

    #[test]
    fn test_round_is_multiple_and_nearest() {
        let g = Granularity::with_unit(PAGE);
        for size in (0..64 * PAGE).step_by(97) {
            let rounded = g.round(size).unwrap();
            assert_eq!(rounded % PAGE, 0);
            assert!(rounded.abs_diff(size) <= PAGE / 2);
        }
    }

    #[test]
    fn test_round_overflow() {
        let g = Granularity::with_unit(PAGE);
        assert_eq!(g.round(usize::MAX), None);
        assert_eq!(g.round_up(usize::MAX), None);
    }

    #[test]
    fn test_round_up() {
        let g = Granularity::with_unit(PAGE);
        assert_eq!(g.round_up(1), Some(PAGE));
        assert_eq!(g.round_up(PAGE), Some(PAGE));
        assert_eq!(g.round_up(PAGE + 1), Some(2 * PAGE));
    }
}
