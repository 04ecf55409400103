//! Modular sequence-number arithmetic shared by both window managers.
//!
//! Sequence numbers live in `[0, size)` and wrap back to zero.  Positions are
//! always measured *relative to a window base*: the offset of `x` from `base`
//! is `(x - base + size) mod size`, so a value just behind the base shows up
//! as a large offset and falls outside any window no bigger than half the
//! space.

/// A finite, cyclic sequence-number space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    size: i32,
}

impl SeqSpace {
    /// # Panics
    ///
    /// Panics if `size` is not positive.  [`crate::config::SrConfig`] rejects
    /// such values before a space is ever built from them.
    pub fn new(size: i32) -> Self {
        assert!(size > 0, "sequence space must be non-empty");
        Self { size }
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    /// `true` when `x` is a legal sequence number in this space.
    pub fn contains(&self, x: i32) -> bool {
        (0..self.size).contains(&x)
    }

    /// The sequence number following `x`.
    pub fn next(&self, x: i32) -> i32 {
        self.add(x, 1)
    }

    /// The sequence number preceding `x`.
    pub fn prev(&self, x: i32) -> i32 {
        self.wrap(i64::from(x) - 1)
    }

    /// `x` advanced by `n` positions.
    pub fn add(&self, x: i32, n: usize) -> i32 {
        let n = (n as u64 % self.size as u64) as i64;
        self.wrap(i64::from(x) + n)
    }

    /// Offset of `x` from `base`, or `None` when `x` lies outside the space
    /// (a sentinel or a consistently-rewritten garbage value).
    pub fn offset(&self, x: i32, base: i32) -> Option<usize> {
        if !self.contains(x) {
            return None;
        }
        Some(self.wrap(i64::from(x) - i64::from(base)) as usize)
    }

    fn wrap(&self, v: i64) -> i32 {
        v.rem_euclid(i64::from(self.size)) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_wraps_to_zero() {
        let s = SeqSpace::new(12);
        assert_eq!(s.next(0), 1);
        assert_eq!(s.next(11), 0);
    }

    #[test]
    fn prev_wraps_to_top() {
        let s = SeqSpace::new(12);
        assert_eq!(s.prev(0), 11);
        assert_eq!(s.prev(5), 4);
    }

    #[test]
    fn add_handles_large_steps() {
        let s = SeqSpace::new(12);
        assert_eq!(s.add(10, 3), 1);
        assert_eq!(s.add(4, 24), 4);
    }

    #[test]
    fn offset_measures_forward_distance() {
        let s = SeqSpace::new(12);
        assert_eq!(s.offset(5, 3), Some(2));
        assert_eq!(s.offset(1, 10), Some(3));
        // One behind the base is as far away as possible.
        assert_eq!(s.offset(9, 10), Some(11));
    }

    #[test]
    fn offset_rejects_values_outside_space() {
        let s = SeqSpace::new(12);
        assert_eq!(s.offset(-1, 0), None);
        assert_eq!(s.offset(12, 0), None);
        assert_eq!(s.offset(999_999, 3), None);
    }
}
