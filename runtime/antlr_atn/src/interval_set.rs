//! Ordered sets of token types stored as inclusive ranges.
//!
//! Lookahead sets and `Set`/`NotSet` transition labels are usually a handful
//! of contiguous ranges, so the intervals live inline in a `SmallVec`.
//! Intervals are kept sorted, disjoint and coalesced: adding `3` to
//! `{1..2, 4..5}` yields the single range `1..5`.

use std::fmt;

use smallvec::SmallVec;

use crate::token::{EOF, EPSILON};

/// Inclusive range `start..=stop` of token types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    pub start: i32,
    pub stop: i32,
}

impl Interval {
    #[inline]
    pub const fn new(start: i32, stop: i32) -> Self {
        Interval { start, stop }
    }

    #[inline]
    pub const fn contains(self, value: i32) -> bool {
        self.start <= value && value <= self.stop
    }

    /// Number of values covered. Zero for an inverted range.
    #[inline]
    pub fn len(self) -> usize {
        usize::try_from(i64::from(self.stop) - i64::from(self.start) + 1).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.stop < self.start
    }
}

/// Sorted, disjoint, coalesced set of [`Interval`]s.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntervalSet {
    intervals: SmallVec<[Interval; 2]>,
}

impl IntervalSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set containing exactly `value`.
    pub fn of(value: i32) -> Self {
        Self::of_range(value, value)
    }

    /// Set containing `start..=stop`.
    pub fn of_range(start: i32, stop: i32) -> Self {
        let mut set = Self::new();
        set.add_range(start, stop);
        set
    }

    pub fn add_one(&mut self, value: i32) {
        self.add_range(value, value);
    }

    /// Add `start..=stop`, merging with any overlapping or adjacent ranges.
    pub fn add_range(&mut self, start: i32, stop: i32) {
        if stop < start {
            return;
        }
        let mut lo = start;
        let mut hi = stop;

        // First interval that could touch the new one (its stop is at least lo - 1).
        let first = self
            .intervals
            .partition_point(|iv| iv.stop < lo.saturating_sub(1));
        let mut last = first;
        while last < self.intervals.len() && self.intervals[last].start <= hi.saturating_add(1) {
            lo = lo.min(self.intervals[last].start);
            hi = hi.max(self.intervals[last].stop);
            last += 1;
        }
        self.intervals.drain(first..last);
        self.intervals.insert(first, Interval::new(lo, hi));
    }

    /// Add every element of `other`.
    pub fn add_set(&mut self, other: &IntervalSet) {
        for iv in &other.intervals {
            self.add_range(iv.start, iv.stop);
        }
    }

    /// Union of `self` and `other`.
    #[must_use]
    pub fn or(&self, other: &IntervalSet) -> IntervalSet {
        let mut result = self.clone();
        result.add_set(other);
        result
    }

    pub fn remove_one(&mut self, value: i32) {
        self.remove_range(value, value);
    }

    /// Remove `start..=stop`, splitting any interval that straddles it.
    pub fn remove_range(&mut self, start: i32, stop: i32) {
        if stop < start {
            return;
        }
        let mut kept: SmallVec<[Interval; 2]> = SmallVec::with_capacity(self.intervals.len() + 1);
        for iv in &self.intervals {
            if iv.stop < start || iv.start > stop {
                kept.push(*iv);
                continue;
            }
            if iv.start < start {
                kept.push(Interval::new(iv.start, start - 1));
            }
            if iv.stop > stop {
                kept.push(Interval::new(stop + 1, iv.stop));
            }
        }
        self.intervals = kept;
    }

    /// Elements of `self` that are not in `other`.
    #[must_use]
    pub fn subtract(&self, other: &IntervalSet) -> IntervalSet {
        let mut result = self.clone();
        for iv in &other.intervals {
            result.remove_range(iv.start, iv.stop);
        }
        result
    }

    /// Elements of `vocabulary` that are not in `self`.
    #[must_use]
    pub fn complement(&self, vocabulary: &IntervalSet) -> IntervalSet {
        vocabulary.subtract(self)
    }

    pub fn contains(&self, value: i32) -> bool {
        let idx = self.intervals.partition_point(|iv| iv.stop < value);
        self.intervals.get(idx).is_some_and(|iv| iv.contains(value))
    }

    /// Number of elements (not intervals).
    pub fn len(&self) -> usize {
        self.intervals.iter().map(|iv| iv.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn min_element(&self) -> Option<i32> {
        self.intervals.first().map(|iv| iv.start)
    }

    pub fn max_element(&self) -> Option<i32> {
        self.intervals.last().map(|iv| iv.stop)
    }

    /// The underlying intervals, ascending.
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Every element, ascending.
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.intervals.iter().flat_map(|iv| iv.start..=iv.stop)
    }
}

fn fmt_element(f: &mut fmt::Formatter<'_>, value: i32) -> fmt::Result {
    match value {
        EOF => write!(f, "<EOF>"),
        EPSILON => write!(f, "<EPSILON>"),
        _ => write!(f, "{value}"),
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return write!(f, "{{}}");
        }
        let braces = self.len() > 1;
        if braces {
            write!(f, "{{")?;
        }
        for (i, iv) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            fmt_element(f, iv.start)?;
            if iv.stop != iv.start {
                write!(f, "..")?;
                fmt_element(f, iv.stop)?;
            }
        }
        if braces {
            write!(f, "}}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntervalSet({self})")
    }
}

impl FromIterator<i32> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = i32>>(iter: T) -> Self {
        let mut set = IntervalSet::new();
        for value in iter {
            set.add_one(value);
        }
        set
    }
}
