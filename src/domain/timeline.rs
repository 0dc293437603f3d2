//! Trading-session timeline shared by every component of a run.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// Sorted, de-duplicated trading dates with constant-time session lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    dates: Vec<NaiveDate>,
    index: HashMap<NaiveDate, usize>,
}

impl Timeline {
    pub fn new<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Self {
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();
        let dates: Vec<NaiveDate> = unique.into_iter().collect();
        let index = dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();
        Self { dates, index }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date(&self, session: usize) -> Option<NaiveDate> {
        self.dates.get(session).copied()
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Session index of an exact trading date.
    pub fn session(&self, date: NaiveDate) -> Option<usize> {
        self.index.get(&date).copied()
    }

    /// First session on or after `date`, if any.
    pub fn session_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.dates.partition_point(|d| *d < date);
        (idx < self.dates.len()).then_some(idx)
    }

    /// Last session on or before `date`, if any.
    pub fn session_on_or_before(&self, date: NaiveDate) -> Option<usize> {
        self.dates.partition_point(|d| *d <= date).checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn new_sorts_and_deduplicates() {
        let tl = Timeline::new(vec![d(2024, 1, 3), d(2024, 1, 1), d(2024, 1, 3), d(2024, 1, 2)]);
        assert_eq!(tl.len(), 3);
        assert_eq!(tl.dates(), &[d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
    }

    #[test]
    fn session_lookup_exact() {
        let tl = Timeline::new(vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 5)]);
        assert_eq!(tl.session(d(2024, 1, 3)), Some(1));
        assert_eq!(tl.session(d(2024, 1, 4)), None);
    }

    #[test]
    fn session_on_or_after_snaps_forward() {
        let tl = Timeline::new(vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 5)]);
        assert_eq!(tl.session_on_or_after(d(2024, 1, 4)), Some(2));
        assert_eq!(tl.session_on_or_after(d(2024, 1, 1)), Some(0));
        assert_eq!(tl.session_on_or_after(d(2024, 1, 6)), None);
    }

    #[test]
    fn session_on_or_before_snaps_back() {
        let tl = Timeline::new(vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 5)]);
        assert_eq!(tl.session_on_or_before(d(2024, 1, 4)), Some(1));
        assert_eq!(tl.session_on_or_before(d(2024, 1, 5)), Some(2));
        assert_eq!(tl.session_on_or_before(d(2024, 1, 1)), None);
    }

    #[test]
    fn empty_timeline() {
        let tl = Timeline::new(Vec::new());
        assert!(tl.is_empty());
        assert_eq!(tl.first(), None);
        assert_eq!(tl.session_on_or_after(d(2024, 1, 1)), None);
    }
}
