//! Fire labels for temperature acts

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate};

use crate::models::FireEvent;
use crate::types::StockpileId;

/// Half-width of the window around a recorded fire, in days. Absorbs the
/// reporting lag between the fire log and the temperature log.
pub const FIRE_WINDOW_DAYS: i64 = 2;

/// Fire dates per stockpile
#[derive(Debug, Clone, Default)]
pub struct FireIndex {
    fires: HashMap<StockpileId, BTreeSet<NaiveDate>>,
}

impl FireIndex {
    pub fn from_events(events: &[FireEvent]) -> Self {
        let mut fires: HashMap<StockpileId, BTreeSet<NaiveDate>> = HashMap::new();
        for event in events {
            fires
                .entry(event.stockpile.clone())
                .or_default()
                .insert(event.fire_date);
        }
        Self { fires }
    }

    /// True when `stockpile` has a fire within ±[`FIRE_WINDOW_DAYS`] of `date`.
    /// A window bound past the calendar range is left open.
    pub fn is_near_fire(&self, stockpile: &StockpileId, date: NaiveDate) -> bool {
        let window = Duration::days(FIRE_WINDOW_DAYS);
        let lower = date.checked_sub_signed(window).unwrap_or(NaiveDate::MIN);
        let upper = date.checked_add_signed(window).unwrap_or(NaiveDate::MAX);
        self.fires
            .get(stockpile)
            .is_some_and(|dates| dates.range(lower..=upper).next().is_some())
    }

    pub fn label(&self, stockpile: &StockpileId, date: NaiveDate) -> u8 {
        u8::from(self.is_near_fire(stockpile, date))
    }

    /// Number of distinct (stockpile, date) fires
    pub fn len(&self) -> usize {
        self.fires.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.fires.is_empty()
    }
}

/// Label each `(stockpile, date)` pair, preserving order
pub fn label_records<'a, I>(index: &FireIndex, records: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a StockpileId, NaiveDate)>,
{
    records
        .into_iter()
        .map(|(stockpile, date)| index.label(stockpile, date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fire(yard: &str, stack: &str, d: NaiveDate) -> FireEvent {
        FireEvent {
            stockpile: StockpileId::from_parts(yard, stack),
            fire_date: d,
            grade: None,
            formed_on: None,
        }
    }

    #[test]
    fn test_window_boundaries() {
        let index = FireIndex::from_events(&[fire("6", "4", date(2020, 8, 5))]);
        let id = StockpileId::from_parts("6", "4");
        assert_eq!(index.label(&id, date(2020, 8, 2)), 0);
        assert_eq!(index.label(&id, date(2020, 8, 3)), 1);
        assert_eq!(index.label(&id, date(2020, 8, 5)), 1);
        assert_eq!(index.label(&id, date(2020, 8, 7)), 1);
        assert_eq!(index.label(&id, date(2020, 8, 8)), 0);
    }

    #[test]
    fn test_other_stockpile_not_labeled() {
        let index = FireIndex::from_events(&[fire("6", "4", date(2020, 8, 5))]);
        assert_eq!(index.label(&StockpileId::from_parts("6", "5"), date(2020, 8, 5)), 0);
    }

    #[test]
    fn test_two_fires_in_window_single_label() {
        let index = FireIndex::from_events(&[
            fire("6", "4", date(2020, 8, 5)),
            fire("6", "4", date(2020, 8, 6)),
            fire("6", "4", date(2020, 8, 6)),
        ]);
        assert_eq!(index.len(), 2);
        let id = StockpileId::from_parts("6", "4");
        let labels = label_records(&index, [(&id, date(2020, 8, 5)), (&id, date(2020, 8, 20))]);
        assert_eq!(labels, vec![1, 0]);
    }

    #[test]
    fn test_window_at_calendar_edges() {
        let id = StockpileId::from_parts("6", "4");
        let index = FireIndex::from_events(&[
            fire("6", "4", NaiveDate::MIN),
            fire("6", "4", NaiveDate::MAX),
        ]);
        assert_eq!(index.label(&id, NaiveDate::MIN), 1);
        assert_eq!(index.label(&id, NaiveDate::MAX), 1);
        assert_eq!(index.label(&id, NaiveDate::MIN + Duration::days(2)), 1);
        assert_eq!(index.label(&id, NaiveDate::MAX - Duration::days(3)), 0);
    }

    proptest! {
        #[test]
        fn prop_label_window_symmetric(offset in -10i64..=10) {
            let fire_date = date(2021, 3, 15);
            let index = FireIndex::from_events(&[fire("1", "1", fire_date)]);
            let id = StockpileId::from_parts("1", "1");
            let label = index.label(&id, fire_date + Duration::days(offset));
            let mirrored = index.label(&id, fire_date - Duration::days(offset));
            prop_assert_eq!(label, mirrored);
            prop_assert_eq!(label == 1, offset.abs() <= FIRE_WINDOW_DAYS);
        }
    }
}
