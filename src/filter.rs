use crate::error::{Result, TrackerError};
use crate::models::{AdmissionRow, SeriesFilter, Table};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MAX_RATE_LIMIT: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub universities: Vec<String>,
    pub max_latest_rate: Option<f64>,
    pub series_filter: SeriesFilter,
    pub only_recommended: bool,
}

/// A single row predicate. A filter config is the conjunction of its predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Universities(Vec<String>),
    MaxLatestRate(f64),
    Series(SeriesFilter),
    OnlyRecommended,
}

impl Predicate {
    pub fn matches(&self, row: &AdmissionRow) -> bool {
        match self {
            Predicate::Universities(names) => names.iter().any(|n| *n == row.university),
            // Rows without a latest rate never pass a threshold
            Predicate::MaxLatestRate(max) => row.latest_rate().map(|rate| rate <= *max).unwrap_or(false),
            Predicate::Series(series) => series.matches(row.track),
            Predicate::OnlyRecommended => row.is_recommended_track,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.universities.is_empty() {
            return Err(TrackerError::Validation(
                "select at least one university".to_string(),
            ));
        }
        if let Some(max) = self.max_latest_rate {
            if !(0.0..=MAX_RATE_LIMIT).contains(&max) {
                return Err(TrackerError::Validation(format!(
                    "competition rate threshold must be between 0 and {}, got {}",
                    MAX_RATE_LIMIT, max
                )));
            }
        }
        Ok(())
    }

    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = vec![Predicate::Universities(self.universities.clone())];
        if let Some(max) = self.max_latest_rate {
            predicates.push(Predicate::MaxLatestRate(max));
        }
        if self.series_filter != SeriesFilter::All {
            predicates.push(Predicate::Series(self.series_filter));
        }
        if self.only_recommended {
            predicates.push(Predicate::OnlyRecommended);
        }
        predicates
    }
}

impl Table {
    /// Derived table holding the rows that satisfy `predicate`
    pub fn retain(&self, predicate: &Predicate) -> Table {
        self.derive(self.rows.iter().filter(|row| predicate.matches(row)).cloned().collect())
    }
}

/// Narrow `table` by each predicate in turn
pub fn apply_predicates(table: &Table, predicates: &[Predicate]) -> Table {
    match predicates.split_first() {
        Some((first, rest)) => rest.iter().fold(table.retain(first), |acc, p| acc.retain(p)),
        None => table.derive(table.rows.clone()),
    }
}

/// Rows matching every predicate of `config`
pub fn apply_filters(table: &Table, config: &FilterConfig) -> Result<Table> {
    config.validate()?;

    let predicates = config.predicates();
    let filtered = apply_predicates(table, &predicates);

    debug!(
        "filtered {} of {} rows with {} predicates",
        filtered.rows.len(),
        table.rows.len(),
        predicates.len()
    );
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::sample_table;
    use crate::loader::TableLoader;
    use crate::models::TableLayout;

    fn config(universities: &[&str], max: Option<f64>) -> FilterConfig {
        FilterConfig {
            universities: universities.iter().map(|u| u.to_string()).collect(),
            max_latest_rate: max,
            series_filter: SeriesFilter::All,
            only_recommended: false,
        }
    }

    #[test]
    fn test_empty_universities_is_validation_error() {
        let table = sample_table();
        let err = apply_filters(&table, &config(&[], Some(6.0))).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }

    #[test]
    fn test_threshold_out_of_range_is_validation_error() {
        let table = sample_table();
        assert!(apply_filters(&table, &config(&["A대학교"], Some(-1.0))).is_err());
        assert!(apply_filters(&table, &config(&["A대학교"], Some(100.5))).is_err());
        assert!(apply_filters(&table, &config(&["A대학교"], Some(f64::NAN))).is_err());
    }

    #[test]
    fn test_rate_threshold_drops_absent_and_higher_rates() {
        let table = sample_table();
        for threshold in [0.0, 5.0, 6.0, 6.5, 7.0, 100.0] {
            let filtered = apply_filters(&table, &config(&["A대학교", "B대학교"], Some(threshold))).unwrap();
            for row in &filtered.rows {
                let rate = row.latest_rate().expect("absent latest rate passed the filter");
                assert!(rate <= threshold);
            }
        }
        let all = apply_filters(&table, &config(&["A대학교", "B대학교"], Some(100.0))).unwrap();
        assert_eq!(all.rows.len(), 4);
    }

    #[test]
    fn test_threshold_keeps_only_matching_university() {
        let layout = TableLayout::default();
        let csv = "\
대학명,전형구분,모집단위,경쟁률_0910
A,교과,수학과,5.0
B,교과,수학과,7.0
";
        let table = TableLoader::new(&layout).unwrap().load_reader(csv.as_bytes(), "t").unwrap();
        let filtered = apply_filters(&table, &config(&["A", "B"], Some(6.0))).unwrap();
        assert_eq!(filtered.rows.len(), 1);
        assert_eq!(filtered.rows[0].university, "A");
    }

    #[test]
    fn test_series_and_recommended_filters() {
        let table = sample_table();
        let mut cfg = config(&["A대학교", "B대학교"], None);
        cfg.series_filter = SeriesFilter::NaturalScience;
        let natural = apply_filters(&table, &cfg).unwrap();
        assert_eq!(natural.rows.len(), 3);

        cfg.only_recommended = true;
        let recommended = apply_filters(&table, &cfg).unwrap();
        let departments: Vec<&str> = recommended.rows.iter().map(|r| r.department.as_str()).collect();
        assert_eq!(departments, vec!["수학과", "물리학과"]);
    }

    #[test]
    fn test_apply_filters_is_idempotent() {
        let table = sample_table();
        let mut cfg = config(&["A대학교", "B대학교"], Some(6.5));
        cfg.series_filter = SeriesFilter::Humanities;
        let once = apply_filters(&table, &cfg).unwrap();
        let twice = apply_filters(&once, &cfg).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_predicate_order_does_not_matter() {
        let table = sample_table();
        let universities = Predicate::Universities(vec!["A대학교".to_string()]);
        let rate = Predicate::MaxLatestRate(6.0);

        let first = table.retain(&universities).retain(&rate);
        let second = table.retain(&rate).retain(&universities);
        assert_eq!(first, second);

        let combined = apply_filters(&table, &config(&["A대학교"], Some(6.0))).unwrap();
        assert_eq!(first, combined);
    }

    #[test]
    fn test_reversed_predicate_list_gives_same_rows() {
        let table = sample_table();
        let cfg = FilterConfig {
            universities: vec!["A대학교".to_string(), "B대학교".to_string()],
            max_latest_rate: Some(7.0),
            series_filter: SeriesFilter::NaturalScience,
            only_recommended: true,
        };
        let mut reversed = cfg.predicates();
        reversed.reverse();
        assert_eq!(reversed.len(), 4);

        let forward = apply_filters(&table, &cfg).unwrap();
        let backward = apply_predicates(&table, &reversed);
        assert_eq!(forward, backward);
        let departments: Vec<&str> = forward.rows.iter().map(|r| r.department.as_str()).collect();
        assert_eq!(departments, vec!["수학과", "물리학과"]);
    }

    #[test]
    fn test_no_predicates_keeps_every_row() {
        let table = sample_table();
        assert_eq!(apply_predicates(&table, &[]), table);
    }

    #[test]
    fn test_filtering_leaves_source_untouched() {
        let table = sample_table();
        let before = table.clone();
        let _ = apply_filters(&table, &config(&["B대학교"], Some(1.0))).unwrap();
        assert_eq!(table, before);
    }
}
