use crate::models::{AdmissionRow, Snapshot};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMean {
    pub key: String,
    pub mean: f64,
    pub count: usize,
}

/// Per-group means, in the order each group first appears in the rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupMeans {
    pub entries: Vec<GroupMean>,
}

impl GroupMeans {
    pub fn pairs(&self) -> Vec<(String, f64)> {
        self.entries.iter().map(|e| (e.key.clone(), e.mean)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: f64,
}

/// Mean of `value` per distinct `key`, ignoring absent values.
/// Groups with no present value get no entry.
pub fn group_mean<K, V>(rows: &[AdmissionRow], key: K, value: V) -> GroupMeans
where
    K: Fn(&AdmissionRow) -> &str,
    V: Fn(&AdmissionRow) -> Option<f64>,
{
    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, (f64, usize)> = HashMap::new();

    for row in rows {
        let group = key(row);
        if !sums.contains_key(group) {
            order.push(group.to_string());
            sums.insert(group.to_string(), (0.0, 0));
        }
        if let Some(v) = value(row) {
            if let Some(acc) = sums.get_mut(group) {
                acc.0 += v;
                acc.1 += 1;
            }
        }
    }

    let entries = order
        .into_iter()
        .filter_map(|group| {
            let (sum, count) = sums[&group];
            if count == 0 {
                None
            } else {
                Some(GroupMean {
                    key: group,
                    mean: sum / count as f64,
                    count,
                })
            }
        })
        .collect();

    GroupMeans { entries }
}

/// Highest `n` values first; ties keep input order
pub fn rank_top_n<K: Clone>(pairs: &[(K, f64)], n: usize) -> Vec<(K, f64)> {
    let mut ranked: Vec<(K, f64)> = pairs.iter().filter(|(_, v)| !v.is_nan()).cloned().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(n);
    ranked
}

/// Lowest `n` values first; ties keep input order
pub fn rank_bottom_n<K: Clone>(pairs: &[(K, f64)], n: usize) -> Vec<(K, f64)> {
    let mut ranked: Vec<(K, f64)> = pairs.iter().filter(|(_, v)| !v.is_nan()).cloned().collect();
    ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    ranked.truncate(n);
    ranked
}

/// Percentage change rounded to two decimals.
/// `None` when either side is absent or the baseline is zero.
pub fn percent_change(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    let current = current?;
    let previous = previous?;
    if previous == 0.0 {
        return None;
    }
    let change = round2((current - previous) / previous * 100.0);
    if change.is_finite() {
        Some(change)
    } else {
        None
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One point per present snapshot value of a row
pub fn time_series_for(row: &AdmissionRow, snapshots: &[Snapshot]) -> Vec<SeriesPoint> {
    snapshots
        .iter()
        .enumerate()
        .filter_map(|(i, snapshot)| {
            row.rate_at(i).map(|value| SeriesPoint {
                label: snapshot.label.clone(),
                value,
            })
        })
        .collect()
}

/// Mean of every snapshot across rows; snapshots without any value are skipped
pub fn mean_series(rows: &[&AdmissionRow], snapshots: &[Snapshot]) -> Vec<SeriesPoint> {
    snapshots
        .iter()
        .enumerate()
        .filter_map(|(i, snapshot)| {
            let values: Vec<f64> = rows.iter().filter_map(|row| row.rate_at(i)).collect();
            if values.is_empty() {
                None
            } else {
                Some(SeriesPoint {
                    label: snapshot.label.clone(),
                    value: values.iter().sum::<f64>() / values.len() as f64,
                })
            }
        })
        .collect()
}

/// Format an optional change for tables and console output
pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(value) => format!("{:.2}", value),
        None => "N/A".to_string(),
    }
}
