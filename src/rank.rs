use crate::record::{Record, SortKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Rating,
    Popularity,
}

impl Metric {
    pub fn value(self, r: &Record) -> Option<f64> {
        match self {
            Metric::Rating => r.rating,
            Metric::Popularity => r.popularity,
        }
    }

    pub fn sort_key(self) -> SortKey {
        match self {
            Metric::Rating => SortKey::Rating,
            Metric::Popularity => SortKey::Popularity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Rating => "rating",
            Metric::Popularity => "popularity",
        }
    }
}

/// Stable descending sort by `metric`, missing values last, truncated to `limit`.
pub fn rank(mut records: Vec<Record>, metric: Metric, limit: usize) -> Vec<Record> {
    records.sort_by(|a, b| compare_desc(metric.value(a), metric.value(b)));
    records.truncate(limit);
    records
}

fn compare_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
