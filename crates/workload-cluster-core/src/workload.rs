//! Workload model: query templates and their arrival series.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::series::{TimeSeries, Timestamp};

/// A canonicalized query and its per-minute arrival counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Normalized query text; doubles as the template's identity.
    pub text: String,

    /// Arrival counts keyed by minute.
    pub series: TimeSeries,

    /// Unix epoch seconds at which the template was first seen.
    ///
    /// Only used to annotate log output.
    pub first_seen: i64,
}

impl Template {
    pub fn new(text: impl Into<String>, series: TimeSeries, first_seen: i64) -> Self {
        Self {
            text: text.into(),
            series,
            first_seen,
        }
    }
}

/// The full set of templates fed to the clustering engine.
///
/// Templates are keyed by text, so iteration order is lexicographic and
/// therefore reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    templates: BTreeMap<String, Template>,
    span: Option<(Timestamp, Timestamp)>,
}

impl Workload {
    /// Build a workload, deriving the global time span from the data.
    ///
    /// A later template with the same text replaces an earlier one.
    pub fn new(templates: impl IntoIterator<Item = Template>) -> Self {
        let mut workload = Self::default();
        for template in templates {
            workload.insert(template);
        }
        workload
    }

    /// Convenience constructor from `(text, series)` pairs with no first-seen epoch.
    pub fn from_series<S: Into<String>>(series: impl IntoIterator<Item = (S, TimeSeries)>) -> Self {
        Self::new(
            series
                .into_iter()
                .map(|(text, series)| Template::new(text, series, 0)),
        )
    }

    /// Add or replace a template.
    pub fn insert(&mut self, template: Template) {
        if let (Some(first), Some(last)) = (
            template.series.first_timestamp(),
            template.series.last_timestamp(),
        ) {
            self.span = Some(match self.span {
                Some((lo, hi)) => (lo.min(first), hi.max(last)),
                None => (first, last),
            });
        }
        self.templates.insert(template.text.clone(), template);
    }

    /// Global `(min_date, max_date)` over every template, if any data exists.
    pub fn span(&self) -> Option<(Timestamp, Timestamp)> {
        self.span
    }

    pub fn get(&self, text: &str) -> Option<&Template> {
        self.templates.get(text)
    }

    /// Templates in lexicographic order of their text.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    /// Template texts in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Sum of every template's counts.
    pub fn total_queries(&self) -> i64 {
        self.templates.values().map(|t| t.series.total()).sum()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
