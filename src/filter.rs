use crate::error::ReportError;
use crate::types::{EnrichedRecord, EnrichedTable};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Categorical fields a selection can constrain or a distribution can be
/// computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Field {
    Bucket,
    State,
    Alert,
    Status,
    Family,
    Responsible,
    ChannelSource,
    FoundedFlag,
    ResponsibleEntity,
    Restitution,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Bucket,
        Field::State,
        Field::Alert,
        Field::Status,
        Field::Family,
        Field::Responsible,
        Field::ChannelSource,
        Field::FoundedFlag,
        Field::ResponsibleEntity,
        Field::Restitution,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Bucket => "bucket",
            Field::State => "state",
            Field::Alert => "alert",
            Field::Status => "status",
            Field::Family => "family",
            Field::Responsible => "responsible",
            Field::ChannelSource => "channel",
            Field::FoundedFlag => "founded",
            Field::ResponsibleEntity => "entity",
            Field::Restitution => "restitution",
        }
    }

    /// The record's value for this field, `None` when it is null.
    pub fn value_of(self, r: &EnrichedRecord) -> Option<&str> {
        match self {
            Field::Bucket => r.delay_bucket.map(|b| b.as_str()),
            Field::State => Some(r.state.as_str()),
            Field::Alert => r.alert_flag.map(|a| a.as_str()),
            Field::Status => Some(r.record.status.as_str()),
            Field::Family => Some(r.record.family.as_str()),
            Field::Responsible => Some(r.record.responsible.as_str()),
            Field::ChannelSource => Some(r.record.channel_source.as_str()),
            Field::FoundedFlag => Some(r.record.founded_flag.as_str()),
            Field::ResponsibleEntity => Some(r.record.responsible_entity.as_str()),
            Field::Restitution => Some(r.restitution_label.as_str()),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Field::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ReportError::InvalidArgument(format!("unknown field '{}'", s)))
    }
}

/// User-chosen allowed values per field plus a maximum delay.
///
/// A field absent from `allowed` is unconstrained; a field mapped to an empty
/// set matches nothing. All predicates are independent and combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSelection {
    pub allowed: BTreeMap<Field, BTreeSet<String>>,
    pub max_delay: Option<i64>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow<I, S>(mut self, field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(field, values);
        self
    }

    pub fn set<I, S>(&mut self, field: Field, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed
            .insert(field, values.into_iter().map(Into::into).collect());
    }

    pub fn clear(&mut self, field: Field) {
        self.allowed.remove(&field);
    }

    pub fn with_max_delay(mut self, max_delay: i64) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn matches(&self, r: &EnrichedRecord) -> bool {
        if let Some(max) = self.max_delay {
            match r.delay_business_days {
                Some(d) if d <= max => {}
                _ => return false,
            }
        }
        self.allowed.iter().all(|(field, values)| {
            field
                .value_of(r)
                .is_some_and(|v| values.contains(v))
        })
    }

    pub fn apply<'a>(&self, table: &'a EnrichedTable) -> FilteredView<'a> {
        let rows: Vec<&EnrichedRecord> =
            table.records.iter().filter(|r| self.matches(r)).collect();
        tracing::debug!(total = table.records.len(), kept = rows.len(), "applied filter selection");
        FilteredView {
            rows,
            has_restitution_amount: table.has_restitution_amount,
            today: table.today,
        }
    }

    /// One line per active predicate, for console display.
    pub fn describe(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .allowed
            .iter()
            .map(|(field, values)| {
                let list: Vec<&str> = values.iter().map(String::as_str).collect();
                format!("{}: {}", field, list.join(", "))
            })
            .collect();
        if let Some(max) = self.max_delay {
            lines.push(format!("max delay: {} business days", max));
        }
        lines
    }
}

/// Read-only projection of the enriched table.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    pub rows: Vec<&'a EnrichedRecord>,
    pub has_restitution_amount: bool,
    pub today: chrono::NaiveDate,
}

impl<'a> FilteredView<'a> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Observed (min, max) valid delay, used to bound the max-delay control.
pub fn delay_range(table: &EnrichedTable) -> Option<(i64, i64)> {
    let mut delays = table.records.iter().filter_map(|r| r.delay_business_days);
    let first = delays.next()?;
    Some(delays.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d))))
}

/// Distinct values of a field in first-seen order, for building selections.
pub fn distinct_values(table: &EnrichedTable, field: Field) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for v in table.records.iter().filter_map(|r| field.value_of(r)) {
        if seen.insert(v) {
            out.push(v.to_string());
        }
    }
    out
}
