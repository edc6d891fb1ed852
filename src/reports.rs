use crate::filter::{Field, FilteredView};
use crate::types::{AlertFlag, GroupMean, Share, State, SummaryStats, OTHER};
use crate::util::average;
use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Complaints at or past this many business days count as heavily delayed.
pub const LONG_DELAY_DAYS: i64 = 40;

pub fn summarize(view: &FilteredView<'_>) -> SummaryStats {
    let delays: Vec<f64> = view
        .rows
        .iter()
        .filter_map(|r| r.delay_business_days)
        .map(|d| d as f64)
        .collect();
    let total_restituted = if view.has_restitution_amount {
        view.rows.iter().map(|r| r.restituted_amount).sum()
    } else {
        0.0
    };
    SummaryStats {
        total_complaints: view.len(),
        delayed_40_plus: view
            .rows
            .iter()
            .filter(|r| r.delay_business_days.is_some_and(|d| d >= LONG_DELAY_DAYS))
            .count(),
        open_alerts: view
            .rows
            .iter()
            .filter(|r| r.alert_flag == Some(AlertFlag::Alert))
            .count(),
        avg_delay: average(&delays),
        total_restituted,
    }
}

/// Count and proportion per value of `field`, most frequent first.
///
/// Ties keep first-seen order. When there are more than `top_n` distinct
/// values, everything past the first `top_n` is merged into "Other". Null
/// values are left out of both counts and proportions.
pub fn distribution(view: &FilteredView<'_>, field: Field, top_n: usize) -> Vec<Share> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in view.rows.iter().filter_map(|r| field.value_of(r)) {
        let c = counts.entry(v).or_insert_with(|| {
            order.push(v);
            0
        });
        *c += 1;
    }
    let total: usize = counts.values().sum();
    if total == 0 {
        return Vec::new();
    }

    // Stable sort keeps first-seen order among equal counts.
    let mut ranked: Vec<(&str, usize)> = order.iter().map(|v| (*v, counts[v])).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let mut shares: Vec<(String, usize)> = Vec::new();
    if ranked.len() > top_n {
        let rest: usize = ranked[top_n..].iter().map(|(_, c)| c).sum();
        shares.extend(ranked[..top_n].iter().map(|(v, c)| (v.to_string(), *c)));
        shares.push((OTHER.to_string(), rest));
    } else {
        shares.extend(ranked.iter().map(|(v, c)| (v.to_string(), *c)));
    }

    shares
        .into_iter()
        .map(|(label, count)| Share {
            label,
            count,
            proportion: count as f64 / total as f64,
        })
        .collect()
}

/// Mean delay of closed complaints per value of `field`, fastest first.
pub fn closed_mean_by(view: &FilteredView<'_>, field: Field) -> Vec<GroupMean> {
    let mut acc: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for r in &view.rows {
        if r.state != State::Closed {
            continue;
        }
        if let (Some(label), Some(d)) = (field.value_of(r), r.delay_business_days) {
            acc.entry(label).or_default().push(d as f64);
        }
    }
    let mut rows: Vec<GroupMean> = acc
        .into_iter()
        .map(|(label, delays)| GroupMean {
            label: label.to_string(),
            closed: delays.len(),
            mean_delay: average(&delays),
        })
        .collect();
    rows.sort_by(|a, b| {
        a.mean_delay
            .partial_cmp(&b.mean_delay)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    rows
}

/// Complaints created in the month of `today`, per day of month.
pub fn daily_counts_for_month(view: &FilteredView<'_>, today: NaiveDate) -> Vec<(u32, usize)> {
    let mut per_day: BTreeMap<u32, usize> = BTreeMap::new();
    for date in view.rows.iter().filter_map(|r| r.record.creation_date) {
        if date.year() == today.year() && date.month() == today.month() {
            *per_day.entry(date.day()).or_insert(0) += 1;
        }
    }
    per_day.into_iter().collect()
}
