// Delay & alert pipeline.
//
// Each derived field is produced by a named pure function over the inputs it
// needs. `enrich` composes them in dependency order:
//
//   delay -> state -> bucket -> family mean (two passes) -> alert -> restitution
//
// The family mean is the only table-wide step: pass one aggregates closed
// records per family, pass two broadcasts the result to every record.
use crate::types::{
    AlertFlag, ComplaintRecord, ComplaintTable, DelayBucket, EnrichedRecord, EnrichedTable,
    RestitutionLabel, State,
};
use crate::util::business_days_between;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Open complaints in the 20..40 bucket whose family closes slower than this
/// on average are flagged.
pub const FAMILY_SLOW_MEAN_DAYS: f64 = 30.0;

/// Business days from creation to closure, or to `today` while still open.
///
/// `None` when the creation date is unknown or falls after the end date.
pub fn compute_business_delay(
    creation: Option<NaiveDate>,
    closure: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<i64> {
    let start = creation?;
    let end = closure.unwrap_or(today);
    let days = business_days_between(start, end);
    if days < 0 {
        warn!(%start, %end, "creation date falls after end date, delay left empty");
        return None;
    }
    Some(days)
}

pub fn classify_state(closure: Option<NaiveDate>) -> State {
    if closure.is_some() {
        State::Closed
    } else {
        State::Open
    }
}

pub fn classify_delay(delay: Option<i64>) -> Option<DelayBucket> {
    delay.map(DelayBucket::from_delay)
}

/// Pass one: mean delay of closed records with a valid delay, per family.
pub fn family_closed_means<'a, I>(rows: I) -> HashMap<String, f64>
where
    I: IntoIterator<Item = (&'a str, State, Option<i64>)>,
{
    let mut acc: HashMap<&str, (i64, usize)> = HashMap::new();
    for (family, state, delay) in rows {
        if let (State::Closed, Some(d)) = (state, delay) {
            let e = acc.entry(family).or_insert((0, 0));
            e.0 += d;
            e.1 += 1;
        }
    }
    acc.into_iter()
        .map(|(family, (sum, n))| (family.to_string(), sum as f64 / n as f64))
        .collect()
}

/// Alert for open complaints heading for the slow bucket in a family that is
/// historically slow to close.
///
/// Closed complaints are always `NotApplicable`. An open complaint without a
/// valid delay has no flag.
pub fn compute_alert(
    state: State,
    bucket: Option<DelayBucket>,
    delay: Option<i64>,
    family_mean: Option<f64>,
) -> Option<AlertFlag> {
    if state == State::Closed {
        return Some(AlertFlag::NotApplicable);
    }
    let days = delay?;
    let slow_family = family_mean.is_some_and(|m| m > FAMILY_SLOW_MEAN_DAYS);
    if bucket == Some(DelayBucket::TwentyToForty) && (20..40).contains(&days) && slow_family {
        Some(AlertFlag::Alert)
    } else {
        Some(AlertFlag::Ok)
    }
}

pub fn normalize_restitution(raw: Option<&str>) -> RestitutionLabel {
    match raw.map(|s| s.trim().to_uppercase()).as_deref() {
        Some("OUI") => RestitutionLabel::Oui,
        Some("NON") => RestitutionLabel::Non,
        _ => RestitutionLabel::Unspecified,
    }
}

pub fn restituted_amount(label: RestitutionLabel, amount: Option<f64>) -> f64 {
    match label {
        RestitutionLabel::Oui => amount.unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Per-record stages that do not depend on other records.
struct RowStage {
    delay: Option<i64>,
    state: State,
    bucket: Option<DelayBucket>,
}

fn row_stage(record: &ComplaintRecord, today: NaiveDate) -> RowStage {
    let delay = compute_business_delay(record.creation_date, record.closure_date, today);
    RowStage {
        delay,
        state: classify_state(record.closure_date),
        bucket: classify_delay(delay),
    }
}

/// Build the enriched table. `today` is the end date used for open records.
pub fn enrich(table: ComplaintTable, today: NaiveDate) -> EnrichedTable {
    let stages: Vec<RowStage> = table.records.iter().map(|r| row_stage(r, today)).collect();

    let family_means = family_closed_means(
        table
            .records
            .iter()
            .zip(&stages)
            .map(|(r, s)| (r.family.as_str(), s.state, s.delay)),
    );
    debug!(families = family_means.len(), "computed closed-delay means per family");

    let records: Vec<EnrichedRecord> = table
        .records
        .into_iter()
        .zip(stages)
        .map(|(record, stage)| {
            let family_mean = family_means.get(&record.family).copied();
            let alert = compute_alert(stage.state, stage.bucket, stage.delay, family_mean);
            let label = normalize_restitution(record.restitution_flag.as_deref());
            let amount = restituted_amount(label, record.restitution_amount);
            EnrichedRecord {
                delay_business_days: stage.delay,
                state: stage.state,
                delay_bucket: stage.bucket,
                family_mean_closed_delay: family_mean,
                alert_flag: alert,
                restitution_label: label,
                restituted_amount: amount,
                record,
            }
        })
        .collect();

    let alerts = records
        .iter()
        .filter(|r| r.alert_flag == Some(AlertFlag::Alert))
        .count();
    info!(records = records.len(), alerts, %today, "enriched complaint table");

    EnrichedTable {
        headers: table.headers,
        records,
        has_restitution_amount: table.has_restitution_amount,
        today,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNSPECIFIED;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn record(family: &str, created: Option<NaiveDate>, closed: Option<NaiveDate>) -> ComplaintRecord {
        ComplaintRecord {
            cells: Vec::new(),
            creation_date: created,
            closure_date: closed,
            family: family.to_string(),
            status: UNSPECIFIED.to_string(),
            responsible: UNSPECIFIED.to_string(),
            channel_source: UNSPECIFIED.to_string(),
            founded_flag: UNSPECIFIED.to_string(),
            responsible_entity: UNSPECIFIED.to_string(),
            restitution_flag: None,
            restitution_amount: None,
        }
    }

    fn table(records: Vec<ComplaintRecord>) -> ComplaintTable {
        ComplaintTable {
            headers: Vec::new(),
            records,
            has_restitution_amount: false,
        }
    }

    // Monday 2024-01-01 plus `n` business days (n < 5 * weeks).
    fn plus_business_days(n: i64) -> NaiveDate {
        d(2024, 1, 1) + chrono::Duration::days((n / 5) * 7 + n % 5)
    }

    #[test]
    fn closed_delay_uses_closure_date() {
        // Monday to following Monday.
        let delay = compute_business_delay(Some(d(2024, 3, 4)), Some(d(2024, 3, 11)), d(2025, 1, 1));
        assert_eq!(delay, Some(5));
    }

    #[test]
    fn open_delay_uses_today() {
        let delay = compute_business_delay(Some(d(2024, 3, 4)), None, d(2024, 3, 18));
        assert_eq!(delay, Some(10));
    }

    #[test]
    fn invalid_delays_are_null_not_zero() {
        assert_eq!(compute_business_delay(None, Some(d(2024, 3, 4)), d(2024, 3, 4)), None);
        assert_eq!(
            compute_business_delay(Some(d(2024, 3, 11)), Some(d(2024, 3, 4)), d(2024, 3, 4)),
            None
        );
    }

    #[test]
    fn closed_records_are_never_alerted() {
        for delay in [None, Some(0), Some(25), Some(60)] {
            for mean in [None, Some(10.0), Some(99.0)] {
                let bucket = classify_delay(delay);
                assert_eq!(
                    compute_alert(State::Closed, bucket, delay, mean),
                    Some(AlertFlag::NotApplicable)
                );
            }
        }
    }

    #[test]
    fn alert_needs_mid_bucket_and_slow_family() {
        let b = Some(DelayBucket::TwentyToForty);
        assert_eq!(compute_alert(State::Open, b, Some(25), Some(30.5)), Some(AlertFlag::Alert));
        assert_eq!(compute_alert(State::Open, b, Some(25), Some(30.0)), Some(AlertFlag::Ok));
        assert_eq!(compute_alert(State::Open, b, Some(25), None), Some(AlertFlag::Ok));
        let over = classify_delay(Some(45));
        assert_eq!(compute_alert(State::Open, over, Some(45), Some(80.0)), Some(AlertFlag::Ok));
        let under = classify_delay(Some(19));
        assert_eq!(compute_alert(State::Open, under, Some(19), Some(80.0)), Some(AlertFlag::Ok));
        assert_eq!(compute_alert(State::Open, None, None, Some(80.0)), None);
    }

    #[test]
    fn restitution_is_normalized() {
        assert_eq!(normalize_restitution(Some(" oui ")), RestitutionLabel::Oui);
        assert_eq!(normalize_restitution(Some("NON")), RestitutionLabel::Non);
        assert_eq!(normalize_restitution(Some("peut-être")), RestitutionLabel::Unspecified);
        assert_eq!(normalize_restitution(None), RestitutionLabel::Unspecified);
        assert_eq!(restituted_amount(RestitutionLabel::Oui, Some(120.0)), 120.0);
        assert_eq!(restituted_amount(RestitutionLabel::Oui, None), 0.0);
        assert_eq!(restituted_amount(RestitutionLabel::Non, Some(120.0)), 0.0);
    }

    #[test]
    fn family_mean_exactly_thirty_does_not_alert() {
        let today = d(2024, 12, 31);
        let open_created = today - chrono::Duration::days(35); // 25 business days back
        let t = enrich(
            table(vec![
                record("A", Some(d(2024, 1, 1)), Some(plus_business_days(20))),
                record("A", Some(d(2024, 1, 1)), Some(plus_business_days(40))),
                record("A", Some(open_created), None),
            ]),
            today,
        );
        let open = &t.records[2];
        assert_eq!(open.delay_business_days, Some(25));
        assert_eq!(open.family_mean_closed_delay, Some(30.0));
        assert_eq!(open.alert_flag, Some(AlertFlag::Ok));
    }

    #[test]
    fn slow_family_alerts_open_record() {
        let today = d(2024, 12, 31);
        let t = enrich(
            table(vec![
                record("B", Some(d(2024, 1, 1)), Some(plus_business_days(30))),
                record("B", Some(d(2024, 1, 1)), Some(plus_business_days(50))),
                record("B", Some(today - chrono::Duration::days(35)), None),
                record("C", Some(today - chrono::Duration::days(35)), None),
            ]),
            today,
        );
        assert_eq!(t.records[0].delay_business_days, Some(30));
        assert_eq!(t.records[1].delay_business_days, Some(50));
        assert_eq!(t.records[2].family_mean_closed_delay, Some(40.0));
        assert_eq!(t.records[2].alert_flag, Some(AlertFlag::Alert));
        assert_eq!(t.records[0].alert_flag, Some(AlertFlag::NotApplicable));
        // No closed peers: no mean, no alert.
        assert_eq!(t.records[3].family_mean_closed_delay, None);
        assert_eq!(t.records[3].alert_flag, Some(AlertFlag::Ok));
    }

    #[test]
    fn records_without_creation_date_propagate_nulls() {
        let today = d(2024, 6, 3);
        let t = enrich(
            table(vec![
                record("A", None, Some(d(2024, 5, 1))),
                record("A", None, None),
                record("A", Some(d(2024, 5, 27)), Some(d(2024, 6, 3))),
            ]),
            today,
        );
        assert_eq!(t.records.len(), 3);
        assert_eq!(t.records[0].state, State::Closed);
        assert_eq!(t.records[0].delay_business_days, None);
        assert_eq!(t.records[0].delay_bucket, None);
        assert_eq!(t.records[1].alert_flag, None);
        // Only the valid closed record feeds the mean.
        assert_eq!(t.records[1].family_mean_closed_delay, Some(5.0));
    }
}
