use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

/// Value used for categorical cells that are blank or whose column is absent.
pub const UNSPECIFIED: &str = "unspecified";

/// Label of the bucket that absorbs everything past the top N of a distribution.
pub const OTHER: &str = "Other";

/// Derived columns appended to every exported row, in this order.
pub const DERIVED_COLUMNS: [&str; 7] = [
    "delay_business_days",
    "state",
    "delay_bucket",
    "family_mean_closed_delay",
    "alert_flag",
    "restitution_label",
    "restituted_amount",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum State {
    #[serde(rename = "closed")]
    Closed,
    #[serde(rename = "open")]
    Open,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DelayBucket {
    #[serde(rename = "under 10 days")]
    Under10,
    #[serde(rename = "10 to 20 days")]
    TenToTwenty,
    #[serde(rename = "20 to 40 days")]
    TwentyToForty,
    #[serde(rename = "over 40 days")]
    Over40,
}

impl DelayBucket {
    pub const ALL: [DelayBucket; 4] = [
        DelayBucket::Under10,
        DelayBucket::TenToTwenty,
        DelayBucket::TwentyToForty,
        DelayBucket::Over40,
    ];

    /// Lower edges are inclusive: 10 is "10 to 20 days", 40 is "over 40 days".
    pub fn from_delay(days: i64) -> Self {
        if days < 10 {
            DelayBucket::Under10
        } else if days < 20 {
            DelayBucket::TenToTwenty
        } else if days < 40 {
            DelayBucket::TwentyToForty
        } else {
            DelayBucket::Over40
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DelayBucket::Under10 => "under 10 days",
            DelayBucket::TenToTwenty => "10 to 20 days",
            DelayBucket::TwentyToForty => "20 to 40 days",
            DelayBucket::Over40 => "over 40 days",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AlertFlag {
    #[serde(rename = "alert")]
    Alert,
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "not_applicable")]
    NotApplicable,
}

impl AlertFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertFlag::Alert => "alert",
            AlertFlag::Ok => "ok",
            AlertFlag::NotApplicable => "not_applicable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RestitutionLabel {
    #[serde(rename = "OUI")]
    Oui,
    #[serde(rename = "NON")]
    Non,
    #[serde(rename = "unspecified")]
    Unspecified,
}

impl RestitutionLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            RestitutionLabel::Oui => "OUI",
            RestitutionLabel::Non => "NON",
            RestitutionLabel::Unspecified => UNSPECIFIED,
        }
    }
}

macro_rules! label_enum_traits {
    ($ty:ty, [$($variant:expr),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!("unknown {} value '{}'", stringify!($ty), s))
            }
        }
    };
}

label_enum_traits!(State, [State::Closed, State::Open]);
label_enum_traits!(
    DelayBucket,
    [
        DelayBucket::Under10,
        DelayBucket::TenToTwenty,
        DelayBucket::TwentyToForty,
        DelayBucket::Over40,
    ]
);
label_enum_traits!(
    AlertFlag,
    [AlertFlag::Alert, AlertFlag::Ok, AlertFlag::NotApplicable]
);
label_enum_traits!(
    RestitutionLabel,
    [
        RestitutionLabel::Oui,
        RestitutionLabel::Non,
        RestitutionLabel::Unspecified,
    ]
);

/// One complaint as read from the spreadsheet, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplaintRecord {
    /// Original cells, aligned with `ComplaintTable::headers`.
    pub cells: Vec<String>,
    pub creation_date: Option<NaiveDate>,
    pub closure_date: Option<NaiveDate>,
    pub family: String,
    pub status: String,
    pub responsible: String,
    pub channel_source: String,
    pub founded_flag: String,
    pub responsible_entity: String,
    pub restitution_flag: Option<String>,
    pub restitution_amount: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ComplaintTable {
    pub headers: Vec<String>,
    pub records: Vec<ComplaintRecord>,
    /// Whether the input carried a restitution amount column at all.
    pub has_restitution_amount: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub record: ComplaintRecord,
    pub delay_business_days: Option<i64>,
    pub state: State,
    pub delay_bucket: Option<DelayBucket>,
    pub family_mean_closed_delay: Option<f64>,
    pub alert_flag: Option<AlertFlag>,
    pub restitution_label: RestitutionLabel,
    pub restituted_amount: f64,
}

impl EnrichedRecord {
    /// Derived values as export cells, in `DERIVED_COLUMNS` order. Nulls are
    /// empty strings.
    pub fn derived_cells(&self) -> [String; 7] {
        [
            self.delay_business_days
                .map(|d| d.to_string())
                .unwrap_or_default(),
            self.state.to_string(),
            self.delay_bucket.map(|b| b.to_string()).unwrap_or_default(),
            self.family_mean_closed_delay
                .map(|m| m.to_string())
                .unwrap_or_default(),
            self.alert_flag.map(|a| a.to_string()).unwrap_or_default(),
            self.restitution_label.to_string(),
            self.restituted_amount.to_string(),
        ]
    }
}

/// Full dataset plus derived columns. Built once per load, never mutated.
#[derive(Debug, Clone)]
pub struct EnrichedTable {
    pub headers: Vec<String>,
    pub records: Vec<EnrichedRecord>,
    pub has_restitution_amount: bool,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryStats {
    pub total_complaints: usize,
    pub delayed_40_plus: usize,
    pub open_alerts: usize,
    pub avg_delay: f64,
    pub total_restituted: f64,
}

/// One entry of a value distribution.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Share {
    pub label: String,
    pub count: usize,
    pub proportion: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupMean {
    pub label: String,
    pub closed: usize,
    pub mean_delay: f64,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ShareRow {
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Count")]
    pub count: String,
    #[tabled(rename = "Share")]
    pub share: String,
    #[tabled(rename = "")]
    pub bar: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct GroupMeanRow {
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "ClosedComplaints")]
    pub closed: String,
    #[tabled(rename = "AvgDelay")]
    pub avg_delay: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct DayCountRow {
    #[tabled(rename = "Day")]
    pub day: u32,
    #[tabled(rename = "Complaints")]
    pub complaints: usize,
    #[tabled(rename = "")]
    pub bar: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct PreviewRow {
    #[tabled(rename = "Created")]
    pub created: String,
    #[tabled(rename = "Closed")]
    pub closed: String,
    #[tabled(rename = "Family")]
    pub family: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Delay")]
    pub delay: String,
    #[tabled(rename = "Bucket")]
    pub bucket: String,
    #[tabled(rename = "Alert")]
    pub alert: String,
}
