use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(AlertId);
id_newtype!(SessionId);
id_newtype!(SubmissionId);
id_newtype!(SnapshotId);

/// Districts the dashboard lists and accepts corrections for.
pub const KNOWN_DISTRICTS: [&str; 12] = [
    "Chennai",
    "Coimbatore",
    "Madurai",
    "Thanjavur",
    "Trichy",
    "Salem",
    "Erode",
    "Tirunelveli",
    "Vellore",
    "Thoothukudi",
    "Dindigul",
    "Kanyakumari",
];

/// A district name in its canonical spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct District(String);

impl District {
    /// Resolves `name` against [`KNOWN_DISTRICTS`], ignoring case and
    /// surrounding whitespace.
    pub fn known(name: &str) -> Option<Self> {
        let name = name.trim();
        KNOWN_DISTRICTS
            .iter()
            .find(|known| known.eq_ignore_ascii_case(name))
            .map(|known| Self((*known).to_string()))
    }

    /// Wraps a name without checking it against the known set. The backend
    /// uses this for its wider district table.
    pub fn unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn all_known() -> Vec<Self> {
        KNOWN_DISTRICTS
            .iter()
            .map(|name| Self((*name).to_string()))
            .collect()
    }
}

impl fmt::Display for District {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "district", rename_all = "snake_case")]
pub enum Scope {
    Global,
    District(District),
}

impl Scope {
    pub fn district(&self) -> Option<&District> {
        match self {
            Scope::Global => None,
            Scope::District(district) => Some(district),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::District(district) => write!(f, "district:{district}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub value: f64,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictQuote {
    pub district: District,
    pub quote: PriceQuote,
    pub min: f64,
    pub max: f64,
    pub trend: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "district", rename_all = "snake_case")]
pub enum AlertTarget {
    #[default]
    AllDistricts,
    District(District),
}

impl fmt::Display for AlertTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertTarget::AllDistricts => f.write_str("All Districts"),
            AlertTarget::District(district) => write!(f, "{district}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceIncrease,
    PriceDrop,
    MarketUpdate,
    ThresholdSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: AlertId,
    pub kind: AlertKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl AlertRecord {
    /// Short age label relative to `now`, as shown next to each alert.
    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        let age = now.signed_duration_since(self.created_at);
        let plural = |n: i64, unit: &str| {
            if n == 1 {
                format!("1 {unit} ago")
            } else {
                format!("{n} {unit}s ago")
            }
        };
        if age.num_days() >= 1 {
            plural(age.num_days(), "day")
        } else if age.num_hours() >= 1 {
            plural(age.num_hours(), "hour")
        } else if age.num_minutes() >= 1 {
            plural(age.num_minutes(), "minute")
        } else {
            "Just now".to_string()
        }
    }
}

/// A proposed replacement price that passed validation and is on its way to
/// review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionSubmission {
    pub scope: Scope,
    pub proposed_price: f64,
    pub location_label: String,
    pub district: District,
    pub submitted_at: DateTime<Utc>,
}
