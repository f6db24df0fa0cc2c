//! Counter keys, rows and query types

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{CounterError, CounterResult};

/// Exact decimal with two fractional digits, held as hundredths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Amount {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CounterError::InvalidAmount(s.to_string());

        let (whole, frac) = match s.trim().split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (s.trim(), ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || frac.len() > 2 || !all_digits(frac) {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(frac))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative decimal with at most two fractional digits")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                self.visit_str(&v.to_string())
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// The three counter families, distinguished by their dimension keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterFamily {
    /// Goal conversions, keyed by goal.
    Conversions,
    /// Variant impressions, keyed by variant. Count only.
    Impressions,
    /// Conversions attributed to a variant, keyed by variant and goal.
    VariantConversions,
}

pub const FAMILIES: [CounterFamily; 3] = [
    CounterFamily::Conversions,
    CounterFamily::Impressions,
    CounterFamily::VariantConversions,
];

impl CounterFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            CounterFamily::Conversions => "conversions",
            CounterFamily::Impressions => "impressions",
            CounterFamily::VariantConversions => "variant_conversions",
        }
    }

    /// Whether rows of this family carry a `value` accumulator.
    pub const fn has_value(self) -> bool {
        !matches!(self, CounterFamily::Impressions)
    }

    /// Dimension columns, in primary key order.
    pub const fn key_columns(self) -> &'static [&'static str] {
        match self {
            CounterFamily::Conversions => &["goal_id"],
            CounterFamily::Impressions => &["variant_id"],
            CounterFamily::VariantConversions => &["variant_id", "goal_id"],
        }
    }
}

impl fmt::Display for CounterFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterFamily {
    type Err = CounterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "conversions" | "conversion" => Ok(CounterFamily::Conversions),
            "impressions" | "impression" => Ok(CounterFamily::Impressions),
            "variant_conversions" | "variant_conversion" => Ok(CounterFamily::VariantConversions),
            other => Err(CounterError::InvalidQuery(format!(
                "unknown counter family {other:?}"
            ))),
        }
    }
}

/// Dimension keys of one counter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimensions {
    Goal(i64),
    Variant(i64),
    VariantGoal { variant_id: i64, goal_id: i64 },
}

impl Dimensions {
    pub const fn family(self) -> CounterFamily {
        match self {
            Dimensions::Goal(_) => CounterFamily::Conversions,
            Dimensions::Variant(_) => CounterFamily::Impressions,
            Dimensions::VariantGoal { .. } => CounterFamily::VariantConversions,
        }
    }

    /// Key values in the same order as [`CounterFamily::key_columns`].
    pub fn values(self) -> Vec<i64> {
        match self {
            Dimensions::Goal(goal_id) => vec![goal_id],
            Dimensions::Variant(variant_id) => vec![variant_id],
            Dimensions::VariantGoal {
                variant_id,
                goal_id,
            } => vec![variant_id, goal_id],
        }
    }

    pub const fn goal_id(self) -> Option<i64> {
        match self {
            Dimensions::Goal(goal_id) | Dimensions::VariantGoal { goal_id, .. } => Some(goal_id),
            Dimensions::Variant(_) => None,
        }
    }

    pub const fn variant_id(self) -> Option<i64> {
        match self {
            Dimensions::Variant(variant_id) | Dimensions::VariantGoal { variant_id, .. } => {
                Some(variant_id)
            }
            Dimensions::Goal(_) => None,
        }
    }

    /// Build the dimensions from optional ids; at least one must be present.
    pub fn from_ids(goal_id: Option<i64>, variant_id: Option<i64>) -> CounterResult<Self> {
        match (goal_id, variant_id) {
            (Some(goal_id), Some(variant_id)) => Ok(Dimensions::VariantGoal {
                variant_id,
                goal_id,
            }),
            (Some(goal_id), None) => Ok(Dimensions::Goal(goal_id)),
            (None, Some(variant_id)) => Ok(Dimensions::Variant(variant_id)),
            (None, None) => Err(CounterError::InvalidQuery(
                "must specify goal_id or variant_id".to_string(),
            )),
        }
    }
}

/// Composite key of one counter row within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub dimensions: Dimensions,
    pub bucket_start: i64,
}

impl CounterKey {
    pub const fn new(dimensions: Dimensions, bucket_start: i64) -> Self {
        Self {
            dimensions,
            bucket_start,
        }
    }
}

/// Persisted state of one counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterRow {
    pub count: i64,
    pub value: Option<Amount>,
}

impl CounterRow {
    /// Apply one increment. A supplied value adds to the existing one,
    /// treating NULL as zero; no value leaves the accumulator untouched.
    ///
    /// Returns `None` and leaves the row unchanged if either column would
    /// overflow.
    pub fn apply(&mut self, delta_count: i64, delta_value: Option<Amount>) -> Option<()> {
        let count = self.count.checked_add(delta_count)?;
        let value = match delta_value {
            Some(delta) => {
                let current = self.value.unwrap_or(Amount::ZERO);
                Some(Amount::from_cents(current.cents().checked_add(delta.cents())?))
            }
            None => self.value,
        };

        self.count = count;
        self.value = value;
        Some(())
    }
}

/// Column a query sums over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterColumn {
    Count,
    Value,
}

impl CounterColumn {
    pub const fn column_name(self) -> &'static str {
        match self {
            CounterColumn::Count => "count",
            CounterColumn::Value => "value",
        }
    }
}

/// Dimension filters of an aggregation query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DimensionFilter {
    pub goal_id: Option<i64>,
    pub variant_id: Option<i64>,
}

impl DimensionFilter {
    pub const fn goal(goal_id: i64) -> Self {
        Self {
            goal_id: Some(goal_id),
            variant_id: None,
        }
    }

    pub const fn variant(variant_id: i64) -> Self {
        Self {
            goal_id: None,
            variant_id: Some(variant_id),
        }
    }

    pub const fn variant_goal(variant_id: i64, goal_id: i64) -> Self {
        Self {
            goal_id: Some(goal_id),
            variant_id: Some(variant_id),
        }
    }

    /// Family holding the rows this filter selects.
    pub fn family(&self) -> CounterResult<CounterFamily> {
        Dimensions::from_ids(self.goal_id, self.variant_id).map(Dimensions::family)
    }

    /// Filter columns paired with their values.
    pub fn conditions(&self) -> Vec<(&'static str, i64)> {
        let mut conditions = Vec::with_capacity(2);
        if let Some(variant_id) = self.variant_id {
            conditions.push(("variant_id", variant_id));
        }
        if let Some(goal_id) = self.goal_id {
            conditions.push(("goal_id", goal_id));
        }
        conditions
    }

    pub fn matches(&self, dimensions: Dimensions) -> bool {
        self.goal_id.is_none_or(|id| dimensions.goal_id() == Some(id))
            && self
                .variant_id
                .is_none_or(|id| dimensions.variant_id() == Some(id))
    }
}

/// Optional time bounds of an aggregation query (Unix seconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TimeWindow {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeWindow {
    pub const fn all_time() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub const fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// One visitor event as produced by ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackedEvent {
    Conversion {
        goal_id: i64,
        timestamp: i64,
        value: Option<Amount>,
    },
    Impression {
        variant_id: i64,
        timestamp: i64,
    },
    VariantConversion {
        variant_id: i64,
        goal_id: i64,
        timestamp: i64,
        value: Option<Amount>,
    },
}
