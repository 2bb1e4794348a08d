//! Report shapes served to the admin dashboard.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

/// A trailing calendar window, ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsRange {
    SevenDays,
    ThirtyDays,
    NinetyDays,
    OneYear,
}

impl AnalyticsRange {
    /// Number of calendar days in the window, today included.
    pub fn days(&self) -> i64 {
        match self {
            AnalyticsRange::SevenDays => 7,
            AnalyticsRange::ThirtyDays => 30,
            AnalyticsRange::NinetyDays => 90,
            AnalyticsRange::OneYear => 365,
        }
    }

    /// Returns the range in its URL form.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsRange::SevenDays => "7d",
            AnalyticsRange::ThirtyDays => "30d",
            AnalyticsRange::NinetyDays => "90d",
            AnalyticsRange::OneYear => "1y",
        }
    }

    /// Parses a range from its URL form (`7d`, `30d`, `90d`, `1y`).
    pub fn parse(s: &str) -> Result<Self, AnalyticsError> {
        match s {
            "7d" => Ok(AnalyticsRange::SevenDays),
            "30d" => Ok(AnalyticsRange::ThirtyDays),
            "90d" => Ok(AnalyticsRange::NinetyDays),
            "1y" => Ok(AnalyticsRange::OneYear),
            other => Err(AnalyticsError::UnknownRange(other.to_string())),
        }
    }
}

/// One day's revenue, gap-filled with zero for days without sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRevenuePoint {
    pub date: NaiveDate,
    pub revenue_cents: i64,
}

/// Units sold for one product inside the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub name: String,
    pub units_sold: u64,
}

/// Number of catalog products in one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// The full dashboard report for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub range: AnalyticsRange,
    pub generated_at: DateTime<Utc>,
    /// Revenue from paid and fulfilled orders created in the window.
    pub total_revenue_cents: i64,
    pub orders_count: u64,
    /// Percentage change in revenue against the preceding window of the
    /// same length, rounded to whole percent.
    pub revenue_change_pct: i64,
    /// Percentage change in order count against the preceding window.
    pub orders_change_pct: i64,
    /// Distinct customers with a revenue order in the window.
    pub customers_count: u64,
    pub customers_change_pct: i64,
    /// Distinct products sold in the window.
    pub products_count: u64,
    pub products_change_pct: i64,
    /// One point per calendar day in the window, oldest first.
    pub revenue_by_day: Vec<DailyRevenuePoint>,
    /// Up to ten products by units sold, descending.
    pub top_products: Vec<TopProduct>,
    /// Catalog-wide category sizes, largest first, capped at twelve.
    pub category_distribution: Vec<CategoryCount>,
}

/// Whole-percent change from `prev` to `current`. A window starting from
/// zero reads as +100%; two empty windows read as no change.
pub(crate) fn change_pct(prev: i64, current: i64) -> i64 {
    match (prev, current) {
        (0, 0) => 0,
        (0, _) => 100,
        (prev, current) => ((current - prev) * 100) / prev,
    }
}
