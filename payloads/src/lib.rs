pub mod api_client;
pub mod requests;
pub mod responses;

pub use api_client::{APIClient, ClientError};

use derive_more::Display;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Uniform wrapper returned by every dashboard data source.
///
/// `success` gates which of `data` and `error` is meaningful. A failed
/// envelope is an expected, reportable outcome ("quota exceeded"); faults
/// that prevent an envelope from being produced at all are returned as
/// errors by the producer instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Timestamp::now(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            timestamp: Timestamp::now(),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct NotificationId(pub i64);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Time window for chart data.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[display("day")]
    Day,
    #[display("week")]
    Week,
    #[default]
    #[display("month")]
    Month,
    #[display("quarter")]
    Quarter,
    #[display("year")]
    Year,
    #[display("all")]
    All,
}

impl Period {
    pub fn label(&self) -> &'static str {
        match self {
            Period::Day => "Today",
            Period::Week => "This Week",
            Period::Month => "This Month",
            Period::Quarter => "This Quarter",
            Period::Year => "This Year",
            Period::All => "All Time",
        }
    }
}
