use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GatewayError, Result};

/// Length of every Tractive tracker id.
pub const TRACKER_ID_LEN: usize = 8;

/// Identifier of a physical tracker, e.g. `"ABCDEFGH"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TrackerId(String);

impl TrackerId {
    /// Validate a single tracker id.
    ///
    /// Ids are exactly 8 ASCII alphanumeric characters. They end up in the
    /// upstream URL path, so anything else is rejected here.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let valid = raw.len() == TRACKER_ID_LEN && raw.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(GatewayError::InvalidTrackerId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Parse a comma-separated list such as `"AAAAAAAA,BBBBBBBB"`.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>> {
        raw.split(',').map(Self::parse).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TrackerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which upstream report a lookup targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Location,
    Hardware,
}

impl ReportKind {
    /// Upstream path segment preceding the tracker id
    pub fn path(&self) -> &'static str {
        match self {
            Self::Location => "device_pos_report",
            Self::Hardware => "device_hw_report",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location => write!(f, "location"),
            Self::Hardware => write!(f, "hardware report"),
        }
    }
}

/// A report type the gateway can fetch and cache.
pub trait Report: DeserializeOwned + Serialize + Clone + Send + Sync + 'static {
    const KIND: ReportKind;
}

/// Position fix returned by `device_pos_report/{id}`
///
/// Every field is optional and anything not modeled here (including the
/// untyped `pos_status`, `nearby_user_id` and `power_saving_zone_id`) is kept
/// in `extra`, so a report serializes back to the keys upstream sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_rcvd: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_used: Option<String>,
    /// `[latitude, longitude]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latlong: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_uncertainty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Report for LocationReport {
    const KIND: ReportKind = ReportKind::Location;
}

/// Device health snapshot returned by `device_hw_report/{id}`
///
/// `clip_mounted_state`, `power_saving_zone_id`, `hw_status` and any other
/// unmodeled key live in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Report for HardwareReport {
    const KIND: ReportKind = ReportKind::Hardware;
}

/// Whether a report came straight from upstream or from the fallback cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
}

/// A report together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lookup<R> {
    pub report: R,
    pub freshness: Freshness,
}

impl<R> Lookup<R> {
    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }

    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> Lookup<U> {
        Lookup {
            report: f(self.report),
            freshness: self.freshness,
        }
    }
}
