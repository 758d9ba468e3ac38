use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A location from a sidecar's `geoData` block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
}

impl GeoPoint {
    /// Google writes 0.0/0.0 when a photo has no location.
    pub fn is_unset(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// The parts of a Google Photos sidecar this tool uses.
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarRecord {
    /// Nominal media title, unsanitized
    pub title: String,
    /// photoTakenTime, unix seconds (UTC)
    pub captured_at: i64,
    pub geo: Option<GeoPoint>,
}

#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing or empty title")]
    MissingTitle,
    #[error("missing or invalid photoTakenTime.timestamp")]
    MissingTimestamp,
}

impl SidecarRecord {
    /// Parse a sidecar. `photoTakenTime.timestamp` may be a string or a number.
    pub fn from_slice(json_bytes: &[u8]) -> Result<Self, SidecarError> {
        let data: Value = serde_json::from_slice(json_bytes)?;

        let title = data
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or(SidecarError::MissingTitle)?
            .to_string();

        let ts = data
            .get("photoTakenTime")
            .and_then(|t| t.get("timestamp"))
            .ok_or(SidecarError::MissingTimestamp)?;
        let captured_at = match ts {
            Value::String(s) => s.trim().parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
        .ok_or(SidecarError::MissingTimestamp)?;

        let geo = data
            .get("geoData")
            .and_then(|g| match serde_json::from_value::<GeoPoint>(g.clone()) {
                Ok(point) => Some(point),
                Err(e) => {
                    log::warn!("{}: ignoring geoData: {}", title, e);
                    None
                }
            })
            .filter(|g| !g.is_unset());

        Ok(Self {
            title,
            captured_at,
            geo,
        })
    }
}
