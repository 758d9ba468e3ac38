use chrono::{DateTime, NaiveDateTime};
use chrono_tz::Tz;
use std::str::FromStr;
use std::sync::LazyLock;
use tzf_rs::DefaultFinder;

use crate::sidecar::GeoPoint;

static FINDER: LazyLock<DefaultFinder> = LazyLock::new(DefaultFinder::new);

pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Wall-clock capture time and the zone it was computed in (None = UTC).
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureTime {
    pub local: NaiveDateTime,
    pub zone: Option<Tz>,
}

impl CaptureTime {
    pub fn exif_string(&self) -> String {
        self.local.format(EXIF_DATETIME_FORMAT).to_string()
    }
}

/// IANA zone containing `point`, if tzf knows one.
pub fn zone_for(point: &GeoPoint) -> Option<Tz> {
    let name = FINDER.get_tz_name(point.longitude, point.latitude);
    Tz::from_str(name).ok()
}

/// Convert a UTC unix timestamp to local time at `geo`.
///
/// Falls back to UTC when there is no location, lookup is disabled, or the
/// location has no known zone. Returns None only for out-of-range timestamps.
pub fn local_capture_time(
    captured_at: i64,
    geo: Option<&GeoPoint>,
    resolve: bool,
) -> Option<CaptureTime> {
    let utc = DateTime::from_timestamp(captured_at, 0)?;

    if let (Some(point), true) = (geo, resolve) {
        match zone_for(point) {
            Some(tz) => {
                return Some(CaptureTime {
                    local: utc.with_timezone(&tz).naive_local(),
                    zone: Some(tz),
                });
            }
            None => log::warn!(
                "No timezone for ({}, {}), writing UTC time",
                point.latitude,
                point.longitude
            ),
        }
    }

    Some(CaptureTime {
        local: utc.naive_utc(),
        zone: None,
    })
}
