//! Decimal coordinates to the EXIF GPS tag group.
//!
//! EXIF stores latitude, longitude and altitude as unsigned rationals, so
//! every value goes through [`Rational::from_decimal`], which builds the
//! fraction from the shortest decimal string of the float rather than from
//! its binary expansion.

use little_exif::exif_tag::ExifTag;
use little_exif::rational::uR64;
use thiserror::Error;

use crate::sidecar::GeoPoint;

pub const LATITUDE_REFS: [&str; 2] = ["S", "N"];
pub const LONGITUDE_REFS: [&str; 2] = ["W", "E"];

const SECONDS_PLACES: u32 = 5;
const ALTITUDE_PLACES: u32 = 2;

#[derive(Debug, Error, PartialEq)]
pub enum GpsError {
    #[error("coordinate is not a finite number: {0}")]
    NonFinite(f64),
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

/// Degrees, minutes, seconds and hemisphere letter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dms {
    pub degrees: i64,
    pub minutes: i64,
    pub seconds: f64,
    /// Empty for exactly zero
    pub hemisphere: &'static str,
}

/// Split a signed decimal coordinate into DMS. `refs` is `[negative, positive]`.
pub fn to_dms(value: f64, refs: [&'static str; 2]) -> Result<Dms, GpsError> {
    if !value.is_finite() {
        return Err(GpsError::NonFinite(value));
    }
    let hemisphere = if value < 0.0 {
        refs[0]
    } else if value > 0.0 {
        refs[1]
    } else {
        ""
    };
    let abs = value.abs();
    let degrees = abs.trunc();
    let t1 = (abs - degrees) * 60.0;
    let minutes = t1.trunc();
    let seconds = round_to((t1 - minutes) * 60.0, SECONDS_PLACES);
    Ok(Dms {
        degrees: degrees as i64,
        minutes: minutes as i64,
        seconds,
        hemisphere,
    })
}

pub fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

/// An exact, reduced fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numerator: i64,
    pub denominator: i64,
}

impl Rational {
    /// Exact fraction for the decimal text of `value` (`7.68` → 192/25).
    pub fn from_decimal(value: f64) -> Result<Self, GpsError> {
        if !value.is_finite() {
            return Err(GpsError::NonFinite(value));
        }
        let text = value.to_string();
        let out_of_range = || GpsError::OutOfRange(text.clone());

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.as_str()),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        let denominator = 10i64
            .checked_pow(frac_part.len() as u32)
            .ok_or_else(out_of_range)?;
        let whole: i64 = int_part.parse().map_err(|_| out_of_range())?;
        let frac: i64 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse().map_err(|_| out_of_range())?
        };
        let mut numerator = whole
            .checked_mul(denominator)
            .and_then(|n| n.checked_add(frac))
            .ok_or_else(out_of_range)?;
        if negative {
            numerator = -numerator;
        }

        let g = gcd(numerator.unsigned_abs(), denominator as u64) as i64;
        Ok(Self {
            numerator: numerator / g,
            denominator: denominator / g,
        })
    }

    /// EXIF RATIONAL (two u32). Negative or oversized values are rejected.
    pub fn to_unsigned(self) -> Result<uR64, GpsError> {
        let out_of_range = || GpsError::OutOfRange(format!("{}/{}", self.numerator, self.denominator));
        Ok(uR64 {
            nominator: u32::try_from(self.numerator).map_err(|_| out_of_range())?,
            denominator: u32::try_from(self.denominator).map_err(|_| out_of_range())?,
        })
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

fn dms_rationals(dms: &Dms) -> Result<Vec<uR64>, GpsError> {
    [dms.degrees as f64, dms.minutes as f64, dms.seconds]
        .into_iter()
        .map(|v| Rational::from_decimal(v)?.to_unsigned())
        .collect()
}

/// Build the full GPS tag group for a point.
pub fn gps_tags(point: &GeoPoint) -> Result<Vec<ExifTag>, GpsError> {
    if point.latitude.abs() > 90.0 {
        return Err(GpsError::OutOfRange(format!("latitude {}", point.latitude)));
    }
    if point.longitude.abs() > 180.0 {
        return Err(GpsError::OutOfRange(format!("longitude {}", point.longitude)));
    }
    let lat = to_dms(point.latitude, LATITUDE_REFS)?;
    let lng = to_dms(point.longitude, LONGITUDE_REFS)?;

    let mut tags = vec![
        ExifTag::GPSVersionID(vec![2, 0, 0, 0]),
        ExifTag::GPSLatitudeRef(lat.hemisphere.to_string()),
        ExifTag::GPSLatitude(dms_rationals(&lat)?),
        ExifTag::GPSLongitudeRef(lng.hemisphere.to_string()),
        ExifTag::GPSLongitude(dms_rationals(&lng)?),
    ];
    // An unusable altitude drops only the altitude pair
    match altitude_rational(point.altitude) {
        Ok(altitude) => {
            tags.push(ExifTag::GPSAltitudeRef(vec![1]));
            tags.push(ExifTag::GPSAltitude(vec![altitude]));
        }
        Err(e) => log::warn!("altitude {} not set: {}", point.altitude, e),
    }
    Ok(tags)
}

/// Magnitude of the altitude, written next to a fixed reference byte of 1.
fn altitude_rational(altitude: f64) -> Result<uR64, GpsError> {
    Rational::from_decimal(round_to(altitude.abs(), ALTITUDE_PLACES))?.to_unsigned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_dms_sydney() {
        let dms = to_dms(-33.8688, LATITUDE_REFS).unwrap();
        assert_eq!(dms.degrees, 33);
        assert_eq!(dms.minutes, 52);
        assert!((dms.seconds - 7.68).abs() < 1e-9, "seconds {}", dms.seconds);
        assert_eq!(dms.hemisphere, "S");
    }

    #[test]
    fn test_to_dms_hemispheres() {
        assert_eq!(to_dms(151.2093, LONGITUDE_REFS).unwrap().hemisphere, "E");
        assert_eq!(to_dms(-0.1278, LONGITUDE_REFS).unwrap().hemisphere, "W");
        assert_eq!(to_dms(51.5, LATITUDE_REFS).unwrap().hemisphere, "N");
        let zero = to_dms(0.0, LATITUDE_REFS).unwrap();
        assert_eq!(zero.hemisphere, "");
        assert_eq!((zero.degrees, zero.minutes, zero.seconds), (0, 0, 0.0));
    }

    #[test]
    fn test_to_dms_rejects_nan() {
        assert!(matches!(
            to_dms(f64::NAN, LATITUDE_REFS),
            Err(GpsError::NonFinite(_))
        ));
    }

    #[test]
    fn test_rational_exact() {
        let r = Rational::from_decimal(7.68).unwrap();
        assert_eq!((r.numerator, r.denominator), (192, 25));
        let r = Rational::from_decimal(0.5).unwrap();
        assert_eq!((r.numerator, r.denominator), (1, 2));
        let r = Rational::from_decimal(33.0).unwrap();
        assert_eq!((r.numerator, r.denominator), (33, 1));
        let r = Rational::from_decimal(-12.25).unwrap();
        assert_eq!((r.numerator, r.denominator), (-49, 4));
        let r = Rational::from_decimal(0.0).unwrap();
        assert_eq!((r.numerator, r.denominator), (0, 1));
    }

    #[test]
    fn test_rational_round_trips_five_places() {
        for x in [12.34567, 0.00001, 59.99999, 7.68, 123.45, 1.1, 0.3] {
            let r = Rational::from_decimal(x).unwrap();
            assert_eq!(r.numerator as f64 / r.denominator as f64, x, "{x}");
        }
    }

    #[test]
    fn test_rational_errors() {
        assert!(Rational::from_decimal(f64::INFINITY).is_err());
        assert!(Rational::from_decimal(1e300).is_err());
        assert!(Rational::from_decimal(-1.5).unwrap().to_unsigned().is_err());
    }

    #[test]
    fn test_gps_tags() {
        let point = GeoPoint {
            latitude: -33.8688,
            longitude: 151.2093,
            altitude: 12.345,
        };
        let tags = gps_tags(&point).unwrap();
        assert_eq!(tags.len(), 7);
        assert!(tags
            .iter()
            .any(|t| matches!(t, ExifTag::GPSLatitudeRef(r) if r == "S")));
        assert!(tags
            .iter()
            .any(|t| matches!(t, ExifTag::GPSLongitudeRef(r) if r == "E")));
        assert!(tags
            .iter()
            .any(|t| matches!(t, ExifTag::GPSVersionID(v) if v == &[2, 0, 0, 0])));
        let seconds = tags.iter().find_map(|t| match t {
            ExifTag::GPSLatitude(v) => v.get(2).map(|r| (r.nominator, r.denominator)),
            _ => None,
        });
        assert_eq!(seconds, Some((192, 25)));
    }

    #[test]
    fn test_gps_tags_rejects_bad_values() {
        let bad = GeoPoint {
            latitude: 95.0,
            longitude: 10.0,
            altitude: 0.0,
        };
        assert!(gps_tags(&bad).is_err());
    }

    #[test]
    fn test_gps_tags_below_sea_level() {
        let dead_sea = GeoPoint {
            latitude: 31.5,
            longitude: 35.5,
            altitude: -430.5,
        };
        let tags = gps_tags(&dead_sea).unwrap();
        assert_eq!(tags.len(), 7);
        let altitude = tags.iter().find_map(|t| match t {
            ExifTag::GPSAltitude(v) => v.first().map(|r| (r.nominator, r.denominator)),
            _ => None,
        });
        assert_eq!(altitude, Some((861, 2)));
    }

    #[test]
    fn test_gps_tags_unusable_altitude_keeps_position() {
        let point = GeoPoint {
            latitude: 31.5,
            longitude: 35.5,
            altitude: f64::NAN,
        };
        let tags = gps_tags(&point).unwrap();
        assert_eq!(tags.len(), 5);
        assert!(tags.iter().any(|t| matches!(t, ExifTag::GPSLatitude(_))));
        assert!(!tags.iter().any(|t| matches!(t, ExifTag::GPSAltitude(_))));
    }
}
