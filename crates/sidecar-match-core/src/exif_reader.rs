use chrono::NaiveDateTime;
use exif::{Context, In, Reader, Tag};
use std::io::Cursor;

/// What an image already carries before we touch it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExistingExif {
    pub capture_time: Option<NaiveDateTime>,
    pub has_gps: bool,
}

/// Inspect the EXIF block in raw image bytes.
/// Ok(None) when the container has no EXIF at all, Err when it cannot be parsed.
pub fn inspect(bytes: &[u8]) -> Result<Option<ExistingExif>, exif::Error> {
    let exif = match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };

    // EXIF datetimes have no timezone info - they are local time as-is
    let capture_time = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime]
        .iter()
        .filter_map(|tag| exif.get_field(*tag, In::PRIMARY))
        .find_map(|field| parse_exif_datetime(&field.display_value().to_string()));

    let has_gps = exif.fields().any(|f| f.tag.context() == Context::Gps);

    Ok(Some(ExistingExif {
        capture_time,
        has_gps,
    }))
}

fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .replace('-', ":")
        .replace('/', ":")
        .replace('\\', ":")
        .replace('.', ":");

    NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S").ok()
}
