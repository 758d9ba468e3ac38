use chrono::NaiveDateTime;
use img_parts::jpeg::Jpeg;
use img_parts::{Bytes, ImageEXIF};
use little_exif::exif_tag::ExifTag;
use little_exif::filetype::FileExtension;
use little_exif::metadata::Metadata;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::exif_reader;
use crate::gps;
use crate::sidecar::GeoPoint;
use crate::timezone::{self, CaptureTime};

/// Extensions the writer can embed EXIF into (lowercase)
pub const TAGGABLE_EXTENSIONS: &[&str] = &["tif", "tiff", "jpeg", "jpg"];

// little_exif as_u8_vec(JPEG) returns: [APP1 marker 2B][length 2B][Exif\0\0 6B][TIFF data]
// img-parts set_exif() expects just the TIFF data (after Exif\0\0)
const JPEG_EXIF_OVERHEAD: usize = 10;

pub fn is_taggable_ext(ext: &str) -> bool {
    TAGGABLE_EXTENSIONS
        .iter()
        .any(|t| ext.eq_ignore_ascii_case(t))
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),
    #[error("existing metadata could not be parsed: {0}")]
    CorruptMetadata(String),
    #[error("capture timestamp {0} is out of range")]
    InvalidTimestamp(i64),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Jpeg,
    Tiff,
}

fn container_for(path: &Path) -> Result<Container, MetadataError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Ok(Container::Jpeg),
        "tif" | "tiff" => Ok(Container::Tiff),
        _ => Err(MetadataError::UnsupportedFormat(path.display().to_string())),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Convert capture time to the local zone of the GPS position
    pub resolve_timezone: bool,
    /// Also set the generic ModifyDate tag
    pub write_modify_date: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            resolve_timezone: true,
            write_modify_date: true,
        }
    }
}

/// Outcome of a successful metadata write.
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub capture_time: CaptureTime,
    pub gps_written: bool,
    /// Capture time the file carried before, if any
    pub previous_capture_time: Option<NaiveDateTime>,
}

pub struct MetadataWriter {
    config: WriterConfig,
}

impl MetadataWriter {
    pub fn new(config: WriterConfig) -> Self {
        Self { config }
    }

    /// Write capture time and, when given, GPS into the file at `path` in place.
    ///
    /// Existing tags are kept; only the timestamp tags and the GPS group are
    /// replaced. A GPS conversion problem is logged and the timestamps are
    /// still written.
    pub fn apply(
        &self,
        path: &Path,
        captured_at: i64,
        geo: Option<&GeoPoint>,
    ) -> Result<WriteReport, MetadataError> {
        let container = container_for(path)?;
        let geo = geo.filter(|g| !g.is_unset());

        let bytes = fs::read(path)?;
        let existing = exif_reader::inspect(&bytes)
            .map_err(|e| MetadataError::CorruptMetadata(e.to_string()))?;
        let mut metadata = match existing {
            Some(_) => load_existing_metadata(path)?,
            None => Metadata::new(),
        };
        let previous_capture_time = existing.and_then(|e| e.capture_time);

        let capture_time = timezone::local_capture_time(captured_at, geo, self.config.resolve_timezone)
            .ok_or(MetadataError::InvalidTimestamp(captured_at))?;
        let stamp = capture_time.exif_string();
        if let Some(prev) = previous_capture_time {
            log::debug!("{}: replacing capture time {} with {}", path.display(), prev, stamp);
        }

        metadata.set_tag(ExifTag::DateTimeOriginal(stamp.clone()));
        metadata.set_tag(ExifTag::CreateDate(stamp.clone()));
        if self.config.write_modify_date {
            metadata.set_tag(ExifTag::ModifyDate(stamp));
        }

        let gps_written = match geo.map(gps::gps_tags) {
            Some(Ok(tags)) => {
                for tag in tags {
                    metadata.set_tag(tag);
                }
                true
            }
            Some(Err(e)) => {
                log::warn!("{}: coordinates not set: {}", path.display(), e);
                false
            }
            None => false,
        };

        match container {
            Container::Jpeg => write_jpeg(path, bytes, &metadata)?,
            Container::Tiff => metadata
                .write_to_file(path)
                .map_err(|e| MetadataError::Io(io::Error::other(format!("{e:?}"))))?,
        }

        Ok(WriteReport {
            capture_time,
            gps_written,
            previous_capture_time,
        })
    }
}

/// Load existing EXIF with little_exif, turning its parse failures and panics into errors.
fn load_existing_metadata(path: &Path) -> Result<Metadata, MetadataError> {
    let path_owned = path.to_path_buf();
    // Suppress panics from little_exif
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(|_| {}));
    let result = std::panic::catch_unwind(move || Metadata::new_from_path(&path_owned));
    std::panic::set_hook(prev_hook);

    match result {
        Ok(Ok(m)) => {
            log::debug!("little_exif loaded existing EXIF from {}", path.display());
            Ok(m)
        }
        Ok(Err(e)) => Err(MetadataError::CorruptMetadata(e.to_string())),
        Err(_) => Err(MetadataError::CorruptMetadata(
            "little_exif panicked parsing EXIF".to_string(),
        )),
    }
}

/// Replace only the EXIF APP1 segment; every other segment and the scan data stay as they are.
fn write_jpeg(path: &Path, file_bytes: Vec<u8>, metadata: &Metadata) -> Result<(), MetadataError> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(file_bytes))
        .map_err(|e| MetadataError::CorruptMetadata(format!("failed to parse JPEG: {e}")))?;

    let exif_bytes = metadata.as_u8_vec(FileExtension::JPEG)?;
    if exif_bytes.len() <= JPEG_EXIF_OVERHEAD {
        return Err(MetadataError::CorruptMetadata(
            "encoded EXIF block is empty".to_string(),
        ));
    }

    let orig_exif_pos = find_exif_segment_pos(&jpeg);
    jpeg.set_exif(Some(Bytes::from(exif_bytes[JPEG_EXIF_OVERHEAD..].to_vec())));

    // set_exif() inserts at position 3; put EXIF back where it was (or right after APP0)
    if let Some(new_pos) = find_exif_segment_pos(&jpeg) {
        let target_pos = orig_exif_pos.unwrap_or(1);
        if target_pos < new_pos {
            let segments = jpeg.segments_mut();
            let seg = segments.remove(new_pos);
            segments.insert(target_pos, seg);
        }
    }

    fs::write(path, jpeg.encoder().bytes())?;
    Ok(())
}

/// EXIF segments have marker 0xE1 (APP1) and contents starting with "Exif\0\0".
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    const EXIF_PREFIX: &[u8] = b"Exif\0\0";
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == 0xE1 && s.contents().starts_with(EXIF_PREFIX))
}
