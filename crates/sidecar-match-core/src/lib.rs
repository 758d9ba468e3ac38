pub mod exif_reader;
pub mod exif_writer;
pub mod gps;
pub mod matcher;
pub mod sidecar;
pub mod timezone;
pub mod title;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use exif_writer::{MetadataError, MetadataWriter, WriteReport, WriterConfig};
pub use matcher::{Matcher, MatcherConfig, MovedTitles, ResolvedMedia, Strategy};
pub use sidecar::{GeoPoint, SidecarRecord};
pub use title::{sanitize, Title};

fn default_matched_dir() -> String {
    "Matched".to_string()
}

fn default_originals_dir() -> String {
    "Originals".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_duplicate_probe() -> u32 {
    matcher::DEFAULT_MAX_DUPLICATE_PROBE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Directory holding media files and their sidecars side by side
    pub input: PathBuf,
    /// Suffix of edited copies; None or empty uses "-editado"
    #[serde(default)]
    pub edited_suffix: Option<String>,
    #[serde(default = "default_matched_dir")]
    pub matched_dir_name: String,
    #[serde(default = "default_originals_dir")]
    pub originals_dir_name: String,
    #[serde(default = "default_true")]
    pub resolve_timezone: bool,
    #[serde(default = "default_true")]
    pub write_modify_date: bool,
    /// Set each matched file's mtime to its capture time
    #[serde(default = "default_true")]
    pub set_file_times: bool,
    #[serde(default = "default_max_duplicate_probe")]
    pub max_duplicate_probe: u32,
}

impl ProcessOptions {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            edited_suffix: None,
            matched_dir_name: default_matched_dir(),
            originals_dir_name: default_originals_dir(),
            resolve_timezone: true,
            write_modify_date: true,
            set_file_times: true,
            max_duplicate_probe: default_max_duplicate_probe(),
        }
    }

    pub fn matched_dir(&self) -> PathBuf {
        self.input.join(&self.matched_dir_name)
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.input.join(&self.originals_dir_name)
    }
}

/// Why a single sidecar could not be processed.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed sidecar: {0}")]
    MalformedInput(String),
    #[error("no media file found for {0:?}")]
    NotFound(String),
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("filesystem error: {0}")]
    Filesystem(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    MalformedInput,
    NotFound,
    Metadata,
    Filesystem,
}

impl RecordError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MalformedInput(_) => FailureKind::MalformedInput,
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Metadata(_) => FailureKind::Metadata,
            Self::Filesystem(_) => FailureKind::Filesystem,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordFailure {
    pub sidecar: String,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub total_sidecars: u64,
    pub successes: u64,
    pub errors: u64,
    #[serde(default)]
    pub failures: Vec<RecordFailure>,
}

/// One-way notification sink for batch progress.
pub trait ProgressSink {
    /// Completion percentage, 0-100 with two decimals
    fn on_progress(&self, percent: f64);
    fn on_complete(&self, successes: u64, errors: u64);
}

impl ProgressSink for () {
    fn on_progress(&self, _percent: f64) {}
    fn on_complete(&self, _successes: u64, _errors: u64) {}
}

struct Batch<'a> {
    input: &'a Path,
    matched_dir: PathBuf,
    matcher: Matcher,
    writer: MetadataWriter,
    set_file_times: bool,
}

/// Match every sidecar in `options.input` to its media file, fix its EXIF and move it to the matched dir.
///
/// Fails only if the input directory cannot be listed, the output
/// directories cannot be created, or the input directory disappears
/// mid-run. Everything else is counted per record.
pub fn process(options: &ProcessOptions, progress: &dyn ProgressSink) -> anyhow::Result<ProcessResult> {
    let input = options.input.as_path();
    let mut entries = fs::read_dir(input)
        .with_context(|| format!("Choose a valid directory: {}", input.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to list {}", input.display()))?;

    let matched_dir = options.matched_dir();
    let originals_dir = options.originals_dir();
    fs::create_dir_all(&matched_dir)
        .with_context(|| format!("Failed to create {}", matched_dir.display()))?;
    fs::create_dir_all(&originals_dir)
        .with_context(|| format!("Failed to create {}", originals_dir.display()))?;

    // Shorter names first: base names resolve before their numbered variants
    entries.sort_by_cached_key(|e| {
        let name = e.file_name().to_string_lossy().into_owned();
        (name.chars().count(), name)
    });

    let batch = Batch {
        input,
        matched_dir,
        matcher: Matcher::new(
            MatcherConfig::new(originals_dir)
                .with_edited_suffix(options.edited_suffix.as_deref().unwrap_or(""))
                .with_max_duplicate_probe(options.max_duplicate_probe),
        ),
        writer: MetadataWriter::new(WriterConfig {
            resolve_timezone: options.resolve_timezone,
            write_modify_date: options.write_modify_date,
        }),
        set_file_times: options.set_file_times,
    };

    let total = entries.len();
    let mut moved = MovedTitles::new();
    let mut result = ProcessResult::default();

    for (index, entry) in entries.iter().enumerate() {
        let sidecar_path = entry.path();
        let sidecar_name = entry.file_name().to_string_lossy().into_owned();
        if !sidecar_name.ends_with(".json") || !sidecar_path.is_file() {
            continue;
        }
        result.total_sidecars += 1;

        match batch.process_record(&sidecar_path, &sidecar_name, &mut moved) {
            Ok(media) => {
                log::info!("{} -> {}", sidecar_name, media.title);
                result.successes += 1;
            }
            Err(e) => {
                if !input.is_dir() {
                    anyhow::bail!("Input directory {} disappeared", input.display());
                }
                log::warn!("{}: {}", sidecar_name, e);
                result.errors += 1;
                result.failures.push(RecordFailure {
                    sidecar: sidecar_name,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }

        progress.on_progress(gps::round_to((index + 1) as f64 / total as f64 * 100.0, 2));
    }

    log::debug!("{} files moved to {}", moved.len(), batch.matched_dir.display());
    progress.on_progress(100.0);
    progress.on_complete(result.successes, result.errors);
    Ok(result)
}

impl Batch<'_> {
    fn process_record(
        &self,
        sidecar_path: &Path,
        sidecar_name: &str,
        moved: &mut MovedTitles,
    ) -> Result<ResolvedMedia, RecordError> {
        let bytes = fs::read(sidecar_path)?;
        let record = SidecarRecord::from_slice(&bytes)
            .map_err(|e| RecordError::MalformedInput(e.to_string()))?;
        let title = Title::parse(&record.title).ok_or_else(|| {
            RecordError::MalformedInput(format!("title {:?} has no extension", record.title))
        })?;

        let media = self
            .matcher
            .resolve(self.input, &title, moved, Some(sidecar_name))?
            .ok_or_else(|| RecordError::NotFound(record.title.clone()))?;

        let taggable = Path::new(&media.title)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(exif_writer::is_taggable_ext);
        if taggable {
            let report = self
                .writer
                .apply(&media.path, record.captured_at, record.geo.as_ref())?;
            log::debug!(
                "{}: capture time {} ({}), gps: {}",
                media.title,
                report.capture_time.exif_string(),
                report
                    .capture_time
                    .zone
                    .map_or("UTC".to_string(), |tz| tz.name().to_string()),
                report.gps_written
            );
        }

        let dest = self.matched_dir.join(&media.title);
        fs::rename(&media.path, &dest)?;
        moved.insert(media.title.clone());
        fs::remove_file(sidecar_path)?;

        if self.set_file_times {
            let ft = filetime::FileTime::from_unix_time(record.captured_at, 0);
            if let Err(e) = filetime::set_file_mtime(&dest, ft) {
                log::warn!("{}: could not set file time: {}", media.title, e);
            }
        }

        Ok(ResolvedMedia { path: dest, ..media })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::fs::File;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingSink {
        percents: RefCell<Vec<f64>>,
        completed: Cell<Option<(u64, u64)>>,
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, percent: f64) {
            self.percents.borrow_mut().push(percent);
        }

        fn on_complete(&self, successes: u64, errors: u64) {
            self.completed.set(Some((successes, errors)));
        }
    }

    fn sidecar(dir: &Path, name: &str, title: &str) {
        let json = format!(
            r#"{{ "title": "{title}", "photoTakenTime": {{ "timestamp": "1562321720" }},
                  "geoData": {{ "latitude": 0.0, "longitude": 0.0, "altitude": 0.0 }} }}"#
        );
        fs::write(dir.join(name), json).unwrap();
    }

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    fn count_json(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
            .count()
    }

    #[test]
    fn test_batch_counts_and_cleanup() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        touch(root, "a.png");
        sidecar(root, "a.png.json", "a.png");
        touch(root, "bb.mp4");
        sidecar(root, "bb.mp4.json", "bb.mp4");
        touch(root, "IMG.png");
        touch(root, "IMG(1).png");
        sidecar(root, "IMG.png.json", "IMG.png");
        sidecar(root, "IMG.png(1).json", "IMG.png");
        touch(root, "Edited.png");
        touch(root, "Edited-editado.png");
        sidecar(root, "Edited.png.json", "Edited.png");
        // failures
        sidecar(root, "missing.png.json", "missing.png");
        fs::write(root.join("broken.json"), "{ nope").unwrap();

        let sink = RecordingSink::default();
        let result = process(&ProcessOptions::new(root), &sink).unwrap();

        assert_eq!(result.total_sidecars, 7);
        assert_eq!(result.successes, 5);
        assert_eq!(result.errors, 2);
        assert_eq!(sink.completed.get(), Some((5, 2)));
        assert_eq!(sink.percents.borrow().last().copied(), Some(100.0));

        let kinds: Vec<_> = result.failures.iter().map(|f| f.kind).collect();
        assert!(kinds.contains(&FailureKind::NotFound));
        assert!(kinds.contains(&FailureKind::MalformedInput));

        // only the failed sidecars are left behind
        assert_eq!(count_json(root), 2);
        assert!(root.join("missing.png.json").exists());
        assert!(root.join("broken.json").exists());

        let matched = root.join("Matched");
        for name in ["a.png", "bb.mp4", "IMG.png", "IMG(1).png", "Edited-editado.png"] {
            assert!(matched.join(name).exists(), "{name} not matched");
        }
        assert!(root.join("Originals").join("Edited.png").exists());
        assert!(!root.join("Edited.png").exists());
    }

    #[test]
    fn test_output_dirs_may_already_exist() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("Matched")).unwrap();
        fs::create_dir(dir.path().join("Originals")).unwrap();
        let result = process(&ProcessOptions::new(dir.path()), &()).unwrap();
        assert_eq!(result.total_sidecars, 0);
    }

    #[test]
    fn test_invalid_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let options = ProcessOptions::new(dir.path().join("nope"));
        assert!(process(&options, &()).is_err());
    }

    #[test]
    fn test_jpeg_gets_exif_and_file_time() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]))
            .save(root.join("photo.jpg"))
            .unwrap();
        fs::write(
            root.join("photo.jpg.json"),
            r#"{ "title": "photo.jpg", "photoTakenTime": { "timestamp": "1562321720" },
                 "geoData": { "latitude": -33.8688, "longitude": 151.2093, "altitude": 58.0 } }"#,
        )
        .unwrap();

        let result = process(&ProcessOptions::new(root), &()).unwrap();
        assert_eq!(result.successes, 1);

        let dest = root.join("Matched").join("photo.jpg");
        let back = exif_reader::inspect(&fs::read(&dest).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(
            back.capture_time.map(|t| t.to_string()),
            Some("2019-07-05 20:15:20".to_string())
        );
        assert!(back.has_gps);

        let mtime = fs::metadata(&dest).unwrap().modified().unwrap();
        assert_eq!(mtime, UNIX_EPOCH + Duration::from_secs(1562321720));
    }

    #[test]
    fn test_unwritable_metadata_leaves_record_in_place() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("bad.jpg"), b"not a jpeg at all").unwrap();
        sidecar(root, "bad.jpg.json", "bad.jpg");

        let result = process(&ProcessOptions::new(root), &()).unwrap();
        assert_eq!(result.successes, 0);
        assert_eq!(result.errors, 1);
        assert_eq!(result.failures[0].kind, FailureKind::Metadata);
        assert!(root.join("bad.jpg").exists());
        assert!(root.join("bad.jpg.json").exists());
        assert!(!root.join("Matched").join("bad.jpg").exists());
    }

    #[test]
    fn test_title_cannot_reach_outside_input() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("work");
        fs::create_dir(&work).unwrap();
        touch(dir.path(), "secret.png");
        sidecar(&work, "x.png.json", "../secret.png");

        let result = process(&ProcessOptions::new(&work), &()).unwrap();
        assert_eq!(result.successes, 0);
        assert_eq!(result.failures[0].kind, FailureKind::MalformedInput);
        assert!(dir.path().join("secret.png").exists());
        assert!(!work.join("Matched").join("secret.png").exists());
        assert!(work.join("x.png.json").exists());
    }

    #[test]
    fn test_options_from_json_defaults() {
        let options: ProcessOptions = serde_json::from_str(r#"{ "input": "/photos" }"#).unwrap();
        assert_eq!(options.matched_dir(), PathBuf::from("/photos/Matched"));
        assert_eq!(options.originals_dir(), PathBuf::from("/photos/Originals"));
        assert!(options.resolve_timezone);
        assert_eq!(options.max_duplicate_probe, 10_000);
        assert!(options.edited_suffix.is_none());
    }
}
