use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::title::{sanitize, Title, TRUNCATED_BASE_LEN};

/// Suffix Google appends to the sidecar of `{base}(N).{ext}`: `{base}.{ext}(N).json`
static NUMBERED_SIDECAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d+\)\.json$").unwrap());

pub const DEFAULT_EDITED_SUFFIX: &str = "-editado";
pub const DEFAULT_MAX_DUPLICATE_PROBE: u32 = 10_000;

/// Titles already claimed by an earlier sidecar in this batch run.
#[derive(Debug, Clone, Default)]
pub struct MovedTitles(HashSet<String>);

impl MovedTitles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, title: impl Into<String>) {
        self.0.insert(title.into());
    }

    pub fn contains(&self, title: &str) -> bool {
        self.0.contains(title)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Which naming heuristic produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Edited,
    Plain,
    Duplicate(u32),
}

/// A file on disk that belongs to a sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub path: PathBuf,
    pub title: String,
    pub strategy: Strategy,
    /// Matched only after clipping the base name
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub edited_suffix: String,
    /// Where untouched originals of edited files are set aside
    pub originals_dir: PathBuf,
    pub max_duplicate_probe: u32,
}

impl MatcherConfig {
    pub fn new(originals_dir: impl Into<PathBuf>) -> Self {
        Self {
            edited_suffix: DEFAULT_EDITED_SUFFIX.to_string(),
            originals_dir: originals_dir.into(),
            max_duplicate_probe: DEFAULT_MAX_DUPLICATE_PROBE,
        }
    }

    /// Use `suffix`, or the default when it is empty.
    pub fn with_edited_suffix(mut self, suffix: &str) -> Self {
        self.edited_suffix = if suffix.is_empty() {
            DEFAULT_EDITED_SUFFIX.to_string()
        } else {
            suffix.to_string()
        };
        self
    }

    pub fn with_max_duplicate_probe(mut self, max: u32) -> Self {
        self.max_duplicate_probe = max;
        self
    }
}

pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Find the file in `dir` that a sidecar titled `title` describes.
    ///
    /// Tries the edited form, the plain name and the numbered duplicates, in
    /// that order, for the full title and then for the 47-character clipped
    /// title. `sidecar_name` is the sidecar's own file name, used to tell a
    /// numbered sidecar apart from the one that owns the plain name.
    ///
    /// `Ok(None)` means no candidate exists. An `Err` means `dir` itself is
    /// gone or a set-aside move failed.
    pub fn resolve(
        &self,
        dir: &Path,
        title: &Title,
        moved: &MovedTitles,
        sidecar_name: Option<&str>,
    ) -> io::Result<Option<ResolvedMedia>> {
        if let Some(found) = self.cascade(dir, title, moved, sidecar_name, false)? {
            return Ok(Some(found));
        }

        let short = title.truncated(TRUNCATED_BASE_LEN);
        if short == *title {
            return Ok(None);
        }
        self.cascade(dir, &short, moved, sidecar_name, true)
    }

    fn cascade(
        &self,
        dir: &Path,
        title: &Title,
        moved: &MovedTitles,
        sidecar_name: Option<&str>,
        truncated: bool,
    ) -> io::Result<Option<ResolvedMedia>> {
        if !fs::metadata(dir)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", dir.display()),
            ));
        }

        let found = |name: String, strategy: Strategy| {
            log::debug!("{} matched {:?} (truncated: {})", name, strategy, truncated);
            Some(ResolvedMedia {
                path: dir.join(&name),
                title: name,
                strategy,
                truncated,
            })
        };

        // An edited file's sidecar carries the original title, so this goes first
        if !self.config.edited_suffix.is_empty() {
            let edited = title.with_suffix(&self.config.edited_suffix);
            if dir.join(&edited).is_file() {
                self.set_aside_original(dir, title)?;
                return Ok(found(edited, Strategy::Edited));
            }
        }

        let plain = title.file_name();
        if dir.join(&plain).is_file() && !is_numbered_sidecar(title, sidecar_name) {
            return Ok(found(plain, Strategy::Plain));
        }

        for n in 1..=self.config.max_duplicate_probe {
            let candidate = title.numbered(n);
            if moved.contains(&candidate) {
                continue;
            }
            if dir.join(&candidate).is_file() {
                return Ok(found(candidate, Strategy::Duplicate(n)));
            }
            break;
        }

        Ok(None)
    }

    /// Move the untouched `{base}.{ext}` next to an edited file into the originals dir.
    fn set_aside_original(&self, dir: &Path, title: &Title) -> io::Result<()> {
        let name = title.file_name();
        let dest = self.config.originals_dir.join(&name);
        match fs::rename(dir.join(&name), &dest) {
            Ok(()) => {
                log::debug!("Moved original {} to {}", name, dest.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// True when `sidecar_name` is `{title}(N).json`: the plain name belongs to another sidecar.
fn is_numbered_sidecar(title: &Title, sidecar_name: Option<&str>) -> bool {
    let Some(name) = sidecar_name else {
        return false;
    };
    let name = sanitize(name);
    name.strip_prefix(&title.file_name())
        .is_some_and(|rest| NUMBERED_SIDECAR_RE.is_match(rest))
}
