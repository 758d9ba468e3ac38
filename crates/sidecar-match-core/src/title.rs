use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Characters stripped from sidecar titles before they are compared with disk names
static ILLEGAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[%<>=:?¿*#&{}\\@!+|"']"#).unwrap());

/// Google Takeout clips long base names to this many characters
pub const TRUNCATED_BASE_LEN: usize = 47;

/// Remove characters that are illegal or ambiguous across filesystems.
pub fn sanitize(title: &str) -> String {
    ILLEGAL_RE.replace_all(title, "").into_owned()
}

/// A sanitized media file name, split at its last extension separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Title {
    base: String,
    ext: String,
}

impl Title {
    /// Sanitize `raw` and split it into base and extension.
    /// Returns None when there is no extension separator, the base is empty,
    /// or the title is a path rather than a bare file name.
    pub fn parse(raw: &str) -> Option<Self> {
        let clean = sanitize(raw);
        if clean.contains(['/', '\0']) {
            return None;
        }
        let (base, ext) = clean.rsplit_once('.')?;
        if base.is_empty() {
            return None;
        }
        Some(Self {
            base: base.to_string(),
            ext: ext.to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self.base, self.ext)
    }

    /// `{base}{suffix}.{ext}`
    pub fn with_suffix(&self, suffix: &str) -> String {
        format!("{}{}.{}", self.base, suffix, self.ext)
    }

    /// `{base}({n}).{ext}`
    pub fn numbered(&self, n: u32) -> String {
        format!("{}({}).{}", self.base, n, self.ext)
    }

    /// Clip the base to `max_chars` characters, keeping the extension.
    pub fn truncated(&self, max_chars: usize) -> Self {
        Self {
            base: self.base.chars().take(max_chars).collect(),
            ext: self.ext.clone(),
        }
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base, self.ext)
    }
}
