use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A runtime release identifier.
///
/// The raw form (`go1.22.3`, `v20.11.1`) is the only view that may be used to
/// build filesystem paths and URLs. The optional annotation (`LTS: Iron`) only
/// appears in the display form. Equality, ordering and hashing ignore the
/// annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionTag {
    raw: String,
    annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionTagError {
    #[error("Version tag is empty")]
    Empty,
    #[error("Version tag is not a valid path component: {input}")]
    InvalidComponent { input: String },
    #[error("{input} is not a {runtime} release tag")]
    Unrecognized {
        runtime: &'static str,
        input: String,
    },
}

impl VersionTag {
    /// Build a tag from a raw release string.
    ///
    /// # Errors
    /// Returns an error when the string is empty or cannot be used as a single
    /// path component.
    pub fn new(raw: impl Into<String>) -> Result<Self, VersionTagError> {
        let raw = raw.into();
        validate_raw(&raw)?;
        Ok(Self {
            raw,
            annotation: None,
        })
    }

    #[must_use]
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        let annotation = annotation.into();
        self.annotation = (!annotation.trim().is_empty()).then_some(annotation);
        self
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    #[must_use]
    pub fn display(&self) -> String {
        self.to_string()
    }
}

fn validate_raw(raw: &str) -> Result<(), VersionTagError> {
    if raw.is_empty() {
        return Err(VersionTagError::Empty);
    }
    if raw == "."
        || raw == ".."
        || raw.contains(['/', '\\', ':'])
        || raw.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(VersionTagError::InvalidComponent {
            input: raw.to_string(),
        });
    }
    Ok(())
}

/// Parses either form. `"v20.11.1 (LTS: Iron)"` yields raw `v20.11.1` with
/// annotation `LTS: Iron`.
impl FromStr for VersionTag {
    type Err = VersionTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (raw, rest) = s.split_once(char::is_whitespace).unwrap_or((s, ""));
        let tag = Self::new(raw)?;

        let annotation = rest
            .trim()
            .strip_prefix('(')
            .and_then(|inner| inner.strip_suffix(')'))
            .unwrap_or(rest.trim());
        Ok(tag.with_annotation(annotation))
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.annotation {
            Some(annotation) => write!(f, "{} ({annotation})", self.raw),
            None => f.write_str(&self.raw),
        }
    }
}

impl PartialEq for VersionTag {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for VersionTag {}

impl Hash for VersionTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Ord for VersionTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for VersionTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledVersion {
    pub version: VersionTag,
    pub is_active: bool,
    pub install_date: Option<chrono::DateTime<chrono::Utc>>,
    pub disk_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub version: VersionTag,
    pub lts_codename: Option<String>,
    pub release_date: Option<String>,
    pub stable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallPhase {
    NotInstalled,
    Downloading,
    Validating,
    Extracting,
    Installed,
    Failed(String),
}

impl InstallPhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Installed | Self::Failed(_))
    }

    /// Whether the lifecycle may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: &InstallPhase) -> bool {
        matches!(
            (self, next),
            (Self::NotInstalled, Self::Downloading)
                | (Self::Downloading, Self::Validating)
                | (Self::Validating, Self::Extracting)
                | (Self::Extracting, Self::Installed)
                | (Self::Downloading | Self::Validating | Self::Extracting, Self::Failed(_))
        )
    }
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => f.write_str("not installed"),
            Self::Downloading => f.write_str("downloading"),
            Self::Validating => f.write_str("validating"),
            Self::Extracting => f.write_str("extracting"),
            Self::Installed => f.write_str("installed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallProgress {
    pub runtime: &'static str,
    pub version: String,
    pub phase: InstallPhase,
    pub downloaded: u64,
    pub total: Option<u64>,
}
