//! App names and app keys.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Names must be strictly shorter than this.
pub const MAX_APP_NAME_LEN: usize = 128;

/// `<tld>.<company>.<product>[.<ext>...]`, TLD letters only, no segment
/// empty or starting/ending with `-`.
static APP_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-z]+(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?){2,}$",
    )
    .expect("app name pattern")
});

/// Image-tag charset: no path separators, and no leading `.` so neither
/// `.` nor `..` can appear as a whole version.
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").expect("version pattern"));

/// A reverse-domain app name, validated once at construction.
///
/// Construction never fails: an invalid input yields a name whose `value()`
/// is empty and whose `is_valid()` is false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppName(String);

impl AppName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if Self::is_valid_name(&name) {
            Self(name)
        } else {
            Self(String::new())
        }
    }

    /// Check a raw string without constructing.
    pub fn is_valid_name(name: &str) -> bool {
        name.len() < MAX_APP_NAME_LEN && APP_NAME_RE.is_match(name)
    }

    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Serialize for AppName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AppName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::new(String::deserialize(deserializer)?))
    }
}

/// An app name paired with a version string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppKey {
    name: AppName,
    version: String,
}

impl AppKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: AppName::new(name),
            version: version.into(),
        }
    }

    pub fn from_parts(name: AppName, version: impl Into<String>) -> Self {
        Self {
            name,
            version: version.into(),
        }
    }

    /// Versions end up in image tags and in directory names.
    pub fn is_valid_version(version: &str) -> bool {
        VERSION_RE.is_match(version)
    }

    pub fn is_valid(&self) -> bool {
        self.name.is_valid() && Self::is_valid_version(&self.version)
    }

    pub fn name(&self) -> &str {
        self.name.value()
    }

    pub fn app_name(&self) -> &AppName {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.version)
    }
}
