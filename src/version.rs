use std::fmt;
use std::str::FromStr;

use crate::error::ReleaseError;

/// Number of dot-separated components a release version must carry
/// (major.minor.patch.build).
pub const MIN_COMPONENTS: usize = 4;

/// A validated release version.
///
/// The original text is kept verbatim so remote names reproduce exactly what
/// the build system stamped, leading zeros included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    raw: String,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, ReleaseError> {
        let raw = input.trim();
        let invalid = |reason: String| ReleaseError::InvalidVersion {
            version: input.to_string(),
            reason,
        };

        if raw.is_empty() {
            return Err(invalid("version is empty".into()));
        }

        // Components are digit strings of any length; they are never read as
        // integers.
        let mut count = 0;
        for (idx, part) in raw.split('.').enumerate() {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!(
                    "component {} ('{}') is not numeric",
                    idx + 1,
                    part
                )));
            }
            count += 1;
        }

        if count < MIN_COMPONENTS {
            return Err(invalid(format!(
                "expected at least {MIN_COMPONENTS} components (major.minor.patch.build), found {count}"
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Remote directory segment: the raw text of the first three components.
    pub fn bucket_path(&self) -> String {
        self.raw.split('.').take(3).collect::<Vec<_>>().join(".")
    }
}

impl FromStr for Version {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
