use crate::{Error, Result};
use serde::de::{self, Visitor};
use serde::Deserializer;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, error};

/// Width of a CIK, as it appears in EDGAR paths and tables.
pub const CIK_WIDTH: usize = 10;

/// Left-pad a CIK with zeros, up to [`CIK_WIDTH`] characters.
///
/// CIKs already at (or beyond) the width are returned unchanged; nothing is truncated.
///
/// ```rust
/// use filings_spider::cik::normalize;
///
/// assert_eq!(normalize("320193"), "0000320193");
/// assert_eq!(normalize("0000320193"), "0000320193");
/// assert_eq!(normalize("123456789012"), "123456789012");
/// ```
pub fn normalize(raw: &str) -> String {
    format!("{:0>width$}", raw.trim(), width = CIK_WIDTH)
}

/// Validating form of [`normalize`]; `None` when `raw` is blank or not integer-like.
///
/// ```rust
/// use filings_spider::cik::try_normalize;
///
/// assert_eq!(try_normalize(" 12345 ").as_deref(), Some("0000012345"));
/// assert_eq!(try_normalize(""), None);
/// assert_eq!(try_normalize("12a45"), None);
/// ```
pub fn try_normalize(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(normalize(raw))
}

/// Load an allowlist of CIKs from a text file; one CIK per line.
///
/// Blank lines, and lines starting with `#`, are ignored. Every other line must be integer-like,
/// otherwise the whole list is rejected.
pub fn load_allowlist(path: impl AsRef<Path>) -> Result<HashSet<String>> {
    let path = path.as_ref();
    let invalid = |reason: String| Error::InvalidAllowlist {
        path: path.display().to_string(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|err| {
        error!("failed to read CIK allowlist {}, error({err})", path.display());
        invalid(err.to_string())
    })?;

    let mut ciks = HashSet::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match try_normalize(line) {
            Some(cik) => {
                ciks.insert(cik);
            }
            None => {
                error!("CIK allowlist {} line {}: {line:?}", path.display(), n + 1);
                return Err(invalid(format!("line {} is not a CIK: {line:?}", n + 1)));
            }
        }
    }

    debug!("{} CIKs loaded from {}", ciks.len(), path.display());
    Ok(ciks)
}

/// Deserialize a CIK column, re-padding it to [`CIK_WIDTH`].
///
/// Tables passed through spreadsheets tend to lose the leading zeros, and a CSV reader will
/// hand those back as integers, so both forms are accepted.
pub fn de_cik<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(CikVisitor)
}

struct CikVisitor;

impl<'de> Visitor<'de> for CikVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a CIK, as an integer or a string of digits")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(normalize(&v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        if v < 0 {
            return Err(E::invalid_value(de::Unexpected::Signed(v), &self));
        }
        Ok(normalize(&v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        Ok(normalize(v))
    }
}
