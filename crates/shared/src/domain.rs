use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

pub const MAX_CABINET_NAME_CHARS: usize = 100;
pub const DEFAULT_MIN_TEXT_LENGTH: usize = 10;
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 5000;
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Cabinet names are the server-assigned identity of a destination.
///
/// Names received from the server are taken as-is; names typed by the user go
/// through [`CabinetName::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CabinetName(String);

impl CabinetName {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCabinetName);
        }
        let len = trimmed.chars().count();
        if len > MAX_CABINET_NAME_CHARS {
            return Err(ValidationError::CabinetNameTooLong {
                len,
                max: MAX_CABINET_NAME_CHARS,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CabinetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelInstanceId(pub Uuid);

impl PanelInstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PanelInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PanelInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOrigin {
    ContextMenu,
    DragDrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthCheck {
    Ok,
    TooShort { len: usize, min: usize },
    TooLong { len: usize, max: usize },
}

impl LengthCheck {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        match self {
            Self::Ok => Ok(()),
            Self::TooShort { len, min } => Err(ValidationError::TextTooShort { len, min }),
            Self::TooLong { len, max } => Err(ValidationError::TextTooLong { len, max }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLengthBounds")]
pub struct LengthBounds {
    min: usize,
    max: usize,
}

#[derive(Deserialize)]
struct RawLengthBounds {
    min: usize,
    max: usize,
}

impl TryFrom<RawLengthBounds> for LengthBounds {
    type Error = ValidationError;

    fn try_from(raw: RawLengthBounds) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
    }
}

impl LengthBounds {
    pub fn new(min: usize, max: usize) -> Result<Self, ValidationError> {
        if min == 0 || min >= max {
            return Err(ValidationError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Length is counted in Unicode scalar values, not bytes.
    pub fn check(&self, text: &str) -> LengthCheck {
        let len = text.chars().count();
        if len < self.min {
            LengthCheck::TooShort { len, min: self.min }
        } else if len > self.max {
            LengthCheck::TooLong { len, max: self.max }
        } else {
            LengthCheck::Ok
        }
    }
}

impl Default for LengthBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_TEXT_LENGTH,
            max: DEFAULT_MAX_TEXT_LENGTH,
        }
    }
}

/// Source locator carried with captured text; blank or missing becomes `"unknown"`.
pub fn source_or_unknown(source_url: Option<&str>) -> String {
    match source_url.map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => UNKNOWN_SOURCE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_accept_both_edges() {
        let bounds = LengthBounds::new(3, 5).expect("bounds");
        assert_eq!(bounds.check("ab"), LengthCheck::TooShort { len: 2, min: 3 });
        assert!(bounds.check("abc").is_ok());
        assert!(bounds.check("abcde").is_ok());
        assert_eq!(bounds.check("abcdef"), LengthCheck::TooLong { len: 6, max: 5 });
    }

    #[test]
    fn bounds_count_chars_not_bytes() {
        let bounds = LengthBounds::new(2, 3).expect("bounds");
        assert!(bounds.check("éé").is_ok());
    }

    #[test]
    fn bounds_reject_inverted_equal_and_zero_minimum() {
        assert_eq!(
            LengthBounds::new(10, 5),
            Err(ValidationError::InvalidBounds { min: 10, max: 5 })
        );
        assert!(LengthBounds::new(7, 7).is_err());
        assert!(LengthBounds::new(0, 7).is_err());
    }

    #[test]
    fn bounds_deserialize_through_validation() {
        let ok: LengthBounds = serde_json::from_str(r#"{"min":1,"max":2}"#).expect("valid");
        assert_eq!((ok.min(), ok.max()), (1, 2));
        assert!(serde_json::from_str::<LengthBounds>(r#"{"min":9,"max":2}"#).is_err());
    }

    #[test]
    fn cabinet_name_is_trimmed_and_bounded() {
        assert_eq!(
            CabinetName::parse("  notes ").expect("name").as_str(),
            "notes"
        );
        assert_eq!(
            CabinetName::parse("   "),
            Err(ValidationError::EmptyCabinetName)
        );
        assert!(CabinetName::parse(&"x".repeat(100)).is_ok());
        assert_eq!(
            CabinetName::parse(&"x".repeat(101)),
            Err(ValidationError::CabinetNameTooLong { len: 101, max: 100 })
        );
    }

    #[test]
    fn blank_source_becomes_unknown() {
        assert_eq!(source_or_unknown(None), "unknown");
        assert_eq!(source_or_unknown(Some("  ")), "unknown");
        assert_eq!(
            source_or_unknown(Some("https://example.com/a")),
            "https://example.com/a"
        );
    }
}
