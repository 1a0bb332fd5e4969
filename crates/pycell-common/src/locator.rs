//! Backing-store locators for fragment source files.
//!
//! Format: `<scheme>:/<document-id>/<code-root>/<sheet-unique-id>/<code-name>.py`

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LocatorError {
    #[error("locator '{0}' has no scheme")]
    MissingScheme(String),
    #[error("locator '{0}' must have four path segments")]
    SegmentCount(String),
    #[error("locator '{0}' does not name a .py file")]
    NotPython(String),
    #[error("locator segment '{0}' is empty or contains '/'")]
    BadSegment(String),
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocator {
    pub scheme: String,
    pub document_id: String,
    pub code_root: String,
    pub sheet_uid: String,
    pub code_name: String,
}

impl SourceLocator {
    pub fn new(
        scheme: impl Into<String>,
        document_id: impl Into<String>,
        code_root: impl Into<String>,
        sheet_uid: impl Into<String>,
        code_name: impl Into<String>,
    ) -> Result<Self, LocatorError> {
        let loc = Self {
            scheme: scheme.into(),
            document_id: document_id.into(),
            code_root: code_root.into(),
            sheet_uid: sheet_uid.into(),
            code_name: code_name.into(),
        };
        for seg in [&loc.document_id, &loc.code_root, &loc.sheet_uid, &loc.code_name] {
            if seg.is_empty() || seg.contains('/') {
                return Err(LocatorError::BadSegment(seg.clone()));
            }
        }
        Ok(loc)
    }

    /// `<document-id>/<code-root>/<sheet-unique-id>/<code-name>.py`
    pub fn relative_path(&self) -> String {
        format!("{}/{}.py", self.container_path(), self.code_name)
    }

    /// Directory holding the file.
    pub fn container_path(&self) -> String {
        format!("{}/{}/{}", self.document_id, self.code_root, self.sheet_uid)
    }

    /// Same container, different code-name.
    pub fn with_code_name(&self, code_name: impl Into<String>) -> Self {
        Self {
            code_name: code_name.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.scheme, self.relative_path())
    }
}

impl FromStr for SourceLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, path) = s
            .split_once(":/")
            .ok_or_else(|| LocatorError::MissingScheme(s.to_string()))?;
        if scheme.is_empty() {
            return Err(LocatorError::MissingScheme(s.to_string()));
        }
        let parts: Vec<&str> = path.split('/').collect();
        let [doc, root, sheet, file] = parts.as_slice() else {
            return Err(LocatorError::SegmentCount(s.to_string()));
        };
        let code_name = file
            .strip_suffix(".py")
            .ok_or_else(|| LocatorError::NotPython(s.to_string()))?;
        SourceLocator::new(scheme, *doc, *root, *sheet, code_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let text = "vnd.sun.star.tdoc:/7/pycell/sheet-a/pycell_3.py";
        let loc: SourceLocator = text.parse().unwrap();
        assert_eq!(loc.scheme, "vnd.sun.star.tdoc");
        assert_eq!(loc.document_id, "7");
        assert_eq!(loc.sheet_uid, "sheet-a");
        assert_eq!(loc.code_name, "pycell_3");
        assert_eq!(loc.to_string(), text);
        assert_eq!(loc.container_path(), "7/pycell/sheet-a");
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(
            "nope".parse::<SourceLocator>(),
            Err(LocatorError::MissingScheme(_))
        ));
        assert!(matches!(
            "mem:/a/b/c.py".parse::<SourceLocator>(),
            Err(LocatorError::SegmentCount(_))
        ));
        assert!(matches!(
            "mem:/a/b/c/d.txt".parse::<SourceLocator>(),
            Err(LocatorError::NotPython(_))
        ));
        assert!(SourceLocator::new("mem", "", "r", "s", "c").is_err());
    }
}
