//! Storage-location paths
//!
//! A path names the place a root lives: a slot in a stack frame or a global
//! binding. Paths compare structurally and render to a canonical string:
//!
//! ```text
//! frame[2].slot[0]
//! global.counter
//! ```

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:frame\[(\d+)\]\.slot\[(\d+)\]|global\.([\p{Alphabetic}_][\p{Alphabetic}\p{N}_]*))$")
        .expect("path pattern is valid")
});

/// Identifier for a storage location
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Path {
    /// Slot `slot` of stack frame `frame`
    Local { frame: usize, slot: usize },
    /// Package-level binding
    Global(String),
}

impl Path {
    /// Path of a stack slot
    pub const fn local(frame: usize, slot: usize) -> Self {
        Path::Local { frame, slot }
    }

    /// Path of a global binding
    pub fn global(name: impl Into<String>) -> Self {
        Path::Global(name.into())
    }

    /// Frame index, for local paths
    pub fn frame(&self) -> Option<usize> {
        match self {
            Path::Local { frame, .. } => Some(*frame),
            Path::Global(_) => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Path::Global(_))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Path::Local { frame, slot } => write!(f, "frame[{}].slot[{}]", frame, slot),
            Path::Global(name) => write!(f, "global.{}", name),
        }
    }
}

/// Error parsing a canonical path string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParseError {
    pub input: String,
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid path: {:?}", self.input)
    }
}

impl std::error::Error for PathParseError {}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PathParseError { input: s.to_string() };
        let caps = PATH_RE.captures(s).ok_or_else(err)?;

        if let Some(name) = caps.get(3) {
            return Ok(Path::Global(name.as_str().to_string()));
        }

        // Both groups are present when the local alternative matched
        let frame = caps[1].parse().map_err(|_| err())?;
        let slot = caps[2].parse().map_err(|_| err())?;
        Ok(Path::Local { frame, slot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Path::local(2, 0).to_string(), "frame[2].slot[0]");
        assert_eq!(Path::global("counter").to_string(), "global.counter");
    }

    #[test]
    fn test_parse() {
        assert_eq!("frame[10].slot[3]".parse::<Path>(), Ok(Path::local(10, 3)));
        assert_eq!("global.x_1".parse::<Path>(), Ok(Path::global("x_1")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("frame[1]".parse::<Path>().is_err());
        assert!("global.".parse::<Path>().is_err());
        assert!("global.1abc".parse::<Path>().is_err());
        assert!(" frame[0].slot[0]".parse::<Path>().is_err());
        assert!("frame[99999999999999999999999].slot[0]".parse::<Path>().is_err());
    }

    #[test]
    fn test_equality_is_structural() {
        let a = Path::global(String::from("g"));
        let b: Path = "global.g".parse().unwrap();
        assert_eq!(a, b);
        assert_ne!(Path::local(0, 1), Path::local(1, 0));
        assert_eq!(Path::local(3, 1).frame(), Some(3));
        assert!(Path::global("g").is_global());
    }

    #[test]
    fn test_unicode_global_names() {
        for name in ["π", "größe_2", "名前"] {
            let path = Path::global(name);
            assert_eq!(path.to_string().parse::<Path>(), Ok(path));
        }
        assert!("global.2π".parse::<Path>().is_err());
    }
}
