use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// One component of a model path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(key) => Some(key),
            Segment::Index(_) => None,
        }
    }

    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Index(index) => Some(*index),
            Segment::Key(key) => key.parse().ok(),
        }
    }
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        match value.parse::<usize>() {
            Ok(index) if !value.starts_with('+') => Segment::Index(index),
            _ => Segment::Key(value.to_string()),
        }
    }
}

impl From<String> for Segment {
    fn from(value: String) -> Self {
        Segment::from(value.as_str())
    }
}

impl From<usize> for Segment {
    fn from(value: usize) -> Self {
        Segment::Index(value)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A dotted model path such as `_page.items.0.name`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Path(Vec<Segment>);

impl Path {
    #[must_use]
    pub fn new(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path. Numeric components become indices; the empty string is the root.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::root();
        }
        Self(path.split('.').map(Segment::from).collect())
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.0.push(segment.into());
    }

    #[must_use]
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    #[must_use]
    pub fn join(&self, other: &Path) -> Self {
        let mut segments = Vec::with_capacity(self.len() + other.len());
        segments.extend_from_slice(&self.0);
        segments.extend_from_slice(&other.0);
        Self(segments)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.0.last()
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    #[must_use]
    pub fn into_segments(self) -> Vec<Segment> {
        self.0
    }
}

impl From<Vec<Segment>> for Path {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl From<&str> for Path {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl FromStr for Path {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric_components_as_indices() {
        let path = Path::parse("_page.items.0.name");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("_page".into()),
                Segment::Key("items".into()),
                Segment::Index(0),
                Segment::Key("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "_page.items.0.name");
    }

    #[test]
    fn test_empty_string_is_root() {
        assert!(Path::parse("").is_empty());
    }

    #[test]
    fn test_parent_and_join() {
        let path = Path::parse("a.b");
        assert_eq!(path.parent(), Some(Path::parse("a")));
        assert_eq!(path.join(&Path::parse("c.1")), Path::parse("a.b.c.1"));
        assert!(Path::root().parent().is_none());
    }
}
