//! Hierarchical service names.
//!
//! A [`ServiceName`] is an ordered sequence of case-sensitive segments. Names are
//! the addressing scheme across subsystem boundaries, so composition must be
//! stable: appending segments one at a time or all at once yields equal names.
use std::{fmt, sync::Arc};

use thiserror::Error;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(Arc<[Arc<str>]>);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("service name is empty")]
    Empty,
    #[error("service name contains an empty segment: {0:?}")]
    EmptySegment(String),
    #[error("unterminated quote in service name: {0:?}")]
    UnterminatedQuote(String),
}

impl ServiceName {
    /// The root of the well-known `jboss` namespace.
    pub fn jboss() -> Self {
        Self::of(["jboss"])
    }

    /// Build a name from its segments. Empty input yields an empty name, which is
    /// only useful as a base for [`append`](Self::append).
    pub fn of<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(segments.into_iter().map(|s| Arc::from(s.as_ref())).collect())
    }

    /// Parse a canonical, dot separated name. Segments containing dots are
    /// written in double quotes, e.g. `jboss.deployment.unit."app.ear"`, and an
    /// empty segment is written `""`.
    pub fn parse(canonical: &str) -> Result<Self, NameError> {
        if canonical.is_empty() {
            return Err(NameError::Empty);
        }
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        // the current segment was written in quotes, so it may be empty
        let mut closed = false;
        let mut chars = canonical.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if quoted => {
                    quoted = false;
                    closed = true;
                    if !matches!(chars.peek(), None | Some('.')) {
                        return Err(NameError::UnterminatedQuote(canonical.to_string()));
                    }
                }
                '"' if current.is_empty() => quoted = true,
                '\\' if quoted => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                '.' if !quoted => {
                    if current.is_empty() && !closed {
                        return Err(NameError::EmptySegment(canonical.to_string()));
                    }
                    segments.push(std::mem::take(&mut current));
                    closed = false;
                }
                other => current.push(other),
            }
        }
        if quoted {
            return Err(NameError::UnterminatedQuote(canonical.to_string()));
        }
        if current.is_empty() && !closed {
            return Err(NameError::EmptySegment(canonical.to_string()));
        }
        segments.push(current);
        Ok(Self::of(segments))
    }

    /// Create a child name by appending every given segment.
    pub fn append<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<Arc<str>> = self.0.iter().cloned().collect();
        out.extend(segments.into_iter().map(|s| Arc::from(s.as_ref())));
        Self(out.into())
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parent(&self) -> Option<Self> {
        match self.0.len() {
            0 | 1 => None,
            n => Some(Self(self.0[..n - 1].to_vec().into())),
        }
    }

    /// The last segment.
    pub fn simple_name(&self) -> Option<&str> {
        self.0.last().map(|s| s.as_ref())
    }

    /// True if `other` lies strictly below this name.
    pub fn is_parent_of(&self, other: &ServiceName) -> bool {
        other.0.len() > self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    pub fn canonical_name(&self) -> String {
        let mut out = String::new();
        for (idx, segment) in self.0.iter().enumerate() {
            if idx > 0 {
                out.push('.');
            }
            if needs_quotes(segment) {
                out.push('"');
                for c in segment.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            } else {
                out.push_str(segment);
            }
        }
        out
    }
}

fn needs_quotes(segment: &str) -> bool {
    segment.is_empty()
        || segment
            .chars()
            .any(|c| c == '.' || c == '"' || c == '\\' || c.is_whitespace())
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

impl fmt::Debug for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceName({})", self.canonical_name())
    }
}

impl std::str::FromStr for ServiceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceName;

    #[test]
    fn test_append_is_associative() {
        let base = ServiceName::of(["jboss", "deployment"]);
        let stepwise = base.append(["x"]).append(["y"]);
        let at_once = base.append(["x", "y"]);
        let nested = ServiceName::of(["jboss"]).append(["deployment", "x"]).append(["y"]);
        assert_eq!(stepwise, at_once);
        assert_eq!(at_once, nested);
        assert_eq!("jboss.deployment.x.y", at_once.to_string());
    }

    #[test]
    fn test_parent_and_simple_name() {
        let name = ServiceName::parse("jboss.osgi.bundlemanager").unwrap();
        assert_eq!(Some("bundlemanager"), name.simple_name());
        assert_eq!(ServiceName::of(["jboss", "osgi"]), name.parent().unwrap());
        assert!(ServiceName::jboss().is_parent_of(&name));
        assert!(!name.is_parent_of(&name));
        assert!(ServiceName::jboss().parent().is_none());
    }

    #[test]
    fn test_quoted_segments_round_trip() {
        let name = ServiceName::of(["jboss", "deployment", "unit", "app.ear"]);
        assert_eq!(r#"jboss.deployment.unit."app.ear""#, name.canonical_name());
        assert_eq!(name, ServiceName::parse(&name.canonical_name()).unwrap());
    }

    #[test]
    fn test_canonical_name_parses_back() {
        for segments in [
            vec!["a", ""],
            vec!["", "b"],
            vec![""],
            vec!["a", "", "c"],
            vec!["say \"hi\"", "back\\slash", "two words"],
        ] {
            let name = ServiceName::of(&segments);
            let canonical = name.canonical_name();
            assert_eq!(name, ServiceName::parse(&canonical).unwrap(), "{canonical}");
        }
        assert_eq!(r#"a."""#, ServiceName::of(["a", ""]).canonical_name());
    }

    #[test]
    fn test_segments_are_case_sensitive() {
        assert_ne!(ServiceName::of(["Jboss"]), ServiceName::jboss());
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert!(ServiceName::parse("").is_err());
        assert!(ServiceName::parse("a..b").is_err());
        assert!(ServiceName::parse("a.").is_err());
        assert!(ServiceName::parse(r#"a."b"#).is_err());
    }
}
