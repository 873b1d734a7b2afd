//! Path patterns used by access rules.
use std::fmt;

/// A path pattern is not valid.
#[derive(Debug, thiserror::Error)]
#[error("invalid path pattern '{pattern}': {reason}")]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: &'static str,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    /// Matches exactly the given segment.
    Literal(String),

    /// Matches any one segment.
    Any,

    /// Matches all remaining segments, including none.
    Rest,
}

/// Pattern matching request paths segment by segment.
///
/// - Literal segments match exactly.
/// - `*` matches exactly one segment.
/// - A trailing `**` matches the remainder of the path, including nothing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathPattern {
    segments: Vec<Segment>,
    source: String,
}

impl PathPattern {
    /// Parse a path pattern.
    pub fn parse(pattern: &str) -> Result<PathPattern, InvalidPattern> {
        if !pattern.starts_with('/') {
            return Err(InvalidPattern {
                pattern: pattern.to_string(),
                reason: "patterns must start with '/'",
            });
        }
        let parts: Vec<&str> = split(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let segment = match *part {
                "**" if index + 1 == parts.len() => Segment::Rest,
                "**" => {
                    return Err(InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: "'**' is only allowed as the last segment",
                    })
                }
                "*" => Segment::Any,
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }
        Ok(PathPattern {
            segments,
            source: pattern.to_string(),
        })
    }

    /// Check if a request path matches the pattern.
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = split(path);
        for segment in &self.segments {
            match segment {
                Segment::Rest => return true,
                Segment::Any => {
                    if parts.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(literal) => match parts.next() {
                    Some(part) if part == literal => (),
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn split(path: &str) -> std::str::Split<'_, char> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}
