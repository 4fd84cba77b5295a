use std::{collections::HashMap, fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route pattern '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("route pattern '{pattern}' has an unterminated parameter")]
    Unterminated { pattern: String },

    #[error("route pattern '{pattern}' has an empty parameter name")]
    EmptyName { pattern: String },

    #[error("route pattern '{pattern}' uses unknown constraint '{constraint}'")]
    UnknownConstraint { pattern: String, constraint: String },
}

/// What a `{name:constraint}` parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Any non-empty segment.
    Any,
    Uuid,
    /// ASCII digits.
    Int,
    /// ASCII letters.
    Alpha,
    /// Lowercase letters, digits and dashes.
    Slug,
}

impl Constraint {
    fn accepts(&self, segment: &str) -> bool {
        match self {
            Constraint::Any => true,
            Constraint::Uuid => uuid::Uuid::parse_str(segment).is_ok(),
            Constraint::Int => segment.bytes().all(|b| b.is_ascii_digit()),
            Constraint::Alpha => segment.bytes().all(|b| b.is_ascii_alphabetic()),
            Constraint::Slug => segment
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Constraint::Any => "",
            Constraint::Uuid => "uuid",
            Constraint::Int => "int",
            Constraint::Alpha => "alpha",
            Constraint::Slug => "slug",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, constraint: Constraint },
}

/// A parsed route path such as `/users/{id:uuid}/posts/{slug}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    segments: Vec<Segment>,
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash(pattern.to_string()));
        }

        let mut segments = Vec::new();
        for raw in split(pattern) {
            let Some(inner) = raw.strip_prefix('{') else {
                segments.push(Segment::Literal(raw.to_string()));
                continue;
            };
            let inner = inner.strip_suffix('}').ok_or_else(|| RouteError::Unterminated {
                pattern: pattern.to_string(),
            })?;
            let (name, constraint) = match inner.split_once(':') {
                Some((name, constraint)) => (name.trim(), constraint.trim()),
                None => (inner.trim(), ""),
            };
            if name.is_empty() {
                return Err(RouteError::EmptyName {
                    pattern: pattern.to_string(),
                });
            }
            let constraint = match constraint {
                "" => Constraint::Any,
                "uuid" => Constraint::Uuid,
                "int" => Constraint::Int,
                "alpha" => Constraint::Alpha,
                "slug" => Constraint::Slug,
                other => {
                    return Err(RouteError::UnknownConstraint {
                        pattern: pattern.to_string(),
                        constraint: other.to_string(),
                    });
                }
            };
            segments.push(Segment::Param {
                name: name.to_string(),
                constraint,
            });
        }
        Ok(Self { segments })
    }

    /// Matches `path`, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut parts = split(path);
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param { name, constraint } => {
                    if !constraint.accepts(part) {
                        return None;
                    }
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        match parts.next() {
            Some(_) => None,
            None => Some(params),
        }
    }

    /// Joins a group prefix and a route path.
    pub fn join(prefix: &str, path: &str) -> String {
        let prefix = prefix.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        match (prefix.is_empty(), path.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => format!("/{path}"),
            (false, true) => prefix.to_string(),
            (false, false) => format!("{prefix}/{path}"),
        }
    }
}

impl FromStr for RoutePattern {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => write!(f, "/{literal}")?,
                Segment::Param {
                    name,
                    constraint: Constraint::Any,
                } => write!(f, "/{{{name}}}")?,
                Segment::Param { name, constraint } => {
                    write!(f, "/{{{name}:{}}}", constraint.as_str())?
                }
            }
        }
        Ok(())
    }
}
