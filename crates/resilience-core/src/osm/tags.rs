//! Overpass-style tag predicates.
//!
//! Supported forms: `"key"="value"`, `"key"~"regex"` and `"key"` (tag
//! present). The same predicate renders into the download query and filters
//! cached features locally, so both sides agree on what a category contains.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone)]
enum TagOp {
    Exists,
    Equals(String),
    Matches(Regex),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagPredicate {
    key: String,
    op: TagOp,
}

impl TagPredicate {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        match (&self.op, tags.get(&self.key)) {
            (_, None) => false,
            (TagOp::Exists, Some(_)) => true,
            (TagOp::Equals(expected), Some(value)) => value == expected,
            // Overpass regexes are unanchored
            (TagOp::Matches(regex), Some(value)) => regex.is_match(value),
        }
    }
}

/// Read a double-quoted token, returning it and the remaining input.
fn take_quoted(input: &str) -> Option<(String, &str)> {
    let rest = input.strip_prefix('"')?;
    let mut value = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?.1),
            '"' => return Some((value, &rest[i + 1..])),
            _ => value.push(c),
        }
    }
    None
}

impl FromStr for TagPredicate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidPredicate {
            predicate: s.to_string(),
            reason: reason.to_string(),
        };

        let (key, rest) = take_quoted(s.trim()).ok_or_else(|| invalid("expected a quoted key"))?;
        if key.is_empty() {
            return Err(invalid("empty key"));
        }

        let rest = rest.trim_start();
        let op = if rest.is_empty() {
            TagOp::Exists
        } else {
            let mut chars = rest.chars();
            let op_char = chars.next();
            let (value, trailing) = take_quoted(chars.as_str().trim_start())
                .ok_or_else(|| invalid("expected a quoted value"))?;
            if !trailing.trim().is_empty() {
                return Err(invalid("unexpected input after value"));
            }
            match op_char {
                Some('=') => TagOp::Equals(value),
                Some('~') => TagOp::Matches(Regex::new(&value).map_err(|e| invalid(&e.to_string()))?),
                _ => return Err(invalid("operator must be = or ~")),
            }
        };

        Ok(Self { key, op })
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

impl fmt::Display for TagPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            TagOp::Exists => write!(f, "{}", quote(&self.key)),
            TagOp::Equals(value) => write!(f, "{}={}", quote(&self.key), quote(value)),
            TagOp::Matches(regex) => write!(f, "{}~{}", quote(&self.key), quote(regex.as_str())),
        }
    }
}

impl PartialEq for TagPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl TryFrom<String> for TagPredicate {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TagPredicate> for String {
    fn from(predicate: TagPredicate) -> Self {
        predicate.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_equals_predicate() {
        let p: TagPredicate = r#""amenity"="school""#.parse().unwrap();
        assert_eq!(p.key(), "amenity");
        assert!(p.matches(&tags(&[("amenity", "school")])));
        assert!(!p.matches(&tags(&[("amenity", "schools")])));
        assert!(!p.matches(&tags(&[("name", "school")])));
    }

    #[test]
    fn test_regex_predicate_is_unanchored() {
        let any: TagPredicate = r#""shop"~".""#.parse().unwrap();
        assert!(any.matches(&tags(&[("shop", "bakery")])));
        assert!(!any.matches(&tags(&[("amenity", "bakery")])));

        let landuse: TagPredicate = r#""landuse"~"park|forest""#.parse().unwrap();
        assert!(landuse.matches(&tags(&[("landuse", "forest")])));
        assert!(landuse.matches(&tags(&[("landuse", "national_park")])));
        assert!(!landuse.matches(&tags(&[("landuse", "farmland")])));
    }

    #[test]
    fn test_exists_predicate() {
        let p: TagPredicate = r#""healthcare""#.parse().unwrap();
        assert!(p.matches(&tags(&[("healthcare", "clinic")])));
        assert_eq!(p.to_string(), r#""healthcare""#);
    }

    #[test]
    fn test_display_round_trip() {
        for raw in [r#""amenity"="school""#, r#""leisure"~".""#, r#""name"="Say \"hi\"""#] {
            let p: TagPredicate = raw.parse().unwrap();
            assert_eq!(p.to_string(), raw);
        }
    }

    #[test]
    fn test_invalid_predicates() {
        for raw in ["amenity=school", r#""amenity"=school"#, r#""amenity"!"school""#, r#""a"~"(""#, r#""""#] {
            assert!(raw.parse::<TagPredicate>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let p: TagPredicate = serde_json::from_str(r#""\"amenity\"=\"school\"""#).unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), r#""\"amenity\"=\"school\"""#);
        assert!(serde_json::from_str::<TagPredicate>(r#""nonsense""#).is_err());
    }
}
