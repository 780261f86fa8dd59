//! Attribute validators attached to document classes.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::attributes::Attributes;
use crate::error::ValidationError;

/// Compiled patterns shared by every `validates_format_of` declaration.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(|| RegexCache {
        cache: RwLock::new(HashMap::new()),
    })
}

/// Check if a string matches a regex pattern. Invalid patterns never match.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// A validation rule evaluated against a document's attributes.
#[derive(Clone)]
pub enum Validator {
    /// Field must be present and not blank.
    Presence(String),
    /// Text field, when present, must match the pattern.
    Format { field: String, pattern: String },
    /// Arbitrary check.
    Custom(Rc<dyn Fn(&Attributes, &mut ValidationError)>),
}

impl Validator {
    pub fn validate(&self, attributes: &Attributes, errors: &mut ValidationError) {
        match self {
            Validator::Presence(field) => {
                if attributes.get(field).is_none_or(|v| v.is_blank()) {
                    errors.add_required(field.clone());
                }
            }
            Validator::Format { field, pattern } => {
                let Some(value) = attributes.get(field) else {
                    return;
                };
                if value.is_null() {
                    return;
                }
                if !value.as_str().is_some_and(|s| matches_pattern(s, pattern)) {
                    errors.add_pattern(field.clone(), pattern);
                }
            }
            Validator::Custom(check) => check(attributes, errors),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validator::Presence(field) => f.debug_tuple("Presence").field(field).finish(),
            Validator::Format { field, pattern } => f
                .debug_struct("Format")
                .field("field", field)
                .field("pattern", pattern)
                .finish(),
            Validator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
