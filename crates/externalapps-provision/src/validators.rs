//! Slug validators.
//!
//! Validators are pure: they look at a candidate string and either accept it or
//! return a [`SlugError`]. The allocator runs them before touching any backend,
//! so a malformed slug never consumes capacity.

use std::collections::HashSet;
use std::fmt;

use externalapps_core::{SlugError, Settings};
use once_cell::sync::Lazy;
use regex::Regex;

static SLUG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9_-]*[A-Za-z0-9])?$").expect("valid regex")
});

/// A trait for validating slug candidates.
///
/// # Examples
///
/// ```
/// use externalapps_provision::validators::{SlugFormatValidator, Validator};
///
/// let v = SlugFormatValidator;
/// assert!(v.validate("phys-101").is_ok());
/// assert!(v.validate("-phys").is_err());
/// ```
pub trait Validator: Send + Sync + fmt::Debug {
    /// Validates the given candidate, returning an error if invalid.
    fn validate(&self, value: &str) -> Result<(), SlugError>;

    /// Returns a human-readable name for this validator.
    fn name(&self) -> &str;
}

/// Accepts letters, digits, hyphens and underscores, with no separator at
/// either end.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlugFormatValidator;

impl Validator for SlugFormatValidator {
    fn validate(&self, value: &str) -> Result<(), SlugError> {
        if SLUG_RE.is_match(value) {
            Ok(())
        } else {
            Err(SlugError::format(value))
        }
    }

    fn name(&self) -> &str {
        "SlugFormatValidator"
    }
}

/// Rejects slugs that collide, case-insensitively, with a reserved word.
#[derive(Debug, Clone, Default)]
pub struct ForbiddenWordsValidator {
    words: HashSet<String>,
}

impl ForbiddenWordsValidator {
    /// Creates a validator for the given word list.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Returns `true` if `word` is reserved.
    pub fn is_forbidden(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }
}

impl Validator for ForbiddenWordsValidator {
    fn validate(&self, value: &str) -> Result<(), SlugError> {
        if self.is_forbidden(value) {
            Err(SlugError::forbidden(value))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &str {
        "ForbiddenWordsValidator"
    }
}

/// The full slug check: format first, then the forbidden-word list.
#[derive(Debug, Clone, Default)]
pub struct SlugValidator {
    format: SlugFormatValidator,
    forbidden: ForbiddenWordsValidator,
}

impl SlugValidator {
    /// Creates a validator with the given forbidden words.
    pub fn new<I, S>(forbidden_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            format: SlugFormatValidator,
            forbidden: ForbiddenWordsValidator::new(forbidden_words),
        }
    }

    /// Builds the validator from `settings.forbidden_slugs`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.forbidden_slugs)
    }
}

impl Validator for SlugValidator {
    fn validate(&self, value: &str) -> Result<(), SlugError> {
        self.format.validate(value)?;
        self.forbidden.validate(value)
    }

    fn name(&self) -> &str {
        "SlugValidator"
    }
}

/// Checks `candidate` against the default format rule and `forbidden_words`.
pub fn validate_slug(candidate: &str, forbidden_words: &[&str]) -> Result<(), SlugError> {
    SlugValidator::new(forbidden_words).validate(candidate)
}
