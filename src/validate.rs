//! Field validation for the personal-info and email steps.
//!
//! [`validate`] is a pure function: the same field, value and upload state
//! always produce the same message. Input-time filtering (names) happens
//! before validation runs via [`sanitize_name`], so stray characters are
//! stripped rather than reported.
//!
//! [`FieldFeedback`] keeps the per-field error and "touched" flags the caller
//! needs so errors only show after the user has interacted with a field.

use crate::error::UploadError;
use crate::model::{FieldName, FormData, PreferredLanguage};
use crate::upload::UploadSet;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

pub const MSG_REQUIRED: &str = "Please fill out this field.";
pub const MSG_NAME_TOO_SHORT: &str = "Must be at least 2 characters.";
pub const MSG_PHONE: &str = "Enter a valid phone number.";
pub const MSG_DATE: &str = "Enter a valid date.";
pub const MSG_YEAR_RANGE: &str = "Year must be between 1930 and 2020.";
pub const MSG_LINKEDIN: &str = "Enter a valid LinkedIn URL.";
pub const MSG_LANGUAGE: &str = "Select a valid language.";
pub const MSG_CV_TOO_LARGE: &str = "One or more files exceed the 10 MB limit.";
pub const MSG_CV_FAILED: &str = "One or more files failed to upload.";
pub const MSG_CV_IN_PROGRESS: &str = "Please wait for uploads to finish.";
pub const MSG_CV_TIMEOUT: &str = "Upload timeout. Please try again.";
pub const MSG_EMAIL: &str = "Enter a valid email.";

pub const MIN_BIRTH_YEAR: i32 = 1930;
pub const MAX_BIRTH_YEAR: i32 = 2020;

// ASCII digits only; `\d` would also accept other scripts' numerals.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+0-9\s()-]{7,20}$").unwrap());
static LINKEDIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://(www\.)?linkedin\.com/.+").unwrap());
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").unwrap());
static NAME_DISALLOWED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z\- ]+").unwrap());

/// Validate one field. Returns the inline error message, or `None`.
///
/// `uploads` is only consulted for [`FieldName::Cv`]; for every other field
/// the value alone decides.
pub fn validate(field: FieldName, value: &str, uploads: &UploadSet) -> Option<Cow<'static, str>> {
    match field {
        FieldName::Cv => validate_cv(uploads),
        _ => validate_value(field, value).map(Cow::Borrowed),
    }
}

fn validate_value(field: FieldName, value: &str) -> Option<&'static str> {
    match field {
        FieldName::FirstName | FieldName::LastName => {
            let v = value.trim();
            if v.is_empty() {
                Some(MSG_REQUIRED)
            } else if v.chars().count() < 2 {
                Some(MSG_NAME_TOO_SHORT)
            } else {
                None
            }
        }
        FieldName::Phone => {
            if value.trim().is_empty() {
                Some(MSG_REQUIRED)
            } else if !PHONE_RE.is_match(value) {
                Some(MSG_PHONE)
            } else {
                None
            }
        }
        FieldName::DateOfBirth => validate_date_of_birth(value),
        FieldName::Address => None,
        FieldName::Linkedin => {
            if !value.is_empty() && !LINKEDIN_RE.is_match(value) {
                Some(MSG_LINKEDIN)
            } else {
                None
            }
        }
        FieldName::PreferredLanguage => {
            if !value.is_empty() && PreferredLanguage::from_code(value).is_none() {
                Some(MSG_LANGUAGE)
            } else {
                None
            }
        }
        FieldName::Cv => None,
        FieldName::Email => validate_email(value),
    }
}

fn validate_date_of_birth(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        return Some(MSG_REQUIRED);
    }
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) if value.len() == 10 => {
            if (MIN_BIRTH_YEAR..=MAX_BIRTH_YEAR).contains(&date.year()) {
                None
            } else {
                Some(MSG_YEAR_RANGE)
            }
        }
        _ => Some(MSG_DATE),
    }
}

/// CV message for a size rejection against `limit` bytes.
pub fn cv_too_large_message(limit: u64) -> Cow<'static, str> {
    let mb = limit / (1024 * 1024);
    if mb == 10 {
        Cow::Borrowed(MSG_CV_TOO_LARGE)
    } else {
        Cow::Owned(format!("One or more files exceed the {mb} MB limit."))
    }
}

fn validate_cv(uploads: &UploadSet) -> Option<Cow<'static, str>> {
    if uploads.cv_urls().is_empty() && uploads.is_empty() {
        return None;
    }
    let size_limit = uploads.records().iter().find_map(|r| match &r.error {
        Some(UploadError::TooLarge { limit, .. }) => Some(*limit),
        _ => None,
    });
    if let Some(limit) = size_limit {
        return Some(cv_too_large_message(limit));
    }
    if uploads.has_errors() {
        return Some(Cow::Borrowed(MSG_CV_FAILED));
    }
    if uploads.any_mid_progress() {
        return Some(Cow::Borrowed(MSG_CV_IN_PROGRESS));
    }
    None
}

/// Validate every personal-info field in focus order.
pub fn validate_all(form: &FormData, uploads: &UploadSet) -> Vec<(FieldName, Cow<'static, str>)> {
    FieldName::ORDER
        .into_iter()
        .filter_map(|f| validate(f, form.value(f), uploads).map(|msg| (f, msg)))
        .collect()
}

/// Optional email of the final step.
pub fn validate_email(email: &str) -> Option<&'static str> {
    if email.is_empty() || EMAIL_RE.is_match(email) {
        None
    } else {
        Some(MSG_EMAIL)
    }
}

/// Input-time filter for name fields: letters, hyphen and space only, no
/// leading whitespace. Trailing spaces survive until blur.
pub fn sanitize_name(raw: &str) -> String {
    let filtered = NAME_DISALLOWED_RE.replace_all(raw, "");
    filtered.trim_start().to_string()
}

// ── Feedback state ───────────────────────────────────────────────────────

/// Per-field error and touched flags.
#[derive(Debug, Clone, Default)]
pub struct FieldFeedback {
    errors: BTreeMap<FieldName, String>,
    touched: BTreeSet<FieldName>,
}

impl FieldFeedback {
    /// Record the latest validation result for a field.
    pub fn record(&mut self, field: FieldName, error: Option<&str>) {
        match error {
            Some(msg) => {
                self.errors.insert(field, msg.to_string());
            }
            None => {
                self.errors.remove(&field);
            }
        }
    }

    pub fn touch(&mut self, field: FieldName) {
        self.touched.insert(field);
    }

    pub fn touch_all(&mut self) {
        self.touched.extend(FieldName::ORDER);
    }

    pub fn is_touched(&self, field: FieldName) -> bool {
        self.touched.contains(&field)
    }

    /// The raw error, whether or not the field has been touched.
    pub fn error(&self, field: FieldName) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }

    /// The error to display: only once the field is touched.
    pub fn visible_error(&self, field: FieldName) -> Option<&str> {
        if self.is_touched(field) {
            self.error(field)
        } else {
            None
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Replace all errors with a full validation pass and mark every field touched.
    pub fn apply_full_pass<S: AsRef<str>>(&mut self, results: &[(FieldName, S)]) {
        self.errors = results
            .iter()
            .map(|(f, msg)| (*f, msg.as_ref().to_string()))
            .collect();
        self.touch_all();
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.touched.clear();
    }
}
