//! Data types shared across the intake flow.
//!
//! JSON field names follow the camelCase keys the draft blob and the
//! submission store use (`firstName`, `cvUrls`, `uploadedFiles`, ...).

use crate::error::UploadError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Fields ───────────────────────────────────────────────────────────────

/// A field of the personal-info step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    FirstName,
    LastName,
    DateOfBirth,
    Address,
    Phone,
    Linkedin,
    PreferredLanguage,
    Cv,
    /// The optional email of the final step; not part of [`FieldName::ORDER`].
    Email,
}

impl FieldName {
    /// Validation and focus order of the personal-info step.
    pub const ORDER: [FieldName; 8] = [
        FieldName::FirstName,
        FieldName::LastName,
        FieldName::DateOfBirth,
        FieldName::Address,
        FieldName::Phone,
        FieldName::Linkedin,
        FieldName::PreferredLanguage,
        FieldName::Cv,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::FirstName => "firstName",
            FieldName::LastName => "lastName",
            FieldName::DateOfBirth => "dateOfBirth",
            FieldName::Address => "address",
            FieldName::Phone => "phone",
            FieldName::Linkedin => "linkedin",
            FieldName::PreferredLanguage => "preferredLanguage",
            FieldName::Cv => "cv",
            FieldName::Email => "email",
        }
    }

    /// First name and last name share the input-time character filter.
    pub fn is_name(self) -> bool {
        matches!(self, FieldName::FirstName | FieldName::LastName)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldName::ORDER
            .into_iter()
            .chain([FieldName::Email])
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}

// ── Preferred language ───────────────────────────────────────────────────

/// The closed set of selectable languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredLanguage {
    #[default]
    English,
    Spanish,
    ChineseSimplified,
    French,
    Russian,
    Hindi,
    Korean,
    #[serde(rename = "67")]
    SixtySeven,
}

impl PreferredLanguage {
    pub const ALL: [PreferredLanguage; 8] = [
        PreferredLanguage::English,
        PreferredLanguage::Spanish,
        PreferredLanguage::ChineseSimplified,
        PreferredLanguage::French,
        PreferredLanguage::Russian,
        PreferredLanguage::Hindi,
        PreferredLanguage::Korean,
        PreferredLanguage::SixtySeven,
    ];

    /// The option value stored in the form.
    pub fn code(self) -> &'static str {
        match self {
            PreferredLanguage::English => "english",
            PreferredLanguage::Spanish => "spanish",
            PreferredLanguage::ChineseSimplified => "chinese_simplified",
            PreferredLanguage::French => "french",
            PreferredLanguage::Russian => "russian",
            PreferredLanguage::Hindi => "hindi",
            PreferredLanguage::Korean => "korean",
            PreferredLanguage::SixtySeven => "67",
        }
    }

    /// Human-readable option label.
    pub fn label(self) -> &'static str {
        match self {
            PreferredLanguage::English => "English",
            PreferredLanguage::Spanish => "Spanish",
            PreferredLanguage::ChineseSimplified => "Chinese (simplified)",
            PreferredLanguage::French => "French",
            PreferredLanguage::Russian => "Russian",
            PreferredLanguage::Hindi => "Hindi",
            PreferredLanguage::Korean => "Korean",
            PreferredLanguage::SixtySeven => "67",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        PreferredLanguage::ALL.into_iter().find(|l| l.code() == code)
    }
}

// ── Form data ────────────────────────────────────────────────────────────

/// Raw values of the personal-info step as the user typed them.
///
/// `None` means "never set", which matters when merging a restored draft:
/// only fields present in the draft overwrite the current values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl FormData {
    /// Current value of a text field; empty when unset. `Cv` has no text value.
    pub fn value(&self, field: FieldName) -> &str {
        let v = match field {
            FieldName::FirstName => &self.first_name,
            FieldName::LastName => &self.last_name,
            FieldName::DateOfBirth => &self.date_of_birth,
            FieldName::Address => &self.address,
            FieldName::Phone => &self.phone,
            FieldName::Linkedin => &self.linkedin,
            FieldName::PreferredLanguage => &self.preferred_language,
            FieldName::Email => &self.email,
            FieldName::Cv => return "",
        };
        v.as_deref().unwrap_or("")
    }

    pub fn set(&mut self, field: FieldName, value: impl Into<String>) {
        let value = Some(value.into());
        match field {
            FieldName::FirstName => self.first_name = value,
            FieldName::LastName => self.last_name = value,
            FieldName::DateOfBirth => self.date_of_birth = value,
            FieldName::Address => self.address = value,
            FieldName::Phone => self.phone = value,
            FieldName::Linkedin => self.linkedin = value,
            FieldName::PreferredLanguage => self.preferred_language = value,
            FieldName::Email => self.email = value,
            FieldName::Cv => {}
        }
    }

    /// Overlay every field that is set in `other`.
    pub fn merge_from(&mut self, other: FormData) {
        fn take(dst: &mut Option<String>, src: Option<String>) {
            if src.is_some() {
                *dst = src;
            }
        }
        take(&mut self.first_name, other.first_name);
        take(&mut self.last_name, other.last_name);
        take(&mut self.date_of_birth, other.date_of_birth);
        take(&mut self.address, other.address);
        take(&mut self.phone, other.phone);
        take(&mut self.linkedin, other.linkedin);
        take(&mut self.preferred_language, other.preferred_language);
        take(&mut self.email, other.email);
    }

    /// Build the record handed to the submission store.
    pub fn to_submission(
        &self,
        cv_urls: Vec<String>,
        user_id: Option<String>,
        submitted_at: DateTime<Utc>,
    ) -> NewSubmission {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        NewSubmission {
            first_name: self.value(FieldName::FirstName).trim().to_string(),
            last_name: self.value(FieldName::LastName).trim().to_string(),
            date_of_birth: self.value(FieldName::DateOfBirth).to_string(),
            phone: self.value(FieldName::Phone).trim().to_string(),
            address: self.value(FieldName::Address).to_string(),
            linkedin: non_empty(&self.linkedin),
            preferred_language: PreferredLanguage::from_code(
                self.value(FieldName::PreferredLanguage),
            )
            .unwrap_or_default(),
            cv_urls,
            email: non_empty(&self.email),
            user_id,
            submitted_at,
        }
    }
}

// ── Date-of-birth selectors ──────────────────────────────────────────────

/// Day/month/year selector state behind the composite date-of-birth value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DobParts {
    pub day: Option<u32>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl DobParts {
    pub const DAYS: std::ops::RangeInclusive<u32> = 1..=31;
    pub const MONTHS: std::ops::RangeInclusive<u32> = 1..=12;

    /// Year options, newest first.
    pub fn year_options() -> impl Iterator<Item = i32> {
        (1950..=2020).rev()
    }

    /// `YYYY-MM-DD`, only once all three selectors hold a value.
    pub fn compose(&self) -> Option<String> {
        match (self.year, self.month, self.day) {
            (Some(y), Some(m), Some(d)) => Some(format!("{y:04}-{m:02}-{d:02}")),
            _ => None,
        }
    }

    /// Split a stored `YYYY-MM-DD` value back into selector state.
    pub fn split(value: &str) -> Option<DobParts> {
        let mut parts = value.split('-');
        let (y, m, d) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        Some(DobParts {
            year: y.parse().ok(),
            month: m.parse().ok(),
            day: d.parse().ok(),
        })
    }
}

// ── Uploads ──────────────────────────────────────────────────────────────

/// A file picked by the user, bytes already read into memory.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Tracked state of one selected file.
///
/// The record never holds the file bytes; those live only inside the
/// transfer task, so a serialised record is already the sanitised draft form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: String,
    pub name: String,
    pub size: u64,
    /// 0–100; reaches 100 only together with `url`.
    pub progress: u8,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<UploadError>,
    /// A transfer task is still attached to this record.
    #[serde(skip)]
    pub(crate) in_flight: bool,
}

impl UploadRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            progress: 0,
            url: None,
            error: None,
            in_flight: false,
        }
    }

    /// Strictly between 0 and 100 and not failed.
    pub fn is_mid_progress(&self) -> bool {
        self.error.is_none() && self.progress > 0 && self.progress < 100
    }

    pub fn is_done(&self) -> bool {
        self.progress == 100 && self.url.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.is_done() || self.error.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Human-readable file size for the file list.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 KB".to_string();
    }
    let kb = bytes as f64 / 1024.0;
    if kb < 1024.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{:.2} MB", kb / 1024.0)
    }
}

// ── Submissions ──────────────────────────────────────────────────────────

/// A submission before the store assigns its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubmission {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub preferred_language: PreferredLanguage,
    #[serde(default)]
    pub cv_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// `submission_{id}.pdf`
pub fn document_filename(id: &str) -> String {
    format!("submission_{id}.pdf")
}

/// A stored submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(flatten)]
    pub data: NewSubmission,
}

impl Submission {
    /// Download name of the exported document.
    pub fn document_filename(&self) -> String {
        document_filename(&self.id)
    }

    /// Last eight characters of the identifier, for list headings.
    pub fn short_id(&self) -> &str {
        let start = self
            .id
            .char_indices()
            .rev()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(0);
        &self.id[start..]
    }
}

// ── Draft ────────────────────────────────────────────────────────────────

/// Locally persisted snapshot of the personal-info step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(flatten)]
    pub form: FormData,
    #[serde(default)]
    pub cv_urls: Vec<String>,
    #[serde(default)]
    pub uploaded_files: Vec<UploadRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_matches_focus_order() {
        let names: Vec<&str> = FieldName::ORDER.iter().map(|f| f.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "firstName",
                "lastName",
                "dateOfBirth",
                "address",
                "phone",
                "linkedin",
                "preferredLanguage",
                "cv"
            ]
        );
        assert_eq!("phone".parse::<FieldName>(), Ok(FieldName::Phone));
        assert_eq!("email".parse::<FieldName>(), Ok(FieldName::Email));
        assert!("gender".parse::<FieldName>().is_err());
    }

    #[test]
    fn language_codes() {
        assert_eq!(
            PreferredLanguage::from_code("chinese_simplified"),
            Some(PreferredLanguage::ChineseSimplified)
        );
        assert_eq!(PreferredLanguage::from_code("67"), Some(PreferredLanguage::SixtySeven));
        assert_eq!(PreferredLanguage::from_code("klingon"), None);
        assert_eq!(PreferredLanguage::default(), PreferredLanguage::English);
        let json = serde_json::to_string(&PreferredLanguage::SixtySeven).unwrap();
        assert_eq!(json, "\"67\"");
    }

    #[test]
    fn dob_compose_requires_all_parts() {
        let mut dob = DobParts::default();
        dob.day = Some(2);
        dob.month = Some(5);
        assert_eq!(dob.compose(), None);
        dob.year = Some(1990);
        assert_eq!(dob.compose().as_deref(), Some("1990-05-02"));
    }

    #[test]
    fn dob_split_reverses_compose() {
        let dob = DobParts::split("1990-05-02").expect("three parts");
        assert_eq!(dob.year, Some(1990));
        assert_eq!(dob.month, Some(5));
        assert_eq!(dob.day, Some(2));
        assert!(DobParts::split("1990-05").is_none());
    }

    #[test]
    fn year_options_span_1950_to_2020() {
        let years: Vec<i32> = DobParts::year_options().collect();
        assert_eq!(years.first(), Some(&2020));
        assert_eq!(years.last(), Some(&1950));
        assert_eq!(years.len(), 71);
    }

    #[test]
    fn merge_keeps_fields_missing_from_draft() {
        let mut current = FormData {
            email: Some("ana@example.com".into()),
            first_name: Some("An".into()),
            ..Default::default()
        };
        let draft = FormData {
            first_name: Some("Ana".into()),
            phone: Some("+1 555 123 4567".into()),
            ..Default::default()
        };
        current.merge_from(draft);
        assert_eq!(current.value(FieldName::FirstName), "Ana");
        assert_eq!(current.value(FieldName::Phone), "+1 555 123 4567");
        assert_eq!(current.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 KB");
        assert_eq!(format_bytes(512), "0.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn record_state_predicates() {
        let mut r = UploadRecord::new("1_0_cv.pdf", "cv.pdf", 10);
        assert!(!r.is_mid_progress());
        r.progress = 40;
        assert!(r.is_mid_progress());
        r.error = Some(UploadError::Interrupted);
        assert!(!r.is_mid_progress());
        assert!(r.is_terminal());
    }

    #[test]
    fn draft_json_uses_camel_case_and_skips_transfer_state() {
        let mut record = UploadRecord::new("1_0_cv.pdf", "cv.pdf", 10);
        record.in_flight = true;
        let draft = Draft {
            form: FormData {
                first_name: Some("Ana".into()),
                ..Default::default()
            },
            cv_urls: vec![],
            uploaded_files: vec![record],
        };
        let json = serde_json::to_string(&draft).unwrap();
        assert!(json.contains("\"firstName\":\"Ana\""), "got: {json}");
        assert!(json.contains("\"uploadedFiles\""), "got: {json}");
        assert!(!json.contains("inFlight"), "got: {json}");
        let back: Draft = serde_json::from_str(&json).unwrap();
        assert!(!back.uploaded_files[0].in_flight);
    }

    #[test]
    fn short_id_takes_last_eight_chars() {
        let s = Submission {
            id: "abcdefghijkl".into(),
            data: FormData::default().to_submission(vec![], None, Utc::now()),
        };
        assert_eq!(s.short_id(), "efghijkl");
        assert_eq!(s.document_filename(), "submission_abcdefghijkl.pdf");
    }
}
