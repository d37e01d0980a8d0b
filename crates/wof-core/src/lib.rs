//! Core domain model for WOF: jobs, locations, search parameters.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "wof-core";

/// Provider tag carried by every aggregated job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    Forem,
    Adzuna,
}

impl JobSource {
    pub fn as_str(self) -> &'static str {
        match self {
            JobSource::Forem => "forem",
            JobSource::Adzuna => "adzuna",
        }
    }
}

/// A normalized job offer. Ids are provider-qualified and not globally
/// unique across providers; duplicates are detected by [`Job::dedupe_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub location: String,
    pub contract_type: String,
    pub publication_date: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: JobSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl Job {
    /// Case-insensitive duplicate signature: two jobs with the same key are
    /// the same offer regardless of id or source.
    pub fn dedupe_key(&self) -> String {
        [
            self.url.to_lowercase(),
            self.title.to_lowercase(),
            self.company.as_deref().unwrap_or_default().to_lowercase(),
            self.location.to_lowercase(),
        ]
        .join("|")
    }
}

/// Administrative hierarchy levels, serialized with the French category
/// labels the upstream nomenclature uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LocationKind {
    #[serde(rename = "Pays")]
    Country,
    #[serde(rename = "Régions")]
    Region,
    #[serde(rename = "Provinces")]
    Province,
    #[serde(rename = "Arrondissements")]
    District,
    #[serde(rename = "Communes")]
    Municipality,
    #[serde(rename = "Localités")]
    Locality,
}

impl LocationKind {
    pub const ALL: [LocationKind; 6] = [
        LocationKind::Country,
        LocationKind::Region,
        LocationKind::Province,
        LocationKind::District,
        LocationKind::Municipality,
        LocationKind::Locality,
    ];

    pub fn level(self) -> u8 {
        match self {
            LocationKind::Country => 0,
            LocationKind::Region => 1,
            LocationKind::Province => 2,
            LocationKind::District => 3,
            LocationKind::Municipality => 4,
            LocationKind::Locality => 5,
        }
    }

    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(LocationKind::Country),
            1 => Some(LocationKind::Region),
            2 => Some(LocationKind::Province),
            3 => Some(LocationKind::District),
            4 => Some(LocationKind::Municipality),
            5 => Some(LocationKind::Locality),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LocationKind::Country => "Pays",
            LocationKind::Region => "Régions",
            LocationKind::Province => "Provinces",
            LocationKind::District => "Arrondissements",
            LocationKind::Municipality => "Communes",
            LocationKind::Locality => "Localités",
        }
    }
}

/// One entry of the administrative location hierarchy. `kind` is optional
/// only at the external-params boundary; cache snapshots always set it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<LocationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl LocationEntry {
    /// Uniqueness key inside one hierarchy snapshot.
    pub fn snapshot_key(&self) -> String {
        let kind = self.kind.map(LocationKind::label).unwrap_or("?");
        format!("{}::{}", kind, self.name.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BooleanMode {
    #[serde(rename = "AND")]
    And,
    #[default]
    #[serde(rename = "OR")]
    Or,
}

/// Search intent shared by every provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub keywords: Vec<String>,
    pub locations: Vec<LocationEntry>,
    pub boolean_mode: BooleanMode,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Result of one provider's search. Providers self-contain their failures
/// and return an empty result instead of erroring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderSearch {
    pub jobs: Vec<Job>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferHighlight {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSection {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OfferDetailsSource {
    #[serde(rename = "forem-detail-api")]
    DetailApi,
    #[serde(rename = "odwb-fallback")]
    DatasetFallback,
    #[serde(rename = "none")]
    None,
}

/// Normalized per-offer detail payload. Always well-formed: a fully failed
/// lookup yields [`OfferDetails::empty`], never an error shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferDetails {
    pub offer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub highlights: Vec<OfferHighlight>,
    pub sections: Vec<OfferSection>,
    pub source: OfferDetailsSource,
}

impl OfferDetails {
    pub fn empty(offer_id: impl Into<String>) -> Self {
        Self {
            offer_id: offer_id.into(),
            description: None,
            highlights: Vec::new(),
            sections: Vec::new(),
            source: OfferDetailsSource::None,
        }
    }

    pub fn has_content(&self) -> bool {
        self.description.is_some() || !self.highlights.is_empty() || !self.sections.is_empty()
    }
}

/// Millisecond timestamp of a publication date. Accepts RFC 3339 and bare
/// `YYYY-MM-DD`; anything else sorts as the epoch minimum.
pub fn publication_timestamp(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return parsed.timestamp_millis();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return parsed.and_utc().timestamp_millis();
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return parsed
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0);
    }
    0
}

/// Drop duplicate jobs, keeping the first occurrence of each signature.
pub fn dedupe_jobs(jobs: Vec<Job>) -> Vec<Job> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(jobs.len());
    for job in jobs {
        if seen.insert(job.dedupe_key()) {
            unique.push(job);
        }
    }
    unique
}

/// Merge step shared by the aggregation service: signature dedupe, then a
/// stable sort by publication date descending (first occurrence wins ties).
pub fn dedupe_and_sort_jobs(jobs: Vec<Job>) -> Vec<Job> {
    let mut unique = dedupe_jobs(jobs);
    unique.sort_by_key(|job| std::cmp::Reverse(publication_timestamp(&job.publication_date)));
    unique
}

/// Strip a leading 4-digit postal prefix: `"4800 Verviers"` → `"Verviers"`.
pub fn strip_postal_prefix(name: &str) -> &str {
    let trimmed = name.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() > 5 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b' ' {
        trimmed[5..].trim_start()
    } else {
        trimmed
    }
}

/// The leading postal code of a display name, when it carries one.
pub fn leading_postal_code(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() > 5 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b' ' {
        Some(&trimmed[..4])
    } else {
        None
    }
}

/// Lowercased, diacritic-folded form used for French-aware ordering.
/// Covers the accented letters occurring in Belgian place names.
pub fn french_fold(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            _ => c,
        })
        .collect()
}

pub fn compare_french(a: &str, b: &str) -> Ordering {
    french_fold(a).cmp(&french_fold(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job(id: &str, url: &str) -> Job {
        Job {
            id: id.to_string(),
            title: "Titre".to_string(),
            company: None,
            location: "Liège".to_string(),
            contract_type: "CDI".to_string(),
            publication_date: "2026-01-01".to_string(),
            url: url.to_string(),
            description: None,
            source: JobSource::Forem,
            pdf_url: None,
        }
    }

    #[test]
    fn dedupe_uses_url_title_company_location_signature() {
        let mut a = make_job("1", "https://x");
        a.title = "Dev".to_string();
        a.company = Some("ACME".to_string());
        let mut b = make_job("2", "https://X");
        b.title = "DEV".to_string();
        b.company = Some("acme".to_string());
        let mut c = make_job("3", "https://y");
        c.title = "QA".to_string();

        let result = dedupe_and_sort_jobs(vec![a, b, c]);
        assert_eq!(result.len(), 2);
        assert_eq!(
            result.iter().map(|j| j.id.as_str()).collect::<Vec<_>>(),
            vec!["1", "3"]
        );
    }

    #[test]
    fn sorts_by_publication_date_descending() {
        let mut a = make_job("a", "https://a");
        a.publication_date = "2026-01-01".to_string();
        let mut b = make_job("b", "https://b");
        b.publication_date = "2026-03-01".to_string();
        let mut c = make_job("c", "https://c");
        c.publication_date = "2025-12-01".to_string();

        let result = dedupe_and_sort_jobs(vec![a, b, c]);
        assert_eq!(
            result.iter().map(|j| j.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "a", "c"]
        );
    }

    #[test]
    fn unparsable_dates_sort_as_oldest() {
        let mut fresh = make_job("fresh", "https://a");
        fresh.publication_date = "2026-02-01T08:30:00+01:00".to_string();
        let mut broken = make_job("broken", "https://b");
        broken.publication_date = "date inconnue".to_string();

        let result = dedupe_and_sort_jobs(vec![broken, fresh]);
        assert_eq!(result[0].id, "fresh");
        assert_eq!(result[1].id, "broken");
    }

    #[test]
    fn dedupe_and_sort_is_idempotent() {
        let mut a = make_job("1", "https://x");
        a.publication_date = "2026-02-10".to_string();
        let b = make_job("2", "https://x");
        let mut c = make_job("3", "https://z");
        c.publication_date = "garbage".to_string();

        let once = dedupe_and_sort_jobs(vec![a, b, c]);
        let twice = dedupe_and_sort_jobs(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn publication_timestamp_accepts_known_shapes() {
        assert!(publication_timestamp("2026-01-15") > 0);
        assert!(publication_timestamp("2026-01-15T10:00:00+00:00") > 0);
        assert!(publication_timestamp("2026-01-15T10:00:00") > 0);
        assert_eq!(publication_timestamp("n'importe quoi"), 0);
        assert_eq!(publication_timestamp(""), 0);
    }

    #[test]
    fn postal_prefix_helpers() {
        assert_eq!(strip_postal_prefix("4800 Verviers"), "Verviers");
        assert_eq!(strip_postal_prefix("Verviers"), "Verviers");
        assert_eq!(strip_postal_prefix("123 Rue"), "123 Rue");
        assert_eq!(leading_postal_code("4800 Verviers"), Some("4800"));
        assert_eq!(leading_postal_code("Verviers"), None);
    }

    #[test]
    fn french_fold_orders_accents_with_base_letters() {
        let mut names = vec!["Évelette", "Anvers", "Éghezée", "Zolder"];
        names.sort_by(|a, b| compare_french(a, b));
        assert_eq!(names, vec!["Anvers", "Éghezée", "Évelette", "Zolder"]);
    }

    #[test]
    fn location_kind_level_roundtrip() {
        for kind in LocationKind::ALL {
            assert_eq!(LocationKind::from_level(kind.level() as i64), Some(kind));
        }
        assert_eq!(LocationKind::from_level(6), None);
    }

    #[test]
    fn search_params_accept_camel_case_wire_shape() {
        let params: SearchParams = serde_json::from_str(
            r#"{"keywords":["infirmier"],"locations":[{"id":"lg","name":"Liège","type":"Provinces"}],"booleanMode":"AND"}"#,
        )
        .expect("params");
        assert_eq!(params.keywords, vec!["infirmier"]);
        assert_eq!(params.boolean_mode, BooleanMode::And);
        assert_eq!(params.locations[0].kind, Some(LocationKind::Province));
    }
}
