//! Job providers: Forem registry client, Adzuna aggregator, fan-out service.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;
use wof_core::{
    dedupe_and_sort_jobs, dedupe_jobs, leading_postal_code, strip_postal_prefix, BooleanMode, Job,
    JobSource, LocationEntry, LocationKind, ProviderSearch, SearchParams,
};
use wof_locations::LocationCache;
use wof_storage::{FetchRequest, HttpFetcher};

pub const CRATE_NAME: &str = "wof-providers";

pub const FOREM_OFFER_LINK_BASE: &str = "https://www.leforem.be/recherche-offres/offre-detail";
pub const DEFAULT_ADZUNA_BASE_URL: &str = "https://api.adzuna.com/v1/api/jobs";

/// Quota protection: distinct place-scoped Adzuna calls per search.
pub const ADZUNA_MAX_PLACE_QUERIES: usize = 5;

/// Capability interface of one job source. Implementations self-contain
/// their failures: a broken upstream yields an empty result, never an error.
#[async_trait]
pub trait JobProvider: Send + Sync {
    fn id(&self) -> &'static str;
    async fn search(&self, params: &SearchParams) -> ProviderSearch;
}

// ---------------------------------------------------------------------------
// ODS where-clause building
// ---------------------------------------------------------------------------

/// Escape a user-supplied fragment for the ODS predicate language. The
/// clause is interpolated into a request query string, so this is a
/// correctness boundary: backslashes first, then double quotes.
pub fn escape_ods(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn search_clause(text: &str) -> String {
    format!("search(\"{}\")", escape_ods(text))
}

fn in_clause(field: &str, values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", escape_ods(v)))
        .collect();
    format!("{field} in ({})", quoted.join(", "))
}

/// The dataset stores macro-regions under canonical uppercase labels.
fn canonical_region(name: &str) -> String {
    match name {
        "Wallonie" => "RÉGION WALLONNE".to_string(),
        "Flandre" => "RÉGION FLAMANDE".to_string(),
        "Région de Bruxelles-Capitale" => "RÉGION DE BRUXELLES-CAPITALE".to_string(),
        other => other.to_string(),
    }
}

fn strip_prefix_ci<'a>(value: &'a str, prefixes: &[&str]) -> &'a str {
    let lower = value.to_lowercase();
    for prefix in prefixes {
        if lower.starts_with(prefix) {
            return value[prefix.len()..].trim_start();
        }
    }
    value
}

/// Postal-stripped, prefix-stripped, region-normalized label for free-text
/// fallback clauses.
fn cleaned_label(name: &str) -> String {
    let mapped = canonical_region(name.trim());
    let stripped = strip_postal_prefix(&mapped);
    strip_prefix_ci(
        stripped,
        &[
            "arrondissement de ",
            "arrondissement du ",
            "arrondissement d'",
            "province de ",
            "province du ",
        ],
    )
    .trim()
    .to_string()
}

/// Localities belonging to a district's 2-digit province prefix.
///
/// Convention inferred from the nomenclature data: a locality's 5-digit
/// code starts with the 2-digit group of its parent district's province.
/// Not verified against an authoritative mapping; kept in one place so a
/// correction touches only this function.
fn district_localities<'a>(hierarchy: &'a [LocationEntry], prefix: &str) -> Vec<&'a LocationEntry> {
    hierarchy
        .iter()
        .filter(|entry| {
            entry.kind == Some(LocationKind::Locality)
                && entry.postal_code.is_some()
                && entry
                    .code
                    .as_deref()
                    .map(|code| code.starts_with(prefix))
                    .unwrap_or(false)
        })
        .collect()
}

fn push_unique(values: &mut Vec<String>, seen: &mut HashSet<String>, value: String) {
    if !value.is_empty() && seen.insert(value.clone()) {
        values.push(value);
    }
}

fn district_clause(entry: &LocationEntry, hierarchy: &[LocationEntry]) -> String {
    let code = entry.code.as_deref().unwrap_or("");
    if code.len() == 5 && code.bytes().all(|b| b.is_ascii_digit()) {
        let prefix = &code[..2];
        let localities = district_localities(hierarchy, prefix);

        let mut names = Vec::new();
        let mut name_seen = HashSet::new();
        let mut postals = Vec::new();
        let mut postal_seen = HashSet::new();

        for locality in localities {
            // The upstream is case-inconsistent: cover both variants.
            let stripped = strip_postal_prefix(&locality.name).to_string();
            let upper = stripped.to_uppercase();
            push_unique(&mut names, &mut name_seen, stripped);
            push_unique(&mut names, &mut name_seen, upper);
            if let Some(postal) = &locality.postal_code {
                push_unique(&mut postals, &mut postal_seen, postal.clone());
            }
        }

        if !names.is_empty() && !postals.is_empty() {
            return format!(
                "({} OR {})",
                in_clause("lieuxtravaillocalite", &names),
                in_clause("lieuxtravailcodepostal", &postals)
            );
        }
    }

    search_clause(&cleaned_label(&entry.name))
}

fn locality_clause(entry: &LocationEntry) -> String {
    let stripped = strip_postal_prefix(&entry.name).to_string();
    let postal = entry
        .postal_code
        .clone()
        .filter(|p| !p.trim().is_empty())
        .or_else(|| leading_postal_code(&entry.name).map(str::to_string));

    let mut names = vec![stripped.clone()];
    let upper = stripped.to_uppercase();
    if upper != stripped {
        names.push(upper);
    }
    let name_part = in_clause("lieuxtravaillocalite", &names);

    match postal {
        Some(postal) => format!(
            "({} OR {})",
            name_part,
            in_clause("lieuxtravailcodepostal", &[postal])
        ),
        None => name_part,
    }
}

/// Filter predicate for one selected location. First matching case wins;
/// an unknown kind still yields a free-text clause so the selection is
/// never silently dropped. Returns `None` only for blank names.
pub fn location_clause(entry: &LocationEntry, hierarchy: &[LocationEntry]) -> Option<String> {
    let name = entry.name.trim();
    if name.is_empty() {
        return None;
    }

    let clause = match entry.kind {
        Some(LocationKind::Country) => {
            format!("lieuxtravailregion = \"{}\"", escape_ods(name))
        }
        Some(LocationKind::Region) => in_clause("lieuxtravailregion", &[canonical_region(name)]),
        Some(LocationKind::Province) => {
            let label = if name.to_lowercase().starts_with("province") {
                name.to_string()
            } else {
                format!("Province de {name}")
            };
            in_clause("lieuxtravailregion", &[label])
        }
        Some(LocationKind::District) => district_clause(entry, hierarchy),
        Some(LocationKind::Municipality) | Some(LocationKind::Locality) => locality_clause(entry),
        None => search_clause(&cleaned_label(name)),
    };
    Some(clause)
}

/// Full ODS `where` clause: keyword group joined by the query's boolean
/// mode, location group OR'd, both groups AND'd. `None` when nothing
/// filters.
pub fn build_where_clause(params: &SearchParams, hierarchy: &[LocationEntry]) -> Option<String> {
    let mut groups = Vec::new();

    let keywords: Vec<String> = params
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(search_clause)
        .collect();
    if !keywords.is_empty() {
        let joiner = match params.boolean_mode {
            BooleanMode::And => " AND ",
            BooleanMode::Or => " OR ",
        };
        groups.push(format!("({})", keywords.join(joiner)));
    }

    let locations: Vec<String> = params
        .locations
        .iter()
        .filter_map(|entry| location_clause(entry, hierarchy))
        .collect();
    match locations.len() {
        0 => {}
        1 => groups.push(locations.into_iter().next().expect("one location clause")),
        _ => groups.push(format!("({})", locations.join(" OR "))),
    }

    if groups.is_empty() {
        None
    } else {
        Some(groups.join(" AND "))
    }
}

// ---------------------------------------------------------------------------
// Forem registry client + paginated fetch engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ForemConfig {
    pub dataset_url: String,
    /// Upstream caps a single page at this many rows.
    pub page_size: usize,
    pub default_limit: usize,
    /// Hard ceiling on rows fetched per search, respecting the upstream
    /// offset window.
    pub fetch_ceiling: usize,
    pub page_concurrency: usize,
}

impl Default for ForemConfig {
    fn default() -> Self {
        Self {
            dataset_url: wof_locations::DEFAULT_DATASET_URL.to_string(),
            page_size: 100,
            default_limit: 1000,
            fetch_ceiling: 9900,
            page_concurrency: 4,
        }
    }
}

impl ForemConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dataset_url: std::env::var("WOF_FOREM_DATASET_URL").unwrap_or(defaults.dataset_url),
            page_size: env_usize("WOF_PAGE_SIZE", defaults.page_size),
            default_limit: env_usize("WOF_DEFAULT_LIMIT", defaults.default_limit),
            fetch_ceiling: env_usize("WOF_FETCH_CEILING", defaults.fetch_ceiling),
            page_concurrency: env_usize("WOF_PAGE_CONCURRENCY", defaults.page_concurrency),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// One raw dataset row. The upstream schema drifts; everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawForemRecord {
    pub numerooffreforem: Option<String>,
    pub titreoffre: Option<String>,
    pub nomemployeur: Option<String>,
    pub lieuxtravaillocalite: Vec<String>,
    pub typecontrat: Option<String>,
    pub datedebutdiffusion: Option<String>,
    pub url: Option<String>,
    pub metier: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForemPage {
    results: Vec<RawForemRecord>,
    total_count: u64,
}

/// Map a dataset row to a job. Missing fields degrade to placeholders so a
/// partially-filled row never blocks the result list.
pub fn map_forem_record(record: RawForemRecord) -> Job {
    let id = record
        .numerooffreforem
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let localities: Vec<&str> = record
        .lieuxtravaillocalite
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    let location = if localities.is_empty() {
        "Wallonie".to_string()
    } else {
        localities.join(", ")
    };

    let url = record
        .url
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| format!("{FOREM_OFFER_LINK_BASE}/{id}"));

    Job {
        title: record
            .titreoffre
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "Poste non spécifié".to_string()),
        company: record.nomemployeur.filter(|v| !v.trim().is_empty()),
        location,
        contract_type: record
            .typecontrat
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "Non spécifié".to_string()),
        publication_date: record
            .datedebutdiffusion
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| Utc::now().to_rfc3339()),
        url,
        description: record.metier.filter(|v| !v.trim().is_empty()),
        source: JobSource::Forem,
        pdf_url: None,
        id,
    }
}

/// Effective result size once the upstream reports its total.
pub fn capped_total(total_count: u64, offset: usize, limit: usize) -> usize {
    let available = total_count.saturating_sub(offset as u64);
    (available.min(limit as u64)) as usize
}

/// Offsets of the pages still needed after the first page.
pub fn remaining_page_offsets(
    offset: usize,
    first_page_len: usize,
    capped: usize,
    page_size: usize,
) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut have = first_page_len;
    let mut next = offset + first_page_len;
    while have < capped {
        offsets.push(next);
        have += page_size;
        next += page_size;
    }
    offsets
}

/// Client of the public dataset API. Satisfies limits above the upstream
/// page cap by windowed pagination: first page, then bounded-concurrency
/// batches reassembled in ascending-offset order.
pub struct ForemClient {
    config: ForemConfig,
    http: Arc<HttpFetcher>,
    locations: Arc<LocationCache>,
}

impl ForemClient {
    pub fn new(config: ForemConfig, http: Arc<HttpFetcher>, locations: Arc<LocationCache>) -> Self {
        Self {
            config,
            http,
            locations,
        }
    }

    async fn fetch_page(
        &self,
        where_clause: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Option<ForemPage> {
        let mut query: Vec<(&str, String)> = vec![
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("order_by", "datedebutdiffusion desc".to_string()),
        ];
        if let Some(clause) = where_clause {
            query.push(("where", clause.to_string()));
        }

        let response = self
            .http
            .fetch(FetchRequest {
                source_id: "forem",
                url: &self.config.dataset_url,
                query: &query,
                headers: &[("accept", "application/json")],
            })
            .await;

        match response {
            Ok(response) => match response.json::<ForemPage>() {
                Ok(page) => Some(page),
                Err(err) => {
                    warn!(offset, error = %err, "forem page returned malformed json");
                    None
                }
            },
            Err(err) => {
                warn!(offset, error = %err, "forem page fetch failed");
                None
            }
        }
    }

    pub async fn search(&self, params: &SearchParams) -> ProviderSearch {
        let hierarchy = self.locations.hierarchy().await;
        let where_clause = build_where_clause(params, &hierarchy.entries);
        let offset = params.offset.unwrap_or(0);
        let limit = params
            .limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.fetch_ceiling);

        let first_size = self.config.page_size.min(limit);
        let Some(first) = self.fetch_page(where_clause.as_deref(), first_size, offset).await
        else {
            return ProviderSearch::default();
        };

        let total = first.total_count;
        let capped = capped_total(total, offset, limit);
        let mut jobs: Vec<Job> = first.results.into_iter().map(map_forem_record).collect();
        let first_len = jobs.len();
        jobs.truncate(capped);

        // A short first page signals end-of-data; nothing more to fetch.
        if first_len >= first_size && jobs.len() < capped {
            let offsets = remaining_page_offsets(offset, first_len, capped, self.config.page_size);
            for batch in offsets.chunks(self.config.page_concurrency.max(1)) {
                // join_all resolves in input order, which keeps the batch in
                // ascending-offset order whatever the network does.
                let pages = join_all(batch.iter().map(|page_offset| {
                    self.fetch_page(where_clause.as_deref(), self.config.page_size, *page_offset)
                }))
                .await;
                for page in pages.into_iter().flatten() {
                    jobs.extend(page.results.into_iter().map(map_forem_record));
                }
            }
            jobs.truncate(capped);
        }

        ProviderSearch {
            jobs,
            total: total as usize,
        }
    }
}

#[async_trait]
impl JobProvider for ForemClient {
    fn id(&self) -> &'static str {
        "forem"
    }

    async fn search(&self, params: &SearchParams) -> ProviderSearch {
        ForemClient::search(self, params).await
    }
}

// ---------------------------------------------------------------------------
// Adzuna aggregator client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AdzunaConfig {
    pub enabled: bool,
    pub app_id: String,
    pub app_key: String,
    pub country: String,
    pub base_url: String,
}

impl Default for AdzunaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_id: String::new(),
            app_key: String::new(),
            country: "be".to_string(),
            base_url: DEFAULT_ADZUNA_BASE_URL.to_string(),
        }
    }
}

impl AdzunaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("ADZUNA_ENABLED")
                .map(|v| v == "true")
                .unwrap_or(false),
            app_id: std::env::var("ADZUNA_APP_ID")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            app_key: std::env::var("ADZUNA_APP_KEY")
                .map(|v| v.trim().to_string())
                .unwrap_or_default(),
            country: std::env::var("ADZUNA_COUNTRY")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.country),
            base_url: std::env::var("ADZUNA_BASE_URL").unwrap_or(defaults.base_url),
        }
    }

    /// Active only with the explicit flag plus both credentials.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.app_id.is_empty() && !self.app_key.is_empty()
    }
}

/// Search outcome with the explicit configuration-absent flag.
#[derive(Debug, Clone)]
pub struct AdzunaSearch {
    pub jobs: Vec<Job>,
    pub total: usize,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAdzunaCompany {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAdzunaLocation {
    pub display_name: Option<String>,
    pub area: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAdzunaCategory {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAdzunaResult {
    pub id: Option<JsonValue>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created: Option<String>,
    pub redirect_url: Option<String>,
    pub company: Option<RawAdzunaCompany>,
    pub location: Option<RawAdzunaLocation>,
    pub contract_type: Option<String>,
    pub contract_time: Option<String>,
    pub category: Option<RawAdzunaCategory>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdzunaPage {
    results: Vec<RawAdzunaResult>,
}

/// Provider-native place string for one selected location: postal and
/// administrative prefixes stripped, region names mapped to this provider's
/// vocabulary.
pub fn sanitize_place_name(entry: &LocationEntry) -> String {
    let no_postal = strip_postal_prefix(entry.name.trim());

    match entry.kind {
        Some(LocationKind::District) => strip_prefix_ci(
            no_postal,
            &[
                "arrondissement de ",
                "arrondissement du ",
                "arrondissement d'",
            ],
        )
        .trim()
        .to_string(),
        Some(LocationKind::Province) => {
            strip_prefix_ci(no_postal, &["province de ", "province du "])
                .trim()
                .to_string()
        }
        Some(LocationKind::Region) => {
            let folded = wof_core::french_fold(no_postal);
            if folded.contains("bruxelles") {
                "Brussels".to_string()
            } else if folded.contains("flandre") {
                "Flanders".to_string()
            } else if folded.contains("wallonie") {
                "Wallonia".to_string()
            } else {
                no_postal.to_string()
            }
        }
        _ => no_postal.to_string(),
    }
}

/// Distinct place queries for one search, capped at
/// [`ADZUNA_MAX_PLACE_QUERIES`] to protect the free-tier quota.
pub fn build_place_queries(locations: &[LocationEntry]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    for entry in locations {
        let value = sanitize_place_name(entry);
        if !value.is_empty() && seen.insert(value.clone()) {
            queries.push(value);
        }
    }
    queries.truncate(ADZUNA_MAX_PLACE_QUERIES);
    queries
}

fn normalize_contract(result: &RawAdzunaResult) -> String {
    let parts: Vec<&str> = [result.contract_type.as_deref(), result.contract_time.as_deref()]
        .into_iter()
        .flatten()
        .filter(|v| !v.trim().is_empty())
        .collect();
    if !parts.is_empty() {
        return parts.join(" · ");
    }
    result
        .category
        .as_ref()
        .and_then(|c| c.label.clone())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "Non spécifié".to_string())
}

/// Rows without a link or a title are unusable and skipped.
pub fn map_adzuna_result(result: RawAdzunaResult) -> Option<Job> {
    let url = result
        .redirect_url
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())?
        .to_string();
    let title = result
        .title
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())?
        .to_string();

    let area = result
        .location
        .as_ref()
        .map(|l| l.area.clone())
        .unwrap_or_default();
    let location = result
        .location
        .as_ref()
        .and_then(|l| l.display_name.clone())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| {
            if area.is_empty() {
                "Belgique".to_string()
            } else {
                area.join(", ")
            }
        });

    let raw_id = match &result.id {
        Some(JsonValue::String(s)) if !s.is_empty() => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        _ => url.clone(),
    };

    let contract_type = normalize_contract(&result);

    Some(Job {
        id: format!("adzuna-{raw_id}"),
        title,
        company: result
            .company
            .and_then(|c| c.display_name)
            .filter(|v| !v.trim().is_empty()),
        location,
        contract_type,
        publication_date: result
            .created
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| Utc::now().to_rfc3339()),
        url,
        description: result.description.filter(|v| !v.trim().is_empty()),
        source: JobSource::Adzuna,
        pdf_url: None,
    })
}

/// Client of the keyed multi-employer search API. Disabled by default; the
/// provider does not support boolean keyword operators, so terms are joined
/// with single spaces.
pub struct AdzunaClient {
    config: AdzunaConfig,
    http: Arc<HttpFetcher>,
}

impl AdzunaClient {
    pub fn new(config: AdzunaConfig, http: Arc<HttpFetcher>) -> Self {
        Self { config, http }
    }

    pub async fn search_with_flag(&self, params: &SearchParams) -> AdzunaSearch {
        if !self.config.is_active() {
            return AdzunaSearch {
                jobs: Vec::new(),
                total: 0,
                enabled: false,
            };
        }

        let requested = params.limit.filter(|l| *l > 0).unwrap_or(50);
        let per_page = requested.clamp(10, 50);
        let what: Option<String> = {
            let terms: Vec<&str> = params
                .keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .collect();
            if terms.is_empty() {
                None
            } else {
                Some(terms.join(" "))
            }
        };

        let places = build_place_queries(&params.locations);
        let queries: Vec<Option<String>> = if places.is_empty() {
            vec![None]
        } else {
            places.into_iter().map(Some).collect()
        };

        let pages = join_all(
            queries
                .iter()
                .map(|place| self.fetch_page(place.as_deref(), what.as_deref(), per_page)),
        )
        .await;

        let mut jobs = Vec::new();
        for page in pages.into_iter().flatten() {
            jobs.extend(page.results.into_iter().filter_map(map_adzuna_result));
        }

        let deduped = dedupe_jobs(jobs);
        AdzunaSearch {
            total: deduped.len(),
            jobs: deduped,
            enabled: true,
        }
    }

    async fn fetch_page(
        &self,
        place: Option<&str>,
        what: Option<&str>,
        per_page: usize,
    ) -> Option<AdzunaPage> {
        let url = format!(
            "{}/{}/search/1",
            self.config.base_url.trim_end_matches('/'),
            self.config.country
        );

        let mut query: Vec<(&str, String)> = vec![
            ("app_id", self.config.app_id.clone()),
            ("app_key", self.config.app_key.clone()),
            ("results_per_page", per_page.to_string()),
            ("content-type", "application/json".to_string()),
        ];
        if let Some(what) = what {
            query.push(("what", what.to_string()));
        }
        if let Some(place) = place {
            query.push(("where", place.to_string()));
        }

        let response = self
            .http
            .fetch(FetchRequest {
                source_id: "adzuna",
                url: &url,
                query: &query,
                headers: &[("accept", "application/json")],
            })
            .await;

        match response {
            Ok(response) => match response.json::<AdzunaPage>() {
                Ok(page) => Some(page),
                Err(err) => {
                    warn!(error = %err, "adzuna returned malformed json");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "adzuna search failed");
                None
            }
        }
    }
}

#[async_trait]
impl JobProvider for AdzunaClient {
    fn id(&self) -> &'static str {
        "adzuna"
    }

    async fn search(&self, params: &SearchParams) -> ProviderSearch {
        let outcome = self.search_with_flag(params).await;
        ProviderSearch {
            jobs: outcome.jobs,
            total: outcome.total,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregation service
// ---------------------------------------------------------------------------

/// Abstraction over the registered job sources: concurrent fan-out, then
/// signature dedupe and date-descending sort. The registry is a fixed
/// ordered list; a provider failing only shrinks the merged result.
pub struct JobAggregator {
    providers: Vec<Arc<dyn JobProvider>>,
}

impl JobAggregator {
    pub fn new(providers: Vec<Arc<dyn JobProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub async fn search_jobs(&self, params: &SearchParams) -> ProviderSearch {
        let results = join_all(self.providers.iter().map(|p| p.search(params))).await;
        let merged = dedupe_and_sort_jobs(results.into_iter().flat_map(|r| r.jobs).collect());
        ProviderSearch {
            total: merged.len(),
            jobs: merged,
        }
    }
}
