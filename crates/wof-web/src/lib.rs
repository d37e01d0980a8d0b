//! Axum API surface for WOF: search, locations, offer details, PDF proxy.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::warn;
use wof_core::{
    Job, LocationEntry, OfferDetails, OfferDetailsSource, OfferHighlight, OfferSection,
    SearchParams,
};
use wof_locations::{LocationCache, LocationCacheConfig, SystemClock};
use wof_providers::{
    escape_ods, AdzunaClient, AdzunaConfig, ForemClient, ForemConfig, JobAggregator, JobProvider,
};
use wof_storage::{FetchRequest, HttpClientConfig, HttpFetcher};

pub const CRATE_NAME: &str = "wof-web";

const EXPORT_FILENAME: &str = "offres-foremidable.csv";
const EXPORT_DESCRIPTION_PREVIEW_CHARS: usize = 150;

/// Upstream detail endpoints reject non-browser clients; present the same
/// identity a browser would.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Offer detail / PDF normalization proxy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OffersConfig {
    /// Base of the per-offer API, e.g. `https://www.leforem.be/recherche-offres/api`.
    pub detail_api_base: String,
    pub offer_page_base: String,
    pub dataset_url: String,
}

impl Default for OffersConfig {
    fn default() -> Self {
        Self {
            detail_api_base: "https://www.leforem.be/recherche-offres/api".to_string(),
            offer_page_base: wof_providers::FOREM_OFFER_LINK_BASE.to_string(),
            dataset_url: wof_locations::DEFAULT_DATASET_URL.to_string(),
        }
    }
}

impl OffersConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            detail_api_base: std::env::var("WOF_FOREM_DETAIL_BASE")
                .unwrap_or(defaults.detail_api_base),
            offer_page_base: defaults.offer_page_base,
            dataset_url: std::env::var("WOF_FOREM_DATASET_URL").unwrap_or(defaults.dataset_url),
        }
    }
}

pub struct PdfPayload {
    pub bytes: Vec<u8>,
    pub filename: String,
}

fn as_clean_string(value: &JsonValue) -> Option<String> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn as_string_array(value: &JsonValue) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(as_clean_string).collect())
        .unwrap_or_default()
}

/// Ordered-alias lookup: the upstream payload shape drifts, so each
/// semantic slot probes a list of known field names and the first present
/// alias wins.
fn first_string(payload: &JsonMap<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(as_clean_string))
}

fn first_array(payload: &JsonMap<String, JsonValue>, keys: &[&str]) -> Vec<String> {
    for key in keys {
        if let Some(value) = payload.get(*key) {
            let items = as_string_array(value);
            if !items.is_empty() {
                return items;
            }
        }
    }
    Vec::new()
}

fn push_highlight(highlights: &mut Vec<OfferHighlight>, label: &str, value: Option<String>) {
    if let Some(value) = value {
        highlights.push(OfferHighlight {
            label: label.to_string(),
            value,
        });
    }
}

fn push_joined_highlight(highlights: &mut Vec<OfferHighlight>, label: &str, values: Vec<String>) {
    if !values.is_empty() {
        highlights.push(OfferHighlight {
            label: label.to_string(),
            value: values.join(", "),
        });
    }
}

fn push_section(sections: &mut Vec<OfferSection>, title: &str, content: Option<String>) {
    if let Some(content) = content {
        let normalized = content.trim().to_string();
        if !normalized.is_empty() {
            sections.push(OfferSection {
                title: title.to_string(),
                content: normalized,
            });
        }
    }
}

/// Best-effort split of a free-text description into sections by French
/// heading keywords. Requires at least two distinct heading matches to
/// avoid spurious single-section splits.
pub fn extract_sections_from_description(description: &str) -> Vec<OfferSection> {
    let patterns = [
        ("Tâches / Missions", r"(?i)(t[aâ]ches?|missions?|fonction)\s*[:\-]"),
        ("Profil recherché", r"(?i)(profil|votre profil|comp[eé]tences?)\s*[:\-]"),
        (
            "Offre / Conditions",
            r"(?i)(offre|nous offrons|conditions?|avantages?)\s*[:\-]",
        ),
    ];

    let mut matches: Vec<(usize, usize, &str)> = Vec::new();
    for (title, pattern) in patterns {
        let regex = Regex::new(pattern).expect("heading pattern is valid");
        if let Some(found) = regex.find(description) {
            matches.push((found.start(), found.end(), title));
        }
    }

    if matches.len() < 2 {
        return Vec::new();
    }
    matches.sort_by_key(|(start, _, _)| *start);

    let mut sections = Vec::new();
    for (idx, (_, end, title)) in matches.iter().enumerate() {
        let content_end = matches
            .get(idx + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(description.len());
        let content = description[*end..content_end].trim();
        push_section(&mut sections, title, Some(content.to_string()));
    }
    sections
}

/// Normalize the detail-API payload shape.
pub fn normalize_detail_payload(
    payload: &JsonMap<String, JsonValue>,
    fallback_offer_id: &str,
) -> OfferDetails {
    let mut highlights = Vec::new();
    let mut sections = Vec::new();

    let description = first_string(
        payload,
        &[
            "description",
            "descriptionOffre",
            "descriptionPoste",
            "texteAnnonce",
            "contenu",
            "body",
            "mission",
            "metier",
        ],
    );

    push_section(
        &mut sections,
        "Tâches / Missions",
        first_string(
            payload,
            &[
                "taches",
                "tâches",
                "missions",
                "mission",
                "fonction",
                "descriptionFonction",
            ],
        ),
    );
    push_section(
        &mut sections,
        "Profil recherché",
        first_string(
            payload,
            &[
                "profil",
                "profilRecherche",
                "competences",
                "compétences",
                "descriptionProfil",
            ],
        ),
    );
    push_section(
        &mut sections,
        "Offre / Conditions",
        first_string(payload, &["offre", "conditions", "avantages", "nousOffrons"]),
    );
    if sections.is_empty() {
        if let Some(description) = &description {
            sections = extract_sections_from_description(description);
        }
    }

    let offer_id = first_string(payload, &["numerooffreforem", "offreId", "idOffreEmploi"])
        .unwrap_or_else(|| fallback_offer_id.to_string());

    push_highlight(&mut highlights, "Référence Forem", Some(offer_id.clone()));
    push_highlight(
        &mut highlights,
        "Référence externe",
        first_string(payload, &["referenceexterne", "referenceExterne"]),
    );
    push_highlight(
        &mut highlights,
        "Régime de travail",
        first_string(payload, &["regimetravail", "regimeTravail"]),
    );
    push_highlight(
        &mut highlights,
        "Expérience requise",
        first_string(payload, &["experiencerequise", "experienceRequise"]),
    );
    push_highlight(
        &mut highlights,
        "Permis",
        first_string(payload, &["permisdeconduire", "permisConduire"]),
    );
    push_highlight(
        &mut highlights,
        "Date de fin de diffusion",
        first_string(payload, &["datefindiffusion", "dateFinDiffusion"]),
    );
    push_joined_highlight(&mut highlights, "Langues", first_array(payload, &["langues"]));
    push_joined_highlight(
        &mut highlights,
        "Études",
        first_array(payload, &["niveauxetudes", "niveauxEtudes"]),
    );
    push_joined_highlight(&mut highlights, "Secteurs", first_array(payload, &["secteurs"]));

    OfferDetails {
        offer_id: fallback_offer_id.to_string(),
        description,
        highlights,
        sections,
        source: OfferDetailsSource::DetailApi,
    }
}

/// Normalize the flatter dataset record shape used as fallback.
pub fn normalize_dataset_payload(
    payload: &JsonMap<String, JsonValue>,
    fallback_offer_id: &str,
) -> OfferDetails {
    let mut highlights = Vec::new();

    let description = payload.get("metier").and_then(as_clean_string);
    let offer_id = payload
        .get("numerooffreforem")
        .and_then(as_clean_string)
        .unwrap_or_else(|| fallback_offer_id.to_string());

    push_highlight(&mut highlights, "Référence Forem", Some(offer_id));
    push_highlight(
        &mut highlights,
        "Référence externe",
        payload.get("referenceexterne").and_then(as_clean_string),
    );
    push_highlight(
        &mut highlights,
        "Régime de travail",
        payload.get("regimetravail").and_then(as_clean_string),
    );
    push_highlight(
        &mut highlights,
        "Expérience requise",
        payload.get("experiencerequise").and_then(as_clean_string),
    );
    push_highlight(
        &mut highlights,
        "Permis",
        payload.get("permisdeconduire").and_then(as_clean_string),
    );
    push_highlight(
        &mut highlights,
        "Date de fin de diffusion",
        payload.get("datefindiffusion").and_then(as_clean_string),
    );

    if let Some(count) = payload.get("nombrepostes").and_then(JsonValue::as_i64) {
        highlights.push(OfferHighlight {
            label: "Nombre de postes".to_string(),
            value: count.to_string(),
        });
    }

    push_joined_highlight(
        &mut highlights,
        "Langues",
        payload.get("langues").map(as_string_array).unwrap_or_default(),
    );
    push_joined_highlight(
        &mut highlights,
        "Études",
        payload
            .get("niveauxetudes")
            .map(as_string_array)
            .unwrap_or_default(),
    );
    push_joined_highlight(
        &mut highlights,
        "Secteurs",
        payload.get("secteurs").map(as_string_array).unwrap_or_default(),
    );

    OfferDetails {
        offer_id: fallback_offer_id.to_string(),
        description,
        highlights,
        sections: Vec::new(),
        source: OfferDetailsSource::DatasetFallback,
    }
}

/// Server-side proxy for per-offer detail and PDF retrieval. Results are
/// cached in-memory per offer id; only fetches that completed with content
/// populate the cache, so a cancelled or failed lookup leaves no entry.
pub struct OffersService {
    config: OffersConfig,
    http: Arc<HttpFetcher>,
    cache: Mutex<HashMap<String, OfferDetails>>,
}

impl OffersService {
    pub fn new(config: OffersConfig, http: Arc<HttpFetcher>) -> Self {
        Self {
            config,
            http,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Peek the per-offer result cache.
    pub async fn cached(&self, offer_id: &str) -> Option<OfferDetails> {
        self.cache.lock().await.get(offer_id).cloned()
    }

    pub async fn details(&self, offer_id: &str) -> OfferDetails {
        if let Some(cached) = self.cached(offer_id).await {
            return cached;
        }

        let details = self.fetch_details(offer_id).await;
        if details.has_content() {
            self.cache
                .lock()
                .await
                .insert(offer_id.to_string(), details.clone());
        }
        details
    }

    async fn fetch_details(&self, offer_id: &str) -> OfferDetails {
        // The detail API evolved without versioning guarantees; try the
        // known endpoint shapes in order.
        let candidates = [
            format!("{}/offre-detail/{}", self.config.detail_api_base, offer_id),
            format!("{}/OffreDetail/{}", self.config.detail_api_base, offer_id),
        ];
        let referer = format!("{}/{}", self.config.offer_page_base, offer_id);

        for url in &candidates {
            let response = self
                .http
                .fetch(FetchRequest {
                    source_id: "forem-detail",
                    url,
                    query: &[],
                    headers: &[
                        ("accept", "application/json,*/*"),
                        ("referer", referer.as_str()),
                        ("user-agent", BROWSER_USER_AGENT),
                    ],
                })
                .await;

            let Ok(response) = response else { continue };
            if !response.is_json() {
                continue;
            }
            let Ok(JsonValue::Object(payload)) = response.json::<JsonValue>() else {
                continue;
            };

            let normalized = normalize_detail_payload(&payload, offer_id);
            if normalized.has_content() {
                return normalized;
            }
        }

        self.fetch_dataset_details(offer_id).await
    }

    async fn fetch_dataset_details(&self, offer_id: &str) -> OfferDetails {
        let where_clause = format!("numerooffreforem=\"{}\"", escape_ods(offer_id));
        let response = self
            .http
            .fetch(FetchRequest {
                source_id: "odwb",
                url: &self.config.dataset_url,
                query: &[
                    ("limit", "1".to_string()),
                    ("where", where_clause),
                ],
                headers: &[("accept", "application/json")],
            })
            .await;

        let Ok(response) = response else {
            return OfferDetails::empty(offer_id);
        };
        let Ok(parsed) = response.json::<JsonValue>() else {
            return OfferDetails::empty(offer_id);
        };

        match parsed
            .get("results")
            .and_then(JsonValue::as_array)
            .and_then(|results| results.first())
            .and_then(JsonValue::as_object)
        {
            Some(record) => normalize_dataset_payload(record, offer_id),
            None => OfferDetails::empty(offer_id),
        }
    }

    pub async fn pdf(&self, offer_id: &str) -> Option<PdfPayload> {
        let candidates = [
            format!("{}/Document/PDF/{}", self.config.detail_api_base, offer_id),
            format!("{}/offre-detail/{}/pdf", self.config.detail_api_base, offer_id),
        ];

        for url in &candidates {
            let response = self
                .http
                .fetch(FetchRequest {
                    source_id: "forem-pdf",
                    url,
                    query: &[],
                    headers: &[
                        ("accept", "application/pdf,application/octet-stream,*/*"),
                        ("referer", "https://www.leforem.be/recherche-offres/offres"),
                        ("user-agent", BROWSER_USER_AGENT),
                    ],
                })
                .await;

            let Ok(response) = response else { continue };
            if !response.content_type.contains("pdf") {
                continue;
            }
            return Some(PdfPayload {
                bytes: response.body,
                filename: format!("Offre_Forem_{offer_id}.pdf"),
            });
        }

        None
    }
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

fn csv_cell(value: &str) -> String {
    value.replace('\n', " ").replace('\r', " ")
}

fn description_preview(description: Option<&str>) -> String {
    let Some(description) = description else {
        return String::new();
    };
    let chars: Vec<char> = description.chars().collect();
    if chars.len() > EXPORT_DESCRIPTION_PREVIEW_CHARS {
        let truncated: String = chars[..EXPORT_DESCRIPTION_PREVIEW_CHARS].iter().collect();
        format!("{truncated}...")
    } else {
        description.to_string()
    }
}

/// Render jobs as a UTF-8-BOM CSV with French headers, description
/// truncated to a preview.
pub fn jobs_to_csv(jobs: &[Job]) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Titre",
        "Entreprise",
        "Lieu",
        "Contrat",
        "Date de publication",
        "Source",
        "Lien",
        "Aperçu description",
    ])?;

    for job in jobs {
        writer.write_record([
            csv_cell(&job.title),
            csv_cell(job.company.as_deref().unwrap_or_default()),
            csv_cell(&job.location),
            csv_cell(&job.contract_type),
            csv_cell(&job.publication_date),
            job.source.as_str().to_string(),
            csv_cell(&job.url),
            csv_cell(&description_preview(job.description.as_deref())),
        ])?;
    }

    let bytes = writer.into_inner()?;
    Ok(format!("\u{feff}{}", String::from_utf8(bytes)?))
}

// ---------------------------------------------------------------------------
// Application state + router
// ---------------------------------------------------------------------------

pub struct AppState {
    pub aggregator: JobAggregator,
    pub locations: Arc<LocationCache>,
    pub offers: OffersService,
}

impl AppState {
    /// Wire the full service from environment configuration.
    pub fn from_env() -> anyhow::Result<Self> {
        let http = Arc::new(HttpFetcher::new(HttpClientConfig {
            timeout: std::time::Duration::from_secs(
                std::env::var("WOF_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20),
            ),
            user_agent: Some(
                std::env::var("WOF_USER_AGENT").unwrap_or_else(|_| "wof-bot/0.1".to_string()),
            ),
            ..Default::default()
        })?);

        let locations = Arc::new(LocationCache::new(
            LocationCacheConfig::from_env(),
            http.clone(),
            Arc::new(SystemClock),
        ));

        let forem = Arc::new(ForemClient::new(
            ForemConfig::from_env(),
            http.clone(),
            locations.clone(),
        ));
        let adzuna = Arc::new(AdzunaClient::new(AdzunaConfig::from_env(), http.clone()));
        let providers: Vec<Arc<dyn JobProvider>> = vec![forem, adzuna];

        Ok(Self {
            aggregator: JobAggregator::new(providers),
            locations,
            offers: OffersService::new(OffersConfig::from_env(), http),
        })
    }
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    jobs: Vec<Job>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct LocationsResponse {
    entries: Vec<LocationEntry>,
    source: &'static str,
}

#[derive(Debug, Deserialize)]
struct ExportRequest {
    jobs: Vec<Job>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/api/jobs/search", post(search_handler))
        .route("/api/jobs/export", post(export_handler))
        .route("/api/locations", get(locations_handler))
        .route("/api/offers/{id}", get(offer_details_handler))
        .route("/api/pdf/{id}", get(pdf_handler))
        .with_state(state)
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("WOF_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let state = Arc::new(AppState::from_env()?);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "wof-web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn healthz_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": CRATE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(params): Json<SearchParams>,
) -> Json<SearchResponse> {
    let result = state.aggregator.search_jobs(&params).await;
    Json(SearchResponse {
        jobs: result.jobs,
        total: result.total,
    })
}

async fn locations_handler(State(state): State<Arc<AppState>>) -> Json<LocationsResponse> {
    let snapshot = state.locations.hierarchy().await;
    Json(LocationsResponse {
        entries: snapshot.entries.clone(),
        source: snapshot.source.as_str(),
    })
}

async fn offer_details_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let id = id.trim().to_string();
    if id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing offer id").into_response();
    }
    Json(state.offers.details(&id).await).into_response()
}

async fn pdf_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let id = id.trim().to_string();
    if id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing offer id").into_response();
    }

    match state.offers.pdf(&id).await {
        Some(payload) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/pdf")
            .header(
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", payload.filename),
            )
            .header(header::CACHE_CONTROL, "public, max-age=3600")
            .body(Body::from(payload.bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        None => (
            StatusCode::NOT_FOUND,
            "PDF not found or unavailable upstream",
        )
            .into_response(),
    }
}

async fn export_handler(Json(request): Json<ExportRequest>) -> Response {
    match jobs_to_csv(&request.jobs) {
        Ok(csv) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            )
            .body(Body::from(csv))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(err) => {
            warn!(error = %err, "csv export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use wof_core::JobSource;
    use wof_storage::BackoffPolicy;

    fn payload(json: serde_json::Value) -> JsonMap<String, JsonValue> {
        json.as_object().expect("object payload").clone()
    }

    fn offline_service() -> OffersService {
        let http = Arc::new(
            HttpFetcher::new(HttpClientConfig {
                timeout: std::time::Duration::from_millis(200),
                backoff: BackoffPolicy {
                    max_retries: 0,
                    base_delay: std::time::Duration::from_millis(1),
                    max_delay: std::time::Duration::from_millis(1),
                },
                ..Default::default()
            })
            .expect("fetcher"),
        );
        OffersService::new(
            OffersConfig {
                detail_api_base: "http://127.0.0.1:1/api".to_string(),
                offer_page_base: "http://127.0.0.1:1/offre-detail".to_string(),
                dataset_url: "http://127.0.0.1:1/records".to_string(),
            },
            http,
        )
    }

    #[test]
    fn structured_fields_win_over_description_splitting() {
        let details = normalize_detail_payload(
            &payload(serde_json::json!({
                "descriptionOffre": "Long texte. Tâches: a. Profil: b.",
                "taches": "Soigner les patients",
                "profil": "Diplôme requis",
                "regimetravail": "Temps plein",
                "langues": ["Français", "Allemand"],
            })),
            "123",
        );

        assert_eq!(details.source, OfferDetailsSource::DetailApi);
        assert_eq!(details.description.as_deref(), Some("Long texte. Tâches: a. Profil: b."));
        assert_eq!(
            details.sections,
            vec![
                OfferSection {
                    title: "Tâches / Missions".to_string(),
                    content: "Soigner les patients".to_string(),
                },
                OfferSection {
                    title: "Profil recherché".to_string(),
                    content: "Diplôme requis".to_string(),
                },
            ]
        );
        assert!(details
            .highlights
            .iter()
            .any(|h| h.label == "Régime de travail" && h.value == "Temps plein"));
        assert!(details
            .highlights
            .iter()
            .any(|h| h.label == "Langues" && h.value == "Français, Allemand"));
    }

    #[test]
    fn description_splits_on_two_or_more_headings() {
        let sections = extract_sections_from_description(
            "Introduction. Missions: soigner et accompagner. Profil: diplôme d'infirmier. Nous offrons: un CDI.",
        );
        assert_eq!(
            sections.iter().map(|s| s.title.as_str()).collect::<Vec<_>>(),
            vec!["Tâches / Missions", "Profil recherché", "Offre / Conditions"]
        );
        assert_eq!(sections[0].content, "soigner et accompagner.");
        assert_eq!(sections[2].content, "un CDI.");
    }

    #[test]
    fn a_single_heading_never_splits() {
        let sections =
            extract_sections_from_description("Missions: soigner et accompagner toute la journée.");
        assert!(sections.is_empty());
    }

    #[test]
    fn detail_payload_without_section_fields_falls_back_to_splitting() {
        let details = normalize_detail_payload(
            &payload(serde_json::json!({
                "description": "Tâches: soigner. Profil: motivé.",
            })),
            "123",
        );
        assert_eq!(details.sections.len(), 2);
    }

    #[test]
    fn dataset_payload_normalizes_flat_record() {
        let details = normalize_dataset_payload(
            &payload(serde_json::json!({
                "numerooffreforem": "456",
                "metier": "Infirmier en soins généraux",
                "nombrepostes": 3,
                "niveauxetudes": ["Bachelier"],
            })),
            "456",
        );

        assert_eq!(details.source, OfferDetailsSource::DatasetFallback);
        assert_eq!(details.description.as_deref(), Some("Infirmier en soins généraux"));
        assert!(details
            .highlights
            .iter()
            .any(|h| h.label == "Nombre de postes" && h.value == "3"));
        assert!(details
            .highlights
            .iter()
            .any(|h| h.label == "Études" && h.value == "Bachelier"));
        assert!(details.sections.is_empty());
    }

    #[tokio::test]
    async fn failed_lookups_return_empty_and_do_not_populate_the_cache() {
        let service = offline_service();
        let details = service.details("999").await;
        assert_eq!(details.source, OfferDetailsSource::None);
        assert!(!details.has_content());
        assert!(service.cached("999").await.is_none());
    }

    #[tokio::test]
    async fn unreachable_pdf_candidates_report_not_found() {
        let service = offline_service();
        assert!(service.pdf("999").await.is_none());
    }

    fn export_job() -> Job {
        Job {
            id: "1".to_string(),
            title: "Infirmier".to_string(),
            company: Some("Clinique \"Sainte-Anne\"".to_string()),
            location: "Verviers".to_string(),
            contract_type: "CDI".to_string(),
            publication_date: "2026-01-10".to_string(),
            url: "https://example.org/1".to_string(),
            description: Some("a".repeat(200)),
            source: JobSource::Forem,
            pdf_url: None,
        }
    }

    #[test]
    fn csv_export_carries_bom_headers_and_preview_truncation() {
        let csv = jobs_to_csv(&[export_job()]).expect("csv");
        assert!(csv.starts_with('\u{feff}'));
        assert!(csv.contains("Titre,Entreprise,Lieu,Contrat,Date de publication,Source,Lien"));
        assert!(csv.contains(&format!("{}...", "a".repeat(150))));
        assert!(!csv.contains(&"a".repeat(151)));
    }

    #[test]
    fn csv_export_flattens_newlines() {
        let mut job = export_job();
        job.description = Some("ligne 1\nligne 2".to_string());
        let csv = jobs_to_csv(&[job]).expect("csv");
        assert!(csv.contains("ligne 1 ligne 2"));
    }

    fn test_state() -> Arc<AppState> {
        let http = Arc::new(
            HttpFetcher::new(HttpClientConfig {
                timeout: std::time::Duration::from_millis(200),
                backoff: BackoffPolicy {
                    max_retries: 0,
                    base_delay: std::time::Duration::from_millis(1),
                    max_delay: std::time::Duration::from_millis(1),
                },
                ..Default::default()
            })
            .expect("fetcher"),
        );
        let locations = Arc::new(LocationCache::new(
            LocationCacheConfig {
                nomenclature_url: "http://127.0.0.1:1/nomenclature".to_string(),
                dataset_url: "http://127.0.0.1:1/records".to_string(),
                cache_dir: std::env::temp_dir().join("wof-web-tests"),
                ttl: std::time::Duration::from_secs(3600),
            },
            http.clone(),
            Arc::new(SystemClock),
        ));
        let adzuna = Arc::new(AdzunaClient::new(AdzunaConfig::default(), http.clone()));
        let providers: Vec<Arc<dyn JobProvider>> = vec![adzuna];
        Arc::new(AppState {
            aggregator: JobAggregator::new(providers),
            locations,
            offers: OffersService::new(
                OffersConfig {
                    detail_api_base: "http://127.0.0.1:1/api".to_string(),
                    offer_page_base: "http://127.0.0.1:1/offre-detail".to_string(),
                    dataset_url: "http://127.0.0.1:1/records".to_string(),
                },
                http,
            ),
        })
    }

    #[tokio::test]
    async fn handler_smoke_healthz() {
        let app = app(test_state());
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handler_smoke_export_returns_csv_attachment() {
        let app = app(test_state());
        let body = serde_json::json!({ "jobs": [export_job()] }).to_string();
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/jobs/export")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/csv; charset=utf-8"
        );
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("Infirmier"));
    }

    #[tokio::test]
    async fn handler_smoke_search_with_disabled_providers_is_empty() {
        let app = app(test_state());
        let body = serde_json::json!({
            "keywords": ["infirmier"],
            "locations": [],
            "booleanMode": "OR",
        })
        .to_string();
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/jobs/search")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["total"], 0);
        assert_eq!(parsed["jobs"].as_array().map(Vec::len), Some(0));
    }
}
