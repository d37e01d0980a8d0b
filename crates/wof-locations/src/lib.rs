//! Location hierarchy cache: nomenclature mapping, fallback chain, TTL caching.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;
use wof_core::{compare_french, LocationEntry, LocationKind};
use wof_storage::{FetchRequest, HttpFetcher, SnapshotStore};

pub const CRATE_NAME: &str = "wof-locations";

pub const DEFAULT_NOMENCLATURE_URL: &str =
    "https://www.leforem.be/recherche-offres/api/Nomenclature/Localisations";
pub const DEFAULT_DATASET_URL: &str =
    "https://www.odwb.be/api/explore/v2.1/catalog/datasets/offres-d-emploi-forem/records";

const SNAPSHOT_NAME: &str = "locations";
const DEFAULT_TTL_SECS: u64 = 12 * 60 * 60;

/// Injectable time source so TTL behavior is testable with fake time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Which tier produced the current hierarchy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HierarchySource {
    #[serde(rename = "forem-nomenclature")]
    Nomenclature,
    #[serde(rename = "odwb-fallback")]
    DatasetFallback,
    #[serde(rename = "builtin")]
    Builtin,
}

impl HierarchySource {
    pub fn as_str(self) -> &'static str {
        match self {
            HierarchySource::Nomenclature => "forem-nomenclature",
            HierarchySource::DatasetFallback => "odwb-fallback",
            HierarchySource::Builtin => "builtin",
        }
    }
}

/// Flat record of the nomenclature feed. Every field is optional; the
/// upstream drifts and partially-filled rows are normal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawNomenclatureRecord {
    pub service_origin: Option<String>,
    pub libelle: Option<String>,
    pub code: Option<String>,
    pub gufid: Option<String>,
    pub niveau_decoupage: Option<i64>,
    pub code_postal: Option<String>,
    pub code_nuts: Option<String>,
}

/// Belgian-relevance filter. Levels 0 and 1 are always retained so the top
/// of the tree stays consistent even when upstream origin tags are not.
fn is_belgian(record: &RawNomenclatureRecord) -> bool {
    let origin = record.service_origin.as_deref().unwrap_or_default();
    let nuts = record.code_nuts.as_deref().unwrap_or_default();
    let label = record
        .libelle
        .as_deref()
        .unwrap_or_default()
        .to_uppercase();
    let level = record.niveau_decoupage.unwrap_or(-1);

    if origin.contains("Belge") {
        return true;
    }
    if nuts.starts_with("BE") {
        return true;
    }
    if label == "BELGIQUE" {
        return true;
    }
    (0..=1).contains(&level)
}

/// Display name: trimmed label, postal-code-prefixed for localities.
fn normalize_name(record: &RawNomenclatureRecord) -> Option<String> {
    let raw = record.libelle.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }

    let postal = record.code_postal.as_deref().map(str::trim).unwrap_or("");
    if record.niveau_decoupage == Some(5) && !postal.is_empty() {
        Some(format!("{postal} {raw}"))
    } else {
        Some(raw.to_string())
    }
}

/// Map the raw nomenclature list into hierarchy entries: Belgian filter,
/// level→kind table, id fallbacks (gufid, then code, then a synthetic
/// kind-name composite), then dedupe/sort.
pub fn map_nomenclature(records: &[RawNomenclatureRecord]) -> Vec<LocationEntry> {
    let mut mapped = Vec::new();

    for record in records {
        if !is_belgian(record) {
            continue;
        }

        let level = record.niveau_decoupage.unwrap_or(-1);
        let Some(kind) = LocationKind::from_level(level) else {
            continue;
        };
        let Some(name) = normalize_name(record) else {
            continue;
        };

        let postal_code = record
            .code_postal
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let id = record
            .gufid
            .clone()
            .filter(|v| !v.is_empty())
            .or_else(|| record.code.clone().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| format!("{}-{}", kind.label(), name));

        mapped.push(LocationEntry {
            id,
            name,
            kind: Some(kind),
            code: record.code.clone(),
            level: Some(kind.level()),
            postal_code,
            parent_id: None,
        });
    }

    dedupe_and_sort_entries(mapped)
}

/// Dedupe by `(kind, lowercased name)` then sort by kind ordinal and
/// French-folded name.
pub fn dedupe_and_sort_entries(entries: Vec<LocationEntry>) -> Vec<LocationEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<LocationEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        if seen.insert(entry.snapshot_key()) {
            unique.push(entry);
        }
    }

    unique.sort_by(|a, b| {
        let ka = a.kind.map(LocationKind::level).unwrap_or(u8::MAX);
        let kb = b.kind.map(LocationKind::level).unwrap_or(u8::MAX);
        ka.cmp(&kb).then_with(|| compare_french(&a.name, &b.name))
    });

    unique
}

/// One job record of the dataset feed, reduced to its location arrays.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDatasetRecord {
    pub lieuxtravailregion: Vec<String>,
    pub lieuxtravaillocalite: Vec<String>,
    pub lieuxtravailcodepostal: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatasetResponse {
    results: Vec<RawDatasetRecord>,
}

/// Derive hierarchy entries from job records when the nomenclature feed is
/// down: region/province labels by prefix heuristics, locality + postal
/// arrays pairwise.
pub fn map_dataset_fallback(records: &[RawDatasetRecord]) -> Vec<LocationEntry> {
    let mut entries = Vec::new();

    for record in records {
        for region in &record.lieuxtravailregion {
            let value = region.trim();
            if value.is_empty() {
                continue;
            }

            if value == "Belgique" {
                entries.push(LocationEntry {
                    id: "be".to_string(),
                    name: "Belgique".to_string(),
                    kind: Some(LocationKind::Country),
                    code: None,
                    level: Some(0),
                    postal_code: None,
                    parent_id: None,
                });
            } else if value.starts_with("RÉGION") {
                entries.push(LocationEntry {
                    id: format!("reg-{value}"),
                    name: value.to_string(),
                    kind: Some(LocationKind::Region),
                    code: None,
                    level: Some(1),
                    postal_code: None,
                    parent_id: None,
                });
            } else if value.starts_with("Province") {
                entries.push(LocationEntry {
                    id: format!("prov-{value}"),
                    name: value.to_string(),
                    kind: Some(LocationKind::Province),
                    code: None,
                    level: Some(2),
                    postal_code: None,
                    parent_id: None,
                });
            }
        }

        for (idx, localite) in record.lieuxtravaillocalite.iter().enumerate() {
            let name = localite.trim();
            if name.is_empty() {
                continue;
            }
            let postal = record
                .lieuxtravailcodepostal
                .get(idx)
                .map(|cp| cp.trim())
                .unwrap_or("");

            entries.push(LocationEntry {
                id: format!("loc-{postal}-{name}"),
                name: if postal.is_empty() {
                    name.to_string()
                } else {
                    format!("{postal} {name}")
                },
                kind: Some(LocationKind::Locality),
                code: None,
                level: Some(5),
                postal_code: if postal.is_empty() {
                    None
                } else {
                    Some(postal.to_string())
                },
                parent_id: None,
            });
        }
    }

    dedupe_and_sort_entries(entries)
}

/// Last-resort list so the location picker is never empty.
pub fn builtin_fallback() -> Vec<LocationEntry> {
    fn entry(
        id: &str,
        name: &str,
        kind: LocationKind,
        parent_id: Option<&str>,
        postal_code: Option<&str>,
    ) -> LocationEntry {
        LocationEntry {
            id: id.to_string(),
            name: name.to_string(),
            kind: Some(kind),
            code: None,
            level: Some(kind.level()),
            postal_code: postal_code.map(str::to_string),
            parent_id: parent_id.map(str::to_string),
        }
    }

    vec![
        entry("be", "Belgique", LocationKind::Country, None, None),
        entry("wal", "Wallonie", LocationKind::Region, Some("be"), None),
        entry(
            "bru",
            "Région de Bruxelles-Capitale",
            LocationKind::Region,
            Some("be"),
            None,
        ),
        entry("vla", "Flandre", LocationKind::Region, Some("be"), None),
        entry("bw", "Brabant Wallon", LocationKind::Province, Some("wal"), None),
        entry("lg", "Liège", LocationKind::Province, Some("wal"), None),
        entry(
            "arr-ve",
            "Arrondissement de Verviers",
            LocationKind::District,
            Some("lg"),
            None,
        ),
        entry("com-ve", "Verviers", LocationKind::Municipality, Some("arr-ve"), None),
        entry(
            "loc-ve",
            "4800 Verviers",
            LocationKind::Locality,
            Some("arr-ve"),
            Some("4800"),
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct LocationCacheConfig {
    pub nomenclature_url: String,
    pub dataset_url: String,
    pub cache_dir: PathBuf,
    pub ttl: Duration,
}

impl Default for LocationCacheConfig {
    fn default() -> Self {
        Self {
            nomenclature_url: DEFAULT_NOMENCLATURE_URL.to_string(),
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            cache_dir: PathBuf::from("./cache"),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl LocationCacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            nomenclature_url: std::env::var("WOF_NOMENCLATURE_URL")
                .unwrap_or(defaults.nomenclature_url),
            dataset_url: std::env::var("WOF_FOREM_DATASET_URL").unwrap_or(defaults.dataset_url),
            cache_dir: std::env::var("WOF_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            ttl: std::env::var("WOF_LOCATION_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ttl),
        }
    }
}

/// One resolved hierarchy snapshot, tagged with its originating tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    pub entries: Vec<LocationEntry>,
    pub source: HierarchySource,
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: Arc<HierarchySnapshot>,
    fetched_at: DateTime<Utc>,
}

/// Process-wide location hierarchy cache. `hierarchy()` is idempotent and
/// never fails: memory → disk snapshot → nomenclature feed → dataset
/// fallback → built-in list. Refreshes replace the snapshot wholesale via a
/// single reference swap; readers never observe a partial update.
pub struct LocationCache {
    config: LocationCacheConfig,
    http: Arc<HttpFetcher>,
    store: SnapshotStore,
    clock: Arc<dyn Clock>,
    memory: RwLock<Option<CachedSnapshot>>,
}

impl LocationCache {
    pub fn new(config: LocationCacheConfig, http: Arc<HttpFetcher>, clock: Arc<dyn Clock>) -> Self {
        let store = SnapshotStore::new(config.cache_dir.clone());
        Self {
            config,
            http,
            store,
            clock,
            memory: RwLock::new(None),
        }
    }

    /// Resolve the hierarchy, serving cached tiers while fresh.
    pub async fn hierarchy(&self) -> Arc<HierarchySnapshot> {
        let now = self.clock.now();

        if let Some(cached) = self.memory.read().await.as_ref() {
            let age = now.signed_duration_since(cached.fetched_at);
            if age >= chrono::Duration::zero()
                && age.to_std().map(|a| a <= self.config.ttl).unwrap_or(false)
            {
                return cached.snapshot.clone();
            }
        }

        if let Some((snapshot, saved_at)) = self
            .store
            .load::<HierarchySnapshot>(SNAPSHOT_NAME, now, self.config.ttl)
            .await
        {
            let snapshot = Arc::new(snapshot);
            self.replace_memory(snapshot.clone(), saved_at).await;
            return snapshot;
        }

        self.refresh().await
    }

    /// Fetch from the remote tiers unconditionally and replace the cached
    /// snapshot. Built-in fallback results are kept in memory but never
    /// persisted, so the next cycle retries the remote sources.
    pub async fn refresh(&self) -> Arc<HierarchySnapshot> {
        let now = self.clock.now();
        let snapshot = Arc::new(self.fetch_remote().await);

        if snapshot.source != HierarchySource::Builtin {
            if let Err(err) = self.store.save(SNAPSHOT_NAME, now, snapshot.as_ref()).await {
                warn!(error = %err, "failed to persist location snapshot");
            }
        }

        self.replace_memory(snapshot.clone(), now).await;
        snapshot
    }

    /// Case-insensitive substring search over the current snapshot. Serves
    /// the built-in list when nothing has been resolved yet; never fetches.
    pub async fn search(&self, query: &str) -> Vec<LocationEntry> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        let entries = match self.memory.read().await.as_ref() {
            Some(cached) => cached.snapshot.entries.clone(),
            None => builtin_fallback(),
        };
        entries
            .into_iter()
            .filter(|entry| entry.name.to_lowercase().contains(&needle))
            .collect()
    }

    async fn replace_memory(&self, snapshot: Arc<HierarchySnapshot>, fetched_at: DateTime<Utc>) {
        let mut guard = self.memory.write().await;
        *guard = Some(CachedSnapshot {
            snapshot,
            fetched_at,
        });
    }

    async fn fetch_remote(&self) -> HierarchySnapshot {
        match self.fetch_nomenclature().await {
            Ok(entries) if !entries.is_empty() => {
                return HierarchySnapshot {
                    entries,
                    source: HierarchySource::Nomenclature,
                };
            }
            Ok(_) => warn!("nomenclature feed returned no usable entries"),
            Err(err) => warn!(error = %err, "nomenclature feed unavailable"),
        }

        match self.fetch_dataset_fallback().await {
            Ok(entries) if !entries.is_empty() => {
                return HierarchySnapshot {
                    entries,
                    source: HierarchySource::DatasetFallback,
                };
            }
            Ok(_) => warn!("dataset fallback returned no usable entries"),
            Err(err) => warn!(error = %err, "dataset fallback unavailable"),
        }

        HierarchySnapshot {
            entries: builtin_fallback(),
            source: HierarchySource::Builtin,
        }
    }

    async fn fetch_nomenclature(&self) -> anyhow::Result<Vec<LocationEntry>> {
        let response = self
            .http
            .fetch(FetchRequest {
                source_id: "forem-nomenclature",
                url: &self.config.nomenclature_url,
                query: &[],
                headers: &[("accept", "application/json")],
            })
            .await?;
        let records: Vec<RawNomenclatureRecord> = response.json()?;
        Ok(map_nomenclature(&records))
    }

    async fn fetch_dataset_fallback(&self) -> anyhow::Result<Vec<LocationEntry>> {
        let response = self
            .http
            .fetch(FetchRequest {
                source_id: "odwb",
                url: &self.config.dataset_url,
                query: &[("limit", "-1".to_string())],
                headers: &[("accept", "application/json")],
            })
            .await?;
        let parsed: DatasetResponse = response.json()?;
        Ok(map_dataset_fallback(&parsed.results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;
    use wof_storage::{BackoffPolicy, HttpClientConfig};

    struct FakeClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FakeClock {
        fn at(ts: &str) -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(
                    DateTime::parse_from_rfc3339(ts)
                        .expect("timestamp")
                        .with_timezone(&Utc),
                ),
            })
        }

        fn advance(&self, by: chrono::Duration) {
            let mut guard = self.now.lock().expect("clock lock");
            *guard += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("clock lock")
        }
    }

    fn record(
        libelle: &str,
        level: i64,
        origin: &str,
        nuts: &str,
        postal: Option<&str>,
    ) -> RawNomenclatureRecord {
        RawNomenclatureRecord {
            service_origin: Some(origin.to_string()),
            libelle: Some(libelle.to_string()),
            code: None,
            gufid: None,
            niveau_decoupage: Some(level),
            code_postal: postal.map(str::to_string),
            code_nuts: Some(nuts.to_string()),
        }
    }

    fn offline_fetcher() -> Arc<HttpFetcher> {
        Arc::new(
            HttpFetcher::new(HttpClientConfig {
                timeout: StdDuration::from_millis(200),
                backoff: BackoffPolicy {
                    max_retries: 0,
                    base_delay: StdDuration::from_millis(1),
                    max_delay: StdDuration::from_millis(1),
                },
                ..Default::default()
            })
            .expect("fetcher"),
        )
    }

    fn offline_config(cache_dir: &std::path::Path) -> LocationCacheConfig {
        LocationCacheConfig {
            nomenclature_url: "http://127.0.0.1:1/nomenclature".to_string(),
            dataset_url: "http://127.0.0.1:1/records".to_string(),
            cache_dir: cache_dir.to_path_buf(),
            ttl: Duration::from_secs(12 * 3600),
        }
    }

    #[test]
    fn nomenclature_mapping_filters_and_prefixes() {
        let records = vec![
            record("BELGIQUE", 0, "", "", None),
            record("RÉGION WALLONNE", 1, "", "", None),
            record("Liège", 2, "Service Belge", "BE33", None),
            record("Köln", 2, "Service Allemand", "DEA2", None),
            record("Verviers", 5, "", "BE335", Some("4800")),
            record("", 2, "Service Belge", "BE", None),
        ];

        let entries = map_nomenclature(&records);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["BELGIQUE", "RÉGION WALLONNE", "Liège", "4800 Verviers"]
        );
        let verviers = entries.last().expect("locality");
        assert_eq!(verviers.kind, Some(LocationKind::Locality));
        assert_eq!(verviers.postal_code.as_deref(), Some("4800"));
    }

    #[test]
    fn top_level_nodes_survive_without_belgian_tags() {
        let records = vec![record("EUROPE", 0, "Service Européen", "EU", None)];
        let entries = map_nomenclature(&records);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, Some(LocationKind::Country));
    }

    #[test]
    fn id_falls_back_from_gufid_to_code_to_synthetic() {
        let mut with_gufid = record("Liège", 2, "Service Belge", "", None);
        with_gufid.gufid = Some("guf-1".to_string());
        let mut with_code = record("Namur", 2, "Service Belge", "", None);
        with_code.code = Some("92".to_string());
        let bare = record("Hainaut", 2, "Service Belge", "", None);

        let entries = map_nomenclature(&[with_gufid, with_code, bare]);
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert!(ids.contains(&"guf-1"));
        assert!(ids.contains(&"92"));
        assert!(ids.contains(&"Provinces-Hainaut"));
    }

    #[test]
    fn dedupe_is_case_insensitive_per_kind() {
        let records = vec![
            record("Verviers", 4, "Service Belge", "", None),
            record("VERVIERS", 4, "Service Belge", "", None),
            record("Verviers", 5, "Service Belge", "", None),
        ];
        let entries = map_nomenclature(&records);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn entries_sort_by_kind_then_french_name() {
        let records = vec![
            record("Évelette", 5, "Service Belge", "", None),
            record("Anvers", 5, "Service Belge", "", None),
            record("BELGIQUE", 0, "", "", None),
        ];
        let entries = map_nomenclature(&records);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["BELGIQUE", "Anvers", "Évelette"]);
    }

    #[test]
    fn dataset_fallback_maps_labels_and_localities() {
        let records = vec![RawDatasetRecord {
            lieuxtravailregion: vec![
                "Belgique".to_string(),
                "RÉGION WALLONNE".to_string(),
                "Province de Liège".to_string(),
                "ailleurs".to_string(),
            ],
            lieuxtravaillocalite: vec!["Verviers".to_string(), "Dison".to_string()],
            lieuxtravailcodepostal: vec!["4800".to_string()],
        }];

        let entries = map_dataset_fallback(&records);
        let kinds: Vec<_> = entries.iter().filter_map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LocationKind::Country,
                LocationKind::Region,
                LocationKind::Province,
                LocationKind::Locality,
                LocationKind::Locality,
            ]
        );
        let verviers = entries
            .iter()
            .find(|e| e.name.contains("Verviers"))
            .expect("verviers");
        assert_eq!(verviers.name, "4800 Verviers");
        assert_eq!(verviers.postal_code.as_deref(), Some("4800"));
        let dison = entries.iter().find(|e| e.name.contains("Dison")).expect("dison");
        assert_eq!(dison.postal_code, None);
    }

    #[test]
    fn builtin_fallback_is_never_empty_and_anchors_belgique() {
        let entries = builtin_fallback();
        assert!(!entries.is_empty());
        assert!(entries.iter().any(|e| e.name == "Belgique"));
    }

    #[tokio::test]
    async fn fresh_disk_snapshot_is_served_without_fetching() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::at("2026-08-01T08:00:00Z");
        let store = SnapshotStore::new(dir.path());
        store
            .save(
                SNAPSHOT_NAME,
                clock.now(),
                &HierarchySnapshot {
                    entries: builtin_fallback(),
                    source: HierarchySource::Nomenclature,
                },
            )
            .await
            .expect("seed snapshot");

        let cache = LocationCache::new(offline_config(dir.path()), offline_fetcher(), clock);
        let snapshot = cache.hierarchy().await;
        assert_eq!(snapshot.source, HierarchySource::Nomenclature);
        assert!(snapshot.entries.iter().any(|e| e.name == "Belgique"));
    }

    #[tokio::test]
    async fn unreachable_sources_cascade_to_builtin_fallback() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::at("2026-08-01T08:00:00Z");
        let cache = LocationCache::new(offline_config(dir.path()), offline_fetcher(), clock);

        let snapshot = cache.hierarchy().await;
        assert_eq!(snapshot.source, HierarchySource::Builtin);
        assert!(snapshot.entries.iter().any(|e| e.name == "Belgique"));

        // Builtin results must not be persisted; the next cycle retries.
        let persisted: Option<(HierarchySnapshot, _)> = SnapshotStore::new(dir.path())
            .load(SNAPSHOT_NAME, Utc::now(), Duration::from_secs(3600))
            .await;
        assert!(persisted.is_none());
    }

    #[tokio::test]
    async fn stale_disk_snapshot_triggers_a_refresh() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::at("2026-08-01T08:00:00Z");
        let store = SnapshotStore::new(dir.path());
        store
            .save(
                SNAPSHOT_NAME,
                clock.now(),
                &HierarchySnapshot {
                    entries: builtin_fallback(),
                    source: HierarchySource::Nomenclature,
                },
            )
            .await
            .expect("seed snapshot");

        let cache =
            LocationCache::new(offline_config(dir.path()), offline_fetcher(), clock.clone());
        clock.advance(chrono::Duration::hours(13));

        // Past the TTL the disk tier is ignored; with both remote sources
        // unreachable the cache lands on the builtin list.
        let snapshot = cache.hierarchy().await;
        assert_eq!(snapshot.source, HierarchySource::Builtin);
    }

    #[tokio::test]
    async fn memory_snapshot_is_reused_within_ttl() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::at("2026-08-01T08:00:00Z");
        let cache =
            LocationCache::new(offline_config(dir.path()), offline_fetcher(), clock.clone());

        let first = cache.hierarchy().await;
        clock.advance(chrono::Duration::hours(1));
        let second = cache.hierarchy().await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn search_filters_by_substring() {
        let dir = tempdir().expect("tempdir");
        let clock = FakeClock::at("2026-08-01T08:00:00Z");
        let cache = LocationCache::new(offline_config(dir.path()), offline_fetcher(), clock);

        let hits = cache.search("vervi").await;
        assert!(hits.iter().all(|e| e.name.to_lowercase().contains("vervi")));
        assert!(!hits.is_empty());
        assert!(cache.search("").await.is_empty());
    }
}
