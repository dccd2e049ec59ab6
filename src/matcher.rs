//! Cross-venue event mapping.
//!
//! Maintains the set of [`EventMapping`] records that declare a V1 contract
//! and a V2 contract equivalent for arbitrage purposes, and produces new
//! mappings from venue market listings by normalized-title matching with
//! date and category guards.
//!
//! Matching is deliberately conservative: a mapping below the confidence
//! floor never trades, and a wrong mapping is worse than a missed one.

use chrono::{DateTime, Duration, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use uuid::Uuid;

/// How a mapping was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Fuzzy,
    Manual,
}

impl std::fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMethod::Exact => write!(f, "exact"),
            MatchMethod::Fuzzy => write!(f, "fuzzy"),
            MatchMethod::Manual => write!(f, "manual"),
        }
    }
}

/// Declared equivalence between a V1 contract and a V2 contract.
///
/// `confidence` is immutable after creation; only `active` and `updated_at`
/// may change. `outcome_alignment` documents the yes/no convention for the
/// pair: `"yes_yes"` means YES on V1 settles with YES on V2 (selling YES on
/// one venue is hedged by buying YES on the other); `"yes_no"` marks an
/// inverted listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMapping {
    pub id: String,
    pub v1_contract: String,
    pub v2_contract: String,
    pub description: String,
    pub confidence: f64,
    pub method: MatchMethod,
    pub resolution_time: DateTime<Utc>,
    pub outcome_alignment: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A market listing as a venue reports it, already reduced to the fields
/// the matcher needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketListing {
    pub contract_id: String,
    pub title: String,
    pub resolution_time: DateTime<Utc>,
    pub category: Option<String>,
}

/// Token alias table applied during tokenization (ticker <-> name, numeric
/// expansions). Shipped as a data asset; the matcher takes it as input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasTable {
    aliases: BTreeMap<String, String>,
}

impl AliasTable {
    /// Built-in aliases covering the most common listing divergences.
    pub fn builtin() -> Self {
        let mut aliases = BTreeMap::new();
        for (from, to) in [
            ("btc", "bitcoin"),
            ("eth", "ethereum"),
            ("sol", "solana"),
            ("doge", "dogecoin"),
            ("fed", "federal reserve"),
            ("potus", "president"),
            ("gop", "republican"),
            ("dem", "democrat"),
            ("democratic", "democrat"),
            ("us", "united states"),
            ("uk", "united kingdom"),
            ("100k", "100000"),
            ("150k", "150000"),
            ("200k", "200000"),
            ("1m", "1000000"),
            ("pct", "percent"),
            ("%", "percent"),
        ] {
            aliases.insert(from.to_string(), to.to_string());
        }
        Self { aliases }
    }

    /// Load aliases from a JSON object file, merged over the builtins.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let extra: BTreeMap<String, String> = serde_json::from_str(&raw)?;
        let mut table = Self::builtin();
        table.aliases.extend(extra);
        Ok(table)
    }

    fn resolve<'a>(&'a self, token: &'a str) -> &'a str {
        self.aliases.get(token).map(String::as_str).unwrap_or(token)
    }
}

/// Matcher tuning knobs.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub fuzzy_threshold: f64,
    pub min_trade_confidence: f64,
    pub require_date_validation: bool,
    pub require_category_match: bool,
    pub date_tolerance: Duration,
    pub aliases: AliasTable,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.95,
            min_trade_confidence: 0.95,
            require_date_validation: true,
            require_category_match: true,
            date_tolerance: Duration::hours(24),
            aliases: AliasTable::builtin(),
        }
    }
}

impl MatcherConfig {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        let aliases = match &cfg.alias_file {
            Some(path) => match AliasTable::from_json_file(Path::new(path)) {
                Ok(table) => table,
                Err(e) => {
                    warn!("Could not load alias file {}: {}; using builtins", path, e);
                    AliasTable::builtin()
                }
            },
            None => AliasTable::builtin(),
        };
        Self {
            fuzzy_threshold: cfg.fuzzy_threshold,
            min_trade_confidence: cfg.min_confidence_threshold,
            require_date_validation: cfg.require_date_validation,
            require_category_match: cfg.require_category_match,
            date_tolerance: Duration::hours(cfg.date_tolerance_hours),
            aliases,
        }
    }
}

// --- normalization & similarity -------------------------------------------

/// Normalize a market title: lowercase, strip punctuation, collapse
/// whitespace.
pub fn normalize_title(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tokenize a normalized title, applying the alias table. Multi-word alias
/// expansions contribute each of their words.
pub fn tokens(normalized: &str, aliases: &AliasTable) -> FxHashSet<String> {
    let mut set = FxHashSet::default();
    for token in normalized.split_whitespace() {
        for word in aliases.resolve(token).split_whitespace() {
            set.insert(word.to_string());
        }
    }
    set
}

/// Levenshtein similarity: `1 - distance / max_len`, in [0, 1].
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(a, b) as f64 / max_len as f64
}

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single-row dynamic program.
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let next = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

/// Jaccard similarity over token sets, in [0, 1].
pub fn jaccard(a: &FxHashSet<String>, b: &FxHashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Canonicalize a listing category for the equivalence check.
fn canonical_category(raw: &str) -> &'static str {
    match raw.to_lowercase().trim() {
        "sports" | "sport" | "games" => "sports",
        "crypto" | "cryptocurrency" | "digital assets" => "crypto",
        "politics" | "political" | "elections" | "election" => "politics",
        "economics" | "economy" | "finance" | "financials" | "macro" => "economics",
        "science" | "tech" | "technology" => "science",
        "weather" | "climate" => "weather",
        _ => "other",
    }
}

/// Whether two listing categories are compatible.
pub fn categories_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => canonical_category(a) == canonical_category(b),
        // A missing category cannot contradict anything.
        _ => true,
    }
}

// --- matching --------------------------------------------------------------

/// A scored candidate pair, before guard filtering.
#[derive(Debug, Clone)]
struct Candidate<'a> {
    listing: &'a MarketListing,
    confidence: f64,
    method: MatchMethod,
}

/// The in-memory mapping index plus the matching algorithm.
pub struct EventMatcher {
    config: MatcherConfig,
    inner: RwLock<MatcherState>,
}

#[derive(Default)]
struct MatcherState {
    /// All mappings by id, active or not (inactive kept for history).
    by_id: FxHashMap<String, EventMapping>,
    /// Active (v1_contract, v2_contract) pairs, for the uniqueness invariant.
    active_pairs: FxHashSet<(String, String)>,
}

impl EventMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(MatcherState::default()),
        }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Hydrate the index from previously persisted mappings (repository
    /// replay). Later records win on id collision.
    pub async fn hydrate(&self, mappings: Vec<EventMapping>) {
        let mut state = self.inner.write().await;
        for m in mappings {
            if m.active {
                state
                    .active_pairs
                    .insert((m.v1_contract.clone(), m.v2_contract.clone()));
            }
            state.by_id.insert(m.id.clone(), m);
        }
        info!(
            "Mapping index hydrated: {} mappings ({} active pairs)",
            state.by_id.len(),
            state.active_pairs.len()
        );
    }

    /// Find the best V2 match for a V1 listing among `v2_markets`.
    ///
    /// Scoring: exact normalized-title equality yields confidence 1.0;
    /// otherwise `max(levenshtein_similarity, jaccard)` must reach the fuzzy
    /// threshold. Date and category guards apply to BOTH paths when enabled.
    /// Among survivors the highest confidence wins; ties break on earlier
    /// resolution time, then lexicographically smaller V2 contract id, so
    /// repeated runs over the same listings are stable.
    ///
    /// The produced mapping is registered in the index. Returns `None` when
    /// no candidate survives or the winning pair is already actively mapped.
    pub async fn find_match(
        &self,
        v1_market: &MarketListing,
        v2_markets: &[MarketListing],
    ) -> Option<EventMapping> {
        let v1_norm = normalize_title(&v1_market.title);
        let v1_tokens = tokens(&v1_norm, &self.config.aliases);

        let mut survivors: Vec<Candidate<'_>> = Vec::new();
        for v2 in v2_markets {
            let v2_norm = normalize_title(&v2.title);

            let candidate = if v1_norm == v2_norm {
                Some(Candidate {
                    listing: v2,
                    confidence: 1.0,
                    method: MatchMethod::Exact,
                })
            } else {
                let v2_tokens = tokens(&v2_norm, &self.config.aliases);
                let similarity =
                    levenshtein_similarity(&v1_norm, &v2_norm).max(jaccard(&v1_tokens, &v2_tokens));
                if similarity >= self.config.fuzzy_threshold {
                    Some(Candidate {
                        listing: v2,
                        confidence: similarity,
                        method: MatchMethod::Fuzzy,
                    })
                } else {
                    None
                }
            };

            let Some(candidate) = candidate else { continue };

            if self.config.require_date_validation {
                let gap = v1_market.resolution_time - candidate.listing.resolution_time;
                if gap.abs() > self.config.date_tolerance {
                    debug!(
                        "match rejected on date guard: '{}' vs '{}' ({}h apart)",
                        v1_market.title,
                        candidate.listing.title,
                        gap.num_hours().abs()
                    );
                    continue;
                }
            }
            if self.config.require_category_match
                && !categories_compatible(
                    v1_market.category.as_deref(),
                    candidate.listing.category.as_deref(),
                )
            {
                debug!(
                    "match rejected on category guard: {:?} vs {:?}",
                    v1_market.category, candidate.listing.category
                );
                continue;
            }

            survivors.push(candidate);
        }

        // Highest confidence, ties by earlier resolution, then smaller id.
        survivors.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    a.listing
                        .resolution_time
                        .cmp(&b.listing.resolution_time),
                )
                .then(a.listing.contract_id.cmp(&b.listing.contract_id))
        });
        let winner = survivors.into_iter().next()?;

        let now = Utc::now();
        let mapping = EventMapping {
            id: Uuid::new_v4().to_string(),
            v1_contract: v1_market.contract_id.clone(),
            v2_contract: winner.listing.contract_id.clone(),
            description: v1_market.title.clone(),
            confidence: winner.confidence,
            method: winner.method,
            resolution_time: v1_market.resolution_time,
            outcome_alignment: "yes_yes".to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        };

        self.register(mapping).await
    }

    /// Register a manually declared equivalence at confidence 1.0.
    pub async fn add_manual(
        &self,
        v1_contract: &str,
        v2_contract: &str,
        description: &str,
    ) -> Option<EventMapping> {
        let now = Utc::now();
        let mapping = EventMapping {
            id: Uuid::new_v4().to_string(),
            v1_contract: v1_contract.to_string(),
            v2_contract: v2_contract.to_string(),
            description: description.to_string(),
            confidence: 1.0,
            method: MatchMethod::Manual,
            resolution_time: now + Duration::days(365),
            outcome_alignment: "yes_yes".to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.register(mapping).await
    }

    async fn register(&self, mapping: EventMapping) -> Option<EventMapping> {
        let mut state = self.inner.write().await;
        let pair = (mapping.v1_contract.clone(), mapping.v2_contract.clone());
        if state.active_pairs.contains(&pair) {
            debug!(
                "mapping {}<->{} already active, not re-registering",
                pair.0, pair.1
            );
            return None;
        }
        state.active_pairs.insert(pair);
        state.by_id.insert(mapping.id.clone(), mapping.clone());
        info!(
            event = "mapping_created",
            mapping_id = %mapping.id,
            method = %mapping.method,
            confidence = mapping.confidence,
            v1 = %mapping.v1_contract,
            v2 = %mapping.v2_contract,
            "Mapping registered"
        );
        Some(mapping)
    }

    /// Whether a mapping is eligible for trading.
    pub fn can_trade(&self, mapping: &EventMapping) -> bool {
        mapping.active && mapping.confidence >= self.config.min_trade_confidence
    }

    /// Snapshot of all currently active mappings.
    pub async fn active_mappings(&self) -> Vec<EventMapping> {
        let state = self.inner.read().await;
        let mut active: Vec<EventMapping> = state
            .by_id
            .values()
            .filter(|m| m.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    /// Deactivate a mapping, keeping it for historical reference. Only
    /// `active` and `updated_at` change.
    pub async fn deactivate(&self, mapping_id: &str) -> bool {
        let mut state = self.inner.write().await;
        let Some(m) = state.by_id.get_mut(mapping_id) else {
            return false;
        };
        if !m.active {
            return false;
        }
        m.active = false;
        m.updated_at = Utc::now();
        let pair = (m.v1_contract.clone(), m.v2_contract.clone());
        state.active_pairs.remove(&pair);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn listing(id: &str, title: &str, at: DateTime<Utc>, category: &str) -> MarketListing {
        MarketListing {
            contract_id: id.to_string(),
            title: title.to_string(),
            resolution_time: at,
            category: Some(category.to_string()),
        }
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("Will BTC close above $100K on Dec-31?"),
            "will btc close above 100k on dec 31"
        );
        assert_eq!(normalize_title("  A   B  "), "a b");
    }

    #[test]
    fn test_tokens_apply_aliases() {
        let aliases = AliasTable::builtin();
        let set = tokens("btc above 100k", &aliases);
        assert!(set.contains("bitcoin"));
        assert!(set.contains("100000"));
        assert!(!set.contains("btc"));
    }

    #[test]
    fn test_levenshtein_similarity() {
        assert!((levenshtein_similarity("abc", "abc") - 1.0).abs() < 1e-9);
        assert!((levenshtein_similarity("abc", "abd") - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
        assert!((levenshtein_similarity("", "") - 1.0).abs() < 1e-9);
        assert!(levenshtein_similarity("abc", "xyz") < 0.01);
    }

    #[test]
    fn test_jaccard() {
        let aliases = AliasTable::default();
        let a = tokens("bitcoin above 100000", &aliases);
        let b = tokens("bitcoin above 100000", &aliases);
        assert!((jaccard(&a, &b) - 1.0).abs() < 1e-9);

        let c = tokens("ethereum below 2000", &aliases);
        assert!(jaccard(&a, &c) < 0.2);
    }

    #[test]
    fn test_categories_compatible() {
        assert!(categories_compatible(Some("Crypto"), Some("cryptocurrency")));
        assert!(categories_compatible(Some("politics"), Some("Elections")));
        assert!(!categories_compatible(Some("sports"), Some("crypto")));
        // Missing category never contradicts.
        assert!(categories_compatible(None, Some("sports")));
    }

    #[tokio::test]
    async fn test_exact_match_confidence_one() {
        let matcher = EventMatcher::new(MatcherConfig::default());
        let when = ts(2026, 12, 31);
        let v1 = listing("v1-c1", "Will Bitcoin close above $100K?", when, "crypto");
        let v2s = vec![listing(
            "v2-c1",
            "Will Bitcoin close above $100k?",
            when,
            "crypto",
        )];

        let mapping = matcher.find_match(&v1, &v2s).await.expect("should match");
        assert_eq!(mapping.confidence, 1.0);
        assert_eq!(mapping.method, MatchMethod::Exact);
        assert!(matcher.can_trade(&mapping));
        assert_eq!(mapping.outcome_alignment, "yes_yes");
    }

    #[tokio::test]
    async fn test_fuzzy_below_threshold_yields_none() {
        let matcher = EventMatcher::new(MatcherConfig::default());
        let when = ts(2026, 12, 31);
        let v1 = listing("v1-c1", "Will Bitcoin close above $100K?", when, "crypto");
        let v2s = vec![listing(
            "v2-zzz",
            "Will Ethereum trade under $2000?",
            when,
            "crypto",
        )];

        assert!(matcher.find_match(&v1, &v2s).await.is_none());
    }

    #[tokio::test]
    async fn test_alias_tokens_rescue_fuzzy_match() {
        let mut config = MatcherConfig::default();
        config.fuzzy_threshold = 0.9;
        let matcher = EventMatcher::new(config);
        let when = ts(2026, 12, 31);
        // Same question, ticker vs name and 100k vs 100000.
        let v1 = listing("v1-c1", "BTC above 100k on December 31", when, "crypto");
        let v2s = vec![listing(
            "v2-c1",
            "Bitcoin above 100000 on December 31",
            when,
            "crypto",
        )];

        let mapping = matcher.find_match(&v1, &v2s).await.expect("alias match");
        assert_eq!(mapping.method, MatchMethod::Fuzzy);
        assert!(mapping.confidence >= 0.9);
    }

    #[tokio::test]
    async fn test_exact_match_rejected_on_misaligned_dates() {
        // Identical titles, resolutions six months apart, date guard on.
        let matcher = EventMatcher::new(MatcherConfig::default());
        let v1 = listing(
            "v1-c1",
            "Will the incumbent win the election?",
            ts(2026, 11, 3),
            "politics",
        );
        let v2s = vec![listing(
            "v2-c1",
            "Will the incumbent win the election?",
            ts(2027, 5, 3),
            "politics",
        )];

        assert!(matcher.find_match(&v1, &v2s).await.is_none());
    }

    #[tokio::test]
    async fn test_category_guard() {
        let matcher = EventMatcher::new(MatcherConfig::default());
        let when = ts(2026, 6, 1);
        let v1 = listing("v1-c1", "Will it happen by June?", when, "sports");
        let v2s = vec![listing("v2-c1", "Will it happen by June?", when, "crypto")];
        assert!(matcher.find_match(&v1, &v2s).await.is_none());

        let mut config = MatcherConfig::default();
        config.require_category_match = false;
        let relaxed = EventMatcher::new(config);
        assert!(relaxed.find_match(&v1, &v2s).await.is_some());
    }

    #[tokio::test]
    async fn test_tie_break_stable() {
        let matcher = EventMatcher::new(MatcherConfig::default());
        let when = ts(2026, 6, 1);
        let v1 = listing("v1-c1", "Same exact title", when, "crypto");
        // Two exact candidates; the earlier resolution wins, then smaller id.
        let v2s = vec![
            listing("v2-bbb", "Same exact title", when, "crypto"),
            listing("v2-aaa", "Same exact title", when, "crypto"),
        ];

        let mapping = matcher.find_match(&v1, &v2s).await.unwrap();
        assert_eq!(mapping.v2_contract, "v2-aaa");
    }

    #[tokio::test]
    async fn test_active_pair_uniqueness() {
        let matcher = EventMatcher::new(MatcherConfig::default());
        let when = ts(2026, 6, 1);
        let v1 = listing("v1-c1", "One of a kind", when, "crypto");
        let v2s = vec![listing("v2-c1", "One of a kind", when, "crypto")];

        assert!(matcher.find_match(&v1, &v2s).await.is_some());
        // Second pass over the same listings must not duplicate the pair.
        assert!(matcher.find_match(&v1, &v2s).await.is_none());
        assert_eq!(matcher.active_mappings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_add_and_deactivate() {
        let matcher = EventMatcher::new(MatcherConfig::default());
        let mapping = matcher
            .add_manual("v1-m", "v2-m", "operator-declared pair")
            .await
            .unwrap();
        assert_eq!(mapping.method, MatchMethod::Manual);
        assert_eq!(mapping.confidence, 1.0);
        assert!(matcher.can_trade(&mapping));

        assert!(matcher.deactivate(&mapping.id).await);
        assert!(matcher.active_mappings().await.is_empty());
        // Deactivating twice is a no-op.
        assert!(!matcher.deactivate(&mapping.id).await);

        // The pair can be re-registered once inactive.
        assert!(matcher
            .add_manual("v1-m", "v2-m", "operator-declared pair")
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_can_trade_gate() {
        let mut config = MatcherConfig::default();
        config.fuzzy_threshold = 0.5;
        config.min_trade_confidence = 0.95;
        let matcher = EventMatcher::new(config);
        let when = ts(2026, 6, 1);

        // A sloppy fuzzy match above 0.5 but below 0.95 exists but must not
        // be tradable.
        let v1 = listing("v1-c1", "Will the home team win on Friday", when, "sports");
        let v2s = vec![listing(
            "v2-c1",
            "Will the home team win on Friday night",
            when,
            "sports",
        )];
        let mapping = matcher.find_match(&v1, &v2s).await.unwrap();
        assert!(mapping.confidence < 0.95);
        assert!(!matcher.can_trade(&mapping));
    }

    #[tokio::test]
    async fn test_hydrate_restores_pairs() {
        let matcher = EventMatcher::new(MatcherConfig::default());
        let now = Utc::now();
        let m = EventMapping {
            id: "m-1".into(),
            v1_contract: "v1-c1".into(),
            v2_contract: "v2-c1".into(),
            description: "restored".into(),
            confidence: 1.0,
            method: MatchMethod::Manual,
            resolution_time: now,
            outcome_alignment: "yes_yes".into(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        matcher.hydrate(vec![m]).await;
        assert_eq!(matcher.active_mappings().await.len(), 1);
        // Uniqueness survives hydration.
        assert!(matcher.add_manual("v1-c1", "v2-c1", "dup").await.is_none());
    }
}
