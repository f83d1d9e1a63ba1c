use crate::model::FieldRole;
use anyhow::{Context, Result, bail};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub site: SiteMeta,
    pub search: SearchConfig,
    #[serde(default)]
    pub signatures: SignatureConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub consent: ConsentConfig,
    #[serde(default)]
    pub segment: SegmentConfig,
    #[serde(default)]
    pub links: LinkConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl SiteConfig {
    pub fn validate(&self) -> Result<()> {
        if self.site.name.trim().is_empty() {
            bail!("site.name must not be empty");
        }
        Url::parse(&self.site.search_url)
            .with_context(|| format!("site.search_url is not a url: {}", self.site.search_url))?;
        if self.site.timezone.parse::<Tz>().is_err() {
            bail!("site.timezone is not a known zone: {}", self.site.timezone);
        }
        if self.search.region.trim().is_empty() {
            bail!("search.region must not be empty");
        }
        if self.search.province.trim().is_empty() {
            bail!("search.province must not be empty");
        }
        if self.search.localities.iter().all(|l| l.trim().is_empty()) {
            bail!("search.localities must name at least one locality");
        }
        if self.timing.poll_interval_ms == 0 {
            bail!("timing.poll_interval_ms must be positive");
        }
        if self.segment.institutional_marker.trim().is_empty() {
            bail!("segment.institutional_marker must not be empty");
        }
        Ok(())
    }

    pub fn search_url(&self) -> Result<Url> {
        Url::parse(&self.site.search_url)
            .with_context(|| format!("invalid search_url {}", self.site.search_url))
    }

    pub fn timezone(&self) -> Tz {
        self.site.timezone.parse::<Tz>().unwrap_or(chrono_tz::Europe::Rome)
    }

    pub fn signature_for(&self, role: FieldRole) -> &Signature {
        match role {
            FieldRole::Region => &self.signatures.region,
            FieldRole::Province => &self.signatures.province,
            FieldRole::Municipality => &self.signatures.municipality,
            FieldRole::PageSize => &self.signatures.page_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteMeta {
    pub name: String,
    pub search_url: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    PerLocality,
    Bulk,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub mode: SearchMode,
    pub region: String,
    pub province: String,
    pub localities: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: Option<String>,
    #[serde(default = "default_pre_search_clicks")]
    pub pre_search_clicks: Vec<String>,
    #[serde(default = "default_submit")]
    pub submit: String,
    #[serde(default = "default_municipality_input")]
    pub municipality_input: Option<String>,
    #[serde(default = "default_uncheck_before_submit")]
    pub uncheck_before_submit: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct Signature {
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
    #[serde(skip)]
    pub required: Option<String>,
}

impl Signature {
    pub fn new(positive: &[&str], negative: &[&str]) -> Self {
        Self {
            positive: positive.iter().map(|s| s.to_string()).collect(),
            negative: negative.iter().map(|s| s.to_string()).collect(),
            required: None,
        }
    }

    pub fn requiring(&self, value: &str) -> Self {
        let value = value.trim();
        Self {
            positive: self.positive.clone(),
            negative: self.negative.clone(),
            required: (!value.is_empty()).then(|| value.to_string()),
        }
    }

    pub fn wanted(&self) -> Vec<String> {
        self.positive.iter().chain(&self.required).cloned().collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignatureConfig {
    #[serde(default = "default_region_signature")]
    pub region: Signature,
    #[serde(default = "default_filter_signature")]
    pub province: Signature,
    #[serde(default = "default_filter_signature")]
    pub municipality: Signature,
    #[serde(default = "default_page_size_signature")]
    pub page_size: Signature,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            region: default_region_signature(),
            province: default_filter_signature(),
            municipality: default_filter_signature(),
            page_size: default_page_size_signature(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_navigate_timeout_ms")]
    pub navigate_timeout_ms: u64,
    #[serde(default = "default_locator_timeout_ms")]
    pub locator_timeout_ms: u64,
    #[serde(default = "default_dependent_timeout_ms")]
    pub dependent_timeout_ms: u64,
    #[serde(default = "default_select_timeout_ms")]
    pub select_timeout_ms: u64,
    #[serde(default = "default_optional_timeout_ms")]
    pub optional_timeout_ms: u64,
    #[serde(default = "default_click_timeout_ms")]
    pub click_timeout_ms: u64,
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
    #[serde(default = "default_results_timeout_ms")]
    pub results_timeout_ms: u64,
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            navigate_timeout_ms: default_navigate_timeout_ms(),
            locator_timeout_ms: default_locator_timeout_ms(),
            dependent_timeout_ms: default_dependent_timeout_ms(),
            select_timeout_ms: default_select_timeout_ms(),
            optional_timeout_ms: default_optional_timeout_ms(),
            click_timeout_ms: default_click_timeout_ms(),
            submit_timeout_ms: default_submit_timeout_ms(),
            results_timeout_ms: default_results_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_banner")]
    pub banner: String,
    #[serde(default = "default_affordances")]
    pub affordances: Vec<String>,
    #[serde(default = "default_appear_timeout_ms")]
    pub appear_timeout_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
    #[serde(default = "default_dismiss_budget_ms")]
    pub dismiss_budget_ms: u64,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            banner: default_banner(),
            affordances: default_affordances(),
            appear_timeout_ms: default_appear_timeout_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            settle_timeout_ms: default_settle_timeout_ms(),
            dismiss_budget_ms: default_dismiss_budget_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentConfig {
    #[serde(default = "default_institutional_marker")]
    pub institutional_marker: String,
    #[serde(default = "default_lot_marker")]
    pub lot_marker: String,
    #[serde(default)]
    pub require_lot_marker: bool,
    #[serde(default = "default_max_header_len")]
    pub max_header_len: usize,
    #[serde(default = "default_excluded")]
    pub excluded: Vec<String>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            institutional_marker: default_institutional_marker(),
            lot_marker: default_lot_marker(),
            require_lot_marker: false,
            max_header_len: default_max_header_len(),
            excluded: default_excluded(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Redirector {
    pub domain: String,
    #[serde(default = "default_redirect_params")]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Keyword {
    pub term: String,
    pub weight: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_document_weight")]
    pub document: i32,
    #[serde(default = "default_trusted_weight")]
    pub trusted_portal: i32,
    #[serde(default = "default_redirector_weight")]
    pub redirector: i32,
    #[serde(default = "default_origin_weight")]
    pub origin: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            document: default_document_weight(),
            trusted_portal: default_trusted_weight(),
            redirector: default_redirector_weight(),
            origin: default_origin_weight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_document_extensions")]
    pub document_extensions: Vec<String>,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_trusted_domains")]
    pub trusted_domains: Vec<String>,
    #[serde(default = "default_redirectors")]
    pub redirectors: Vec<Redirector>,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<Keyword>,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default = "default_decode_passes")]
    pub decode_passes: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            document_extensions: default_document_extensions(),
            image_extensions: default_image_extensions(),
            trusted_domains: default_trusted_domains(),
            redirectors: default_redirectors(),
            keywords: default_keywords(),
            weights: ScoreWeights::default(),
            decode_passes: default_decode_passes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_true")]
    pub resolve_links: bool,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            resolve_links: true,
            timeout_secs: default_fetch_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: None,
            headers: BTreeMap::new(),
        }
    }
}

pub fn parse_config(text: &str) -> Result<SiteConfig> {
    let config: SiteConfig = toml::from_str(text).context("failed to parse site config toml")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<SiteConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read site config: {}", path.display()))?;
    parse_config(&text).with_context(|| format!("invalid site config {}", path.display()))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "Europe/Rome".to_string()
}

fn default_page_size() -> Option<String> {
    Some("50".to_string())
}

fn default_pre_search_clicks() -> Vec<String> {
    strings(&["text:Beni Immobili", "text:Ricerca Generale"])
}

fn default_submit() -> String {
    "css:input[type=\"submit\"][value=\"Mostra il risultato\"]".to_string()
}

fn default_municipality_input() -> Option<String> {
    Some("css:input[id*=\"comun\" i], input[name*=\"comun\" i]".to_string())
}

fn default_uncheck_before_submit() -> Vec<String> {
    strings(&["text:Includi le aste passate"])
}

fn sort_order_labels() -> Vec<String> {
    strings(&[
        "Convenienza",
        "Prezzo crescente",
        "Prezzo decrescente",
        "Data crescente",
        "Data decrescente",
    ])
}

fn default_region_signature() -> Signature {
    Signature {
        positive: strings(&["Lombardia", "Veneto"]),
        negative: sort_order_labels(),
        required: None,
    }
}

fn default_filter_signature() -> Signature {
    Signature {
        positive: Vec::new(),
        negative: sort_order_labels(),
        required: None,
    }
}

fn default_page_size_signature() -> Signature {
    Signature {
        positive: strings(&["10", "25", "50"]),
        negative: sort_order_labels(),
        required: None,
    }
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_navigate_timeout_ms() -> u64 {
    60_000
}

fn default_locator_timeout_ms() -> u64 {
    8_000
}

fn default_dependent_timeout_ms() -> u64 {
    15_000
}

fn default_select_timeout_ms() -> u64 {
    10_000
}

fn default_optional_timeout_ms() -> u64 {
    2_500
}

fn default_click_timeout_ms() -> u64 {
    1_500
}

fn default_submit_timeout_ms() -> u64 {
    5_000
}

fn default_results_timeout_ms() -> u64 {
    15_000
}

fn default_banner() -> String {
    "css:#iubenda-cs-banner".to_string()
}

fn default_affordances() -> Vec<String> {
    strings(&[
        "css:#iubenda-cs-banner #iubenda-cs-accept-btn",
        "css:#iubenda-cs-banner .iubenda-cs-accept-btn",
        "text:Accetta@#iubenda-cs-banner",
        "css:#iubenda-cs-banner #iubenda-cs-reject-btn",
        "css:#iubenda-cs-banner .iubenda-cs-reject-btn",
        "text:Rifiuta@#iubenda-cs-banner",
        "css:#iubenda-cs-banner .iubenda-cs-close-btn",
        "text:Chiudi@#iubenda-cs-banner",
        "text:Continua senza accettare@#iubenda-cs-banner",
        "text:OK@#iubenda-cs-banner",
    ])
}

fn default_appear_timeout_ms() -> u64 {
    4_000
}

fn default_attempt_timeout_ms() -> u64 {
    1_200
}

fn default_settle_timeout_ms() -> u64 {
    300
}

fn default_dismiss_budget_ms() -> u64 {
    10_000
}

fn default_institutional_marker() -> String {
    "TRIBUNALE DI".to_string()
}

fn default_lot_marker() -> String {
    "LOTTO".to_string()
}

fn default_max_header_len() -> usize {
    220
}

fn default_excluded() -> Vec<String> {
    strings(&[
        "nav",
        "body > header",
        "body > footer",
        "[role=banner]",
        "[role=contentinfo]",
        "form",
        "script",
        "style",
        "noscript",
        "#iubenda-cs-banner",
    ])
}

fn default_redirect_params() -> Vec<String> {
    strings(&["url", "u", "q", "target", "dest"])
}

fn default_document_extensions() -> Vec<String> {
    strings(&["pdf", "doc", "docx", "rtf", "odt", "p7m"])
}

fn default_image_extensions() -> Vec<String> {
    strings(&["jpg", "jpeg", "png", "gif", "svg", "webp", "bmp", "ico"])
}

fn default_trusted_domains() -> Vec<String> {
    strings(&[
        "portalevenditepubbliche.giustizia.it",
        "pvp.giustizia.it",
        "astegiudiziarie.it",
        "astalegale.net",
        "asteannunci.it",
        "astetelematiche.it",
        "fallcoaste.it",
    ])
}

fn default_redirectors() -> Vec<Redirector> {
    vec![
        Redirector {
            domain: "google.com".to_string(),
            params: strings(&["q", "url"]),
        },
        Redirector {
            domain: "safelinks.protection.outlook.com".to_string(),
            params: strings(&["url"]),
        },
        Redirector {
            domain: "l.facebook.com".to_string(),
            params: strings(&["u"]),
        },
    ]
}

fn default_keywords() -> Vec<Keyword> {
    [
        ("avviso di vendita", 40),
        ("perizia", 30),
        ("autorizzazione", 20),
        ("ordinanza", 20),
        ("delega", 15),
    ]
    .into_iter()
    .map(|(term, weight)| Keyword {
        term: term.to_string(),
        weight,
    })
    .collect()
}

fn default_document_weight() -> i32 {
    100
}

fn default_trusted_weight() -> i32 {
    80
}

fn default_redirector_weight() -> i32 {
    50
}

fn default_origin_weight() -> i32 {
    10
}

fn default_decode_passes() -> usize {
    4
}

fn default_fetch_timeout_secs() -> u64 {
    5
}

fn default_max_redirects() -> usize {
    10
}
