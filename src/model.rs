use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Region,
    Province,
    Municipality,
    PageSize,
}

impl FieldRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldRole::Region => "region",
            FieldRole::Province => "province",
            FieldRole::Municipality => "municipality",
            FieldRole::PageSize => "page_size",
        }
    }
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub role: FieldRole,
    pub control: usize,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateLink {
    pub href: String,
    pub context: String,
}

impl CandidateLink {
    pub fn new(href: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            context: context.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    #[default]
    Listing,
    Diagnostic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub locality: String,
    #[serde(default)]
    pub kind: NoticeKind,
    pub header: String,
    pub body: String,
    pub links: Vec<CandidateLink>,
    pub canonical_link: String,
    pub sale_date: Option<NaiveDate>,
    pub price: Option<String>,
    pub fingerprint: String,
}

impl Notice {
    pub fn is_diagnostic(&self) -> bool {
        self.kind == NoticeKind::Diagnostic
    }
}

pub const STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunState {
    pub schema_version: u32,
    pub localities: BTreeMap<String, BTreeSet<String>>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            localities: BTreeMap::new(),
        }
    }
}

impl RunState {
    pub fn seen(&self, locality: &str) -> Option<&BTreeSet<String>> {
        self.localities.get(locality)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LocalityReport {
    pub locality: String,
    pub blocks_found: usize,
    pub active: usize,
    pub new: usize,
    pub diagnostics: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub site: String,
    pub search_url: String,
    pub today: NaiveDate,
    pub localities: Vec<LocalityReport>,
    pub notices: Vec<Notice>,
    pub new_notices: Vec<Notice>,
}
