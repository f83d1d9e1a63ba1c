use crate::config::{SearchMode, SiteConfig, TimingConfig, load_config};
use crate::consent::ConsentDismisser;
use crate::dates::{is_active, today_in};
use crate::driver::{PageDriver, Session, SessionFactory};
use crate::error::ScrapeError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::fingerprint::{new_notices, next_state};
use crate::form_driver::HttpSessionFactory;
use crate::links::LinkResolver;
use crate::model::{LocalityReport, Notice, RunState, ScanReport};
use crate::notice::{NoticeBuilder, diagnostic_notice};
use crate::segment::{RawBlock, Segmenter, mentions_locality};
use crate::sequencer::Sequencer;
use crate::store::{load_state, save_state};
use anyhow::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub report: ScanReport,
    pub state: RunState,
}

pub fn scan(options: &ScanOptions) -> Result<ScanReport> {
    let config = load_config(&options.config_path)?;
    let previous = load_state(&options.state_path)?;
    let factory = HttpSessionFactory::from_config(&config)?;
    let fetcher = if config.fetch.resolve_links {
        Some(HttpFetcher::from_config(&config.fetch)?)
    } else {
        None
    };
    let today = today_in(config.timezone());

    let outcome = run_scan(
        &config,
        &factory,
        fetcher.as_ref().map(|f| f as &dyn Fetcher),
        &previous,
        today,
    )?;

    if !options.dry_run {
        save_state(&options.state_path, &outcome.state)?;
        info!(state = %options.state_path.display(), "state written");
    } else {
        info!("dry run enabled; state not persisted");
    }

    Ok(outcome.report)
}

pub fn run_scan<F: SessionFactory>(
    config: &SiteConfig,
    factory: &F,
    fetcher: Option<&dyn Fetcher>,
    previous: &RunState,
    today: NaiveDate,
) -> Result<ScanOutcome> {
    let search_url = config.search_url()?;
    let consent = if config.consent.enabled {
        ConsentDismisser::from_config(&config.consent, &config.timing)
    } else {
        ConsentDismisser::disabled()
    };
    let sequencer = Sequencer::new(config, &consent);
    let resolver = LinkResolver::new(&config.links, &search_url, fetcher);
    let scanner = Scanner {
        config,
        factory,
        sequencer,
        resolver,
        search_url: search_url.clone(),
        today,
    };

    let localities = &config.search.localities;
    let harvested = match config.search.mode {
        SearchMode::PerLocality => localities
            .iter()
            .map(|locality| scanner.scan_locality(locality))
            .collect::<Vec<_>>(),
        SearchMode::Bulk => scanner.scan_bulk(localities),
    };

    let mut notices = Vec::new();
    let mut reports = Vec::with_capacity(harvested.len());
    for mut harvest in harvested {
        harvest
            .notices
            .retain(|n| n.is_diagnostic() || is_active(n.sale_date, today));
        let fresh = new_notices(&harvest.notices, previous).len();
        let report = LocalityReport {
            locality: harvest.locality.clone(),
            blocks_found: harvest.blocks_found,
            active: harvest.notices.iter().filter(|n| !n.is_diagnostic()).count(),
            new: fresh,
            diagnostics: harvest.notices.iter().filter(|n| n.is_diagnostic()).count(),
        };
        info!(
            locality = %report.locality,
            blocks = report.blocks_found,
            active = report.active,
            new = report.new,
            diagnostics = report.diagnostics,
            "locality summary"
        );
        reports.push(report);
        notices.extend(harvest.notices);
    }

    let fresh: Vec<Notice> = new_notices(&notices, previous)
        .into_iter()
        .cloned()
        .collect();
    let state = next_state(localities, &notices);

    Ok(ScanOutcome {
        report: ScanReport {
            site: config.site.name.clone(),
            search_url: search_url.to_string(),
            today,
            localities: reports,
            notices,
            new_notices: fresh,
        },
        state,
    })
}

pub fn extract_offline(
    config: &SiteConfig,
    html: &str,
    base_url: &Url,
    locality: &str,
    today: NaiveDate,
) -> Vec<Notice> {
    let segmenter = Segmenter::new(&config.segment, base_url.clone());
    let resolver = LinkResolver::new(&config.links, base_url, None);
    let builder = NoticeBuilder::new(&resolver, base_url.as_str(), today);

    let blocks = segmenter.segment_html(html);
    info!(locality, blocks = blocks.len(), "segmented saved page");
    blocks
        .iter()
        .map(|block| builder.build(locality, block))
        .filter(|n| is_active(n.sale_date, today))
        .collect()
}

struct Harvest {
    locality: String,
    blocks_found: usize,
    notices: Vec<Notice>,
}

struct ResultsPage {
    url: String,
    html: String,
}

struct Scanner<'a, F: SessionFactory> {
    config: &'a SiteConfig,
    factory: &'a F,
    sequencer: Sequencer<'a>,
    resolver: LinkResolver<'a>,
    search_url: Url,
    today: NaiveDate,
}

impl<F: SessionFactory> Scanner<'_, F> {
    fn scan_locality(&self, locality: &str) -> Harvest {
        info!(locality, "locality search start");
        match self.search_once(Some(locality)) {
            Ok(page) => {
                let blocks = self.segment(&page);
                let notices = self.build_all(locality, &page, &blocks);
                Harvest {
                    locality: locality.to_string(),
                    blocks_found: blocks.len(),
                    notices,
                }
            }
            Err(err) => self.failed(locality, &err),
        }
    }

    fn scan_bulk(&self, localities: &[String]) -> Vec<Harvest> {
        info!(localities = localities.len(), "bulk search start");
        let page = match self.search_once(None) {
            Ok(page) => page,
            Err(err) => return localities.iter().map(|l| self.failed(l, &err)).collect(),
        };

        let blocks = self.segment(&page);
        let mut assigned: Vec<Vec<RawBlock>> = vec![Vec::new(); localities.len()];
        for block in blocks {
            let text = block.text();
            match localities.iter().position(|l| mentions_locality(&text, l)) {
                Some(slot) => assigned[slot].push(block),
                None => debug!(header = %block.header, "block mentions no target locality"),
            }
        }

        localities
            .iter()
            .zip(assigned)
            .map(|(locality, blocks)| Harvest {
                locality: locality.clone(),
                blocks_found: blocks.len(),
                notices: self.build_all(locality, &page, &blocks),
            })
            .collect()
    }

    /// Opens a session, runs the search and snapshots the results. The session
    /// is released before this returns, whatever the outcome.
    fn search_once(&self, municipality: Option<&str>) -> Result<ResultsPage, ScrapeError> {
        let mut session = Session::<F::Driver>::open(self.factory)
            .map_err(|err| ScrapeError::Session(err.to_string()))?;
        let timeout = TimingConfig::ms(self.config.timing.navigate_timeout_ms);
        session
            .navigate(self.search_url.as_str(), timeout)
            .map_err(|source| ScrapeError::Navigation {
                url: self.search_url.to_string(),
                source,
            })?;

        self.sequencer.search(&mut *session, municipality)?;
        let html = session.content()?;
        Ok(ResultsPage {
            url: session.current_url(),
            html,
        })
    }

    fn segment(&self, page: &ResultsPage) -> Vec<RawBlock> {
        let base = Url::parse(&page.url).unwrap_or_else(|_| self.search_url.clone());
        let blocks = Segmenter::new(&self.config.segment, base).segment_html(&page.html);
        info!(url = %page.url, blocks = blocks.len(), "results segmented");
        blocks
    }

    fn build_all(&self, locality: &str, page: &ResultsPage, blocks: &[RawBlock]) -> Vec<Notice> {
        let fallback = if page.url.is_empty() {
            self.search_url.as_str()
        } else {
            page.url.as_str()
        };
        let builder = NoticeBuilder::new(&self.resolver, fallback, self.today);
        blocks
            .iter()
            .map(|block| builder.build(locality, block))
            .collect()
    }

    fn failed(&self, locality: &str, err: &ScrapeError) -> Harvest {
        warn!(locality, kind = err.kind(), error = %err, "locality search failed");
        Harvest {
            locality: locality.to_string(),
            blocks_found: 0,
            notices: vec![diagnostic_notice(locality, err, self.search_url.as_str())],
        }
    }
}
