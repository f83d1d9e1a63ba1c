use crate::dates::sale_date;
use crate::error::ScrapeError;
use crate::fingerprint::fingerprint;
use crate::links::LinkResolver;
use crate::model::{CandidateLink, Notice, NoticeKind};
use crate::segment::RawBlock;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)prezzo\s+base[^0-9€]{0,40}(?:€|euro)?\s*(\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:,\d{1,2})?)",
    )
    .expect("price regex must be valid")
});

pub fn extract_price(text: &str) -> Option<String> {
    PRICE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub struct NoticeBuilder<'a> {
    resolver: &'a LinkResolver<'a>,
    fallback_url: &'a str,
    today: NaiveDate,
}

impl<'a> NoticeBuilder<'a> {
    pub fn new(resolver: &'a LinkResolver<'a>, fallback_url: &'a str, today: NaiveDate) -> Self {
        Self {
            resolver,
            fallback_url,
            today,
        }
    }

    pub fn build(&self, locality: &str, block: &RawBlock) -> Notice {
        let text = block.text();
        let sale_date = sale_date(&text, self.today);
        let price = extract_price(&text);
        let resolved = self.resolver.resolve(&block.links, self.fallback_url);
        let fingerprint = fingerprint(
            &block.header,
            sale_date,
            price.as_deref(),
            &resolved.canonical.href,
            self.fallback_url,
        );

        Notice {
            locality: locality.to_string(),
            kind: NoticeKind::Listing,
            header: block.header.clone(),
            body: block.body.clone(),
            links: resolved.links,
            canonical_link: resolved.canonical.href,
            sale_date,
            price,
            fingerprint,
        }
    }
}

pub fn diagnostic_notice(locality: &str, error: &ScrapeError, search_url: &str) -> Notice {
    let header = format!("ERRORE scraping per {locality} ({})", error.kind());
    Notice {
        locality: locality.to_string(),
        kind: NoticeKind::Diagnostic,
        fingerprint: format!("diagnostic{}{}", crate::fingerprint::SEPARATOR, header),
        header,
        body: error.to_string(),
        links: vec![CandidateLink::new(search_url, "search page")],
        canonical_link: search_url.to_string(),
        sale_date: None,
        price: None,
    }
}
