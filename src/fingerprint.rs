use crate::model::{Notice, RunState};
use crate::text::tokens;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use url::Url;

pub const SEPARATOR: &str = " || ";

/// The canonical link when it is a real absolute URL; otherwise a composite of
/// header tokens, sale date and price digits, so that cosmetic rewording of
/// the same notice keeps its identity.
pub fn fingerprint(
    header: &str,
    sale_date: Option<NaiveDate>,
    price: Option<&str>,
    canonical_link: &str,
    fallback_url: &str,
) -> String {
    if canonical_link != fallback_url && is_absolute_http(canonical_link) {
        return canonical_link.to_string();
    }

    let header = tokens(header).join(" ");
    let date = sale_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let price: String = price
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    [header, date, price].join(SEPARATOR)
}

fn is_absolute_http(link: &str) -> bool {
    Url::parse(link).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
}

pub fn new_notices<'a>(notices: &'a [Notice], previous: &RunState) -> Vec<&'a Notice> {
    let mut reported: HashSet<(&str, &str)> = HashSet::new();
    notices
        .iter()
        .filter(|n| !n.is_diagnostic())
        .filter(|n| {
            previous
                .seen(&n.locality)
                .is_none_or(|seen| !seen.contains(&n.fingerprint))
        })
        .filter(|n| reported.insert((n.locality.as_str(), n.fingerprint.as_str())))
        .collect()
}

pub fn next_state(localities: &[String], notices: &[Notice]) -> RunState {
    let mut sets: BTreeMap<String, BTreeSet<String>> = localities
        .iter()
        .map(|l| (l.clone(), BTreeSet::new()))
        .collect();

    for notice in notices.iter().filter(|n| !n.is_diagnostic()) {
        sets.entry(notice.locality.clone())
            .or_default()
            .insert(notice.fingerprint.clone());
    }

    RunState {
        localities: sets,
        ..RunState::default()
    }
}
