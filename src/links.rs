use crate::config::LinkConfig;
use crate::fetch::Fetcher;
use crate::model::CandidateLink;
use crate::text::fold;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

pub const EXCLUDED_SCORE: i32 = i32::MIN / 2;

static EMBEDDED_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://").expect("embedded url regex must be valid"));

static ENCODED_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?%(?:25)*3A%(?:25)*2F%(?:25)*2F").expect("encoded url regex must be valid")
});

pub fn normalize_href(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:") || lower.starts_with("data:") {
        return None;
    }
    if lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return Some(href.to_string());
    }

    let parsed = if href.starts_with("//") {
        Url::parse(&format!("{}:{href}", base.scheme()))
    } else if lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(href)
    } else if lower.starts_with("www.") {
        Url::parse(&format!("https://{href}"))
    } else {
        base.join(href)
    };

    parsed.ok().map(|url| url.to_string())
}

pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn same_site(host: &str, origin_host: &str) -> bool {
    let strip = |h: &str| h.trim_start_matches("www.").to_ascii_lowercase();
    !origin_host.is_empty() && strip(host) == strip(origin_host)
}

fn extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Percent-decodes `value` up to `passes` times and returns the embedded
/// destination. With two or more embedded URLs (a wrapped redirect) the last
/// one is the real destination.
pub fn embedded_destination(value: &str, passes: usize) -> Option<String> {
    let mut decoded = value.to_string();
    for _ in 0..passes {
        // Escapes left in a plain URL belong to the destination itself.
        if EMBEDDED_URL_RE.is_match(&decoded) && !ENCODED_URL_RE.is_match(&decoded) {
            break;
        }
        let next = match urlencoding::decode(&decoded) {
            Ok(next) => next.into_owned(),
            Err(_) => break,
        };
        if next == decoded {
            break;
        }
        decoded = next;
    }

    let starts: Vec<usize> = EMBEDDED_URL_RE.find_iter(&decoded).map(|m| m.start()).collect();
    let start = if starts.len() >= 2 {
        *starts.last()?
    } else {
        *starts.first()?
    };

    let tail = &decoded[start..];
    let end = tail.find(char::is_whitespace).unwrap_or(tail.len());
    Some(tail[..end].to_string())
}

pub fn decode_redirect(url: &str, rules: &LinkConfig) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let redirector = rules
        .redirectors
        .iter()
        .find(|r| host_matches(host, &r.domain))?;
    let query = parsed.query()?;

    let mut other = None;
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let known = redirector.params.iter().any(|p| p.eq_ignore_ascii_case(key));
        if known {
            if let Some(dest) = embedded_destination(value, rules.decode_passes) {
                return Some(dest);
            }
        } else if other.is_none() {
            other = embedded_destination(value, rules.decode_passes);
        }
    }
    other
}

pub fn is_redirector(url: &str, rules: &LinkConfig) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| rules.redirectors.iter().any(|r| host_matches(h, &r.domain))))
        .unwrap_or(false)
}

pub fn score_link(link: &CandidateLink, rules: &LinkConfig, origin_host: &str) -> i32 {
    let lower = link.href.trim().to_ascii_lowercase();
    if lower.starts_with("mailto:") || lower.starts_with("tel:") {
        return EXCLUDED_SCORE;
    }
    let Ok(url) = Url::parse(&link.href) else {
        return EXCLUDED_SCORE;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return EXCLUDED_SCORE;
    }

    let ext = extension(&url);
    let has_ext = |list: &[String]| {
        ext.as_deref()
            .is_some_and(|e| list.iter().any(|x| x.eq_ignore_ascii_case(e)))
    };
    if has_ext(&rules.image_extensions) {
        return EXCLUDED_SCORE;
    }

    let weights = &rules.weights;
    let mut score = 0;

    if has_ext(&rules.document_extensions) {
        score += weights.document;
        let context = fold(&link.context);
        score += rules
            .keywords
            .iter()
            .filter(|k| context.contains(&fold(&k.term)))
            .map(|k| k.weight)
            .sum::<i32>();
    }

    let host = url.host_str().unwrap_or_default();
    if rules.trusted_domains.iter().any(|d| host_matches(host, d)) {
        score += weights.trusted_portal;
    }
    if rules.redirectors.iter().any(|r| host_matches(host, &r.domain)) {
        score += weights.redirector;
    }
    if same_site(host, origin_host) {
        score += weights.origin;
    }

    score
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    pub href: String,
    pub score: i32,
    pub index: Option<usize>,
}

impl Canonical {
    pub fn is_fallback(&self) -> bool {
        self.index.is_none()
    }
}

/// Highest score wins, first-encountered on ties; no eligible candidate means
/// the fallback URL.
pub fn select_canonical(
    links: &[CandidateLink],
    rules: &LinkConfig,
    origin_host: &str,
    fallback: &str,
) -> Canonical {
    let mut best: Option<Canonical> = None;
    for (index, link) in links.iter().enumerate() {
        let score = score_link(link, rules, origin_host);
        if score <= EXCLUDED_SCORE {
            continue;
        }
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(Canonical {
                href: link.href.clone(),
                score,
                index: Some(index),
            });
        }
    }

    best.unwrap_or_else(|| Canonical {
        href: fallback.to_string(),
        score: EXCLUDED_SCORE,
        index: None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLinks {
    pub links: Vec<CandidateLink>,
    pub canonical: Canonical,
}

pub struct LinkResolver<'a> {
    rules: &'a LinkConfig,
    origin_host: String,
    fetcher: Option<&'a dyn Fetcher>,
}

impl<'a> LinkResolver<'a> {
    pub fn new(rules: &'a LinkConfig, origin: &Url, fetcher: Option<&'a dyn Fetcher>) -> Self {
        Self {
            rules,
            origin_host: origin.host_str().unwrap_or_default().to_string(),
            fetcher,
        }
    }

    pub fn expand(&self, links: &[CandidateLink]) -> Vec<CandidateLink> {
        let mut out: Vec<CandidateLink> = Vec::with_capacity(links.len());
        for link in links {
            if !out.iter().any(|l| l.href == link.href) {
                out.push(link.clone());
            }
            let Some(dest) = decode_redirect(&link.href, self.rules) else {
                continue;
            };
            let Some(dest) = Url::parse(&dest).ok().map(|u| u.to_string()) else {
                continue;
            };
            if !out.iter().any(|l| l.href == dest) {
                debug!(redirect = %link.href, destination = %dest, "decoded tracking redirect");
                out.push(CandidateLink::new(dest, link.context.clone()));
            }
        }
        out
    }

    pub fn resolve(&self, links: &[CandidateLink], fallback: &str) -> ResolvedLinks {
        let mut links = self.expand(links);
        let mut canonical = select_canonical(&links, self.rules, &self.origin_host, fallback);

        if canonical.is_fallback() {
            warn!(fallback, candidates = links.len(), "no usable link; using search page");
            return ResolvedLinks { links, canonical };
        }

        if self.needs_settling(&links, &canonical)
            && let Some(settled) = self.settle(&canonical.href)
        {
            match links.iter().position(|l| l.href == settled) {
                Some(index) => {
                    let score = score_link(&links[index], self.rules, &self.origin_host);
                    if score > EXCLUDED_SCORE {
                        canonical = Canonical {
                            href: settled,
                            score,
                            index: Some(index),
                        };
                    }
                }
                None => {
                    let context = canonical
                        .index
                        .map(|i| links[i].context.clone())
                        .unwrap_or_default();
                    let candidate = CandidateLink::new(settled, context);
                    let score = score_link(&candidate, self.rules, &self.origin_host);
                    if score > EXCLUDED_SCORE {
                        canonical = Canonical {
                            href: candidate.href.clone(),
                            score,
                            index: Some(links.len()),
                        };
                        links.push(candidate);
                    }
                }
            }
        }

        ResolvedLinks { links, canonical }
    }

    fn needs_settling(&self, links: &[CandidateLink], canonical: &Canonical) -> bool {
        if self.fetcher.is_none() {
            return false;
        }
        if is_redirector(&canonical.href, self.rules) {
            return true;
        }
        if canonical.score >= self.rules.weights.document {
            return false;
        }
        links
            .iter()
            .filter(|l| score_link(l, self.rules, &self.origin_host) == canonical.score)
            .count()
            > 1
    }

    fn settle(&self, url: &str) -> Option<String> {
        let fetcher = self.fetcher?;
        match fetcher.settle(url) {
            Ok(settled) if settled != url => {
                debug!(url, settled = %settled, "link settled");
                Some(settled)
            }
            Ok(_) => None,
            Err(err) => {
                debug!(url, error = %err, "link resolution failed; keeping unresolved url");
                None
            }
        }
    }
}
