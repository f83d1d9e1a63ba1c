use crate::config::SegmentConfig;
use crate::links::normalize_href;
use crate::model::CandidateLink;
use crate::text::{collapse_whitespace, contains_phrase, truncate_chars};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "em", "font", "i", "kbd", "mark", "q", "s",
    "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var",
];

const CONTEXT_TAGS: &[&str] = &[
    "td", "th", "li", "p", "dd", "dt", "h1", "h2", "h3", "h4", "h5", "h6",
];

const MAX_CONTEXT_CHARS: usize = 300;

static INLINE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(https?://[^\s<>]+|www\.[^\s<>]+)").expect("inline url regex must be valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub header: String,
    pub body: String,
    pub links: Vec<CandidateLink>,
}

impl RawBlock {
    pub fn text(&self) -> String {
        if self.body.is_empty() {
            self.header.clone()
        } else {
            format!("{}\n{}", self.header, self.body)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Line(String),
    Link { href: String, context: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Institutional { require_lot: bool },
    LotOnly,
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    institutional_marker: String,
    lot_marker: String,
    require_lot: bool,
    max_header_len: usize,
    excluded: Vec<Selector>,
    base: Url,
}

impl Segmenter {
    pub fn new(config: &SegmentConfig, base: Url) -> Self {
        let excluded = config
            .excluded
            .iter()
            .filter_map(|css| match Selector::parse(css) {
                Ok(selector) => Some(selector),
                Err(err) => {
                    warn!(selector = %css, error = ?err, "ignoring invalid excluded selector");
                    None
                }
            })
            .collect();

        Self {
            institutional_marker: config.institutional_marker.trim().to_string(),
            lot_marker: config.lot_marker.trim().to_string(),
            require_lot: config.require_lot_marker,
            max_header_len: config.max_header_len,
            excluded,
            base,
        }
    }

    pub fn layouts(&self) -> Vec<Layout> {
        let mut layouts = vec![Layout::Institutional {
            require_lot: self.require_lot,
        }];
        if !self.lot_marker.is_empty() {
            layouts.push(Layout::LotOnly);
        }
        layouts
    }

    pub fn is_header(&self, line: &str, layout: Layout) -> bool {
        if line.chars().count() > self.max_header_len {
            return false;
        }
        match layout {
            Layout::Institutional { require_lot } => {
                line.starts_with(&self.institutional_marker)
                    && (!require_lot
                        || (!self.lot_marker.is_empty() && line.contains(&self.lot_marker)))
            }
            Layout::LotOnly => {
                !self.lot_marker.is_empty()
                    && line
                        .strip_prefix(&self.lot_marker)
                        .is_some_and(|rest| rest.starts_with(' ') && !rest.trim().is_empty())
            }
        }
    }

    pub fn segment_html(&self, html: &str) -> Vec<RawBlock> {
        let document = Html::parse_document(html);
        let fragments = self.flatten(document.root_element());
        self.segment_fragments(&fragments)
    }

    pub fn segment_text(&self, text: &str) -> Vec<RawBlock> {
        let fragments: Vec<Fragment> = text
            .lines()
            .map(collapse_whitespace)
            .filter(|line| !line.is_empty())
            .map(Fragment::Line)
            .collect();
        self.segment_fragments(&fragments)
    }

    pub fn segment_fragments(&self, fragments: &[Fragment]) -> Vec<RawBlock> {
        for layout in self.layouts() {
            let blocks = self.cut(fragments, layout);
            if !blocks.is_empty() {
                debug!(?layout, blocks = blocks.len(), "segmented page");
                return blocks;
            }
        }
        Vec::new()
    }

    fn cut(&self, fragments: &[Fragment], layout: Layout) -> Vec<RawBlock> {
        let mut blocks = Vec::new();
        let mut current: Option<BlockBuilder> = None;

        for fragment in fragments {
            match fragment {
                Fragment::Line(line) if self.is_header(line, layout) => {
                    if let Some(done) = current.take() {
                        blocks.push(done.finish());
                    }
                    let mut block = BlockBuilder::new(line.clone());
                    self.add_inline_urls(&mut block, line);
                    current = Some(block);
                }
                Fragment::Line(line) => {
                    if let Some(block) = current.as_mut() {
                        block.body.push(line.clone());
                        self.add_inline_urls(block, line);
                    }
                }
                Fragment::Link { href, context } => {
                    if let Some(block) = current.as_mut() {
                        self.add_link(block, href, context);
                    }
                }
            }
        }

        if let Some(done) = current {
            blocks.push(done.finish());
        }
        blocks
    }

    fn add_link(&self, block: &mut BlockBuilder, href: &str, context: &str) {
        let Some(normalized) = normalize_href(href, &self.base) else {
            return;
        };
        if block.links.iter().any(|l| l.href == normalized) {
            return;
        }
        block.links.push(CandidateLink::new(normalized, context));
    }

    fn add_inline_urls(&self, block: &mut BlockBuilder, line: &str) {
        for found in INLINE_URL_RE.find_iter(line) {
            let url = found
                .as_str()
                .trim_end_matches(|c: char| matches!(c, ')' | '.' | ',' | ';' | ':' | '"' | '\''));
            self.add_link(block, url, line);
        }
    }

    pub fn flatten(&self, root: ElementRef<'_>) -> Vec<Fragment> {
        let mut flattener = Flattener {
            segmenter: self,
            out: Vec::new(),
            pending: String::new(),
            pending_links: Vec::new(),
        };
        flattener.visit(root);
        flattener.flush();
        flattener.out
    }

    fn is_excluded(&self, element: ElementRef<'_>) -> bool {
        self.excluded.iter().any(|selector| selector.matches(&element))
    }
}

struct BlockBuilder {
    header: String,
    body: Vec<String>,
    links: Vec<CandidateLink>,
}

impl BlockBuilder {
    fn new(header: String) -> Self {
        Self {
            header,
            body: Vec::new(),
            links: Vec::new(),
        }
    }

    fn finish(self) -> RawBlock {
        RawBlock {
            header: self.header,
            body: self.body.join("\n"),
            links: self.links,
        }
    }
}

struct Flattener<'s> {
    segmenter: &'s Segmenter,
    out: Vec<Fragment>,
    pending: String,
    pending_links: Vec<Fragment>,
}

impl Flattener<'_> {
    fn visit(&mut self, element: ElementRef<'_>) {
        if self.segmenter.is_excluded(element) {
            return;
        }

        let name = element.value().name();
        if name == "br" {
            self.flush();
            return;
        }

        let inline = INLINE_TAGS.contains(&name);
        if !inline {
            self.flush();
        }

        if name == "a"
            && let Some(href) = element.value().attr("href")
        {
            self.pending_links.push(Fragment::Link {
                href: href.to_string(),
                context: link_context(element),
            });
        }

        for child in element.children() {
            if let Some(child_element) = ElementRef::wrap(child) {
                self.visit(child_element);
            } else if let Node::Text(text) = child.value() {
                self.pending.push_str(text);
            }
        }

        if !inline {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let line = collapse_whitespace(&self.pending);
        self.pending.clear();
        if !line.is_empty() {
            self.out.push(Fragment::Line(line));
        }
        self.out.append(&mut self.pending_links);
    }
}

fn link_context(anchor: ElementRef<'_>) -> String {
    let enclosing = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| CONTEXT_TAGS.contains(&el.value().name()))
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty());

    let context = enclosing
        .or_else(|| {
            let own = collapse_whitespace(&anchor.text().collect::<String>());
            (!own.is_empty()).then_some(own)
        })
        .or_else(|| anchor.value().attr("title").map(collapse_whitespace))
        .unwrap_or_default();

    truncate_chars(&context, MAX_CONTEXT_CHARS)
}

pub fn mentions_locality(text: &str, locality: &str) -> bool {
    contains_phrase(text, locality)
}
