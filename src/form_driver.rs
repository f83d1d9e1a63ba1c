use crate::config::SiteConfig;
use crate::driver::{ControlSnapshot, PageDriver, SessionFactory, Target};
use crate::error::DriverError;
use crate::fetch::build_client;
use crate::text::fold;
use anyhow::Result;
use reqwest::blocking::{Client, RequestBuilder};
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const LABEL_CANDIDATES: &str = "button, a, input[type=\"submit\"], input[type=\"button\"], \
     [role=\"button\"], [role=\"tab\"], label, li, span";

pub struct HttpSessionFactory {
    client: Client,
    submit: Option<Target>,
}

impl HttpSessionFactory {
    pub fn from_config(config: &SiteConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timing.navigate_timeout_ms);
        let client = build_client(&config.fetch, timeout)?;
        let submit = Target::parse(&config.search.submit).ok();
        Ok(Self { client, submit })
    }
}

impl SessionFactory for HttpSessionFactory {
    type Driver = HttpFormDriver;

    fn open(&self) -> Result<HttpFormDriver, DriverError> {
        debug!("opening static form session; page scripts are not executed");
        Ok(HttpFormDriver {
            client: self.client.clone(),
            submit: self.submit.clone(),
            url: String::new(),
            html: String::new(),
            selections: BTreeMap::new(),
            filled: BTreeMap::new(),
            unchecked: BTreeSet::new(),
            hidden: Vec::new(),
        })
    }
}

pub struct HttpFormDriver {
    client: Client,
    submit: Option<Target>,
    url: String,
    html: String,
    selections: BTreeMap<usize, String>,
    filled: BTreeMap<String, String>,
    unchecked: BTreeSet<String>,
    hidden: Vec<Target>,
}

impl HttpFormDriver {
    pub fn set_page(&mut self, url: &str, html: impl Into<String>) {
        self.url = url.to_string();
        self.html = html.into();
        self.selections.clear();
        self.filled.clear();
        self.unchecked.clear();
    }

    fn load(&mut self, request: RequestBuilder, timeout: Duration) -> Result<(), DriverError> {
        let response = request.timeout(timeout).send().map_err(|err| {
            if err.is_timeout() {
                DriverError::Timeout {
                    what: "page load".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                DriverError::Load(err.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(DriverError::Load(format!("status {status}")));
        }

        let url = response.url().to_string();
        let html = response
            .text()
            .map_err(|err| DriverError::Load(err.to_string()))?;
        info!(%url, %status, bytes = html.len(), "page loaded");

        self.url = url;
        self.html = html;
        self.selections.clear();
        self.filled.clear();
        self.unchecked.clear();
        Ok(())
    }

    pub fn form_fields(&self) -> Result<Vec<(String, String)>, DriverError> {
        let document = Html::parse_document(&self.html);
        let form = active_form(&document, self.submit.as_ref())
            .ok_or_else(|| DriverError::NotFound("form".to_string()))?;
        Ok(self.pairs_of(form))
    }

    fn pairs_of(&self, form: ElementRef<'_>) -> Vec<(String, String)> {
        form_pairs(form, &self.selections, &self.filled, &self.unchecked)
    }

    fn base(&self) -> Result<Url, DriverError> {
        Url::parse(&self.url).map_err(|err| DriverError::Load(format!("no page loaded: {err}")))
    }

    fn submit_form(&mut self, clicked: Option<(String, String)>, timeout: Duration) -> Result<(), DriverError> {
        let base = self.base()?;
        let (method, action, mut pairs) = {
            let document = Html::parse_document(&self.html);
            let form = active_form(&document, self.submit.as_ref())
                .ok_or_else(|| DriverError::NotFound("form".to_string()))?;
            let method = form
                .value()
                .attr("method")
                .unwrap_or("get")
                .to_ascii_lowercase();
            let action = match form.value().attr("action").map(str::trim) {
                Some(action) if !action.is_empty() => base
                    .join(action)
                    .map_err(|err| DriverError::Load(err.to_string()))?,
                _ => base.clone(),
            };
            (method, action, self.pairs_of(form))
        };
        if let Some(pair) = clicked {
            pairs.push(pair);
        }

        debug!(%action, %method, fields = pairs.len(), "submitting form");
        let request = if method == "post" {
            self.client.post(action).form(&pairs)
        } else {
            self.client.get(action).query(&pairs)
        };
        self.load(request, timeout)
    }
}

impl PageDriver for HttpFormDriver {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError> {
        let request = self.client.get(url);
        self.load(request, timeout)
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    fn form_controls(&mut self) -> Result<Vec<ControlSnapshot>, DriverError> {
        let document = Html::parse_document(&self.html);
        let form = active_form(&document, self.submit.as_ref())
            .ok_or_else(|| DriverError::NotFound("form".to_string()))?;

        Ok(form
            .select(&selector("select"))
            .enumerate()
            .map(|(index, select)| ControlSnapshot {
                index,
                visible: is_rendered(select),
                options: select
                    .select(&selector("option"))
                    .map(|o| o.text().collect::<String>().trim().to_string())
                    .collect(),
            })
            .collect())
    }

    fn select_option(
        &mut self,
        control: usize,
        label: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        let controls = self.form_controls()?;
        let snapshot = controls
            .iter()
            .find(|c| c.index == control)
            .ok_or_else(|| DriverError::NotFound(format!("select #{control}")))?;
        let wanted = fold(label);
        if !snapshot.options.iter().any(|o| fold(o) == wanted) {
            return Err(DriverError::NotFound(format!(
                "option {label:?} in select #{control}"
            )));
        }
        self.selections.insert(control, label.to_string());
        Ok(())
    }

    fn fill(&mut self, target: &Target, value: &str, _timeout: Duration) -> Result<(), DriverError> {
        let name = {
            let document = Html::parse_document(&self.html);
            find_elements(&document, target)?
                .into_iter()
                .filter(|el| el.value().name() == "input")
                .find_map(|el| el.value().attr("name").map(str::to_string))
        };
        let name = name.ok_or_else(|| DriverError::NotFound(target.to_string()))?;
        self.filled.insert(name, value.to_string());
        Ok(())
    }

    fn uncheck(&mut self, target: &Target, _timeout: Duration) -> Result<bool, DriverError> {
        let (name, checked) = {
            let document = Html::parse_document(&self.html);
            let checkbox = find_checkbox(&document, target)?
                .ok_or_else(|| DriverError::NotFound(target.to_string()))?;
            let name = checkbox
                .value()
                .attr("name")
                .ok_or_else(|| DriverError::NotFound(format!("{target} has no name")))?
                .to_string();
            (name, checkbox.value().attr("checked").is_some())
        };
        let cleared = checked && self.unchecked.insert(name);
        Ok(cleared)
    }

    fn is_visible(&mut self, target: &Target) -> Result<bool, DriverError> {
        if self.hidden.contains(target) {
            return Ok(false);
        }
        let document = Html::parse_document(&self.html);
        Ok(find_elements(&document, target)?
            .into_iter()
            .any(is_rendered))
    }

    fn click(&mut self, target: &Target, timeout: Duration, _force: bool) -> Result<(), DriverError> {
        enum Action {
            Submit(Option<(String, String)>),
            Follow(String),
            Nothing,
        }

        let action = {
            let document = Html::parse_document(&self.html);
            let element = find_elements(&document, target)?
                .into_iter()
                .next()
                .ok_or_else(|| DriverError::NotFound(target.to_string()))?;
            let value = element.value();
            let kind = value.attr("type").unwrap_or_default().to_ascii_lowercase();
            let submits = match value.name() {
                "input" => kind == "submit" || kind == "image",
                "button" => kind.is_empty() || kind == "submit",
                _ => false,
            };
            let in_form = element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|el| el.value().name() == "form");
            match value.name() {
                _ if submits && in_form => Action::Submit(value.attr("name").map(|n| {
                    (n.to_string(), value.attr("value").unwrap_or_default().to_string())
                })),
                "a" => match value.attr("href") {
                    Some(href) if !href.trim_start().starts_with('#') => {
                        Action::Follow(href.to_string())
                    }
                    _ => Action::Nothing,
                },
                _ => Action::Nothing,
            }
        };

        match action {
            Action::Submit(clicked) => self.submit_form(clicked, timeout),
            Action::Follow(href) => {
                let url = self
                    .base()?
                    .join(&href)
                    .map_err(|err| DriverError::Load(err.to_string()))?;
                self.navigate(url.as_str(), timeout)
            }
            Action::Nothing => {
                debug!(control = %target, "click has no effect without page scripts");
                Ok(())
            }
        }
    }

    fn hide(&mut self, target: &Target) -> Result<(), DriverError> {
        if !self.hidden.contains(target) {
            self.hidden.push(target.clone());
        }
        Ok(())
    }

    fn content(&mut self) -> Result<String, DriverError> {
        Ok(self.html.clone())
    }
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must be valid")
}

fn parse_selector(css: &str) -> Result<Selector, DriverError> {
    Selector::parse(css).map_err(|err| DriverError::InvalidTarget(format!("{css}: {err:?}")))
}

fn find_elements<'a>(document: &'a Html, target: &Target) -> Result<Vec<ElementRef<'a>>, DriverError> {
    match target {
        Target::Css(css) => Ok(document.select(&parse_selector(css)?).collect()),
        Target::Label { text, within } => {
            let wanted = fold(text);
            let candidates = parse_selector(LABEL_CANDIDATES)?;
            let scopes: Vec<ElementRef<'a>> = match within {
                Some(scope) => document.select(&parse_selector(scope)?).collect(),
                None => vec![document.root_element()],
            };

            let mut exact = Vec::new();
            let mut partial = Vec::new();
            for scope in scopes {
                for el in scope.select(&candidates) {
                    let label = fold(&el.text().collect::<String>());
                    let label = if label.is_empty() {
                        fold(el.value().attr("value").unwrap_or_default())
                    } else {
                        label
                    };
                    if label == wanted {
                        exact.push(el);
                    } else if label.contains(&wanted) {
                        partial.push(el);
                    }
                }
            }
            exact.extend(partial);
            Ok(exact)
        }
    }
}

fn is_checkbox(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    value.name() == "input"
        && value
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("checkbox"))
}

fn find_checkbox<'a>(document: &'a Html, target: &Target) -> Result<Option<ElementRef<'a>>, DriverError> {
    for element in find_elements(document, target)? {
        if is_checkbox(&element) {
            return Ok(Some(element));
        }
        if let Some(nested) = element.select(&selector("input")).find(is_checkbox) {
            return Ok(Some(nested));
        }
        if element.value().name() == "label"
            && let Some(id) = element.value().attr("for")
            && let Some(linked) = document
                .select(&selector("input"))
                .find(|input| is_checkbox(input) && input.value().id() == Some(id))
        {
            return Ok(Some(linked));
        }
    }
    Ok(None)
}

fn active_form<'a>(document: &'a Html, submit: Option<&Target>) -> Option<ElementRef<'a>> {
    let forms: Vec<ElementRef<'a>> = document.select(&selector("form")).collect();
    if let Some(target) = submit
        && let Ok(elements) = find_elements(document, target)
    {
        for element in elements {
            if let Some(form) = element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "form")
            {
                return Some(form);
            }
        }
    }
    forms.into_iter().next()
}

fn is_rendered(element: ElementRef<'_>) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .all(|el| {
            let value = el.value();
            let style = value
                .attr("style")
                .unwrap_or_default()
                .replace(' ', "")
                .to_ascii_lowercase();
            value.attr("hidden").is_none()
                && !value
                    .attr("type")
                    .is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
                && !style.contains("display:none")
                && !style.contains("visibility:hidden")
        })
}

fn form_pairs(
    form: ElementRef<'_>,
    selections: &BTreeMap<usize, String>,
    filled: &BTreeMap<String, String>,
    unchecked: &BTreeSet<String>,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for input in form.select(&selector("input[name]")) {
        let value = input.value();
        let Some(name) = value.attr("name") else {
            continue;
        };
        let kind = value.attr("type").unwrap_or("text").to_ascii_lowercase();
        match kind.as_str() {
            "submit" | "button" | "image" | "reset" | "file" => continue,
            "checkbox" | "radio" if value.attr("checked").is_none() => continue,
            "checkbox" if unchecked.contains(name) => continue,
            _ => {}
        }
        let typed = filled.get(name).cloned();
        let default = value.attr("value").unwrap_or(if kind == "checkbox" { "on" } else { "" });
        pairs.push((name.to_string(), typed.unwrap_or_else(|| default.to_string())));
    }

    for (index, select) in form.select(&selector("select")).enumerate() {
        let Some(name) = select.value().attr("name") else {
            continue;
        };
        let options: Vec<ElementRef<'_>> = select.select(&selector("option")).collect();
        let chosen = selections
            .get(&index)
            .and_then(|label| {
                let wanted = fold(label);
                options
                    .iter()
                    .find(|o| fold(&o.text().collect::<String>()) == wanted)
            })
            .or_else(|| options.iter().find(|o| o.value().attr("selected").is_some()))
            .or_else(|| options.first());
        if let Some(option) = chosen {
            let value = option
                .value()
                .attr("value")
                .map(str::to_string)
                .unwrap_or_else(|| option.text().collect::<String>().trim().to_string());
            pairs.push((name.to_string(), value));
        }
    }

    for area in form.select(&selector("textarea[name]")) {
        if let Some(name) = area.value().attr("name") {
            let typed = filled.get(name).cloned();
            pairs.push((
                name.to_string(),
                typed.unwrap_or_else(|| area.text().collect::<String>()),
            ));
        }
    }

    pairs
}
