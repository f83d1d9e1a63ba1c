#![allow(dead_code)]

use aste_watch::config::{SiteConfig, parse_config};
use aste_watch::driver::{ControlSnapshot, PageDriver, SessionFactory, Target};
use aste_watch::error::DriverError;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

pub const SEARCH_URL: &str = "https://www.tribunale.example/vendite-giudiziarie.html";
pub const RESULTS_URL: &str = "https://www.tribunale.example/vendite-giudiziarie.html?esito=1";

/// Site config with millisecond-scale timeouts so waits stay short in tests.
pub fn fast_config() -> SiteConfig {
    parse_config(
        r##"
[site]
name = "Tribunale di prova"
search_url = "https://www.tribunale.example/vendite-giudiziarie.html"

[search]
region = "Lombardia"
province = "Bergamo"
localities = ["Stezzano", "Zanica"]
page_size = "50"
pre_search_clicks = ["text:Beni Immobili"]
submit = "css:#mostra"
municipality_input = "css:#comune-testo"

[timing]
poll_interval_ms = 1
navigate_timeout_ms = 50
locator_timeout_ms = 150
dependent_timeout_ms = 150
select_timeout_ms = 60
optional_timeout_ms = 30
click_timeout_ms = 10
submit_timeout_ms = 10
results_timeout_ms = 30

[consent]
banner = "css:#cookie-banner"
affordances = ["text:Rifiuta@#cookie-banner", "text:Accetta@#cookie-banner"]
appear_timeout_ms = 15
attempt_timeout_ms = 5
settle_timeout_ms = 15
dismiss_budget_ms = 100
"##,
    )
    .expect("test config must parse")
}

/// What a scripted page did, shared with the test after the driver is gone.
#[derive(Debug, Default)]
pub struct DriverLog {
    pub opened: usize,
    pub closed: usize,
    pub navigations: Vec<String>,
    pub clicks: Vec<(String, bool)>,
    pub selections: Vec<(usize, String)>,
    pub fills: Vec<(String, String)>,
    pub hidden: usize,
    pub form_reads: usize,
    pub unchecked: Vec<String>,
    /// Checkboxes still checked when the search was submitted.
    pub checked_at_submit: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScriptedControl {
    pub options: Vec<String>,
    pub visible: bool,
    /// Control whose selection triggers population of this one.
    pub depends_on: Option<usize>,
    pub populated: Vec<String>,
    /// Form reads between the parent selection and the options appearing.
    pub delay: usize,
    countdown: Option<usize>,
}

impl ScriptedControl {
    pub fn fixed(options: &[&str]) -> Self {
        Self {
            options: strings(options),
            visible: true,
            depends_on: None,
            populated: Vec::new(),
            delay: 0,
            countdown: None,
        }
    }

    /// Starts with a placeholder only and fills in `options` after `parent`
    /// is selected and `delay` further reads.
    pub fn dependent(parent: usize, delay: usize, options: &[&str]) -> Self {
        Self {
            options: strings(&["-- seleziona --"]),
            visible: true,
            depends_on: Some(parent),
            populated: strings(options),
            delay,
            countdown: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    pub controls: Vec<ScriptedControl>,
    pub banner: Option<String>,
    pub banner_visible: bool,
    /// Affordance label that actually closes the banner.
    pub banner_closer: Option<String>,
    pub submit: String,
    /// Results page per selected municipality; `default_results` otherwise.
    pub results: Vec<(String, String)>,
    pub default_results: String,
    pub fillable: Option<String>,
    /// Checkbox label and whether it is checked.
    pub checkboxes: Vec<(String, bool)>,
    pub fail_navigation: bool,
    pub url: String,
    selected: Vec<String>,
    submitted: Option<String>,
    pub log: Rc<RefCell<DriverLog>>,
}

impl ScriptedDriver {
    /// Region, province, municipality (dependent on province), page size, and
    /// a sort-order decoy that also lists numbers.
    pub fn search_form(municipalities: &[&str]) -> Self {
        Self {
            controls: vec![
                ScriptedControl::fixed(&["Convenienza", "Prezzo crescente", "Data crescente", "25", "50"]),
                ScriptedControl::fixed(&["-- regione --", "Lombardia", "Piemonte", "Veneto"]),
                ScriptedControl::dependent(1, 2, &["-- provincia --", "Bergamo", "Brescia", "Milano"]),
                ScriptedControl::dependent(2, 3, municipalities),
                ScriptedControl::fixed(&["10", "25", "50", "100"]),
            ],
            banner: Some("#cookie-banner".to_string()),
            banner_visible: false,
            banner_closer: None,
            submit: "#mostra".to_string(),
            results: Vec::new(),
            default_results: "<html><body><p>Nessun risultato</p></body></html>".to_string(),
            fillable: None,
            checkboxes: vec![("Includi le aste passate".to_string(), true)],
            fail_navigation: false,
            url: String::new(),
            selected: Vec::new(),
            submitted: None,
            log: Rc::new(RefCell::new(DriverLog::default())),
        }
    }

    pub fn with_banner(mut self, closer: Option<&str>) -> Self {
        self.banner_visible = true;
        self.banner_closer = closer.map(str::to_string);
        self
    }

    pub fn with_results(mut self, municipality: &str, html: &str) -> Self {
        self.results.push((municipality.to_string(), html.to_string()));
        self
    }

    fn is_banner(&self, target: &Target) -> bool {
        matches!((target, &self.banner), (Target::Css(css), Some(banner)) if css == banner)
    }
}

impl PageDriver for ScriptedDriver {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.log.borrow_mut().navigations.push(url.to_string());
        if self.fail_navigation {
            return Err(DriverError::Load("connection refused".to_string()));
        }
        self.url = url.to_string();
        Ok(())
    }

    fn current_url(&self) -> String {
        self.url.clone()
    }

    fn form_controls(&mut self) -> Result<Vec<ControlSnapshot>, DriverError> {
        self.log.borrow_mut().form_reads += 1;
        for control in &mut self.controls {
            match control.countdown {
                Some(0) => {
                    control.options = control.populated.clone();
                    control.countdown = None;
                }
                Some(n) => control.countdown = Some(n - 1),
                None => {}
            }
        }
        Ok(self
            .controls
            .iter()
            .enumerate()
            .map(|(index, c)| ControlSnapshot {
                index,
                visible: c.visible,
                options: c.options.clone(),
            })
            .collect())
    }

    fn select_option(
        &mut self,
        control: usize,
        label: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        let Some(current) = self.controls.get(control) else {
            return Err(DriverError::NotFound(format!("select #{control}")));
        };
        if !current.options.iter().any(|o| o == label) {
            return Err(DriverError::NotFound(format!("option {label}")));
        }
        for dependent in &mut self.controls {
            if dependent.depends_on == Some(control) {
                dependent.countdown = Some(dependent.delay);
            }
        }
        self.selected.push(label.to_string());
        self.log
            .borrow_mut()
            .selections
            .push((control, label.to_string()));
        Ok(())
    }

    fn fill(&mut self, target: &Target, value: &str, _timeout: Duration) -> Result<(), DriverError> {
        match (&self.fillable, target) {
            (Some(css), Target::Css(wanted)) if css == wanted => {
                self.log
                    .borrow_mut()
                    .fills
                    .push((target.to_string(), value.to_string()));
                Ok(())
            }
            _ => Err(DriverError::NotFound(target.to_string())),
        }
    }

    fn uncheck(&mut self, target: &Target, _timeout: Duration) -> Result<bool, DriverError> {
        let Target::Label { text, .. } = target else {
            return Err(DriverError::NotFound(target.to_string()));
        };
        let (label, checked) = self
            .checkboxes
            .iter_mut()
            .find(|(label, _)| label == text)
            .ok_or_else(|| DriverError::NotFound(target.to_string()))?;
        let was = std::mem::replace(checked, false);
        if was {
            self.log.borrow_mut().unchecked.push(label.clone());
        }
        Ok(was)
    }

    fn is_visible(&mut self, target: &Target) -> Result<bool, DriverError> {
        Ok(self.is_banner(target) && self.banner_visible)
    }

    fn click(&mut self, target: &Target, _timeout: Duration, force: bool) -> Result<(), DriverError> {
        self.log.borrow_mut().clicks.push((target.to_string(), force));
        match target {
            Target::Css(css) if *css == self.submit => {
                if self.banner_visible && !force {
                    return Err(DriverError::Intercepted(
                        "#cookie-banner intercepts pointer events".to_string(),
                    ));
                }
                let page = self
                    .results
                    .iter()
                    .find(|(m, _)| self.selected.contains(m))
                    .map(|(_, html)| html.clone())
                    .unwrap_or_else(|| self.default_results.clone());
                self.log.borrow_mut().checked_at_submit = self
                    .checkboxes
                    .iter()
                    .filter(|(_, checked)| *checked)
                    .map(|(label, _)| label.clone())
                    .collect();
                self.submitted = Some(page);
                self.url = RESULTS_URL.to_string();
                Ok(())
            }
            Target::Label { text, .. } if self.banner_visible => {
                if self.banner_closer.as_deref() == Some(text.as_str()) {
                    self.banner_visible = false;
                    Ok(())
                } else {
                    Err(DriverError::NotFound(target.to_string()))
                }
            }
            _ => Err(DriverError::NotFound(target.to_string())),
        }
    }

    fn hide(&mut self, target: &Target) -> Result<(), DriverError> {
        if self.is_banner(target) {
            self.banner_visible = false;
        }
        self.log.borrow_mut().hidden += 1;
        Ok(())
    }

    fn content(&mut self) -> Result<String, DriverError> {
        Ok(self
            .submitted
            .clone()
            .unwrap_or_else(|| "<html><body><form id=\"ricerca\"></form></body></html>".to_string()))
    }

    fn close(&mut self) {
        self.log.borrow_mut().closed += 1;
    }
}

/// Opens fresh copies of a template page, all reporting into one log.
pub struct ScriptedFactory {
    pub template: ScriptedDriver,
    pub fail_open: bool,
}

impl ScriptedFactory {
    pub fn new(template: ScriptedDriver) -> Self {
        Self {
            template,
            fail_open: false,
        }
    }

    pub fn log(&self) -> Rc<RefCell<DriverLog>> {
        Rc::clone(&self.template.log)
    }
}

impl SessionFactory for ScriptedFactory {
    type Driver = ScriptedDriver;

    fn open(&self) -> Result<ScriptedDriver, DriverError> {
        if self.fail_open {
            return Err(DriverError::Load("browser unavailable".to_string()));
        }
        self.template.log.borrow_mut().opened += 1;
        Ok(self.template.clone())
    }
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// A results page in the layout the court site uses.
pub fn results_page(notices: &[(&str, &str, &[(&str, &str)])]) -> String {
    let mut html = String::from(
        "<html><body><nav><a href=\"/\">TRIBUNALE DI BERGAMO - Home</a></nav>\
         <form id=\"ricerca\"><select name=\"r\"><option>Lombardia</option></select></form>\
         <div id=\"risultati\">",
    );
    for (header, body, links) in notices {
        html.push_str(&format!("<h3>{header}</h3><p>{body}</p><ul>"));
        for (href, label) in links.iter() {
            html.push_str(&format!("<li><a href=\"{href}\">{label}</a></li>"));
        }
        html.push_str("</ul>");
    }
    html.push_str("</div><footer><a href=\"mailto:cancelleria@example.it\">Contatti</a></footer></body></html>");
    html
}
