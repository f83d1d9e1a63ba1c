use crate::config::{SearchConfig, SiteConfig, TimingConfig};
use crate::consent::ConsentDismisser;
use crate::driver::{PageDriver, Target};
use crate::error::{Result, ScrapeError};
use crate::locator::wait_for_field;
use crate::model::{FieldRole, FieldSelector};
use crate::poll::{poll_for, poll_until};
use crate::text::{fold, tokens};
use std::time::Duration;
use tracing::{debug, info, warn};

pub type MatchStrategy = fn(&[String], &str) -> Option<usize>;

/// Tiers tried in order until one matches.
pub const STRATEGIES: &[(&str, MatchStrategy)] = &[
    ("exact", exact_match),
    ("contains", contains_match),
    ("token_overlap", token_overlap_match),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMatch {
    pub index: usize,
    pub label: String,
    pub strategy: &'static str,
}

pub fn exact_match(options: &[String], desired: &str) -> Option<usize> {
    let desired = fold(desired);
    if desired.is_empty() {
        return None;
    }
    options.iter().position(|o| fold(o) == desired)
}

pub fn contains_match(options: &[String], desired: &str) -> Option<usize> {
    let desired = fold(desired);
    if desired.is_empty() {
        return None;
    }
    options.iter().position(|o| fold(o).contains(&desired))
}

pub fn token_overlap_match(options: &[String], desired: &str) -> Option<usize> {
    let wanted = tokens(desired);
    if wanted.is_empty() {
        return None;
    }

    let mut best: Option<(usize, usize)> = None;
    for (index, option) in options.iter().enumerate() {
        let have = tokens(option);
        let shared = wanted.iter().filter(|t| have.contains(t)).count();
        if shared == 0 {
            continue;
        }
        if best.is_none_or(|(_, top)| shared > top) {
            best = Some((index, shared));
        }
    }
    best.map(|(index, _)| index)
}

pub fn pick_option(options: &[String], desired: &str) -> Option<OptionMatch> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        strategy(options, desired).map(|index| OptionMatch {
            index,
            label: options[index].trim().to_string(),
            strategy: name,
        })
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionStep {
    pub role: FieldRole,
    pub value: String,
    pub optional: bool,
}

pub fn plan_steps(search: &SearchConfig, municipality: Option<&str>) -> Vec<SelectionStep> {
    let mut steps = vec![
        SelectionStep {
            role: FieldRole::Region,
            value: search.region.clone(),
            optional: false,
        },
        SelectionStep {
            role: FieldRole::Province,
            value: search.province.clone(),
            optional: false,
        },
    ];
    if let Some(name) = municipality {
        steps.push(SelectionStep {
            role: FieldRole::Municipality,
            value: name.to_string(),
            optional: false,
        });
    }
    if let Some(size) = search.page_size.as_deref().filter(|s| !s.trim().is_empty()) {
        steps.push(SelectionStep {
            role: FieldRole::PageSize,
            value: size.to_string(),
            optional: true,
        });
    }
    steps
}

pub struct Sequencer<'a> {
    config: &'a SiteConfig,
    consent: &'a ConsentDismisser,
}

impl<'a> Sequencer<'a> {
    pub fn new(config: &'a SiteConfig, consent: &'a ConsentDismisser) -> Self {
        Self { config, consent }
    }

    fn timing(&self) -> &TimingConfig {
        &self.config.timing
    }

    pub fn search<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        municipality: Option<&str>,
    ) -> Result<Vec<FieldSelector>> {
        self.consent.dismiss(driver);
        self.open_search_tabs(driver);

        let steps = plan_steps(&self.config.search, municipality);
        let selectors = self.apply(driver, &steps)?;
        self.clear_checkboxes(driver);

        self.submit(driver)?;
        self.wait_for_results(driver);
        Ok(selectors)
    }

    fn open_search_tabs<D: PageDriver + ?Sized>(&self, driver: &mut D) {
        let timeout = TimingConfig::ms(self.timing().click_timeout_ms);
        for expr in &self.config.search.pre_search_clicks {
            let outcome = Target::parse(expr).and_then(|t| driver.click(&t, timeout, false));
            if let Err(err) = outcome {
                debug!(control = %expr, error = %err, "pre-search click skipped");
            }
        }
    }

    fn clear_checkboxes<D: PageDriver + ?Sized>(&self, driver: &mut D) {
        let timeout = TimingConfig::ms(self.timing().click_timeout_ms);
        for expr in &self.config.search.uncheck_before_submit {
            match Target::parse(expr).and_then(|t| driver.uncheck(&t, timeout)) {
                Ok(true) => debug!(control = %expr, "checkbox cleared"),
                Ok(false) => {}
                Err(err) => debug!(control = %expr, error = %err, "checkbox left as is"),
            }
        }
    }

    pub fn apply<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        steps: &[SelectionStep],
    ) -> Result<Vec<FieldSelector>> {
        let mut selectors = Vec::with_capacity(steps.len());
        for (position, step) in steps.iter().enumerate() {
            let timeout = if step.optional {
                self.timing().optional_timeout_ms
            } else if position == 0 {
                self.timing().locator_timeout_ms
            } else {
                self.timing().dependent_timeout_ms
            };

            match self.apply_step(driver, step, TimingConfig::ms(timeout)) {
                Ok(Some(selector)) => selectors.push(selector),
                Ok(None) => {}
                Err(err) if step.optional => {
                    debug!(role = %step.role, error = %err, "optional selection skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(selectors)
    }

    fn apply_step<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        step: &SelectionStep,
        timeout: Duration,
    ) -> Result<Option<FieldSelector>> {
        let signature = self.config.signature_for(step.role).requiring(&step.value);
        let interval = self.timing().poll_interval();

        let selector = match wait_for_field(driver, step.role, &signature, timeout, interval) {
            Ok(selector) => selector,
            Err(err) if step.role == FieldRole::Municipality => {
                self.fill_municipality(driver, &step.value, err)?;
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        self.select(driver, &selector, &step.value)?;
        Ok(Some(selector))
    }

    pub fn select<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        selector: &FieldSelector,
        value: &str,
    ) -> Result<OptionMatch> {
        let attempt = TimingConfig::ms(self.timing().click_timeout_ms);
        let mut last_error = String::from("no option matched any tier");

        let chosen = poll_for(
            TimingConfig::ms(self.timing().select_timeout_ms),
            self.timing().poll_interval(),
            || {
                let controls = match driver.form_controls() {
                    Ok(controls) => controls,
                    Err(err) => {
                        last_error = err.to_string();
                        return None;
                    }
                };
                let control = controls.iter().find(|c| c.index == selector.control)?;
                let Some(found) = pick_option(&control.options, value) else {
                    last_error = String::from("no option matched any tier");
                    return None;
                };
                match driver.select_option(selector.control, &found.label, attempt) {
                    Ok(()) => Some(found),
                    Err(err) => {
                        last_error = err.to_string();
                        None
                    }
                }
            },
        );

        match chosen {
            Some(found) => {
                debug!(
                    role = %selector.role,
                    value,
                    label = %found.label,
                    strategy = found.strategy,
                    "option selected"
                );
                Ok(found)
            }
            None => Err(ScrapeError::SelectionFailed {
                role: selector.role,
                value: value.to_string(),
                detail: last_error,
            }),
        }
    }

    fn fill_municipality<D: PageDriver + ?Sized>(
        &self,
        driver: &mut D,
        value: &str,
        locator_error: ScrapeError,
    ) -> Result<()> {
        let Some(expr) = self.config.search.municipality_input.as_deref() else {
            return Err(locator_error);
        };
        let target = Target::parse(expr).map_err(|_| locator_error.clone())?;
        let timeout = TimingConfig::ms(self.timing().click_timeout_ms);

        match driver.fill(&target, value, timeout) {
            Ok(()) => {
                warn!(municipality = value, "municipality typed into free-text input");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "municipality input fallback failed");
                Err(locator_error)
            }
        }
    }

    /// Clicks the submit control; an intercepted click gets one forced retry
    /// after the consent banner is dealt with again.
    pub fn submit<D: PageDriver + ?Sized>(&self, driver: &mut D) -> Result<()> {
        let target = Target::parse(&self.config.search.submit)
            .map_err(|err| ScrapeError::SubmissionFailed(err.to_string()))?;
        let timeout = TimingConfig::ms(self.timing().submit_timeout_ms);

        self.consent.dismiss(driver);
        let first = match driver.click(&target, timeout, false) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        warn!(error = %first, "submit intercepted; retrying with forced click");
        self.consent.dismiss(driver);
        driver
            .click(&target, timeout, true)
            .map_err(|second| ScrapeError::SubmissionFailed(format!("{first}; forced retry: {second}")))
    }

    /// Waits for a notice marker to appear. Timing out is not an error: an
    /// empty result page simply yields no blocks.
    pub fn wait_for_results<D: PageDriver + ?Sized>(&self, driver: &mut D) -> bool {
        let markers = [
            fold(&self.config.segment.institutional_marker),
            fold(&self.config.segment.lot_marker),
        ];
        let outcome = poll_until(
            TimingConfig::ms(self.timing().results_timeout_ms),
            self.timing().poll_interval(),
            || {
                driver.content().is_ok_and(|html| {
                    let html = html.to_lowercase();
                    markers.iter().any(|m| !m.is_empty() && html.contains(m.as_str()))
                })
            },
        );
        if outcome.is_satisfied() {
            info!("results rendered");
            true
        } else {
            warn!("no notice marker appeared before the results timeout");
            false
        }
    }
}
