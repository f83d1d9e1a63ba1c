use crate::config::{ConsentConfig, TimingConfig};
use crate::driver::{PageDriver, Target};
use crate::poll::poll_until;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentState {
    Unknown,
    BannerAbsent,
    BannerPresent,
    Dismissed,
    ForciblyHidden,
}

impl ConsentState {
    pub fn is_clear(&self) -> bool {
        matches!(
            self,
            ConsentState::BannerAbsent | ConsentState::Dismissed | ConsentState::ForciblyHidden
        )
    }
}

#[derive(Debug, Clone)]
pub struct ConsentDismisser {
    banner: Option<Target>,
    affordances: Vec<Target>,
    appear_timeout: Duration,
    attempt_timeout: Duration,
    settle_timeout: Duration,
    budget: Duration,
    interval: Duration,
}

impl ConsentDismisser {
    pub fn from_config(consent: &ConsentConfig, timing: &TimingConfig) -> Self {
        let banner = if consent.enabled {
            match Target::parse(&consent.banner) {
                Ok(target) => Some(target),
                Err(err) => {
                    warn!(error = %err, "consent banner target unusable; dismissal disabled");
                    None
                }
            }
        } else {
            None
        };

        let affordances = consent
            .affordances
            .iter()
            .filter_map(|expr| match Target::parse(expr) {
                Ok(target) => Some(target),
                Err(err) => {
                    warn!(error = %err, "skipping consent affordance");
                    None
                }
            })
            .collect();

        Self {
            banner,
            affordances,
            appear_timeout: Duration::from_millis(consent.appear_timeout_ms),
            attempt_timeout: Duration::from_millis(consent.attempt_timeout_ms),
            settle_timeout: Duration::from_millis(consent.settle_timeout_ms),
            budget: Duration::from_millis(consent.dismiss_budget_ms),
            interval: timing.poll_interval(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            banner: None,
            affordances: Vec::new(),
            appear_timeout: Duration::ZERO,
            attempt_timeout: Duration::ZERO,
            settle_timeout: Duration::ZERO,
            budget: Duration::ZERO,
            interval: Duration::from_millis(1),
        }
    }

    pub fn dismiss<D: PageDriver + ?Sized>(&self, driver: &mut D) -> ConsentState {
        let Some(banner) = &self.banner else {
            return ConsentState::BannerAbsent;
        };

        let appeared = poll_until(self.appear_timeout, self.interval, || {
            driver.is_visible(banner).unwrap_or(false)
        });
        if !appeared.is_satisfied() {
            return ConsentState::BannerAbsent;
        }

        debug!(banner = %banner, "consent banner visible; trying affordances");
        let deadline = Instant::now() + self.budget;

        for affordance in &self.affordances {
            if Instant::now() >= deadline {
                break;
            }
            if let Err(err) = driver.click(affordance, self.attempt_timeout, false) {
                debug!(affordance = %affordance, error = %err, "consent affordance unusable");
                continue;
            }
            let gone = poll_until(self.settle_timeout, self.interval, || {
                !driver.is_visible(banner).unwrap_or(true)
            });
            if gone.is_satisfied() {
                debug!(affordance = %affordance, "consent banner dismissed");
                return ConsentState::Dismissed;
            }
        }

        match driver.hide(banner) {
            Ok(()) => {
                warn!(banner = %banner, "consent banner not dismissable; hidden instead");
                ConsentState::ForciblyHidden
            }
            Err(err) => {
                warn!(banner = %banner, error = %err, "consent banner could not be hidden");
                ConsentState::BannerPresent
            }
        }
    }
}
