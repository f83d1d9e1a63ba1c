use crate::error::DriverError;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Css(String),
    Label {
        text: String,
        within: Option<String>,
    },
}

impl Target {
    pub fn parse(expr: &str) -> Result<Self, DriverError> {
        let expr = expr.trim();
        if let Some(css) = expr.strip_prefix("css:") {
            let css = css.trim();
            if css.is_empty() {
                return Err(DriverError::InvalidTarget(expr.to_string()));
            }
            return Ok(Target::Css(css.to_string()));
        }
        if let Some(label) = expr.strip_prefix("text:") {
            let (text, within) = match label.rsplit_once('@') {
                Some((text, scope)) if !scope.trim().is_empty() => {
                    (text.trim(), Some(scope.trim().to_string()))
                }
                _ => (label.trim(), None),
            };
            if text.is_empty() {
                return Err(DriverError::InvalidTarget(expr.to_string()));
            }
            return Ok(Target::Label {
                text: text.to_string(),
                within,
            });
        }
        Err(DriverError::InvalidTarget(expr.to_string()))
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Target::Css(selector.into())
    }

    pub fn label(text: impl Into<String>) -> Self {
        Target::Label {
            text: text.into(),
            within: None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Css(css) => write!(f, "css:{css}"),
            Target::Label { text, within: None } => write!(f, "text:{text}"),
            Target::Label {
                text,
                within: Some(scope),
            } => write!(f, "text:{text}@{scope}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub index: usize,
    pub visible: bool,
    pub options: Vec<String>,
}

impl ControlSnapshot {
    pub fn new(index: usize, options: &[&str]) -> Self {
        Self {
            index,
            visible: true,
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }
}

pub trait PageDriver {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    fn current_url(&self) -> String;

    fn form_controls(&mut self) -> Result<Vec<ControlSnapshot>, DriverError>;

    fn select_option(
        &mut self,
        control: usize,
        label: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    fn fill(&mut self, target: &Target, value: &str, timeout: Duration)
    -> Result<(), DriverError>;

    fn uncheck(&mut self, target: &Target, timeout: Duration) -> Result<bool, DriverError>;

    fn is_visible(&mut self, target: &Target) -> Result<bool, DriverError>;

    fn click(&mut self, target: &Target, timeout: Duration, force: bool)
    -> Result<(), DriverError>;

    fn hide(&mut self, target: &Target) -> Result<(), DriverError>;

    fn content(&mut self) -> Result<String, DriverError>;

    fn close(&mut self) {}
}

pub trait SessionFactory {
    type Driver: PageDriver;

    fn open(&self) -> Result<Self::Driver, DriverError>;
}

pub struct Session<D: PageDriver> {
    driver: D,
}

impl<D: PageDriver> Session<D> {
    pub fn open<F>(factory: &F) -> Result<Self, DriverError>
    where
        F: SessionFactory<Driver = D>,
    {
        Ok(Self {
            driver: factory.open()?,
        })
    }

    pub fn new(driver: D) -> Self {
        Self { driver }
    }
}

impl<D: PageDriver> Deref for Session<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.driver
    }
}

impl<D: PageDriver> DerefMut for Session<D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

impl<D: PageDriver> Drop for Session<D> {
    fn drop(&mut self) {
        self.driver.close();
    }
}
