use crate::config::Signature;
use crate::driver::{ControlSnapshot, PageDriver};
use crate::error::{Result, ScrapeError};
use crate::model::{FieldRole, FieldSelector};
use crate::poll::poll_for;
use crate::sequencer::pick_option;
use crate::text::{contains_phrase, fold};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Qualified {
    index: usize,
    negative_hits: usize,
    evidence: Vec<String>,
}

fn qualify(control: &ControlSnapshot, signature: &Signature) -> Option<Qualified> {
    if !control.visible || (signature.positive.is_empty() && signature.required.is_none()) {
        return None;
    }

    let folded: Vec<String> = control.options.iter().map(|o| fold(o)).collect();

    let mut negative_hits = 0usize;
    for term in &signature.negative {
        let term = fold(term);
        if term.is_empty() {
            continue;
        }
        if folded.iter().any(|o| *o == term) {
            return None;
        }
        negative_hits += folded.iter().filter(|o| contains_phrase(o, &term)).count();
    }

    let mut evidence = Vec::with_capacity(signature.positive.len());
    for term in &signature.positive {
        let position = folded.iter().position(|o| contains_phrase(o, term))?;
        evidence.push(control.options[position].trim().to_string());
    }
    if let Some(value) = &signature.required {
        evidence.push(pick_option(&control.options, value)?.label);
    }

    Some(Qualified {
        index: control.index,
        negative_hits,
        evidence,
    })
}

/// Picks the control matching `signature`; fewer disqualifying hits win, then
/// document order.
pub fn locate_field(
    controls: &[ControlSnapshot],
    role: FieldRole,
    signature: &Signature,
) -> Option<FieldSelector> {
    let mut best: Option<Qualified> = None;
    for control in controls {
        let Some(candidate) = qualify(control, signature) else {
            continue;
        };
        let better = best
            .as_ref()
            .is_none_or(|current| candidate.negative_hits < current.negative_hits);
        if better {
            best = Some(candidate);
        }
    }

    best.map(|q| FieldSelector {
        role,
        control: q.index,
        evidence: q.evidence,
    })
}

pub fn wait_for_field<D: PageDriver + ?Sized>(
    driver: &mut D,
    role: FieldRole,
    signature: &Signature,
    timeout: Duration,
    interval: Duration,
) -> Result<FieldSelector> {
    let found = poll_for(timeout, interval, || {
        let controls = driver.form_controls().ok()?;
        locate_field(&controls, role, signature)
    });

    match found {
        Some(selector) => {
            debug!(
                role = %role,
                control = selector.control,
                evidence = ?selector.evidence,
                "field located"
            );
            Ok(selector)
        }
        None => Err(ScrapeError::LocatorNotFound {
            role,
            wanted: signature.wanted(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
