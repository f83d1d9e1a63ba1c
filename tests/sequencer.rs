mod common;

use anyhow::Result;
use aste_watch::consent::ConsentDismisser;
use aste_watch::error::ScrapeError;
use aste_watch::model::FieldRole;
use aste_watch::sequencer::{
    STRATEGIES, Sequencer, contains_match, exact_match, pick_option, plan_steps,
    token_overlap_match,
};
use common::{RESULTS_URL, ScriptedDriver, fast_config, results_page, strings};

#[test]
fn strategies_are_tried_exact_then_contains_then_overlap() {
    let options = strings(&["Bergamo città", "BERGAMO", "Provincia di Bergamo Ovest"]);

    assert_eq!(exact_match(&options, "bergamo"), Some(1));
    assert_eq!(contains_match(&options, "bergamo"), Some(0));
    assert_eq!(token_overlap_match(&options, "Bergamo Ovest"), Some(2));

    let picked = pick_option(&options, " Bergamo ").expect("exact tier should match");
    assert_eq!(picked.index, 1);
    assert_eq!(picked.strategy, "exact");

    let names: Vec<&str> = STRATEGIES.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["exact", "contains", "token_overlap"]);
}

#[test]
fn token_overlap_picks_most_shared_tokens() {
    let options = strings(&["San Paolo", "San Paolo d'Argon", "Argon"]);
    let picked = pick_option(&options, "Paolo d Argon").expect("overlap tier should match");
    assert_eq!(picked.index, 1);
    assert_eq!(picked.strategy, "token_overlap");
    assert_eq!(pick_option(&options, "Zanica"), None);
}

#[test]
fn steps_follow_form_dependencies() {
    let config = fast_config();
    let steps = plan_steps(&config.search, Some("Stezzano"));
    let roles: Vec<FieldRole> = steps.iter().map(|s| s.role).collect();

    assert_eq!(
        roles,
        vec![
            FieldRole::Region,
            FieldRole::Province,
            FieldRole::Municipality,
            FieldRole::PageSize
        ]
    );
    assert!(steps.last().is_some_and(|s| s.optional));

    let bulk = plan_steps(&config.search, None);
    assert!(bulk.iter().all(|s| s.role != FieldRole::Municipality));
}

#[test]
fn search_selects_dependent_fields_in_order_and_submits() -> Result<()> {
    let config = fast_config();
    let consent = ConsentDismisser::from_config(&config.consent, &config.timing);
    let sequencer = Sequencer::new(&config, &consent);
    let mut driver = ScriptedDriver::search_form(&["-- comune --", "Stezzano", "Zanica"])
        .with_results("Stezzano", &results_page(&[]));

    let selectors = sequencer.search(&mut driver, Some("Stezzano"))?;

    let controls: Vec<(FieldRole, usize)> = selectors.iter().map(|s| (s.role, s.control)).collect();
    assert_eq!(
        controls,
        vec![
            (FieldRole::Region, 1),
            (FieldRole::Province, 2),
            (FieldRole::Municipality, 3),
            (FieldRole::PageSize, 4),
        ]
    );
    let log = driver.log.borrow();
    let labels: Vec<&str> = log.selections.iter().map(|(_, l)| l.as_str()).collect();
    assert_eq!(labels, vec!["Lombardia", "Bergamo", "Stezzano", "50"]);
    assert!(log.clicks.iter().any(|(target, force)| target == "css:#mostra" && !force));
    assert_eq!(aste_watch::driver::PageDriver::current_url(&driver), RESULTS_URL);
    Ok(())
}

#[test]
fn alternate_spelling_is_located_and_selected() -> Result<()> {
    let config = fast_config();
    let consent = ConsentDismisser::disabled();
    let sequencer = Sequencer::new(&config, &consent);
    let mut driver = ScriptedDriver::search_form(&["-- seleziona --", "Bonate Sopra", "Brembate Sopra"]);

    let selectors = sequencer.search(&mut driver, Some("Brembate di Sopra"))?;

    let municipality = selectors
        .iter()
        .find(|s| s.role == FieldRole::Municipality)
        .expect("municipality control located");
    assert_eq!(municipality.control, 3);
    assert_eq!(municipality.evidence, vec!["Brembate Sopra"]);
    let log = driver.log.borrow();
    assert!(log.selections.iter().any(|(_, label)| label == "Brembate Sopra"));
    assert!(log.fills.is_empty());
    Ok(())
}

#[test]
fn past_auctions_checkbox_is_cleared_before_submit() -> Result<()> {
    let config = fast_config();
    let consent = ConsentDismisser::disabled();
    let sequencer = Sequencer::new(&config, &consent);
    let mut driver = ScriptedDriver::search_form(&["Stezzano"]);

    sequencer.search(&mut driver, Some("Stezzano"))?;

    let log = driver.log.borrow();
    assert_eq!(log.unchecked, vec!["Includi le aste passate"]);
    assert!(log.checked_at_submit.is_empty());
    drop(log);

    let mut plain = ScriptedDriver::search_form(&["Stezzano"]);
    plain.checkboxes.clear();
    sequencer.search(&mut plain, Some("Stezzano"))?;
    assert!(plain.log.borrow().clicks.iter().any(|(t, _)| t == "css:#mostra"));
    Ok(())
}

#[test]
fn missing_municipality_fails_with_locator_error() {
    let config = fast_config();
    let consent = ConsentDismisser::disabled();
    let sequencer = Sequencer::new(&config, &consent);
    let mut driver = ScriptedDriver::search_form(&["-- comune --", "Zanica"]);

    let err = sequencer
        .search(&mut driver, Some("Stezzano"))
        .expect_err("locality absent from the form");

    assert!(matches!(
        err,
        ScrapeError::LocatorNotFound {
            role: FieldRole::Municipality,
            ..
        }
    ));
    assert!(driver.log.borrow().clicks.iter().all(|(t, _)| t != "css:#mostra"));
}

#[test]
fn municipality_falls_back_to_free_text_input() -> Result<()> {
    let config = fast_config();
    let consent = ConsentDismisser::disabled();
    let sequencer = Sequencer::new(&config, &consent);
    let mut driver = ScriptedDriver::search_form(&["-- comune --", "Zanica"]);
    driver.fillable = Some("#comune-testo".to_string());

    let selectors = sequencer.search(&mut driver, Some("Stezzano"))?;

    assert!(selectors.iter().all(|s| s.role != FieldRole::Municipality));
    assert_eq!(
        driver.log.borrow().fills,
        vec![("css:#comune-testo".to_string(), "Stezzano".to_string())]
    );
    Ok(())
}

#[test]
fn intercepted_submit_is_retried_with_force() -> Result<()> {
    let config = fast_config();
    let consent = ConsentDismisser::from_config(&config.consent, &config.timing);
    let sequencer = Sequencer::new(&config, &consent);
    let mut driver = ScriptedDriver::search_form(&["Stezzano"]);

    let selectors = sequencer.apply(&mut driver, &plan_steps(&config.search, Some("Stezzano")))?;
    assert_eq!(selectors.len(), 4);

    // An overlay the consent config does not know about swallows plain clicks.
    driver.banner = Some("#other-overlay".to_string());
    driver.banner_visible = true;
    sequencer.submit(&mut driver)?;

    let log = driver.log.borrow();
    let submits: Vec<bool> = log
        .clicks
        .iter()
        .filter(|(t, _)| t == "css:#mostra")
        .map(|(_, force)| *force)
        .collect();
    assert_eq!(submits, vec![false, true]);
    Ok(())
}

#[test]
fn submit_failure_reports_both_attempts() {
    let mut config = fast_config();
    config.search.submit = "css:#assente".to_string();
    let consent = ConsentDismisser::disabled();
    let sequencer = Sequencer::new(&config, &consent);
    let mut driver = ScriptedDriver::search_form(&["Stezzano"]);

    let err = sequencer
        .submit(&mut driver)
        .expect_err("submit control does not exist");

    match err {
        ScrapeError::SubmissionFailed(detail) => assert!(detail.contains("forced retry")),
        other => panic!("unexpected error {other:?}"),
    }
}
