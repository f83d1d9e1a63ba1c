use anyhow::Result;
use aste_watch::error::ScrapeError;
use aste_watch::fingerprint::{fingerprint, new_notices, next_state};
use aste_watch::model::{CandidateLink, Notice, NoticeKind, RunState};
use aste_watch::notice::diagnostic_notice;
use aste_watch::store::{load_state, save_state};
use chrono::NaiveDate;
use tempfile::tempdir;

const FALLBACK: &str = "https://www.tribunale.example/vendite.html?esito=1";

fn notice(locality: &str, header: &str, canonical: &str) -> Notice {
    let sale_date = NaiveDate::from_ymd_opt(2031, 3, 12);
    Notice {
        locality: locality.to_string(),
        kind: NoticeKind::Listing,
        header: header.to_string(),
        body: String::new(),
        links: vec![CandidateLink::new(canonical, "")],
        canonical_link: canonical.to_string(),
        sale_date,
        price: Some("123.456,00".to_string()),
        fingerprint: fingerprint(header, sale_date, Some("123.456,00"), canonical, FALLBACK),
    }
}

#[test]
fn direct_link_is_the_fingerprint() {
    let n = notice("Stezzano", "TRIBUNALE DI BERGAMO - RGE 1/2024", "https://pvp.giustizia.it/a/1");
    assert_eq!(n.fingerprint, "https://pvp.giustizia.it/a/1");
}

#[test]
fn fallback_fingerprint_survives_cosmetic_rewording() {
    let date = NaiveDate::from_ymd_opt(2031, 3, 12);
    let a = fingerprint(
        "TRIBUNALE DI BERGAMO -  R.G.E. 120/2023",
        date,
        Some("€ 123.456,00"),
        FALLBACK,
        FALLBACK,
    );
    let b = fingerprint(
        "Tribunale di Bergamo – R.G.E. 120/2023",
        date,
        Some("123456,00"),
        FALLBACK,
        FALLBACK,
    );
    assert_eq!(a, b);
    assert_eq!(a, "tribunale di bergamo r g e 120 2023 || 2031-03-12 || 12345600");

    let unknown = fingerprint("TRIBUNALE DI BERGAMO", None, None, "mailto:x@example.it", FALLBACK);
    assert_eq!(unknown, "tribunale di bergamo || unknown || ");
}

#[test]
fn second_identical_run_reports_nothing_new() {
    let localities = vec!["Stezzano".to_string(), "Zanica".to_string()];
    let run = vec![
        notice("Stezzano", "TRIBUNALE DI BERGAMO - RGE 1/2024", "https://pvp.giustizia.it/a/1"),
        notice("Zanica", "TRIBUNALE DI BERGAMO - RGE 2/2024", "https://pvp.giustizia.it/a/2"),
    ];

    let first = new_notices(&run, &RunState::default());
    assert_eq!(first.len(), 2);

    let state = next_state(&localities, &run);
    assert!(new_notices(&run, &state).is_empty());
}

#[test]
fn changed_link_is_new_exactly_once() {
    let localities = vec!["Stezzano".to_string()];
    let before = vec![notice("Stezzano", "TRIBUNALE DI BERGAMO - RGE 1/2024", "https://pvp.giustizia.it/a/1")];
    let state = next_state(&localities, &before);

    let after = vec![notice("Stezzano", "TRIBUNALE DI BERGAMO - RGE 1/2024", "https://pvp.giustizia.it/a/1-bis")];
    assert_eq!(new_notices(&after, &state).len(), 1);

    let state = next_state(&localities, &after);
    assert!(new_notices(&after, &state).is_empty());
}

#[test]
fn same_fingerprint_in_another_locality_is_new_there() {
    let localities = vec!["Stezzano".to_string(), "Zanica".to_string()];
    let link = "https://pvp.giustizia.it/a/1";
    let state = next_state(&localities, &[notice("Stezzano", "H", link)]);

    let fresh = new_notices(&[notice("Zanica", "H", link)], &state).len();
    assert_eq!(fresh, 1);
}

#[test]
fn duplicates_within_a_run_are_reported_once() {
    let link = "https://pvp.giustizia.it/a/1";
    let run = vec![notice("Stezzano", "A", link), notice("Stezzano", "B", link)];
    assert_eq!(new_notices(&run, &RunState::default()).len(), 1);
}

#[test]
fn diagnostics_are_never_new_nor_persisted() {
    let localities = vec!["Stezzano".to_string(), "Zanica".to_string()];
    let err = ScrapeError::SubmissionFailed("intercepted".to_string());
    let run = vec![diagnostic_notice("Zanica", &err, FALLBACK)];

    assert!(new_notices(&run, &RunState::default()).is_empty());
    let state = next_state(&localities, &run);
    assert_eq!(state.localities.len(), 2);
    assert!(state.localities.values().all(|seen| seen.is_empty()));
}

#[test]
fn state_round_trips_through_disk() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("nested").join("seen.json");

    assert_eq!(load_state(&path)?, RunState::default());

    let localities = vec!["Stezzano".to_string()];
    let state = next_state(
        &localities,
        &[notice("Stezzano", "H", "https://pvp.giustizia.it/a/1")],
    );
    save_state(&path, &state)?;

    let loaded = load_state(&path)?;
    assert_eq!(loaded, state);
    assert_eq!(loaded.schema_version, 1);
    assert!(!tmp.path().join("nested").join("seen.json.tmp").exists());

    let emptied = next_state(&localities, &[]);
    save_state(&path, &emptied)?;
    assert_eq!(load_state(&path)?, emptied);
    Ok(())
}

#[test]
fn state_from_a_newer_release_is_refused() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("seen.json");
    std::fs::write(&path, r#"{"schema_version": 2, "localities": {"Stezzano": ["x"]}}"#)?;

    let err = load_state(&path).expect_err("newer schema must not be read");
    assert!(err.to_string().contains("schema version 2"));
    Ok(())
}

#[test]
fn older_state_without_version_still_loads() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("seen.json");
    std::fs::write(&path, r#"{"localities": {"Zanica": ["https://pvp.giustizia.it/a/2"]}}"#)?;

    let state = load_state(&path)?;
    assert!(state.seen("Zanica").is_some_and(|s| s.contains("https://pvp.giustizia.it/a/2")));
    Ok(())
}

#[test]
fn corrupt_state_is_an_error() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("seen.json");
    std::fs::write(&path, "{ not json")?;
    assert!(load_state(&path).is_err());
    Ok(())
}
