use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::LazyLock;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[./](\d{1,2})[./](\d{4})\b").expect("date regex must be valid")
});

pub fn extract_dates(text: &str) -> Vec<NaiveDate> {
    let mut found = Vec::new();
    for caps in DATE_RE.captures_iter(text) {
        let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let (Some(day), Some(month), Some(year)) = (part(1), part(2), part(3)) else {
            continue;
        };
        let Some(date) = NaiveDate::from_ymd_opt(year as i32, month, day) else {
            continue;
        };
        if !found.contains(&date) {
            found.push(date);
        }
    }
    found
}

/// Soonest date that is today or later; otherwise the latest date seen, kept
/// for display. `None` when there is no date at all.
pub fn pick_sale_date(dates: &[NaiveDate], today: NaiveDate) -> Option<NaiveDate> {
    dates
        .iter()
        .copied()
        .filter(|d| *d >= today)
        .min()
        .or_else(|| dates.iter().copied().max())
}

pub fn sale_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    pick_sale_date(&extract_dates(text), today)
}

pub fn is_active(sale_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    sale_date.is_none_or(|d| d >= today)
}

pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}
