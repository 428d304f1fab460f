//! Age-based class assignment.
//!
//! Classes are configuration, not data: the table is rebuilt on every call
//! and a child's class is re-derived on every read, so an edited birth date
//! takes effect immediately.

use chrono::{Datelike, Local, NaiveDate};

/// A class group with its age range and display metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ClassGroup {
    pub name: &'static str,
    /// Display label for the age range
    pub ages: &'static str,
    pub min_age: i32,
    /// `None` marks the open-ended oldest group
    pub max_age: Option<i32>,
}

/// Class assigned when a child has no birth date and no explicit class
const FALLBACK_CLASS: &str = "Cadets";

/// The fixed class enumeration: non-overlapping, age-ordered, with the last
/// range open-ended
pub fn class_groups() -> [ClassGroup; 3] {
    [
        ClassGroup {
            name: "Candle Lighters",
            ages: "5 & Below",
            min_age: 0,
            max_age: Some(5),
        },
        ClassGroup {
            name: "Cupbearers",
            ages: "6-7 Years",
            min_age: 6,
            max_age: Some(7),
        },
        ClassGroup {
            name: "Cadets",
            ages: "8+ Years",
            min_age: 8,
            max_age: None,
        },
    ]
}

/// Age in whole years as of `today`, decremented when today's month/day
/// precede the birth month/day
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}

/// Age in whole years as of the current local date
pub fn age(birth_date: NaiveDate) -> i32 {
    age_on(birth_date, Local::now().date_naive())
}

fn class_for_age(age: i32) -> &'static str {
    class_groups()
        .into_iter()
        .find(|group| group.max_age.map_or(true, |max| age <= max))
        .map(|group| group.name)
        .unwrap_or(FALLBACK_CLASS)
}

/// Class for a child as of `today`.
///
/// An explicit non-blank class wins verbatim; it is not validated against
/// the known groups. Otherwise the class is derived from the birth date,
/// with the oldest group as the fallback when no birth date is known.
pub fn classify_on(
    birth_date: Option<NaiveDate>,
    explicit_class: Option<&str>,
    today: NaiveDate,
) -> String {
    if let Some(class) = explicit_class.map(str::trim).filter(|c| !c.is_empty()) {
        return class.to_string();
    }

    match birth_date {
        Some(birth_date) => class_for_age(age_on(birth_date, today)).to_string(),
        None => FALLBACK_CLASS.to_string(),
    }
}

/// Class for a child as of the current local date
pub fn classify(birth_date: Option<NaiveDate>, explicit_class: Option<&str>) -> String {
    classify_on(birth_date, explicit_class, Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_age_truncates_before_birthday() {
        assert_eq!(age_on(date("2019-07-22"), date("2025-07-21")), 5);
        assert_eq!(age_on(date("2019-07-22"), date("2025-07-22")), 6);
        assert_eq!(age_on(date("2019-07-22"), date("2026-01-01")), 6);
        assert_eq!(age_on(date("2019-12-31"), date("2025-01-01")), 5);
    }

    #[test]
    fn test_classify_age_boundaries() {
        let today = date("2025-07-21");
        assert_eq!(classify_on(Some(date("2019-07-22")), None, today), "Candle Lighters");
        assert_eq!(
            classify_on(Some(date("2019-07-22")), None, date("2025-07-22")),
            "Cupbearers"
        );
        // age 5 / 6 / 7 / 8
        assert_eq!(classify_on(Some(date("2020-01-01")), None, today), "Candle Lighters");
        assert_eq!(classify_on(Some(date("2019-01-01")), None, today), "Cupbearers");
        assert_eq!(classify_on(Some(date("2018-01-01")), None, today), "Cupbearers");
        assert_eq!(classify_on(Some(date("2017-01-01")), None, today), "Cadets");
    }

    #[test]
    fn test_explicit_class_wins_verbatim() {
        let today = date("2025-07-21");
        assert_eq!(
            classify_on(Some(date("2020-01-01")), Some("Cadets"), today),
            "Cadets"
        );
        // Not validated against the known groups
        assert_eq!(
            classify_on(Some(date("2020-01-01")), Some("Visitors"), today),
            "Visitors"
        );
        // Blank override is ignored
        assert_eq!(
            classify_on(Some(date("2020-01-01")), Some("   "), today),
            "Candle Lighters"
        );
    }

    #[test]
    fn test_missing_birth_date_falls_back_to_oldest() {
        assert_eq!(classify_on(None, None, date("2025-07-21")), "Cadets");
    }

    #[test]
    fn test_class_groups_are_ordered_and_non_overlapping() {
        let groups = class_groups();
        assert_eq!(groups.len(), 3);
        for pair in groups.windows(2) {
            let max = pair[0].max_age.expect("only the last group is open-ended");
            assert_eq!(pair[1].min_age, max + 1);
        }
        assert!(groups[2].max_age.is_none());
    }
}
