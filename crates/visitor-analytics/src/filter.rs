//! Record-level filtering.
//!
//! A record passes when every active criterion passes. A criterion is
//! active when its value is present and non-empty. `min_visit_count` and
//! `company_substring` describe companies, not records, and are applied by
//! the aggregator.

use crate::date_range::{DateRangeClassifier, DateWindow, RangeType};
use chrono::{Local, NaiveDate, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;
use visitor_core::config::WeekStart;
use visitor_core::types::{Label, VisitEvent};

/// The current combination of filter values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub range_type: RangeType,
    #[serde(deserialize_with = "de_blank_as_none")]
    pub custom_from: Option<NaiveDate>,
    #[serde(deserialize_with = "de_blank_as_none")]
    pub custom_to: Option<NaiveDate>,
    pub location_substring: Option<String>,
    pub page_substring: Option<String>,
    #[serde(deserialize_with = "de_blank_as_none")]
    pub min_duration_seconds: Option<f64>,
    #[serde(deserialize_with = "de_blank_as_none")]
    pub min_visit_count: Option<usize>,
    pub label_text: Option<String>,
    pub company_substring: Option<String>,
}

impl FilterCriteria {
    pub fn new(range_type: RangeType) -> Self {
        Self {
            range_type,
            ..Self::default()
        }
    }

    pub fn custom(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            range_type: RangeType::Custom,
            custom_from: Some(from),
            custom_to: Some(to),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, needle: impl Into<String>) -> Self {
        self.location_substring = Some(needle.into());
        self
    }

    pub fn with_page(mut self, needle: impl Into<String>) -> Self {
        self.page_substring = Some(needle.into());
        self
    }

    pub fn with_min_duration(mut self, seconds: f64) -> Self {
        self.min_duration_seconds = Some(seconds);
        self
    }

    pub fn with_min_visits(mut self, count: usize) -> Self {
        self.min_visit_count = Some(count);
        self
    }

    pub fn with_label(mut self, label_text: impl Into<String>) -> Self {
        self.label_text = Some(label_text.into());
        self
    }

    pub fn with_company(mut self, needle: impl Into<String>) -> Self {
        self.company_substring = Some(needle.into());
        self
    }

    /// Active label filter, if any.
    pub fn active_label(&self) -> Option<&str> {
        non_empty(&self.label_text)
    }

    /// Active company-name search, lowercased.
    pub fn company_needle(&self) -> Option<String> {
        non_empty(&self.company_substring).map(str::to_lowercase)
    }
}

/// Record predicate built once per criteria change.
pub struct FilterPipeline<'a> {
    window: Option<DateWindow>,
    location: Option<String>,
    page: Option<String>,
    min_duration: Option<f64>,
    labelled_companies: Option<HashSet<&'a str>>,
}

impl<'a> FilterPipeline<'a> {
    pub fn new<Tz: TimeZone>(
        criteria: &FilterCriteria,
        labels: &'a [Label],
        classifier: &DateRangeClassifier<Tz>,
    ) -> Self {
        let labelled_companies = criteria.active_label().map(|text| {
            labels
                .iter()
                .filter(|l| l.label_text == text)
                .map(|l| l.company_name.as_str())
                .collect()
        });

        Self {
            window: classifier.window(
                criteria.range_type,
                criteria.custom_from,
                criteria.custom_to,
            ),
            location: non_empty(&criteria.location_substring).map(str::to_lowercase),
            page: non_empty(&criteria.page_substring).map(str::to_lowercase),
            min_duration: criteria.min_duration_seconds,
            labelled_companies,
        }
    }

    /// Whether `event` passes every active criterion.
    pub fn evaluate(&self, event: &VisitEvent) -> bool {
        if let Some(window) = &self.window {
            if !event.instant().is_some_and(|t| window.contains(t)) {
                return false;
            }
        }
        if let Some(needle) = &self.location {
            let hit = event
                .location_text
                .as_deref()
                .is_some_and(|loc| loc.to_lowercase().contains(needle.as_str()));
            if !hit {
                return false;
            }
        }
        if let Some(needle) = &self.page {
            if !event.page_url.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(min) = self.min_duration {
            if !event.duration_seconds.is_some_and(|d| d >= min) {
                return false;
            }
        }
        if let Some(companies) = &self.labelled_companies {
            if !companies.contains(event.company()) {
                return false;
            }
        }
        true
    }

    /// Passing events, cloned, in input order.
    pub fn apply<'e>(&self, events: impl IntoIterator<Item = &'e VisitEvent>) -> Vec<VisitEvent> {
        events
            .into_iter()
            .filter(|e| self.evaluate(e))
            .cloned()
            .collect()
    }
}

/// Evaluate one event against the current local time.
pub fn evaluate(event: &VisitEvent, criteria: &FilterCriteria, labels: &[Label]) -> bool {
    let classifier = DateRangeClassifier::<Local>::local(WeekStart::Sunday);
    FilterPipeline::new(criteria, labels, &classifier).evaluate(event)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Form and query inputs send blank strings for unset fields.
fn de_blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected string or number, got {other}"
            )))
        }
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    fn classifier() -> DateRangeClassifier<Utc> {
        DateRangeClassifier::at(now(), WeekStart::Sunday)
    }

    fn event(id: &str, company: &str, page: &str, ts: DateTime<Utc>) -> VisitEvent {
        VisitEvent::new(id, "u1", company, page, ts)
    }

    fn sample() -> Vec<VisitEvent> {
        vec![
            event("e1", "Acme", "/pricing", now())
                .with_location("Amsterdam, NL")
                .with_duration(40.0),
            event("e2", "Acme", "/blog/post", now() - Duration::days(1))
                .with_location("Utrecht, NL")
                .with_duration(5.0),
            event("e3", "Beta", "/Pricing/enterprise", now()).with_duration(90.0),
            event("e4", "Gamma", "/", now() - Duration::days(40)).with_location("Berlin, DE"),
        ]
    }

    fn ids(events: &[VisitEvent]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_no_criteria_passes_everything() {
        let criteria = FilterCriteria::default();
        let events = sample();
        let pipeline = FilterPipeline::new(&criteria, &[], &classifier());
        assert_eq!(pipeline.apply(&events).len(), events.len());
    }

    #[test]
    fn test_date_range_criterion() {
        let criteria = FilterCriteria::new(RangeType::Today);
        let events = sample();
        let pipeline = FilterPipeline::new(&criteria, &[], &classifier());
        assert_eq!(ids(&pipeline.apply(&events)), vec!["e1", "e3"]);
    }

    #[test]
    fn test_location_is_case_insensitive_and_requires_field() {
        let criteria = FilterCriteria::default().with_location("nl");
        let events = sample();
        let pipeline = FilterPipeline::new(&criteria, &[], &classifier());
        // e3 has no location and fails.
        assert_eq!(ids(&pipeline.apply(&events)), vec!["e1", "e2"]);
    }

    #[test]
    fn test_page_substring() {
        let criteria = FilterCriteria::default().with_page("PRICING");
        let events = sample();
        let pipeline = FilterPipeline::new(&criteria, &[], &classifier());
        assert_eq!(ids(&pipeline.apply(&events)), vec!["e1", "e3"]);
    }

    #[test]
    fn test_min_duration_requires_field() {
        let criteria = FilterCriteria::default().with_min_duration(40.0);
        let events = sample();
        let pipeline = FilterPipeline::new(&criteria, &[], &classifier());
        // e1 is exactly at the threshold; e4 has no duration.
        assert_eq!(ids(&pipeline.apply(&events)), vec!["e1", "e3"]);
    }

    #[test]
    fn test_label_membership() {
        let labels = vec![
            Label::new("l1", "u1", "Beta", "Hot"),
            Label::new("l2", "u1", "Acme", "Cold"),
        ];
        let criteria = FilterCriteria::default().with_label("Hot");
        let events = sample();
        let pipeline = FilterPipeline::new(&criteria, &labels, &classifier());
        assert_eq!(ids(&pipeline.apply(&events)), vec!["e3"]);

        let criteria = FilterCriteria::default().with_label("Missing");
        let pipeline = FilterPipeline::new(&criteria, &labels, &classifier());
        assert!(pipeline.apply(&events).is_empty());
    }

    #[test]
    fn test_empty_strings_are_inactive() {
        let criteria = FilterCriteria::default()
            .with_location("")
            .with_page("")
            .with_label("");
        let events = sample();
        let pipeline = FilterPipeline::new(&criteria, &[], &classifier());
        assert_eq!(pipeline.apply(&events).len(), 4);
    }

    #[test]
    fn test_unparseable_timestamp_only_fails_ranged_filters() {
        let mut broken = event("bad", "Acme", "/", now());
        broken.timestamp = "not a time".into();

        let all = FilterCriteria::default();
        let pipeline = FilterPipeline::new(&all, &[], &classifier());
        assert!(pipeline.evaluate(&broken));

        let today = FilterCriteria::new(RangeType::Today);
        let pipeline = FilterPipeline::new(&today, &[], &classifier());
        assert!(!pipeline.evaluate(&broken));
    }

    #[test]
    fn test_criteria_order_does_not_matter() {
        let labels = vec![
            Label::new("l1", "u1", "Acme", "Hot"),
            Label::new("l2", "u1", "Beta", "Hot"),
        ];
        let singles = vec![
            FilterCriteria::new(RangeType::ThisWeek),
            FilterCriteria::default().with_page("pricing"),
            FilterCriteria::default().with_min_duration(10.0),
            FilterCriteria::default().with_label("Hot"),
        ];
        let combined = FilterCriteria {
            range_type: RangeType::ThisWeek,
            page_substring: Some("pricing".into()),
            min_duration_seconds: Some(10.0),
            label_text: Some("Hot".into()),
            ..FilterCriteria::default()
        };
        let events = sample();
        let expected = FilterPipeline::new(&combined, &labels, &classifier()).apply(&events);

        let forward = singles.iter().fold(events.clone(), |acc, c| {
            FilterPipeline::new(c, &labels, &classifier()).apply(&acc)
        });
        let backward = singles.iter().rev().fold(events.clone(), |acc, c| {
            FilterPipeline::new(c, &labels, &classifier()).apply(&acc)
        });
        assert_eq!(forward, expected);
        assert_eq!(backward, expected);
        assert_eq!(ids(&expected), vec!["e1", "e3"]);
    }

    #[test]
    fn test_criteria_from_query_string_blanks() {
        let criteria: FilterCriteria = serde_json::from_value(serde_json::json!({
            "range_type": "custom",
            "custom_from": "2024-05-01",
            "custom_to": "",
            "min_visit_count": "3",
            "min_duration_seconds": 12.5,
        }))
        .unwrap();
        assert_eq!(criteria.range_type, RangeType::Custom);
        assert_eq!(criteria.custom_from, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(criteria.custom_to, None);
        assert_eq!(criteria.min_visit_count, Some(3));
        assert_eq!(criteria.min_duration_seconds, Some(12.5));
    }

    #[test]
    fn test_free_evaluate_uses_local_now() {
        let e = event("e1", "Acme", "/", Utc::now());
        assert!(evaluate(&e, &FilterCriteria::new(RangeType::Today), &[]));
        assert!(!evaluate(&e, &FilterCriteria::new(RangeType::Yesterday), &[]));
    }
}
