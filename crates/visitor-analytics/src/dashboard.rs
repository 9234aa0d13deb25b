//! The presentation-facing facade.
//!
//! Holds the working set and the current label set, and recomputes every
//! derived view from that snapshot on each call. Nothing derived is cached.

use crate::aggregations::{CompanyAggregate, CompanyAggregator, CompanyRecord};
use crate::date_range::DateRangeClassifier;
use crate::export::{ExportError, TabularExporter};
use crate::filter::{FilterCriteria, FilterPipeline};
use crate::sessions::{VisitorSessionGrouper, VisitorSessions};
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use std::collections::HashSet;
use visitor_core::config::{AppConfig, WeekStart};
use visitor_core::types::{Label, VisitEvent};
use visitor_core::working_set::{Admission, WorkingSet};

/// Display metadata for one company.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyDetails {
    pub company: CompanyRecord,
    pub labels: Vec<Label>,
}

pub struct Dashboard {
    working_set: WorkingSet,
    labels: Vec<Label>,
    week_start: WeekStart,
    exporter: TabularExporter,
}

impl Dashboard {
    pub fn new(working_set: WorkingSet, labels: Vec<Label>) -> Self {
        Self {
            working_set,
            labels,
            week_start: WeekStart::default(),
            exporter: TabularExporter::default(),
        }
    }

    /// Dashboard with week start and export delimiter taken from `config`.
    pub fn from_config(config: &AppConfig, working_set: WorkingSet, labels: Vec<Label>) -> Self {
        Self {
            working_set,
            labels,
            week_start: config.filters.week_start,
            exporter: TabularExporter::new(config.export.delimiter),
        }
    }

    /// Merge a newly delivered event into the working set.
    pub fn ingest(&mut self, event: VisitEvent) -> Admission {
        self.working_set.insert(event)
    }

    /// Replace the label set after label management changed it.
    pub fn set_labels(&mut self, labels: Vec<Label>) {
        self.labels = labels;
    }

    pub fn working_set(&self) -> &WorkingSet {
        &self.working_set
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Events passing `criteria`, in working-set order.
    pub fn filtered_events(&self, criteria: &FilterCriteria) -> Vec<VisitEvent> {
        self.filtered_events_at(criteria, Local::now())
    }

    pub fn filtered_events_at<Tz: TimeZone>(
        &self,
        criteria: &FilterCriteria,
        now: DateTime<Tz>,
    ) -> Vec<VisitEvent> {
        let classifier = DateRangeClassifier::at(now, self.week_start);
        FilterPipeline::new(criteria, &self.labels, &classifier).apply(self.working_set.iter())
    }

    /// Roster, visible companies and per-company groups under `criteria`.
    pub fn aggregate(&self, criteria: &FilterCriteria) -> CompanyAggregate {
        self.aggregate_at(criteria, Local::now())
    }

    pub fn aggregate_at<Tz: TimeZone>(
        &self,
        criteria: &FilterCriteria,
        now: DateTime<Tz>,
    ) -> CompanyAggregate {
        let filtered = self.filtered_events_at(criteria, now);
        CompanyAggregator::aggregate(self.working_set.iter(), &filtered, criteria)
    }

    /// Visitor groups for one company under `criteria`, newest first.
    pub fn sessions_for(&self, company_name: &str, criteria: &FilterCriteria) -> Vec<VisitorSessions> {
        self.sessions_for_at(company_name, criteria, Local::now())
    }

    pub fn sessions_for_at<Tz: TimeZone>(
        &self,
        company_name: &str,
        criteria: &FilterCriteria,
        now: DateTime<Tz>,
    ) -> Vec<VisitorSessions> {
        let filtered = self.filtered_events_at(criteria, now);
        VisitorSessionGrouper::group_by_visitor(&filtered, company_name)
    }

    /// Delimited text for `records`; [`ExportError::Empty`] when there are none.
    pub fn export_text(&self, records: &[VisitEvent]) -> Result<String, ExportError> {
        self.exporter.to_delimited_text(records)
    }

    /// Representative record and labels of a known company.
    pub fn company_details(&self, company_name: &str) -> Option<CompanyDetails> {
        let representative = self
            .working_set
            .iter()
            .find(|e| e.company() == company_name)?;
        Some(CompanyDetails {
            company: CompanyRecord::from_event(representative),
            labels: self
                .labels_for_company(company_name)
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    pub fn labels_for_company(&self, company_name: &str) -> Vec<&Label> {
        self.labels
            .iter()
            .filter(|l| l.company_name == company_name)
            .collect()
    }

    /// Distinct label texts in first-seen order.
    pub fn label_options(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.labels
            .iter()
            .map(|l| l.label_text.as_str())
            .filter(|text| seen.insert(*text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_range::RangeType;
    use chrono::{Duration, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    fn visit(id: &str, company: &str, days_ago: i64) -> VisitEvent {
        VisitEvent::new(id, "u1", company, "/", now() - Duration::days(days_ago))
    }

    fn dashboard() -> Dashboard {
        let events = vec![
            visit("e1", "Acme", 0).with_anon_id("v1").with_domain("acme.io"),
            visit("e2", "Acme", 0).with_anon_id("v2"),
            visit("e3", "Beta", 3),
            visit("e4", "Acme", 10).with_anon_id("v1"),
        ];
        let labels = vec![
            Label::new("l1", "u1", "Acme", "Hot"),
            Label::new("l2", "u1", "Beta", "Cold"),
            Label::new("l3", "u1", "Beta", "Hot"),
        ];
        Dashboard::new(WorkingSet::load("u1", events), labels)
    }

    #[test]
    fn test_filtered_events_today() {
        let d = dashboard();
        let today = d.filtered_events_at(&FilterCriteria::new(RangeType::Today), now());
        let ids: Vec<_> = today.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[test]
    fn test_aggregate_hides_filtered_out_companies() {
        let d = dashboard();
        let agg = d.aggregate_at(&FilterCriteria::new(RangeType::Today), now());
        assert_eq!(agg.roster.len(), 2);
        assert_eq!(agg.companies.len(), 1);
        assert_eq!(agg.companies[0].company_name, "Acme");
        assert_eq!(agg.group("Acme").map(|g| g.visit_count()), Some(2));
    }

    #[test]
    fn test_sessions_for_company() {
        let d = dashboard();
        let sessions = d.sessions_for_at("Acme", &FilterCriteria::default(), now());
        assert_eq!(sessions.len(), 2);
        let v1 = sessions
            .iter()
            .find(|s| s.visitor_key.to_string() == "v1")
            .unwrap();
        assert_eq!(v1.sessions.len(), 2);
    }

    #[test]
    fn test_ingest_prepends_and_dedupes() {
        let mut d = dashboard();
        assert_eq!(d.ingest(visit("e5", "Gamma", 0)), Admission::Merged);
        assert_eq!(d.ingest(visit("e5", "Gamma", 0)), Admission::Duplicate);
        let agg = d.aggregate_at(&FilterCriteria::default(), now());
        assert_eq!(agg.roster[0].company_name, "Gamma");
        assert_eq!(agg.roster.len(), 3);
    }

    #[test]
    fn test_label_filter_and_refresh() {
        let mut d = dashboard();
        let criteria = FilterCriteria::default().with_label("Cold");
        let agg = d.aggregate_at(&criteria, now());
        assert_eq!(agg.companies.len(), 1);
        assert_eq!(agg.companies[0].company_name, "Beta");

        d.set_labels(vec![Label::new("l1", "u1", "Acme", "Hot")]);
        assert!(d.aggregate_at(&criteria, now()).companies.is_empty());
    }

    #[test]
    fn test_label_options_and_details() {
        let d = dashboard();
        assert_eq!(d.label_options(), vec!["Hot", "Cold"]);
        assert_eq!(d.labels_for_company("Beta").len(), 2);

        let details = d.company_details("Acme").unwrap();
        assert_eq!(details.company.company_domain.as_deref(), Some("acme.io"));
        assert_eq!(details.labels.len(), 1);
        assert!(d.company_details("Nobody").is_none());
    }

    #[test]
    fn test_export_filtered_events() {
        let d = dashboard();
        let filtered = d.filtered_events_at(&FilterCriteria::new(RangeType::Today), now());
        let text = d.export_text(&filtered).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("id,user_id,company_name,company_domain,location,page_url"));
        assert_eq!(lines.count(), 2);

        let none = d.filtered_events_at(&FilterCriteria::new(RangeType::LastMonth), now());
        assert!(matches!(d.export_text(&none), Err(ExportError::Empty)));
    }

    #[test]
    fn test_export_uses_configured_delimiter() {
        let mut config = AppConfig::default();
        config.export.delimiter = ';';
        let d = Dashboard::from_config(
            &config,
            WorkingSet::load("u1", vec![visit("e1", "Acme", 0)]),
            Vec::new(),
        );
        let text = d.export_text(&d.filtered_events(&FilterCriteria::default())).unwrap();
        assert!(text.starts_with("id;user_id;company_name"));
    }
}
