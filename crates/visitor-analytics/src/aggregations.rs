//! Company roster and per-company grouping.
//!
//! The roster is built from the whole working set (first-seen event per
//! company name). Groups are built from the filtered events only, and the
//! visible company list is the roster restricted to companies whose group
//! survives the company-level criteria.

use crate::filter::FilterCriteria;
use crate::sessions::VisitorKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use visitor_core::types::VisitEvent;

/// Representative row for a company: the first event seen for its name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyRecord {
    pub company_name: String,
    pub company_domain: Option<String>,
    pub representative: VisitEvent,
}

impl CompanyRecord {
    pub fn from_event(event: &VisitEvent) -> Self {
        Self {
            company_name: event.company().to_string(),
            company_domain: event.company_domain.clone(),
            representative: event.clone(),
        }
    }

    /// A contact column carried on the representative event (`linkedin_url`, `kvk_number`, ...).
    pub fn contact(&self, key: &str) -> Option<&str> {
        self.representative.field_str(key)
    }
}

/// Filtered events of one company, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyGroup {
    pub company_name: String,
    pub events: Vec<VisitEvent>,
}

impl CompanyGroup {
    pub fn visit_count(&self) -> usize {
        self.events.len()
    }

    /// Distinct visitors; each visitor-less event counts as its own visitor.
    pub fn visitor_count(&self) -> usize {
        self.events
            .iter()
            .map(VisitorKey::for_event)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Sum of known durations, in whole seconds.
    pub fn total_duration_secs(&self) -> u64 {
        let total: f64 = self.events.iter().filter_map(|e| e.duration_seconds).sum();
        total.max(0.0) as u64
    }

    /// Latest readable visit instant.
    pub fn last_visit(&self) -> Option<DateTime<Utc>> {
        self.events.iter().filter_map(VisitEvent::instant).max()
    }
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompanyAggregate {
    /// Every known company, filtered or not.
    pub roster: Vec<CompanyRecord>,
    /// Companies visible under the current criteria, in roster order.
    pub companies: Vec<CompanyRecord>,
    /// Filtered events per company, in first-arrival order of the company.
    pub groups_by_company: Vec<CompanyGroup>,
}

impl CompanyAggregate {
    pub fn group(&self, company_name: &str) -> Option<&CompanyGroup> {
        self.groups_by_company
            .iter()
            .find(|g| g.company_name == company_name)
    }

    pub fn roster_entry(&self, company_name: &str) -> Option<&CompanyRecord> {
        self.roster.iter().find(|c| c.company_name == company_name)
    }
}

/// Reduces event streams into the company roster and groups.
pub struct CompanyAggregator;

impl CompanyAggregator {
    /// First occurrence per company name, in stream order.
    pub fn roster<'e>(all: impl IntoIterator<Item = &'e VisitEvent>) -> Vec<CompanyRecord> {
        let mut seen = HashSet::new();
        all.into_iter()
            .filter(|e| seen.insert(e.company()))
            .map(CompanyRecord::from_event)
            .collect()
    }

    /// Group events by company name, keeping arrival order inside each group.
    pub fn group(filtered: &[VisitEvent]) -> Vec<CompanyGroup> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<CompanyGroup> = Vec::new();
        for event in filtered {
            let slot = *index.entry(event.company()).or_insert_with(|| {
                groups.push(CompanyGroup {
                    company_name: event.company().to_string(),
                    events: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].events.push(event.clone());
        }
        groups
    }

    /// Build roster, groups and the visible company list.
    pub fn aggregate<'e>(
        all: impl IntoIterator<Item = &'e VisitEvent>,
        filtered: &[VisitEvent],
        criteria: &FilterCriteria,
    ) -> CompanyAggregate {
        let roster = Self::roster(all);
        let groups_by_company = Self::group(filtered);

        let min_visits = criteria.min_visit_count.unwrap_or(0);
        let surviving: HashSet<&str> = groups_by_company
            .iter()
            .filter(|g| g.visit_count() >= min_visits)
            .map(|g| g.company_name.as_str())
            .collect();

        let needle = criteria.company_needle();
        let companies: Vec<CompanyRecord> = roster
            .iter()
            .filter(|c| surviving.contains(c.company_name.as_str()))
            .filter(|c| {
                needle
                    .as_deref()
                    .map_or(true, |n| c.company_name.to_lowercase().contains(n))
            })
            .cloned()
            .collect();

        tracing::debug!(
            "Aggregated {} filtered events: {} known companies, {} visible",
            filtered.len(),
            roster.len(),
            companies.len()
        );

        CompanyAggregate {
            roster,
            companies,
            groups_by_company,
        }
    }
}

/// Format seconds as a human-readable duration string.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}
