//! Plain-text summaries for the terminal.

use crate::aggregations::{format_duration, CompanyAggregate};
use crate::sessions::VisitorSessions;
use chrono::Local;
use visitor_core::types::VisitEvent;

/// Report generator for roster and visitor listings.
pub struct ReportGenerator;

impl ReportGenerator {
    /// One line per visible company with its filtered activity.
    pub fn roster_summary(aggregate: &CompanyAggregate) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "  Companies: {} visible of {} known\n",
            aggregate.companies.len(),
            aggregate.roster.len()
        ));
        if aggregate.companies.is_empty() {
            output.push_str("  No visitors within this filter.\n");
            return output;
        }

        for company in &aggregate.companies {
            let name = match &company.company_domain {
                Some(domain) => format!("{} ({})", company.company_name, domain),
                None => company.company_name.clone(),
            };
            match aggregate.group(&company.company_name) {
                Some(group) => {
                    let last = group
                        .last_visit()
                        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".into());
                    output.push_str(&format!(
                        "  {}  visits: {}  visitors: {}  time: {}  last: {}\n",
                        name,
                        group.visit_count(),
                        group.visitor_count(),
                        format_duration(group.total_duration_secs()),
                        last
                    ));
                }
                None => output.push_str(&format!("  {}\n", name)),
            }
        }

        output
    }

    /// Numbered visitor blocks with each visit on its own line.
    pub fn visitor_summary(company_name: &str, visitors: &[VisitorSessions]) -> String {
        let mut output = format!("  Activity - {}\n", company_name);
        if visitors.is_empty() {
            output.push_str("  No activity found.\n");
            return output;
        }

        for (i, visitor) in visitors.iter().enumerate() {
            output.push_str(&format!(
                "  Visitor {} [{}]: {} visits\n",
                i + 1,
                visitor.visitor_key,
                visitor.sessions.len()
            ));
            for visit in &visitor.sessions {
                output.push_str(&format!("    {}\n", visit_line(visit)));
            }
        }

        output
    }
}

fn visit_line(visit: &VisitEvent) -> String {
    let when = visit
        .instant()
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| visit.timestamp.clone());
    let duration = visit
        .duration_seconds
        .map(|d| format!("{}s", d))
        .unwrap_or_else(|| "-".into());
    format!("{}  {}  {}", visit.page_url, when, duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregations::CompanyAggregator;
    use crate::filter::FilterCriteria;
    use crate::sessions::VisitorSessionGrouper;
    use chrono::Utc;

    fn events() -> Vec<VisitEvent> {
        vec![
            VisitEvent::new("e1", "u1", "Acme", "/pricing", Utc::now())
                .with_domain("acme.io")
                .with_anon_id("v1")
                .with_duration(90.0),
            VisitEvent::new("e2", "u1", "Acme", "/demo", Utc::now()).with_anon_id("v1"),
            VisitEvent::new("e3", "u1", "Beta", "/", Utc::now()),
        ]
    }

    #[test]
    fn test_roster_summary() {
        let all = events();
        let agg = CompanyAggregator::aggregate(&all, &all, &FilterCriteria::default());
        let report = ReportGenerator::roster_summary(&agg);
        assert!(report.contains("2 visible of 2 known"));
        assert!(report.contains("Acme (acme.io)  visits: 2  visitors: 1  time: 1m"));
        assert!(report.contains("Beta  visits: 1"));
    }

    #[test]
    fn test_empty_roster_summary() {
        let none: Vec<VisitEvent> = Vec::new();
        let agg = CompanyAggregator::aggregate(&none, &none, &FilterCriteria::default());
        let report = ReportGenerator::roster_summary(&agg);
        assert!(report.contains("0 visible of 0 known"));
        assert!(report.contains("No visitors"));
    }

    #[test]
    fn test_visitor_summary() {
        let all = events();
        let visitors = VisitorSessionGrouper::group_by_visitor(&all, "Acme");
        let report = ReportGenerator::visitor_summary("Acme", &visitors);
        assert!(report.contains("Activity - Acme"));
        assert!(report.contains("Visitor 1 [v1]: 2 visits"));
        assert!(report.contains("/pricing"));
        assert!(report.contains("90s"));

        let none = ReportGenerator::visitor_summary("Nobody", &[]);
        assert!(none.contains("No activity found."));
    }
}
