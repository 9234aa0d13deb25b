//! Per-visitor grouping of one company's filtered events.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use visitor_core::types::VisitEvent;

/// Grouping key for a visitor's sessions.
///
/// Events without an anonymous visitor id each form their own group, keyed
/// by the event id. The two variants never compare equal, so an anonymous id
/// that happens to read `unknown-<id>` cannot swallow a visitor-less event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VisitorKey {
    Anonymous(String),
    Unidentified(String),
}

impl VisitorKey {
    pub fn for_event(event: &VisitEvent) -> Self {
        match event.visitor_id() {
            Some(id) => VisitorKey::Anonymous(id.to_string()),
            None => VisitorKey::Unidentified(event.id.clone()),
        }
    }
}

impl fmt::Display for VisitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitorKey::Anonymous(id) => f.write_str(id),
            VisitorKey::Unidentified(event_id) => write!(f, "unknown-{}", event_id),
        }
    }
}

impl Serialize for VisitorKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One visitor's events within the selected company, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorSessions {
    pub visitor_key: VisitorKey,
    pub sessions: Vec<VisitEvent>,
}

impl VisitorSessions {
    /// Instant of the group's first event; the recency sort key.
    pub fn first_instant(&self) -> Option<DateTime<Utc>> {
        self.sessions.first().and_then(VisitEvent::instant)
    }
}

pub struct VisitorSessionGrouper;

impl VisitorSessionGrouper {
    /// Group the selected company's events by visitor.
    ///
    /// Groups are ordered by their first event's instant, newest first.
    /// Groups whose first instant is unreadable sort last; ties keep
    /// first-arrival order.
    pub fn group_by_visitor(filtered: &[VisitEvent], company_name: &str) -> Vec<VisitorSessions> {
        let mut index: HashMap<VisitorKey, usize> = HashMap::new();
        let mut groups: Vec<VisitorSessions> = Vec::new();

        for event in filtered.iter().filter(|e| e.company() == company_name) {
            let key = VisitorKey::for_event(event);
            let slot = match index.get(&key) {
                Some(slot) => *slot,
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(VisitorSessions {
                        visitor_key: key,
                        sessions: Vec::new(),
                    });
                    groups.len() - 1
                }
            };
            groups[slot].sessions.push(event.clone());
        }

        groups.sort_by(|a, b| b.first_instant().cmp(&a.first_instant()));
        groups
    }
}
