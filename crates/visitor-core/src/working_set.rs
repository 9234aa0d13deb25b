//! The in-memory collection of every loaded event for the current user.
//!
//! Keyed by event id so a redelivered event is merged at most once. Order is
//! most-recent-arrival first: the initial load keeps the source's order and
//! realtime arrivals are prepended.

use crate::types::VisitEvent;
use std::collections::{HashSet, VecDeque};

/// Outcome of offering an event to the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Merged,
    /// An event with the same id is already present.
    Duplicate,
    /// The event belongs to another user.
    ForeignOwner,
    /// Events without a company name never enter the working set.
    MissingCompany,
}

#[derive(Debug, Clone)]
pub struct WorkingSet {
    owner: String,
    events: VecDeque<VisitEvent>,
    ids: HashSet<String>,
}

impl WorkingSet {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            events: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// Build from an initial fetch, keeping the fetched order.
    pub fn load(owner: impl Into<String>, events: Vec<VisitEvent>) -> Self {
        let mut set = Self::new(owner);
        let offered = events.len();
        for event in events {
            if set.admit(&event) == Admission::Merged {
                set.ids.insert(event.id.clone());
                set.events.push_back(event);
            }
        }
        tracing::debug!(
            "Working set for {} loaded {} of {} events",
            set.owner,
            set.events.len(),
            offered
        );
        set
    }

    /// Merge a newly arrived event at the front.
    pub fn insert(&mut self, event: VisitEvent) -> Admission {
        let admission = self.admit(&event);
        match admission {
            Admission::Merged => {
                self.ids.insert(event.id.clone());
                self.events.push_front(event);
            }
            other => {
                tracing::debug!("Event {} not merged: {:?}", event.id, other);
            }
        }
        admission
    }

    fn admit(&self, event: &VisitEvent) -> Admission {
        if event.user_id != self.owner {
            Admission::ForeignOwner
        } else if event.company_name.as_deref().map_or(true, str::is_empty) {
            Admission::MissingCompany
        } else if self.ids.contains(&event.id) {
            Admission::Duplicate
        } else {
            Admission::Merged
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Events in working-set order (most recent arrival first).
    pub fn iter(&self) -> impl Iterator<Item = &VisitEvent> + '_ {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(id: &str) -> VisitEvent {
        VisitEvent::new(id, "u1", "Acme", "/", Utc::now())
    }

    #[test]
    fn test_load_keeps_order_and_drops_invalid() {
        let mut nameless = event("e3");
        nameless.company_name = None;
        let set = WorkingSet::load(
            "u1",
            vec![event("e1"), event("e2"), nameless, event("e1")],
        );
        let ids: Vec<_> = set.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[test]
    fn test_insert_prepends() {
        let mut set = WorkingSet::load("u1", vec![event("e1"), event("e2")]);
        assert_eq!(set.insert(event("e3")), Admission::Merged);
        let ids: Vec<_> = set.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e3", "e1", "e2"]);
        assert!(set.contains("e3"));
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let mut set = WorkingSet::new("u1");
        assert_eq!(set.insert(event("e1")), Admission::Merged);
        assert_eq!(set.insert(event("e1")), Admission::Duplicate);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_rejects_foreign_and_nameless() {
        let mut set = WorkingSet::new("u1");
        let foreign = VisitEvent::new("e1", "u2", "Acme", "/", Utc::now());
        assert_eq!(set.insert(foreign), Admission::ForeignOwner);

        let mut nameless = event("e2");
        nameless.company_name = Some(String::new());
        assert_eq!(set.insert(nameless), Admission::MissingCompany);
        assert!(set.is_empty());
        assert_eq!(set.owner(), "u1");
    }
}
