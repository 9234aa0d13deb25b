//! Filtering, aggregation, and export for visitor-intel.
//!
//! Every view is derived from the working set on demand: date-range
//! classification, the filter pipeline, the company roster and groups,
//! per-visitor sessions, and delimited-text export.

pub mod aggregations;
pub mod dashboard;
pub mod date_range;
pub mod export;
pub mod filter;
pub mod live;
pub mod reports;
pub mod sessions;

pub use aggregations::{CompanyAggregate, CompanyAggregator, CompanyGroup, CompanyRecord};
pub use dashboard::{CompanyDetails, Dashboard};
pub use date_range::{DateRangeClassifier, DateWindow, RangeType};
pub use export::{ExportError, TabularExporter};
pub use filter::{FilterCriteria, FilterPipeline};
pub use live::{connect, refresh_labels, SharedDashboard, SubscriptionHandle};
pub use reports::ReportGenerator;
pub use sessions::{VisitorKey, VisitorSessionGrouper, VisitorSessions};
