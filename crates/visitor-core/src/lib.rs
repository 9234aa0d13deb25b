pub mod config;
pub mod error;
pub mod feed;
pub mod source;
pub mod types;
pub mod working_set;

pub use config::AppConfig;
pub use error::VisitorError;
pub use feed::{EventFeed, UserSubscriber};
pub use source::{EventSource, LocalStore};
pub use types::{Label, VisitEvent};
pub use working_set::{Admission, WorkingSet};
