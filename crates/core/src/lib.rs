pub mod config;
pub mod error;
pub mod event;

pub use config::Config;
pub use error::RelayError;
pub use event::{Event, EventKind, PlanItem, PlanItemStatus};
