pub mod handlers;
pub mod models;
pub mod recurrence;
pub mod router;
pub mod services;
pub mod storage;

pub use models::*;
pub use recurrence::{Frequency, Occurrence, RecurrenceEnd, RecurrenceExpander, RecurrenceRule};
pub use services::*;
