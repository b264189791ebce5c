pub mod booking;
pub mod calendar;
pub mod conflict;

pub use booking::{BookingPhase, SchedulingService};
pub use calendar::{CalendarEvent, CalendarModel, CalendarProjection, CalendarView, RescheduleRequest};
pub use conflict::ConflictDetectionService;
