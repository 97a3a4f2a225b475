pub mod recurrence;
pub mod resolver;
pub mod schedule;

pub use schedule::ScheduleService;
