pub mod attendance;
pub mod core;
pub mod setup;
pub mod timetable;
