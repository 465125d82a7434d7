pub mod backup;
pub mod core;
pub mod events;
pub mod grades;
pub mod import;
pub mod reports;
pub mod setup;
pub mod students;
pub mod users;
