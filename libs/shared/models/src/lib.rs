pub mod appointment;
pub mod party;
pub mod schedule;

pub use appointment::*;
pub use party::*;
pub use schedule::*;
