pub mod command;
pub mod info;
pub mod job;
pub mod progress;
pub mod wrap;
