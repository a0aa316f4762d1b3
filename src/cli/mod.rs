pub mod command;
pub mod extract;
pub mod info;
pub mod progress;
pub mod scan;
