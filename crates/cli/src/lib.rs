pub mod cli;
pub mod priority;
pub mod signals;
