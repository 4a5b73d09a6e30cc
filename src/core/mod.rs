pub mod collector;
pub mod config;
pub mod deadline;
pub mod workspace;
