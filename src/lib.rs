pub mod config;
pub mod orchestrator;
pub mod scenario;
pub mod system;
