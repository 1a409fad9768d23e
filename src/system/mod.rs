pub mod monitor;
pub mod snapshot;
pub mod supervisor;
