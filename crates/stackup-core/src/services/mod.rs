pub mod catalog;
pub mod config_loader;
pub mod database;
pub mod git;
pub mod identity;
pub mod installer;
pub mod log_tailer;
pub mod orchestrator;
pub mod prober;
pub mod state;
pub mod supervisor;
pub mod template;
