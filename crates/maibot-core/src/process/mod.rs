//! Process management module.
//!
//! Launches the bot and its companions in their own console windows and keeps
//! track of them so they can be listed and stopped.
//!
//! # Example
//!
//! ```rust,no_run
//! use maibot_core::process::{InstanceLauncher, ProcessManager};
//! use maibot_core::ConfigStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> maibot_core::Result<()> {
//!     let store = ConfigStore::load("config.toml")?;
//!     let manager = Arc::new(ProcessManager::new(None));
//!     let launcher = InstanceLauncher::new(manager.clone());
//!
//!     if let Some(instance) = store.current() {
//!         let report = launcher.launch_full_stack(instance).await?;
//!         for (step, outcome) in &report.steps {
//!             println!("{}: {:?}", step, outcome);
//!         }
//!     }
//!
//!     manager.stop_all();
//!     Ok(())
//! }
//! ```

mod instance;
mod launcher;
mod manager;

pub use instance::{
    python_for, InstanceLauncher, LaunchDelays, LaunchReport, LaunchStep, StepOutcome,
};
pub use launcher::{LaunchConfig, LaunchResult, ProcessLauncher};
pub use manager::{ProcessInfo, ProcessManager, TrackedProcess};
