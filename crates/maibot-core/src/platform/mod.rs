//! Platform abstraction layer for cross-platform compatibility.
//!
//! This module centralizes all platform-specific code to make it easy to find,
//! maintain, and extend. All `#[cfg]` blocks for OS-specific behavior should
//! live in this module rather than scattered throughout the codebase.
//!
//! # Architecture
//!
//! - `paths` - Virtual environment layout, system Python, data directory
//! - `permissions` - Executable bits on extracted scripts
//! - `process` - Liveness, termination and lookup of running programs
//! - `terminal` - New console windows and the user's editor
//!
//! # Supported Platforms
//!
//! - **Windows**: Full support, including the NapCat installer
//! - **Linux**: Full support; NapCat must be installed by hand
//! - **macOS**: Launching and deployment; NapCat must be installed by hand

pub mod paths;
pub mod permissions;
pub mod process;
pub mod terminal;

pub use paths::{
    find_in_path, find_venv_python, launcher_data_dir, system_python, venv_pip, venv_python,
};
pub use permissions::set_executable;
pub use process::{
    find_processes_by_cmdline, find_processes_by_name, is_mongodb_running, is_process_alive,
    is_process_running, terminate_process, terminate_process_tree,
};
pub use terminal::{open_in_editor, open_url, TerminalCommand, TerminalKind};

/// Returns the current platform name.
pub fn current_platform() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "macos"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}
