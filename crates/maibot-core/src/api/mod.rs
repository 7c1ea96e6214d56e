//! Construction of the [`Launcher`](crate::Launcher) facade.

mod builder;

pub use builder::LauncherBuilder;
