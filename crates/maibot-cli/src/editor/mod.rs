//! Local web editor for `config.toml`, served on 127.0.0.1.

mod handlers;
mod server;
mod settings;

pub use server::start_editor;
