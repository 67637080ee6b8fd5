//! Everything that talks to or about the HAProxy process

pub mod commands;
pub mod process;
pub mod runtime;
pub mod template;

pub use process::{HaproxyLauncher, Launcher};
pub use runtime::{AdminChannel, RuntimeClient, RuntimeError};
pub use template::ConfigRenderer;
