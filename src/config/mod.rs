mod settings;

pub use ctxwatch_core::config::Settings;
pub use settings::{Command, Config};
