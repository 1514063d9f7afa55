mod settings;

pub use settings::{Settings, ENV_CONTEXT_LIMIT, ENV_POLL_INTERVAL, ENV_STATE_DIR};
