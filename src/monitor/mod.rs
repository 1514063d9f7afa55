mod watcher;

pub use watcher::{SessionWatcher, WatchMessage};
