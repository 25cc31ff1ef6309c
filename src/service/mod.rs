//! Service layer wiring configuration and logging together.

mod app;

pub use app::{AppContext, AppOptions, LevelSource};
