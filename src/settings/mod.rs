//! User settings stored as `settings.toml` in the app root.
//!
//! Every field has a default so partial or missing files load cleanly;
//! out-of-range values are clamped by [`AppSettings::normalized`].

mod defaults;
mod errors;
mod io;
mod types;

pub use errors::ConfigError;
pub use io::{SETTINGS_FILE_NAME, load_from_path, load_or_default, save, save_to_path, settings_path};
pub use types::{AppSettings, InitMode, KnnSettings, StorageSettings, TrainingSettings};
