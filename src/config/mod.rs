mod folder;
mod loader;
mod settings;

pub use folder::{is_folder_config, load_folder_overrides, FolderOverrides, FOLDER_CONFIG_FILES};
pub use loader::{load_config, ColrunConfig, LoadedConfig, CONFIG_FILE_NAME};
pub use settings::{RunSettings, SettingsBuilder, DEFAULT_LOG_DIR, DEFAULT_TIMEOUT_SECS};
