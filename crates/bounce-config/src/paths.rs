//! Platform-specific configuration paths.
//!
//! - **User config dir**: `~/.config/bounce/` (Linux),
//!   `~/Library/Application Support/bounce/` (macOS), `%APPDATA%\bounce\`
//!   (Windows)
//! - **Render settings**: `render.toml` inside the user config dir

use std::path::PathBuf;

/// Application name used for directory paths.
const APP_NAME: &str = "bounce";

/// File name of the render settings.
pub const RENDER_CONFIG_FILE: &str = "render.toml";

/// Returns the user-specific configuration directory.
///
/// Returns a fallback path if the config directory cannot be determined.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the path of the user's render settings file.
pub fn user_config_path() -> PathBuf {
    user_config_dir().join(RENDER_CONFIG_FILE)
}

/// Ensure the user config directory exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_user_config_dir() -> Result<PathBuf, crate::ConfigError> {
    let dir = user_config_dir();

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| crate::ConfigError::create_dir(&dir, e))?;
    }

    Ok(dir)
}
