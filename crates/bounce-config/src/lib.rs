//! Render settings for bounce.
//!
//! Settings live in a TOML file (by default `render.toml` in the user config
//! directory) and are validated into `bounce-core` types before a render
//! starts.
//!
//! # Example
//!
//! ```rust,no_run
//! use bounce_config::RenderConfig;
//!
//! let config = RenderConfig::load_user()?;
//! config.validate()?;
//! let spec = config.sample_spec()?;
//! println!("{} Hz, {}, {}", spec.sample_rate, spec.channels, spec.bits);
//! # Ok::<(), bounce_config::ConfigError>(())
//! ```

mod error;
mod settings;

/// Platform-specific configuration paths.
pub mod paths;

pub use error::ConfigError;
pub use paths::{ensure_user_config_dir, user_config_dir, user_config_path};
pub use settings::{
    DitherSettings, IoSettings, MAX_OVERSAMPLING, MAX_SAMPLE_RATE, MeteringSettings, OutputSettings,
    ProgressSettings, RenderConfig,
};
