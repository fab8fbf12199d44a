//! Configuration module for the profiler service.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (driver, DSN, pool size)
//! - Profiler settings (mount point, toolbar injection, disabled collectors, retention)

mod app;
mod validation;

pub use app::{
    AppConfig, DEFAULT_DSN, DEFAULT_MAX_BODY_BYTES, DatabaseConfig, DatabaseDriver,
    ProfilerConfig, ServerConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration, validate_base_path};
