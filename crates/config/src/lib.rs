//! Configuration loading, validation and env substitution.
//!
//! Config files: `pagemine.toml`, `pagemine.yaml` or `pagemine.json`,
//! searched in `./` then `~/.config/pagemine/`.
//!
//! `${ENV_VAR}` and `${ENV_VAR:-fallback}` placeholders are expanded before
//! parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod template;
pub mod validate;

pub use {
    loader::{
        config_dir, discover_and_load, find_or_default_config_path, load_config, load_or_discover,
    },
    schema::{
        AttributeSpec, BrowserPoolConfig, ExtractorConfig, InstanceConfig, MetricsConfig,
        MinerConfig, OrchestratorConfig, PolicyConfig, ProxyEndpointConfig, ProxyPoolConfig,
        ProxyProtocol, RetryConfig, RotationStrategy,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate_config, validate_toml_str},
};
