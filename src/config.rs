//! Rail configuration.
//!
//! [`RailConfig`] is a flat record. Its data fields deserialize with serde
//! (every field has a default), and the typed hooks are attached with the
//! builder methods:
//!
//! ```
//! use handler_rail::config::{Environment, RailConfig};
//!
//! let config: RailConfig = serde_json::from_str(r#"{
//!     "performance": true,
//!     "performance_threshold_ms": 250,
//!     "patch_options": { "methods": ["get", "post"] }
//! }"#).unwrap();
//!
//! let config = config
//!     .with_environment(Environment::Production)
//!     .with_logger(|error| eprintln!("{error}"));
//!
//! assert!(config.performance);
//! assert_eq!(config.max_error_history, 10);
//! assert!(config.logger.is_some());
//! ```

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::{ContextError, ContextFactory, RequestContext};
use crate::types::{EnhancedError, RouteError};

/// Environment variable read by [`Environment::from_env`].
pub const ENVIRONMENT_VAR: &str = "APP_ENV";

/// Deployment environment; only `Production` hides error details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Reads [`ENVIRONMENT_VAR`]; anything but `production`/`test` is development.
    pub fn from_env() -> Self {
        std::env::var(ENVIRONMENT_VAR).map(|value| Self::parse(&value)).unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "test" => Self::Test,
            _ => Self::Development,
        }
    }

    #[inline]
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// A registration entry point the patcher can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registration {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    /// Every verb (`any`).
    All,
    /// Generic middleware registration.
    Use,
}

impl Registration {
    pub const ALL: [Registration; 9] = [
        Registration::Get,
        Registration::Post,
        Registration::Put,
        Registration::Patch,
        Registration::Delete,
        Registration::Head,
        Registration::Options,
        Registration::All,
        Registration::Use,
    ];
}

/// Which registrations are wrapped, and whether error handlers are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchOptions {
    pub methods: Vec<Registration>,
    pub error_handlers: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self { methods: Registration::ALL.to_vec(), error_handlers: true }
    }
}

impl PatchOptions {
    #[inline]
    pub fn wraps(&self, registration: Registration) -> bool {
        self.methods.contains(&registration)
    }
}

/// Replaces the default responder. A returned `Err` is logged and the default
/// responder is used instead.
pub type ErrorHandlerFn = Arc<dyn Fn(&EnhancedError) -> Result<Response, RouteError> + Send + Sync>;

/// Replaces the default `tracing` error log.
pub type LoggerFn = Arc<dyn Fn(&EnhancedError) + Send + Sync>;

/// Rail settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RailConfig {
    /// Log every handled failure.
    pub error_logging: bool,
    /// Record a [`PerformanceSample`](crate::metrics::PerformanceSample) per wrapped call.
    pub performance: bool,
    /// Attach recovery suggestions to enhanced errors.
    pub recovery: bool,
    pub performance_threshold_ms: u64,
    pub max_error_history: usize,
    /// Honor inbound correlation headers and echo the id on responses.
    pub correlation_id: bool,
    /// Patch routers handed to [`Rail::apply`](crate::Rail::apply) right away.
    pub auto_patch: bool,
    /// Make the rail inert in production.
    pub development_only: bool,
    /// Let the classifier search stack text too.
    pub classify_stack: bool,
    /// Redact credentials and personal data before logging or rendering.
    pub sanitize: bool,
    pub environment: Environment,
    pub patch_options: PatchOptions,
    #[serde(skip)]
    pub error_handler: Option<ErrorHandlerFn>,
    #[serde(skip)]
    pub logger: Option<LoggerFn>,
    #[serde(skip)]
    pub context_factory: Option<Arc<dyn ContextFactory>>,
}

impl Default for RailConfig {
    fn default() -> Self {
        Self {
            error_logging: true,
            performance: false,
            recovery: false,
            performance_threshold_ms: 1000,
            max_error_history: 10,
            correlation_id: true,
            auto_patch: true,
            development_only: false,
            classify_stack: false,
            sanitize: false,
            environment: Environment::from_env(),
            patch_options: PatchOptions::default(),
            error_handler: None,
            logger: None,
            context_factory: None,
        }
    }
}

/// Rejected configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed rail configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("patch_options.methods lists `{0:?}` more than once")]
    DuplicateRegistration(Registration),
    #[error("performance_threshold_ms must be greater than zero")]
    ZeroThreshold,
}

impl RailConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.performance && self.performance_threshold_ms == 0 {
            return Err(ConfigError::ZeroThreshold);
        }
        let methods = &self.patch_options.methods;
        if let Some((index, _)) =
            methods.iter().enumerate().find(|(index, method)| methods[..*index].contains(method))
        {
            return Err(ConfigError::DuplicateRegistration(methods[index]));
        }
        Ok(())
    }

    #[inline]
    pub fn performance_threshold(&self) -> Duration {
        Duration::from_millis(self.performance_threshold_ms)
    }

    /// `true` when `development_only` is set and the environment is production.
    #[inline]
    pub fn is_inert(&self) -> bool {
        self.development_only && self.environment.is_production()
    }

    pub fn with_error_logging(mut self, enabled: bool) -> Self {
        self.error_logging = enabled;
        self
    }

    pub fn with_performance(mut self, enabled: bool) -> Self {
        self.performance = enabled;
        self
    }

    pub fn with_recovery(mut self, enabled: bool) -> Self {
        self.recovery = enabled;
        self
    }

    pub fn with_performance_threshold(mut self, threshold: Duration) -> Self {
        self.performance_threshold_ms = threshold.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_error_history(mut self, max: usize) -> Self {
        self.max_error_history = max;
        self
    }

    pub fn with_correlation_id(mut self, enabled: bool) -> Self {
        self.correlation_id = enabled;
        self
    }

    pub fn with_auto_patch(mut self, enabled: bool) -> Self {
        self.auto_patch = enabled;
        self
    }

    pub fn with_development_only(mut self, enabled: bool) -> Self {
        self.development_only = enabled;
        self
    }

    pub fn with_classify_stack(mut self, enabled: bool) -> Self {
        self.classify_stack = enabled;
        self
    }

    pub fn with_sanitize(mut self, enabled: bool) -> Self {
        self.sanitize = enabled;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_patch_options(mut self, options: PatchOptions) -> Self {
        self.patch_options = options;
        self
    }

    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&EnhancedError) -> Result<Response, RouteError> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_logger<F>(mut self, logger: F) -> Self
    where
        F: Fn(&EnhancedError) + Send + Sync + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn with_context_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&http::HeaderMap, usize) -> Result<RequestContext, ContextError>
            + Send
            + Sync
            + 'static,
    {
        self.context_factory = Some(Arc::new(factory));
        self
    }
}

impl fmt::Debug for RailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RailConfig")
            .field("error_logging", &self.error_logging)
            .field("performance", &self.performance)
            .field("recovery", &self.recovery)
            .field("performance_threshold_ms", &self.performance_threshold_ms)
            .field("max_error_history", &self.max_error_history)
            .field("correlation_id", &self.correlation_id)
            .field("auto_patch", &self.auto_patch)
            .field("development_only", &self.development_only)
            .field("classify_stack", &self.classify_stack)
            .field("sanitize", &self.sanitize)
            .field("environment", &self.environment)
            .field("patch_options", &self.patch_options)
            .field("error_handler", &self.error_handler.is_some())
            .field("logger", &self.logger.is_some())
            .field("context_factory", &self.context_factory.is_some())
            .finish()
    }
}
