use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::{Codecs, JsonConverter, PropertyAccessor, XmlConverter};
use crate::debug::DebugLevel;
use crate::descriptor::RetryerFactory;
use crate::draft::RequestDraft;
use crate::error::{CourierError, FxError};
use crate::filter::{Filter, FilterRegistry};
use crate::interceptor::InterceptorSpec;
use crate::retry::Retryer;
use crate::scope::Variables;
use crate::value::Value;

pub const DEFAULT_CHARSET: &str = "UTF-8";
pub const DEFAULT_DEBUG_BODY_MAX_CHARS: usize = 1024;

/// Client-wide configuration: the outermost layer of every precedence chain.
#[derive(Clone)]
pub struct Settings {
    pub(crate) variables: Variables,
    pub(crate) charset: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_count: u32,
    pub(crate) max_retry_interval: Option<Duration>,
    pub(crate) ssl_protocol: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) default_headers: Vec<(String, Value)>,
    pub(crate) default_parameters: Vec<(String, Value)>,
    pub(crate) interceptors: Vec<InterceptorSpec>,
    pub(crate) retryer: Option<RetryerFactory>,
    pub(crate) codecs: Codecs,
    pub(crate) filters: FilterRegistry,
    pub(crate) debug_level: DebugLevel,
    pub(crate) debug_body_max_chars: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            variables: Variables::new(),
            charset: DEFAULT_CHARSET.to_string(),
            timeout: None,
            retry_count: 0,
            max_retry_interval: None,
            ssl_protocol: None,
            user_agent: None,
            default_headers: Vec::new(),
            default_parameters: Vec::new(),
            interceptors: Vec::new(),
            retryer: None,
            codecs: Codecs::default(),
            filters: FilterRegistry::default(),
            debug_level: DebugLevel::None,
            debug_body_max_chars: DEFAULT_DEBUG_BODY_MAX_CHARS,
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("variables", &self.variables)
            .field("charset", &self.charset)
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("max_retry_interval", &self.max_retry_interval)
            .field("interceptors", &self.interceptors)
            .field("filters", &self.filters)
            .field("debug_level", &self.debug_level)
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    #[inline]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    #[inline]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[inline]
    pub fn codecs(&self) -> &Codecs {
        &self.codecs
    }

    #[inline]
    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    #[inline]
    pub fn debug_level(&self) -> DebugLevel {
        self.debug_level
    }
}

#[derive(Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.variables.insert(name, value);
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.settings.charset = charset.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = Some(timeout);
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.settings.retry_count = n;
        self
    }

    pub fn max_retry_interval(mut self, d: Duration) -> Self {
        self.settings.max_retry_interval = Some(d);
        self
    }

    pub fn ssl_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.settings.ssl_protocol = Some(protocol.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.settings.user_agent = Some(ua.into());
        self
    }

    /// Header added to every request that does not already carry it.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Parameter added to every request that does not already carry it.
    pub fn default_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings
            .default_parameters
            .push((name.into(), value.into()));
        self
    }

    pub fn interceptor(mut self, spec: InterceptorSpec) -> Self {
        self.settings.interceptors.push(spec);
        self
    }

    pub fn retryer<F>(mut self, factory: F) -> Self
    where
        F: Fn(&RequestDraft) -> Box<dyn Retryer> + Send + Sync + 'static,
    {
        self.settings.retryer = Some(Arc::new(factory));
        self
    }

    pub fn json_converter(mut self, c: impl JsonConverter) -> Self {
        self.settings.codecs.json = Arc::new(c);
        self
    }

    pub fn xml_converter(mut self, c: impl XmlConverter) -> Self {
        self.settings.codecs.xml = Some(Arc::new(c));
        self
    }

    pub fn property_accessor(mut self, a: impl PropertyAccessor) -> Self {
        self.settings.codecs.properties = Arc::new(a);
        self
    }

    pub fn filter(mut self, name: impl Into<String>, f: impl Filter) -> Self {
        self.settings.filters.register(name, f);
        self
    }

    pub fn debug_level(mut self, level: DebugLevel) -> Self {
        self.settings.debug_level = level;
        self
    }

    pub fn debug_body_max_chars(mut self, n: usize) -> Self {
        self.settings.debug_body_max_chars = n;
        self
    }

    /// Overlays values from a settings file; fields absent from the file
    /// are left untouched.
    pub fn file(mut self, file: SettingsFile) -> Result<Self, CourierError> {
        let s = &mut self.settings;
        for (k, v) in file.variables {
            s.variables.insert(k, Value::from_json(v));
        }
        if let Some(c) = file.charset {
            s.charset = c;
        }
        if let Some(ms) = file.timeout_ms {
            s.timeout = Some(Duration::from_millis(ms));
        }
        if let Some(n) = file.retry_count {
            s.retry_count = n;
        }
        if let Some(ms) = file.max_retry_interval_ms {
            s.max_retry_interval = Some(Duration::from_millis(ms));
        }
        if file.ssl_protocol.is_some() {
            s.ssl_protocol = file.ssl_protocol;
        }
        if file.user_agent.is_some() {
            s.user_agent = file.user_agent;
        }
        for (k, v) in file.headers {
            s.default_headers.push((k, Value::from_json(v)));
        }
        for (k, v) in file.parameters {
            s.default_parameters.push((k, Value::from_json(v)));
        }
        if let Some(level) = file.debug {
            s.debug_level = DebugLevel::parse(&level).ok_or_else(|| {
                CourierError::InvalidDescriptor(format!("unknown debug level `{level}`").into())
            })?;
        }
        Ok(self)
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

/// On-disk settings, JSON.
///
/// ```json
/// { "variables": { "host": "api.example.com" }, "timeout_ms": 3000, "retry_count": 2 }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub charset: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
    pub max_retry_interval_ms: Option<u64>,
    pub ssl_protocol: Option<String>,
    pub user_agent: Option<String>,
    pub headers: serde_json::Map<String, serde_json::Value>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub debug: Option<String>,
}

impl SettingsFile {
    pub fn from_json_str(s: &str) -> Result<Self, FxError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FxError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }
}
