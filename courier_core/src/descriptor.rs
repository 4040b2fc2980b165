//! Declarative interface descriptions.
//!
//! An [`InterfaceDescriptor`] is the data a client needs to turn a method
//! name plus positional arguments into a request. Descriptors are plain
//! values; templates are compiled and filters resolved when the interface
//! is registered with a client.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::callback::CallbackKind;
use crate::codec::Codecs;
use crate::draft::RequestDraft;
use crate::error::CourierError;
use crate::interceptor::InterceptorSpec;
use crate::retry::Retryer;
use crate::scope::Variables;
use crate::value::Value;

/// Request location an argument is bound to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    Query,
    Header,
    Body,
    /// Resolved from the request verb at synthesis time.
    Unknown,
}

impl Target {
    #[inline]
    pub fn or_default(self, default: Target) -> Target {
        match self {
            Target::Unknown => default,
            t => t,
        }
    }
}

/// Declared shape of a parameter; drives default-value conversion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    Text,
    Collection,
    Array,
    Map,
    Object,
    Bytes,
    Callback(CallbackKind),
}

/// Raw textual default, converted to the parameter's kind on first use.
#[derive(Clone, Debug)]
pub struct DefaultValue {
    raw: String,
    converted: OnceLock<Value>,
}

impl DefaultValue {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            converted: OnceLock::new(),
        }
    }

    #[inline]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn value(&self, kind: ParamKind, codecs: &Codecs) -> Result<Value, CourierError> {
        if let Some(v) = self.converted.get() {
            return Ok(v.clone());
        }
        let v = match kind {
            ParamKind::Text => Value::Text(self.raw.clone()),
            ParamKind::Bytes => Value::bytes(self.raw.clone().into_bytes()),
            // numbers and booleans parse as JSON; anything else stays text
            ParamKind::Scalar => codecs
                .json
                .decode(&self.raw, kind)
                .ok()
                .filter(Value::is_scalar)
                .unwrap_or_else(|| Value::Text(self.raw.clone())),
            ParamKind::Collection | ParamKind::Array | ParamKind::Map | ParamKind::Object => codecs
                .json
                .decode(&self.raw, kind)
                .map_err(CourierError::ValueEncoding)?,
            ParamKind::Callback(_) => {
                return Err(CourierError::InvalidDescriptor(
                    "callback parameters cannot declare a default".into(),
                ));
            }
        };
        Ok(self.converted.get_or_init(|| v).clone())
    }
}

#[derive(Clone, Debug)]
pub struct ParameterDescriptor {
    pub(crate) index: usize,
    pub(crate) kind: ParamKind,
    /// `None` for template-only variables and callbacks.
    pub(crate) target: Option<Target>,
    pub(crate) name: Option<String>,
    pub(crate) default_value: Option<DefaultValue>,
    pub(crate) filters: Vec<String>,
    pub(crate) url_encode: bool,
    pub(crate) charset: Option<String>,
    pub(crate) part_content_type: Option<String>,
}

impl ParameterDescriptor {
    fn new(index: usize, target: Option<Target>) -> Self {
        Self {
            index,
            kind: ParamKind::Scalar,
            target,
            name: None,
            default_value: None,
            filters: Vec::new(),
            url_encode: true,
            charset: None,
            part_content_type: None,
        }
    }

    pub fn query(index: usize) -> Self {
        Self::new(index, Some(Target::Query))
    }

    pub fn header(index: usize) -> Self {
        Self::new(index, Some(Target::Header))
    }

    pub fn body(index: usize) -> Self {
        Self::new(index, Some(Target::Body))
    }

    /// Target decided by the request verb.
    pub fn data(index: usize) -> Self {
        Self::new(index, Some(Target::Unknown))
    }

    /// Template variable only; not bound to a request location.
    pub fn variable(index: usize, name: impl Into<String>) -> Self {
        Self::new(index, None).name(name)
    }

    pub fn callback(index: usize, kind: CallbackKind) -> Self {
        let mut p = Self::new(index, None);
        p.kind = ParamKind::Callback(kind);
        p
    }

    #[inline]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[inline]
    pub fn kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }

    #[inline]
    pub fn default_value(mut self, raw: impl Into<String>) -> Self {
        self.default_value = Some(DefaultValue::new(raw));
        self
    }

    #[inline]
    pub fn filter(mut self, name: impl Into<String>) -> Self {
        self.filters.push(name.into());
        self
    }

    #[inline]
    pub fn url_encode(mut self, enabled: bool) -> Self {
        self.url_encode = enabled;
        self
    }

    #[inline]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    #[inline]
    pub fn part_content_type(mut self, ct: impl Into<String>) -> Self {
        self.part_content_type = Some(ct.into());
        self
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn target(&self) -> Option<Target> {
        self.target
    }
}

/// Multipart part taken from one argument.
#[derive(Clone, Debug)]
pub struct MultipartDescriptor {
    pub(crate) index: usize,
    pub(crate) name: String,
    pub(crate) file_name: Option<String>,
    pub(crate) content_type: Option<String>,
}

impl MultipartDescriptor {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            file_name: None,
            content_type: None,
        }
    }

    /// File name template, may reference variables.
    #[inline]
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    #[inline]
    pub fn content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = Some(ct.into());
        self
    }
}

/// What a call produces.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Returns {
    /// Execute and return the response.
    #[default]
    Response,
    /// Return the synthesized request without executing it.
    Draft,
}

/// Expected response body format.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DataType {
    #[default]
    Auto,
    Text,
    Json,
    Xml,
    Binary,
}

impl DataType {
    pub fn parse(s: &str) -> Result<DataType, CourierError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(DataType::Auto),
            "text" => Ok(DataType::Text),
            "json" => Ok(DataType::Json),
            "xml" => Ok(DataType::Xml),
            "binary" => Ok(DataType::Binary),
            _ => Err(CourierError::UnsupportedDataType(s.to_string())),
        }
    }
}

pub type RetryerFactory = Arc<dyn Fn(&RequestDraft) -> Box<dyn Retryer> + Send + Sync>;

/// Request settings shared by the interface level and the method level.
/// The method level wins, blank values fall through.
#[derive(Clone, Default)]
pub(crate) struct RequestDefaults {
    pub(crate) headers: Vec<String>,
    pub(crate) content_type: Option<String>,
    pub(crate) content_encoding: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) charset: Option<String>,
    pub(crate) ssl_protocol: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_count: Option<u32>,
    pub(crate) max_retry_interval: Option<Duration>,
    pub(crate) retryer: Option<RetryerFactory>,
    pub(crate) interceptors: Vec<InterceptorSpec>,
}

macro_rules! request_defaults_setters {
    () => {
        /// Header template of the form `Name: value`.
        #[inline]
        pub fn header(mut self, template: impl Into<String>) -> Self {
            self.defaults.headers.push(template.into());
            self
        }

        #[inline]
        pub fn content_type(mut self, ct: impl Into<String>) -> Self {
            self.defaults.content_type = Some(ct.into());
            self
        }

        #[inline]
        pub fn content_encoding(mut self, enc: impl Into<String>) -> Self {
            self.defaults.content_encoding = Some(enc.into());
            self
        }

        #[inline]
        pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
            self.defaults.user_agent = Some(ua.into());
            self
        }

        #[inline]
        pub fn charset(mut self, charset: impl Into<String>) -> Self {
            self.defaults.charset = Some(charset.into());
            self
        }

        #[inline]
        pub fn ssl_protocol(mut self, protocol: impl Into<String>) -> Self {
            self.defaults.ssl_protocol = Some(protocol.into());
            self
        }

        #[inline]
        pub fn timeout(mut self, timeout: Duration) -> Self {
            self.defaults.timeout = Some(timeout);
            self
        }

        #[inline]
        pub fn retry_count(mut self, n: u32) -> Self {
            self.defaults.retry_count = Some(n);
            self
        }

        #[inline]
        pub fn max_retry_interval(mut self, d: Duration) -> Self {
            self.defaults.max_retry_interval = Some(d);
            self
        }

        pub fn retryer<F>(mut self, factory: F) -> Self
        where
            F: Fn(&RequestDraft) -> Box<dyn Retryer> + Send + Sync + 'static,
        {
            self.defaults.retryer = Some(Arc::new(factory));
            self
        }

        #[inline]
        pub fn interceptor(mut self, spec: InterceptorSpec) -> Self {
            self.defaults.interceptors.push(spec);
            self
        }
    };
}

/// One interface method.
#[derive(Clone)]
pub struct MethodDescriptor {
    pub(crate) name: String,
    pub(crate) verb: Option<String>,
    pub(crate) url: String,
    pub(crate) body: Vec<String>,
    pub(crate) data_type: Option<String>,
    pub(crate) params: Vec<ParameterDescriptor>,
    pub(crate) multiparts: Vec<MultipartDescriptor>,
    pub(crate) returns: Returns,
    pub(crate) async_mode: bool,
    pub(crate) progress_step: Option<u64>,
    pub(crate) defaults: RequestDefaults,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verb: None,
            url: String::new(),
            body: Vec::new(),
            data_type: None,
            params: Vec::new(),
            multiparts: Vec::new(),
            returns: Returns::Response,
            async_mode: false,
            progress_step: None,
            defaults: RequestDefaults::default(),
        }
    }

    #[inline]
    pub fn url(mut self, template: impl Into<String>) -> Self {
        self.url = template.into();
        self
    }

    /// Verb template; when absent the verb is inferred from the method name.
    #[inline]
    pub fn verb(mut self, template: impl Into<String>) -> Self {
        self.verb = Some(template.into());
        self
    }

    #[inline]
    pub fn get(self, url: impl Into<String>) -> Self {
        self.verb("GET").url(url)
    }

    #[inline]
    pub fn post(self, url: impl Into<String>) -> Self {
        self.verb("POST").url(url)
    }

    #[inline]
    pub fn put(self, url: impl Into<String>) -> Self {
        self.verb("PUT").url(url)
    }

    #[inline]
    pub fn delete(self, url: impl Into<String>) -> Self {
        self.verb("DELETE").url(url)
    }

    /// Fixed body template, e.g. `a=${x}&b=2` or a JSON document.
    #[inline]
    pub fn body(mut self, template: impl Into<String>) -> Self {
        self.body.push(template.into());
        self
    }

    #[inline]
    pub fn data_type(mut self, template: impl Into<String>) -> Self {
        self.data_type = Some(template.into());
        self
    }

    #[inline]
    pub fn param(mut self, p: ParameterDescriptor) -> Self {
        self.params.push(p);
        self
    }

    #[inline]
    pub fn multipart(mut self, m: MultipartDescriptor) -> Self {
        self.multiparts.push(m);
        self
    }

    #[inline]
    pub fn returns(mut self, r: Returns) -> Self {
        self.returns = r;
        self
    }

    #[inline]
    pub fn async_mode(mut self, enabled: bool) -> Self {
        self.async_mode = enabled;
        self
    }

    #[inline]
    pub fn progress_step(mut self, bytes: u64) -> Self {
        self.progress_step = Some(bytes);
        self
    }

    request_defaults_setters!();

    #[inline]
    pub fn method_name(&self) -> &str {
        &self.name
    }

    /// Number of positional arguments the method reads.
    pub fn arity(&self) -> usize {
        self.params
            .iter()
            .map(|p| p.index + 1)
            .chain(self.multiparts.iter().map(|m| m.index + 1))
            .max()
            .unwrap_or(0)
    }
}

/// Interface-level description: base URL, shared variables, shared
/// headers and interceptors, and the methods.
#[derive(Clone)]
pub struct InterfaceDescriptor {
    pub(crate) name: String,
    pub(crate) base_url: Option<String>,
    pub(crate) variables: Variables,
    pub(crate) methods: Vec<MethodDescriptor>,
    pub(crate) defaults: RequestDefaults,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            variables: Variables::new(),
            methods: Vec::new(),
            defaults: RequestDefaults::default(),
        }
    }

    #[inline]
    pub fn base_url(mut self, template: impl Into<String>) -> Self {
        self.base_url = Some(template.into());
        self
    }

    #[inline]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name, value);
        self
    }

    #[inline]
    pub fn method(mut self, m: MethodDescriptor) -> Self {
        self.methods.push(m);
        self
    }

    request_defaults_setters!();

    #[inline]
    pub fn interface_name(&self) -> &str {
        &self.name
    }
}
