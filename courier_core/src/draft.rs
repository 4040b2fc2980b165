use bytes::Bytes;
use http::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::callback::Callbacks;
use crate::codec::Codecs;
use crate::descriptor::{DataType, RetryerFactory, Target};
use crate::error::CourierError;
use crate::interceptor::Interceptor;
use crate::value::Value;

/// One query parameter, header or body field. `name == None` marks a raw
/// fragment that is emitted verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct NameValueEntry {
    pub name: Option<String>,
    pub value: Value,
    pub target: Target,
    pub content_type: Option<String>,
    pub url_encode: bool,
}

impl NameValueEntry {
    pub fn named(name: impl Into<String>, value: impl Into<Value>, target: Target) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
            target,
            content_type: None,
            url_encode: true,
        }
    }

    pub fn fragment(value: impl Into<Value>, target: Target) -> Self {
        Self {
            name: None,
            value: value.into(),
            target,
            content_type: None,
            url_encode: true,
        }
    }

    #[inline]
    pub fn with_content_type(mut self, ct: Option<String>) -> Self {
        self.content_type = ct;
        self
    }

    #[inline]
    pub fn with_url_encode(mut self, enabled: bool) -> Self {
        self.url_encode = enabled;
        self
    }

    #[inline]
    pub fn is_fragment(&self) -> bool {
        self.name.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Multipart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Fully synthesized request, before transport encoding.
///
/// Produced per call, owned by that call. Interceptors may amend it in
/// `before_execute`.
#[derive(Clone)]
pub struct RequestDraft {
    pub(crate) interface: String,
    pub(crate) method_name: String,
    pub(crate) url: String,
    pub(crate) method: Method,
    pub(crate) charset: String,
    pub(crate) content_type: Option<String>,
    pub(crate) content_encoding: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) ssl_protocol: Option<String>,
    pub(crate) data_type: DataType,
    pub(crate) headers: Vec<NameValueEntry>,
    pub(crate) arguments: Vec<NameValueEntry>,
    pub(crate) multiparts: Vec<Multipart>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_count: u32,
    pub(crate) max_retry_interval: Option<Duration>,
    pub(crate) progress_step: u64,
    pub(crate) async_mode: bool,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) callbacks: Callbacks,
    pub(crate) retryer: Option<RetryerFactory>,
    pub(crate) codecs: Codecs,
}

impl RequestDraft {
    pub(crate) fn new(
        interface: &str,
        method_name: &str,
        url: String,
        method: Method,
        codecs: Codecs,
    ) -> Self {
        Self {
            interface: interface.to_string(),
            method_name: method_name.to_string(),
            url,
            method,
            charset: crate::settings::DEFAULT_CHARSET.to_string(),
            content_type: None,
            content_encoding: None,
            user_agent: None,
            ssl_protocol: None,
            data_type: DataType::Auto,
            headers: Vec::new(),
            arguments: Vec::new(),
            multiparts: Vec::new(),
            timeout: None,
            retry_count: 0,
            max_retry_interval: None,
            progress_step: crate::callback::DEFAULT_PROGRESS_STEP,
            async_mode: false,
            interceptors: Vec::new(),
            callbacks: Callbacks::default(),
            retryer: None,
            codecs,
        }
    }

    #[inline]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    #[inline]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    #[inline]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[inline]
    pub fn set_content_type(&mut self, ct: impl Into<String>) {
        self.content_type = Some(ct.into());
    }

    #[inline]
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    #[inline]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[inline]
    pub fn ssl_protocol(&self) -> Option<&str> {
        self.ssl_protocol.as_deref()
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[inline]
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[inline]
    pub fn max_retry_interval(&self) -> Option<Duration> {
        self.max_retry_interval
    }

    #[inline]
    pub fn is_async(&self) -> bool {
        self.async_mode
    }

    #[inline]
    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    #[inline]
    pub fn interceptor_count(&self) -> usize {
        self.interceptors.len()
    }

    #[inline]
    pub fn headers(&self) -> &[NameValueEntry] {
        &self.headers
    }

    #[inline]
    pub fn multiparts(&self) -> &[Multipart] {
        &self.multiparts
    }

    pub fn query(&self) -> impl Iterator<Item = &NameValueEntry> {
        self.arguments.iter().filter(|e| e.target == Target::Query)
    }

    pub fn body(&self) -> impl Iterator<Item = &NameValueEntry> {
        self.arguments.iter().filter(|e| e.target == Target::Body)
    }

    /// Adds a header. `Content-Type` and `Content-Encoding` set the
    /// corresponding request properties instead of a list entry.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if name.eq_ignore_ascii_case("content-type") {
            self.content_type = value.scalar_string();
        } else if name.eq_ignore_ascii_case("content-encoding") {
            self.content_encoding = value.scalar_string();
        } else {
            self.headers
                .push(NameValueEntry::named(name, value, Target::Header));
        }
    }

    /// Replaces every header named `name`.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        self.remove_header(&name);
        self.add_header(name, value);
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|e| {
            !e.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        });
    }

    pub fn has_header(&self, name: &str) -> bool {
        if name.eq_ignore_ascii_case("content-type") {
            return self.content_type.is_some();
        }
        if name.eq_ignore_ascii_case("content-encoding") {
            return self.content_encoding.is_some();
        }
        self.headers.iter().any(|e| {
            e.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    }

    /// First value of header `name`, stringified.
    pub fn header(&self, name: &str) -> Option<String> {
        if name.eq_ignore_ascii_case("content-type") {
            return self.content_type.clone();
        }
        self.headers
            .iter()
            .find(|e| {
                e.name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .and_then(|e| self.codecs.stringify(&e.value).ok())
    }

    pub fn add_query(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.arguments
            .push(NameValueEntry::named(name, value, Target::Query));
    }

    pub fn add_body(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.arguments
            .push(NameValueEntry::named(name, value, Target::Body));
    }

    pub(crate) fn push_entry(&mut self, entry: NameValueEntry) {
        match entry.target {
            Target::Header => match entry.name {
                Some(name) => self.add_header(name, entry.value),
                None => self.headers.push(entry),
            },
            _ => self.arguments.push(entry),
        }
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.arguments
            .iter()
            .any(|e| e.name.as_deref() == Some(name))
    }

    pub fn add_multipart(&mut self, part: Multipart) {
        self.multiparts.push(part);
    }

    pub fn attach_callback(&mut self, cb: crate::callback::Callback) {
        self.callbacks.attach(cb);
    }

    /// Stringified query pairs in order. Fragments appear with an empty name.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.pairs(self.query())
    }

    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.pairs(self.headers.iter())
    }

    pub fn body_pairs(&self) -> Vec<(String, String)> {
        self.pairs(self.body())
    }

    fn pairs<'a>(&self, it: impl Iterator<Item = &'a NameValueEntry>) -> Vec<(String, String)> {
        it.map(|e| {
            let v = self.codecs.stringify(&e.value).unwrap_or_default();
            (e.name.clone().unwrap_or_default(), v)
        })
        .collect()
    }

    pub(crate) fn stringify(&self, value: &Value) -> Result<String, CourierError> {
        self.codecs
            .stringify(value)
            .map_err(CourierError::ValueEncoding)
    }
}

impl fmt::Debug for RequestDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDraft")
            .field("interface", &self.interface)
            .field("method_name", &self.method_name)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("charset", &self.charset)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .field("arguments", &self.arguments)
            .field("multiparts", &self.multiparts.len())
            .field("timeout", &self.timeout)
            .field("retry_count", &self.retry_count)
            .field("interceptors", &self.interceptors.len())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}
