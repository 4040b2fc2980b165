use crate::codec::{self, Format};
use crate::transport::RequestMeta;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use std::time::Duration;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(u8)]
#[derive(Default)]
pub enum DebugLevel {
    #[default]
    None = 0,
    V = 1,
    VV = 2,
}

impl DebugLevel {
    #[inline]
    pub fn is_enabled(self) -> bool {
        self != DebugLevel::None
    }

    #[inline]
    pub fn is_verbose(self) -> bool {
        self >= DebugLevel::V
    }

    #[inline]
    pub fn is_very_verbose(self) -> bool {
        self >= DebugLevel::VV
    }

    pub fn parse(s: &str) -> Option<DebugLevel> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Some(DebugLevel::None),
            "v" => Some(DebugLevel::V),
            "vv" => Some(DebugLevel::VV),
            _ => None,
        }
    }
}

impl core::fmt::Display for DebugLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DebugLevel::None => f.write_str("none"),
            DebugLevel::V => f.write_str("v"),
            DebugLevel::VV => f.write_str("vv"),
        }
    }
}

/// Receives per-call diagnostics. Headers and bodies are only reported at
/// `VV`; the client checks the level before calling.
pub trait DebugSink: Send + Sync + 'static {
    fn request_start(&self, dbg: DebugLevel, meta: &RequestMeta, url: &str);
    fn request_headers(&self, dbg: DebugLevel, headers: &HeaderMap);
    fn request_body(&self, dbg: DebugLevel, body: &Bytes, format: Format, max_chars: usize);
    fn aborted(&self, dbg: DebugLevel, meta: &RequestMeta, interceptor: &'static str);
    fn retry(&self, dbg: DebugLevel, meta: &RequestMeta, wait: Duration, error: &str);

    fn response_status(&self, dbg: DebugLevel, status: StatusCode, url: &str, ok: bool);
    fn response_headers(&self, dbg: DebugLevel, headers: &HeaderMap);
    fn response_body(&self, dbg: DebugLevel, body: &Bytes, format: Format, max_chars: usize);
}

#[derive(Default)]
pub struct NoopDebugSink;
impl DebugSink for NoopDebugSink {
    #[inline]
    fn request_start(&self, _: DebugLevel, _: &RequestMeta, _: &str) {}
    #[inline]
    fn request_headers(&self, _: DebugLevel, _: &HeaderMap) {}
    #[inline]
    fn request_body(&self, _: DebugLevel, _: &Bytes, _: Format, _: usize) {}
    #[inline]
    fn aborted(&self, _: DebugLevel, _: &RequestMeta, _: &'static str) {}
    #[inline]
    fn retry(&self, _: DebugLevel, _: &RequestMeta, _: Duration, _: &str) {}
    #[inline]
    fn response_status(&self, _: DebugLevel, _: StatusCode, _: &str, _: bool) {}
    #[inline]
    fn response_headers(&self, _: DebugLevel, _: &HeaderMap) {}
    #[inline]
    fn response_body(&self, _: DebugLevel, _: &Bytes, _: Format, _: usize) {}
}

/// Plain `eprintln!` output, handy in examples and ad-hoc debugging.
pub struct StderrDebugSink;
impl DebugSink for StderrDebugSink {
    fn request_start(&self, dbg: DebugLevel, meta: &RequestMeta, url: &str) {
        if meta.attempt == 0 {
            eprintln!(
                "[courier:{}] -> {} {} ({}.{})",
                dbg, meta.method, url, meta.interface, meta.method_name
            );
        } else {
            eprintln!(
                "[courier:{}] -> {} {} ({}.{}) attempt={}",
                dbg, meta.method, url, meta.interface, meta.method_name, meta.attempt
            );
        }
    }
    fn request_headers(&self, dbg: DebugLevel, headers: &HeaderMap) {
        eprintln!("[courier:{}] request headers:", dbg);
        for (k, v) in headers.iter() {
            eprintln!("  {}: {}", k, header_value_for_debug(k, v));
        }
    }
    fn request_body(&self, dbg: DebugLevel, body: &Bytes, format: Format, max_chars: usize) {
        let preview = codec::format_bytes_for_debug(format, body.as_ref(), max_chars);
        eprintln!(
            "[courier:{}] request body ({} bytes): {}",
            dbg,
            body.len(),
            preview
        );
    }
    fn aborted(&self, dbg: DebugLevel, meta: &RequestMeta, interceptor: &'static str) {
        eprintln!(
            "[courier:{}] aborted {}.{} by {}",
            dbg, meta.interface, meta.method_name, interceptor
        );
    }
    fn retry(&self, dbg: DebugLevel, meta: &RequestMeta, wait: Duration, error: &str) {
        eprintln!(
            "[courier:{}] retry #{} of {}.{} in {:?}: {}",
            dbg,
            meta.attempt + 1,
            meta.interface,
            meta.method_name,
            wait,
            error
        );
    }

    fn response_status(&self, dbg: DebugLevel, status: StatusCode, url: &str, ok: bool) {
        let tag = if ok { "ok" } else { "error" };
        eprintln!("[courier:{}] <- {} {} ({})", dbg, status.as_u16(), url, tag);
    }
    fn response_headers(&self, dbg: DebugLevel, headers: &HeaderMap) {
        eprintln!("[courier:{}] response headers:", dbg);
        for (k, v) in headers.iter() {
            eprintln!("  {}: {}", k, header_value_for_debug(k, v));
        }
    }
    fn response_body(&self, dbg: DebugLevel, body: &Bytes, format: Format, max_chars: usize) {
        let preview = codec::format_bytes_for_debug(format, body.as_ref(), max_chars);
        eprintln!(
            "[courier:{}] response body ({} bytes): {}",
            dbg,
            body.len(),
            preview
        );
    }
}

/// Emits `tracing` events under the `courier` target. Default sink.
#[derive(Default)]
pub struct TracingDebugSink;
impl DebugSink for TracingDebugSink {
    fn request_start(&self, dbg: DebugLevel, meta: &RequestMeta, url: &str) {
        tracing::debug!(
            target: "courier",
            debug = %dbg,
            interface = %meta.interface,
            method_name = %meta.method_name,
            method = %meta.method,
            attempt = meta.attempt,
            url,
            "sending request"
        );
    }
    fn request_headers(&self, _: DebugLevel, headers: &HeaderMap) {
        for (k, v) in headers.iter() {
            tracing::trace!(target: "courier", header = %k, value = %header_value_for_debug(k, v), "request header");
        }
    }
    fn request_body(&self, _: DebugLevel, body: &Bytes, format: Format, max_chars: usize) {
        tracing::trace!(
            target: "courier",
            len = body.len(),
            body = %codec::format_bytes_for_debug(format, body.as_ref(), max_chars),
            "request body"
        );
    }
    fn aborted(&self, _: DebugLevel, meta: &RequestMeta, interceptor: &'static str) {
        tracing::debug!(
            target: "courier",
            interface = %meta.interface,
            method_name = %meta.method_name,
            interceptor,
            "request aborted by interceptor"
        );
    }
    fn retry(&self, _: DebugLevel, meta: &RequestMeta, wait: Duration, error: &str) {
        tracing::debug!(
            target: "courier",
            retry = meta.attempt + 1,
            interface = %meta.interface,
            method_name = %meta.method_name,
            backoff_ms = wait.as_millis(),
            error = %error,
            "retrying request after transport error"
        );
    }

    fn response_status(&self, _: DebugLevel, status: StatusCode, url: &str, ok: bool) {
        if ok {
            tracing::debug!(target: "courier", status = status.as_u16(), url, "response");
        } else {
            tracing::warn!(target: "courier", status = status.as_u16(), url, "error response");
        }
    }
    fn response_headers(&self, _: DebugLevel, headers: &HeaderMap) {
        for (k, v) in headers.iter() {
            tracing::trace!(target: "courier", header = %k, value = %header_value_for_debug(k, v), "response header");
        }
    }
    fn response_body(&self, _: DebugLevel, body: &Bytes, format: Format, max_chars: usize) {
        tracing::trace!(
            target: "courier",
            len = body.len(),
            body = %codec::format_bytes_for_debug(format, body.as_ref(), max_chars),
            "response body"
        );
    }
}

fn is_sensitive_header_name(name: &HeaderName) -> bool {
    // HeaderName::as_str() is normalized to lowercase.
    let n = name.as_str();
    matches!(n, "authorization" | "proxy-authorization" | "cookie" | "set-cookie")
        || n.contains("token")
        || n.contains("secret")
        || n.contains("api-key")
        || n.contains("apikey")
        || n.ends_with("-key")
}

fn header_value_for_debug(name: &HeaderName, value: &HeaderValue) -> String {
    if is_sensitive_header_name(name) {
        "<redacted>".to_string()
    } else {
        value.to_str().unwrap_or("<non-utf8>").to_string()
    }
}
