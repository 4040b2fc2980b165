use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD as B64;
use http::{HeaderMap, StatusCode};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use thiserror::Error;

use crate::transport::TransportError;

pub type FxError = Box<dyn Error + Send + Sync>;

/// Malformed `${...}` expression, reported at compile time with the byte
/// offset of the offending character.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("template syntax error at {position} in {template:?}: {reason}")]
pub struct TemplateSyntaxError {
    pub template: String,
    pub position: usize,
    pub reason: SyntaxErrorReason,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyntaxErrorReason {
    Unterminated,
    EmptyVariableName,
    EmptyPropertyName,
    EmptyFilterName,
    UnterminatedString,
    InvalidNumber,
    UnexpectedChar(char),
}

impl fmt::Display for SyntaxErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxErrorReason::Unterminated => f.write_str("unterminated `${`"),
            SyntaxErrorReason::EmptyVariableName => f.write_str("empty variable name"),
            SyntaxErrorReason::EmptyPropertyName => f.write_str("empty property name after `.`"),
            SyntaxErrorReason::EmptyFilterName => f.write_str("empty filter name after `|`"),
            SyntaxErrorReason::UnterminatedString => f.write_str("unterminated string literal"),
            SyntaxErrorReason::InvalidNumber => f.write_str("invalid number literal"),
            SyntaxErrorReason::UnexpectedChar(c) => write!(f, "unexpected character {c:?}"),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CourierError {
    #[error(transparent)]
    TemplateSyntax(#[from] TemplateSyntaxError),

    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("argument index {index} out of range ({len} arguments)")]
    ArgumentOutOfRange { index: usize, len: usize },

    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("filter `{filter}` failed: {source}")]
    Filter { filter: String, source: FxError },

    #[error("cannot read property `{property}` of a {kind} value")]
    Property {
        property: String,
        kind: &'static str,
    },

    #[error("value encoding error: {0}")]
    ValueEncoding(FxError),

    #[error("body encoding error: {0}")]
    BodyEncoding(FxError),

    #[error("invalid parameter {index}: {reason}")]
    InvalidParam {
        index: usize,
        reason: Cow<'static, str>,
    },

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(Cow<'static, str>),

    #[error("unknown method `{method}` on interface `{interface}`")]
    UnknownMethod { interface: String, method: String },

    #[error("HTTP method `{0}` is not supported")]
    UnsupportedMethod(String),

    #[error("data type `{0}` is not supported")]
    UnsupportedDataType(String),

    #[error("request URL is empty")]
    EmptyUrl,

    #[error("build url error: {0}")]
    BuildUrl(#[from] url::ParseError),

    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        source: TransportError,
    },

    #[error("status {status}")]
    HttpStatus {
        status: StatusCode,
        headers: HeaderMap,
        body: String,
    },

    #[error("decode error: {source}")]
    Decode { source: FxError, body: String },

    #[error("interceptor {interceptor}: {source}")]
    Interceptor {
        interceptor: &'static str,
        source: FxError,
    },

    #[error("background call failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("in method {method}: {source}")]
    InMethod {
        method: String,
        source: Box<CourierError>,
    },
}

impl CourierError {
    #[inline]
    pub fn in_method(method: &str, e: CourierError) -> CourierError {
        match e {
            CourierError::InMethod { .. } => e,
            _ => CourierError::InMethod {
                method: method.to_string(),
                source: Box::new(e),
            },
        }
    }

    pub fn body_encoding(error: impl Into<FxError>) -> CourierError {
        CourierError::BodyEncoding(error.into())
    }

    pub fn value_encoding(error: impl Into<FxError>) -> CourierError {
        CourierError::ValueEncoding(error.into())
    }

    pub fn invalid_param(index: usize, reason: impl Into<Cow<'static, str>>) -> CourierError {
        CourierError::InvalidParam {
            index,
            reason: reason.into(),
        }
    }

    pub fn interceptor(interceptor: &'static str, error: impl Into<FxError>) -> CourierError {
        CourierError::Interceptor {
            interceptor,
            source: error.into(),
        }
    }

    /// Strips the `InMethod` context wrapper.
    pub fn root(&self) -> &CourierError {
        match self {
            CourierError::InMethod { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self.root() {
            CourierError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub fn body_as_text(headers: &HeaderMap, body: &bytes::Bytes, full_len: Option<usize>) -> String {
    const MAX: usize = 8 * 1024;
    let ct = headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let slice = if body.len() > MAX {
        &body[..MAX]
    } else {
        &body[..]
    };
    let total_len = full_len.unwrap_or(body.len());
    if crate::codec::Format::for_content_type(Some(ct)).is_text() {
        match std::str::from_utf8(slice) {
            Ok(s) => {
                if total_len > slice.len() {
                    format!("{}...", s)
                } else {
                    s.to_owned()
                }
            }
            Err(_) => format!("<non-utf8-text; {} bytes>", slice.len()),
        }
    } else {
        let b64 = B64.encode(slice);
        format!(
            "<non-text; {} bytes; base64:{}{}>",
            total_len,
            &b64[..b64.len().min(1024)],
            if b64.len() > 1024 { "..." } else { "" }
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn in_method_is_not_wrapped_twice() {
        let e = CourierError::in_method("getUser", CourierError::EmptyUrl);
        let e = CourierError::in_method("outer", e);
        match &e {
            CourierError::InMethod { method, .. } => assert_eq!(method, "getUser"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(e.root(), CourierError::EmptyUrl));
    }

    #[test]
    fn syntax_error_names_position_and_reason() {
        let e = TemplateSyntaxError {
            template: "/a/${id".into(),
            position: 3,
            reason: SyntaxErrorReason::Unterminated,
        };
        let msg = e.to_string();
        assert!(msg.contains("at 3"));
        assert!(msg.contains("unterminated"));
    }

    #[test]
    fn body_preview_is_base64_for_binary() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/octet-stream"),
        );
        let s = body_as_text(&headers, &bytes::Bytes::from_static(&[0, 1, 2]), None);
        assert!(s.starts_with("<non-text; 3 bytes; base64:"));
    }
}
