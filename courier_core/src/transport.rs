use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug)]
pub struct RequestMeta {
    pub interface: String,
    pub method_name: String,
    pub method: Method,
    pub attempt: u32,
}

/// Encoded request handed to the transport.
#[derive(Clone, Debug)]
pub struct BuiltRequest {
    pub meta: RequestMeta,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Protocol,
    Other,
}

#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    source: crate::error::FxError,
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for Message {}

impl TransportError {
    #[inline]
    pub fn new(e: impl Error + Send + Sync + 'static) -> Self {
        Self::with_kind(TransportErrorKind::Other, e)
    }

    #[inline]
    pub fn with_kind(kind: TransportErrorKind, e: impl Error + Send + Sync + 'static) -> Self {
        Self {
            kind,
            source: Box::new(e),
        }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::new(Message(msg.into()))
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::with_kind(TransportErrorKind::Timeout, Message(msg.into()))
    }

    pub fn connect(msg: impl Into<String>) -> Self {
        Self::with_kind(TransportErrorKind::Connect, Message(msg.into()))
    }

    #[inline]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.source)
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_request() || e.is_body() || e.is_decode() {
            TransportErrorKind::Protocol
        } else {
            TransportErrorKind::Other
        };
        Self::with_kind(kind, e)
    }
}

pub trait TransportBody: Send + 'static {
    fn next_chunk<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, TransportError>> + Send + 'a>>;
}

pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_length: Option<u64>,
    pub body: Box<dyn TransportBody>,
}

/// Injectable transport layer.
///
/// Contract:
/// - Must honor `BuiltRequest` fields (url/headers/body/timeout) as appropriate.
/// - Failures to obtain a response are `TransportError`s; these are what the
///   retryer sees. HTTP error statuses are responses, not transport errors.
pub trait Transport: Send + Sync + 'static {
    fn send<'a>(
        &'a self,
        req: &'a BuiltRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;
}

#[cfg(feature = "reqwest")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use super::*;

    #[derive(Clone, Default)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        #[inline]
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        #[inline]
        pub fn client(&self) -> &reqwest::Client {
            &self.client
        }
    }

    struct ReqwestBody {
        resp: reqwest::Response,
    }

    impl TransportBody for ReqwestBody {
        fn next_chunk<'a>(
            &'a mut self,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, TransportError>> + Send + 'a>>
        {
            Box::pin(async move { self.resp.chunk().await.map_err(TransportError::from) })
        }
    }

    impl Transport for ReqwestTransport {
        fn send<'a>(
            &'a self,
            req: &'a BuiltRequest,
        ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>
        {
            let client = self.client.clone();
            let method = req.meta.method.clone();
            let url = req.url.clone();
            let headers = req.headers.clone();
            let body = req.body.clone();
            let timeout = req.timeout;
            Box::pin(async move {
                let mut rb = client.request(method, url).headers(headers);
                if let Some(b) = body {
                    rb = rb.body(b);
                }
                if let Some(t) = timeout {
                    rb = rb.timeout(t);
                }
                let resp = rb.send().await.map_err(TransportError::from)?;
                let status = resp.status();
                let headers = resp.headers().clone();
                let content_length = resp.content_length();
                Ok(TransportResponse {
                    status,
                    headers,
                    content_length,
                    body: Box::new(ReqwestBody { resp }),
                })
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_kinds_and_messages() {
        let e = TransportError::timeout("read timed out");
        assert_eq!(e.kind(), TransportErrorKind::Timeout);
        assert_eq!(e.to_string(), "read timed out");
        assert!(e.source().is_some());
        assert_eq!(
            TransportError::message("boom").kind(),
            TransportErrorKind::Other
        );
    }
}
