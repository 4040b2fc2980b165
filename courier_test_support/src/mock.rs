use bytes::Bytes;
use courier_core::transport::*;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Every request the mock saw, as the transport received it.
pub type RecordedRequest = BuiltRequest;

#[derive(Clone, Debug)]
pub struct MockReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Deliver the body in chunks of this size.
    pub chunk_size: Option<usize>,
}

impl MockReply {
    fn with_type(status: StatusCode, content_type: &'static str, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(content_type),
        );
        Self {
            status,
            headers,
            body,
            chunk_size: None,
        }
    }

    pub fn ok_json(body: Bytes) -> Self {
        Self::with_type(StatusCode::OK, "application/json", body)
    }

    pub fn ok_text(body: impl Into<Bytes>) -> Self {
        Self::with_type(StatusCode::OK, "text/plain", body.into())
    }

    pub fn ok_bytes(body: impl Into<Bytes>) -> Self {
        Self::with_type(StatusCode::OK, "application/octet-stream", body.into())
    }

    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            chunk_size: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn chunked(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }
}

#[derive(Clone, Debug)]
enum Scripted {
    Reply(MockReply),
    Fail(TransportErrorKind, String),
}

struct ChunkedBody {
    chunks: VecDeque<Bytes>,
}

impl ChunkedBody {
    fn new(body: Bytes, chunk_size: Option<usize>) -> Self {
        let mut chunks = VecDeque::new();
        match chunk_size {
            Some(n) => {
                let mut rest = body;
                while !rest.is_empty() {
                    let at = n.min(rest.len());
                    chunks.push_back(rest.split_to(at));
                }
            }
            None if !body.is_empty() => chunks.push_back(body),
            None => {}
        }
        Self { chunks }
    }
}

impl TransportBody for ChunkedBody {
    fn next_chunk<'a>(
        &'a mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Bytes>, TransportError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.chunks.pop_front()) })
    }
}

#[derive(Debug)]
struct MockState {
    recorded: Mutex<Vec<RecordedRequest>>,
    script: Mutex<VecDeque<Scripted>>,
}

#[derive(Clone)]
pub struct MockTransport {
    st: Arc<MockState>,
}

pub struct MockHandle {
    st: Arc<MockState>,
    finished: bool,
}

#[derive(Default)]
pub struct MockBuilder {
    script: Vec<Scripted>,
}

impl MockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, r: MockReply) -> Self {
        self.script.push(Scripted::Reply(r));
        self
    }

    pub fn replies(mut self, rs: impl IntoIterator<Item = MockReply>) -> Self {
        self.script.extend(rs.into_iter().map(Scripted::Reply));
        self
    }

    /// Next send fails with a connect error.
    pub fn fail(self, msg: impl Into<String>) -> Self {
        self.fail_with(TransportErrorKind::Connect, msg)
    }

    pub fn fail_with(mut self, kind: TransportErrorKind, msg: impl Into<String>) -> Self {
        self.script.push(Scripted::Fail(kind, msg.into()));
        self
    }

    pub fn build(self) -> (MockTransport, MockHandle) {
        let st = Arc::new(MockState {
            recorded: Mutex::new(Vec::new()),
            script: Mutex::new(self.script.into_iter().collect()),
        });
        (
            MockTransport { st: st.clone() },
            MockHandle {
                st,
                finished: false,
            },
        )
    }
}

pub fn mock() -> MockBuilder {
    MockBuilder::new()
}

impl MockHandle {
    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.st.recorded.lock().unwrap().clone()
    }

    pub fn recorded_len(&self) -> usize {
        self.st.recorded.lock().unwrap().len()
    }

    pub fn assert_recorded_len(&self, expected: usize) {
        let got = self.recorded_len();
        if got != expected {
            let reqs = self.recorded();
            panic!(
                "recorded request count mismatch\n  expected: {expected}\n  got: {got}\n  recorded:\n{:#?}",
                reqs
            );
        }
    }

    pub fn remaining_replies(&self) -> usize {
        self.st.script.lock().unwrap().len()
    }

    pub fn assert_no_remaining_replies(&self) {
        let left = self.remaining_replies();
        if left != 0 {
            panic!("mock replies not fully consumed: remaining={left}");
        }
    }

    pub fn finish(mut self) {
        self.assert_no_remaining_replies();
        self.finished = true;
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            return;
        }
        let left = self.st.script.lock().unwrap().len();
        if left != 0 {
            panic!("mock replies not fully consumed (drop): remaining={left}");
        }
    }
}

impl Transport for MockTransport {
    fn send<'a>(
        &'a self,
        req: &'a BuiltRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            self.st.recorded.lock().unwrap().push(req.clone());

            let next = self.st.script.lock().unwrap().pop_front();
            let reply = match next {
                Some(Scripted::Reply(r)) => r,
                Some(Scripted::Fail(kind, msg)) => {
                    return Err(match kind {
                        TransportErrorKind::Timeout => TransportError::timeout(msg),
                        TransportErrorKind::Connect => TransportError::connect(msg),
                        _ => TransportError::message(msg),
                    });
                }
                None => panic!(
                    "MockTransport: no more scripted replies, but send() was called.\nlast_request={:#?}",
                    req
                ),
            };

            Ok(TransportResponse {
                status: reply.status,
                headers: reply.headers,
                content_length: Some(reply.body.len() as u64),
                body: Box::new(ChunkedBody::new(reply.body, reply.chunk_size)),
            })
        })
    }
}
