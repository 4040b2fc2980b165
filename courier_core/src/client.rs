use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, SET_COOKIE};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::bound::{BoundInterface, BoundMethod};
use crate::callback::{Cookie, Cookies, Progress, ProgressFn};
use crate::codec::Format;
use crate::debug::{DebugLevel, DebugSink, TracingDebugSink};
use crate::descriptor::{InterfaceDescriptor, Returns};
use crate::draft::RequestDraft;
use crate::error::{CourierError, body_as_text};
use crate::interceptor::{Flow, Interceptor};
use crate::registry::Registry;
use crate::request::PendingCall;
use crate::response::Response;
use crate::retry::{BackoffRetryer, RetryDecision, RetryState, Retryer};
use crate::settings::Settings;
use crate::synth::Synthesizer;
use crate::timeout::TimeoutOverride;
use crate::transport::{BuiltRequest, Transport, TransportBody, TransportError, TransportResponse};
use crate::value::Value;

#[cfg(feature = "reqwest")]
use crate::transport::ReqwestTransport;

/// Outcome of one call.
pub enum Reply {
    /// The method returns its request instead of executing it.
    Draft(Box<RequestDraft>),
    /// `None` when an interceptor aborted the call.
    Value(Option<Response>),
    /// Asynchronous method running on its own task.
    Spawned(JoinHandle<Result<Option<Response>, CourierError>>),
}

impl Reply {
    pub fn into_draft(self) -> Option<RequestDraft> {
        match self {
            Reply::Draft(d) => Some(*d),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Reply::Value(r) => r,
            _ => None,
        }
    }

    /// Waits for a spawned call; other variants resolve immediately.
    pub async fn wait(self) -> Result<Option<Response>, CourierError> {
        match self {
            Reply::Draft(_) => Ok(None),
            Reply::Value(r) => Ok(r),
            Reply::Spawned(handle) => handle.await?,
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Draft(d) => f.debug_tuple("Draft").field(d).finish(),
            Reply::Value(r) => f.debug_tuple("Value").field(r).finish(),
            Reply::Spawned(_) => f.write_str("Spawned(..)"),
        }
    }
}

/// Client: settings, transport and the registries of bound interfaces,
/// interceptors and templates.
pub struct Courier<T: Transport> {
    settings: Arc<Settings>,
    transport: Arc<T>,
    registry: Arc<Registry>,
    debug_level: DebugLevel,
    debug_sink: Arc<dyn DebugSink>,
}

impl<T: Transport> Clone for Courier<T> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            transport: self.transport.clone(),
            registry: self.registry.clone(),
            debug_level: self.debug_level,
            debug_sink: self.debug_sink.clone(),
        }
    }
}

#[cfg(feature = "reqwest")]
impl Courier<ReqwestTransport> {
    pub fn new(settings: Settings) -> Self {
        Self::with_transport(settings, ReqwestTransport::default())
    }

    pub fn with_reqwest_client(settings: Settings, client: reqwest::Client) -> Self {
        Self::with_transport(settings, ReqwestTransport::new(client))
    }
}

impl<T: Transport> Courier<T> {
    pub fn with_transport(settings: Settings, transport: T) -> Self {
        Self {
            debug_level: settings.debug_level,
            settings: Arc::new(settings),
            transport: Arc::new(transport),
            registry: Arc::new(Registry::default()),
            debug_sink: Arc::new(TracingDebugSink),
        }
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[inline]
    pub fn debug_level(&self) -> DebugLevel {
        self.debug_level
    }

    #[inline]
    pub fn set_debug_level(&mut self, level: DebugLevel) {
        self.debug_level = level;
    }

    #[inline]
    pub fn with_debug_level(mut self, level: DebugLevel) -> Self {
        self.debug_level = level;
        self
    }

    #[inline]
    pub fn with_debug_sink(mut self, sink: impl DebugSink) -> Self {
        self.debug_sink = Arc::new(sink);
        self
    }

    /// Binds `desc` (once per interface name) and returns a handle for
    /// calling its methods.
    pub fn register(&self, desc: &InterfaceDescriptor) -> Result<Api<T>, CourierError> {
        let iface = self.registry.get_or_bind(desc, &self.settings)?;
        Ok(Api {
            courier: self.clone(),
            iface,
        })
    }

    /// Supplies the shared instance for an interceptor type, e.g. one that
    /// needs configuration. Must happen before interfaces using it are
    /// registered.
    pub fn register_interceptor<I: Interceptor>(&self, instance: I) -> Arc<I> {
        self.registry.interceptors.register(Arc::new(instance))
    }

    pub fn interceptor<I: Interceptor>(&self) -> Option<Arc<I>> {
        self.registry.interceptors.get::<I>()
    }

    pub(crate) async fn call_method(
        &self,
        method: &BoundMethod,
        args: Vec<Value>,
        dbg: DebugLevel,
        timeout: TimeoutOverride,
    ) -> Result<Reply, CourierError> {
        let mut draft = self.prepare_draft(method, &args)?;
        match timeout {
            TimeoutOverride::Inherit => {}
            TimeoutOverride::Clear => draft.set_timeout(None),
            TimeoutOverride::Set(d) => draft.set_timeout(Some(d)),
        }
        if method.returns == Returns::Draft {
            return Ok(Reply::Draft(Box::new(draft)));
        }
        if draft.is_async() {
            let courier = self.clone();
            let handle = tokio::spawn(async move { courier.execute_with(draft, dbg).await });
            return Ok(Reply::Spawned(handle));
        }
        self.execute_with(draft, dbg).await.map(Reply::Value)
    }

    /// Synthesis followed by the `on_invoke` hooks.
    pub(crate) fn prepare_draft(
        &self,
        method: &BoundMethod,
        args: &[Value],
    ) -> Result<RequestDraft, CourierError> {
        let mut draft = Synthesizer::new(&self.settings).synthesize(method, args)?;
        for i in draft.interceptors.clone() {
            i.on_invoke(&mut draft, args)
                .map_err(|e| CourierError::in_method(&method.name, e))?;
        }
        Ok(draft)
    }

    /// Executes a draft, e.g. one returned by a `Returns::Draft` method.
    #[inline]
    pub async fn execute(&self, draft: RequestDraft) -> Result<Option<Response>, CourierError> {
        self.execute_with(draft, self.debug_level).await
    }

    async fn execute_with(
        &self,
        mut draft: RequestDraft,
        dbg: DebugLevel,
    ) -> Result<Option<Response>, CourierError> {
        let result = self.execute_draft(&mut draft, dbg).await;
        match &result {
            Ok(Some(resp)) => {
                for i in &draft.interceptors {
                    i.on_success(&draft, resp);
                }
                if let Some(cb) = &draft.callbacks.success {
                    cb(resp, &draft);
                }
            }
            Ok(None) => {}
            Err(e) => {
                for i in &draft.interceptors {
                    i.on_error(&draft, e);
                }
                if let Some(cb) = &draft.callbacks.error {
                    cb(e, &draft);
                }
            }
        }
        result.map_err(|e| CourierError::in_method(draft.method_name(), e))
    }

    async fn execute_draft(
        &self,
        draft: &mut RequestDraft,
        dbg: DebugLevel,
    ) -> Result<Option<Response>, CourierError> {
        let interceptors = draft.interceptors.clone();
        for i in &interceptors {
            if matches!(i.before_execute(draft)?, Flow::Abort) {
                tracing::debug!(
                    interface = draft.interface(),
                    method = draft.method_name(),
                    interceptor = i.name(),
                    "call aborted before execution"
                );
                if dbg.is_verbose() {
                    let built = BuiltRequest::from_draft(draft)?;
                    self.debug_sink.aborted(dbg, &built.meta, i.name());
                }
                return Ok(None);
            }
        }

        if let Some(load) = draft.callbacks.load_cookie.clone() {
            let mut cookies = Cookies::default();
            load(draft, &mut cookies);
            if let Some(v) = cookies.header_value() {
                draft.set_header("Cookie", v);
            }
        }

        let mut built = BuiltRequest::from_draft(draft)?;
        let max_chars = self.settings.debug_body_max_chars;
        if dbg.is_very_verbose() {
            self.debug_sink.request_headers(dbg, &built.headers);
            if let Some(body) = built.body.as_ref() {
                let format = Format::for_content_type(draft.content_type());
                self.debug_sink.request_body(dbg, body, format, max_chars);
            }
        }

        let mut resp = self.send_with_retry(draft, &mut built, dbg).await?;
        let progress = draft.callbacks.progress.clone();
        let body = read_body(
            resp.body.as_mut(),
            resp.content_length,
            draft.progress_step,
            progress.as_deref(),
        )
        .await?;

        let response = Response {
            meta: built.meta,
            url: built.url,
            status: resp.status,
            headers: std::mem::take(&mut resp.headers),
            body,
            data_type: draft.data_type(),
        };
        let ok = response.is_success();
        if dbg.is_verbose() {
            self.debug_sink
                .response_status(dbg, response.status, response.url.as_str(), ok);
        }
        if dbg.is_very_verbose() {
            self.debug_sink.response_headers(dbg, &response.headers);
            let ct = response
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            self.debug_sink.response_body(
                dbg,
                &response.body,
                Format::for_content_type(ct),
                max_chars,
            );
        }

        if let Some(save) = &draft.callbacks.save_cookie {
            let mut cookies = Cookies::default();
            for v in response.headers.get_all(SET_COOKIE) {
                if let Some(c) = v.to_str().ok().and_then(Cookie::parse_set_cookie) {
                    cookies.add(c);
                }
            }
            save(draft, &cookies);
        }

        for i in &interceptors {
            i.after_execute(draft, &response)?;
        }

        if !ok {
            return Err(CourierError::HttpStatus {
                status: response.status,
                body: body_as_text(&response.headers, &response.body, Some(response.body.len())),
                headers: response.headers,
            });
        }
        Ok(Some(response))
    }

    async fn send_with_retry(
        &self,
        draft: &RequestDraft,
        built: &mut BuiltRequest,
        dbg: DebugLevel,
    ) -> Result<TransportResponse, CourierError> {
        let retryer: Box<dyn Retryer> = match &draft.retryer {
            Some(factory) => factory(draft),
            None => Box::new(BackoffRetryer::for_draft(draft)),
        };
        let mut state = RetryState::default();
        loop {
            built.meta.attempt = state.attempt;
            if dbg.is_verbose() {
                self.debug_sink
                    .request_start(dbg, &built.meta, built.url.as_str());
            }
            let err = match self.transport.send(built).await {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };
            let message = err.to_string();
            match retryer.should_retry(state.attempt, err) {
                RetryDecision::GiveUp(e) => return Err(e),
                RetryDecision::Wait(wait) => {
                    tracing::warn!(
                        interface = %built.meta.interface,
                        method = %built.meta.method_name,
                        retry = state.attempt + 1,
                        backoff_ms = wait.as_millis() as u64,
                        error = %message,
                        "transport error, retrying"
                    );
                    if dbg.is_verbose() {
                        self.debug_sink.retry(dbg, &built.meta, wait, &message);
                    }
                    tokio::time::sleep(wait).await;
                    state.record(wait);
                }
            }
        }
    }
}

/// Reads the whole body, reporting progress every `step` bytes and once
/// at the end.
async fn read_body(
    body: &mut dyn TransportBody,
    total: Option<u64>,
    step: u64,
    progress: Option<&ProgressFn>,
) -> Result<Bytes, TransportError> {
    let mut buf = BytesMut::with_capacity(total.map_or(8 * 1024, |n| n.min(1 << 20) as usize));
    let mut reported = 0u64;
    while let Some(chunk) = body.next_chunk().await? {
        buf.extend_from_slice(&chunk);
        let transferred = buf.len() as u64;
        if let Some(cb) = progress
            && step > 0
            && transferred - reported >= step
        {
            reported = transferred;
            cb(&Progress {
                transferred,
                total,
                done: false,
            });
        }
    }
    if let Some(cb) = progress {
        cb(&Progress {
            transferred: buf.len() as u64,
            total,
            done: true,
        });
    }
    Ok(buf.freeze())
}

/// A registered interface bound to its client.
pub struct Api<T: Transport> {
    courier: Courier<T>,
    iface: Arc<BoundInterface>,
}

impl<T: Transport> Clone for Api<T> {
    fn clone(&self) -> Self {
        Self {
            courier: self.courier.clone(),
            iface: self.iface.clone(),
        }
    }
}

impl<T: Transport> Api<T> {
    #[inline]
    pub fn courier(&self) -> &Courier<T> {
        &self.courier
    }

    #[inline]
    pub fn interface(&self) -> &BoundInterface {
        &self.iface
    }

    /// Calls `method`; await the returned value (or tweak it first).
    #[inline]
    pub fn call(&self, method: &str, args: Vec<Value>) -> PendingCall<'_, T> {
        PendingCall::new(self, method, args)
    }

    /// The request `method` would send, without sending it.
    pub fn prepare(&self, method: &str, args: &[Value]) -> Result<RequestDraft, CourierError> {
        let m = self.iface.method(method)?;
        self.courier.prepare_draft(m, args)
    }

    pub(crate) async fn dispatch(
        &self,
        method: &str,
        args: Vec<Value>,
        dbg: Option<DebugLevel>,
        timeout: TimeoutOverride,
    ) -> Result<Reply, CourierError> {
        let m = self.iface.method(method)?;
        let dbg = dbg.unwrap_or(self.courier.debug_level);
        self.courier.call_method(m, args, dbg, timeout).await
    }
}
