use crate::client::{Api, Reply};
use crate::debug::DebugLevel;
use crate::error::CourierError;
use crate::timeout::TimeoutOverride;
use crate::transport::Transport;
use crate::value::Value;
use core::future::IntoFuture;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// One call of an interface method, with per-call overrides. Await it to
/// run the call.
pub struct PendingCall<'a, T: Transport> {
    api: &'a Api<T>,
    method: String,
    args: Vec<Value>,
    debug_level: Option<DebugLevel>,
    timeout_override: TimeoutOverride,
}

impl<'a, T: Transport> PendingCall<'a, T> {
    #[inline]
    pub(crate) fn new(api: &'a Api<T>, method: &str, args: Vec<Value>) -> Self {
        Self {
            api,
            method: method.to_string(),
            args,
            debug_level: None,
            timeout_override: TimeoutOverride::Inherit,
        }
    }

    #[inline]
    pub fn debug_level(mut self, level: DebugLevel) -> Self {
        self.debug_level = Some(level);
        self
    }

    #[inline]
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout_override = TimeoutOverride::Set(d);
        self
    }

    #[inline]
    pub fn clear_timeout(mut self) -> Self {
        self.timeout_override = TimeoutOverride::Clear;
        self
    }

    #[inline]
    pub fn inherit_timeout(mut self) -> Self {
        self.timeout_override = TimeoutOverride::Inherit;
        self
    }

    pub async fn send(self) -> Result<Reply, CourierError> {
        self.api
            .dispatch(
                &self.method,
                self.args,
                self.debug_level,
                self.timeout_override,
            )
            .await
    }
}

impl<'a, T: Transport> IntoFuture for PendingCall<'a, T> {
    type Output = Result<Reply, CourierError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.send())
    }
}
