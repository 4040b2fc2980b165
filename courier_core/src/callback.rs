use std::fmt;
use std::sync::Arc;

use crate::draft::RequestDraft;
use crate::error::CourierError;
use crate::response::Response;

pub const DEFAULT_PROGRESS_STEP: u64 = 8 * 1024;

pub type SuccessFn = dyn Fn(&Response, &RequestDraft) + Send + Sync;
pub type ErrorFn = dyn Fn(&CourierError, &RequestDraft) + Send + Sync;
pub type ProgressFn = dyn Fn(&Progress) + Send + Sync;
pub type LoadCookieFn = dyn Fn(&RequestDraft, &mut Cookies) + Send + Sync;
pub type SaveCookieFn = dyn Fn(&RequestDraft, &Cookies) + Send + Sync;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Success,
    Error,
    Progress,
    LoadCookie,
    SaveCookie,
}

/// Callback argument. Passed positionally like any other argument and
/// attached to the request instead of being bound to a target.
#[derive(Clone)]
pub enum Callback {
    Success(Arc<SuccessFn>),
    Error(Arc<ErrorFn>),
    Progress(Arc<ProgressFn>),
    LoadCookie(Arc<LoadCookieFn>),
    SaveCookie(Arc<SaveCookieFn>),
}

impl Callback {
    pub fn on_success(f: impl Fn(&Response, &RequestDraft) + Send + Sync + 'static) -> Self {
        Callback::Success(Arc::new(f))
    }

    pub fn on_error(f: impl Fn(&CourierError, &RequestDraft) + Send + Sync + 'static) -> Self {
        Callback::Error(Arc::new(f))
    }

    pub fn on_progress(f: impl Fn(&Progress) + Send + Sync + 'static) -> Self {
        Callback::Progress(Arc::new(f))
    }

    pub fn on_load_cookie(
        f: impl Fn(&RequestDraft, &mut Cookies) + Send + Sync + 'static,
    ) -> Self {
        Callback::LoadCookie(Arc::new(f))
    }

    pub fn on_save_cookie(f: impl Fn(&RequestDraft, &Cookies) + Send + Sync + 'static) -> Self {
        Callback::SaveCookie(Arc::new(f))
    }

    pub fn kind(&self) -> CallbackKind {
        match self {
            Callback::Success(_) => CallbackKind::Success,
            Callback::Error(_) => CallbackKind::Error,
            Callback::Progress(_) => CallbackKind::Progress,
            Callback::LoadCookie(_) => CallbackKind::LoadCookie,
            Callback::SaveCookie(_) => CallbackKind::SaveCookie,
        }
    }

    pub fn ptr_eq(&self, other: &Callback) -> bool {
        match (self, other) {
            (Callback::Success(a), Callback::Success(b)) => Arc::ptr_eq(a, b),
            (Callback::Error(a), Callback::Error(b)) => Arc::ptr_eq(a, b),
            (Callback::Progress(a), Callback::Progress(b)) => Arc::ptr_eq(a, b),
            (Callback::LoadCookie(a), Callback::LoadCookie(b)) => Arc::ptr_eq(a, b),
            (Callback::SaveCookie(a), Callback::SaveCookie(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback::{:?}", self.kind())
    }
}

/// Callbacks attached to one request.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) success: Option<Arc<SuccessFn>>,
    pub(crate) error: Option<Arc<ErrorFn>>,
    pub(crate) progress: Option<Arc<ProgressFn>>,
    pub(crate) load_cookie: Option<Arc<LoadCookieFn>>,
    pub(crate) save_cookie: Option<Arc<SaveCookieFn>>,
}

impl Callbacks {
    /// Later callbacks of the same kind replace earlier ones.
    pub fn attach(&mut self, cb: Callback) {
        match cb {
            Callback::Success(f) => self.success = Some(f),
            Callback::Error(f) => self.error = Some(f),
            Callback::Progress(f) => self.progress = Some(f),
            Callback::LoadCookie(f) => self.load_cookie = Some(f),
            Callback::SaveCookie(f) => self.save_cookie = Some(f),
        }
    }

    pub fn has(&self, kind: CallbackKind) -> bool {
        match kind {
            CallbackKind::Success => self.success.is_some(),
            CallbackKind::Error => self.error.is_some(),
            CallbackKind::Progress => self.progress.is_some(),
            CallbackKind::LoadCookie => self.load_cookie.is_some(),
            CallbackKind::SaveCookie => self.save_cookie.is_some(),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = [
            CallbackKind::Success,
            CallbackKind::Error,
            CallbackKind::Progress,
            CallbackKind::LoadCookie,
            CallbackKind::SaveCookie,
        ];
        f.debug_list()
            .entries(kinds.into_iter().filter(|k| self.has(*k)))
            .finish()
    }
}

/// Download progress of a response body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    pub transferred: u64,
    pub total: Option<u64>,
    pub done: bool,
}

impl Progress {
    pub fn rate(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(t) => Some(self.transferred as f64 / t as f64),
            None => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
        }
    }

    /// Parses a `Set-Cookie` header value. Attributes other than
    /// `Domain` and `Path` are ignored.
    pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let mut cookie = Cookie::new(name, value.trim());
        for attr in parts {
            let Some((k, v)) = attr.split_once('=') else {
                continue;
            };
            let k = k.trim();
            if k.eq_ignore_ascii_case("domain") {
                cookie.domain = Some(v.trim().to_string());
            } else if k.eq_ignore_ascii_case("path") {
                cookie.path = Some(v.trim().to_string());
            }
        }
        Some(cookie)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookies {
    cookies: Vec<Cookie>,
}

impl Cookies {
    pub fn add(&mut self, cookie: Cookie) {
        self.cookies.retain(|c| c.name != cookie.name);
        self.cookies.push(cookie);
    }

    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// `Cookie` request header value, `None` when empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
