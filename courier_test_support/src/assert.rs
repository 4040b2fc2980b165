use crate::mock::RecordedRequest;
use http::header::AsHeaderName;
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::time::Duration;

pub struct RequestAssert<'a> {
    req: &'a RecordedRequest,
}

pub fn assert_request(req: &RecordedRequest) -> RequestAssert<'_> {
    RequestAssert { req }
}

impl<'a> RequestAssert<'a> {
    pub fn method(self, expected: http::Method) -> Self {
        self.check("method", &expected, &self.req.meta.method);
        self
    }

    pub fn attempt(self, expected: u32) -> Self {
        self.check("attempt", &expected, &self.req.meta.attempt);
        self
    }

    pub fn url(self, expected: &str) -> Self {
        self.check("url", &expected, &self.req.url.as_str());
        self
    }

    pub fn host(self, expected: &str) -> Self {
        self.check("host", &expected, &self.req.url.host_str().unwrap_or(""));
        self
    }

    pub fn path(self, expected: &str) -> Self {
        self.check("path", &expected, &self.req.url.path());
        self
    }

    pub fn timeout(self, expected: Option<Duration>) -> Self {
        self.check("timeout", &Shown(expected), &Shown(self.req.timeout));
        self
    }

    pub fn body_absent(self) -> Self {
        if let Some(body) = &self.req.body {
            self.fail(format_args!("expected no body, got {} bytes", body.len()));
        }
        self
    }

    pub fn body_json(self, expected: serde_json::Value) -> Self {
        let got = self
            .req
            .body
            .as_ref()
            .and_then(|b| serde_json::from_slice::<serde_json::Value>(b).ok());
        match got {
            Some(got) => self.check("json body", &expected, &got),
            None => self.fail(format_args!("expected json body {expected}, got {}", self.body_lossy())),
        }
        self
    }

    pub fn body_contains(self, needle: &str) -> Self {
        let body = self.body_lossy();
        if !body.contains(needle) {
            self.fail(format_args!("body does not contain {needle:?}\n  body: {body}"));
        }
        self
    }

    pub fn header<K: AsHeaderName + Display>(self, name: K, expected: &str) -> Self {
        let label = format!("header {name}");
        match self.req.headers.get(name).map(|v| v.to_str()) {
            Some(Ok(got)) => self.check(&label, &expected, &got),
            Some(Err(_)) => self.fail(format_args!("{label} is not visible ascii")),
            None => self.fail(format_args!("{label} missing, expected {expected:?}")),
        }
        self
    }

    pub fn header_absent<K: AsHeaderName + Display>(self, name: K) -> Self {
        let label = name.to_string();
        if let Some(got) = self.req.headers.get(name) {
            self.fail(format_args!("expected header {label} absent, got {got:?}"));
        }
        self
    }

    pub fn query_has(self, key: &str, expected: &str) -> Self {
        if !self.query_pairs().iter().any(|(k, v)| k == key && v == expected) {
            self.fail(format_args!("query pair {key}={expected} missing"));
        }
        self
    }

    /// Values for `key`, in the order they appear in the query string.
    pub fn query_values(self, key: &str, expected: &[&str]) -> Self {
        let got: Vec<String> = self
            .query_pairs()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect();
        let exp: Vec<String> = expected.iter().map(|v| v.to_string()).collect();
        self.check(&format!("query values for {key}"), &Shown(exp), &Shown(got));
        self
    }

    pub fn query_keys_exact(self, expected: &[&str]) -> Self {
        let got: BTreeSet<String> = self.query_pairs().into_iter().map(|(k, _)| k).collect();
        let exp: BTreeSet<String> = expected.iter().map(|k| k.to_string()).collect();
        self.check("query keys", &Shown(exp), &Shown(got));
        self
    }

    fn check<T: PartialEq + Display + ?Sized>(&self, what: &str, expected: &T, got: &T) {
        if expected != got {
            self.fail(format_args!("{what} mismatch\n  expected: {expected}\n  got: {got}"));
        }
    }

    fn fail(&self, msg: fmt::Arguments<'_>) -> ! {
        panic!("{msg}\n  request: {} {}", self.req.meta.method, self.req.url);
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        self.req
            .url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn body_lossy(&self) -> String {
        self.req
            .body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }
}

/// Debug formatting for values without a `Display` impl.
#[derive(PartialEq)]
struct Shown<T>(T);

impl<T: fmt::Debug> Display for Shown<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
