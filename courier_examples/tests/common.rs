#![allow(dead_code)]

use courier_core::prelude::*;
pub use courier_test_support::*;

pub const BASE_URL: &str = "http://localhost:8080";

pub fn settings() -> SettingsBuilder {
    Settings::builder().variable("base_url", BASE_URL)
}

pub fn courier(transport: MockTransport) -> Courier<MockTransport> {
    Courier::with_transport(settings().build(), transport)
}

/// Calls `method` and waits for the response, spawned or not.
pub async fn send(
    api: &Api<MockTransport>,
    method: &str,
    args: Vec<Value>,
) -> Result<Option<Response>, CourierError> {
    api.call(method, args).await?.wait().await
}

pub fn ok() -> MockReply {
    MockReply::ok_text("ok")
}
