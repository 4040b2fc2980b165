mod common;
use common::*;

use courier_core::args;
use courier_core::prelude::*;
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

/// One interceptor type per `N`, all writing to the same log.
struct Tag<const N: usize> {
    log: Log,
}

impl<const N: usize> Interceptor for Tag<N> {
    fn before_execute(&self, _draft: &mut RequestDraft) -> Result<Flow, CourierError> {
        self.log.lock().unwrap().push(format!("before:{N}"));
        Ok(Flow::Continue)
    }

    fn after_execute(&self, _draft: &RequestDraft, response: &Response) -> Result<(), CourierError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("after:{N}:{}", response.status.as_u16()));
        Ok(())
    }

    fn on_success(&self, _draft: &RequestDraft, _response: &Response) {
        self.log.lock().unwrap().push(format!("success:{N}"));
    }

    fn on_error(&self, _draft: &RequestDraft, _error: &CourierError) {
        self.log.lock().unwrap().push(format!("error:{N}"));
    }
}

fn tagged_api(transport: MockTransport, log: &Log) -> Api<MockTransport> {
    let settings = settings()
        .interceptor(InterceptorSpec::registered::<Tag<0>>())
        .build();
    let courier = Courier::with_transport(settings, transport);
    courier.register_interceptor(Tag::<0> { log: log.clone() });
    courier.register_interceptor(Tag::<1> { log: log.clone() });
    courier.register_interceptor(Tag::<2> { log: log.clone() });
    let desc = InterfaceDescriptor::new("Tagged")
        .base_url("${base_url}")
        .interceptor(InterceptorSpec::registered::<Tag<1>>())
        .method(
            MethodDescriptor::new("getThing")
                .url("/thing")
                .interceptor(InterceptorSpec::registered::<Tag<2>>()),
        );
    courier.register(&desc).unwrap()
}

#[tokio::test]
async fn hooks_run_global_then_interface_then_method() {
    let log = Log::default();
    let (transport, _handle) = mock().reply(ok()).build();
    let api = tagged_api(transport, &log);

    send(&api, "getThing", args![]).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "before:0", "before:1", "before:2", "after:0:200", "after:1:200", "after:2:200",
            "success:0", "success:1", "success:2",
        ]
    );
}

#[tokio::test]
async fn error_statuses_reach_on_error() {
    let log = Log::default();
    let (transport, _handle) = mock()
        .reply(MockReply::status(http::StatusCode::INTERNAL_SERVER_ERROR))
        .build();
    let api = tagged_api(transport, &log);

    let err = send(&api, "getThing", args![]).await.unwrap_err();
    assert_eq!(err.status(), Some(http::StatusCode::INTERNAL_SERVER_ERROR));
    let log = log.lock().unwrap();
    assert!(log.contains(&"after:2:500".to_string()));
    assert_eq!(&log[log.len() - 3..], &["error:0", "error:1", "error:2"]);
}

#[derive(Default)]
struct Gate;

impl Interceptor for Gate {
    fn before_execute(&self, _draft: &mut RequestDraft) -> Result<Flow, CourierError> {
        Ok(Flow::Abort)
    }
}

#[tokio::test]
async fn abort_skips_the_transport() {
    let (transport, handle) = mock().build();
    let desc = InterfaceDescriptor::new("Gated").method(
        MethodDescriptor::new("getThing")
            .url("http://localhost/thing")
            .interceptor(InterceptorSpec::of::<Gate>()),
    );
    let api = courier(transport).register(&desc).unwrap();

    let reply = api.call("getThing", args![]).await.unwrap();
    assert!(matches!(reply, Reply::Value(None)));
    handle.assert_recorded_len(0);
}

#[derive(Default)]
struct Stamp;

impl Interceptor for Stamp {
    fn on_invoke(&self, draft: &mut RequestDraft, args: &[Value]) -> Result<(), CourierError> {
        draft.add_header("X-Arg-Count", args.len());
        Ok(())
    }

    fn before_execute(&self, draft: &mut RequestDraft) -> Result<Flow, CourierError> {
        draft.add_query("stamped", true);
        Ok(Flow::Continue)
    }
}

#[tokio::test]
async fn hooks_may_amend_the_draft() {
    let (transport, handle) = mock().reply(ok()).build();
    let desc = InterfaceDescriptor::new("Stamped").method(
        MethodDescriptor::new("getThing")
            .url("http://localhost/thing")
            .param(ParameterDescriptor::query(0).name("q"))
            .interceptor(InterceptorSpec::of::<Stamp>()),
    );
    let api = courier(transport).register(&desc).unwrap();

    send(&api, "getThing", args!["x"]).await.unwrap();

    assert_request(&handle.recorded()[0])
        .header("x-arg-count", "1")
        .query_has("q", "x")
        .query_has("stamped", "true");
}

#[derive(Default)]
struct Reject;

impl Interceptor for Reject {
    fn after_execute(&self, _draft: &RequestDraft, _response: &Response) -> Result<(), CourierError> {
        Err(CourierError::interceptor(self.name(), "response rejected"))
    }
}

#[tokio::test]
async fn interceptor_errors_propagate_and_are_not_retried() {
    let (transport, handle) = mock().reply(ok()).build();
    let desc = InterfaceDescriptor::new("Strict").method(
        MethodDescriptor::new("getThing")
            .url("http://localhost/thing")
            .retry_count(3)
            .interceptor(InterceptorSpec::of::<Reject>()),
    );
    let api = courier(transport).register(&desc).unwrap();

    let err = send(&api, "getThing", args![]).await.unwrap_err();
    assert!(matches!(err.root(), CourierError::Interceptor { .. }), "{err:?}");
    handle.assert_recorded_len(1);
}

#[derive(Default)]
struct Counter {
    calls: Mutex<u32>,
}

impl Interceptor for Counter {
    fn before_execute(&self, _draft: &mut RequestDraft) -> Result<Flow, CourierError> {
        *self.calls.lock().unwrap() += 1;
        Ok(Flow::Continue)
    }
}

#[tokio::test]
async fn one_instance_per_interceptor_type() {
    let (transport, _handle) = mock().replies([ok(), ok()]).build();
    let courier = courier(transport);
    let a = InterfaceDescriptor::new("A").method(
        MethodDescriptor::new("getA")
            .url("http://localhost/a")
            .interceptor(InterceptorSpec::of::<Counter>()),
    );
    let b = InterfaceDescriptor::new("B")
        .interceptor(InterceptorSpec::of::<Counter>())
        .method(MethodDescriptor::new("getB").url("http://localhost/b"));
    let api_a = courier.register(&a).unwrap();
    let api_b = courier.register(&b).unwrap();

    send(&api_a, "getA", args![]).await.unwrap();
    send(&api_b, "getB", args![]).await.unwrap();

    let counter = courier.interceptor::<Counter>().unwrap();
    assert_eq!(*counter.calls.lock().unwrap(), 2);
}

#[derive(Default)]
struct NeedsSetup;
impl Interceptor for NeedsSetup {}

#[tokio::test]
async fn registered_interceptors_need_an_instance() {
    let (transport, _handle) = mock().build();
    let desc = InterfaceDescriptor::new("Setup").method(
        MethodDescriptor::new("getThing")
            .url("http://localhost/thing")
            .interceptor(InterceptorSpec::registered::<NeedsSetup>()),
    );
    let Err(err) = courier(transport).register(&desc) else {
        panic!("registered without an instance");
    };
    assert!(matches!(err.root(), CourierError::InvalidDescriptor(_)), "{err:?}");
}
