mod common;
use common::*;

use courier_core::args;
use courier_core::prelude::*;
use http::HeaderValue;
use http::header::SET_COOKIE;
use std::sync::{Arc, Mutex};

fn api_with(method: MethodDescriptor, transport: MockTransport) -> Api<MockTransport> {
    let desc = InterfaceDescriptor::new("Hooks")
        .base_url("${base_url}")
        .method(method);
    courier(transport).register(&desc).unwrap()
}

#[tokio::test]
async fn success_and_error_callbacks() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (transport, _handle) = mock()
        .reply(ok())
        .reply(MockReply::status(http::StatusCode::BAD_REQUEST))
        .build();
    let api = api_with(
        MethodDescriptor::new("getThing")
            .url("/thing")
            .param(ParameterDescriptor::callback(0, CallbackKind::Success))
            .param(ParameterDescriptor::callback(1, CallbackKind::Error)),
        transport,
    );
    let on_ok = {
        let seen = seen.clone();
        Callback::on_success(move |resp, draft| {
            seen.lock()
                .unwrap()
                .push(format!("ok:{}:{}", draft.method_name(), resp.status.as_u16()));
        })
    };
    let on_err = {
        let seen = seen.clone();
        Callback::on_error(move |err, _draft| {
            seen.lock()
                .unwrap()
                .push(format!("err:{}", err.status().map_or(0, |s| s.as_u16())));
        })
    };

    send(&api, "getThing", args![on_ok.clone(), on_err.clone()])
        .await
        .unwrap();
    send(&api, "getThing", args![on_ok, on_err]).await.unwrap_err();

    assert_eq!(*seen.lock().unwrap(), vec!["ok:getThing:200", "err:400"]);
}

#[tokio::test]
async fn callback_arguments_are_not_sent() {
    let (transport, handle) = mock().reply(ok()).build();
    let api = api_with(
        MethodDescriptor::new("getThing")
            .url("/thing")
            .param(ParameterDescriptor::query(0).name("q"))
            .param(ParameterDescriptor::callback(1, CallbackKind::Success)),
        transport,
    );

    send(&api, "getThing", args!["x", Callback::on_success(|_, _| {})])
        .await
        .unwrap();
    assert_request(&handle.recorded()[0]).query_keys_exact(&["q"]);
}

#[tokio::test]
async fn callbacks_of_the_wrong_kind_are_rejected() {
    let (transport, handle) = mock().build();
    let api = api_with(
        MethodDescriptor::new("getThing")
            .url("/thing")
            .param(ParameterDescriptor::callback(0, CallbackKind::Success)),
        transport,
    );

    let err = send(&api, "getThing", args![Callback::on_progress(|_| {})])
        .await
        .unwrap_err();
    assert!(matches!(err.root(), CourierError::InvalidParam { index: 0, .. }), "{err:?}");
    handle.assert_recorded_len(0);
}

#[tokio::test]
async fn progress_is_reported_every_step() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (transport, _handle) = mock().reply(ok_text_chunked("0123456789", 4)).build();
    let api = api_with(
        MethodDescriptor::new("getFile")
            .url("/file")
            .progress_step(4)
            .param(ParameterDescriptor::callback(0, CallbackKind::Progress)),
        transport,
    );
    let progress = {
        let seen = seen.clone();
        Callback::on_progress(move |p| seen.lock().unwrap().push(*p))
    };

    let resp = send(&api, "getFile", args![progress]).await.unwrap().unwrap();
    assert_eq!(resp.text().unwrap(), "0123456789");

    let seen = seen.lock().unwrap();
    let steps: Vec<_> = seen.iter().map(|p| (p.transferred, p.done)).collect();
    assert_eq!(steps, vec![(4, false), (8, false), (10, true)]);
    assert!(seen.iter().all(|p| p.total == Some(10)));
    assert_eq!(seen[2].rate(), Some(1.0));
}

fn ok_text_chunked(body: &'static str, size: usize) -> MockReply {
    MockReply::ok_text(body).chunked(size)
}

#[tokio::test]
async fn cookies_are_loaded_and_saved() {
    let jar = Arc::new(Mutex::new(Cookies::default()));
    let (transport, handle) = mock()
        .reply(
            ok().with_header(
                SET_COOKIE,
                HeaderValue::from_static("session=abc; Path=/; HttpOnly"),
            )
            .with_header(SET_COOKIE, HeaderValue::from_static("theme=dark")),
        )
        .build();
    let api = api_with(
        MethodDescriptor::new("getThing")
            .url("/thing")
            .param(ParameterDescriptor::callback(0, CallbackKind::LoadCookie))
            .param(ParameterDescriptor::callback(1, CallbackKind::SaveCookie)),
        transport,
    );
    let load = Callback::on_load_cookie(|_draft, cookies| {
        cookies.add(Cookie::new("visitor", "42"));
        cookies.add(Cookie::new("lang", "en"));
    });
    let save = {
        let jar = jar.clone();
        Callback::on_save_cookie(move |_draft, cookies| {
            let mut jar = jar.lock().unwrap();
            for c in cookies.iter() {
                jar.add(c.clone());
            }
        })
    };

    send(&api, "getThing", args![load, save]).await.unwrap();

    assert_request(&handle.recorded()[0]).header("cookie", "visitor=42; lang=en");
    let jar = jar.lock().unwrap();
    assert_eq!(jar.len(), 2);
    assert_eq!(jar.get("session").unwrap().value, "abc");
    assert_eq!(jar.get("session").unwrap().path.as_deref(), Some("/"));
    assert_eq!(jar.get("theme").unwrap().value, "dark");
}

#[tokio::test]
async fn async_methods_run_on_their_own_task() {
    let (transport, handle) = mock().reply(ok()).build();
    let api = api_with(
        MethodDescriptor::new("getThing").url("/thing").async_mode(true),
        transport,
    );

    let reply = api.call("getThing", args![]).await.unwrap();
    assert!(matches!(reply, Reply::Spawned(_)), "{reply:?}");
    let resp = reply.wait().await.unwrap().unwrap();
    assert_eq!(resp.text().unwrap(), "ok");
    handle.assert_recorded_len(1);
}

#[tokio::test]
async fn async_failures_reach_the_error_callback() {
    let failed = Arc::new(Mutex::new(false));
    let (transport, _handle) = mock().fail("refused").build();
    let api = api_with(
        MethodDescriptor::new("getThing")
            .url("/thing")
            .async_mode(true)
            .param(ParameterDescriptor::callback(0, CallbackKind::Error)),
        transport,
    );
    let on_err = {
        let failed = failed.clone();
        Callback::on_error(move |err, _| {
            *failed.lock().unwrap() = matches!(err, CourierError::Transport(_));
        })
    };

    let err = send(&api, "getThing", args![on_err]).await.unwrap_err();
    assert!(matches!(err.root(), CourierError::Transport(_)));
    assert!(*failed.lock().unwrap());
}
