//! Sample interface for an httpbin-style echo service.

use courier_core::prelude::*;
use serde::{Deserialize, Serialize};

pub const INTERFACE: &str = "UserApi";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub tags: Vec<String>,
}

/// Shape of httpbin's `/anything` echo.
#[derive(Debug, Deserialize)]
pub struct Echo {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub headers: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
}

/// `base_url` comes from the settings variables.
pub fn user_api() -> InterfaceDescriptor {
    InterfaceDescriptor::new(INTERFACE)
        .base_url("${base_url}/anything")
        .header("Accept: application/json")
        .user_agent("courier-examples/${version}")
        .variable("version", env!("CARGO_PKG_VERSION"))
        .method(
            MethodDescriptor::new("getUser")
                .url("/users/${id}")
                .param(ParameterDescriptor::variable(0, "id"))
                .param(
                    ParameterDescriptor::query(1)
                        .name("fields")
                        .default_value("id,name"),
                ),
        )
        .method(
            MethodDescriptor::new("searchUsers")
                .url("/users")
                .param(
                    ParameterDescriptor::query(0)
                        .name("username_${_index}")
                        .kind(ParamKind::Collection),
                )
                .param(ParameterDescriptor::query(1).name("lang").filter("lower")),
        )
        .method(
            MethodDescriptor::new("postUser")
                .url("/users")
                .content_type("application/json")
                .param(ParameterDescriptor::body(0).kind(ParamKind::Object))
                .param(ParameterDescriptor::header(1).name("X-Request-Id")),
        )
        .method(
            MethodDescriptor::new("uploadAvatar")
                .post("/users/${id}/avatar")
                .param(ParameterDescriptor::variable(0, "id"))
                .multipart(MultipartDescriptor::new(1, "avatar").file_name("${2}")),
        )
        .method(
            MethodDescriptor::new("deleteUser")
                .url("/users/${id}")
                .param(ParameterDescriptor::variable(0, "id")),
        )
        .method(
            MethodDescriptor::new("getUserRequest")
                .url("/users/${id}")
                .param(ParameterDescriptor::variable(0, "id"))
                .returns(Returns::Draft),
        )
}

pub async fn run_demo<T: Transport>(courier: &Courier<T>) -> Result<(), CourierError> {
    let api = courier.register(&user_api())?;

    if let Some(resp) = api.call("getUser", courier_core::args![42]).await?.into_response() {
        let echo: Echo = resp.json()?;
        tracing::info!(method = %echo.method, url = %echo.url, "getUser");
    }

    let user = NewUser {
        name: "Ada".into(),
        email: None,
        tags: vec!["admin".into()],
    };
    if let Some(resp) = api
        .call("postUser", courier_core::args![Value::object(user), "req-1"])
        .await?
        .into_response()
    {
        let echo: Echo = resp.json()?;
        tracing::info!(json = ?echo.json, "postUser");
    }

    let draft = api.prepare("searchUsers", &courier_core::args![vec!["ada", "grace"], "EN"])?;
    tracing::info!(query = ?draft.query_pairs(), "searchUsers draft");
    Ok(())
}
