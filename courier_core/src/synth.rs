//! Method + arguments -> [`RequestDraft`].

use bytes::Bytes;

use crate::binder::{self, BindContext, parse_header_line};
use crate::bound::{BoundMethod, MethodScope};
use crate::descriptor::{DataType, Target};
use crate::draft::{Multipart, NameValueEntry, RequestDraft};
use crate::error::CourierError;
use crate::render::Renderer;
use crate::scope::{IterationScope, ScopeChain};
use crate::settings::Settings;
use crate::value::Value;
use crate::{urls, verb};

/// Renders a bound method against call arguments. Pure: no I/O, no
/// interceptor hooks.
#[derive(Copy, Clone)]
pub struct Synthesizer<'a> {
    settings: &'a Settings,
}

impl<'a> Synthesizer<'a> {
    #[inline]
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    pub fn synthesize(&self, m: &BoundMethod, args: &[Value]) -> Result<RequestDraft, CourierError> {
        synthesize(m, self.settings, args).map_err(|e| CourierError::in_method(&m.name, e))
    }
}

pub(crate) fn synthesize(
    m: &BoundMethod,
    settings: &Settings,
    args: &[Value],
) -> Result<RequestDraft, CourierError> {
    let codecs = &settings.codecs;
    let renderer = Renderer::new(codecs, &settings.filters);
    let method_scope = MethodScope::new(&m.variables, args, codecs);
    let root = ScopeChain::root(&settings.variables);
    let base = root.child(&m.base_variables);
    let scope = base.child(&method_scope);

    let base_url = match &m.base_url {
        Some(t) => renderer.render(t, &scope, args)?,
        None => String::new(),
    };
    let url = urls::join_url(&base_url, &renderer.render(&m.url, &scope, args)?);
    if url.is_empty() {
        return Err(CourierError::EmptyUrl);
    }
    let url = urls::with_default_scheme(url);

    let method = match &m.verb {
        Some(t) => {
            let v = renderer.render(t, &scope, args)?;
            if v.trim().is_empty() {
                m.inferred_method.clone()
            } else {
                verb::parse_method(&v)?
            }
        }
        None => m.inferred_method.clone(),
    };

    let mut draft = RequestDraft::new(&m.interface, &m.name, url, method, codecs.clone());
    if let Some(charset) = m.charset.resolve(&renderer, &scope, args)? {
        draft.charset = charset;
    }
    draft.content_type = m.content_type.resolve(&renderer, &scope, args)?;
    draft.content_encoding = m.content_encoding.resolve(&renderer, &scope, args)?;
    draft.user_agent = m.user_agent.resolve(&renderer, &scope, args)?;
    draft.ssl_protocol = m.ssl_protocol.resolve(&renderer, &scope, args)?;
    if let Some(t) = &m.data_type {
        draft.data_type = DataType::parse(&renderer.render(t, &scope, args)?)?;
    }

    let default_target = verb::default_param_target(draft.method());
    let content_type = draft.content_type.clone();
    let cx = BindContext {
        renderer,
        scope: &scope,
        args,
        default_target,
        content_type: content_type.as_deref(),
    };
    for p in &m.params {
        for e in binder::bind_parameter(p, &cx)? {
            draft.push_entry(e);
        }
    }

    for t in &m.headers {
        let line = renderer.render(t, &scope, args)?;
        let (name, value) = header_line(&line)?;
        draft.add_header(name, value);
    }
    for t in &m.body {
        let text = renderer.render(t, &scope, args)?;
        add_body_template(&mut draft, &text, default_target);
    }
    for t in &m.base_headers {
        let line = renderer.render(t, &scope, args)?;
        let (name, value) = header_line(&line)?;
        if !draft.has_header(name) {
            draft.add_header(name, value);
        }
    }

    attach_multiparts(&mut draft, m, &cx)?;

    for (name, value) in &settings.default_headers {
        if !draft.has_header(name) {
            draft.add_header(name.clone(), value.clone());
        }
    }
    for (name, value) in &settings.default_parameters {
        if !draft.has_argument(name) {
            draft.push_entry(NameValueEntry::named(name.clone(), value.clone(), default_target));
        }
    }

    draft.timeout = m.timeout;
    draft.retry_count = m.retry_count;
    draft.max_retry_interval = m.max_retry_interval;
    draft.retryer = m.retryer.clone();
    draft.progress_step = m.progress_step;
    draft.async_mode = m.async_mode;

    for (index, kind) in &m.callbacks {
        match args.get(*index) {
            None | Some(Value::Null) => {}
            Some(Value::Callback(cb)) if cb.kind() == *kind => draft.attach_callback(cb.clone()),
            Some(other) => {
                return Err(CourierError::invalid_param(
                    *index,
                    format!("expected a {kind:?} callback, got {}", other.kind_name()),
                ));
            }
        }
    }

    draft.interceptors = m.interceptors.clone();
    Ok(draft)
}

fn header_line(line: &str) -> Result<(&str, &str), CourierError> {
    parse_header_line(line).ok_or_else(|| CourierError::InvalidHeader {
        name: line.to_string(),
    })
}

/// Form-style templates (`a=1&b=2`) are split into fields bound to the
/// verb's default target unless the request declares a non-form content
/// type; otherwise the text is a raw body fragment.
fn add_body_template(draft: &mut RequestDraft, text: &str, target: Target) {
    let form = match draft.content_type() {
        None => true,
        Some(ct) => ct
            .to_ascii_lowercase()
            .starts_with("application/x-www-form-urlencoded"),
    };
    if !form {
        draft.push_entry(NameValueEntry::fragment(text, Target::Body));
        return;
    }
    for item in text.split('&').filter(|s| !s.is_empty()) {
        match item.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                draft.push_entry(NameValueEntry::named(name, value, target))
            }
            _ => draft.push_entry(NameValueEntry::fragment(item, target)),
        }
    }
}

fn attach_multiparts(
    draft: &mut RequestDraft,
    m: &BoundMethod,
    cx: &BindContext<'_>,
) -> Result<(), CourierError> {
    for mp in &m.multiparts {
        let items: Vec<&Value> = match cx.args.get(mp.index) {
            None | Some(Value::Null) => continue,
            Some(Value::List(items)) => items.iter().collect(),
            Some(v) => vec![v],
        };
        for (index, item) in items.into_iter().enumerate() {
            let it = IterationScope {
                item: item.clone(),
                index,
            };
            let scope = cx.scope.child(&it);
            let name = cx.renderer.render(&mp.name, &scope, cx.args)?;
            let file_name = mp
                .file_name
                .as_ref()
                .map(|t| cx.renderer.render(t, &scope, cx.args))
                .transpose()?;
            let (data, implied_ct) = part_data(item, cx, mp.index)?;
            draft.add_multipart(Multipart {
                name,
                file_name,
                content_type: mp.content_type.clone().or(implied_ct),
                data,
            });
        }
    }
    if draft.multiparts.is_empty() {
        return Ok(());
    }
    let boundary = uuid::Uuid::new_v4().simple().to_string();
    match draft.content_type.as_deref() {
        None => {
            draft.content_type = Some(format!("multipart/form-data; boundary={boundary}"));
        }
        Some(ct) if ct.to_ascii_lowercase().starts_with("multipart/") => {
            if !ct.contains("boundary=") {
                draft.content_type = Some(format!("{ct}; boundary={boundary}"));
            }
        }
        Some(ct) => {
            return Err(CourierError::InvalidDescriptor(
                format!("multipart parts cannot be sent with content type `{ct}`").into(),
            ));
        }
    }
    Ok(())
}

fn part_data(
    v: &Value,
    cx: &BindContext<'_>,
    index: usize,
) -> Result<(Bytes, Option<String>), CourierError> {
    match v {
        Value::Bytes(b) => Ok((b.clone(), Some("application/octet-stream".into()))),
        Value::Text(s) => Ok((Bytes::from(s.clone()), None)),
        Value::Map(_) | Value::Object(_) | Value::List(_) => {
            let json = cx
                .renderer
                .codecs()
                .json
                .encode(v)
                .map_err(CourierError::BodyEncoding)?;
            Ok((Bytes::from(json), Some("application/json".into())))
        }
        Value::Callback(_) => Err(CourierError::invalid_param(
            index,
            "callback passed as a multipart part",
        )),
        scalar => Ok((
            Bytes::from(scalar.scalar_string().unwrap_or_default()),
            None,
        )),
    }
}
