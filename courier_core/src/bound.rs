//! Registered form of a descriptor: templates compiled, filters resolved,
//! interceptors instantiated, precedence chains for non-template settings
//! already collapsed.

use http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::callback::{CallbackKind, DEFAULT_PROGRESS_STEP};
use crate::codec::Codecs;
use crate::descriptor::{
    DefaultValue, InterfaceDescriptor, MethodDescriptor, ParamKind, ParameterDescriptor,
    RetryerFactory, Returns, Target,
};
use crate::error::CourierError;
use crate::filter::{FilterChain, FilterContext, FilterRegistry};
use crate::interceptor::{Interceptor, InterceptorRegistry};
use crate::registry::TemplateCache;
use crate::render::Renderer;
use crate::scope::{ScopeChain, VariableScope, Variables};
use crate::settings::Settings;
use crate::template::CompiledTemplate;
use crate::value::Value;
use crate::verb;

/// Method-level template, falling back to the interface level, then to a
/// client-wide value. Blank renders fall through.
#[derive(Clone, Debug, Default)]
pub(crate) struct Layered {
    method: Option<CompiledTemplate>,
    base: Option<CompiledTemplate>,
    global: Option<String>,
}

impl Layered {
    pub(crate) fn resolve(
        &self,
        r: &Renderer<'_>,
        scope: &ScopeChain<'_>,
        args: &[Value],
    ) -> Result<Option<String>, CourierError> {
        for t in [&self.method, &self.base].into_iter().flatten() {
            let s = r.render(t, scope, args)?;
            let s = s.trim();
            if !s.is_empty() {
                return Ok(Some(s.to_string()));
            }
        }
        Ok(self.global.clone())
    }
}

/// Argument value with default substitution and the parameter's filter
/// chain applied. Defaults replace `Null` only.
pub(crate) fn prepared_value(
    raw: Option<&Value>,
    kind: ParamKind,
    default: Option<&DefaultValue>,
    filters: &FilterChain,
    cx: &FilterContext<'_>,
) -> Result<Value, CourierError> {
    let value = match (raw, default) {
        (None | Some(Value::Null), Some(d)) => d.value(kind, cx.codecs)?,
        (Some(v), _) => v.clone(),
        (None, None) => Value::Null,
    };
    if filters.is_empty() {
        return Ok(value);
    }
    filters.apply(cx, value)
}

#[derive(Clone, Debug)]
pub(crate) struct BoundVariable {
    pub(crate) index: usize,
    pub(crate) kind: ParamKind,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) filters: FilterChain,
}

/// Named parameters of one call, visible to templates by name.
pub(crate) struct MethodScope<'a> {
    variables: &'a HashMap<String, BoundVariable>,
    args: &'a [Value],
    cx: FilterContext<'a>,
}

impl<'a> MethodScope<'a> {
    pub(crate) fn new(
        variables: &'a HashMap<String, BoundVariable>,
        args: &'a [Value],
        codecs: &'a Codecs,
    ) -> Self {
        Self {
            variables,
            args,
            cx: FilterContext { codecs },
        }
    }
}

impl VariableScope for MethodScope<'_> {
    fn is_defined(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn lookup(&self, name: &str) -> Result<Option<Value>, CourierError> {
        let Some(var) = self.variables.get(name) else {
            return Ok(None);
        };
        prepared_value(
            self.args.get(var.index),
            var.kind,
            var.default.as_ref(),
            &var.filters,
            &self.cx,
        )
        .map(Some)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BoundParameter {
    pub(crate) index: usize,
    pub(crate) kind: ParamKind,
    pub(crate) target: Target,
    pub(crate) name: Option<CompiledTemplate>,
    pub(crate) default: Option<DefaultValue>,
    pub(crate) filters: FilterChain,
    pub(crate) url_encode: bool,
    pub(crate) part_content_type: Option<String>,
}

#[derive(Clone, Debug)]
pub(crate) struct BoundMultipart {
    pub(crate) index: usize,
    pub(crate) name: CompiledTemplate,
    pub(crate) file_name: Option<CompiledTemplate>,
    pub(crate) content_type: Option<String>,
}

pub struct BoundMethod {
    pub(crate) interface: String,
    pub(crate) name: String,
    pub(crate) inferred_method: Method,
    pub(crate) verb: Option<CompiledTemplate>,
    pub(crate) base_url: Option<CompiledTemplate>,
    pub(crate) url: CompiledTemplate,
    pub(crate) headers: Vec<CompiledTemplate>,
    pub(crate) base_headers: Vec<CompiledTemplate>,
    pub(crate) body: Vec<CompiledTemplate>,
    pub(crate) content_type: Layered,
    pub(crate) content_encoding: Layered,
    pub(crate) user_agent: Layered,
    pub(crate) charset: Layered,
    pub(crate) ssl_protocol: Layered,
    pub(crate) data_type: Option<CompiledTemplate>,
    pub(crate) params: Vec<BoundParameter>,
    pub(crate) variables: HashMap<String, BoundVariable>,
    pub(crate) base_variables: Variables,
    pub(crate) multiparts: Vec<BoundMultipart>,
    pub(crate) callbacks: Vec<(usize, CallbackKind)>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_count: u32,
    pub(crate) max_retry_interval: Option<Duration>,
    pub(crate) retryer: Option<RetryerFactory>,
    pub(crate) returns: Returns,
    pub(crate) async_mode: bool,
    pub(crate) progress_step: u64,
    pub(crate) arity: usize,
}

impl std::fmt::Debug for BoundMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundMethod")
            .field("interface", &self.interface)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("params", &self.params.len())
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl BoundMethod {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[inline]
    pub fn returns(&self) -> Returns {
        self.returns
    }

    #[inline]
    pub fn is_async(&self) -> bool {
        self.async_mode
    }
}

/// Registered interface: its methods by name.
#[derive(Debug)]
pub struct BoundInterface {
    name: String,
    methods: HashMap<String, Arc<BoundMethod>>,
}

impl BoundInterface {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self, name: &str) -> Result<&Arc<BoundMethod>, CourierError> {
        self.methods
            .get(name)
            .ok_or_else(|| CourierError::UnknownMethod {
                interface: self.name.clone(),
                method: name.to_string(),
            })
    }

    #[inline]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub(crate) fn bind(
        desc: &InterfaceDescriptor,
        settings: &Settings,
        interceptors: &InterceptorRegistry,
        templates: &TemplateCache,
    ) -> Result<Self, CourierError> {
        let binder = Binder {
            desc,
            settings,
            interceptors,
            templates,
        };
        let mut methods = HashMap::with_capacity(desc.methods.len());
        for m in &desc.methods {
            if methods.contains_key(&m.name) {
                return Err(CourierError::InvalidDescriptor(
                    format!("duplicate method `{}` on `{}`", m.name, desc.name).into(),
                ));
            }
            let bound = binder
                .method(m)
                .map_err(|e| CourierError::in_method(&m.name, e))?;
            methods.insert(m.name.clone(), Arc::new(bound));
        }
        Ok(Self {
            name: desc.name.clone(),
            methods,
        })
    }
}

struct Binder<'a> {
    desc: &'a InterfaceDescriptor,
    settings: &'a Settings,
    interceptors: &'a InterceptorRegistry,
    templates: &'a TemplateCache,
}

impl Binder<'_> {
    fn compile(&self, text: &str) -> Result<CompiledTemplate, CourierError> {
        let t = self.templates.compile(text)?;
        check_filters(&t, &self.settings.filters)?;
        Ok(t)
    }

    fn compile_opt(&self, text: Option<&String>) -> Result<Option<CompiledTemplate>, CourierError> {
        text.map(|t| self.compile(t)).transpose()
    }

    fn layered(
        &self,
        method: Option<&String>,
        base: Option<&String>,
        global: Option<&String>,
    ) -> Result<Layered, CourierError> {
        Ok(Layered {
            method: self.compile_opt(method)?,
            base: self.compile_opt(base)?,
            global: global.cloned(),
        })
    }

    fn method(&self, m: &MethodDescriptor) -> Result<BoundMethod, CourierError> {
        let base = &self.desc.defaults;
        let md = &m.defaults;
        let global = self.settings;

        let mut params = Vec::new();
        let mut variables: HashMap<String, BoundVariable> = HashMap::new();
        let mut callbacks = Vec::new();
        for p in &m.params {
            let filters = self
                .settings
                .filters
                .chain(p.filters.iter().map(String::as_str))?;
            if let ParamKind::Callback(kind) = p.kind {
                callbacks.push((p.index, kind));
                continue;
            }
            if let Some(cs) = &p.charset {
                check_charset(p.index, cs)?;
            }
            self.register_variable(&mut variables, p, &filters)?;
            let Some(target) = p.target else {
                continue;
            };
            let name = match p.name.as_deref().map(str::trim) {
                Some(n) if !n.is_empty() => Some(self.compile(n)?),
                _ => None,
            };
            params.push(BoundParameter {
                index: p.index,
                kind: p.kind,
                target,
                name,
                default: p.default_value.clone(),
                filters,
                url_encode: p.url_encode,
                part_content_type: p.part_content_type.clone(),
            });
        }

        let multiparts = m
            .multiparts
            .iter()
            .map(|mp| {
                Ok(BoundMultipart {
                    index: mp.index,
                    name: self.compile(&mp.name)?,
                    file_name: self.compile_opt(mp.file_name.as_ref())?,
                    content_type: mp.content_type.clone(),
                })
            })
            .collect::<Result<Vec<_>, CourierError>>()?;

        // global, then interface, then method
        let mut interceptors = Vec::new();
        for spec in global
            .interceptors
            .iter()
            .chain(&base.interceptors)
            .chain(&md.interceptors)
        {
            interceptors.push(self.interceptors.get_or_create(spec)?);
        }

        let compile_all = |ts: &[String]| {
            ts.iter()
                .map(|t| self.compile(t))
                .collect::<Result<Vec<_>, CourierError>>()
        };

        Ok(BoundMethod {
            interface: self.desc.name.clone(),
            name: m.name.clone(),
            inferred_method: verb::infer_method(&m.name),
            verb: self.compile_opt(m.verb.as_ref())?,
            base_url: self.compile_opt(self.desc.base_url.as_ref())?,
            url: self.compile(&m.url)?,
            headers: compile_all(&md.headers)?,
            base_headers: compile_all(&base.headers)?,
            body: compile_all(&m.body)?,
            content_type: self.layered(md.content_type.as_ref(), base.content_type.as_ref(), None)?,
            content_encoding: self.layered(
                md.content_encoding.as_ref(),
                base.content_encoding.as_ref(),
                None,
            )?,
            user_agent: self.layered(
                md.user_agent.as_ref(),
                base.user_agent.as_ref(),
                global.user_agent.as_ref(),
            )?,
            charset: self.layered(
                md.charset.as_ref(),
                base.charset.as_ref(),
                Some(&global.charset),
            )?,
            ssl_protocol: self.layered(
                md.ssl_protocol.as_ref(),
                base.ssl_protocol.as_ref(),
                global.ssl_protocol.as_ref(),
            )?,
            data_type: self.compile_opt(m.data_type.as_ref())?,
            params,
            variables,
            base_variables: self.desc.variables.clone(),
            multiparts,
            callbacks,
            interceptors,
            timeout: md.timeout.or(base.timeout).or(global.timeout),
            retry_count: md
                .retry_count
                .or(base.retry_count)
                .unwrap_or(global.retry_count),
            max_retry_interval: md
                .max_retry_interval
                .or(base.max_retry_interval)
                .or(global.max_retry_interval),
            retryer: md
                .retryer
                .clone()
                .or_else(|| base.retryer.clone())
                .or_else(|| global.retryer.clone()),
            returns: m.returns,
            async_mode: m.async_mode,
            progress_step: m.progress_step.unwrap_or(DEFAULT_PROGRESS_STEP),
            arity: m.arity(),
        })
    }

    /// Template-only variables must be unique; named query/header
    /// parameters are visible to templates unless a variable already
    /// claims the name.
    fn register_variable(
        &self,
        variables: &mut HashMap<String, BoundVariable>,
        p: &ParameterDescriptor,
        filters: &FilterChain,
    ) -> Result<(), CourierError> {
        let Some(name) = p.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            if p.target.is_none() {
                return Err(CourierError::invalid_param(
                    p.index,
                    "template variable without a name",
                ));
            }
            return Ok(());
        };
        let var = BoundVariable {
            index: p.index,
            kind: p.kind,
            default: p.default_value.clone(),
            filters: filters.clone(),
        };
        match p.target {
            None => {
                if variables.insert(name.to_string(), var).is_some() {
                    return Err(CourierError::InvalidDescriptor(
                        format!("variable `{name}` declared twice").into(),
                    ));
                }
            }
            Some(Target::Query | Target::Header) if !name.contains("${") => {
                variables.entry(name.to_string()).or_insert(var);
            }
            Some(_) => {}
        }
        Ok(())
    }
}

fn check_filters(t: &CompiledTemplate, filters: &FilterRegistry) -> Result<(), CourierError> {
    match t.filter_names().find(|n| !filters.contains(n)) {
        Some(unknown) => Err(CourierError::UnknownFilter(unknown.to_string())),
        None => Ok(()),
    }
}

/// Values are only ever encoded as UTF-8.
fn check_charset(index: usize, charset: &str) -> Result<(), CourierError> {
    let cs = charset.trim();
    if cs.eq_ignore_ascii_case("utf-8") || cs.eq_ignore_ascii_case("utf8") {
        return Ok(());
    }
    Err(CourierError::invalid_param(
        index,
        format!("unsupported charset `{cs}`, only UTF-8 is encoded"),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::MultipartDescriptor;
    use crate::interceptor::InterceptorSpec;

    fn bind(desc: InterfaceDescriptor) -> Result<BoundInterface, CourierError> {
        BoundInterface::bind(
            &desc,
            &Settings::default(),
            &InterceptorRegistry::new(),
            &TemplateCache::default(),
        )
    }

    #[test]
    fn binds_methods_and_infers_verbs() {
        let b = bind(
            InterfaceDescriptor::new("Api")
                .method(MethodDescriptor::new("deleteUser").url("/u/${id}")
                    .param(ParameterDescriptor::variable(0, "id"))),
        )
        .unwrap();
        let m = b.method("deleteUser").unwrap();
        assert_eq!(m.inferred_method, Method::DELETE);
        assert!(m.variables.contains_key("id"));
        assert_eq!(m.arity(), 1);
        assert!(matches!(
            b.method("nope"),
            Err(CourierError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn syntax_errors_surface_at_bind_time() {
        let e = bind(
            InterfaceDescriptor::new("Api")
                .method(MethodDescriptor::new("get").url("/x/${id")),
        )
        .unwrap_err();
        assert!(matches!(e.root(), CourierError::TemplateSyntax(_)));
        match e {
            CourierError::InMethod { method, .. } => assert_eq!(method, "get"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_filters_surface_at_bind_time() {
        let e = bind(
            InterfaceDescriptor::new("Api")
                .method(MethodDescriptor::new("get").url("/x/${0 | shout}")),
        )
        .unwrap_err();
        assert!(matches!(e.root(), CourierError::UnknownFilter(n) if n == "shout"));

        let e = bind(InterfaceDescriptor::new("Api").method(
            MethodDescriptor::new("get")
                .url("/x")
                .param(ParameterDescriptor::query(0).name("a").filter("shout")),
        ))
        .unwrap_err();
        assert!(matches!(e.root(), CourierError::UnknownFilter(_)));
    }

    #[test]
    fn parameter_charsets_other_than_utf8_are_rejected() {
        let desc = |cs: &str| {
            InterfaceDescriptor::new("Api").method(
                MethodDescriptor::new("get")
                    .url("/x")
                    .param(ParameterDescriptor::query(0).name("q").charset(cs)),
            )
        };
        assert!(bind(desc("UTF-8")).is_ok());
        assert!(bind(desc("utf8")).is_ok());
        let e = bind(desc("GBK")).unwrap_err();
        assert!(matches!(e.root(), CourierError::InvalidParam { index: 0, .. }), "{e:?}");
    }

    #[test]
    fn duplicate_variables_are_rejected() {
        let e = bind(InterfaceDescriptor::new("Api").method(
            MethodDescriptor::new("get")
                .url("/x")
                .param(ParameterDescriptor::variable(0, "a"))
                .param(ParameterDescriptor::variable(1, "a")),
        ))
        .unwrap_err();
        assert!(matches!(e.root(), CourierError::InvalidDescriptor(_)));
    }

    #[derive(Default)]
    struct Audit;
    impl Interceptor for Audit {}

    #[test]
    fn precedence_collapses_at_bind_time() {
        let settings = Settings::builder()
            .timeout(Duration::from_secs(30))
            .retry_count(1)
            .build();
        let desc = InterfaceDescriptor::new("Api")
            .timeout(Duration::from_secs(10))
            .interceptor(InterceptorSpec::of::<Audit>())
            .method(
                MethodDescriptor::new("get")
                    .url("/x")
                    .retry_count(4)
                    .interceptor(InterceptorSpec::of::<Audit>())
                    .multipart(MultipartDescriptor::new(0, "file")),
            );
        let b = BoundInterface::bind(
            &desc,
            &settings,
            &InterceptorRegistry::new(),
            &TemplateCache::default(),
        )
        .unwrap();
        let m = b.method("get").unwrap();
        assert_eq!(m.timeout, Some(Duration::from_secs(10)));
        assert_eq!(m.retry_count, 4);
        assert_eq!(m.interceptors.len(), 2);
        assert!(Arc::ptr_eq(&m.interceptors[0], &m.interceptors[1]));
        assert_eq!(m.multiparts.len(), 1);
    }

    #[test]
    fn defaults_replace_null_only() {
        let codecs = Codecs::default();
        let cx = FilterContext { codecs: &codecs };
        let d = DefaultValue::new("dflt");
        let none = FilterChain::default();
        let v = prepared_value(Some(&Value::Null), ParamKind::Text, Some(&d), &none, &cx).unwrap();
        assert_eq!(v, Value::Text("dflt".into()));
        let v = prepared_value(None, ParamKind::Text, Some(&d), &none, &cx).unwrap();
        assert_eq!(v, Value::Text("dflt".into()));
        let v = prepared_value(Some(&Value::from("")), ParamKind::Text, Some(&d), &none, &cx)
            .unwrap();
        assert_eq!(v, Value::Text(String::new()));
        let v = prepared_value(Some(&Value::List(vec![])), ParamKind::Collection, Some(&d), &none, &cx)
            .unwrap();
        assert_eq!(v, Value::List(vec![]));
    }
}
