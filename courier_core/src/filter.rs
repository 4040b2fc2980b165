use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::Codecs;
use crate::error::{CourierError, FxError};
use crate::value::Value;

pub struct FilterContext<'a> {
    pub codecs: &'a Codecs,
}

/// Named value transformation applied to a parameter value before binding,
/// or inline in a template (`${name | trim}`).
pub trait Filter: Send + Sync + 'static {
    fn apply(&self, cx: &FilterContext<'_>, value: Value) -> Result<Value, FxError>;
}

pub struct FnFilter<F>(F);

pub fn filter_fn<F>(f: F) -> FnFilter<F>
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    FnFilter(f)
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    fn apply(&self, _: &FilterContext<'_>, value: Value) -> Result<Value, FxError> {
        Ok((self.0)(value))
    }
}

/// Serializes the value to JSON text.
pub struct JsonFilter;

impl Filter for JsonFilter {
    fn apply(&self, cx: &FilterContext<'_>, value: Value) -> Result<Value, FxError> {
        if value.is_null() {
            return Ok(value);
        }
        cx.codecs.json.encode(&value).map(Value::Text)
    }
}

/// Serializes the value to XML text. Fails when no XML converter is set.
pub struct XmlFilter;

impl Filter for XmlFilter {
    fn apply(&self, cx: &FilterContext<'_>, value: Value) -> Result<Value, FxError> {
        if value.is_null() {
            return Ok(value);
        }
        let xml = cx.codecs.xml.as_ref().ok_or("no XML converter configured")?;
        xml.encode(&value).map(Value::Text)
    }
}

pub struct TrimFilter;

impl Filter for TrimFilter {
    fn apply(&self, _: &FilterContext<'_>, value: Value) -> Result<Value, FxError> {
        Ok(map_text(value, |s| s.trim().to_string()))
    }
}

pub struct UpperFilter;

impl Filter for UpperFilter {
    fn apply(&self, _: &FilterContext<'_>, value: Value) -> Result<Value, FxError> {
        Ok(map_text(value, |s| s.to_uppercase()))
    }
}

pub struct LowerFilter;

impl Filter for LowerFilter {
    fn apply(&self, _: &FilterContext<'_>, value: Value) -> Result<Value, FxError> {
        Ok(map_text(value, |s| s.to_lowercase()))
    }
}

/// Text values are transformed; lists are transformed element-wise;
/// anything else passes through.
fn map_text(value: Value, f: impl Fn(&str) -> String + Copy) -> Value {
    match value {
        Value::Text(s) => Value::Text(f(&s)),
        Value::List(items) => Value::List(items.into_iter().map(|v| map_text(v, f)).collect()),
        other => other,
    }
}

#[derive(Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut r = Self {
            filters: HashMap::new(),
        };
        r.register("json", JsonFilter);
        r.register("xml", XmlFilter);
        r.register("trim", TrimFilter);
        r.register("upper", UpperFilter);
        r.register("lower", LowerFilter);
        r
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

impl FilterRegistry {
    /// Registry without the built-in filters.
    pub fn empty() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, filter: impl Filter) {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Resolves filter names up front; unknown names fail here rather than
    /// at call time.
    pub fn chain<'n>(
        &self,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<FilterChain, CourierError> {
        let mut filters = Vec::new();
        for name in names {
            let f = self
                .get(name)
                .ok_or_else(|| CourierError::UnknownFilter(name.to_string()))?;
            filters.push((name.to_string(), f));
        }
        Ok(FilterChain { filters })
    }
}

/// Ordered, pre-resolved list of filters.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<(String, Arc<dyn Filter>)>,
}

impl FilterChain {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn apply(&self, cx: &FilterContext<'_>, mut value: Value) -> Result<Value, CourierError> {
        for (name, f) in &self.filters {
            value = f.apply(cx, value).map_err(|source| CourierError::Filter {
                filter: name.clone(),
                source,
            })?;
        }
        Ok(value)
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|(n, _)| n))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtins_apply_in_order() {
        let codecs = Codecs::default();
        let cx = FilterContext { codecs: &codecs };
        let chain = FilterRegistry::default().chain(["trim", "upper"]).unwrap();
        let v = chain.apply(&cx, Value::from("  foo ")).unwrap();
        assert_eq!(v, Value::Text("FOO".into()));
    }

    #[test]
    fn json_filter_serializes_structures() {
        let codecs = Codecs::default();
        let cx = FilterContext { codecs: &codecs };
        let chain = FilterRegistry::default().chain(["json"]).unwrap();
        let v = chain
            .apply(&cx, Value::map([("a", 1)]))
            .unwrap();
        assert_eq!(v, Value::Text(r#"{"a":1}"#.into()));
        assert!(chain.apply(&cx, Value::Null).unwrap().is_null());
    }

    #[test]
    fn xml_filter_requires_converter() {
        let codecs = Codecs::default();
        let cx = FilterContext { codecs: &codecs };
        let chain = FilterRegistry::default().chain(["xml"]).unwrap();
        let e = chain.apply(&cx, Value::from("x")).unwrap_err();
        assert!(matches!(e, CourierError::Filter { filter, .. } if filter == "xml"));
    }

    #[test]
    fn unknown_filter_fails_at_resolution() {
        let e = FilterRegistry::default().chain(["nope"]).unwrap_err();
        assert!(matches!(e, CourierError::UnknownFilter(n) if n == "nope"));
    }

    #[test]
    fn custom_filters_can_be_registered() {
        let mut r = FilterRegistry::empty();
        r.register("double", filter_fn(|v| match v {
            Value::Int(n) => Value::Int(n * 2),
            other => other,
        }));
        assert!(!r.contains("trim"));
        let codecs = Codecs::default();
        let cx = FilterContext { codecs: &codecs };
        let v = r.chain(["double"]).unwrap().apply(&cx, Value::Int(4)).unwrap();
        assert_eq!(v, Value::Int(8));
    }
}
