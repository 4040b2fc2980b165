//! Lowers one call argument into query, header or body entries.
//!
//! Dispatch is over a closed set of argument shapes; every
//! (shape, named/unnamed) combination is handled in `bind_parameter`.

use crate::bound::{BoundParameter, prepared_value};
use crate::descriptor::Target;
use crate::draft::NameValueEntry;
use crate::error::CourierError;
use crate::render::Renderer;
use crate::scope::{IterationScope, ScopeChain};
use crate::template::CompiledTemplate;
use crate::value::{ObjectValue, Value};

pub(crate) struct BindContext<'a> {
    pub(crate) renderer: Renderer<'a>,
    pub(crate) scope: &'a ScopeChain<'a>,
    pub(crate) args: &'a [Value],
    pub(crate) default_target: Target,
    pub(crate) content_type: Option<&'a str>,
}

enum ArgShape<'v> {
    Absent,
    Text(&'v str),
    Scalar(&'v Value),
    Sequence(&'v [Value]),
    Map(&'v [(String, Value)]),
    Object(&'v ObjectValue),
    Callback,
}

impl<'v> ArgShape<'v> {
    fn of(v: &'v Value) -> Self {
        match v {
            Value::Null => ArgShape::Absent,
            Value::Text(s) => ArgShape::Text(s),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Bytes(_) => {
                ArgShape::Scalar(v)
            }
            Value::List(items) => ArgShape::Sequence(items),
            Value::Map(entries) => ArgShape::Map(entries),
            Value::Object(o) => ArgShape::Object(o),
            Value::Callback(_) => ArgShape::Callback,
        }
    }
}

pub(crate) fn bind_parameter(
    p: &BoundParameter,
    cx: &BindContext<'_>,
) -> Result<Vec<NameValueEntry>, CourierError> {
    let value = prepared_value(
        cx.args.get(p.index),
        p.kind,
        p.default.as_ref(),
        &p.filters,
        &cx.renderer.filter_context(),
    )?;
    let target = p.target.or_default(cx.default_target);

    match (ArgShape::of(&value), &p.name) {
        (ArgShape::Absent, _) => Ok(Vec::new()),
        (ArgShape::Callback, _) => Err(CourierError::invalid_param(
            p.index,
            "callback passed to a bound parameter",
        )),
        (ArgShape::Sequence(items), name) => expand_sequence(p, target, name.as_ref(), items, cx),
        (
            ArgShape::Text(_) | ArgShape::Scalar(_) | ArgShape::Map(_) | ArgShape::Object(_),
            Some(name),
        ) => {
            let name = render_name(name, &value, 0, cx)?;
            Ok(vec![entry(p, Some(name), value.clone(), target)])
        }
        (ArgShape::Text(text), None) => literal(p, target, text).map(|e| vec![e]),
        (ArgShape::Scalar(v), None) => match (target, v) {
            (Target::Body, Value::Bytes(_)) => Ok(vec![entry(p, None, v.clone(), target)]),
            _ => {
                let text = v.scalar_string().unwrap_or_default();
                literal(p, target, &text).map(|e| vec![e])
            }
        },
        // null entries are dropped for maps and objects alike
        (ArgShape::Map(entries), None) => Ok(entries
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| entry(p, Some(k.clone()), v.clone(), target))
            .collect()),
        (ArgShape::Object(obj), None) => {
            let props = cx
                .renderer
                .codecs()
                .properties
                .object_to_map(obj)
                .map_err(|e| match target {
                    Target::Body => CourierError::BodyEncoding(e),
                    _ => CourierError::ValueEncoding(e),
                })?;
            Ok(props
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| entry(p, Some(k), v, target))
                .collect())
        }
    }
}

fn entry(p: &BoundParameter, name: Option<String>, value: Value, target: Target) -> NameValueEntry {
    NameValueEntry {
        name,
        value,
        target,
        content_type: p.part_content_type.clone(),
        url_encode: p.url_encode,
    }
}

/// Parameter name, rendered per element when it uses `_it` / `_index`.
fn render_name(
    name: &CompiledTemplate,
    item: &Value,
    index: usize,
    cx: &BindContext<'_>,
) -> Result<String, CourierError> {
    if !name.has_iteration_marker() {
        return cx.renderer.render(name, cx.scope, cx.args);
    }
    let it = IterationScope {
        item: item.clone(),
        index,
    };
    let scope = cx.scope.child(&it);
    cx.renderer.render(name, &scope, cx.args)
}

fn expand_sequence(
    p: &BoundParameter,
    target: Target,
    name: Option<&CompiledTemplate>,
    items: &[Value],
    cx: &BindContext<'_>,
) -> Result<Vec<NameValueEntry>, CourierError> {
    let per_element_names = name.is_some_and(CompiledTemplate::has_iteration_marker);
    match target {
        Target::Body if !per_element_names => {
            let value = Value::List(items.to_vec());
            match name {
                Some(n) => {
                    let n = cx.renderer.render(n, cx.scope, cx.args)?;
                    Ok(vec![entry(p, Some(n), value, target)])
                }
                None => {
                    let text = encode_body_fragment(&value, cx)?;
                    Ok(vec![entry(p, None, Value::Text(text), target)])
                }
            }
        }
        _ => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match name {
                    Some(n) => {
                        let n = render_name(n, item, i, cx)?;
                        out.push(entry(p, Some(n), item.clone(), target));
                    }
                    None => {
                        let text = cx
                            .renderer
                            .codecs()
                            .stringify(item)
                            .map_err(CourierError::ValueEncoding)?;
                        out.push(literal(p, target, &text)?);
                    }
                }
            }
            Ok(out)
        }
    }
}

/// Structured body fragment, XML when the request says so, JSON otherwise.
fn encode_body_fragment(value: &Value, cx: &BindContext<'_>) -> Result<String, CourierError> {
    let codecs = cx.renderer.codecs();
    let is_xml = cx
        .content_type
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("xml"));
    if is_xml {
        let xml = codecs
            .xml
            .as_ref()
            .ok_or_else(|| CourierError::body_encoding("no XML converter configured"))?;
        return xml.encode(value).map_err(CourierError::BodyEncoding);
    }
    codecs.json.encode(value).map_err(CourierError::BodyEncoding)
}

/// Unnamed text: a raw query fragment, a `Name: value` header line, or a
/// raw body fragment.
fn literal(p: &BoundParameter, target: Target, text: &str) -> Result<NameValueEntry, CourierError> {
    match target {
        Target::Header => {
            let (name, value) = parse_header_line(text).ok_or_else(|| {
                CourierError::invalid_param(
                    p.index,
                    format!("header literal `{text}` is not of the form `Name: value`"),
                )
            })?;
            Ok(entry(p, Some(name.to_string()), Value::from(value), target))
        }
        _ => Ok(entry(p, None, Value::from(text), target)),
    }
}

pub(crate) fn parse_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::Codecs;
    use crate::descriptor::{DefaultValue, ParamKind};
    use crate::filter::{FilterChain, FilterRegistry};
    use crate::scope::Variables;
    use crate::template::compile;
    use serde::Serialize;

    fn param(target: Target, name: Option<&str>) -> BoundParameter {
        BoundParameter {
            index: 0,
            kind: ParamKind::Scalar,
            target,
            name: name.map(|n| compile(n).unwrap()),
            default: None,
            filters: FilterChain::default(),
            url_encode: true,
            part_content_type: None,
        }
    }

    fn bind(p: &BoundParameter, arg: Value) -> Result<Vec<NameValueEntry>, CourierError> {
        let codecs = Codecs::default();
        let filters = FilterRegistry::default();
        let vars = Variables::new().with("prefix", "user");
        let scope = ScopeChain::root(&vars);
        let args = [arg];
        let cx = BindContext {
            renderer: Renderer::new(&codecs, &filters),
            scope: &scope,
            args: &args,
            default_target: Target::Query,
            content_type: None,
        };
        bind_parameter(p, &cx)
    }

    fn pairs(entries: &[NameValueEntry]) -> Vec<(Option<&str>, Value)> {
        entries
            .iter()
            .map(|e| (e.name.as_deref(), e.value.clone()))
            .collect()
    }

    #[derive(Serialize)]
    struct Search {
        name: &'static str,
        age: Option<u32>,
    }

    #[test]
    fn named_scalar_is_one_entry() {
        let e = bind(&param(Target::Query, Some("username")), Value::from("foo")).unwrap();
        assert_eq!(pairs(&e), vec![(Some("username"), Value::from("foo"))]);
    }

    #[test]
    fn null_without_default_binds_nothing() {
        assert!(bind(&param(Target::Query, Some("a")), Value::Null).unwrap().is_empty());
    }

    #[test]
    fn default_fills_null() {
        let mut p = param(Target::Query, Some("a"));
        p.kind = ParamKind::Text;
        p.default = Some(DefaultValue::new("x"));
        let e = bind(&p, Value::Null).unwrap();
        assert_eq!(pairs(&e), vec![(Some("a"), Value::from("x"))]);
        let e = bind(&p, Value::from("")).unwrap();
        assert_eq!(pairs(&e), vec![(Some("a"), Value::from(""))]);
    }

    #[test]
    fn query_sequence_repeats_the_name() {
        let e = bind(&param(Target::Query, Some("id")), Value::list([1, 2, 3])).unwrap();
        assert_eq!(
            pairs(&e),
            vec![
                (Some("id"), Value::Int(1)),
                (Some("id"), Value::Int(2)),
                (Some("id"), Value::Int(3)),
            ]
        );
    }

    #[test]
    fn iteration_marker_renders_name_per_element() {
        let e = bind(
            &param(Target::Query, Some("${prefix}_${_index}")),
            Value::list(["foo", "bar"]),
        )
        .unwrap();
        assert_eq!(
            pairs(&e),
            vec![
                (Some("user_0"), Value::from("foo")),
                (Some("user_1"), Value::from("bar")),
            ]
        );
    }

    #[test]
    fn empty_sequence_binds_nothing() {
        assert!(bind(&param(Target::Query, Some("id")), Value::List(vec![])).unwrap().is_empty());
    }

    #[test]
    fn body_sequence_becomes_one_fragment() {
        let e = bind(&param(Target::Body, None), Value::list([1, 2])).unwrap();
        assert_eq!(pairs(&e), vec![(None, Value::from("[1,2]"))]);
        let e = bind(&param(Target::Body, Some("ids")), Value::list([1, 2])).unwrap();
        assert_eq!(pairs(&e), vec![(Some("ids"), Value::list([1, 2]))]);
    }

    #[test]
    fn unnamed_map_expands_per_key_and_skips_nulls() {
        let e = bind(
            &param(Target::Query, None),
            Value::map([("a", Value::from(1)), ("b", Value::Null), ("c", Value::from("x"))]),
        )
        .unwrap();
        assert_eq!(
            pairs(&e),
            vec![(Some("a"), Value::Int(1)), (Some("c"), Value::from("x"))]
        );
    }

    #[test]
    fn unnamed_object_skips_null_properties() {
        let e = bind(
            &param(Target::Query, None),
            Value::object(Search {
                name: "ann",
                age: None,
            }),
        )
        .unwrap();
        assert_eq!(pairs(&e), vec![(Some("name"), Value::from("ann"))]);
    }

    #[test]
    fn explicit_name_wins_over_decomposition() {
        let e = bind(
            &param(Target::Body, Some("filter")),
            Value::object(Search {
                name: "ann",
                age: Some(3),
            }),
        )
        .unwrap();
        assert_eq!(e.len(), 1);
        assert_eq!(e[0].name.as_deref(), Some("filter"));
    }

    #[test]
    fn unnamed_text_is_a_raw_fragment() {
        let e = bind(&param(Target::Query, None), Value::from("a=1&b=2")).unwrap();
        assert_eq!(pairs(&e), vec![(None, Value::from("a=1&b=2"))]);
    }

    #[test]
    fn header_literals_must_have_a_colon() {
        let e = bind(&param(Target::Header, None), Value::from("X-Id: 7")).unwrap();
        assert_eq!(pairs(&e), vec![(Some("X-Id"), Value::from("7"))]);
        assert!(matches!(
            bind(&param(Target::Header, None), Value::from("nonsense")),
            Err(CourierError::InvalidParam { index: 0, .. })
        ));
    }

    #[test]
    fn unknown_target_uses_verb_default() {
        let e = bind(&param(Target::Unknown, Some("q")), Value::from(1)).unwrap();
        assert_eq!(e[0].target, Target::Query);
    }

    #[test]
    fn body_object_decomposition_failure_is_body_encoding() {
        let e = bind(&param(Target::Body, None), Value::object(vec![1, 2])).unwrap_err();
        assert!(matches!(e, CourierError::BodyEncoding(_)));
    }
}
