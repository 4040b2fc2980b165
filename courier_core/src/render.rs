use crate::codec::Codecs;
use crate::error::CourierError;
use crate::filter::{FilterContext, FilterRegistry};
use crate::scope::ScopeChain;
use crate::template::{Access, CompiledTemplate, Segment, Source};
use crate::value::Value;

/// Evaluates compiled templates against a scope chain and the call arguments.
#[derive(Clone, Copy)]
pub struct Renderer<'a> {
    codecs: &'a Codecs,
    filters: &'a FilterRegistry,
}

impl<'a> Renderer<'a> {
    pub fn new(codecs: &'a Codecs, filters: &'a FilterRegistry) -> Self {
        Self { codecs, filters }
    }

    #[inline]
    pub fn codecs(&self) -> &'a Codecs {
        self.codecs
    }

    #[inline]
    pub fn filter_context(&self) -> FilterContext<'a> {
        FilterContext {
            codecs: self.codecs,
        }
    }

    pub fn render(
        &self,
        template: &CompiledTemplate,
        scope: &ScopeChain<'_>,
        args: &[Value],
    ) -> Result<String, CourierError> {
        if let Some(lit) = template.as_literal() {
            return Ok(lit.to_string());
        }
        let mut out = String::with_capacity(template.source().len());
        for seg in template.segments() {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Variable { .. } | Segment::Iteration { .. } => {
                    let v = self.evaluate(seg, scope, args)?;
                    out.push_str(&self.codecs.stringify(&v).map_err(CourierError::ValueEncoding)?);
                }
            }
        }
        Ok(out)
    }

    /// Value of a single expression segment, after property access and
    /// inline filters.
    pub fn evaluate(
        &self,
        seg: &Segment,
        scope: &ScopeChain<'_>,
        args: &[Value],
    ) -> Result<Value, CourierError> {
        let (root, access) = match seg {
            Segment::Literal(s) => return Ok(Value::Text(s.clone())),
            Segment::Variable { source, access } => {
                let root = match source {
                    Source::Name(name) => scope.resolve(name)?,
                    Source::Argument(index) => {
                        args.get(*index)
                            .cloned()
                            .ok_or(CourierError::ArgumentOutOfRange {
                                index: *index,
                                len: args.len(),
                            })?
                    }
                    Source::Const(v) => v.clone(),
                };
                (root, access)
            }
            Segment::Iteration { var, access } => (scope.resolve(var.name())?, access),
        };
        self.access(root, access)
    }

    fn access(&self, mut value: Value, access: &Access) -> Result<Value, CourierError> {
        for property in &access.path {
            value = self.property(value, property)?;
        }
        if !access.filters.is_empty() {
            let chain = self
                .filters
                .chain(access.filters.iter().map(String::as_str))?;
            value = chain.apply(&self.filter_context(), value)?;
        }
        Ok(value)
    }

    fn property(&self, value: Value, name: &str) -> Result<Value, CourierError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Map(entries) => Ok(entries
                .into_iter()
                .find(|(k, _)| k == name)
                .map_or(Value::Null, |(_, v)| v)),
            Value::Object(obj) => {
                let entries = self
                    .codecs
                    .properties
                    .object_to_map(&obj)
                    .map_err(CourierError::ValueEncoding)?;
                Ok(entries
                    .into_iter()
                    .find(|(k, _)| k == name)
                    .map_or(Value::Null, |(_, v)| v))
            }
            Value::List(items) => match name.parse::<usize>() {
                Ok(i) => Ok(items.into_iter().nth(i).unwrap_or(Value::Null)),
                Err(_) => Err(CourierError::Property {
                    property: name.to_string(),
                    kind: "list",
                }),
            },
            other => Err(CourierError::Property {
                property: name.to_string(),
                kind: other.kind_name(),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scope::{IterationScope, Variables};
    use crate::template::compile;
    use serde::Serialize;

    #[derive(Serialize)]
    struct User {
        name: String,
    }

    fn render(t: &str, vars: &Variables, args: &[Value]) -> Result<String, CourierError> {
        let codecs = Codecs::default();
        let filters = FilterRegistry::default();
        let r = Renderer::new(&codecs, &filters);
        let scope = ScopeChain::root(vars);
        r.render(&compile(t).unwrap(), &scope, args)
    }

    #[test]
    fn renders_variables_and_positionals() {
        let vars = Variables::new().with("host", "api.example").with("id", 7);
        let out = render("http://${host}/users/${id}?q=${0}", &vars, &[Value::from("x")]).unwrap();
        assert_eq!(out, "http://api.example/users/7?q=x");
    }

    #[test]
    fn literal_template_ignores_scope() {
        let vars = Variables::new();
        assert_eq!(render("/plain", &vars, &[]).unwrap(), "/plain");
        assert_eq!(render("", &vars, &[]).unwrap(), "");
    }

    #[test]
    fn undefined_variable_and_bad_index_fail() {
        let vars = Variables::new();
        assert!(matches!(
            render("${nope}", &vars, &[]),
            Err(CourierError::UndefinedVariable { .. })
        ));
        assert!(matches!(
            render("${2}", &vars, &[Value::Null]),
            Err(CourierError::ArgumentOutOfRange { index: 2, len: 1 })
        ));
    }

    #[test]
    fn property_paths_and_inline_filters() {
        let vars = Variables::new()
            .with("user", Value::object(User { name: " ann ".into() }))
            .with("m", Value::map([("k", "v")]));
        assert_eq!(
            render("${user.name | trim | upper}-${m.k}-${m.missing}", &vars, &[]).unwrap(),
            "ANN-v-"
        );
        assert!(matches!(
            render("${m.k.deeper}", &vars, &[]),
            Err(CourierError::Property { kind: "text", .. })
        ));
    }

    #[test]
    fn structured_values_render_as_json() {
        let vars = Variables::new().with("ids", Value::list([1, 2]));
        assert_eq!(render("${ids}", &vars, &[]).unwrap(), "[1,2]");
    }

    #[test]
    fn iteration_markers_need_an_iteration_scope() {
        let codecs = Codecs::default();
        let filters = FilterRegistry::default();
        let r = Renderer::new(&codecs, &filters);
        let vars = Variables::new();
        let root = ScopeChain::root(&vars);
        let t = compile("username_${_index}=${_it}").unwrap();
        assert!(matches!(
            r.render(&t, &root, &[]),
            Err(CourierError::UndefinedVariable { name }) if name == "_index"
        ));
        let it = IterationScope {
            item: Value::from("bar"),
            index: 1,
        };
        let scope = root.child(&it);
        assert_eq!(r.render(&t, &scope, &[]).unwrap(), "username_1=bar");
    }
}
