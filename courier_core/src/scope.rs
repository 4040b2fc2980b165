use std::collections::HashMap;

use crate::error::CourierError;
use crate::template::{INDEX_VAR, ITEM_VAR};
use crate::value::Value;

/// One layer of name resolution.
pub trait VariableScope {
    fn is_defined(&self, name: &str) -> bool;
    /// `Ok(None)` when this layer does not define `name`.
    fn lookup(&self, name: &str) -> Result<Option<Value>, CourierError>;
}

/// Plain name -> value layer, used for global and interface variables.
#[derive(Clone, Debug, Default)]
pub struct Variables {
    inner: HashMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.insert(name.into(), value.into())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.get(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl VariableScope for Variables {
    fn is_defined(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    fn lookup(&self, name: &str) -> Result<Option<Value>, CourierError> {
        Ok(self.inner.get(name).cloned())
    }
}

/// Binds `_it` and `_index` while a collection argument is expanded.
#[derive(Clone, Debug)]
pub struct IterationScope {
    pub item: Value,
    pub index: usize,
}

impl VariableScope for IterationScope {
    fn is_defined(&self, name: &str) -> bool {
        name == ITEM_VAR || name == INDEX_VAR
    }

    fn lookup(&self, name: &str) -> Result<Option<Value>, CourierError> {
        Ok(match name {
            ITEM_VAR => Some(self.item.clone()),
            INDEX_VAR => Some(Value::from(self.index)),
            _ => None,
        })
    }
}

/// Parent-linked chain of scopes. Lookups walk from the innermost layer
/// outwards; inner layers shadow outer ones.
#[derive(Clone, Copy)]
pub struct ScopeChain<'a> {
    layer: &'a dyn VariableScope,
    parent: Option<&'a ScopeChain<'a>>,
}

impl<'a> ScopeChain<'a> {
    pub fn root(layer: &'a dyn VariableScope) -> Self {
        Self {
            layer,
            parent: None,
        }
    }

    pub fn child<'b>(&'b self, layer: &'b dyn VariableScope) -> ScopeChain<'b>
    where
        'a: 'b,
    {
        ScopeChain {
            layer,
            parent: Some(self),
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        let mut link = Some(self);
        while let Some(scope) = link {
            if scope.layer.is_defined(name) {
                return true;
            }
            link = scope.parent;
        }
        false
    }

    pub fn resolve(&self, name: &str) -> Result<Value, CourierError> {
        let mut link = Some(self);
        while let Some(scope) = link {
            if let Some(v) = scope.layer.lookup(name)? {
                return Ok(v);
            }
            link = scope.parent;
        }
        Err(CourierError::UndefinedVariable {
            name: name.to_string(),
        })
    }

    pub fn depth(&self) -> usize {
        1 + self.parent.map_or(0, ScopeChain::depth)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inner_layers_shadow_outer_ones() {
        let global = Variables::new().with("host", "a.example").with("v", 1);
        let iface = Variables::new().with("v", 2);
        let root = ScopeChain::root(&global);
        let chain = root.child(&iface);
        assert_eq!(chain.resolve("v").unwrap(), Value::Int(2));
        assert_eq!(chain.resolve("host").unwrap(), Value::Text("a.example".into()));
        assert_eq!(chain.depth(), 2);
    }

    #[test]
    fn undefined_names_are_errors() {
        let global = Variables::new();
        let chain = ScopeChain::root(&global);
        assert!(!chain.is_defined("missing"));
        let e = chain.resolve("missing").unwrap_err();
        assert!(matches!(e, CourierError::UndefinedVariable { name } if name == "missing"));
    }

    #[test]
    fn null_values_still_shadow() {
        let global = Variables::new().with("x", "outer");
        let inner = Variables::new().with("x", Value::Null);
        let root = ScopeChain::root(&global);
        let chain = root.child(&inner);
        assert!(chain.resolve("x").unwrap().is_null());
    }

    #[test]
    fn iteration_scope_defines_markers() {
        let global = Variables::new();
        let root = ScopeChain::root(&global);
        let it = IterationScope {
            item: Value::from("bar"),
            index: 1,
        };
        let chain = root.child(&it);
        assert_eq!(chain.resolve(ITEM_VAR).unwrap(), Value::Text("bar".into()));
        assert_eq!(chain.resolve(INDEX_VAR).unwrap(), Value::Int(1));
        assert!(!root.is_defined(ITEM_VAR));
    }
}
