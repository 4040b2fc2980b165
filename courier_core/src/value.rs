use crate::callback::Callback;
use crate::error::FxError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Call-time argument value.
///
/// Every argument handed to an interface method is lowered into one of these
/// shapes before synthesis; the parameter binder dispatches on the variant.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw bytes. Never expanded element-wise.
    Bytes(Bytes),
    List(Vec<Value>),
    /// String-keyed map; insertion order is preserved.
    Map(Vec<(String, Value)>),
    Object(ObjectValue),
    Callback(Callback),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn bytes(b: impl Into<Bytes>) -> Self {
        Value::Bytes(b.into())
    }

    pub fn object<T>(v: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Value::Object(ObjectValue::new(v))
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Callback(_) => "callback",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical string form of scalar values; `None` for structured ones.
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::List(_) | Value::Map(_) | Value::Object(_) | Value::Callback(_) => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Text(_) | Value::Bytes(_)
        )
    }

    /// Map/object entry lookup. Missing keys read as `Null`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, FxError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| format!("non-finite float {f} cannot be encoded"))?,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Map(entries) => {
                let mut out = serde_json::Map::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k.clone(), v.to_json()?);
                }
                serde_json::Value::Object(out)
            }
            Value::Object(obj) => obj.to_json()?,
            Value::Callback(cb) => {
                return Err(format!("{:?} callback cannot be encoded", cb.kind()).into());
            }
        })
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Value::Object(obj) => write!(f, "Object({})", obj.type_name()),
            Value::Callback(cb) => write!(f, "Callback({:?})", cb.kind()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Callback(a), Value::Callback(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Type-erased serializable object argument.
pub trait ObjectArg: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;
    fn as_any(&self) -> &dyn Any;
}

impl<T> ObjectArg for T
where
    T: Serialize + Send + Sync + 'static,
{
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone)]
pub struct ObjectValue(Arc<dyn ObjectArg>);

impl ObjectValue {
    pub fn new<T>(v: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self(Arc::new(v))
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub fn to_json(&self) -> Result<serde_json::Value, FxError> {
        self.0.to_json().map_err(Into::into)
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &ObjectValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectValue({})", self.type_name())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! int_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}
int_from!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Float(v as f64),
        }
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl From<Callback> for Value {
    fn from(v: Callback) -> Self {
        Value::Callback(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(v: [T; N]) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json(v)
    }
}

/// Builds a call argument list: `args!["foo", 3, Value::Null]`.
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::prelude::Value>::new() };
    ($($v:expr),+ $(,)?) => {
        ::std::vec![$($crate::prelude::Value::from($v)),+]
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct User {
        username: String,
        age: u32,
    }

    #[test]
    fn scalar_strings_are_canonical() {
        assert_eq!(Value::from(12u32).scalar_string().as_deref(), Some("12"));
        assert_eq!(Value::from(false).scalar_string().as_deref(), Some("false"));
        assert_eq!(Value::from(1.5).scalar_string().as_deref(), Some("1.5"));
        assert_eq!(Value::Null.scalar_string().as_deref(), Some(""));
        assert!(Value::list(["a"]).scalar_string().is_none());
    }

    #[test]
    fn object_to_json_keeps_field_order() {
        let v = Value::object(User {
            username: "foo".into(),
            age: 3,
        });
        let json = v.to_json().unwrap();
        assert_eq!(json.to_string(), r#"{"username":"foo","age":3}"#);
        match &v {
            Value::Object(o) => {
                assert_eq!(o.downcast_ref::<User>().map(|u| u.age), Some(3));
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn json_round_trip_preserves_map_order() {
        let json: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":[true,null]}"#).unwrap();
        let v = Value::from_json(json);
        assert_eq!(
            v,
            Value::map([
                ("b", Value::Int(1)),
                ("a", Value::List(vec![Value::Bool(true), Value::Null])),
            ])
        );
    }

    #[test]
    fn args_macro_lowers_every_argument() {
        let a = crate::args!["foo", 3, Value::Null, vec!["x", "y"]];
        assert_eq!(a.len(), 4);
        assert_eq!(a[0], Value::Text("foo".into()));
        assert_eq!(a[1], Value::Int(3));
        assert!(a[2].is_null());
        assert_eq!(a[3], Value::list(["x", "y"]));
    }
}
