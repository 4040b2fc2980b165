use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use std::sync::Arc;

use crate::descriptor::ParamKind;
use crate::error::FxError;
use crate::value::{ObjectValue, Value};

pub(crate) mod json;

pub use json::SerdeJsonConverter;

/// Structured value <-> JSON text.
pub trait JsonConverter: Send + Sync + 'static {
    fn encode(&self, value: &Value) -> Result<String, FxError>;
    /// Parses `text` into a value shaped for a parameter of kind `shape`.
    fn decode(&self, text: &str, shape: ParamKind) -> Result<Value, FxError>;
}

/// Structured value <-> XML text. No implementation ships by default.
pub trait XmlConverter: Send + Sync + 'static {
    fn encode(&self, value: &Value) -> Result<String, FxError>;
    fn decode(&self, text: &str, shape: ParamKind) -> Result<Value, FxError>;
}

/// Decomposes an object argument into its named properties.
pub trait PropertyAccessor: Send + Sync + 'static {
    fn object_to_map(&self, object: &ObjectValue) -> Result<Vec<(String, Value)>, FxError>;
}

/// Converters in effect for one client.
#[derive(Clone)]
pub struct Codecs {
    pub json: Arc<dyn JsonConverter>,
    pub xml: Option<Arc<dyn XmlConverter>>,
    pub properties: Arc<dyn PropertyAccessor>,
}

impl Default for Codecs {
    fn default() -> Self {
        let serde = Arc::new(SerdeJsonConverter);
        Self {
            json: serde.clone(),
            xml: None,
            properties: serde,
        }
    }
}

impl std::fmt::Debug for Codecs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codecs")
            .field("xml", &self.xml.is_some())
            .finish_non_exhaustive()
    }
}

impl Codecs {
    /// Canonical string of a value: scalars as-is, structured values as JSON.
    pub fn stringify(&self, value: &Value) -> Result<String, FxError> {
        match value.scalar_string() {
            Some(s) => Ok(s),
            None => self.json.encode(value),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Format {
    Binary,
    Text,
}

impl Format {
    pub fn for_content_type(ct: Option<&str>) -> Format {
        let Some(ct) = ct else {
            return Format::Text;
        };
        let ct = ct.to_ascii_lowercase();
        if ct.is_empty()
            || ct.starts_with("text/")
            || ct.contains("json")
            || ct.contains("xml")
            || ct.contains("x-www-form-urlencoded")
        {
            Format::Text
        } else {
            Format::Binary
        }
    }

    #[inline]
    pub fn is_text(self) -> bool {
        self == Format::Text
    }
}

pub(crate) fn format_bytes_for_debug(format: Format, bytes: &[u8], max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let (max_bytes, s0) = match format {
        Format::Text => {
            // lossy utf-8: at most 4 bytes per char
            let max_bytes = max_chars.saturating_mul(4).max(1);
            let n = bytes.len().min(max_bytes);
            (max_bytes, String::from_utf8_lossy(&bytes[..n]).to_string())
        }
        Format::Binary => {
            let max_bytes = max_chars.saturating_mul(3).div_ceil(4).max(1);
            let n = bytes.len().min(max_bytes);
            (max_bytes, STANDARD_NO_PAD.encode(&bytes[..n]))
        }
    };
    let mut s = truncate_for_debug(&s0, max_chars);
    if max_bytes < bytes.len() && !s.ends_with('…') {
        s.push('…');
    }
    s
}

pub(crate) fn truncate_for_debug(s: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    let mut it = s.chars();
    let mut out = String::new();
    for _ in 0..max_chars {
        match it.next() {
            Some(c) => out.push(c),
            None => return out,
        }
    }
    if it.next().is_some() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_follows_content_type() {
        assert_eq!(
            Format::for_content_type(Some("application/json; charset=utf-8")),
            Format::Text
        );
        assert_eq!(
            Format::for_content_type(Some("application/octet-stream")),
            Format::Binary
        );
        assert_eq!(Format::for_content_type(None), Format::Text);
    }

    #[test]
    fn debug_preview_truncates() {
        let s = format_bytes_for_debug(Format::Text, b"hello world", 5);
        assert_eq!(s, "hello…");
        assert_eq!(truncate_for_debug("abc", 10), "abc");
        assert_eq!(format_bytes_for_debug(Format::Binary, b"abc", 0), "");
    }

    #[test]
    fn stringify_uses_json_for_structured_values() {
        let codecs = Codecs::default();
        assert_eq!(codecs.stringify(&Value::Int(4)).unwrap(), "4");
        assert_eq!(
            codecs.stringify(&Value::list([1, 2])).unwrap(),
            "[1,2]"
        );
    }
}
