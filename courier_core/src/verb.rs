use http::Method;

use crate::descriptor::Target;
use crate::error::CourierError;

const SUPPORTED: [Method; 8] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

/// Case-insensitive lookup in the supported verb vocabulary.
pub fn parse_method(s: &str) -> Result<Method, CourierError> {
    let s = s.trim();
    SUPPORTED
        .iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(s))
        .cloned()
        .ok_or_else(|| CourierError::UnsupportedMethod(s.to_string()))
}

/// First word of a camelCase or snake_case identifier.
pub fn first_word(name: &str) -> &str {
    let name = name.trim_start_matches('_');
    let end = name
        .char_indices()
        .skip(1)
        .find(|(_, c)| c.is_uppercase() || *c == '_')
        .map_or(name.len(), |(i, _)| i);
    &name[..end]
}

/// Verb implied by an interface method name: `getUser` -> GET,
/// `deleteAll` -> DELETE, `fetch` -> GET.
pub fn infer_method(method_name: &str) -> Method {
    parse_method(first_word(method_name)).unwrap_or(Method::GET)
}

/// Where an argument with an unspecified target lands for this verb.
pub fn default_param_target(method: &Method) -> Target {
    match *method {
        Method::GET | Method::HEAD | Method::DELETE | Method::OPTIONS | Method::TRACE => {
            Target::Query
        }
        _ => Target::Body,
    }
}
