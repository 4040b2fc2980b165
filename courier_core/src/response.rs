use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::codec::Codecs;
use crate::descriptor::{DataType, ParamKind};
use crate::error::{CourierError, body_as_text};
use crate::transport::RequestMeta;
use crate::value::Value;

/// Fully read response of an executed call.
#[derive(Clone, Debug)]
pub struct Response {
    pub meta: RequestMeta,
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub(crate) data_type: DataType,
}

impl Response {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(http::header::CONTENT_TYPE.as_str())
    }

    pub fn text(&self) -> Result<String, CourierError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| self.decode_error(e))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CourierError> {
        serde_json::from_slice(&self.body).map_err(|e| self.decode_error(e))
    }

    /// Body decoded per the request's data type. `Auto` picks from the
    /// response content type.
    pub fn value(&self, codecs: &Codecs) -> Result<Value, CourierError> {
        let data_type = match self.data_type {
            DataType::Auto => {
                let ct = self.content_type().unwrap_or("").to_ascii_lowercase();
                if ct.contains("json") {
                    DataType::Json
                } else if ct.contains("xml") {
                    DataType::Xml
                } else if crate::codec::Format::for_content_type(Some(&ct)).is_text() {
                    DataType::Text
                } else {
                    DataType::Binary
                }
            }
            dt => dt,
        };
        match data_type {
            DataType::Binary => Ok(Value::Bytes(self.body.clone())),
            DataType::Text | DataType::Auto => self.text().map(Value::Text),
            DataType::Json => {
                if self.body.is_empty() {
                    return Ok(Value::Null);
                }
                let text = self.text()?;
                codecs
                    .json
                    .decode(&text, ParamKind::Scalar)
                    .map_err(|e| self.decode_error(e))
            }
            DataType::Xml => {
                let text = self.text()?;
                let xml = codecs
                    .xml
                    .as_ref()
                    .ok_or_else(|| self.decode_error("no XML converter configured"))?;
                xml.decode(&text, ParamKind::Scalar)
                    .map_err(|e| self.decode_error(e))
            }
        }
    }

    fn decode_error(&self, e: impl Into<crate::error::FxError>) -> CourierError {
        CourierError::Decode {
            source: e.into(),
            body: body_as_text(&self.headers, &self.body, None),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use http::Method;

    fn response(ct: &str, body: &'static [u8], data_type: DataType) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_str(ct).unwrap(),
        );
        Response {
            meta: RequestMeta {
                interface: "Api".into(),
                method_name: "get".into(),
                method: Method::GET,
                attempt: 0,
            },
            url: Url::parse("http://localhost/").unwrap(),
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body),
            data_type,
        }
    }

    #[test]
    fn auto_data_type_follows_content_type() {
        let codecs = Codecs::default();
        let r = response("application/json", br#"{"id":1}"#, DataType::Auto);
        assert_eq!(r.value(&codecs).unwrap(), Value::map([("id", 1)]));
        let r = response("text/plain", b"hi", DataType::Auto);
        assert_eq!(r.value(&codecs).unwrap(), Value::Text("hi".into()));
        let r = response("image/png", b"\x89PNG", DataType::Auto);
        assert!(matches!(r.value(&codecs).unwrap(), Value::Bytes(_)));
    }

    #[test]
    fn explicit_data_type_wins() {
        let codecs = Codecs::default();
        let r = response("text/plain", b"[1,2]", DataType::Json);
        assert_eq!(r.value(&codecs).unwrap(), Value::list([1, 2]));
        let r = response("text/plain", b"<a/>", DataType::Xml);
        assert!(matches!(r.value(&codecs), Err(CourierError::Decode { .. })));
    }

    #[test]
    fn typed_json() {
        #[derive(serde::Deserialize)]
        struct Id {
            id: u32,
        }
        let r = response("application/json", br#"{"id":9}"#, DataType::Auto);
        assert_eq!(r.json::<Id>().unwrap().id, 9);
        assert!(r.json::<Vec<u8>>().is_err());
    }
}
