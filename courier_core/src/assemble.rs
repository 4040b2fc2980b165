//! [`RequestDraft`] -> [`BuiltRequest`]: URL with query, header map and
//! encoded body. Runs once per call; retries resend the same bytes.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT};
use http::HeaderMap;
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::binder::parse_header_line;
use crate::descriptor::ParamKind;
use crate::draft::{NameValueEntry, RequestDraft};
use crate::error::CourierError;
use crate::transport::{BuiltRequest, RequestMeta};
use crate::value::Value;

pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

impl BuiltRequest {
    /// Encodes `draft` for the transport, with `meta.attempt == 0`.
    pub fn from_draft(draft: &RequestDraft) -> Result<BuiltRequest, CourierError> {
        build_request(draft)
    }
}

pub(crate) fn build_request(draft: &RequestDraft) -> Result<BuiltRequest, CourierError> {
    let url = build_url(draft)?;
    let (body, implied_ct) = encode_body(draft)?;
    let mut headers = build_headers(draft)?;
    let content_type = match (draft.content_type(), implied_ct) {
        // a multipart type declared without its boundary takes the generated one
        (Some(declared), Some(implied))
            if boundary_of(declared).is_none() && boundary_of(&implied).is_some() =>
        {
            Some(implied)
        }
        (Some(declared), _) => Some(declared.to_string()),
        (None, implied) => implied,
    };
    if let Some(ct) = content_type {
        headers.insert(CONTENT_TYPE, header_value(CONTENT_TYPE.as_str(), &ct)?);
    }
    Ok(BuiltRequest {
        meta: RequestMeta {
            interface: draft.interface().to_string(),
            method_name: draft.method_name().to_string(),
            method: draft.method().clone(),
            attempt: 0,
        },
        url,
        headers,
        body,
        timeout: draft.timeout(),
    })
}

fn encode(s: &str) -> String {
    byte_serialize(s.as_bytes()).collect()
}

fn pair(name: &str, value: &str, url_encode: bool) -> String {
    if url_encode {
        format!("{}={}", encode(name), encode(value))
    } else {
        format!("{name}={value}")
    }
}

/// Query entries are appended after any query already in the URL.
fn build_url(draft: &RequestDraft) -> Result<Url, CourierError> {
    let mut url = Url::parse(draft.url())?;
    let mut query = url.query().unwrap_or("").to_string();
    for e in draft.query() {
        let value = draft.stringify(&e.value)?;
        let piece = match &e.name {
            Some(name) => pair(name, &value, e.url_encode),
            None => value,
        };
        if piece.is_empty() {
            continue;
        }
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&piece);
    }
    url.set_query((!query.is_empty()).then_some(query.as_str()));
    Ok(url)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, CourierError> {
    HeaderValue::from_str(value).map_err(|_| CourierError::InvalidHeader {
        name: name.to_string(),
    })
}

fn build_headers(draft: &RequestDraft) -> Result<HeaderMap, CourierError> {
    let mut headers = HeaderMap::with_capacity(draft.headers().len() + 3);
    for e in draft.headers() {
        let value = draft.stringify(&e.value)?;
        let (name, value) = match &e.name {
            Some(name) => (name.as_str(), value.as_str()),
            None => parse_header_line(&value).ok_or_else(|| CourierError::InvalidHeader {
                name: value.clone(),
            })?,
        };
        let hn = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| {
            CourierError::InvalidHeader {
                name: name.to_string(),
            }
        })?;
        let hv = header_value(name, value)?;
        headers.append(hn, hv);
    }
    if let Some(enc) = draft.content_encoding() {
        headers.insert(CONTENT_ENCODING, header_value(CONTENT_ENCODING.as_str(), enc)?);
    }
    if let Some(ua) = draft.user_agent()
        && !headers.contains_key(USER_AGENT)
    {
        headers.insert(USER_AGENT, header_value(USER_AGENT.as_str(), ua)?);
    }
    Ok(headers)
}

enum BodyKind {
    Multipart,
    Json,
    Xml,
    Form,
}

fn body_kind(draft: &RequestDraft) -> BodyKind {
    if !draft.multiparts().is_empty() {
        return BodyKind::Multipart;
    }
    let ct = draft.content_type().unwrap_or("").to_ascii_lowercase();
    if ct.starts_with("multipart/") {
        BodyKind::Multipart
    } else if ct.contains("json") {
        BodyKind::Json
    } else if ct.contains("xml") {
        BodyKind::Xml
    } else {
        BodyKind::Form
    }
}

/// Encoded body plus the content type implied by the encoding when the
/// draft declares none.
fn encode_body(draft: &RequestDraft) -> Result<(Option<Bytes>, Option<String>), CourierError> {
    let entries: Vec<&NameValueEntry> = draft.body().collect();
    if entries.is_empty() && draft.multiparts().is_empty() {
        return Ok((None, None));
    }
    match body_kind(draft) {
        BodyKind::Multipart => encode_multipart(draft, &entries),
        BodyKind::Json => encode_json(draft, &entries).map(|b| (Some(b), None)),
        BodyKind::Xml => encode_xml(draft, &entries).map(|b| (Some(b), None)),
        BodyKind::Form => encode_form(draft, &entries),
    }
}

/// A lone unnamed text fragment is sent verbatim.
fn verbatim<'a>(entries: &[&'a NameValueEntry]) -> Option<&'a Value> {
    match entries {
        [e] if e.is_fragment() => Some(&e.value),
        _ => None,
    }
}

fn encode_json(draft: &RequestDraft, entries: &[&NameValueEntry]) -> Result<Bytes, CourierError> {
    let codecs = &draft.codecs;
    if let Some(v) = verbatim(entries) {
        return match v {
            Value::Text(s) => Ok(Bytes::from(s.clone())),
            Value::Bytes(b) => Ok(b.clone()),
            other => codecs
                .json
                .encode(other)
                .map(Bytes::from)
                .map_err(CourierError::BodyEncoding),
        };
    }
    let mut fields: Vec<(String, Value)> = Vec::with_capacity(entries.len());
    for e in entries {
        match (&e.name, &e.value) {
            (Some(name), v) => fields.push((name.clone(), v.clone())),
            (None, Value::Map(m)) => fields.extend(m.iter().cloned()),
            (None, Value::Object(o)) => fields.extend(
                codecs
                    .properties
                    .object_to_map(o)
                    .map_err(CourierError::BodyEncoding)?,
            ),
            (None, Value::Text(s)) => match codecs.json.decode(s, ParamKind::Map) {
                Ok(Value::Map(m)) => fields.extend(m),
                _ => {
                    return Err(CourierError::body_encoding(format!(
                        "body fragment is not a JSON object: {s}"
                    )));
                }
            },
            (None, other) => {
                return Err(CourierError::body_encoding(format!(
                    "cannot merge a {} into a JSON body",
                    other.kind_name()
                )));
            }
        }
    }
    codecs
        .json
        .encode(&Value::Map(fields))
        .map(Bytes::from)
        .map_err(CourierError::BodyEncoding)
}

fn encode_xml(draft: &RequestDraft, entries: &[&NameValueEntry]) -> Result<Bytes, CourierError> {
    if let Some(Value::Text(s)) = verbatim(entries) {
        return Ok(Bytes::from(s.clone()));
    }
    let Some(xml) = draft.codecs.xml.as_ref() else {
        return Err(CourierError::body_encoding("no XML converter configured"));
    };
    let value = match verbatim(entries) {
        Some(v) => v.clone(),
        None => Value::Map(
            entries
                .iter()
                .filter_map(|e| e.name.clone().map(|n| (n, e.value.clone())))
                .collect(),
        ),
    };
    xml.encode(&value)
        .map(Bytes::from)
        .map_err(CourierError::BodyEncoding)
}

fn encode_form(
    draft: &RequestDraft,
    entries: &[&NameValueEntry],
) -> Result<(Option<Bytes>, Option<String>), CourierError> {
    if let Some(Value::Bytes(b)) = verbatim(entries) {
        return Ok((Some(b.clone()), None));
    }
    let mut out = String::new();
    let mut named = false;
    for e in entries {
        let value = draft.stringify(&e.value)?;
        let piece = match &e.name {
            Some(name) => {
                named = true;
                pair(name, &value, e.url_encode)
            }
            None => value,
        };
        if piece.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(&piece);
    }
    let implied = named.then(|| FORM_CONTENT_TYPE.to_string());
    Ok((Some(Bytes::from(out)), implied))
}

pub(crate) fn boundary_of(content_type: &str) -> Option<&str> {
    content_type.split(';').find_map(|p| {
        let (k, v) = p.trim().split_once('=')?;
        k.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| v.trim().trim_matches('"'))
    })
}

fn encode_multipart(
    draft: &RequestDraft,
    entries: &[&NameValueEntry],
) -> Result<(Option<Bytes>, Option<String>), CourierError> {
    let (boundary, implied) = match draft.content_type() {
        None => {
            let b = uuid::Uuid::new_v4().simple().to_string();
            let ct = format!("multipart/form-data; boundary={b}");
            (b, Some(ct))
        }
        Some(ct) if !ct.to_ascii_lowercase().starts_with("multipart/") => {
            return Err(CourierError::body_encoding(format!(
                "multipart body cannot be sent as `{ct}`"
            )));
        }
        Some(ct) => match boundary_of(ct) {
            Some(b) => (b.to_string(), None),
            None => {
                let b = uuid::Uuid::new_v4().simple().to_string();
                let with_boundary = format!("{ct}; boundary={b}");
                (b, Some(with_boundary))
            }
        },
    };
    let mut buf = BytesMut::new();
    for e in entries {
        let Some(name) = &e.name else {
            return Err(CourierError::body_encoding(
                "unnamed body fragment in a multipart request",
            ));
        };
        let value = draft.stringify(&e.value)?;
        put_part_head(&mut buf, &boundary, name, None, e.content_type.as_deref());
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    for part in draft.multiparts() {
        put_part_head(
            &mut buf,
            &boundary,
            &part.name,
            part.file_name.as_deref(),
            part.content_type.as_deref(),
        );
        buf.put_slice(&part.data);
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(format!("--{boundary}--\r\n").as_bytes());
    Ok((Some(buf.freeze()), implied))
}

fn put_part_head(
    buf: &mut BytesMut,
    boundary: &str,
    name: &str,
    file_name: Option<&str>,
    content_type: Option<&str>,
) {
    buf.put_slice(format!("--{boundary}\r\n").as_bytes());
    let mut disposition = format!("Content-Disposition: form-data; name=\"{name}\"");
    if let Some(f) = file_name {
        disposition.push_str(&format!("; filename=\"{f}\""));
    }
    buf.put_slice(disposition.as_bytes());
    buf.put_slice(b"\r\n");
    if let Some(ct) = content_type {
        buf.put_slice(format!("Content-Type: {ct}\r\n").as_bytes());
    }
    buf.put_slice(b"\r\n");
}
