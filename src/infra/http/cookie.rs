use std::borrow::Cow;

use axum::{
    body::Bytes,
    extract::{Query, RawQuery},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use url::form_urlencoded;

use crate::application::error::HttpError;

const SOURCE: &str = "infra::http::cookie::set_cookie";

/// Cookie to set, bound from the query string or the request body.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NameValuePair {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Value")]
    pub value: String,
}

pub(super) async fn set_cookie_get(Query(pair): Query<NameValuePair>) -> Response {
    respond(pair)
}

pub(super) async fn set_cookie_post(
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    match pair_from_body(&headers, &body, query.as_deref()) {
        Ok(pair) => respond(pair),
        Err(err) => err.into_response(),
    }
}

fn respond(pair: NameValuePair) -> Response {
    match build_set_cookie(&pair) {
        Ok(cookie) => {
            let mut response = StatusCode::OK.into_response();
            response.headers_mut().append(header::SET_COOKIE, cookie);
            response
        }
        Err(err) => err.into_response(),
    }
}

/// Bind from a JSON or form body; an empty body falls back to the query string.
fn pair_from_body(
    headers: &HeaderMap,
    body: &[u8],
    query: Option<&str>,
) -> Result<NameValuePair, HttpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(query
            .map(|query| pair_from_pairs(form_urlencoded::parse(query.as_bytes())))
            .unwrap_or_default());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Ok(pair_from_pairs(form_urlencoded::parse(body)));
    }

    serde_json::from_slice(body).map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Request body could not be parsed",
            &err,
        )
    })
}

fn pair_from_pairs<'a>(pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>) -> NameValuePair {
    let mut pair = NameValuePair::default();
    for (key, value) in pairs {
        if key.eq_ignore_ascii_case("name") {
            pair.name = value.into_owned();
        } else if key.eq_ignore_ascii_case("value") {
            pair.value = value.into_owned();
        }
    }
    pair
}

/// `Set-Cookie` value for `pair`: URL-encoded value, `SameSite=None`, path `/`.
pub fn build_set_cookie(pair: &NameValuePair) -> Result<HeaderValue, HttpError> {
    let name = pair.name.trim();
    if name.is_empty() {
        return Err(HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Cookie name is required",
            "cookie name was blank",
        ));
    }
    if !name.bytes().all(is_token_byte) {
        return Err(HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid cookie name",
            format!("cookie name `{name}` contains separator or control characters"),
        ));
    }

    let value = escape_value(&pair.value);
    HeaderValue::from_str(&format!("{name}={value}; Path=/; SameSite=None")).map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid cookie",
            &err,
        )
    })
}

// RFC 6265 token characters.
fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_graphic()
        && !matches!(
            byte,
            b'(' | b')'
                | b'<'
                | b'>'
                | b'@'
                | b','
                | b';'
                | b':'
                | b'\\'
                | b'"'
                | b'/'
                | b'['
                | b']'
                | b'?'
                | b'='
                | b'{'
                | b'}'
        )
}

fn escape_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
