use reqwest::{
    header::{self, HeaderMap},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{Body, ClientError};

pub(crate) fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(value) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let media_type = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media_type == "application/json" || media_type.ends_with("+json")
}

/// Parses a buffered body according to status and declared content type.
pub(crate) fn parse_body(
    status: StatusCode,
    headers: &HeaderMap,
    bytes: &[u8],
) -> Result<Body, ClientError> {
    if status == StatusCode::NO_CONTENT {
        return Ok(Body::Empty);
    }

    if is_json_content_type(headers) {
        return serde_json::from_slice(bytes)
            .map(Body::Json)
            .map_err(|err| ClientError::Decode {
                status: status.as_u16(),
                message: format!(
                    "invalid JSON response body: {err}; body: {}",
                    String::from_utf8_lossy(bytes)
                ),
                response: None,
            });
    }

    Ok(Body::Text(String::from_utf8_lossy(bytes).into_owned()))
}

/// Converts a parsed body into the caller's type.
///
/// Text bodies are offered to `T` as a JSON string.
pub(crate) fn decode_data<T: DeserializeOwned>(body: &Body) -> Result<Option<T>, serde_json::Error> {
    match body {
        Body::Empty => Ok(None),
        Body::Json(value) => <T as Deserialize>::deserialize(value).map(Some),
        Body::Text(text) => {
            <T as Deserialize>::deserialize(&serde_json::Value::String(text.clone())).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{
        header::{self, HeaderMap, HeaderValue},
        StatusCode,
    };
    use serde::Deserialize;
    use serde_json::json;

    use super::{decode_data, is_json_content_type, parse_body};
    use crate::{Body, ClientError};

    fn content_type(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        headers
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn detects_json_media_types() {
        assert!(is_json_content_type(&content_type("application/json")));
        assert!(is_json_content_type(&content_type(
            "Application/JSON; charset=utf-8"
        )));
        assert!(is_json_content_type(&content_type("application/problem+json")));
        assert!(!is_json_content_type(&content_type("text/plain")));
        assert!(!is_json_content_type(&HeaderMap::new()));
    }

    #[test]
    fn no_content_parses_to_empty_even_with_json_content_type() {
        let body = parse_body(
            StatusCode::NO_CONTENT,
            &content_type("application/json"),
            b"",
        )
        .expect("204 must parse");
        assert_eq!(body, Body::Empty);
        assert_eq!(decode_data::<User>(&body).expect("must decode"), None);
    }

    #[test]
    fn json_body_decodes_into_typed_data() {
        let body = parse_body(
            StatusCode::OK,
            &content_type("application/json"),
            br#"{"id":7,"name":"Kit"}"#,
        )
        .expect("json must parse");
        assert_eq!(body, Body::Json(json!({"id": 7, "name": "Kit"})));
        assert_eq!(
            decode_data::<User>(&body).expect("must decode"),
            Some(User {
                id: 7,
                name: "Kit".to_owned()
            })
        );
    }

    #[test]
    fn malformed_json_is_a_decode_error_with_status() {
        let err = parse_body(
            StatusCode::OK,
            &content_type("application/json"),
            b"{not json",
        )
        .expect_err("malformed JSON must fail");
        assert!(matches!(err, ClientError::Decode { status: 200, .. }));
    }

    #[test]
    fn text_body_is_returned_raw() {
        let body = parse_body(StatusCode::OK, &content_type("text/plain"), b"pong")
            .expect("text must parse");
        assert_eq!(body.as_text(), Some("pong"));
        assert_eq!(
            decode_data::<String>(&body).expect("must decode"),
            Some("pong".to_owned())
        );
        assert_eq!(
            decode_data::<serde_json::Value>(&body).expect("must decode"),
            Some(json!("pong"))
        );
    }
}
