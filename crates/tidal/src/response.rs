use crate::error::Error;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE, SERVER};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;

/// Categorical outcome of a catalog or CDN response.
///
/// Rate limiting is detected two ways: a plain 429, and the S3-fronted CDN's
/// 403 with an XML `AccessDenied` body, which is indistinguishable from
/// throttling by status alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Disposition {
    Success,
    Unauthorized(String),
    RateLimited,
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFailure {
    status: u16,
    sub_status: u32,
    #[serde(default)]
    user_message: Option<String>,
}

const EXPIRED_TOKEN_SUB_STATUS: u32 = 11002;
const INVALID_TOKEN_SUB_STATUS: u32 = 11003;

pub(crate) fn classify(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Disposition {
    if status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT {
        return Disposition::Success;
    }

    if status == StatusCode::UNAUTHORIZED {
        if let Ok(failure) = serde_json::from_slice::<ApiFailure>(body) {
            if failure.status == 401
                && matches!(
                    failure.sub_status,
                    EXPIRED_TOKEN_SUB_STATUS | INVALID_TOKEN_SUB_STATUS
                )
            {
                return Disposition::Unauthorized(failure.user_message.unwrap_or_default());
            }
        }
        return Disposition::Other;
    }

    if status == StatusCode::FORBIDDEN && is_s3_access_denied(headers, body) {
        return Disposition::RateLimited;
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Disposition::RateLimited;
    }

    Disposition::Other
}

fn is_s3_access_denied(headers: &HeaderMap, body: &[u8]) -> bool {
    let header_contains = |name, needle: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains(needle))
    };
    if !header_contains(CONTENT_TYPE, "application/xml") || !header_contains(SERVER, "AmazonS3") {
        return false;
    }

    let Ok(text) = std::str::from_utf8(body) else {
        return false;
    };
    let Ok(doc) = roxmltree::Document::parse(text) else {
        return false;
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Error" {
        return false;
    }
    let child_text = |name: &str| {
        root.children()
            .find(|n| n.tag_name().name() == name)
            .and_then(|n| n.text())
    };
    child_text("Code") == Some("AccessDenied") && child_text("Message") == Some("Access Denied")
}

/// Maps a classified non-success response onto the error taxonomy.
pub(crate) fn ensure_success(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), Error> {
    match classify(status, headers, body) {
        Disposition::Success => Ok(()),
        Disposition::Unauthorized(message) => Err(Error::Unauthorized(message)),
        Disposition::RateLimited => Err(Error::RateLimited),
        Disposition::Other => Err(Error::UnexpectedResponse {
            status: status.as_u16(),
            tail: body_tail(body),
        }),
    }
}

/// Sends a request, mapping a per-request timeout to `DeadlineExceeded`.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, Error> {
    match request.send().await {
        Ok(response) => Ok(response),
        Err(e) if e.is_timeout() => Err(Error::DeadlineExceeded),
        Err(e) => Err(Error::Request(e)),
    }
}

/// Drains a response into `(status, headers, body)`, with the same timeout
/// mapping as [`send`] for the body read.
pub(crate) async fn read(response: Response) -> Result<(StatusCode, HeaderMap, Bytes), Error> {
    let status = response.status();
    let headers = response.headers().clone();
    match response.bytes().await {
        Ok(body) => Ok((status, headers, body)),
        Err(e) if e.is_timeout() => Err(Error::DeadlineExceeded),
        Err(e) => Err(Error::Request(e)),
    }
}

const BODY_TAIL_LEN: usize = 256;

/// Last chunk of a response body, for error context without logging megabytes.
pub(crate) fn body_tail(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let start = text
        .char_indices()
        .rev()
        .nth(BODY_TAIL_LEN - 1)
        .map_or(0, |(i, _)| i);
    text[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn s3_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        headers.insert(SERVER, HeaderValue::from_static("AmazonS3"));
        headers
    }

    const S3_DENIED: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
        <Error><Code>AccessDenied</Code><Message>Access Denied</Message>\
        <RequestId>ABC</RequestId></Error>";

    #[test]
    fn success_statuses() {
        let headers = HeaderMap::new();
        assert_eq!(
            classify(StatusCode::OK, &headers, b""),
            Disposition::Success
        );
        assert_eq!(
            classify(StatusCode::PARTIAL_CONTENT, &headers, b""),
            Disposition::Success
        );
    }

    #[test]
    fn expired_token_body_is_unauthorized() {
        let body = br#"{"status":401,"subStatus":11002,"userMessage":"The token has expired."}"#;
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, &HeaderMap::new(), body),
            Disposition::Unauthorized("The token has expired.".into())
        );

        let body = br#"{"status":401,"subStatus":11003,"userMessage":"Invalid token."}"#;
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, &HeaderMap::new(), body),
            Disposition::Unauthorized(_)
        ));
    }

    #[test]
    fn unknown_401_is_other() {
        let body = br#"{"status":401,"subStatus":4,"userMessage":"nope"}"#;
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, &HeaderMap::new(), body),
            Disposition::Other
        );
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, &HeaderMap::new(), b"html"),
            Disposition::Other
        );
    }

    #[test]
    fn s3_access_denied_is_rate_limited() {
        assert_eq!(
            classify(StatusCode::FORBIDDEN, &s3_headers(), S3_DENIED.as_bytes()),
            Disposition::RateLimited
        );
    }

    #[test]
    fn genuine_forbidden_is_other() {
        // right body, wrong server header
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        assert_eq!(
            classify(StatusCode::FORBIDDEN, &headers, S3_DENIED.as_bytes()),
            Disposition::Other
        );

        // right headers, wrong body
        assert_eq!(
            classify(
                StatusCode::FORBIDDEN,
                &s3_headers(),
                b"<Error><Code>NoSuchKey</Code><Message>x</Message></Error>"
            ),
            Disposition::Other
        );
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), b""),
            Disposition::RateLimited
        );
    }

    #[test]
    fn everything_else_is_other() {
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, &HeaderMap::new(), b"boom"),
            Disposition::Other
        );
    }

    #[test]
    fn body_tail_keeps_the_end() {
        let long = "a".repeat(300) + "tail";
        let tail = body_tail(long.as_bytes());
        assert_eq!(tail.len(), BODY_TAIL_LEN);
        assert!(tail.ends_with("tail"));

        assert_eq!(body_tail(b"short"), "short");
    }
}
