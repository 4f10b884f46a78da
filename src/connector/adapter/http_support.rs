use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use tracing::warn;

use crate::domain::DomainError;

/// Environment variable holding the bearer token for every backend call.
pub const BEARER_TOKEN_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

pub(crate) fn bearer_token_from_env() -> Option<String> {
    std::env::var(BEARER_TOKEN_ENV)
        .ok()
        .filter(|t| !t.trim().is_empty())
}

/// `base` with `segments` appended, each percent-encoded.
pub(crate) fn endpoint_url<I>(base: &Url, segments: I) -> Result<Url, DomainError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| DomainError::configuration(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url, DomainError> {
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| DomainError::configuration(format!("invalid endpoint URL {raw}: {e}")))
}

pub(crate) fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Timeouts, throttling and server-side faults may clear up on their own.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Error for a non-success `status`: transient when retryable, a backend
/// error otherwise.
pub(crate) fn status_error(context: &str, status: StatusCode, message: &str) -> DomainError {
    let msg = format!("{context}: {status}: {message}");
    if is_retryable_status(status) {
        DomainError::transient(msg)
    } else {
        DomainError::backend(msg)
    }
}

pub(crate) fn transport_error(context: &str, error: reqwest::Error) -> DomainError {
    DomainError::transient(format!("{context}: request failed: {error}"))
}

/// Send `request`. Transport failures and retryable statuses come back as
/// transient errors, other statuses as backend errors carrying the
/// service's own message.
pub(crate) async fn send(request: RequestBuilder, context: &str) -> Result<Response, DomainError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(context, e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("{context}: service returned {status}: {body}");
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("Message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);
    Err(status_error(context, status, &message))
}

pub(crate) async fn json_body(response: Response, context: &str) -> Result<Value, DomainError> {
    response
        .json()
        .await
        .map_err(|e| DomainError::backend(format!("{context}: failed to parse response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_percent_encoded() {
        let base = parse_base_url("https://runtime.example.com/").unwrap();
        let url = endpoint_url(&base, ["model", "us.anthropic.claude:0", "converse"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://runtime.example.com/model/us.anthropic.claude:0/converse"
        );

        let arn = "arn:aws:bedrock:us-east-1:123:async-invoke/abc";
        let url = endpoint_url(&base, ["async-invoke", arn]).unwrap();
        assert!(url.path().ends_with("async-invoke%2Fabc"));
    }

    #[test]
    fn trailing_empty_segment_yields_trailing_slash() {
        let base = parse_base_url("https://agent.example.com").unwrap();
        let url = endpoint_url(&base, ["knowledgebases", ""]).unwrap();
        assert_eq!(url.path(), "/knowledgebases/");
    }

    #[test]
    fn retryable_statuses_are_transient() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(status_error("get-async-invoke", status, "busy").is_transient());
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = status_error(
            "get-async-invoke",
            StatusCode::NOT_FOUND,
            "ResourceNotFoundException",
        );
        assert!(err.is_backend_error());
        assert_eq!(
            err.detail(),
            "get-async-invoke: 404 Not Found: ResourceNotFoundException"
        );
        assert!(status_error("head", StatusCode::FORBIDDEN, "").is_backend_error());
    }

    #[test]
    fn invalid_base_is_a_configuration_error() {
        assert!(parse_base_url("not a url").unwrap_err().is_configuration_error());
    }
}
