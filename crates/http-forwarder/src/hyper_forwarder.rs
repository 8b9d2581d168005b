use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Duration;

use bytes::Bytes;
use http::method::InvalidMethod;
use http::uri::InvalidUri;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::Error as HyperError;
use hyper_util::client::legacy::{connect::Connect, Client, Error as HyperClientError};
use tracing::*;

use crate::model::{InboundRequest, OutboundResponse, UpstreamTarget};
use crate::query_string::encode_query;

/// Body type of every outbound request: the inbound body, buffered whole.
pub type ForwardBody = Full<Bytes>;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("InvalidMethod: {0}")]
    InvalidMethod(InvalidMethod),
    #[error("InvalidUri: {0}")]
    InvalidUri(InvalidUri),
    #[error("InvalidHeader: {0}")]
    InvalidHeader(String),
    #[error(transparent)]
    HyperClientError(HyperClientError),
    #[error(transparent)]
    HyperError(HyperError),
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<HyperError> for ForwardError {
    fn from(err: HyperError) -> ForwardError {
        ForwardError::HyperError(err)
    }
}

impl From<HyperClientError> for ForwardError {
    fn from(err: HyperClientError) -> ForwardError {
        ForwardError::HyperClientError(err)
    }
}

impl From<InvalidUri> for ForwardError {
    fn from(err: InvalidUri) -> ForwardError {
        ForwardError::InvalidUri(err)
    }
}

impl From<InvalidMethod> for ForwardError {
    fn from(err: InvalidMethod) -> ForwardError {
        ForwardError::InvalidMethod(err)
    }
}

impl ForwardError {
    /// Every failure is reported the same way, whatever caused it.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// The error and each of its sources, joined with `": "`.
    ///
    /// Client errors only say which stage failed, the OS-level reason (refused, reset,
    /// unknown host) sits further down the chain.
    pub fn message(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();

        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        message
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, ForwardError::HyperClientError(error) if error.is_connect())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ForwardError::Timeout(_))
    }
}

pub struct HyperForwarder<C> {
    client: Client<C, ForwardBody>,
}

impl<C: Clone> Clone for HyperForwarder<C> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<C> HyperForwarder<C> {
    pub fn new(client: Client<C, ForwardBody>) -> Self {
        Self { client }
    }

    pub async fn forward(
        &self,
        target: &UpstreamTarget,
        request: InboundRequest,
    ) -> Result<OutboundResponse, ForwardError>
    where
        C: Connect + Clone + Send + Sync + 'static,
    {
        call(target, request, &self.client).await
    }
}

/// The request path with the query parameters appended, if there are any.
pub fn compose_path(request: &InboundRequest) -> String {
    debug!("Building outbound path");

    let mut path = request.path.clone();

    if !request.query_parameters.is_empty() {
        let query = encode_query(
            request
                .query_parameters
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        );

        if !query.is_empty() {
            debug!("Adding query parts to path");

            path.push('?');
            path.push_str(&query);
        }
    }

    path
}

/// Inbound headers as given. Nothing is added, dropped or merged.
pub fn compose_headers(headers: &[(String, String)]) -> Result<HeaderMap, ForwardError> {
    let mut composed = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ForwardError::InvalidHeader(name.clone()))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| ForwardError::InvalidHeader(name.clone()))?;

        composed.append(header_name, header_value);
    }

    Ok(composed)
}

fn forward_uri(target: &UpstreamTarget, path: &str) -> Result<Uri, ForwardError> {
    let mut uri = String::with_capacity(8 + target.host.len() + 6 + path.len() + 1);

    uri.push_str("http://");
    uri.push_str(&target.authority());

    if !path.starts_with('/') {
        uri.push('/');
    }

    // A literal `#` would start a fragment and drop the rest of the path and the query.
    // The query is already encoded, so only the path part can carry one.
    for (index, part) in path.split('#').enumerate() {
        if index > 0 {
            uri.push_str("%23");
        }
        uri.push_str(part);
    }

    Ok(uri.parse::<Uri>()?)
}

pub fn create_outbound_request(
    target: &UpstreamTarget,
    request: InboundRequest,
) -> Result<Request<ForwardBody>, ForwardError> {
    info!("Creating outbound request");

    let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())?;
    let path = compose_path(&request);
    let uri = forward_uri(target, &path)?;
    let headers = compose_headers(&request.headers)?;

    info!(
        host = %target.host,
        port = target.port,
        path = %path,
        method = %method,
        headers = ?headers,
        "Outbound request options"
    );

    let body = match request.body {
        Some(body) if !body.is_empty() => {
            debug!("Writing {} byte request body", body.len());

            Full::new(Bytes::from(body))
        }
        _ => Full::new(Bytes::new()),
    };

    let mut outbound = Request::new(body);
    *outbound.method_mut() = method;
    *outbound.uri_mut() = uri;
    *outbound.headers_mut() = headers;

    Ok(outbound)
}

fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flattened = BTreeMap::new();

    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());

        match flattened.entry(name.as_str().to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(value.into_owned());
            }
            Entry::Occupied(mut entry) => {
                let joined: &mut String = entry.get_mut();
                joined.push_str(", ");
                joined.push_str(&value);
            }
        }
    }

    flattened
}

async fn create_outbound_response(
    response: Response<Incoming>,
) -> Result<OutboundResponse, ForwardError> {
    let (parts, body) = response.into_parts();

    debug!("Collecting upstream body");

    let bytes = body.collect().await?.to_bytes();

    Ok(OutboundResponse {
        status_code: parts.status.as_u16(),
        headers: flatten_headers(&parts.headers),
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

async fn exchange<C>(
    outbound: Request<ForwardBody>,
    client: &Client<C, ForwardBody>,
) -> Result<OutboundResponse, ForwardError>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let response = client.request(outbound).await?;

    debug!("Upstream responded with {}", response.status());

    create_outbound_response(response).await
}

pub async fn call<C>(
    target: &UpstreamTarget,
    request: InboundRequest,
    client: &Client<C, ForwardBody>,
) -> Result<OutboundResponse, ForwardError>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    info!(
        "Received forward call for {} {} to {}",
        request.method,
        request.path,
        target.authority()
    );

    let outbound = create_outbound_request(target, request)?;

    let response = match target.timeout {
        Some(limit) => tokio::time::timeout(limit, exchange(outbound, client))
            .await
            .unwrap_or_else(|_| Err(ForwardError::Timeout(limit))),
        None => exchange(outbound, client).await,
    };

    match &response {
        Ok(response) => debug!("Responding with status {}", response.status_code),
        Err(error) => error!("problem with request: {}", error.message()),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> UpstreamTarget {
        UpstreamTarget::new("lb.internal")
    }

    #[test]
    fn path_is_unchanged_without_query() {
        let request = InboundRequest::new("GET", "/v1/ping");

        assert_eq!(compose_path(&request), "/v1/ping");
    }

    #[test]
    fn path_gets_encoded_query() {
        let request = InboundRequest::new("GET", "/v1/items")
            .query("a", "1")
            .query("b", "x y");

        assert_eq!(compose_path(&request), "/v1/items?a=1&b=x%20y");
    }

    #[test]
    fn empty_headers_compose_to_empty_map() {
        let headers = compose_headers(&[]).unwrap();

        assert!(headers.is_empty());
    }

    #[test]
    fn headers_are_kept_verbatim() {
        let headers = compose_headers(&[
            ("Host".to_owned(), "api.example.com".to_owned()),
            ("Accept".to_owned(), "application/json".to_owned()),
            ("X-Tag".to_owned(), "one".to_owned()),
            ("x-tag".to_owned(), "two".to_owned()),
        ])
        .unwrap();

        assert_eq!(headers.len(), 4);
        assert_eq!(headers["host"], "api.example.com");
        assert_eq!(headers["accept"], "application/json");

        let tags: Vec<_> = headers.get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["one", "two"]);
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        let error = compose_headers(&[("bad header".to_owned(), "x".to_owned())]).unwrap_err();

        assert!(matches!(error, ForwardError::InvalidHeader(name) if name == "bad header"));
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let error = compose_headers(&[("x-bad".to_owned(), "a\nb".to_owned())]).unwrap_err();

        assert!(matches!(error, ForwardError::InvalidHeader(name) if name == "x-bad"));
    }

    #[test]
    fn outbound_request_targets_upstream() {
        let request = InboundRequest::new("POST", "/v1/items")
            .query("q", "a b")
            .header("content-type", "application/json")
            .body(r#"{"k":"v"}"#);

        let outbound = create_outbound_request(&target(), request).unwrap();

        assert_eq!(outbound.method(), Method::POST);
        assert_eq!(
            outbound.uri().to_string(),
            "http://lb.internal:80/v1/items?q=a%20b"
        );
        assert_eq!(outbound.headers()["content-type"], "application/json");
        assert_eq!(outbound.headers().len(), 1);
    }

    #[tokio::test]
    async fn outbound_request_carries_body() {
        let request = InboundRequest::new("POST", "/v1/items").body(r#"{"k":"v"}"#);

        let outbound = create_outbound_request(&target(), request).unwrap();
        let body = outbound.into_body().collect().await.unwrap().to_bytes();

        assert_eq!(&body[..], br#"{"k":"v"}"#);
    }

    #[tokio::test]
    async fn empty_body_is_not_written() {
        let request = InboundRequest::new("POST", "/v1/items").body("");

        let outbound = create_outbound_request(&target(), request).unwrap();
        let body = outbound.into_body().collect().await.unwrap().to_bytes();

        assert!(body.is_empty());
    }

    #[test]
    fn invalid_method_is_rejected() {
        let error = create_outbound_request(&target(), InboundRequest::new("GE T", "/")).unwrap_err();

        assert!(matches!(error, ForwardError::InvalidMethod(_)));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unescaped_path_is_rejected() {
        let error =
            create_outbound_request(&target(), InboundRequest::new("GET", "/a b")).unwrap_err();

        assert!(matches!(error, ForwardError::InvalidUri(_)));
    }

    #[test]
    fn hash_in_path_is_escaped_and_query_kept() {
        let request = InboundRequest::new("GET", "/files/a#b").query("v", "1");

        let outbound = create_outbound_request(&target(), request).unwrap();

        assert_eq!(outbound.uri().path(), "/files/a%23b");
        assert_eq!(outbound.uri().query(), Some("v=1"));
    }

    #[test]
    fn method_is_upper_cased() {
        let outbound =
            create_outbound_request(&target(), InboundRequest::new("get", "/ping")).unwrap();

        assert_eq!(outbound.method(), Method::GET);
    }

    #[test]
    fn relative_path_gets_leading_slash() {
        let outbound = create_outbound_request(&target(), InboundRequest::new("GET", "ping")).unwrap();

        assert_eq!(outbound.uri().path(), "/ping");
    }

    #[test]
    fn repeated_response_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        headers.append("Content-Type", HeaderValue::from_static("text/plain"));

        let flattened = flatten_headers(&headers);

        assert_eq!(flattened["set-cookie"], "a=1, b=2");
        assert_eq!(flattened["content-type"], "text/plain");
        assert_eq!(flattened.len(), 2);
    }

    #[test]
    fn timeout_message_names_the_limit() {
        let error = ForwardError::Timeout(Duration::from_millis(250));

        assert_eq!(error.message(), "upstream did not answer within 250ms");
        assert!(error.is_timeout());
        assert!(!error.is_connect());
    }
}
