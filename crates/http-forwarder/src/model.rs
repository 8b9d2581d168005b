use std::{collections::BTreeMap, time::Duration};

/// Port used when the target does not name one.
pub const DEFAULT_PORT: u16 = 80;

/// An HTTP request as described by the edge layer, before it is sent anywhere.
///
/// Headers and query parameters are ordered pairs. Order is kept when the outbound
/// request is composed and repeated names are not collapsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query_parameters: Vec<(String, String)>,
    pub body: Option<String>,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));

        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_parameters.push((key.into(), value.into()));

        self
    }

    pub fn body(mut self, value: impl Into<String>) -> Self {
        self.body = Some(value.into());

        self
    }
}

/// The fixed upstream every request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
    /// Bound on one whole exchange. `None` waits for as long as the upstream takes.
    pub timeout: Option<Duration>,
}

impl UpstreamTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: None,
        }
    }

    pub fn port(mut self, value: u16) -> Self {
        self.port = value;

        self
    }

    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);

        self
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// The upstream's reply, fully buffered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundResponse {
    pub status_code: u16,
    /// Lowercased header names. Repeated headers are joined with `", "`, which is lossy for
    /// `set-cookie`: an `Expires=` date carries its own comma, so the joined value cannot be
    /// split back into cookies reliably.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_defaults_to_port_80_without_timeout() {
        let target = UpstreamTarget::new("internal-lb.example.com");

        assert_eq!(target.port, 80);
        assert_eq!(target.timeout, None);
        assert_eq!(target.authority(), "internal-lb.example.com:80");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        assert_eq!(UpstreamTarget::new("::1").port(8080).authority(), "[::1]:8080");
        assert_eq!(UpstreamTarget::new("[::1]").authority(), "[::1]:80");
    }

    #[test]
    fn request_builder_keeps_order() {
        let request = InboundRequest::new("GET", "/items")
            .query("b", "2")
            .query("a", "1")
            .header("x-one", "1");

        assert_eq!(
            request.query_parameters,
            vec![("b".to_owned(), "2".to_owned()), ("a".to_owned(), "1".to_owned())]
        );
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.body, None);
    }
}
