mod hyper_forwarder;
mod model;
mod query_string;

use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{
        connect::{Connect, HttpConnector},
        Client,
    },
    rt::TokioExecutor,
};
use tower::Service;

pub use hyper_forwarder::{
    compose_headers, compose_path, create_outbound_request, ForwardBody, ForwardError,
    HyperForwarder,
};
pub use model::{InboundRequest, OutboundResponse, UpstreamTarget, DEFAULT_PORT};
pub use query_string::encode_query;

/// Forwards one request to `target` over a fresh plain-HTTP connection.
pub async fn forward(
    request: InboundRequest,
    target: &UpstreamTarget,
) -> Result<OutboundResponse, ForwardError> {
    HyperForwarder::new(http_client()).forward(target, request).await
}

/// HTTP/1 client that keeps no idle connections around, so every exchange dials anew.
pub fn http_client() -> Client<HttpConnector, ForwardBody> {
    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(0)
        .build_http()
}

pub struct ForwarderService<C> {
    pub target: UpstreamTarget,
    pub forwarder: HyperForwarder<C>,
}

pub type HttpForwarderService = ForwarderService<HttpConnector>;

impl<C> ForwarderService<C> {
    pub fn new(target: UpstreamTarget, client: Client<C, ForwardBody>) -> ForwarderService<C> {
        Self {
            target,
            forwarder: HyperForwarder::new(client),
        }
    }
}

impl ForwarderService<HttpConnector> {
    pub fn new_http(target: UpstreamTarget) -> ForwarderService<HttpConnector> {
        Self {
            target,
            forwarder: HyperForwarder::new(http_client()),
        }
    }
}

impl<C: Clone> Clone for ForwarderService<C> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            forwarder: self.forwarder.clone(),
        }
    }
}

impl<C> Service<InboundRequest> for ForwarderService<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    type Response = OutboundResponse;
    type Error = ForwardError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: InboundRequest) -> Self::Future {
        let target = self.target.clone();
        let forwarder = self.forwarder.clone();

        Box::pin(async move { forwarder.forward(&target, request).await })
    }
}
