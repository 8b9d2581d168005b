use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http_forwarder::{ForwardBody, ForwarderService, HttpForwarderService, InboundRequest};
use hyper_util::client::legacy::{
    connect::{Connect, HttpConnector},
    Client,
};
use tower::Service;

use crate::{Config, EventResponse, InboundEvent};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("malformed inbound event: {0}")]
    MalformedEvent(serde_json::Error),
    #[error("could not encode response: {0}")]
    Encode(serde_json::Error),
    #[error("forward failed with status {}: {}", .0.status_code, .0.body)]
    Forward(EventResponse),
}

/// Turns gateway events into upstream exchanges and their outcome back into gateway replies.
///
/// A relayed reply comes back as `Ok`, whatever its status. A failed exchange comes back as
/// `Err` carrying the 500 reply for the gateway.
pub struct EventHandler<C = HttpConnector> {
    config: Config,
    forwarder: ForwarderService<C>,
}

impl<C: Clone> Clone for EventHandler<C> {
    fn clone(&self) -> Self {
        EventHandler {
            config: self.config.clone(),
            forwarder: self.forwarder.clone(),
        }
    }
}

impl EventHandler<HttpConnector> {
    pub fn new(config: Config) -> Self {
        Self {
            forwarder: HttpForwarderService::new_http(config.target()),
            config,
        }
    }
}

impl<C> EventHandler<C> {
    pub fn with_client(config: Config, client: Client<C, ForwardBody>) -> Self {
        Self {
            forwarder: ForwarderService::new(config.target(), client),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl<C> EventHandler<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub async fn handle(&self, event: InboundEvent) -> Result<EventResponse, EventResponse> {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!("{}", json),
            Err(error) => tracing::warn!("could not log inbound event: {}", error),
        }

        self.relay(event).await
    }

    /// Same as [`EventHandler::handle`] for hosts that pass events around as raw JSON.
    ///
    /// The raw document is logged, so fields the relay does not read (`requestContext`,
    /// `resource`, ...) still show up.
    pub async fn handle_json(&self, event: &str) -> Result<String, RelayError> {
        tracing::info!("{}", event);

        let event: InboundEvent = serde_json::from_str(event).map_err(RelayError::MalformedEvent)?;

        match self.relay(event).await {
            Ok(response) => serde_json::to_string(&response).map_err(RelayError::Encode),
            Err(failure) => Err(RelayError::Forward(failure)),
        }
    }

    async fn relay(&self, event: InboundEvent) -> Result<EventResponse, EventResponse> {
        let mut forwarder = self.forwarder.clone();

        match forwarder.call(InboundRequest::from(event)).await {
            Ok(response) => Ok(response.into()),
            Err(error) => Err(EventResponse::from(&error)),
        }
    }
}

impl<C> Service<InboundEvent> for EventHandler<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    type Response = EventResponse;
    type Error = EventResponse;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: InboundEvent) -> Self::Future {
        let handler = self.clone();

        Box::pin(async move { handler.handle(event).await })
    }
}
