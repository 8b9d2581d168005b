//! Relays API gateway proxy events to one fixed HTTP upstream.
//!
//! The gateway hands over an event (`path`, `httpMethod`, `headers`,
//! `queryStringParameters`, `body`). [`EventHandler`] rebuilds it as a plain HTTP/1.1 request
//! against the host named by `LOAD_BALANCER_DNS_NAME`, waits for the whole reply and hands back
//! `{statusCode, headers, body}`. Upstream 4xx and 5xx replies are relayed as they are, only a
//! failed exchange turns into a 500.

mod config;
mod event;
mod relay_service;

pub use config::{Config, ConfigError, HOST_VAR, TIMEOUT_VAR};
pub use event::{EventResponse, InboundEvent};
pub use relay_service::{EventHandler, RelayError};
