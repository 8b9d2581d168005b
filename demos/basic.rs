//! Reads one gateway event as JSON from stdin and prints the relayed reply.
//!
//! ```sh
//! echo '{"path":"/v1/ping","httpMethod":"GET"}' \
//!     | LOAD_BALANCER_DNS_NAME=internal-lb.example.com cargo run --example basic
//! ```

use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway_relay::{Config, EventHandler, RelayError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gateway_relay=debug,http_forwarder=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let handler = EventHandler::new(Config::from_env()?);

    let mut event = String::new();
    tokio::io::stdin().read_to_string(&mut event).await?;

    match handler.handle_json(&event).await {
        Ok(response) => println!("{response}"),
        Err(RelayError::Forward(failure)) => {
            println!("{}", serde_json::to_string(&failure)?);

            std::process::exit(1);
        }
        Err(error) => return Err(error.into()),
    }

    Ok(())
}
