//! Gateway: HTTP surface and the session event loop.
//!
//! Single port serves `GET /` (health), `GET /qr` (login QR) and `POST /send` (outbound
//! messages). Group messages from the session are relayed to the configured webhook.

pub mod auth;
mod error;
mod protocol;
mod relay;
mod send;
mod server;

pub use error::GatewayError;
pub use protocol::{InboundMessagePayload, MediaPayload, SendRequest, SendResponse, ValidSend};
pub use relay::{InboundRelay, RelayError, RelayOutcome, DEFAULT_WEBHOOK_TIMEOUT};
pub use send::{dispatch, find_group};
pub use server::{build_router, run_gateway, spawn_event_loop, GatewayState};
