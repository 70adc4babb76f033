//! Gateway: webhook intake.
//!
//! Single port serves `POST /` (message webhook) and `GET /` (health). A message from the
//! configured channel starts a pipeline run for its text; the reply never waits for the run.

mod payload;
mod server;

pub use payload::{MessagePayload, WebhookEnvelope};
pub use server::{
    router, run_gateway, run_gateway_with, GatewayState, ACK_MESSAGE, INVALID_PAYLOAD_MESSAGE,
};
