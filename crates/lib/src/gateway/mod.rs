//! Gateway: HTTP webhooks on a single port.
//!
//! `/sms` takes SMS from the provider, `/slack/events` takes chat events,
//! `/auth` and `/select` drive the install flow. Handlers verify the sender, run
//! the relay inline and acknowledge; provider failures never change the webhook response.

mod dedup;
mod protocol;
mod server;
mod verify;

pub use dedup::RecentEvents;
pub use protocol::{AuthQuery, SelectAck, SelectBody, SmsForm, EMPTY_TWIML};
pub use server::{build_state, router, run_gateway, GatewayState};
pub use verify::{slack_signature, twilio_signature, SmsVerifier, Verifier};
