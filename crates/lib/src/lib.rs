//! smsrelay core library: relays SMS into Slack threads and thread replies back
//! out as SMS, keyed by a phone number <-> thread store.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod init;
pub mod relay;
pub mod setup;
pub mod store;

#[cfg(test)]
mod fakes;
