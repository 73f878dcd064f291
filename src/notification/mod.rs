//! Delivery of rendered alerts to chat channels.
//!
//! `slack` talks to the Slack Web API; `dispatcher` fans one message out to
//! its destination channels with per-channel failure isolation.
pub mod dispatcher;
pub mod slack;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
