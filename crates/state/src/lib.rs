// threadspace-state: workspace persistence, operation ownership and the
// session bridge that routes backend events.

pub mod config;
pub mod security;
pub mod session;
pub mod storage;
pub mod store;
pub mod tracker;
