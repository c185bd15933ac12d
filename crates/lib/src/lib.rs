//! Group bridge core library: relays chat-group messages to a webhook and sends
//! webhook-driven messages back into named groups.

pub mod config;
pub mod gateway;
pub mod init;
pub mod qr;
pub mod session;
