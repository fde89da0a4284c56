//! stdio-bridge - drive a long-lived child process over its standard streams.
//!
//! The [`bridge`] module owns the child and turns its stdin, stdout and stderr
//! into channels. The [`session`] module layers a command/response protocol
//! on top: send one command line, then wait for a terminator, a structured
//! payload, or diagnostic text.

pub mod bridge;
pub mod config;
pub mod display;
pub mod session;
