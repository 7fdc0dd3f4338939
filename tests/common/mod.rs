//! Integration test common infrastructure.
//!
//! Provides an in-process server wired to the in-memory store, a recording
//! mailer, and a client that drives the router with `oneshot`.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::{TestClient, TestResponse};
#[allow(unused_imports)]
pub use server::{RecordingMailer, TestServer};
