//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline
//!     → client.rs (Operation<HttpResponse>: one GET per invocation)
//!     → network
//!     → server.rs (demo endpoints with scripted failures)
//! ```

pub mod client;
pub mod server;

pub use client::{status_is, transient_http_error, unsuccessful, HttpClient, HttpClientError, HttpResponse};
pub use server::{DemoServer, DemoState};
