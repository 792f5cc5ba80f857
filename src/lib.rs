//! connection pooling and session layer for an async http/1 client.
//!
//! # Quick Start
//! ```no_run
//! use mooring::{error::Error, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     // build a session owning a connection pool and a cookie store.
//!     let session = Session::new();
//!     // send get request and wait for response.
//!     let res = session.get("http://httpbin.org/get")?.send().await?;
//!     // parse streaming response body to bytes.
//!     let body = res.body().await?;
//!     // print the body as lossy string.
//!     Ok(println!("{}", String::from_utf8_lossy(&body)))
//! }
//! ```
//!
//! # Composable
//! - extendable middlewares for pre/post processing
//! - customizable core feature like DNS resolver and TLS transport layer
//!
//! ## Middleware
//! Please reference [SessionBuilder::middleware]
//!
//! ## Customize core feature
//! Please reference [SessionBuilder::resolver] and [SessionBuilder::tls_connector]

#![forbid(unsafe_code)]

mod body;
mod builder;
mod connect;
mod connection;
mod connector;
mod cookies;
mod h1;
mod pool;
mod request;
mod resolver;
mod response;
mod service;
mod session;
mod timeout;
mod uri;

pub mod error;
pub mod middleware;

pub use self::body::{BodyError, BoxBody, RequestBody, ResponseBody};
pub use self::builder::SessionBuilder;
pub use self::connector::{Io, TlsConnect};
pub use self::cookies::CookieStore;
pub use self::request::RequestBuilder;
pub use self::resolver::Resolve;
pub use self::response::Response;
pub use self::service::{HttpService, Service, ServiceRequest};
pub use self::session::Session;
pub use self::timeout::TimeoutConfig;

// re-export http crate.
pub use http;

// re-export bytes crate.
pub use bytes;
