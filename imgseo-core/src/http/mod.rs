//! HTTP transport for the imgseo endpoints.
//!
//! The retrying client talks to the server only through [`ApiTransport`], so
//! tests can script responses with [`MockTransport`].

mod client;

pub use client::{
    ApiTransport, MockReply, MockTransport, RecordedCall, ReqwestTransport, TransportBuilder,
    TransportError, TransportResponse,
};
