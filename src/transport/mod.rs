// src/transport/mod.rs

//! Message transport to the router.
//!
//! The runtime publishes through a [`Transport`]; inbound messages arrive on
//! the runtime event channel as `RuntimeEvent::Inbound`. Production uses
//! [`tcp::TcpTransport`]; tests substitute a recording transport.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::protocol::OutboundMessage;

pub mod tcp;

pub use tcp::TcpTransport;

/// Outbound half of the router connection.
///
/// Sending is fire-and-forget from the protocol's point of view: `Ok` means
/// the message was handed to the transport, not that the router got it.
pub trait Transport: Send {
    fn send(
        &mut self,
        message: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
