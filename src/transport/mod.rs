//! Transport seams
//!
//! The writer only talks to the remote service through [`Connector`] and
//! [`Connection`]. The Arrow Flight implementation lives in [`flight`]; tests
//! plug in in-memory implementations with fault injection.

pub mod auth;
pub mod flight;
pub mod slot;

use crate::error::DestinationError;
use arrow_flight::{Action, FlightData, FlightDescriptor, FlightInfo, PutResult, Ticket};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use flight::FlightConnector;
pub use slot::ConnectionSlot;

/// Server responses on a DoPut stream
pub type AckStream = BoxStream<'static, Result<PutResult, tonic::Status>>;

/// Raw FlightData from a DoGet call
pub type FlightDataStream = BoxStream<'static, Result<FlightData, tonic::Status>>;

/// One logical DoPut stream
///
/// Sending fails once the remote end has terminated the call. Dropping
/// `sender` signals end-of-output; `acks` ends when the server finishes.
pub struct PutStream {
    pub sender: mpsc::Sender<FlightData>,
    pub acks: AckStream,
}

/// Creates authenticated connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial the service and authenticate, returning a ready connection
    async fn connect(&self) -> Result<Arc<dyn Connection>, DestinationError>;
}

/// An authenticated channel to the Flight service
#[async_trait]
pub trait Connection: Send + Sync {
    /// Open a new DoPut stream destined for `table`
    async fn open_put_stream(&self, table: &str) -> Result<PutStream, DestinationError>;

    /// Run a DoAction call and return the first result body, if any
    async fn do_action(&self, action: Action) -> Result<Option<Bytes>, DestinationError>;

    async fn get_flight_info(
        &self,
        descriptor: FlightDescriptor,
    ) -> Result<FlightInfo, DestinationError>;

    async fn do_get(&self, ticket: Ticket) -> Result<FlightDataStream, DestinationError>;

    /// Stop using this connection; later calls fail with `Connect`
    async fn close(&self) -> Result<(), DestinationError>;
}
