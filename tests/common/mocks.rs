//! In-memory Flight service for tests
//!
//! `MockConnector` hands out `MockConnection`s that share one `MockState`, so
//! faults and recorded traffic survive reconnects.

use arrow::record_batch::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::{
    Action, FlightData, FlightDescriptor, FlightEndpoint, FlightInfo, PutResult, Ticket,
};
use arrow_flight_destination::transport::{Connection, Connector, FlightDataStream, PutStream};
use arrow_flight_destination::writer::encoder::BatchEncoder;
use arrow_flight_destination::DestinationError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tokio_util::sync::CancellationToken;

/// Everything one DoPut stream delivered
pub struct ReceivedStream {
    pub table: String,
    pub data: Arc<Mutex<Vec<FlightData>>>,
}

#[derive(Default)]
pub struct MockState {
    pub connects: AtomicUsize,
    pub closed_connections: AtomicUsize,
    pub opens: AtomicUsize,
    fail_connects: AtomicBool,
    fail_actions: AtomicBool,
    reject_streams: AtomicUsize,
    hang_acks: AtomicBool,
    open_delay_ms: AtomicUsize,
    streams: Mutex<Vec<ReceivedStream>>,
    live: Mutex<Vec<CancellationToken>>,
    actions: Mutex<Vec<Action>>,
    action_reply: Mutex<Option<Bytes>>,
    tables: Mutex<HashMap<String, Vec<FlightData>>>,
}

impl MockState {
    /// Make the next `n` opened streams terminate before any data is read
    pub fn reject_next_streams(&self, n: usize) {
        self.reject_streams.store(n, Ordering::SeqCst);
    }

    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub fn fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    /// Keep acknowledgment streams open after the client stops sending
    pub fn hang_acks(&self, hang: bool) {
        self.hang_acks.store(hang, Ordering::SeqCst);
    }

    /// Fail every open stream from the server side: the ack stream yields an
    /// internal error and the server stops reading
    pub fn terminate_streams(&self) {
        for token in self.live.lock().unwrap().drain(..) {
            token.cancel();
        }
    }

    pub fn delay_opens(&self, delay: Duration) {
        self.open_delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn reply_to_actions(&self, body: &'static [u8]) {
        *self.action_reply.lock().unwrap() = Some(Bytes::from_static(body));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closed_connections(&self) -> usize {
        self.closed_connections.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn action_types(&self) -> Vec<String> {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.r#type.clone())
            .collect()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap().clone()
    }

    /// Serve `batches` for DoGet on `table`
    pub fn set_table(&self, table: &str, batches: &[RecordBatch]) {
        let mut encoder = BatchEncoder::bind(table, batches[0].schema());
        let data = batches
            .iter()
            .flat_map(|b| encoder.encode(b).unwrap())
            .collect();
        self.tables.lock().unwrap().insert(table.to_string(), data);
    }

    /// Decode every batch received for `table`, stream by stream
    pub async fn received_batches(&self, table: &str) -> Vec<RecordBatch> {
        let streams: Vec<Vec<FlightData>> = self
            .streams
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.table == table)
            .map(|s| s.data.lock().unwrap().clone())
            .collect();

        let mut batches = Vec::new();
        for data in streams {
            if data.is_empty() {
                continue;
            }
            let decoded: Vec<RecordBatch> = FlightRecordBatchStream::new_from_flight_data(
                futures::stream::iter(data.into_iter().map(Ok)),
            )
            .try_collect()
            .await
            .unwrap();
            batches.extend(decoded);
        }
        batches
    }

    /// Flight descriptors of every schema message received
    pub fn descriptors(&self) -> Vec<FlightDescriptor> {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .flat_map(|s| {
                s.data
                    .lock()
                    .unwrap()
                    .iter()
                    .filter_map(|d| d.flight_descriptor.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn take_rejection(&self) -> bool {
        self.reject_streams
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Clone, Default)]
pub struct MockConnector {
    pub state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn Connection>, DestinationError> {
        if self.state.fail_connects.load(Ordering::SeqCst) {
            return Err(DestinationError::Connect("mock connect refused".to_string()));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MockConnection {
    state: Arc<MockState>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MockConnection {
    async fn open_put_stream(&self, table: &str) -> Result<PutStream, DestinationError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DestinationError::Open {
                table: table.to_string(),
                reason: "connection is closed".to_string(),
            });
        }
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        let (sender, receiver) = mpsc::channel(16);
        if self.state.take_rejection() {
            drop(receiver);
            return Ok(PutStream {
                sender,
                acks: futures::stream::empty().boxed(),
            });
        }

        let data = Arc::new(Mutex::new(Vec::new()));
        self.state.streams.lock().unwrap().push(ReceivedStream {
            table: table.to_string(),
            data: Arc::clone(&data),
        });

        let terminate = CancellationToken::new();
        self.state.live.lock().unwrap().push(terminate.clone());

        let (ack_tx, ack_rx) = mpsc::unbounded_channel::<Result<PutResult, tonic::Status>>();
        tokio::spawn(async move {
            let mut incoming = ReceiverStream::new(receiver);
            let mut count = 0u64;
            loop {
                tokio::select! {
                    _ = terminate.cancelled() => {
                        let reset = tonic::Status::internal("stream reset by server");
                        let _ = ack_tx.send(Err(reset));
                        break;
                    }
                    message = incoming.next() => {
                        let Some(message) = message else { break };
                        data.lock().unwrap().push(message);
                        count += 1;
                        let _ = ack_tx.send(Ok(PutResult {
                            app_metadata: Bytes::from(format!("{{\"received\":{}}}", count)),
                        }));
                    }
                }
            }
        });

        let acks = UnboundedReceiverStream::new(ack_rx);
        let acks = if self.state.hang_acks.load(Ordering::SeqCst) {
            acks.chain(futures::stream::pending()).boxed()
        } else {
            acks.boxed()
        };
        Ok(PutStream { sender, acks })
    }

    async fn do_action(&self, action: Action) -> Result<Option<Bytes>, DestinationError> {
        if self.state.fail_actions.load(Ordering::SeqCst) {
            return Err(DestinationError::Action {
                action: action.r#type.clone(),
                reason: "mock action failure".to_string(),
            });
        }
        self.state.actions.lock().unwrap().push(action);
        Ok(self.state.action_reply.lock().unwrap().clone())
    }

    async fn get_flight_info(
        &self,
        descriptor: FlightDescriptor,
    ) -> Result<FlightInfo, DestinationError> {
        let table = descriptor.path.first().cloned().unwrap_or_default();
        if !self.state.tables.lock().unwrap().contains_key(&table) {
            return Err(DestinationError::Read(format!("NotFound: no table {}", table)));
        }
        Ok(FlightInfo::new()
            .with_descriptor(descriptor)
            .with_endpoint(FlightEndpoint::new().with_ticket(Ticket::new(table))))
    }

    async fn do_get(&self, ticket: Ticket) -> Result<FlightDataStream, DestinationError> {
        let table = String::from_utf8_lossy(&ticket.ticket).to_string();
        let data = self
            .state
            .tables
            .lock()
            .unwrap()
            .get(&table)
            .cloned()
            .unwrap_or_default();
        Ok(futures::stream::iter(data.into_iter().map(Ok)).boxed())
    }

    async fn close(&self) -> Result<(), DestinationError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closed_connections.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
