//! Arrow Flight transport
//!
//! This module dials the Flight service with `tonic`, authenticates, and
//! exposes DoPut/DoAction/GetFlightInfo/DoGet through the [`Connection`] trait.

use crate::config::DestinationConfig;
use crate::error::DestinationError;
use crate::transport::auth::{self, attach_token};
use crate::transport::{Connection, Connector, FlightDataStream, PutStream};
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Action, FlightDescriptor, FlightInfo, Ticket};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

/// Outbound FlightData buffered per DoPut stream before `send` waits
const PUT_STREAM_BUFFER: usize = 64;

static CRYPTO_PROVIDER: Once = Once::new();

fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Fails only when another provider is already installed, which is fine.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Connects to the Flight service described by a [`DestinationConfig`]
pub struct FlightConnector {
    config: Arc<DestinationConfig>,
}

impl FlightConnector {
    pub fn new(config: Arc<DestinationConfig>) -> Self {
        install_crypto_provider();
        if config.tls_insecure_skip_verify {
            warn!("tls_insecure_skip_verify is not supported; certificates will be verified");
        }
        Self { config }
    }

    async fn channel(&self) -> Result<Channel, DestinationError> {
        let uri = self.config.endpoint_uri();
        info!("Connecting to Flight service at {}", uri);

        let mut endpoint = Endpoint::from_shared(uri.clone()).map_err(|e| {
            DestinationError::Configuration(format!("invalid addr '{}': {}", uri, e))
        })?;
        endpoint = endpoint.connect_timeout(self.config.write_timeout);

        if self.config.tls_enabled {
            let mut tls = ClientTlsConfig::new().with_native_roots();
            if let Some(server_name) = &self.config.tls_server_name {
                tls = tls.domain_name(server_name.clone());
            }
            endpoint = endpoint.tls_config(tls)?;
        }

        let channel = endpoint.connect().await?;
        debug!("Channel established to {}", uri);
        Ok(channel)
    }
}

#[async_trait]
impl Connector for FlightConnector {
    async fn connect(&self) -> Result<Arc<dyn Connection>, DestinationError> {
        let channel = self.channel().await?;
        let mut client = FlightServiceClient::new(channel)
            .max_decoding_message_size(self.config.max_call_recv_msg_size)
            .max_encoding_message_size(self.config.max_call_send_msg_size);

        let token = match &self.config.handshake {
            Some(secret) => Some(auth::handshake(&mut client, secret).await?),
            None => self
                .config
                .token
                .as_ref()
                .map(|t| Bytes::from(t.expose_secret().clone().into_bytes())),
        };

        Ok(Arc::new(FlightConnection {
            client,
            token,
            closed: AtomicBool::new(false),
        }))
    }
}

/// An authenticated Flight client
pub struct FlightConnection {
    client: FlightServiceClient<Channel>,
    token: Option<Bytes>,
    closed: AtomicBool,
}

impl FlightConnection {
    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        attach_token(request.metadata_mut(), self.token.as_ref());
        request
    }

    fn ensure_open(&self) -> Result<(), DestinationError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DestinationError::Connect("connection is closed".to_string()));
        }
        Ok(())
    }
}

fn status_error(
    status: tonic::Status,
    wrap: impl FnOnce(String) -> DestinationError,
) -> DestinationError {
    if auth::is_unauthenticated(&status) {
        DestinationError::Authentication(status.message().to_string())
    } else {
        wrap(format!("{:?}: {}", status.code(), status.message()))
    }
}

#[async_trait]
impl Connection for FlightConnection {
    async fn open_put_stream(&self, table: &str) -> Result<PutStream, DestinationError> {
        self.ensure_open().map_err(|e| DestinationError::Open {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

        let (sender, receiver) = mpsc::channel(PUT_STREAM_BUFFER);
        let request = self.request(ReceiverStream::new(receiver));
        let mut client = self.client.clone();

        // The call starts when the acknowledgment stream is first polled, so
        // servers that only answer after end-of-input never block the opener.
        let acks = futures::stream::once(async move { client.do_put(request).await })
            .map(|response| match response {
                Ok(response) => response.into_inner().boxed(),
                Err(status) => futures::stream::once(async move { Err(status) }).boxed(),
            })
            .flatten()
            .boxed();

        debug!(table = %table, "Opened DoPut stream");
        Ok(PutStream { sender, acks })
    }

    async fn do_action(&self, action: Action) -> Result<Option<Bytes>, DestinationError> {
        self.ensure_open()?;
        let action_type = action.r#type.clone();
        let wrap = |reason: String| DestinationError::Action {
            action: action_type.clone(),
            reason,
        };

        let mut client = self.client.clone();
        let mut results = client
            .do_action(self.request(action))
            .await
            .map_err(|s| status_error(s, wrap))?
            .into_inner();

        match results.message().await {
            Ok(Some(result)) => Ok(Some(result.body)),
            Ok(None) => Ok(None),
            Err(status) => Err(status_error(status, wrap)),
        }
    }

    async fn get_flight_info(
        &self,
        descriptor: FlightDescriptor,
    ) -> Result<FlightInfo, DestinationError> {
        self.ensure_open()?;
        let mut client = self.client.clone();
        let info = client
            .get_flight_info(self.request(descriptor))
            .await
            .map_err(|s| status_error(s, DestinationError::Read))?
            .into_inner();
        Ok(info)
    }

    async fn do_get(&self, ticket: Ticket) -> Result<FlightDataStream, DestinationError> {
        self.ensure_open()?;
        let mut client = self.client.clone();
        let stream = client
            .do_get(self.request(ticket))
            .await
            .map_err(|s| status_error(s, DestinationError::Read))?
            .into_inner();
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), DestinationError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Flight connection closed");
        }
        Ok(())
    }
}
