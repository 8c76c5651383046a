//! Authentication
//!
//! This module handles the Flight handshake and attaching the resulting token
//! to outgoing calls.

use crate::error::DestinationError;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::HandshakeRequest;
use bytes::Bytes;
use secrecy::{ExposeSecret, SecretString};
use tonic::metadata::{BinaryMetadataValue, MetadataMap};
use tonic::transport::Channel;
use tracing::{debug, info, warn};

/// Metadata key carrying the session token on every call
pub const AUTH_TOKEN_KEY: &str = "auth-token-bin";

/// Perform the Flight handshake
///
/// Sends the configured handshake secret as the single request payload and
/// returns the payload of the first response as the session token.
///
/// # Errors
///
/// Returns `Authentication` if the call fails or the server answers without a
/// token.
pub async fn handshake(
    client: &mut FlightServiceClient<Channel>,
    secret: &SecretString,
) -> Result<Bytes, DestinationError> {
    info!("Performing Flight handshake");

    let request = HandshakeRequest {
        protocol_version: 0,
        payload: Bytes::from(secret.expose_secret().clone().into_bytes()),
    };

    let response = client
        .handshake(futures::stream::iter(vec![request]))
        .await
        .map_err(|status| {
            warn!("Handshake failed with status {:?}", status.code());
            DestinationError::Authentication(format!(
                "failed to send auth request: {}",
                status.message()
            ))
        })?;

    let mut responses = response.into_inner();
    match responses.message().await {
        Ok(Some(reply)) => {
            debug!("Handshake succeeded, token length: {}", reply.payload.len());
            Ok(reply.payload)
        }
        Ok(None) => Err(DestinationError::Authentication(
            "server ended the handshake without a token".to_string(),
        )),
        Err(status) => Err(DestinationError::Authentication(format!(
            "failed to read auth response: {}",
            status.message()
        ))),
    }
}

/// Attach the session token to a request's metadata
pub fn attach_token(metadata: &mut MetadataMap, token: Option<&Bytes>) {
    if let Some(token) = token {
        metadata.insert_bin(AUTH_TOKEN_KEY, BinaryMetadataValue::from_bytes(token));
    }
}

/// Check if a status indicates the session token was rejected
pub fn is_unauthenticated(status: &tonic::Status) -> bool {
    matches!(
        status.code(),
        tonic::Code::Unauthenticated | tonic::Code::PermissionDenied
    )
}
