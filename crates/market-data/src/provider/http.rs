//! Shared HTTP plumbing for the sources.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::errors::MarketDataError;

/// Upper bound on one HTTP request, connect to last body byte.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client with a per-request timeout and the given user agent.
pub(crate) fn client(user_agent: &str) -> Result<Client, MarketDataError> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(MarketDataError::Network)
}

/// Send a request and decode a JSON body.
///
/// Non-success statuses are mapped with [`MarketDataError::from_status`]
/// (404 becomes `EntityNotFound(entity)`). A body that does not match `T`
/// is a [`MarketDataError::MalformedPayload`] naming `entity`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    api: &str,
    entity: &str,
) -> Result<T, MarketDataError> {
    let response = request
        .send()
        .await
        .map_err(|e| MarketDataError::from_transport(api, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(MarketDataError::from_status(api, status, entity));
    }

    let body = response
        .text()
        .await
        .map_err(|e| MarketDataError::from_transport(api, e))?;

    serde_json::from_str(&body).map_err(|e| {
        MarketDataError::malformed(
            api,
            format!(
                "{} (entity {}, {} bytes, starts with {:?})",
                e,
                entity,
                body.len(),
                body.chars().take(80).collect::<String>()
            ),
        )
    })
}
