//! Typed client for the cloud service HTTP API.

use std::time::Duration;

use bridge_config::RelayConfig;
use bridge_crypto::AuthChallenge;
use bridge_types::{
    BridgedMessage, PushRequest, PushResponse, RegistrationRequest, RegistrationResponse,
    RotationRequest, CERTIFICATE_INVALID_STATUS, CHALLENGE_HEADER, CHALLENGE_SIGNATURE_HEADER,
    LOCATION_HEADER, MESSAGE_QUEUE_PATH, REGISTER_PATH, ROTATE_PATH,
};
use reqwest::{Response, StatusCode};

use super::TransportError;

/// Slack on top of the server-side wait before the client gives up on a
/// long poll.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct CloudApi {
    http: reqwest::Client,
    base_url: String,
}

impl CloudApi {
    pub fn new(config: &RelayConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn register(
        &self,
        request: &RegistrationRequest,
        timeout: Duration,
    ) -> Result<RegistrationResponse, TransportError> {
        let response = self
            .http
            .post(self.url(REGISTER_PATH))
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(network)?;
        let response = check_status(response).await?;
        response.json().await.map_err(network)
    }

    /// Succeeds on 204 only.
    pub async fn rotate(&self, request: &RotationRequest) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.url(ROTATE_PATH))
            .json(request)
            .send()
            .await
            .map_err(network)?;
        let response = check_status(response).await?;
        if response.status() != StatusCode::NO_CONTENT {
            return Err(TransportError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }

    pub async fn push(
        &self,
        client_id: &str,
        request: &PushRequest,
    ) -> Result<PushResponse, TransportError> {
        let response = self
            .http
            .post(self.url(MESSAGE_QUEUE_PATH))
            .header(LOCATION_HEADER, client_id)
            .json(request)
            .send()
            .await
            .map_err(network)?;
        let response = check_status(response).await?;
        response.json().await.map_err(network)
    }

    pub async fn pull(
        &self,
        client_id: &str,
        challenge: &AuthChallenge,
        wait: Duration,
        limit: Option<usize>,
    ) -> Result<Vec<BridgedMessage>, TransportError> {
        let mut query = vec![("timeout", wait.as_secs().to_string())];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        let response = self
            .http
            .get(self.url(MESSAGE_QUEUE_PATH))
            .timeout(wait + POLL_GRACE)
            .header(LOCATION_HEADER, client_id)
            .header(CHALLENGE_HEADER, &challenge.challenge_text)
            .header(CHALLENGE_SIGNATURE_HEADER, &challenge.challenge_signature)
            .query(&query)
            .send()
            .await
            .map_err(network)?;
        let response = check_status(response).await?;
        response.json().await.map_err(network)
    }
}

fn network(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.as_u16() == CERTIFICATE_INVALID_STATUS {
        return Err(TransportError::CertificateInvalid);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
