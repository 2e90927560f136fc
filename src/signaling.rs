use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Carries the single offer/answer exchange to the media server.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Sends the offer SDP and returns the answer SDP.
    async fn post_offer(&self, endpoint: &Url, offer_sdp: &str) -> Result<String>;
}

/// WHEP signaling over plain HTTP: one POST with the offer as the body, the
/// answer comes back in the response body.
#[derive(Debug, Clone, Default)]
pub struct WhepSignaling {
    http: reqwest::Client,
}

impl WhepSignaling {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalingTransport for WhepSignaling {
    async fn post_offer(&self, endpoint: &Url, offer_sdp: &str) -> Result<String> {
        info!("posting offer to WHEP endpoint {endpoint}");

        let response = self
            .http
            .post(endpoint.clone())
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer_sdp.to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }

        let answer = response.text().await?;
        if answer.trim().is_empty() {
            return Err(Error::EmptyAnswer);
        }
        debug!("received {} byte answer", answer.len());
        Ok(answer)
    }
}
