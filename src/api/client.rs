use crate::api::models::{GenerateContentRequest, GenerateContentResponse};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;
use url::Url;

/// A remote `generateContent` endpoint.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, TransportError>;
}

pub struct GeminiClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: crate::utils::normalize_url(base_url),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> Result<Url, TransportError> {
        let base = self.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/v1beta/models/{}:generateContent", base, model))
            .map_err(|e| TransportError::Network(e.to_string()))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, TransportError> {
        let url = self.endpoint(model)?;
        log::debug!("POST generateContent model={}", model);
        let resp = self.http.post(url).json(request).send().await?;
        if !resp.status().is_success() {
            log::warn!("generateContent {} returned HTTP {}", model, resp.status());
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        Ok(resp.json::<GenerateContentResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_model_and_key() {
        let client = GeminiClient::new("generativelanguage.googleapis.com/", "k&1", Duration::from_secs(5)).unwrap();
        let url = client.endpoint("gemini-2.5-flash").unwrap();
        assert_eq!(url.host_str(), Some("generativelanguage.googleapis.com"));
        assert_eq!(url.path(), "/v1beta/models/gemini-2.5-flash:generateContent");
        assert_eq!(url.query(), Some("key=k%261"));
        assert_eq!(url.scheme(), "https");
    }
}
