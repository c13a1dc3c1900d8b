//! HTTP client for the model server.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{FeatureVector, InferenceClient, InferenceError, Prediction};

/// Model server client.
///
/// Speaks `POST {base_url}/predict` with one row and
/// `POST {base_url}/predict/batch` with a JSON array of rows.
pub struct HttpInferenceClient {
    client: Client,
    base_url: String,
}

impl HttpInferenceClient {
    #[must_use]
    pub fn new(client: Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, InferenceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api { status, message });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn predict_one(&self, features: &FeatureVector) -> Result<Prediction, InferenceError> {
        self.post("/predict", features).await
    }

    async fn predict_batch(
        &self,
        features: &[FeatureVector],
    ) -> Result<Vec<Prediction>, InferenceError> {
        let predictions: Vec<Prediction> = self.post("/predict/batch", features).await?;
        if predictions.len() != features.len() {
            return Err(InferenceError::Malformed(format!(
                "expected {} predictions, got {}",
                features.len(),
                predictions.len()
            )));
        }
        Ok(predictions)
    }
}
