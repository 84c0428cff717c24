//! Gemini-backed [`AiProvider`](crate::AiProvider).

pub mod client;
pub mod types;

use async_trait::async_trait;
use chrono::Utc;
use relief_core::{ImageVerification, LocationExtraction};

pub use client::GeminiClient;

use crate::{AiProvider, UpstreamResult};

fn location_prompt(text: &str) -> String {
    format!(
        "Extract the location name from this disaster description. Return only the location \
         name (city, state/country format if available), or \"Unknown\" if no location \
         is found.\n\n\
         Description: \"{text}\"\n\nLocation:"
    )
}

fn verification_prompt(image_url: &str, context: &str) -> String {
    format!(
        "Analyze this image URL for potential signs of manipulation or \
         to verify disaster context.\n\
         Image URL: {image_url}\nContext: {context}\n\n\
         Provide a brief analysis focusing on:\n\
         1. Signs of digital manipulation\n\
         2. Consistency with disaster context\n\
         3. Overall authenticity assessment\n\n\
         Keep response concise and factual."
    )
}

/// Location extraction and image verification through Gemini.
#[derive(Debug)]
pub struct GeminiProvider {
    client: GeminiClient,
}

impl GeminiProvider {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    async fn extract_location(&self, text: &str) -> UpstreamResult<LocationExtraction> {
        let raw = self.client.generate(&location_prompt(text)).await?;
        let extraction = LocationExtraction::from_model_output(&raw);
        tracing::info!(location = ?extraction.location, "Location extracted");
        Ok(extraction)
    }

    async fn verify_image(
        &self,
        image_url: &str,
        context: &str,
    ) -> UpstreamResult<ImageVerification> {
        let raw = self
            .client
            .generate(&verification_prompt(image_url, context))
            .await?;
        Ok(ImageVerification::analyzed(raw.trim(), Utc::now()))
    }

    fn name(&self) -> &str {
        client::PROVIDER
    }
}
