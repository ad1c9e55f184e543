use super::schema::{json_schema, parse_receipt};
use super::{ExtractionFailure, ExtractionGateway};
use crate::workflows::expense::domain::{Receipt, ReceiptSource};
use crate::workflows::expense::llm::{LlmClient, StructuredRequest};
use base64::Engine as _;
use serde_json::json;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are an OCR analyzer for receipts, extracting structured data.";
const USER_PROMPT: &str = "This is a receipt image. Extract the merchant, date, category, \
    line items (flag alcoholic drinks), total, alcohol total, and tip amount. Use 0 when a \
    receipt shows no alcohol or tip.";

/// Extraction gateway backed by a vision-capable chat-completions model.
#[derive(Debug, Clone)]
pub struct VisionExtractionGateway {
    client: LlmClient,
    model: String,
}

impl VisionExtractionGateway {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn data_url(source: &ReceiptSource, bytes: &[u8]) -> String {
        let mime = mime_guess::from_path(source.path()).first_or(mime::IMAGE_JPEG);
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        format!("data:{};base64,{}", mime.essence_str(), encoded)
    }
}

impl ExtractionGateway for VisionExtractionGateway {
    async fn extract(&self, source: &ReceiptSource) -> Result<Receipt, ExtractionFailure> {
        if !self.client.is_configured() {
            return Err(ExtractionFailure::Unconfigured(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }

        let bytes = tokio::fs::read(source.path()).await?;
        debug!(source = %source, bytes = bytes.len(), "submitting receipt image");

        let content = json!([
            { "type": "text", "text": USER_PROMPT },
            { "type": "image_url", "image_url": { "url": Self::data_url(source, &bytes) } }
        ]);

        let raw = self
            .client
            .complete_structured(StructuredRequest {
                model: &self.model,
                system: SYSTEM_PROMPT,
                user_content: content,
                schema_name: "receipt_analysis",
                schema: json_schema(),
                max_tokens: 1000,
                temperature: 0.4,
            })
            .await?;

        parse_receipt(&raw, source.receipt_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::expense::llm::LlmSettings;
    use std::time::Duration;

    fn gateway() -> VisionExtractionGateway {
        let client = LlmClient::new(LlmSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            timeout: Duration::from_secs(1),
        })
        .expect("client builds");
        VisionExtractionGateway::new(client, "vision-model")
    }

    #[test]
    fn data_url_uses_image_mime_type() {
        let url = VisionExtractionGateway::data_url(&ReceiptSource::new("scan.png"), b"abc");
        assert_eq!(url, "data:image/png;base64,YWJj");
    }

    #[tokio::test]
    async fn missing_api_key_is_an_item_failure() {
        let result = gateway().extract(&ReceiptSource::new("scan.png")).await;
        assert!(matches!(result, Err(ExtractionFailure::Unconfigured(_))));
    }
}
