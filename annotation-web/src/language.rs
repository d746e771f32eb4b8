use anyhow::Context;
use serde::Deserialize;
use serde_json::json;

pub const LANGUAGE_ENDPOINT: &str = "https://language.googleapis.com";

/// Uploaded text documents are always analysed as English.
const DOCUMENT_LANGUAGE: &str = "en";
const ENCODING_TYPE: &str = "UTF8";

/// The overall tone of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Sentiment {
    /// From -1.0 (negative) to 1.0 (positive).
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub magnitude: f32,
}

#[async_trait::async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn analyze_sentiment(&self, source_uri: &str) -> anyhow::Result<Sentiment>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeSentimentResponse {
    #[serde(default)]
    document_sentiment: Sentiment,
}

/// Sentiment analysis through the Cloud Natural Language REST API.
#[derive(Clone)]
pub struct LanguageClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl LanguageClient {
    pub fn new(client: reqwest::Client, endpoint: &str, api_key: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl SentimentAnalyzer for LanguageClient {
    #[tracing::instrument(skip(self))]
    async fn analyze_sentiment(&self, source_uri: &str) -> anyhow::Result<Sentiment> {
        let body = json!({
            "document": {
                "type": "PLAIN_TEXT",
                "language": DOCUMENT_LANGUAGE,
                "gcsContentUri": source_uri,
            },
            "encodingType": ENCODING_TYPE,
        });

        let response = self
            .client
            .post(format!("{}/v1/documents:analyzeSentiment", self.endpoint))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .context("Failed to call the Natural Language API")?
            .error_for_status()
            .context("The Natural Language API rejected the sentiment request")?
            .json::<AnalyzeSentimentResponse>()
            .await
            .context("Failed to decode the Natural Language API response")?;

        let sentiment = response.document_sentiment;
        tracing::info!(
            magnitude = sentiment.magnitude,
            "Document sentiment score: {}",
            sentiment.score
        );

        Ok(sentiment)
    }
}
