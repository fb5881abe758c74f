use std::time::Duration;

use futures_util::future::Either;
use futures_util::{Stream, StreamExt, TryStreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{PROBE_TIMEOUT, REQUEST_TIMEOUT};
use crate::error::SiroccoError;
use crate::stream::ChunkStream;

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Client for a local Ollama-compatible server.
///
/// Holds only read-only configuration and a pooled HTTP client; concurrent
/// calls open independent connections and share no mutable state.
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    http: Client,
    request_timeout: Duration,
    probe_timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u64>,
}

/// One entry from `GET /api/tags`. Extra server fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self::with_timeouts(base_url, model, REQUEST_TIMEOUT, PROBE_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: String,
        model: String,
        request_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http,
            request_timeout,
            probe_timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Liveness probe against the tags endpoint. True iff the server
    /// answers 200 within the probe timeout; never returns an error.
    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self.http.get(&url).timeout(self.probe_timeout).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                tracing::info!("connected to server at {}", self.base_url);
                true
            }
            Ok(resp) => {
                tracing::error!("server returned status {} on liveness probe", resp.status());
                false
            }
            Err(e) => {
                tracing::error!("failed to reach server at {}: {e}", self.base_url);
                false
            }
        }
    }

    /// List models known to the server. None on any failure.
    pub async fn list_models(&self) -> Option<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);

        let resp = match self.http.get(&url).timeout(self.probe_timeout).send().await {
            Ok(r) if r.status() == reqwest::StatusCode::OK => r,
            Ok(r) => {
                tracing::error!("model listing returned status {}", r.status());
                return None;
            }
            Err(e) => {
                tracing::error!("model listing failed: {e}");
                return None;
            }
        };

        match resp.json::<TagsResponse>().await {
            Ok(tags) => {
                tracing::info!("found {} available model(s)", tags.models.len());
                Some(tags.models)
            }
            Err(e) => {
                tracing::error!("failed to parse model listing: {e}");
                None
            }
        }
    }

    /// Structured-error generation: opens the streaming connection and
    /// returns the chunk decoder. Connect failures, timeouts, and non-200
    /// statuses surface as typed errors; mid-stream failures surface as
    /// `Err` items on the returned stream.
    pub async fn generate_chunks(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: Option<u64>,
    ) -> Result<ChunkStream, SiroccoError> {
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature,
                num_predict: max_tokens,
            },
        };

        tracing::info!("sending prompt to model '{}'", self.model);

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.request_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(SiroccoError::from_transport)?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(SiroccoError::Protocol { status });
        }

        let body = response
            .bytes_stream()
            .map_err(SiroccoError::from_transport)
            .boxed();

        Ok(ChunkStream::new(body))
    }

    /// Compatibility-mode generation: a lazy sequence of text fragments in
    /// wire order. Any failure — connect, non-200, or mid-stream — becomes
    /// one terminal `"\nError: ...\n"` fragment and the sequence ends.
    /// This call never raises; failure is observable only as text.
    pub fn generate_streaming(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: Option<u64>,
    ) -> impl Stream<Item = String> + Send + use<> {
        let client = self.clone();
        let prompt = prompt.to_string();

        let opened = async move {
            match client.generate_chunks(&prompt, temperature, max_tokens).await {
                Ok(chunks) => Either::Left(chunks.map(|item| match item {
                    Ok(chunk) => chunk.text,
                    Err(e) => {
                        tracing::error!("generation stream failed: {e}");
                        e.inline_text()
                    }
                })),
                Err(e) => {
                    tracing::error!("generation request failed: {e}");
                    Either::Right(stream::iter([e.inline_text()]))
                }
            }
        };

        stream::once(opened).flatten()
    }

    /// Non-streaming convenience: drains the streaming sequence into one
    /// string. Identical failure behavior — errors appear inline.
    pub async fn generate(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: Option<u64>,
    ) -> String {
        let mut stream = std::pin::pin!(self.generate_streaming(prompt, temperature, max_tokens));
        let mut result = String::new();
        while let Some(fragment) = stream.next().await {
            result.push_str(&fragment);
        }
        result
    }
}
