use futures_util::future::Either;
use futures_util::{Stream, StreamExt, stream};
use serde::Serialize;

use crate::client::OllamaClient;
use crate::config::Config;
use crate::provider::{
    CapabilitySource, NpuDetector, NullCapabilitySource, ProviderSelection,
    StaticCapabilitySource,
};

/// Read-only engine snapshot, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub model: String,
    pub base_url: String,
    pub initialized: bool,
    #[serde(flatten)]
    pub selection: ProviderSelection,
}

/// Facade combining NPU detection with server-side model inference.
///
/// The provider selection reports which backend a native-runtime engine
/// would request; generation itself always goes through the server.
pub struct InferenceEngine {
    detector: NpuDetector,
    client: OllamaClient,
    initialized: bool,
}

impl InferenceEngine {
    pub fn new(config: Config) -> Self {
        let source: Box<dyn CapabilitySource> = match config.providers {
            Some(providers) => Box::new(StaticCapabilitySource::new(providers)),
            None => Box::new(NullCapabilitySource),
        };

        Self {
            detector: NpuDetector::new(source),
            client: OllamaClient::new(config.base_url, config.model),
            initialized: false,
        }
    }

    pub fn with_parts(detector: NpuDetector, client: OllamaClient) -> Self {
        Self {
            detector,
            client,
            initialized: false,
        }
    }

    /// Run the detection pass and verify the server is reachable.
    /// False means the engine is unusable (server down); a missing NPU is
    /// a normal outcome and does not fail initialization.
    pub async fn initialize(&mut self) -> bool {
        tracing::info!("initializing inference engine");
        tracing::info!("target model: {}", self.client.model());
        tracing::info!("server url: {}", self.client.base_url());

        self.detector.detect();
        println!("{}", self.detector.status_report());

        if !self.client.check_connection().await {
            tracing::error!("failed to connect to server");
            return false;
        }

        if let Some(models) = self.client.list_models().await {
            let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            tracing::info!("available models: {}", names.join(", "));

            if !names.contains(&self.client.model()) {
                tracing::warn!(
                    "model '{}' not found on server — pull it first: ollama pull {}",
                    self.client.model(),
                    self.client.model()
                );
            }
        }

        self.initialized = true;
        tracing::info!("inference engine initialized");
        true
    }

    /// Streaming generation with the client's inline-error behavior.
    /// Before `initialize()`, the sequence is a single guard fragment.
    pub fn generate_streaming(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: Option<u64>,
    ) -> impl Stream<Item = String> + Send + use<> {
        if !self.initialized {
            tracing::error!("engine not initialized — call initialize() first");
            return Either::Right(stream::iter([
                "Error: engine not initialized\n".to_string(),
            ]));
        }

        Either::Left(self.client.generate_streaming(prompt, temperature, max_tokens))
    }

    /// Non-streaming drain; same guard and failure behavior.
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

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            model: self.client.model().to_string(),
            base_url: self.client.base_url().to_string(),
            initialized: self.initialized,
            selection: self.detector.selection().clone(),
        }
    }

    pub fn status_report(&self) -> String {
        self.detector.status_report()
    }
}
