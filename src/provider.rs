use serde::Serialize;

use crate::error::SiroccoError;

/// Acceleration providers in priority order. QNN (Hexagon NPU) first,
/// then SNPE, then DirectML which may reach an NPU on Windows-on-ARM.
pub const ACCELERATION_PROVIDERS: [&str; 3] = [
    "QNNExecutionProvider",
    "SNPEExecutionProvider",
    "DMLExecutionProvider",
];

/// Always-available CPU execution path.
pub const FALLBACK_PROVIDER: &str = "CPUExecutionProvider";

/// Source of the host's available execution providers.
///
/// `Err(ProbeUnavailable)` models "no tensor runtime installed on this
/// host" — a normal condition, never fatal.
pub trait CapabilitySource: Send + Sync {
    fn available_providers(&self) -> Result<Vec<String>, SiroccoError>;
}

/// The default when no tensor runtime is wired in.
pub struct NullCapabilitySource;

impl CapabilitySource for NullCapabilitySource {
    fn available_providers(&self) -> Result<Vec<String>, SiroccoError> {
        Err(SiroccoError::ProbeUnavailable)
    }
}

/// Fixed provider list, injected from the environment or from tests.
pub struct StaticCapabilitySource {
    providers: Vec<String>,
}

impl StaticCapabilitySource {
    pub fn new(providers: Vec<String>) -> Self {
        Self { providers }
    }
}

impl CapabilitySource for StaticCapabilitySource {
    fn available_providers(&self) -> Result<Vec<String>, SiroccoError> {
        Ok(self.providers.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub available: bool,
    pub is_acceleration_provider: bool,
}

/// Result of one detection pass. Immutable until the next `detect()`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSelection {
    pub available_providers: Vec<String>,
    pub npu_available: bool,
    pub selected_provider: String,
    pub runtime_available: bool,
}

impl Default for ProviderSelection {
    fn default() -> Self {
        Self {
            available_providers: Vec::new(),
            npu_available: false,
            selected_provider: FALLBACK_PROVIDER.to_string(),
            runtime_available: false,
        }
    }
}

/// Detects which acceleration backend a downstream engine should request.
pub struct NpuDetector {
    source: Box<dyn CapabilitySource>,
    selection: ProviderSelection,
}

impl NpuDetector {
    pub fn new(source: Box<dyn CapabilitySource>) -> Self {
        Self {
            source,
            selection: ProviderSelection::default(),
        }
    }

    /// Single best-effort probe, no retries. Recomputes the selection:
    /// first priority-ordered acceleration provider present in the
    /// availability set, else the CPU fallback. A missing runtime yields
    /// the fallback with `runtime_available = false` — not an error.
    pub fn detect(&mut self) -> &ProviderSelection {
        let available = match self.source.available_providers() {
            Ok(list) => list,
            Err(SiroccoError::ProbeUnavailable) => {
                tracing::warn!("tensor runtime not installed — NPU detection skipped");
                self.selection = ProviderSelection::default();
                return &self.selection;
            }
            Err(e) => {
                tracing::error!("capability probe failed: {e}");
                self.selection = ProviderSelection::default();
                return &self.selection;
            }
        };

        tracing::info!("available execution providers: {available:?}");

        let selected = ACCELERATION_PROVIDERS
            .iter()
            .find(|p| available.iter().any(|a| a == *p));

        self.selection = match selected {
            Some(provider) => {
                tracing::info!("NPU acceleration available via {provider}");
                ProviderSelection {
                    available_providers: available,
                    npu_available: true,
                    selected_provider: provider.to_string(),
                    runtime_available: true,
                }
            }
            None => {
                tracing::warn!("no NPU provider found, falling back to CPU");
                ProviderSelection {
                    available_providers: available,
                    npu_available: false,
                    selected_provider: FALLBACK_PROVIDER.to_string(),
                    runtime_available: true,
                }
            }
        };

        &self.selection
    }

    pub fn selection(&self) -> &ProviderSelection {
        &self.selection
    }

    /// Per-provider view over the known names plus the fallback.
    pub fn providers(&self) -> Vec<ProviderInfo> {
        ACCELERATION_PROVIDERS
            .iter()
            .map(|name| ProviderInfo {
                name: name.to_string(),
                available: self
                    .selection
                    .available_providers
                    .iter()
                    .any(|a| a == name),
                is_acceleration_provider: true,
            })
            .chain(std::iter::once(ProviderInfo {
                name: FALLBACK_PROVIDER.to_string(),
                available: true,
                is_acceleration_provider: false,
            }))
            .collect()
    }

    /// Ordered provider list a downstream engine would request: the
    /// selected accelerator first, CPU as fallback.
    pub fn execution_providers(&self) -> Vec<String> {
        if self.selection.npu_available {
            vec![
                self.selection.selected_provider.clone(),
                FALLBACK_PROVIDER.to_string(),
            ]
        } else {
            vec![FALLBACK_PROVIDER.to_string()]
        }
    }

    /// Human-readable report of the current selection state.
    pub fn status_report(&self) -> String {
        let rule = "=".repeat(60);
        let available = if self.selection.available_providers.is_empty() {
            "None".to_string()
        } else {
            self.selection.available_providers.join(", ")
        };

        format!(
            "{rule}\n\
             NPU Acceleration Status\n\
             {rule}\n\
             Tensor Runtime Available: {}\n\
             NPU Available: {}\n\
             Selected Provider: {}\n\
             All Available Providers: {available}\n\
             {rule}",
            self.selection.runtime_available,
            self.selection.npu_available,
            self.selection.selected_provider,
        )
    }
}
