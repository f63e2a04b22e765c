use serde::{Deserialize, Serialize};

use crate::diagnostic::ErrorPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Name of the function treated as the program entry point.
    pub entry_point: String,
    pub policy: ErrorPolicy,
    /// Recoverable diagnostics allowed before the run is aborted.
    pub max_diagnostics: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            entry_point: "Main".to_string(),
            policy: ErrorPolicy::Accumulate,
            max_diagnostics: None,
        }
    }
}
