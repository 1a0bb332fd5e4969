#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for one document's execution engine.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of retained state snapshots. Oldest (lowest position)
    /// entries are evicted first.
    pub max_history: usize,
    /// Drop underscore-prefixed bindings from the shared namespace after
    /// each fragment.
    pub private_names: bool,
    /// Namespace key holding the last captured value.
    pub result_key: String,
    /// Namespace key where the plotting hook leaves a shown figure.
    pub figure_key: String,
    /// Attach fragment source text to failure logs.
    pub verbose: bool,
    /// Source executed once at initialization; its bindings become part of
    /// the reset baseline.
    pub prelude: Option<String>,
    /// Path segment under the document where fragment files live.
    pub code_root: String,
    /// Scheme used when building source locators.
    pub store_scheme: String,
    /// Directory the plotting hook pretends to save figures into.
    pub figure_dir: String,
    /// Maximum nesting of user function calls.
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_history: 256,
            private_names: false,
            result_key: "_pc_last".to_string(),
            figure_key: "_pc_figure".to_string(),
            verbose: false,
            prelude: None,
            code_root: "pycell".to_string(),
            store_scheme: "mem".to_string(),
            figure_dir: "figures".to_string(),
            max_call_depth: 200,
        }
    }
}

impl EngineConfig {
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max.max(1);
        self
    }

    pub fn with_private_names(mut self, enabled: bool) -> Self {
        self.private_names = enabled;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_prelude(mut self, prelude: impl Into<String>) -> Self {
        self.prelude = Some(prelude.into());
        self
    }

    pub fn with_store_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.store_scheme = scheme.into();
        self
    }

    /// Keys the engine writes itself; never filtered as private names.
    pub fn is_reserved(&self, name: &str) -> bool {
        name == self.result_key || name == self.figure_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_history, 256);
        assert!(!cfg.private_names);
        assert!(cfg.is_reserved("_pc_last"));
        assert!(cfg.is_reserved("_pc_figure"));
        assert!(!cfg.is_reserved("_x"));
    }

    #[test]
    fn history_never_below_one() {
        let cfg = EngineConfig::default().with_max_history(0);
        assert_eq!(cfg.max_history, 1);
    }
}
