//! Model identity — the stable names a front end uses to pick a decoder.
//!
//! Static metadata attached to a model type, never mutable state. Changing
//! any of these strings breaks every deployed front end.

use serde_json::{Map, Value};

pub const MODEL_MODULE: &str = "jupyter-datawidgets";
pub const MODEL_MODULE_VERSION: &str = "~4.0.0";

/// Model-kind triple sent in the creation handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelIdentity {
    pub model_name: &'static str,
    pub model_module: &'static str,
    pub model_module_version: &'static str,
}

/// Identity of the plain array model.
pub const NDARRAY_MODEL: ModelIdentity = ModelIdentity {
    model_name: "NDArrayModel",
    model_module: MODEL_MODULE,
    model_module_version: MODEL_MODULE_VERSION,
};

impl ModelIdentity {
    /// Handshake state keys, in the order front ends expect them.
    pub fn state_fields(&self) -> Map<String, Value> {
        let mut state = Map::new();
        state.insert("_model_name".to_string(), Value::from(self.model_name));
        state.insert("_model_module".to_string(), Value::from(self.model_module));
        state.insert(
            "_model_module_version".to_string(),
            Value::from(self.model_module_version),
        );
        state
    }
}

/// True for the handshake keys produced by `state_fields`.
pub fn is_identity_key(key: &str) -> bool {
    matches!(
        key,
        "_model_name" | "_model_module" | "_model_module_version"
    )
}
