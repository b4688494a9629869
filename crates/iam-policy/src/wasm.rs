//! WASM bindings for the policy evaluator.

#![cfg(feature = "wasm")]

use crate::context::AttributeStore;
use crate::decision::Decision;
use crate::evaluator::PolicyEvaluator;
use crate::request::{Request, Resource};
use wasm_bindgen::prelude::*;

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// WASM-compatible evaluator wrapper.
#[wasm_bindgen]
pub struct WasmPolicyEvaluator {
    evaluator: PolicyEvaluator,
}

#[wasm_bindgen]
impl WasmPolicyEvaluator {
    /// Creates an evaluator; `strict` rejects unknown operators.
    #[wasm_bindgen(constructor)]
    pub fn new(strict: bool) -> Self {
        let evaluator = if strict {
            PolicyEvaluator::strict()
        } else {
            PolicyEvaluator::new()
        };
        Self { evaluator }
    }

    /// Evaluates a policy (JSON) against a resource chain (JSON array of nodes).
    #[wasm_bindgen]
    pub fn evaluate(&self, policy_json: &str, system: &str, resource_json: &str) -> Result<bool, JsValue> {
        let policy: serde_json::Value = serde_json::from_str(policy_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid policy: {}", e)))?;
        let resource: Resource = serde_json::from_str(resource_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid resource: {}", e)))?;

        self.evaluator
            .evaluate_resource(&policy, system, &resource)
            .map_err(js_error)
    }

    /// Evaluates and returns the decision, with its renderings, as a JSON string.
    #[wasm_bindgen]
    pub fn explain(&self, policy_json: &str, system: &str, resource_json: &str) -> Result<String, JsValue> {
        let policy: serde_json::Value = serde_json::from_str(policy_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid policy: {}", e)))?;
        let resource: Resource = serde_json::from_str(resource_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid resource: {}", e)))?;

        // std::time::Instant is unavailable on wasm32-unknown-unknown
        let start = js_sys::Date::now();
        let store = AttributeStore::from_resource(system, &resource, false).map_err(js_error)?;
        let expr = self.evaluator.parse(&policy).map_err(js_error)?;
        let allowed = expr.eval(&store).map_err(js_error)?;
        let elapsed_us = ((js_sys::Date::now() - start) * 1000.0) as u64;

        let decision = Decision::new(allowed, expr.to_string(), expr.render(&store))
            .with_evaluation_time(elapsed_us);

        serde_json::to_string(&decision).map_err(js_error)
    }

    /// Returns the canonical text of a policy.
    #[wasm_bindgen]
    pub fn describe(&self, policy_json: &str) -> Result<String, JsValue> {
        let policy: serde_json::Value = serde_json::from_str(policy_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid policy: {}", e)))?;

        self.evaluator
            .parse(&policy)
            .map(|expr| expr.to_string())
            .map_err(js_error)
    }
}

/// Computes the cache fingerprint of a request (JSON).
#[wasm_bindgen]
pub fn request_fingerprint(request_json: &str) -> Result<String, JsValue> {
    let request: Request = serde_json::from_str(request_json)
        .map_err(|e| JsValue::from_str(&format!("Invalid request: {}", e)))?;
    request.fingerprint().map_err(js_error)
}

/// Logs a message to the console (for debugging).
#[wasm_bindgen]
pub fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

/// Returns the version of the SDK.
#[wasm_bindgen]
pub fn version() -> String {
    crate::VERSION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"{"op": "in", "field": "host.id", "value": ["1", "2"]}"#;

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    #[cfg_attr(not(target_arch = "wasm32"), test)]
    fn test_wasm_evaluator() {
        let evaluator = WasmPolicyEvaluator::new(false);
        let resource = r#"[{"system": "bk_cmdb", "type": "host", "id": "2"}]"#;

        assert!(evaluator.evaluate(POLICY, "bk_cmdb", resource).unwrap());
        assert_eq!(evaluator.describe(POLICY).unwrap(), "(host.id in [1, 2])");
    }

    #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
    #[cfg_attr(not(target_arch = "wasm32"), test)]
    fn test_request_fingerprint() {
        let request = r#"{
            "system": "bk_cmdb",
            "subject": {"type": "user", "id": "admin"},
            "action": {"id": "view_host"},
            "resources": []
        }"#;
        assert_eq!(request_fingerprint(request).unwrap().len(), 64);
    }
}
