use std::env;
use std::sync::OnceLock;

use crate::ir::Precision;

static TENSORLINK_USE_BF16: OnceLock<bool> = OnceLock::new();
static TENSORLINK_PRECISION: OnceLock<Precision> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Reports whether f32 host tensors should marshal to bf16 device data.
/// Read once from `TENSORLINK_USE_BF16` and cached for the process.
pub(crate) fn use_bf16() -> bool {
    *TENSORLINK_USE_BF16.get_or_init(|| match env::var("TENSORLINK_USE_BF16") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

/// Operand precision attached to convolution ops, read once from
/// `TENSORLINK_PRECISION` (`default`, `high`, or `highest`).
pub(crate) fn matmul_precision() -> Precision {
    *TENSORLINK_PRECISION.get_or_init(|| match env::var("TENSORLINK_PRECISION") {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "high" => Precision::High,
            "highest" => Precision::Highest,
            _ => Precision::Default,
        },
        Err(_) => Precision::Default,
    })
}
