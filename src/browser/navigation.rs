use crate::core::environment::EnvResult;
use crate::errors::EnvironmentError;
use headless_chrome::Tab;
use std::time::{Duration, Instant};
use tracing::debug;

const READY_STATE_CHECK: &str = "document.readyState === 'complete'";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `document.readyState` until the page reports complete.
pub async fn wait_for_page_load(tab: &Tab, timeout: Duration) -> EnvResult<()> {
    let start_time = Instant::now();

    while start_time.elapsed() < timeout {
        let result = tab
            .evaluate(READY_STATE_CHECK, false)
            .map_err(EnvironmentError::from_any_error)?;

        if result.value.and_then(|v| v.as_bool()) == Some(true) {
            debug!(elapsed_ms = start_time.elapsed().as_millis() as u64, "page loaded");
            return Ok(());
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }

    Err(EnvironmentError::Rejected(format!(
        "page load did not complete within {} ms",
        timeout.as_millis()
    )))
}

/// A JavaScript string literal for `value`.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// An XPath 1.0 string literal for `value`. XPath has no escapes, so a value
/// holding both quote kinds is spliced together with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// Case-insensitive `contains()` over `expr` for a needle.
pub fn xpath_contains(expr: &str, needle: &str) -> String {
    format!(
        "contains(translate(normalize-space({}), '{}', '{}'), {})",
        expr,
        UPPER,
        LOWER,
        xpath_literal(&needle.trim().to_lowercase())
    )
}
