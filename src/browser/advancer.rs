use super::navigation::wait_for_page_load;
use crate::core::config::AdvancerConfig;
use crate::core::sources::JobAdvancer;
use crate::errors::{PilotError, Result};
use async_trait::async_trait;
use headless_chrome::Tab;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const ADVANCE_SCRIPT: &str = r#"
(function(cfg) {
    const cards = Array.from(document.querySelectorAll(cfg.listing));
    if (cards.length === 0) {
        return { moved: 'none', count: 0, active: -1 };
    }
    const isActive = (el) => cfg.hints.some(h =>
        el.classList.contains(h) || el.querySelector('.' + CSS.escape(h)) !== null);
    let active = cards.findIndex(isActive);
    if (active < 0) { active = 0; }
    cfg.hints.forEach(h => cards[active].classList.remove(h));
    if (active + 1 < cards.length) {
        const next = cards[active + 1];
        const link = next.querySelector(cfg.link) || next;
        next.scrollIntoView();
        if (cfg.hints.length > 0) { next.classList.add(cfg.hints[0]); }
        link.click();
        return { moved: 'card', count: cards.length, active: active + 1 };
    }
    const nextPage = document.querySelector(cfg.nextPage);
    if (nextPage) {
        nextPage.click();
        return { moved: 'page', count: cards.length, active: active };
    }
    return { moved: 'none', count: cards.length, active: active };
})
"#;

#[derive(Debug, Deserialize)]
struct AdvanceResult {
    moved: String,
    count: u64,
    active: i64,
}

/// Walks a listing page: clicks the card after the active one, or the
/// next-page control once the last card is active.
pub struct ListingAdvancer {
    tab: Arc<Tab>,
    config: AdvancerConfig,
    page_load_timeout: Duration,
}

impl ListingAdvancer {
    pub fn new(tab: Arc<Tab>, config: AdvancerConfig, page_load_timeout: Duration) -> Self {
        Self {
            tab,
            config,
            page_load_timeout,
        }
    }

    fn script(&self) -> Result<String> {
        let cfg = serde_json::json!({
            "listing": self.config.listing_selector,
            "hints": self.config.active_class_hints,
            "link": self.config.link_selector,
            "nextPage": self.config.next_page_selector,
        });
        Ok(format!("{}({})", ADVANCE_SCRIPT.trim(), serde_json::to_string(&cfg)?))
    }
}

#[async_trait]
impl JobAdvancer for ListingAdvancer {
    async fn advance(&self) -> Result<()> {
        let script = self.script()?;
        let value = self
            .tab
            .evaluate(&script, false)
            .map_err(|e| PilotError::AdvancementFailed(e.to_string()))?
            .value
            .ok_or_else(|| PilotError::AdvancementFailed("advance script returned nothing".into()))?;
        let result: AdvanceResult = serde_json::from_value(value)?;

        match result.moved.as_str() {
            "card" | "page" => {
                info!(
                    moved = %result.moved,
                    active = result.active,
                    listings = result.count,
                    "advanced to next listing"
                );
                wait_for_page_load(&self.tab, self.page_load_timeout)
                    .await
                    .map_err(|e| PilotError::AdvancementFailed(e.to_string()))
            }
            _ => {
                warn!(listings = result.count, "no further listings");
                Err(PilotError::AdvancementFailed(format!(
                    "no listing after index {} of {}",
                    result.active, result.count
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_result_shape_deserializes() {
        let value = serde_json::json!({ "moved": "page", "count": 12, "active": 11 });
        let result: super::AdvanceResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.moved, "page");
        assert_eq!(result.count, 12);
        assert_eq!(result.active, 11);
    }
}
