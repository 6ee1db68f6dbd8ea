use crate::core::environment::{EnvResult, Environment};
use url::Url;

/// One step of the environment-fault fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackStep {
    Refresh,
    Restore(Url),
    GoBack,
}

impl FallbackStep {
    pub fn name(&self) -> String {
        match self {
            FallbackStep::Refresh => "refresh".to_string(),
            FallbackStep::Restore(url) => format!("restore {}", url),
            FallbackStep::GoBack => "go back".to_string(),
        }
    }

    pub async fn apply(&self, env: &dyn Environment) -> EnvResult<()> {
        match self {
            FallbackStep::Refresh => env.refresh().await,
            FallbackStep::Restore(url) => env.navigate_to(url).await,
            FallbackStep::GoBack => env.go_back().await,
        }
    }
}

/// Refresh in place, then return to the last known-good view (or back in
/// history when none is known).
pub fn fallback_plan(known_good: Option<&str>) -> [FallbackStep; 2] {
    let second = known_good
        .and_then(|loc| Url::parse(loc).ok())
        .map(FallbackStep::Restore)
        .unwrap_or(FallbackStep::GoBack);
    [FallbackStep::Refresh, second]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prefers_known_good_view() {
        let plan = fallback_plan(Some("https://jobs.example.com/listing/4"));
        assert_eq!(plan[0], FallbackStep::Refresh);
        assert!(matches!(plan[1], FallbackStep::Restore(ref u) if u.path() == "/listing/4"));

        assert_eq!(fallback_plan(None)[1], FallbackStep::GoBack);
        assert_eq!(fallback_plan(Some("about-blank-ish"))[1], FallbackStep::GoBack);
    }
}
