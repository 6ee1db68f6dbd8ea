use super::navigation::{js_string, wait_for_page_load, xpath_contains, xpath_literal};
use crate::core::config::BrowserConfig;
use crate::core::environment::{
    ElementRef, EnvResult, Environment, SelectChoice, Selector, SelectorKind,
};
use crate::core::sources::FrameSource;
use crate::errors::{EnvironmentError, PilotError, Result};
use crate::types::Point;
use crate::vision::Frame;
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::{json, Value};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// How long a selector lookup waits for its element to appear.
const ELEMENT_WAIT: Duration = Duration::from_secs(10);

const CLEAR_FN: &str = r#"
    function() {
        this.focus();
        this.value = '';
        this.dispatchEvent(new Event('input', { bubbles: true }));
        this.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
    }
"#;

const SELECT_FN: &str = r#"
    function(mode, wanted) {
        if (!this.options) { return false; }
        const options = Array.from(this.options);
        let index = -1;
        if (mode === 'value') {
            index = options.findIndex(o => o.value === wanted);
        } else if (mode === 'text') {
            index = options.findIndex(o => o.text.trim() === wanted.trim());
        } else {
            index = wanted < options.length ? wanted : -1;
        }
        if (index < 0) { return false; }
        this.selectedIndex = index;
        this.dispatchEvent(new Event('input', { bubbles: true }));
        this.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
    }
"#;

/// A headless Chrome tab acting as both frame source and execution
/// environment.
pub struct ChromeEnvironment {
    _browser: Browser,
    tab: Arc<Tab>,
    page_load_timeout: Duration,
}

impl ChromeEnvironment {
    pub fn launch(config: &BrowserConfig, page_load_timeout_ms: u64) -> Result<Self> {
        let window_size_arg = format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        );
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));

        let mut args = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new(&window_size_arg),
        ];
        if let Some(ref ua_arg) = user_agent_arg {
            args.push(OsStr::new(ua_arg));
        }
        if config.disable_images {
            args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .args(args)
            .build()
            .map_err(|e| PilotError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| PilotError::LaunchFailed(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| PilotError::LaunchFailed(e.to_string()))?;
        tab.set_default_timeout(Duration::from_millis(config.timeout_ms));

        info!(
            headless = config.headless,
            width = config.viewport.width,
            height = config.viewport.height,
            "chrome launched"
        );

        Ok(Self {
            _browser: browser,
            tab,
            page_load_timeout: Duration::from_millis(page_load_timeout_ms),
        })
    }

    /// Shared handle for collaborators that drive the same tab.
    pub fn tab(&self) -> Arc<Tab> {
        self.tab.clone()
    }

    pub fn page_load_timeout(&self) -> Duration {
        self.page_load_timeout
    }

    /// A live tab answers a trivial evaluation; a crashed or disconnected one
    /// does not.
    fn is_alive(&self) -> bool {
        self.tab.evaluate("1", false).is_ok()
    }

    fn missing(&self, err: impl std::fmt::Display) -> EnvironmentError {
        if self.is_alive() {
            EnvironmentError::ElementNotFound(err.to_string())
        } else {
            EnvironmentError::Fault(err.to_string())
        }
    }

    fn rejected(&self, err: impl std::fmt::Display) -> EnvironmentError {
        if self.is_alive() {
            EnvironmentError::Rejected(err.to_string())
        } else {
            EnvironmentError::Fault(err.to_string())
        }
    }

    fn evaluate(&self, script: &str) -> EnvResult<Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| self.rejected(e))?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn locate(&self, selector: &Selector) -> EnvResult<Element<'_>> {
        let found = match selector.kind {
            SelectorKind::Xpath => self
                .tab
                .wait_for_xpath_with_custom_timeout(&selector.value, ELEMENT_WAIT),
            _ => self
                .tab
                .wait_for_element_with_custom_timeout(&selector.value, ELEMENT_WAIT),
        };
        found.map_err(|e| self.missing(format!("{}: {}", selector, e)))
    }

    /// First XPath among `candidates` that matches anything, without waiting.
    fn first_xpath_match(&self, candidates: &[String]) -> EnvResult<Option<String>> {
        for xpath in candidates {
            let script = format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue !== null",
                js_string(xpath)
            );
            if self.evaluate(&script)?.as_bool() == Some(true) {
                return Ok(Some(xpath.clone()));
            }
        }
        Ok(None)
    }

    async fn settle(&self) -> EnvResult<()> {
        wait_for_page_load(&self.tab, self.page_load_timeout)
            .await
            .map_err(|e| match e {
                EnvironmentError::Rejected(reason) => EnvironmentError::Rejected(reason),
                other => self.rejected(other),
            })
    }
}

#[async_trait]
impl FrameSource for ChromeEnvironment {
    async fn capture(&self) -> Result<Frame> {
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| PilotError::CaptureFailed(e.to_string()))?;
        debug!(bytes = png.len(), "screenshot captured");
        Ok(Frame::decode(&png))
    }
}

#[async_trait]
impl Environment for ChromeEnvironment {
    async fn resolve_by_selector(&self, selector: &Selector) -> EnvResult<ElementRef> {
        let selector = selector.normalized();
        self.locate(&selector)?;
        let description = selector.to_string();
        Ok(ElementRef::new(selector, description))
    }

    async fn resolve_by_text(&self, text: &str) -> EnvResult<ElementRef> {
        let literal = xpath_literal(text.trim());
        let candidates = [
            format!("//button[{}]", xpath_contains(".", text)),
            format!("//a[{}]", xpath_contains(".", text)),
            format!(
                "//*[@role='button' or @type='submit' or @type='button'][{} or {}]",
                xpath_contains(".", text),
                xpath_contains("@value", text)
            ),
            format!("//*[contains(text(), {})]", literal),
            format!("//*[text()][{}]", xpath_contains("text()", text)),
        ];
        match self.first_xpath_match(&candidates)? {
            Some(xpath) => Ok(ElementRef::new(
                Selector::xpath(xpath),
                format!("text '{}'", text),
            )),
            None => Err(EnvironmentError::ElementNotFound(format!(
                "no element with text '{}'",
                text
            ))),
        }
    }

    async fn resolve_input_by_label(&self, label: &str) -> EnvResult<ElementRef> {
        let label_path = format!("//label[{}]", xpath_contains(".", label));
        let candidates = [
            format!("//*[@id={}/@for]", label_path),
            format!("{}//input[1]", label_path),
            format!("{}/following::input[1]", label_path),
            format!("{}/following::textarea[1]", label_path),
            format!("{}/following::select[1]", label_path),
        ];
        match self.first_xpath_match(&candidates)? {
            Some(xpath) => Ok(ElementRef::new(
                Selector::xpath(xpath),
                format!("input labelled '{}'", label),
            )),
            None => Err(EnvironmentError::ElementNotFound(format!(
                "no input labelled '{}'",
                label
            ))),
        }
    }

    async fn click(&self, element: &ElementRef) -> EnvResult<()> {
        self.locate(&element.selector)?
            .click()
            .map_err(|e| self.rejected(e))?;
        debug!(element = %element.description, "clicked");
        Ok(())
    }

    async fn click_at(&self, point: Point) -> EnvResult<()> {
        let script = format!(
            r#"
            (function() {{
                const element = document.elementFromPoint({}, {});
                if (!element) {{ return false; }}
                element.click();
                return true;
            }})()
        "#,
            point.x, point.y
        );
        match self.evaluate(&script)?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(EnvironmentError::ElementNotFound(format!(
                "nothing at ({}, {})",
                point.x, point.y
            ))),
        }
    }

    async fn clear(&self, element: &ElementRef) -> EnvResult<()> {
        self.locate(&element.selector)?
            .call_js_fn(CLEAR_FN, vec![], false)
            .map_err(|e| self.rejected(e))?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> EnvResult<()> {
        self.locate(&element.selector)?
            .type_into(text)
            .map_err(|e| self.rejected(e))?;
        debug!(element = %element.description, chars = text.chars().count(), "typed");
        Ok(())
    }

    async fn select_option(&self, element: &ElementRef, choice: &SelectChoice) -> EnvResult<()> {
        let args = match choice {
            SelectChoice::Value(value) => vec![json!("value"), json!(value)],
            SelectChoice::VisibleText(text) => vec![json!("text"), json!(text)],
            SelectChoice::Index(index) => vec![json!("index"), json!(index)],
        };
        let result = self
            .locate(&element.selector)?
            .call_js_fn(SELECT_FN, args, false)
            .map_err(|e| self.rejected(e))?;
        match result.value.and_then(|v| v.as_bool()) {
            Some(true) => Ok(()),
            _ => Err(EnvironmentError::Rejected(format!(
                "{} has no option matching {:?}",
                element.description, choice
            ))),
        }
    }

    async fn scroll_by(&self, dy: i64) -> EnvResult<()> {
        self.evaluate(&format!("window.scrollBy(0, {})", dy))?;
        Ok(())
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> EnvResult<()> {
        self.locate(&element.selector)?
            .scroll_into_view()
            .map_err(|e| self.rejected(e))?;
        Ok(())
    }

    async fn navigate_to(&self, url: &Url) -> EnvResult<()> {
        info!(url = %url, "navigating");
        self.tab
            .navigate_to(url.as_str())
            .map_err(|e| self.rejected(e))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| self.rejected(e))?;
        self.settle().await
    }

    async fn current_location(&self) -> EnvResult<String> {
        Ok(self.tab.get_url())
    }

    async fn refresh(&self) -> EnvResult<()> {
        self.tab
            .reload(false, None)
            .map_err(|e| self.rejected(e))?;
        self.settle().await
    }

    async fn go_back(&self) -> EnvResult<()> {
        let before = self.tab.get_url();
        self.evaluate("window.history.back()")?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.settle().await?;
        if self.tab.get_url() == before {
            warn!(url = %before, "history did not move back");
        }
        Ok(())
    }
}
