//! Test doubles for the collaborator seams, plus a painter for synthetic frames.

use crate::core::environment::{ElementRef, EnvResult, Environment, SelectChoice, Selector};
use crate::core::sources::{FrameSource, JobAdvancer};
use crate::errors::{EnvironmentError, PilotError, Result};
use crate::types::Point;
use crate::vision::Frame;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// Paints simple controls onto a white canvas.
pub struct FrameBuilder {
    image: RgbImage,
}

impl FrameBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
        }
    }

    /// Fill a rectangle, clipped to the canvas.
    pub fn fill(mut self, x: u32, y: u32, width: u32, height: u32, color: [u8; 3]) -> Self {
        let (w, h) = self.image.dimensions();
        for py in y..y.saturating_add(height).min(h) {
            for px in x..x.saturating_add(width).min(w) {
                self.image.put_pixel(px, py, Rgb(color));
            }
        }
        self
    }

    /// A flat dark-gray button.
    pub fn button(self, x: u32, y: u32, width: u32, height: u32) -> Self {
        self.fill(x, y, width, height, [70, 70, 70])
    }

    /// A square box; filled dark when checked, outlined otherwise.
    pub fn checkbox(self, x: u32, y: u32, size: u32, checked: bool) -> Self {
        let painted = self.fill(x, y, size, size, [20, 20, 20]);
        if checked || size < 6 {
            painted
        } else {
            painted.fill(x + 2, y + 2, size - 4, size - 4, [255, 255, 255])
        }
    }

    /// A ring of the given radius, with a filled dot when selected.
    pub fn radio(mut self, cx: u32, cy: u32, radius: u32, selected: bool) -> Self {
        let (w, h) = self.image.dimensions();
        let r = radius as f64;
        for y in 0..h {
            for x in 0..w {
                let dx = x as f64 - cx as f64;
                let dy = y as f64 - cy as f64;
                let d = (dx * dx + dy * dy).sqrt();
                let on_ring = d >= r - 3.0 && d <= r;
                let on_dot = selected && d <= r * 0.45;
                if on_ring || on_dot {
                    self.image.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        self
    }

    pub fn build(self) -> Frame {
        Frame::from_image(self.image)
    }

    pub fn png_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        // encoding an in-memory RGB buffer to PNG does not fail
        let _ = self.image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png);
        buf
    }
}

/// Frame source that hands out the same frame, with scripted capture failures.
pub struct ScriptedFrames {
    frame: Frame,
    state: Mutex<FrameScript>,
}

#[derive(Default)]
struct FrameScript {
    captures: usize,
    fail_next: usize,
    fail_at: Vec<usize>,
}

impl ScriptedFrames {
    pub fn repeating(frame: Frame) -> Self {
        Self {
            frame,
            state: Mutex::new(FrameScript::default()),
        }
    }

    /// Fail the next `count` captures.
    pub fn fail_next(&self, count: usize) {
        lock(&self.state).fail_next += count;
    }

    /// Fail the `n`th capture call (1-based) of the run.
    pub fn fail_at(&self, n: usize) {
        lock(&self.state).fail_at.push(n);
    }

    pub fn captures(&self) -> usize {
        lock(&self.state).captures
    }
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn capture(&self) -> Result<Frame> {
        let mut state = lock(&self.state);
        state.captures += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(PilotError::CaptureFailed("scripted capture failure".to_string()));
        }
        let n = state.captures;
        if state.fail_at.contains(&n) {
            return Err(PilotError::CaptureFailed(format!("scripted failure on capture {}", n)));
        }
        Ok(self.frame.clone())
    }
}

/// A primitive call made against a `RecordingEnvironment`.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ResolveSelector(Selector),
    ResolveText(String),
    ResolveLabel(String),
    Click(ElementRef),
    ClickAt(Point),
    Clear(ElementRef),
    SendKeys(ElementRef, String),
    Select(ElementRef, SelectChoice),
    ScrollBy(i64),
    ScrollIntoView(ElementRef),
    Navigate(String),
    Refresh,
    GoBack,
}

struct EnvState {
    calls: Vec<Call>,
    selector_failures: HashMap<String, EnvironmentError>,
    text_failures: HashMap<String, EnvironmentError>,
    next_primitive_failure: Option<EnvironmentError>,
    fail_refresh: bool,
    fail_go_back: bool,
    fail_navigation: bool,
    location: String,
}

/// Environment double: every resolution succeeds unless scripted to fail,
/// and every call is logged in order.
pub struct RecordingEnvironment {
    state: Mutex<EnvState>,
}

impl RecordingEnvironment {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EnvState {
                calls: Vec::new(),
                selector_failures: HashMap::new(),
                text_failures: HashMap::new(),
                next_primitive_failure: None,
                fail_refresh: false,
                fail_go_back: false,
                fail_navigation: false,
                location: "https://jobs.example.com/".to_string(),
            }),
        }
    }

    pub fn fail_selector(&self, selector: &str, err: EnvironmentError) {
        lock(&self.state).selector_failures.insert(selector.to_string(), err);
    }

    pub fn fail_text(&self, text: &str, err: EnvironmentError) {
        lock(&self.state).text_failures.insert(text.to_string(), err);
    }

    /// The next action primitive (not a resolution) fails with `err`.
    pub fn fail_next_primitive(&self, err: EnvironmentError) {
        lock(&self.state).next_primitive_failure = Some(err);
    }

    pub fn fail_refresh(&self, fail: bool) {
        lock(&self.state).fail_refresh = fail;
    }

    pub fn fail_go_back(&self, fail: bool) {
        lock(&self.state).fail_go_back = fail;
    }

    pub fn fail_navigation(&self, fail: bool) {
        lock(&self.state).fail_navigation = fail;
    }

    pub fn set_location(&self, location: &str) {
        lock(&self.state).location = location.to_string();
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.state).calls.clone()
    }

    pub fn refreshes(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Refresh)).count()
    }

    pub fn go_backs(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::GoBack)).count()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Navigate(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    fn primitive(&self, call: Call) -> EnvResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        match state.next_primitive_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for RecordingEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Environment for RecordingEnvironment {
    async fn resolve_by_selector(&self, selector: &Selector) -> EnvResult<ElementRef> {
        let mut state = lock(&self.state);
        state.calls.push(Call::ResolveSelector(selector.clone()));
        match state.selector_failures.get(&selector.value) {
            Some(err) => Err(err.clone()),
            None => Ok(ElementRef::new(selector.normalized(), selector.value.clone())),
        }
    }

    async fn resolve_by_text(&self, text: &str) -> EnvResult<ElementRef> {
        let mut state = lock(&self.state);
        state.calls.push(Call::ResolveText(text.to_string()));
        match state.text_failures.get(text) {
            Some(err) => Err(err.clone()),
            None => Ok(ElementRef::new(
                Selector::xpath(format!("//*[contains(text(), '{}')]", text)),
                text,
            )),
        }
    }

    async fn resolve_input_by_label(&self, label: &str) -> EnvResult<ElementRef> {
        let mut state = lock(&self.state);
        state.calls.push(Call::ResolveLabel(label.to_string()));
        match state.text_failures.get(label) {
            Some(err) => Err(err.clone()),
            None => Ok(ElementRef::new(
                Selector::xpath(format!("//label[contains(text(), '{}')]/following::input[1]", label)),
                label,
            )),
        }
    }

    async fn click(&self, element: &ElementRef) -> EnvResult<()> {
        self.primitive(Call::Click(element.clone()))
    }

    async fn click_at(&self, point: Point) -> EnvResult<()> {
        self.primitive(Call::ClickAt(point))
    }

    async fn clear(&self, element: &ElementRef) -> EnvResult<()> {
        self.primitive(Call::Clear(element.clone()))
    }

    async fn send_keys(&self, element: &ElementRef, text: &str) -> EnvResult<()> {
        self.primitive(Call::SendKeys(element.clone(), text.to_string()))
    }

    async fn select_option(&self, element: &ElementRef, choice: &SelectChoice) -> EnvResult<()> {
        self.primitive(Call::Select(element.clone(), choice.clone()))
    }

    async fn scroll_by(&self, dy: i64) -> EnvResult<()> {
        self.primitive(Call::ScrollBy(dy))
    }

    async fn scroll_into_view(&self, element: &ElementRef) -> EnvResult<()> {
        self.primitive(Call::ScrollIntoView(element.clone()))
    }

    async fn navigate_to(&self, url: &Url) -> EnvResult<()> {
        let fail = lock(&self.state).fail_navigation;
        self.primitive(Call::Navigate(url.to_string()))?;
        if fail {
            return Err(EnvironmentError::Fault(format!("cannot reach {}", url)));
        }
        lock(&self.state).location = url.to_string();
        Ok(())
    }

    async fn current_location(&self) -> EnvResult<String> {
        Ok(lock(&self.state).location.clone())
    }

    async fn refresh(&self) -> EnvResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(Call::Refresh);
        if state.fail_refresh {
            Err(EnvironmentError::Fault("refresh failed".to_string()))
        } else {
            Ok(())
        }
    }

    async fn go_back(&self) -> EnvResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(Call::GoBack);
        if state.fail_go_back {
            Err(EnvironmentError::Fault("no history".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Counts advances; optionally fails every one.
#[derive(Default)]
pub struct RecordingAdvancer {
    advances: AtomicUsize,
    fail: bool,
}

impl RecordingAdvancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            advances: AtomicUsize::new(0),
            fail: true,
        }
    }

    /// Number of advance calls, successful or not.
    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobAdvancer for RecordingAdvancer {
    async fn advance(&self) -> Result<()> {
        self.advances.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(PilotError::AdvancementFailed("no more listings".to_string()))
        } else {
            Ok(())
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{ElementKind, UiDetector};

    #[test]
    fn test_painted_frame_round_trips_through_png() {
        let builder = FrameBuilder::new(120, 80).button(10, 10, 60, 25);
        let frame = Frame::decode(&builder.png_bytes());
        assert_eq!((frame.width(), frame.height()), (120, 80));
        assert_eq!(frame.image().unwrap().get_pixel(20, 20), &Rgb([70, 70, 70]));
    }

    #[test]
    fn test_detector_finds_painted_checkbox() {
        let frame = FrameBuilder::new(120, 100).checkbox(50, 40, 20, true).build();
        let elements = UiDetector::default().detect(&frame);
        let checkbox = elements
            .iter()
            .find(|e| e.kind() == ElementKind::Checkbox)
            .expect("checkbox detected");
        assert_eq!(checkbox.is_checked(), Some(true));
    }

    #[tokio::test]
    async fn test_scripted_frames_fail_on_schedule() {
        let frames = ScriptedFrames::repeating(FrameBuilder::new(10, 10).build());
        frames.fail_at(2);
        assert!(frames.capture().await.is_ok());
        assert!(frames.capture().await.is_err());
        assert!(frames.capture().await.is_ok());
        assert_eq!(frames.captures(), 3);
    }

    #[tokio::test]
    async fn test_recording_environment_logs_failures() {
        let env = RecordingEnvironment::new();
        env.fail_next_primitive(EnvironmentError::Rejected("covered".into()));
        assert!(env.scroll_by(10).await.is_err());
        assert!(env.scroll_by(10).await.is_ok());
        assert_eq!(env.calls(), vec![Call::ScrollBy(10), Call::ScrollBy(10)]);
    }
}
