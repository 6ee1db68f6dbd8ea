use crate::errors::{PilotError, Result};
use crate::types::Viewport;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MAX_APPLICATIONS_ENV: &str = "UI_PILOT_MAX_APPLICATIONS";
pub const HEADLESS_ENV: &str = "UI_PILOT_HEADLESS";
/// Smallest accepted `session.max_consecutive_faults`.
pub const MIN_FAULT_CAP: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub detector: DetectorConfig,
    pub session: SessionConfig,
    pub advancer: AdvancerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: Option<String>,
    pub disable_images: bool,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_applications: u32,
    pub policy_timeout_ms: u64,
    pub delay_between_actions_ms: u64,
    /// Ceiling for a single wait action.
    pub max_wait_ms: u64,
    pub page_load_timeout_ms: u64,
    pub max_consecutive_faults: u32,
    pub max_cycles: Option<u64>,
}

/// Selectors the Chrome listing advancer walks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancerConfig {
    pub listing_selector: String,
    pub active_class_hints: Vec<String>,
    pub link_selector: String,
    pub next_page_selector: String,
}

/// Calibration values for every detector family. None of these generalize
/// across arbitrary themes; tune them against labeled screenshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub canny_low: f32,
    pub canny_high: f32,
    pub button: ButtonThresholds,
    pub text_field: TextFieldThresholds,
    pub checkbox: CheckboxThresholds,
    pub radio: RadioThresholds,
    pub dropdown: DropdownThresholds,
    pub image_block: ImageBlockThresholds,
}

/// Inclusive `[min, max]` band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn check(&self, name: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(PilotError::ConfigurationError(format!(
                "{} band is invalid: [{}, {}]",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonThresholds {
    pub blur_kernel: u32,
    pub dilate_iterations: u8,
    pub area: Band,
    pub aspect_ratio: Band,
    pub max_hue_std: f64,
    pub max_saturation_std: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextFieldThresholds {
    pub blur_kernel: u32,
    pub area: Band,
    pub aspect_ratio: Band,
    pub min_mean_brightness: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckboxThresholds {
    pub blur_kernel: u32,
    pub area: Band,
    pub aspect_ratio: Band,
    /// Polygon approximation tolerance as a fraction of the perimeter.
    pub approx_epsilon: f64,
    pub binarize_threshold: u8,
    pub checked_dark_fraction: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioThresholds {
    pub blur_kernel: u32,
    pub min_radius: u32,
    pub max_radius: u32,
    pub min_center_distance: f64,
    pub vote_threshold: u32,
    pub min_edge_coverage: f64,
    pub center_disc_fraction: f64,
    pub selected_max_brightness: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropdownThresholds {
    pub area: Band,
    pub aspect_ratio: Band,
    pub arrow_slice_width: u32,
    pub binarize_threshold: u8,
    pub min_arrow_area: f64,
    pub solidity: Band,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageBlockThresholds {
    pub min_area: f64,
    /// Sum of the per-channel standard deviations, so at most 382.5.
    pub min_color_variance: f64,
    pub confidence: f64,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `UI_PILOT_*` environment overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = std::env::var(MAX_APPLICATIONS_ENV) {
            self.session.max_applications = raw.trim().parse().map_err(|_| {
                PilotError::ConfigurationError(format!(
                    "{} must be a positive integer, got '{}'",
                    MAX_APPLICATIONS_ENV, raw
                ))
            })?;
        }
        if let Ok(raw) = std::env::var(HEADLESS_ENV) {
            self.browser.headless = matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.max_applications == 0 {
            return Err(PilotError::ConfigurationError(
                "session.max_applications must be positive".to_string(),
            ));
        }
        if self.session.policy_timeout_ms == 0 {
            return Err(PilotError::ConfigurationError(
                "session.policy_timeout_ms must be positive".to_string(),
            ));
        }
        if self.session.max_consecutive_faults < MIN_FAULT_CAP {
            return Err(PilotError::ConfigurationError(format!(
                "session.max_consecutive_faults must be at least {}",
                MIN_FAULT_CAP
            )));
        }
        self.detector.validate()
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.canny_low > self.canny_high {
            return Err(PilotError::ConfigurationError(
                "detector.canny_low must not exceed canny_high".to_string(),
            ));
        }
        self.button.area.check("button.area")?;
        self.button.aspect_ratio.check("button.aspect_ratio")?;
        self.text_field.area.check("text_field.area")?;
        self.text_field.aspect_ratio.check("text_field.aspect_ratio")?;
        self.checkbox.area.check("checkbox.area")?;
        self.checkbox.aspect_ratio.check("checkbox.aspect_ratio")?;
        self.dropdown.area.check("dropdown.area")?;
        self.dropdown.aspect_ratio.check("dropdown.aspect_ratio")?;
        self.dropdown.solidity.check("dropdown.solidity")?;

        let fractions = [
            ("checkbox.checked_dark_fraction", self.checkbox.checked_dark_fraction),
            ("radio.center_disc_fraction", self.radio.center_disc_fraction),
            ("radio.min_edge_coverage", self.radio.min_edge_coverage),
            ("button.confidence", self.button.confidence),
            ("text_field.confidence", self.text_field.confidence),
            ("checkbox.confidence", self.checkbox.confidence),
            ("radio.confidence", self.radio.confidence),
            ("dropdown.confidence", self.dropdown.confidence),
            ("image_block.confidence", self.image_block.confidence),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(PilotError::ConfigurationError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        let floors = [
            ("image_block.min_area", self.image_block.min_area),
            ("image_block.min_color_variance", self.image_block.min_color_variance),
            ("dropdown.min_arrow_area", self.dropdown.min_arrow_area),
        ];
        for (name, value) in floors {
            if !value.is_finite() || value < 0.0 {
                return Err(PilotError::ConfigurationError(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.dropdown.arrow_slice_width == 0 {
            return Err(PilotError::ConfigurationError(
                "dropdown.arrow_slice_width must be positive".to_string(),
            ));
        }
        if self.radio.min_radius == 0 || self.radio.min_radius > self.radio.max_radius {
            return Err(PilotError::ConfigurationError(
                "radio radius range is invalid".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: Viewport::default(),
            user_agent: None,
            disable_images: false,
            timeout_ms: 30000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_applications: 10,
            policy_timeout_ms: 60000,
            delay_between_actions_ms: 2000,
            max_wait_ms: 30000,
            page_load_timeout_ms: 30000,
            max_consecutive_faults: 5,
            max_cycles: None,
        }
    }
}

impl Default for AdvancerConfig {
    fn default() -> Self {
        Self {
            listing_selector: "article.jobTuple, div.jobTuple, div.job-card, article.job".to_string(),
            active_class_hints: vec!["active".to_string(), "selected".to_string()],
            link_selector: "a.title, a.job-title, a".to_string(),
            next_page_selector: "a.fright, a[rel='next'], .pagination a.next".to_string(),
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            button: ButtonThresholds::default(),
            text_field: TextFieldThresholds::default(),
            checkbox: CheckboxThresholds::default(),
            radio: RadioThresholds::default(),
            dropdown: DropdownThresholds::default(),
            image_block: ImageBlockThresholds::default(),
        }
    }
}

impl Default for ButtonThresholds {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            dilate_iterations: 2,
            area: Band::new(1000.0, 50000.0),
            aspect_ratio: Band::new(1.0, 5.0),
            max_hue_std: 30.0,
            max_saturation_std: 60.0,
            confidence: 0.7,
        }
    }
}

impl Default for TextFieldThresholds {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            area: Band::new(1000.0, 100000.0),
            aspect_ratio: Band::new(3.0, 10.0),
            min_mean_brightness: 200.0,
            confidence: 0.6,
        }
    }
}

impl Default for CheckboxThresholds {
    fn default() -> Self {
        Self {
            blur_kernel: 3,
            area: Band::new(100.0, 2500.0),
            aspect_ratio: Band::new(0.8, 1.2),
            approx_epsilon: 0.04,
            binarize_threshold: 128,
            checked_dark_fraction: 0.2,
            confidence: 0.7,
        }
    }
}

impl Default for RadioThresholds {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            min_radius: 10,
            max_radius: 25,
            min_center_distance: 20.0,
            vote_threshold: 30,
            min_edge_coverage: 0.5,
            center_disc_fraction: 0.3,
            selected_max_brightness: 128.0,
            confidence: 0.6,
        }
    }
}

impl Default for DropdownThresholds {
    fn default() -> Self {
        Self {
            area: Band::new(1000.0, 100000.0),
            aspect_ratio: Band::new(3.0, 15.0),
            arrow_slice_width: 30,
            binarize_threshold: 128,
            min_arrow_area: 10.0,
            solidity: Band::new(0.4, 0.8),
            confidence: 0.5,
        }
    }
}

impl Default for ImageBlockThresholds {
    fn default() -> Self {
        Self {
            min_area: 10000.0,
            min_color_variance: 120.0,
            confidence: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let raw = r#"{
            "session": { "max_applications": 3 },
            "detector": { "checkbox": { "checked_dark_fraction": 0.3 } }
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.session.max_applications, 3);
        assert_eq!(config.session.policy_timeout_ms, 60000);
        assert_eq!(config.detector.checkbox.checked_dark_fraction, 0.3);
        assert_eq!(config.detector.checkbox.binarize_threshold, 128);
        assert_eq!(config.detector.button.area, Band::new(1000.0, 50000.0));
    }

    #[test]
    fn test_rejects_zero_quota_and_inverted_band() {
        let mut config = Config::default();
        config.session.max_applications = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detector.dropdown.solidity = Band::new(0.9, 0.1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_single_fault_cap() {
        let mut config = Config::default();
        config.session.max_consecutive_faults = 1;
        assert!(config.validate().is_err());

        config.session.max_consecutive_faults = MIN_FAULT_CAP;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_image_block_and_arrow_settings() {
        let mut config = Config::default();
        config.detector.image_block.min_area = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detector.image_block.min_color_variance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detector.dropdown.arrow_slice_width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detector.checkbox.checked_dark_fraction = 1.5;
        assert!(config.validate().is_err());
    }
}
