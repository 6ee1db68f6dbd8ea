//! Perception: frames in, typed UI elements out.

pub mod detector;
pub mod element;
pub mod families;
pub mod frame;
pub mod hough;
pub mod imaging;

pub use detector::UiDetector;
pub use element::{ElementAttributes, ElementKind, UiElement};
pub use frame::{Frame, FrameSummary};
