use crate::types::{BoundingBox, Point};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Button,
    TextField,
    Checkbox,
    RadioButton,
    Dropdown,
    ImageBlock,
}

impl ElementKind {
    pub const ALL: [ElementKind; 6] = [
        ElementKind::Button,
        ElementKind::TextField,
        ElementKind::Checkbox,
        ElementKind::RadioButton,
        ElementKind::Dropdown,
        ElementKind::ImageBlock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Button => "button",
            ElementKind::TextField => "text_field",
            ElementKind::Checkbox => "checkbox",
            ElementKind::RadioButton => "radio_button",
            ElementKind::Dropdown => "dropdown",
            ElementKind::ImageBlock => "image_block",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Family-specific measurements. The serde tag doubles as the element `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementAttributes {
    Button {
        aspect_ratio: f64,
        hue_std: f64,
        saturation_std: f64,
    },
    TextField {
        aspect_ratio: f64,
        mean_brightness: f64,
    },
    Checkbox {
        is_checked: bool,
        dark_fraction: f64,
    },
    RadioButton {
        is_selected: bool,
        radius: u32,
        center_brightness: f64,
    },
    Dropdown {
        aspect_ratio: f64,
        arrow_solidity: f64,
    },
    ImageBlock {
        color_variance: f64,
    },
}

impl ElementAttributes {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementAttributes::Button { .. } => ElementKind::Button,
            ElementAttributes::TextField { .. } => ElementKind::TextField,
            ElementAttributes::Checkbox { .. } => ElementKind::Checkbox,
            ElementAttributes::RadioButton { .. } => ElementKind::RadioButton,
            ElementAttributes::Dropdown { .. } => ElementKind::Dropdown,
            ElementAttributes::ImageBlock { .. } => ElementKind::ImageBlock,
        }
    }
}

/// A detected, typed, located and state-annotated control candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    #[serde(flatten)]
    pub attributes: ElementAttributes,
    pub bbox: BoundingBox,
    pub center: Point,
    pub confidence: f64,
    pub area: u64,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl UiElement {
    /// Stamp a family candidate with frame geometry. The box is clipped to the
    /// frame and confidence clamped to `[0, 1]`; `None` if nothing of the box
    /// lies inside the frame.
    pub fn new(
        attributes: ElementAttributes,
        bbox: BoundingBox,
        confidence: f64,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<Self> {
        let bbox = bbox.clamp_to(frame_width, frame_height)?;
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(Self {
            attributes,
            center: bbox.center(),
            area: bbox.area(),
            bbox,
            confidence,
            frame_width,
            frame_height,
        })
    }

    pub fn kind(&self) -> ElementKind {
        self.attributes.kind()
    }

    pub fn is_checked(&self) -> Option<bool> {
        match self.attributes {
            ElementAttributes::Checkbox { is_checked, .. } => Some(is_checked),
            _ => None,
        }
    }

    pub fn is_selected(&self) -> Option<bool> {
        match self.attributes {
            ElementAttributes::RadioButton { is_selected, .. } => Some(is_selected),
            _ => None,
        }
    }

    /// One-line description used when rendering perception for a policy.
    pub fn describe(&self) -> String {
        let b = &self.bbox;
        let mut line = format!(
            "Type: {}, Position: (x={}, y={}, width={}, height={}), Center: ({}, {}), Confidence: {:.2}.",
            self.kind(),
            b.x,
            b.y,
            b.width,
            b.height,
            self.center.x,
            self.center.y,
            self.confidence
        );
        let note = match &self.attributes {
            ElementAttributes::Button { .. } => "Appears to be a clickable button.".to_string(),
            ElementAttributes::TextField { .. } => "Appears to be a text input field.".to_string(),
            ElementAttributes::Checkbox { is_checked, .. } => {
                format!("{} checkbox.", if *is_checked { "Checked" } else { "Unchecked" })
            }
            ElementAttributes::RadioButton { is_selected, .. } => {
                format!("{} radio button.", if *is_selected { "Selected" } else { "Unselected" })
            }
            ElementAttributes::Dropdown { .. } => "Appears to be a dropdown menu.".to_string(),
            ElementAttributes::ImageBlock { .. } => "Image or photographic content.".to_string(),
        };
        line.push(' ');
        line.push_str(&note);
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clamps_geometry_and_confidence() {
        let element = UiElement::new(
            ElementAttributes::ImageBlock {
                color_variance: 200.0,
            },
            BoundingBox::new(80, 40, 50, 50),
            1.7,
            100,
            60,
        )
        .unwrap();

        assert_eq!(element.bbox, BoundingBox::new(80, 40, 20, 20));
        assert_eq!(element.center, Point::new(90, 50));
        assert_eq!(element.area, 400);
        assert_eq!(element.confidence, 1.0);
        assert_eq!(element.kind(), ElementKind::ImageBlock);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let element = UiElement::new(
            ElementAttributes::Checkbox {
                is_checked: true,
                dark_fraction: 0.4,
            },
            BoundingBox::new(1, 2, 20, 20),
            0.7,
            100,
            100,
        )
        .unwrap();

        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["type"], "checkbox");
        assert_eq!(json["is_checked"], true);
        assert_eq!(json["center"]["x"], 11);

        let back: UiElement = serde_json::from_value(json).unwrap();
        assert_eq!(back, element);
    }

    #[test]
    fn test_outside_frame_is_dropped() {
        let element = UiElement::new(
            ElementAttributes::ImageBlock {
                color_variance: 1.0,
            },
            BoundingBox::new(200, 0, 10, 10),
            0.5,
            100,
            100,
        );
        assert!(element.is_none());
    }
}
