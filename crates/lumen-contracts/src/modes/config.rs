use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "3:4")]
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Wide,
        AspectRatio::Tall,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Portrait => "3:4",
        }
    }

    /// Pixel size used by offline renderers, longest edge 1024.
    pub fn dims(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1024, 1024),
            AspectRatio::Wide => (1024, 576),
            AspectRatio::Tall => (576, 1024),
            AspectRatio::Landscape => (1024, 768),
            AspectRatio::Portrait => (768, 1024),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['x', '/'], ":");
        match normalized.as_str() {
            "1:1" | "square" => Ok(AspectRatio::Square),
            "16:9" | "wide" => Ok(AspectRatio::Wide),
            "9:16" | "tall" => Ok(AspectRatio::Tall),
            "4:3" | "landscape" => Ok(AspectRatio::Landscape),
            "3:4" | "portrait" => Ok(AspectRatio::Portrait),
            _ => Err(format!(
                "Unsupported aspect ratio '{}' (expected 1:1, 16:9, 9:16, 4:3 or 3:4).",
                raw.trim()
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub aspect_ratio: AspectRatio,
    pub high_quality: bool,
}

#[cfg(test)]
mod tests {
    use super::AspectRatio;

    #[test]
    fn aspect_ratio_roundtrips_wire_form() {
        for ratio in AspectRatio::ALL {
            assert_eq!(ratio.as_str().parse::<AspectRatio>(), Ok(ratio));
        }
        assert_eq!("16x9".parse::<AspectRatio>(), Ok(AspectRatio::Wide));
        assert_eq!("portrait".parse::<AspectRatio>(), Ok(AspectRatio::Portrait));
        assert!("21:9".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn dims_follow_ratio_orientation() {
        let (w, h) = AspectRatio::Tall.dims();
        assert!(h > w);
        let (w, h) = AspectRatio::Wide.dims();
        assert!(w > h);
    }
}
