use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::config::{AspectRatio, GenerationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Thumbnail,
    Logo,
    BackgroundRemoval,
    Banner,
    Poster,
    Avatar,
    General,
}

/// Per-mode generation intent: defaults, refinement guidance and the prompt
/// used when refinement leaves nothing to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSpec {
    pub mode: Mode,
    pub label: &'static str,
    pub aspect_ratio: AspectRatio,
    pub high_quality: bool,
    pub keywords: &'static [&'static str],
    pub guidance: &'static str,
    pub empty_prompt_fallback: &'static str,
}

pub const GENERIC_EMPTY_PROMPT: &str = "High quality image.";

const MODE_SPECS: &[ModeSpec] = &[
    ModeSpec {
        mode: Mode::Thumbnail,
        label: "Thumbnail",
        aspect_ratio: AspectRatio::Wide,
        high_quality: true,
        keywords: &["high contrast", "vibrant colors", "expressive", "eye-catching"],
        guidance: "Design a video thumbnail that reads at a glance: one dominant focal \
                   subject, exaggerated expressions, bold saturated colors, dramatic rim \
                   lighting and a clean area for a short headline.",
        empty_prompt_fallback: "Vibrant high-contrast video thumbnail.",
    },
    ModeSpec {
        mode: Mode::Logo,
        label: "Logo",
        aspect_ratio: AspectRatio::Square,
        high_quality: true,
        keywords: &["vector", "minimalist", "flat design", "white background"],
        guidance: "Design a brand mark: clean vector shapes, minimalist geometry, a \
                   limited flat palette, centered on a plain white background, no \
                   photographic detail and no mockup scenery.",
        empty_prompt_fallback: GENERIC_EMPTY_PROMPT,
    },
    ModeSpec {
        mode: Mode::BackgroundRemoval,
        label: "Background Removal",
        aspect_ratio: AspectRatio::Square,
        high_quality: false,
        keywords: &["isolated subject", "solid white background", "clean edges"],
        guidance: "Keep the subject exactly as it is and isolate it on a solid pure \
                   white background with crisp clean edges, no shadows and no props.",
        empty_prompt_fallback: "Isolate the subject on white background.",
    },
    ModeSpec {
        mode: Mode::Banner,
        label: "Banner",
        aspect_ratio: AspectRatio::Wide,
        high_quality: true,
        keywords: &["wide composition", "professional", "negative space", "cohesive palette"],
        guidance: "Compose a wide header banner with the subject offset to one side, \
                   generous negative space for copy and a cohesive professional palette.",
        empty_prompt_fallback: GENERIC_EMPTY_PROMPT,
    },
    ModeSpec {
        mode: Mode::Poster,
        label: "Poster",
        aspect_ratio: AspectRatio::Portrait,
        high_quality: true,
        keywords: &["cinematic", "dramatic lighting", "bold typography", "strong hierarchy"],
        guidance: "Compose a tall poster with a cinematic hero image, dramatic lighting, \
                   a strong visual hierarchy and room for bold title typography.",
        empty_prompt_fallback: GENERIC_EMPTY_PROMPT,
    },
    ModeSpec {
        mode: Mode::Avatar,
        label: "Avatar",
        aspect_ratio: AspectRatio::Square,
        high_quality: true,
        keywords: &["centered portrait", "head and shoulders", "soft lighting", "simple backdrop"],
        guidance: "Create a profile avatar: a centered head-and-shoulders portrait with \
                   soft flattering light, a simple backdrop and a crop that survives a \
                   circular mask.",
        empty_prompt_fallback: GENERIC_EMPTY_PROMPT,
    },
    ModeSpec {
        mode: Mode::General,
        label: "General",
        aspect_ratio: AspectRatio::Square,
        high_quality: false,
        keywords: &["detailed", "well composed", "natural lighting"],
        guidance: "Describe a detailed, well composed image with a clear subject, a \
                   defined medium and natural lighting.",
        empty_prompt_fallback: GENERIC_EMPTY_PROMPT,
    },
];

impl Mode {
    pub const ALL: [Mode; 7] = [
        Mode::Thumbnail,
        Mode::Logo,
        Mode::BackgroundRemoval,
        Mode::Banner,
        Mode::Poster,
        Mode::Avatar,
        Mode::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Thumbnail => "thumbnail",
            Mode::Logo => "logo",
            Mode::BackgroundRemoval => "background-removal",
            Mode::Banner => "banner",
            Mode::Poster => "poster",
            Mode::Avatar => "avatar",
            Mode::General => "general",
        }
    }

    pub fn spec(self) -> &'static ModeSpec {
        // MODE_SPECS is declared in the same order as Mode::ALL.
        &MODE_SPECS[self as usize]
    }

    pub fn label(self) -> &'static str {
        self.spec().label
    }

    pub fn default_config(self) -> GenerationConfig {
        let spec = self.spec();
        GenerationConfig {
            aspect_ratio: spec.aspect_ratio,
            high_quality: spec.high_quality,
        }
    }

    pub fn empty_prompt_fallback(self) -> &'static str {
        self.spec().empty_prompt_fallback
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let mode = match normalized.as_str() {
            "thumbnail" | "thumb" => Mode::Thumbnail,
            "logo" => Mode::Logo,
            "background-removal" | "bg" | "remove-bg" | "bg-remove" | "background" => {
                Mode::BackgroundRemoval
            }
            "banner" => Mode::Banner,
            "poster" => Mode::Poster,
            "avatar" => Mode::Avatar,
            "general" | "default" => Mode::General,
            _ => {
                let known = Mode::ALL
                    .iter()
                    .map(|mode| mode.as_str())
                    .collect::<Vec<&str>>()
                    .join(", ");
                return Err(format!("Unknown mode '{}' (expected one of: {known}).", raw.trim()));
            }
        };
        Ok(mode)
    }
}
