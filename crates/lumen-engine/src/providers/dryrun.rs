use std::io::Cursor;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use lumen_contracts::chat::ImagePayload;
use sha2::{Digest, Sha256};

use super::{ImageModel, ImageRequest, TextModel, TextRequest};

/// Offline stand-in for the remote models: refinement appends the mode's
/// target keywords, images are flat swatches coloured by the prompt hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunProvider;

const KEYWORDS_PREFIX: &str = "Target keywords:";
const DRYRUN_SCALE: u32 = 4;

impl TextModel for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn complete(&self, request: &TextRequest) -> Result<String> {
        let input = request.input.trim();
        if input.is_empty() {
            return Ok(String::new());
        }
        let keywords = request
            .context
            .lines()
            .find_map(|line| line.trim().strip_prefix(KEYWORDS_PREFIX))
            .map(str::trim)
            .filter(|keywords| !keywords.is_empty());
        Ok(match keywords {
            Some(keywords) => format!("{input}, {keywords}"),
            None => input.to_string(),
        })
    }
}

impl ImageModel for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ImageRequest) -> Result<Option<ImagePayload>> {
        let (width, height) = request.aspect_ratio.dims();
        let (r, g, b) = color_from_request(request);
        let mut image = RgbImage::new(width / DRYRUN_SCALE, height / DRYRUN_SCALE);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("dryrun image encode failed")?;
        Ok(Some(ImagePayload::from_bytes("image/png", &bytes)))
    }
}

fn color_from_request(request: &ImageRequest) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(request.model.as_bytes());
    hasher.update(request.prompt.as_bytes());
    for reference in &request.references {
        hasher.update(reference.data.as_bytes());
    }
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use lumen_contracts::modes::AspectRatio;

    use super::*;

    #[test]
    fn dryrun_text_appends_target_keywords() -> anyhow::Result<()> {
        let request = TextRequest {
            model: "dryrun-text".to_string(),
            system: String::new(),
            context: "Mode: Logo\nTarget keywords: vector, minimalist\n".to_string(),
            input: " a fox head ".to_string(),
        };
        assert_eq!(
            DryrunProvider.complete(&request)?,
            "a fox head, vector, minimalist"
        );
        Ok(())
    }

    #[test]
    fn dryrun_text_keeps_blank_input_blank() -> anyhow::Result<()> {
        let request = TextRequest {
            model: "dryrun-text".to_string(),
            system: String::new(),
            context: "Target keywords: vector".to_string(),
            input: "  ".to_string(),
        };
        assert_eq!(DryrunProvider.complete(&request)?, "");
        Ok(())
    }

    #[test]
    fn dryrun_image_is_a_png_with_ratio_dims() -> anyhow::Result<()> {
        let request = ImageRequest {
            model: "dryrun-image".to_string(),
            prompt: "boat".to_string(),
            aspect_ratio: AspectRatio::Wide,
            references: Vec::new(),
        };
        let payload = DryrunProvider.generate(&request)?;
        let Some(payload) = payload else {
            anyhow::bail!("dryrun returned no image");
        };
        assert_eq!(payload.mime_type, "image/png");
        let decoded = image::load_from_memory(&payload.decode()?)?;
        assert_eq!((decoded.width(), decoded.height()), (256, 144));
        Ok(())
    }

    #[test]
    fn swatch_colour_follows_the_request() {
        let request = |prompt: &str, references: Vec<ImagePayload>| ImageRequest {
            model: "dryrun-image".to_string(),
            prompt: prompt.to_string(),
            aspect_ratio: AspectRatio::Square,
            references,
        };
        let boat = color_from_request(&request("boat", Vec::new()));
        assert_eq!(boat, color_from_request(&request("boat", Vec::new())));
        assert_ne!(boat, color_from_request(&request("car", Vec::new())));
        let edited = request("boat", vec![ImagePayload::new("image/png", "c2Vjb25k")]);
        assert_ne!(boat, color_from_request(&edited));
    }
}
