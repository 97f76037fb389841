//! Finds the sandwich in the picture so the scorer can ignore the plate.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::oracle::{InlineImage, Oracle};

pub const LOCATE_PROMPT: &str = "Identify the main sandwich in this image. \
Provide its bounding box coordinates in the format: \
x_min, y_min, x_max, y_max (as percentages of image width/height). \
If no clear sandwich is present, respond with 'None'.";

/// Padding added on every side, as a fraction of the image dimension.
const PADDING_FRACTION: f64 = 0.02;

static PERCENT_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.?\d*),\s*(\d+\.?\d*),\s*(\d+\.?\d*),\s*(\d+\.?\d*)")
        .expect("bounding box pattern is valid")
});

/// Region of interest in pixel coordinates, `x_min < x_max`, `y_min < y_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    /// Converts oracle percentages into a box on a `width` x `height` image.
    ///
    /// Reversed corners are swapped. With `clamp`, the box is clamped to the
    /// image, padded by 2% per side and clamped again; without it the box is
    /// only intersected with the image. Returns `None` when nothing of the
    /// box is left inside the image.
    pub fn from_percentages(
        percentages: [f64; 4],
        width: u32,
        height: u32,
        clamp: bool,
    ) -> Option<Self> {
        let (w, h) = (i64::from(width), i64::from(height));
        let to_px = |percent: f64, extent: i64| (percent / 100.0 * extent as f64) as i64;

        let [px_min, py_min, px_max, py_max] = percentages;
        let (mut x_min, mut x_max) = ordered(to_px(px_min, w), to_px(px_max, w));
        let (mut y_min, mut y_max) = ordered(to_px(py_min, h), to_px(py_max, h));

        if clamp {
            (x_min, x_max) = (x_min.max(0), x_max.min(w));
            (y_min, y_max) = (y_min.max(0), y_max.min(h));
            if x_min >= x_max || y_min >= y_max {
                return None;
            }

            let pad_x = (w as f64 * PADDING_FRACTION) as i64;
            let pad_y = (h as f64 * PADDING_FRACTION) as i64;
            (x_min, x_max) = (x_min - pad_x, x_max + pad_x);
            (y_min, y_max) = (y_min - pad_y, y_max + pad_y);
        }

        let (x_min, x_max) = (x_min.clamp(0, w), x_max.clamp(0, w));
        let (y_min, y_max) = (y_min.clamp(0, h), y_max.clamp(0, h));
        if x_min >= x_max || y_min >= y_max {
            return None;
        }

        Some(Self {
            x_min: u32::try_from(x_min).ok()?,
            y_min: u32::try_from(y_min).ok()?,
            x_max: u32::try_from(x_max).ok()?,
            y_max: u32::try_from(y_max).ok()?,
        })
    }
}

fn ordered(a: i64, b: i64) -> (i64, i64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// First run of four comma-separated non-negative numbers in `text`.
pub fn parse_percent_box(text: &str) -> Option<[f64; 4]> {
    let captures = PERCENT_BOX.captures(text)?;
    let mut values = [0.0; 4];
    for (slot, idx) in values.iter_mut().zip(1..=4) {
        *slot = captures.get(idx)?.as_str().parse().ok()?;
    }
    Some(values)
}

/// Asks the oracle where the sandwich is.
pub struct SubjectLocator {
    oracle: Arc<dyn Oracle>,
    clamp: bool,
}

impl SubjectLocator {
    pub fn new(oracle: Arc<dyn Oracle>, clamp: bool) -> Self {
        Self { oracle, clamp }
    }

    /// `None` means "score the full image". Oracle failures and unparseable
    /// replies land there too, with a note pushed to `notices`.
    pub fn locate(
        &self,
        image: InlineImage<'_>,
        width: u32,
        height: u32,
        notices: &mut Vec<String>,
    ) -> Option<BoundingBox> {
        let reply = match self.oracle.describe_image(LOCATE_PROMPT, image) {
            Ok(reply) => reply,
            Err(err) => {
                warn!(error = %err, "bounding box lookup failed");
                notices.push(format!("Error getting bounding box from AI: {err}"));
                return None;
            }
        };

        let reply = reply.trim();
        let Some(percentages) = parse_percent_box(reply) else {
            warn!(reply, "could not parse bounding box");
            notices.push(format!("AI could not parse bounding box: {reply}"));
            return None;
        };

        let bbox = BoundingBox::from_percentages(percentages, width, height, self.clamp);
        if bbox.is_none() {
            warn!(?percentages, width, height, "bounding box has no area");
            notices.push("AI bounding box was empty.".to_string());
        }
        bbox
    }
}
