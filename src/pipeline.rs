//! One upload, start to finish: locate, crop, score, classify, critique.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use ndarray::Array2;
use serde::Serialize;
use tracing::{info, warn};

use crate::classification::{Classification, Classifier, NO_FILLING_ANALYSIS};
use crate::config::ScoringConfig;
use crate::critique::CritiqueGenerator;
use crate::error::StoreError;
use crate::locator::{BoundingBox, SubjectLocator};
use crate::oracle::{InlineImage, Oracle};
use crate::store::HistoryStore;
use crate::symmetry::{SymmetryScore, SymmetryScorer};

/// Scores at or above this are shown highlighted.
pub const HIGH_SCORE: f64 = 80.0;

pub const REJECTION_MESSAGE: &str = "That doesn't look like a sandwich.";

/// A decoded upload together with the bytes and MIME type it arrived as.
pub struct Upload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub image: DynamicImage,
}

impl Upload {
    pub fn decode(bytes: Vec<u8>, mime_type: &str) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory(&bytes)?;
        Ok(Self {
            bytes,
            mime_type: mime_type.to_string(),
            image,
        })
    }

    fn inline(&self) -> InlineImage<'_> {
        InlineImage::new(&self.bytes, &self.mime_type)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub score: SymmetryScore,
    pub high_score: bool,
    pub analysis: String,
    pub filling: String,
    pub comment: String,
    pub bounding_box: Option<BoundingBox>,
    pub notices: Vec<String>,
    #[serde(skip)]
    pub difference: Array2<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub message: String,
    pub observation: String,
    pub notices: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Sandwich(Evaluation),
    NotASandwich(Rejection),
}

pub struct Evaluator {
    locator: SubjectLocator,
    scorer: SymmetryScorer,
    classifier: Classifier,
    critic: CritiqueGenerator,
}

impl Evaluator {
    pub fn new(oracle: Arc<dyn Oracle>, scoring: ScoringConfig) -> Self {
        Self {
            locator: SubjectLocator::new(oracle.clone(), scoring.clamp_bbox),
            scorer: SymmetryScorer::new(scoring),
            classifier: Classifier::new(oracle.clone()),
            critic: CritiqueGenerator::new(oracle),
        }
    }

    pub fn evaluate(&self, upload: &Upload) -> Verdict {
        let mut notices = Vec::new();
        let (width, height) = (upload.image.width(), upload.image.height());

        info!(width, height, "detecting sandwich boundaries");
        let bounding_box = self
            .locator
            .locate(upload.inline(), width, height, &mut notices);

        let cropped = match bounding_box {
            Some(b) => upload.image.crop_imm(b.x_min, b.y_min, b.width(), b.height()),
            None => {
                notices.push("Could not automatically crop to sandwich. Analyzing full image.".into());
                upload.image.clone()
            }
        };

        let report = self.scorer.score(&cropped);
        info!(score = %report.score, cropped = bounding_box.is_some(), "scored symmetry");

        let description = match self.classifier.classify(upload.inline(), &mut notices) {
            Classification::Sandwich { description } => description,
            Classification::NotASandwich { observation } => {
                return Verdict::NotASandwich(Rejection {
                    message: REJECTION_MESSAGE.to_string(),
                    observation,
                    notices,
                });
            }
        };

        info!("analyzing filling symmetry");
        let filling = match encode_png(&cropped) {
            Some(png) => self
                .classifier
                .analyze_filling(InlineImage::new(&png, "image/png"), &mut notices),
            None => NO_FILLING_ANALYSIS.to_string(),
        };

        let comment = self
            .critic
            .critique(report.score, &description, &filling, &mut notices);

        Verdict::Sandwich(Evaluation {
            score: report.score,
            high_score: report.score.value() >= HIGH_SCORE,
            analysis: description,
            filling,
            comment,
            bounding_box,
            notices,
            difference: report.difference,
        })
    }
}

/// Persists accepted verdicts; rejections leave no history row.
pub fn record(
    store: &HistoryStore,
    user_id: i64,
    upload: &Upload,
    verdict: &Verdict,
    timestamp: &str,
) -> Result<Option<i64>, StoreError> {
    match verdict {
        Verdict::Sandwich(evaluation) => store
            .add_history_entry(
                user_id,
                evaluation.score.value(),
                &evaluation.comment,
                &upload.image,
                timestamp,
            )
            .map(Some),
        Verdict::NotASandwich(_) => Ok(None),
    }
}

fn encode_png(image: &DynamicImage) -> Option<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    match image.write_to(&mut buf, ImageFormat::Png) {
        Ok(()) => Some(buf.into_inner()),
        Err(err) => {
            warn!(error = %err, "could not encode cropped image");
            None
        }
    }
}
