use std::sync::Arc;

use tracing::{info, warn};

use crate::oracle::{InlineImage, Oracle};

pub const IS_SANDWICH_PROMPT: &str =
    "Is this an image of a sandwich? Just reply with 'Yes' or 'No'.";
pub const DESCRIBE_PROMPT: &str =
    "Describe the main food item in this image. Be concise and objective.";
pub const FILLING_PROMPT: &str = "This is an image of a sandwich. Focus only on the layers between the bread. \
Describe how evenly and symmetrically the filling ingredients (e.g., cheese, meat, vegetables) \
are distributed and aligned. Be concise and objective. \
For example: 'Filling is perfectly centered and evenly layered.' \
Or: 'Meat is skewed to one side, cheese is off-center.'";

pub const NO_DESCRIPTION: &str = "AI could not provide overall analysis.";
pub const NO_FILLING_ANALYSIS: &str = "AI could not analyze filling symmetry.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Sandwich { description: String },
    NotASandwich { observation: String },
}

pub struct Classifier {
    oracle: Arc<dyn Oracle>,
}

impl Classifier {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Yes/no gate, then an overall description for images that pass it.
    pub fn classify(&self, image: InlineImage<'_>, notices: &mut Vec<String>) -> Classification {
        let answer = match self.oracle.describe_image(IS_SANDWICH_PROMPT, image) {
            Ok(answer) => answer.trim().to_string(),
            Err(err) => {
                warn!(error = %err, "sandwich check failed");
                notices.push(format!("Error during initial sandwich check: {err}"));
                return Classification::NotASandwich {
                    observation: format!("Initial sandwich check failed: {err}"),
                };
            }
        };

        if !is_affirmative(&answer) {
            info!(%answer, "oracle says this is not a sandwich");
            return Classification::NotASandwich {
                observation: format!("AI identified: {answer}"),
            };
        }

        let description = match self.oracle.describe_image(DESCRIBE_PROMPT, image) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(error = %err, "overall description failed");
                notices.push(format!("Error describing the sandwich: {err}"));
                NO_DESCRIPTION.to_string()
            }
        };

        Classification::Sandwich { description }
    }

    /// Describes how evenly the filling is laid out in the cropped sandwich.
    pub fn analyze_filling(&self, cropped: InlineImage<'_>, notices: &mut Vec<String>) -> String {
        match self.oracle.describe_image(FILLING_PROMPT, cropped) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(error = %err, "filling analysis failed");
                notices.push(format!("Error analyzing filling symmetry: {err}"));
                NO_FILLING_ANALYSIS.to_string()
            }
        }
    }
}

/// Any "yes" in the reply, case-insensitive.
pub fn is_affirmative(answer: &str) -> bool {
    answer.to_lowercase().contains("yes")
}
