use std::sync::Arc;

use tracing::warn;

use crate::oracle::Oracle;
use crate::symmetry::SymmetryScore;

/// Fallback comments above this score are polite.
pub const FALLBACK_THRESHOLD: f64 = 85.0;

pub fn build_prompt(score: SymmetryScore, analysis: &str, filling: &str) -> String {
    format!(
        r#"
You are a sarcastic and witty food critic who only reviews the symmetry of sandwiches.
A sandwich just scored {score}/100 in a symmetry test.
Overall AI observation: "{analysis}"
Detailed filling analysis: "{filling}"
Considering the score, the overall observation, AND especially the detailed filling analysis,
write a short, quirky, one-line review filled with humor and sass.
Incorporate specific details from the observations to make the critique more informed and dramatic.
Avoid compliments if the score is low. Be generous if it's very high.
Make it sound like a savage or dramatic food critique.
"#
    )
}

pub fn fallback_comment(score: SymmetryScore) -> String {
    if score.value() > FALLBACK_THRESHOLD {
        format!("A respectable {score}/100. Well done.")
    } else {
        format!("A score of {score}/100. There's room for improvement.")
    }
}

pub struct CritiqueGenerator {
    oracle: Arc<dyn Oracle>,
}

impl CritiqueGenerator {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    pub fn critique(
        &self,
        score: SymmetryScore,
        analysis: &str,
        filling: &str,
        notices: &mut Vec<String>,
    ) -> String {
        let prompt = build_prompt(score, analysis, filling);
        match self.oracle.generate_text(&prompt) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(error = %err, "critique generation failed, using fallback");
                notices.push(format!(
                    "Comment generation failed due to API error: {err}. Using fallback comment."
                ));
                fallback_comment(score)
            }
        }
    }
}
