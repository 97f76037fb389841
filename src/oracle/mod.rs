//! The external vision/language model, seen as a black box that answers a
//! prompt (optionally with an image) with free text.

mod gemini;

pub use gemini::GeminiOracle;

use crate::error::OracleError;

/// Encoded image bytes as uploaded, plus their MIME type.
#[derive(Debug, Clone, Copy)]
pub struct InlineImage<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
}

impl<'a> InlineImage<'a> {
    pub fn new(bytes: &'a [u8], mime_type: &'a str) -> Self {
        Self { bytes, mime_type }
    }
}

/// Blocking access to a generative model.
///
/// Responses carry no schema guarantee; callers parse them defensively.
pub trait Oracle: Send + Sync {
    fn describe_image(&self, prompt: &str, image: InlineImage<'_>) -> Result<String, OracleError>;

    fn generate_text(&self, prompt: &str) -> Result<String, OracleError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::{InlineImage, Oracle};
    use crate::error::OracleError;

    /// Answers by looking up the exact prompt; unknown prompts fail.
    #[derive(Default)]
    pub(crate) struct ScriptedOracle {
        answers: Vec<(String, String)>,
        text_answer: Option<String>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        pub(crate) fn answer(mut self, prompt: &str, reply: &str) -> Self {
            self.answers.push((prompt.to_string(), reply.to_string()));
            self
        }

        pub(crate) fn text(mut self, reply: &str) -> Self {
            self.text_answer = Some(reply.to_string());
            self
        }

        pub(crate) fn asked(&self, prompt: &str) -> bool {
            self.calls.lock().unwrap().iter().any(|p| p == prompt)
        }
    }

    impl Oracle for ScriptedOracle {
        fn describe_image(
            &self,
            prompt: &str,
            _image: InlineImage<'_>,
        ) -> Result<String, OracleError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            self.answers
                .iter()
                .find(|(p, _)| p == prompt)
                .map(|(_, reply)| reply.clone())
                .ok_or(OracleError::EmptyResponse)
        }

        fn generate_text(&self, prompt: &str) -> Result<String, OracleError> {
            self.calls.lock().unwrap().push(prompt.to_string());
            self.text_answer.clone().ok_or(OracleError::EmptyResponse)
        }
    }
}
