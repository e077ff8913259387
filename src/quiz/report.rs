//! Report generator: turns a profile and answer log into a narrative
//! Markdown report, either in one piece or as a stream of fragments.

use std::sync::Arc;

use tracing::info;

use super::model::Answer;
use super::prompts::report_prompt;
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, TextStream};

/// Marker shown after the text while fragments are still arriving.
pub const STREAMING_CURSOR: char = '▌';

/// Generates personality reports. Stateless apart from its provider handle.
#[derive(Clone)]
pub struct ReportGenerator {
    llm: Arc<dyn LlmProvider>,
    language: String,
}

impl ReportGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, language: impl Into<String>) -> Self {
        Self {
            llm,
            language: language.into(),
        }
    }

    fn request(&self, profile: &str, answers: &[Answer]) -> Result<CompletionRequest, LlmError> {
        // serde_json leaves non-ASCII text as-is.
        let log = serde_json::to_string(answers)?;
        let prompt = report_prompt(profile, &log, &self.language);
        Ok(CompletionRequest::new(vec![ChatMessage::user(prompt)]))
    }

    /// Generate the whole report in one blocking call.
    pub async fn generate_report(
        &self,
        profile: &str,
        answers: &[Answer],
    ) -> Result<String, LlmError> {
        info!(answers = answers.len(), "Generating report");
        let request = self.request(profile, answers)?;
        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }

    /// Open a stream of report fragments in arrival order.
    pub async fn stream_report(
        &self,
        profile: &str,
        answers: &[Answer],
    ) -> Result<TextStream, LlmError> {
        info!(answers = answers.len(), "Streaming report");
        let request = self.request(profile, answers)?;
        self.llm.complete_stream(request).await
    }
}

/// Accumulates streamed fragments for progressive display.
#[derive(Debug, Default, Clone)]
pub struct ReportBuffer {
    text: String,
    fragments: usize,
}

impl ReportBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.fragments += 1;
    }

    /// Text received so far plus the streaming cursor.
    pub fn display(&self) -> String {
        let mut shown = String::with_capacity(self.text.len() + STREAMING_CURSOR.len_utf8());
        shown.push_str(&self.text);
        shown.push(STREAMING_CURSOR);
        shown
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Final report text, cursor removed.
    pub fn finish(self) -> String {
        self.text
    }
}

/// One step of a streamed report as seen by the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    /// A new fragment arrived. `display` is everything so far plus the cursor.
    Chunk { fragment: String, display: String },
    /// The stream finished; `report` is the complete text.
    Done { report: String },
}
