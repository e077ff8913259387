//! Question supplier: asks the LLM for a batch of scenario questions.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::model::Question;
use super::prompts::question_prompt;
use crate::error::{LlmError, QuizError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Fetches scenario questions. Stateless apart from its provider handle.
#[derive(Clone)]
pub struct QuestionSupplier {
    llm: Arc<dyn LlmProvider>,
    language: String,
}

impl QuestionSupplier {
    pub fn new(llm: Arc<dyn LlmProvider>, language: impl Into<String>) -> Self {
        Self {
            llm,
            language: language.into(),
        }
    }

    /// Request `count` questions for `profile`, avoiding the prompts in
    /// `exclude`. One outbound call, no caching.
    ///
    /// Returns at most `count` questions. Anything structurally wrong with
    /// the reply fails the whole batch.
    pub async fn fetch_questions(
        &self,
        profile: &str,
        count: usize,
        exclude: &[String],
    ) -> Result<Vec<Question>, QuizError> {
        if count == 0 {
            return Err(QuizError::Validation(
                "Question count must be positive".to_string(),
            ));
        }
        if profile.trim().is_empty() {
            return Err(QuizError::Validation(
                "Profile description must not be empty".to_string(),
            ));
        }

        info!(
            count,
            excluded = exclude.len(),
            model = self.llm.model_name(),
            "Requesting scenario questions"
        );

        let prompt = question_prompt(profile, count, exclude, &self.language);
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]).with_json_output();
        let response = self.llm.complete(request).await?;

        let mut questions = parse_questions(&response.content)?;
        if questions.len() > count {
            debug!(
                received = questions.len(),
                count, "Truncating surplus questions"
            );
            questions.truncate(count);
        } else if questions.len() < count {
            warn!(
                received = questions.len(),
                count, "Service returned fewer questions than requested"
            );
        }

        info!(count = questions.len(), "Scenario questions received");
        Ok(questions)
    }
}

/// Parse the service reply into questions.
///
/// Looks for a `questions` key first, then accepts a bare top-level array,
/// then the first value of the top-level object if it is an array.
pub fn parse_questions(raw: &str) -> Result<Vec<Question>, LlmError> {
    let json = extract_json(raw);
    let value: Value = serde_json::from_str(json).map_err(|e| LlmError::MalformedResponse {
        reason: format!("question reply is not JSON: {e}"),
    })?;

    let list = match &value {
        Value::Object(map) => match map.get("questions") {
            Some(list) => list,
            None => map.values().next().ok_or_else(|| LlmError::MalformedResponse {
                reason: "question reply is an empty object".to_string(),
            })?,
        },
        Value::Array(_) => &value,
        _ => {
            return Err(LlmError::MalformedResponse {
                reason: "question reply is neither an object nor a list".to_string(),
            });
        }
    };

    let Value::Array(items) = list else {
        return Err(LlmError::MalformedResponse {
            reason: "no question list found in reply".to_string(),
        });
    };
    if items.is_empty() {
        return Err(LlmError::MalformedResponse {
            reason: "question list is empty".to_string(),
        });
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let question: Question =
                serde_json::from_value(item.clone()).map_err(|e| LlmError::MalformedResponse {
                    reason: format!("question {i} is malformed: {e}"),
                })?;
            if question.prompt.trim().is_empty()
                || question.option_a.trim().is_empty()
                || question.option_b.trim().is_empty()
            {
                return Err(LlmError::MalformedResponse {
                    reason: format!("question {i} has a blank field"),
                });
            }
            Ok(question)
        })
        .collect()
}

/// Strip a markdown code fence if the model wrapped its JSON in one.
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    trimmed
}
