//! Persona Quiz: scenario-based personality questionnaire backed by an
//! OpenAI-compatible chat completions service.

pub mod config;
pub mod error;
pub mod llm;
pub mod quiz;
