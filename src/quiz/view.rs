//! Render models for each stage, serialized to the client as JSON.

use serde::Serialize;
use uuid::Uuid;

use super::model::{AgeBand, Answer, Environment, Profile};
use super::state::{Session, Stage};

/// Options for the Input form.
#[derive(Debug, Clone, Serialize)]
pub struct FormOptions {
    pub age_bands: Vec<AgeBand>,
    pub environments: Vec<Environment>,
    /// Fields that must be filled before `start`.
    pub required: Vec<&'static str>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            age_bands: AgeBand::ALL.to_vec(),
            environments: Environment::ALL.to_vec(),
            required: vec!["identity", "hobbies"],
        }
    }
}

/// The question currently on screen. Neither option is preselected.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QuestionView {
    pub prompt: String,
    pub option_a: String,
    pub option_b: String,
}

/// What the client should render for a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum View {
    Input {
        session_id: Uuid,
        form: FormOptions,
    },
    Testing {
        session_id: Uuid,
        /// 1-based position of the current question.
        position: usize,
        total: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        question: Option<QuestionView>,
        /// More questions will be fetched on the next confirm.
        loading_more: bool,
    },
    Analyzing {
        session_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        profile: Option<Profile>,
        answers: Vec<Answer>,
        /// Present once the report has been generated.
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<String>,
    },
}

impl View {
    /// Render model for the session's current stage.
    pub fn of(session: &Session) -> Self {
        match session.stage {
            Stage::Input => Self::Input {
                session_id: session.id,
                form: FormOptions::default(),
            },
            Stage::Testing => Self::Testing {
                session_id: session.id,
                position: session.current_index() + 1,
                total: session.questions.len(),
                question: session.current_question().map(|q| QuestionView {
                    prompt: q.prompt.clone(),
                    option_a: q.option_a.clone(),
                    option_b: q.option_b.clone(),
                }),
                loading_more: session.pending_background_load,
            },
            Stage::Analyzing => Self::Analyzing {
                session_id: session.id,
                profile: session.profile.clone(),
                answers: session.answers.clone(),
                report: session.report.clone(),
            },
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Input { .. } => Stage::Input,
            Self::Testing { .. } => Stage::Testing,
            Self::Analyzing { .. } => Stage::Analyzing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::model::Question;

    #[test]
    fn input_view_lists_form_options() {
        let session = Session::new(Uuid::new_v4());
        let json = serde_json::to_value(View::of(&session)).unwrap();
        assert_eq!(json["stage"], "input");
        assert_eq!(json["form"]["age_bands"][0], "18-24");
        assert_eq!(json["form"]["environments"][2], "overseas");
        assert_eq!(json["form"]["required"][1], "hobbies");
    }

    #[test]
    fn testing_view_shows_current_question() {
        let mut session = Session::new(Uuid::new_v4());
        session.stage = Stage::Testing;
        session.questions = vec![Question {
            prompt: "Rain".to_string(),
            option_a: "Stay".to_string(),
            option_b: "Go".to_string(),
        }];
        let view = View::of(&session);
        assert_eq!(view.stage(), Stage::Testing);
        let json = serde_json::to_value(view).unwrap();
        assert_eq!(json["position"], 1);
        assert_eq!(json["total"], 1);
        assert_eq!(json["question"]["prompt"], "Rain");
        assert_eq!(json["loading_more"], false);
    }

    #[test]
    fn analyzing_view_omits_missing_report() {
        let mut session = Session::new(Uuid::new_v4());
        session.stage = Stage::Analyzing;
        let json = serde_json::to_value(View::of(&session)).unwrap();
        assert_eq!(json["stage"], "analyzing");
        assert!(json.get("report").is_none());
        assert!(json["answers"].as_array().unwrap().is_empty());
    }
}
