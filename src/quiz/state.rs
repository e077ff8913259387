//! Session state machine: tracks which stage a quiz run is in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{Answer, Profile, Question};

/// The stages of a quiz run.
///
/// Progresses linearly: Input → Testing → Analyzing. Restart returns to
/// Input by resetting the whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Input,
    Testing,
    Analyzing,
}

impl Stage {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        use Stage::*;
        matches!((self, target), (Input, Testing) | (Testing, Analyzing))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Testing => "testing",
            Self::Analyzing => "analyzing",
        };
        write!(f, "{s}")
    }
}

/// One user's quiz run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Fresh for every run; a reset replaces it.
    pub run_id: Uuid,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    /// Presentation order.
    pub questions: Vec<Question>,
    /// Strictly parallel to `questions`; never longer.
    pub answers: Vec<Answer>,
    /// More questions are still to be fetched before the run can finish.
    pub pending_background_load: bool,
    /// Cached report once it has been generated in full.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            run_id: Uuid::new_v4(),
            stage: Stage::default(),
            profile: None,
            questions: Vec::new(),
            answers: Vec::new(),
            pending_background_load: false,
            report: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`. Returns the rejected pair on an invalid transition.
    pub fn advance_to(&mut self, target: Stage) -> Result<(), (Stage, Stage)> {
        if !self.stage.can_transition_to(target) {
            return Err((self.stage, target));
        }
        self.stage = target;
        self.touch();
        Ok(())
    }

    /// Index of the question awaiting an answer. Position is always derived
    /// from the answer count.
    pub fn current_index(&self) -> usize {
        self.answers.len()
    }

    /// The question awaiting an answer, if any.
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index())
    }

    /// Every question has an answer and nothing else is coming.
    pub fn is_complete(&self) -> bool {
        !self.questions.is_empty()
            && self.answers.len() == self.questions.len()
            && !self.pending_background_load
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether the answer log lines up with the question list.
    pub fn is_consistent(&self) -> bool {
        self.answers.len() <= self.questions.len()
            && self
                .answers
                .iter()
                .zip(&self.questions)
                .all(|(a, q)| a.question_prompt == q.prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::model::Choice;

    fn question(n: usize) -> Question {
        Question {
            prompt: format!("scene {n}"),
            option_a: format!("a{n}"),
            option_b: format!("b{n}"),
        }
    }

    #[test]
    fn valid_transitions() {
        use Stage::*;
        assert!(Input.can_transition_to(Testing));
        assert!(Testing.can_transition_to(Analyzing));
    }

    #[test]
    fn invalid_transitions() {
        use Stage::*;
        // Skip
        assert!(!Input.can_transition_to(Analyzing));
        // Backward
        assert!(!Testing.can_transition_to(Input));
        assert!(!Analyzing.can_transition_to(Input));
        // Self
        assert!(!Testing.can_transition_to(Testing));
    }

    #[test]
    fn display_matches_serde() {
        for stage in [Stage::Input, Stage::Testing, Stage::Analyzing] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(format!("\"{stage}\""), json);
        }
    }

    #[test]
    fn new_session_is_empty_input() {
        let session = Session::new(Uuid::new_v4());
        assert_eq!(session.stage, Stage::Input);
        assert!(session.questions.is_empty());
        assert!(session.answers.is_empty());
        assert!(!session.pending_background_load);
        assert!(session.current_question().is_none());
        assert!(!session.is_complete());
    }

    #[test]
    fn advance_rejects_skips() {
        let mut session = Session::new(Uuid::new_v4());
        assert_eq!(
            session.advance_to(Stage::Analyzing),
            Err((Stage::Input, Stage::Analyzing))
        );
        assert!(session.advance_to(Stage::Testing).is_ok());
        assert!(session.advance_to(Stage::Analyzing).is_ok());
        assert_eq!(session.stage, Stage::Analyzing);
    }

    #[test]
    fn position_follows_answer_count() {
        let mut session = Session::new(Uuid::new_v4());
        session.questions = (0..3).map(question).collect();
        assert_eq!(session.current_question().unwrap().prompt, "scene 0");
        session
            .answers
            .push(Answer::new(&session.questions[0].clone(), Choice::A));
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.current_question().unwrap().prompt, "scene 1");
        assert!(session.is_consistent());
    }

    #[test]
    fn complete_waits_for_pending_load() {
        let mut session = Session::new(Uuid::new_v4());
        session.questions = vec![question(0)];
        session.answers = vec![Answer::new(&question(0), Choice::B)];
        session.pending_background_load = true;
        assert!(!session.is_complete());
        session.pending_background_load = false;
        assert!(session.is_complete());
    }

    #[test]
    fn inconsistent_log_is_detected() {
        let mut session = Session::new(Uuid::new_v4());
        session.questions = vec![question(0)];
        session.answers = vec![Answer::new(&question(1), Choice::A)];
        assert!(!session.is_consistent());
    }
}
