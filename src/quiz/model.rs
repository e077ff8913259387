//! Profile, question, and answer data models.

use serde::{Deserialize, Serialize};

use crate::error::QuizError;

/// Age band offered on the input form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "18-24")]
    From18To24,
    #[default]
    #[serde(rename = "25-34")]
    From25To34,
    #[serde(rename = "35-49")]
    From35To49,
    #[serde(rename = "50+")]
    Over50,
}

impl AgeBand {
    pub const ALL: [AgeBand; 4] = [
        Self::From18To24,
        Self::From25To34,
        Self::From35To49,
        Self::Over50,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::From18To24 => "18-24",
            Self::From25To34 => "25-34",
            Self::From35To49 => "35-49",
            Self::Over50 => "50+",
        }
    }
}

impl std::fmt::Display for AgeBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Living environment offered on the input form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    TierOneCity,
    SmallerCity,
    Overseas,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Self::TierOneCity, Self::SmallerCity, Self::Overseas];

    /// Human-readable wording used in prompts.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::TierOneCity => "a tier-one city",
            Self::SmallerCity => "a second- or third-tier city",
            Self::Overseas => "overseas or elsewhere",
        }
    }
}

/// Raw form input from the Input stage. Every field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub age_band: Option<AgeBand>,
    #[serde(default)]
    pub environment: Option<Environment>,
    /// Occupation or identity, e.g. "architect".
    #[serde(default)]
    pub identity: String,
    /// Where the user spends non-work time, e.g. "live music venues".
    #[serde(default)]
    pub hobbies: String,
}

impl ProfileForm {
    /// Check required fields and produce a profile.
    pub fn validate(self) -> Result<Profile, QuizError> {
        let identity = self.identity.trim();
        let hobbies = self.hobbies.trim();
        if identity.is_empty() || hobbies.is_empty() {
            return Err(QuizError::Validation(
                "Fill in both your occupation and where you spend your free time so the \
                 scenarios can be woven around you."
                    .to_string(),
            ));
        }
        Ok(Profile {
            age_band: self.age_band.unwrap_or_default(),
            environment: self.environment.unwrap_or_default(),
            identity: identity.to_string(),
            hobbies: hobbies.to_string(),
        })
    }
}

/// A validated user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub age_band: AgeBand,
    pub environment: Environment,
    pub identity: String,
    pub hobbies: String,
}

impl Profile {
    /// One-line description embedded in every prompt.
    pub fn describe(&self) -> String {
        format!(
            "age {}, works as {}, often found at {}, lives in {}",
            self.age_band,
            self.identity,
            self.hobbies,
            self.environment.describe()
        )
    }
}

/// A generated scenario with two mutually exclusive responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "q")]
    pub prompt: String,
    #[serde(rename = "a")]
    pub option_a: String,
    #[serde(rename = "b")]
    pub option_b: String,
}

impl Question {
    pub fn option(&self, choice: Choice) -> &str {
        match choice {
            Choice::A => &self.option_a,
            Choice::B => &self.option_b,
        }
    }
}

/// Which of the two options the user picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Choice {
    A,
    B,
}

/// One recorded answer. Serialized as `{"q", "ans"}` in the report prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "q")]
    pub question_prompt: String,
    #[serde(rename = "ans")]
    pub chosen_option: String,
}

impl Answer {
    pub fn new(question: &Question, choice: Choice) -> Self {
        Self {
            question_prompt: question.prompt.clone(),
            chosen_option: question.option(choice).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(identity: &str, hobbies: &str) -> ProfileForm {
        ProfileForm {
            identity: identity.to_string(),
            hobbies: hobbies.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn validate_requires_identity_and_hobbies() {
        assert!(matches!(
            form("", "").validate(),
            Err(QuizError::Validation(_))
        ));
        assert!(form("architect", "  ").validate().is_err());
        assert!(form(" ", "livehouse").validate().is_err());
    }

    #[test]
    fn validate_trims_and_defaults() {
        let profile = form("  architect ", " livehouse ").validate().unwrap();
        assert_eq!(profile.identity, "architect");
        assert_eq!(profile.hobbies, "livehouse");
        assert_eq!(profile.age_band, AgeBand::From25To34);
        assert_eq!(profile.environment, Environment::TierOneCity);
    }

    #[test]
    fn describe_mentions_every_field() {
        let profile = Profile {
            age_band: AgeBand::Over50,
            environment: Environment::Overseas,
            identity: "建筑设计师".to_string(),
            hobbies: "livehouse".to_string(),
        };
        let text = profile.describe();
        assert!(text.contains("50+"));
        assert!(text.contains("建筑设计师"));
        assert!(text.contains("livehouse"));
        assert!(text.contains("overseas"));
    }

    #[test]
    fn form_accepts_wire_labels() {
        let parsed: ProfileForm = serde_json::from_str(
            r#"{"age_band":"18-24","environment":"smaller_city","identity":"nurse","hobbies":"parks"}"#,
        )
        .unwrap();
        assert_eq!(parsed.age_band, Some(AgeBand::From18To24));
        assert_eq!(parsed.environment, Some(Environment::SmallerCity));
    }

    #[test]
    fn form_tolerates_missing_fields() {
        let parsed: ProfileForm = serde_json::from_str("{}").unwrap();
        assert!(parsed.identity.is_empty());
        assert!(parsed.age_band.is_none());
    }

    #[test]
    fn question_uses_short_wire_names() {
        let q: Question = serde_json::from_str(r#"{"q":"Rain","a":"Stay in","b":"Go out"}"#).unwrap();
        assert_eq!(q.prompt, "Rain");
        assert_eq!(q.option(Choice::A), "Stay in");
        assert_eq!(q.option(Choice::B), "Go out");
    }

    #[test]
    fn answer_copies_prompt_and_chosen_text() {
        let q = Question {
            prompt: "下雨天".to_string(),
            option_a: "在家".to_string(),
            option_b: "出门".to_string(),
        };
        let answer = Answer::new(&q, Choice::B);
        assert_eq!(answer.question_prompt, "下雨天");
        assert_eq!(answer.chosen_option, "出门");
        let json = serde_json::to_string(&answer).unwrap();
        assert_eq!(json, r#"{"q":"下雨天","ans":"出门"}"#);
    }

    #[test]
    fn age_band_labels_match_serde() {
        for band in AgeBand::ALL {
            let json = serde_json::to_string(&band).unwrap();
            assert_eq!(json, format!("\"{}\"", band.label()));
        }
    }
}
