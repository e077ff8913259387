//! Instructions sent to the text-generation service.

/// Build the question-generation instruction.
///
/// `exclude` lists scenario prompts already shown in this run; the model is
/// asked not to repeat them.
pub fn question_prompt(profile: &str, count: usize, exclude: &[String], language: &str) -> String {
    let mut prompt = format!(
        "\
You are a seasoned psychologist. Based on this user profile: [{profile}], write {count} \
everyday projective scenario questions that reveal personality type.

Requirements:
1. Scenarios must feel like real slices of daily life and cover being alone, unexpected \
events, social situations, and sensory or aesthetic moments.
2. Never use words like MBTI, tendency, personality, or any psychology jargon.
3. Each scenario offers exactly two different reactions.
4. Write all text in {language}.
5. Output pure JSON with exactly this structure and nothing else:
{{\"questions\": [{{\"q\": \"scenario description\", \"a\": \"reaction one\", \"b\": \"reaction two\"}}]}}"
    );

    if !exclude.is_empty() {
        prompt.push_str(
            "\n\nThese scenarios were already used. Do not repeat them or write close variants:\n",
        );
        for (i, q) in exclude.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, q));
        }
    }

    prompt
}

/// Build the report instruction. `answer_log` is the JSON-serialized answer
/// list.
pub fn report_prompt(profile: &str, answer_log: &str, language: &str) -> String {
    format!(
        "\
User background: {profile}
Experiment answers: {answer_log}

Tasks:
1. Give the MBTI type and a romantic title for this person.
2. Deep analysis: point out the latent tension between the user's professional mask and \
their true self.
3. Blind spot: name what this personality is most likely to overlook against a \
background of {profile}.
4. Tone: calm, precise, penetrating. Write in {language}. Format the whole report in \
Markdown."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_prompt_embeds_profile_and_count() {
        let prompt = question_prompt("age 25-34, works as architect", 12, &[], "English");
        assert!(prompt.contains("works as architect"));
        assert!(prompt.contains("write 12 "));
        assert!(prompt.contains(r#"{"questions": [{"q": "#));
        assert!(prompt.contains("Write all text in English"));
        assert!(!prompt.contains("already used"));
    }

    #[test]
    fn question_prompt_lists_exclusions() {
        let exclude = vec!["Rainy Sunday".to_string(), "Missed the last train".to_string()];
        let prompt = question_prompt("p", 3, &exclude, "English");
        assert!(prompt.contains("already used"));
        assert!(prompt.contains("1. Rainy Sunday"));
        assert!(prompt.contains("2. Missed the last train"));
    }

    #[test]
    fn question_prompt_bans_jargon() {
        let prompt = question_prompt("p", 1, &[], "Chinese");
        assert!(prompt.contains("Never use words like MBTI"));
    }

    #[test]
    fn report_prompt_embeds_log_verbatim() {
        let log = r#"[{"q":"下雨天","ans":"在家"}]"#;
        let prompt = report_prompt("age 18-24, works as nurse", log, "Chinese");
        assert!(prompt.contains(log));
        assert!(prompt.contains("works as nurse"));
        assert!(prompt.contains("MBTI type"));
        assert!(prompt.contains("romantic title"));
        assert!(prompt.contains("Blind spot"));
        assert!(prompt.contains("Markdown"));
    }
}
