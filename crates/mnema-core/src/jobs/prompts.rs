//! Prompt templates for the generation pipeline.

/// System prompt for concept synthesis.
pub fn concept_synthesis_system_prompt() -> &'static str {
    "You are a curriculum designer that breaks a study request into atomic, \
     independently-testable concepts. Each concept covers exactly one idea. \
     Respond with JSON only, no prose, in the form:\n\
     {\"concepts\": [{\"title\": \"...\", \"description\": \"...\"}]}\n\
     Titles are short noun phrases. Descriptions are one or two sentences."
}

/// User prompt for concept synthesis.
pub fn concept_synthesis_prompt(request: &str, max_concepts: u32) -> String {
    format!(
        "Break the following study request into at most {max_concepts} atomic \
         concepts. Skip anything too vague to test.\n\nRequest:\n{request}"
    )
}

/// System prompt for phrasing generation.
pub fn phrasing_generation_system_prompt() -> &'static str {
    "You write quiz questions for a spaced-repetition app. Respond with JSON \
     only, no prose, in the form:\n\
     {\"phrasings\": [{\"question\": \"...\", \"type\": \"multiple_choice\", \
     \"options\": [\"...\"], \"correctAnswer\": \"...\", \"explanation\": \"...\"}]}\n\
     Allowed types: multiple_choice, true_false, short_answer. For \
     multiple_choice, include 3-4 options and make sure correctAnswer is one \
     of them verbatim."
}

/// User prompt for phrasing generation.
pub fn phrasing_generation_prompt(
    title: &str,
    description: Option<&str>,
    target_count: u32,
) -> String {
    let context = match description {
        Some(d) => format!("{title}: {d}"),
        None => title.to_string(),
    };
    format!(
        "Write {target_count} distinct quiz questions testing the concept \
         below. Vary the angle so the questions do not give each other away.\n\n\
         Concept:\n{context}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_mention_constraints() {
        let prompt = concept_synthesis_prompt("the cell cycle", 10);
        assert!(prompt.contains("10"));
        assert!(prompt.contains("the cell cycle"));

        let prompt = phrasing_generation_prompt("Mitosis", Some("Cell division"), 3);
        assert!(prompt.contains('3'));
        assert!(prompt.contains("Mitosis: Cell division"));

        let prompt = phrasing_generation_prompt("Mitosis", None, 3);
        assert!(prompt.contains("Mitosis"));
    }
}
