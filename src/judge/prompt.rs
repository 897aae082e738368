//! Judge prompt construction.

use std::fmt::Write;

use super::score::Rubric;

/// Fixed system prompt sent with every judge request.
pub const SYSTEM_PROMPT: &str = "You are a meticulous and unbiased reviewer. \
Provide honest assessments and avoid revealing deliberation summaries.";

/// Render the user prompt for one candidate output.
///
/// The rendered text is also the cache fingerprint, so any change here
/// invalidates recorded judgments.
#[must_use]
pub fn build_prompt(candidate: &str, rubric: &Rubric, extra_instructions: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are an impartial expert evaluator. Assess the workflow output using the rubric. \
         Think step-by-step before scoring each dimension.\n\nOUTPUT TO EVALUATE:\n",
    );
    prompt.push_str(candidate.trim());
    prompt.push_str("\n\nRUBRIC:\n");
    for (name, dimension) in rubric.iter() {
        let _ = writeln!(
            prompt,
            "- {name}: {} (Scale: {})",
            dimension.description, dimension.scale
        );
    }
    prompt.push_str(
        "\nINSTRUCTIONS:\n\
         1. Reason carefully about each dimension.\n\
         2. Provide concise reasoning referencing the rubric.\n\
         3. Assign a score following the specified scale.\n\
         4. Respond ONLY in JSON with numeric scores.\n\n\
         JSON RESPONSE TEMPLATE:\n\
         {\n  \"dimension_name\": {\n    \"score\": <number>,\n    \"reasoning\": \"<why you chose the score>\"\n  }, ...\n}",
    );
    if let Some(extra) = extra_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push('\n');
        prompt.push_str(extra);
    }
    prompt.push('\n');
    prompt
}
