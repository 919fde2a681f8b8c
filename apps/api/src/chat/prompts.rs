// Prompts for the essay-writing coach. Replies are free text, so these do
// not go through `with_json_rules`.

const COACH_SYSTEM: &str = "\
You are an SPM Paper 2 essay coach for secondary school students.
SCOPE: ONLY essay-writing (planning, structure, linking, tone, grammar, model openings).
If off-topic, politely refuse and suggest an essay-related angle.
When asked for a sample, give a brief model paragraph or outline.
Align guidance to SPM task types:
- Part 1: informal email (~80 words)
- Part 2: guided essay (125-150 words using ALL given notes)
- Part 3: choose ONE of Article | Story | Report | Review.";

/// First assistant message shown in a fresh conversation. Never sent upstream.
pub const GREETING: &str = "Hello! I'm your essay coach. How can I help?";

pub fn coach_system(username: Option<&str>) -> String {
    match username {
        Some(name) => format!("{COACH_SYSTEM}\nStudent info:\n- username: {name}"),
        None => COACH_SYSTEM.to_string(),
    }
}

pub const SAMPLE_ESSAY_PROMPT: &str =
    "Write a short sample opening for a Part 2 guided essay on healthy lifestyle.";

pub const IMPROVE_INTRODUCTION_PROMPT: &str =
    "How can I write a stronger thesis/intro for a guided essay?";

pub const CONCLUSION_TIPS_PROMPT: &str =
    "Give 3 tips for writing a good conclusion for Part 3 Article.";
