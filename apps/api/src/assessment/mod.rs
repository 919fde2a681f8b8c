// Assessment flows: writing profile, essay suggestions (four-lens and legacy),
// self-test, practice tasks.
// All model calls go through the normalizer; nothing here parses model output.

pub mod handlers;
pub mod practice;
pub mod prompts;
pub mod service;
