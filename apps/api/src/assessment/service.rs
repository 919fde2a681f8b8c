//! Assessment pipelines, one per kind of feedback a student can ask for.
//!
//! Flow: resolve essay content (typed text or preserved upload) → build prompt
//!       → normalize_with_retry → append to the store for named users.
//!
//! Content is resolved before the model is called, so unsupported input never
//! costs a model call or produces a store write.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::assessment::prompts::{
    essay_suggestion_system, self_test_system, writing_profile_system, LEGACY_SUGGESTION_SYSTEM,
};
use crate::content::uploads::load_upload;
use crate::content::{clean_text, ExtractedContent, FileKind};
use crate::errors::AppError;
use crate::llm_client::prompts::with_json_rules;
use crate::llm_client::ContentPart;
use crate::normalizer::record::ANONYMOUS_USER;
use crate::normalizer::{
    normalize, normalize_with_retry, EvaluationRecord, ModelRequest, RecordContext, Schema,
};
use crate::state::AppState;
use crate::store::{RecordFilter, StoredRecord};

/// Most essays accepted by one writing-profile request.
pub const MAX_PROFILE_ESSAYS: usize = 5;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// SPM English Paper 2 part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum PaperPart {
    One,
    Two,
    Three,
}

impl PaperPart {
    pub fn label(self) -> &'static str {
        match self {
            PaperPart::One => "Part 1",
            PaperPart::Two => "Part 2",
            PaperPart::Three => "Part 3",
        }
    }

    /// Type assumed when the student does not pick one.
    pub fn default_type(self) -> &'static str {
        match self {
            PaperPart::One => "Email",
            PaperPart::Two => "Guided Essay",
            PaperPart::Three => "Article",
        }
    }
}

impl TryFrom<String> for PaperPart {
    type Error = String;

    /// Accepts "Part 1", "part 2 (Guided Essay)", "3" and similar.
    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let lowered = raw.trim().to_ascii_lowercase();
        let rest = lowered.strip_prefix("part").unwrap_or(&lowered).trim_start();
        match rest.chars().next() {
            Some('1') => Ok(PaperPart::One),
            Some('2') => Ok(PaperPart::Two),
            Some('3') => Ok(PaperPart::Three),
            _ => Err(format!("'{raw}' is not a Paper 2 part (expected Part 1, 2 or 3)")),
        }
    }
}

impl Serialize for PaperPart {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Where an essay comes from: typed text or a key returned by the upload endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EssaySource {
    pub text: Option<String>,
    pub upload_key: Option<String>,
}

#[cfg(test)]
impl EssaySource {
    pub fn typed(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            upload_key: None,
        }
    }

    pub fn uploaded(key: &str) -> Self {
        Self {
            text: None,
            upload_key: Some(key.to_string()),
        }
    }
}

impl EssaySource {
    /// Resolves to content without touching the model.
    pub async fn resolve(
        &self,
        state: &AppState,
        username: Option<&str>,
    ) -> Result<ExtractedContent, AppError> {
        let text = self.text.as_deref().filter(|t| !t.trim().is_empty());
        match (text, self.upload_key.as_deref()) {
            (Some(_), Some(_)) => Err(AppError::Validation(
                "provide either text or upload_key, not both".to_string(),
            )),
            (Some(text), None) => Ok(ExtractedContent::Text {
                kind: FileKind::Txt,
                text: clean_text(text),
            }),
            (None, Some(key)) => {
                load_upload(state.uploads.as_ref(), username.unwrap_or(ANONYMOUS_USER), key).await
            }
            (None, None) => Err(AppError::Validation(
                "essay text cannot be empty; provide text or an upload_key".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WritingProfileRequest {
    pub username: Option<String>,
    pub essays: Vec<EssaySource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuggestionRequest {
    pub username: Option<String>,
    #[serde(flatten)]
    pub essay: EssaySource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelfTestRequest {
    pub username: Option<String>,
    pub part: PaperPart,
    pub essay_type: Option<String>,
    #[serde(flatten)]
    pub essay: EssaySource,
}

/// A reply produced elsewhere, e.g. the `raw_text` of an earlier parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReplyRequest {
    pub username: Option<String>,
    pub kind: Schema,
    pub raw_text: String,
    pub part: Option<PaperPart>,
    pub essay_type: Option<String>,
}

/// A normalized record plus its store id. `id` is absent for anonymous users.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentOutcome {
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub record: EvaluationRecord,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipelines
// ────────────────────────────────────────────────────────────────────────────

/// Runs one normalization and persists the record for named users.
async fn assess(
    state: &AppState,
    schema: Schema,
    system: &str,
    parts: Vec<ContentPart>,
    context: RecordContext,
) -> Result<AssessmentOutcome, AppError> {
    let request = ModelRequest {
        system: with_json_rules(system),
        parts,
    };
    info!(
        "Running {} assessment for {}",
        schema.as_str(),
        context.username.as_deref().unwrap_or(ANONYMOUS_USER)
    );

    let record = normalize_with_retry(
        state.llm.as_ref(),
        &request,
        schema,
        &context,
        &state.retry_policy,
    )
    .await?;

    persist(state, record).await
}

async fn persist(state: &AppState, record: EvaluationRecord) -> Result<AssessmentOutcome, AppError> {
    let id = if record.metadata.is_anonymous() {
        None
    } else {
        Some(state.store.insert(&record).await?)
    };
    Ok(AssessmentOutcome { id, record })
}

/// Writing profile across one or more essays.
pub async fn run_writing_profile(
    state: &AppState,
    username: Option<String>,
    essays: &[EssaySource],
) -> Result<AssessmentOutcome, AppError> {
    if essays.is_empty() || essays.len() > MAX_PROFILE_ESSAYS {
        return Err(AppError::Validation(format!(
            "provide between 1 and {MAX_PROFILE_ESSAYS} essays"
        )));
    }

    let mut parts = Vec::with_capacity(essays.len());
    for (i, essay) in essays.iter().enumerate() {
        let content = essay.resolve(state, username.as_deref()).await?;
        parts.push(content.into_part(&format!("ESSAY {}", i + 1)));
    }

    assess(
        state,
        Schema::WritingProfile,
        &writing_profile_system(),
        parts,
        RecordContext::for_user(username.as_deref()),
    )
    .await
}

/// Latest writing profile on record for a named user.
async fn latest_profile(
    state: &AppState,
    username: Option<&str>,
) -> Result<Option<StoredRecord>, AppError> {
    let Some(username) = username else {
        return Ok(None);
    };
    Ok(state
        .store
        .latest(&RecordFilter::for_user(username, Schema::WritingProfile))
        .await?)
}

fn profile_part(profile: Option<&EvaluationRecord>) -> ContentPart {
    let Some(profile) = profile else {
        return ContentPart::text("STUDENT PROFILE: none on record");
    };
    ContentPart::Text(format!(
        "STUDENT PROFILE:\nWriting style: {}\nStrengths: {}\nWeaknesses: {}\nTop priorities: {}",
        profile.essay_type,
        profile.strengths.join("; "),
        profile.weaknesses.join("; "),
        profile.next_focus.join("; "),
    ))
}

/// Four-lens scoring with per-section rewrites, informed by the latest profile.
pub async fn run_essay_suggestions(
    state: &AppState,
    username: Option<String>,
    essay: &EssaySource,
) -> Result<AssessmentOutcome, AppError> {
    let content = essay.resolve(state, username.as_deref()).await?;
    let profile = latest_profile(state, username.as_deref()).await?;

    let parts = vec![
        content.into_part("ESSAY"),
        profile_part(profile.as_ref().map(|p| &p.record)),
    ];
    assess(
        state,
        Schema::FourLens,
        &essay_suggestion_system(),
        parts,
        RecordContext::for_user(username.as_deref()),
    )
    .await
}

/// Seven-lens 0-10 scoring with rewrites.
pub async fn run_legacy_suggestions(
    state: &AppState,
    username: Option<String>,
    essay: &EssaySource,
) -> Result<AssessmentOutcome, AppError> {
    let content = essay.resolve(state, username.as_deref()).await?;
    let profile = latest_profile(state, username.as_deref()).await?;

    let parts = vec![
        content.into_part("ESSAY"),
        profile_part(profile.as_ref().map(|p| &p.record)),
    ];
    assess(
        state,
        Schema::LegacyTenPoint,
        LEGACY_SUGGESTION_SYSTEM,
        parts,
        RecordContext::for_user(username.as_deref()),
    )
    .await
}

/// Formative self-test against the part/type the student chose.
pub async fn run_self_test(
    state: &AppState,
    username: Option<String>,
    part: PaperPart,
    essay_type: Option<&str>,
    essay: &EssaySource,
) -> Result<AssessmentOutcome, AppError> {
    let content = essay.resolve(state, username.as_deref()).await?;
    let essay_type = essay_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(part.default_type());

    let preamble = format!("Intended part: {}\nIntended type: {essay_type}", part.label());
    let parts = match content {
        ExtractedContent::Text { text, .. } => {
            vec![ContentPart::Text(format!("{preamble}\n\nESSAY:\n{text}"))]
        }
        image @ ExtractedContent::Image { .. } => vec![
            ContentPart::Text(format!("{preamble}\n\nESSAY (image attached)")),
            image.into_part("ESSAY"),
        ],
    };

    let context = RecordContext {
        username,
        intended_part: Some(part.label().to_string()),
        intended_type: Some(essay_type.to_string()),
    };
    assess(state, Schema::SelfTest, &self_test_system(), parts, context).await
}

/// Normalizes a reply already in hand, without calling the model.
pub async fn run_raw_reply(
    state: &AppState,
    username: Option<String>,
    request: &RawReplyRequest,
) -> Result<AssessmentOutcome, AppError> {
    if request.raw_text.trim().is_empty() {
        return Err(AppError::Validation("raw_text cannot be empty".to_string()));
    }
    let context = RecordContext {
        username,
        intended_part: request.part.map(|p| p.label().to_string()),
        intended_type: request.essay_type.clone(),
    };
    let record = normalize(&request.raw_text, request.kind, &context)?;
    info!(
        "Normalized submitted {} reply for {}",
        request.kind.as_str(),
        record.metadata.username
    );
    persist(state, record).await
}
