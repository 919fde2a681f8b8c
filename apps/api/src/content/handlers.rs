use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;

use crate::content::uploads::{preserve_upload, UploadReceipt};
use crate::errors::AppError;
use crate::models::user::validate_username;
use crate::normalizer::record::ANONYMOUS_USER;
use crate::state::AppState;

/// POST /api/v1/uploads
///
/// Multipart form: a `file` field and an optional `username` field.
/// The file is extracted before it is stored, so unsupported files get a 415
/// and leave nothing behind.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, AppError> {
    let mut username: Option<String> = None;
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "username" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid username field: {e}")))?;
                username = Some(text);
            }
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::Validation("file field needs a filename".to_string()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read upload: {e}")))?;
                file = Some((filename, bytes));
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| AppError::Validation("multipart body has no file field".to_string()))?;
    let username = validate_username(username.as_deref())?;
    let owner = username.as_deref().unwrap_or(ANONYMOUS_USER);

    let receipt = preserve_upload(state.uploads.as_ref(), owner, &filename, bytes).await?;
    Ok(Json(receipt))
}
