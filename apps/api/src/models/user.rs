use crate::errors::AppError;
use crate::normalizer::record::ANONYMOUS_USER;

const MAX_USERNAME_LEN: usize = 64;

/// Checks a caller-supplied username. Blank means anonymous and yields `None`.
/// Names become part of storage keys, so only `[A-Za-z0-9._@-]` is accepted.
pub fn validate_username(raw: Option<&str>) -> Result<Option<String>, AppError> {
    let Some(name) = raw.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name == ANONYMOUS_USER {
        return Ok(None);
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-');
    if !name.chars().all(allowed) || name.starts_with('.') {
        return Err(AppError::Validation(format!(
            "username '{name}' contains unsupported characters"
        )));
    }
    Ok(Some(name.to_string()))
}

/// Like `validate_username` but a name is mandatory.
pub fn require_username(raw: Option<&str>) -> Result<String, AppError> {
    validate_username(raw)?
        .ok_or_else(|| AppError::Validation("username is required".to_string()))
}
