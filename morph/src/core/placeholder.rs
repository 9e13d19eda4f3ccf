//! Placeholder resolution for step parameters.

use std::path::Path;

use thiserror::Error;

use crate::core::types::{TARGET_FILE_PLACEHOLDER, TRANSFORM_SCRIPT_PLACEHOLDER};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    #[error("<TRANSFORM_SCRIPT> used before any transform script was generated")]
    NoTransformScript,
}

/// Replace whole-parameter placeholder tokens. Other parameters pass through unchanged,
/// including ones that merely contain a token as a substring.
pub fn resolve_params(
    params: &[String],
    transform_script: Option<&Path>,
    target: &Path,
) -> Result<Vec<String>, PlaceholderError> {
    params
        .iter()
        .map(|param| match param.as_str() {
            TRANSFORM_SCRIPT_PLACEHOLDER => transform_script
                .map(|path| path.display().to_string())
                .ok_or(PlaceholderError::NoTransformScript),
            TARGET_FILE_PLACEHOLDER => Ok(target.display().to_string()),
            _ => Ok(param.clone()),
        })
        .collect()
}
