//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of every game code.
pub const GAME_CODE_LEN: usize = 6;

/// Validates that a game code is six ASCII letters or digits, ignoring surrounding
/// whitespace and case.
///
/// # Examples
///
/// ```ignore
/// validate_game_code("K7QX2M") // Ok
/// validate_game_code(" k7qx2m") // Ok - normalised by the service
/// validate_game_code("K7QX2")  // Err - too short
/// ```
pub fn validate_game_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.chars().count() != GAME_CODE_LEN {
        let mut err = ValidationError::new("game_code_length");
        err.message = Some(
            format!(
                "Game code must be exactly {GAME_CODE_LEN} characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("game_code_format");
        err.message = Some("Game code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Canonical form of a user-typed game code.
pub fn normalize_game_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
