use crate::utils::error::{ConflateError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(ConflateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(ConflateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// 容差必須是有限數值；小於等於零代表不吸附，不算錯誤
pub fn validate_tolerance(field_name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(ConflateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Tolerance must be a finite number".to_string(),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConflateError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// `dependent` 有設定時 `required` 也必須設定
pub fn validate_requires(dependent: (&str, bool), required: (&str, bool)) -> Result<()> {
    if dependent.1 && !required.1 {
        return Err(ConflateError::ConfigValidationError {
            field: required.0.to_string(),
            message: format!("'{}' requires '{}' to be set as well", dependent.0, required.0),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tolerance() {
        assert!(validate_tolerance("tolerance.canals", 0.5).is_ok());
        assert!(validate_tolerance("tolerance.canals", 0.0).is_ok());
        assert!(validate_tolerance("tolerance.canals", -1.0).is_ok());
        assert!(validate_tolerance("tolerance.canals", f64::NAN).is_err());
        assert!(validate_tolerance("tolerance.canals", f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("input.canals", "canals.geojson").is_ok());
        assert!(validate_path("input.canals", "").is_err());
        assert!(validate_path("input.canals", "a\0b").is_err());
    }

    #[test]
    fn test_validate_requires() {
        assert!(validate_requires(("type_value", true), ("type_field", true)).is_ok());
        assert!(validate_requires(("type_value", false), ("type_field", true)).is_ok());
        assert!(validate_requires(("type_value", false), ("type_field", false)).is_ok());
        let err = validate_requires(("type_value", true), ("type_field", false)).unwrap_err();
        assert!(err.to_string().contains("type_field"));
    }
}
