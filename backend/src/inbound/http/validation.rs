//! Shared validation helpers for inbound HTTP adapters.
//!
//! Every validation failure becomes `invalid_request` with a
//! `{field, code}` details object, plus `value` when echoing the input is
//! harmless.

use std::str::FromStr;

use serde_json::json;
use uuid::Uuid;

use crate::domain::{
    CommentTextError, Error, KeywordValidationError, LoginValidationError, Page, PageError,
    PasswordPolicyError, RegistrationValidationError, TaskValidationError,
};

/// Validation error codes for HTTP request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    MissingField,
    InvalidUuid,
    InvalidValue,
    Empty,
    TooShort,
    TooLong,
    OutOfRange,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingField => "missing_field",
            ErrorCode::InvalidUuid => "invalid_uuid",
            ErrorCode::InvalidValue => "invalid_value",
            ErrorCode::Empty => "empty",
            ErrorCode::TooShort => "too_short",
            ErrorCode::TooLong => "too_long",
            ErrorCode::OutOfRange => "out_of_range",
        }
    }
}

/// Newtype wrapper for HTTP field names to provide type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldName(&'static str);

impl FieldName {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self(name)
    }

    fn as_str(&self) -> &str {
        self.0
    }
}

/// Builder for validation errors with field context.
struct ValidationError {
    field: String,
    message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_code(self, code: ErrorCode) -> Error {
        Error::invalid_request(self.message).with_details(json!({
            "field": self.field,
            "code": code.as_str(),
        }))
    }

    fn with_value(self, code: ErrorCode, value: impl Into<String>) -> Error {
        Error::invalid_request(self.message).with_details(json!({
            "field": self.field,
            "value": value.into(),
            "code": code.as_str(),
        }))
    }
}

fn field_error(field: FieldName, code: ErrorCode, message: impl Into<String>) -> Error {
    ValidationError::new(field.as_str(), message).with_code(code)
}

pub(crate) fn missing_field_error(field: FieldName) -> Error {
    let name = field.as_str();
    field_error(field, ErrorCode::MissingField, format!("missing required field: {name}"))
}

pub(crate) fn parse_uuid(value: &str, field: FieldName) -> Result<Uuid, Error> {
    Uuid::parse_str(value.trim()).map_err(|_| {
        let name = field.as_str();
        ValidationError::new(name, format!("{name} must be a valid UUID"))
            .with_value(ErrorCode::InvalidUuid, value)
    })
}

pub(crate) fn parse_optional_uuid(
    value: Option<&str>,
    field: FieldName,
) -> Result<Option<Uuid>, Error> {
    value.map(|raw| parse_uuid(raw, field)).transpose()
}

/// Parse an enum-like query value, echoing the rejected input.
pub(crate) fn parse_choice<T: FromStr>(value: &str, field: FieldName) -> Result<T, Error> {
    value.parse().map_err(|_| {
        let name = field.as_str();
        ValidationError::new(name, format!("{name} has an unsupported value"))
            .with_value(ErrorCode::InvalidValue, value)
    })
}

pub(crate) fn parse_optional_choice<T: FromStr>(
    value: Option<&str>,
    field: FieldName,
) -> Result<Option<T>, Error> {
    value.map(|raw| parse_choice(raw, field)).transpose()
}

pub(crate) fn page(limit: Option<u32>, offset: Option<u32>) -> Result<Page, Error> {
    Page::new(limit, offset).map_err(|err| match err {
        PageError::LimitOutOfRange { .. } => {
            field_error(FieldName::new("limit"), ErrorCode::OutOfRange, err.to_string())
        }
    })
}

pub(crate) fn comment_text_error(err: CommentTextError) -> Error {
    let code = match err {
        CommentTextError::Empty => ErrorCode::Empty,
        CommentTextError::TooLong { .. } => ErrorCode::TooLong,
    };
    field_error(FieldName::new("text"), code, err.to_string())
}

pub(crate) fn keyword_error(err: KeywordValidationError) -> Error {
    let (field, code) = match err {
        KeywordValidationError::EmptyWord => ("word", ErrorCode::Empty),
        KeywordValidationError::WordTooLong { .. } => ("word", ErrorCode::TooLong),
        KeywordValidationError::EmptyCategory => ("category", ErrorCode::Empty),
        KeywordValidationError::CategoryTooLong { .. } => ("category", ErrorCode::TooLong),
    };
    field_error(FieldName::new(field), code, err.to_string())
}

pub(crate) fn login_error(err: LoginValidationError) -> Error {
    match err {
        LoginValidationError::EmptyLogin => {
            field_error(FieldName::new("login"), ErrorCode::Empty, err.to_string())
        }
        LoginValidationError::EmptyPassword => {
            field_error(FieldName::new("password"), ErrorCode::Empty, err.to_string())
        }
    }
}

pub(crate) fn password_error(field: FieldName, err: PasswordPolicyError) -> Error {
    let code = match err {
        PasswordPolicyError::TooShort { .. } => ErrorCode::TooShort,
        PasswordPolicyError::TooLong { .. } => ErrorCode::TooLong,
    };
    field_error(field, code, err.to_string())
}

pub(crate) fn registration_error(err: RegistrationValidationError) -> Error {
    match err {
        RegistrationValidationError::Username(inner) => field_error(
            FieldName::new("username"),
            ErrorCode::InvalidValue,
            inner.to_string(),
        ),
        RegistrationValidationError::Email(inner) => field_error(
            FieldName::new("email"),
            ErrorCode::InvalidValue,
            inner.to_string(),
        ),
        RegistrationValidationError::Password(inner) => {
            password_error(FieldName::new("password"), inner)
        }
    }
}

pub(crate) fn task_error(err: TaskValidationError) -> Error {
    let (field, code) = match &err {
        TaskValidationError::UnknownType(_) => ("taskType", ErrorCode::InvalidValue),
        TaskValidationError::EmptyParameters => ("parameters", ErrorCode::Empty),
        TaskValidationError::InvalidParameters(_) => ("parameters", ErrorCode::InvalidValue),
        TaskValidationError::PriorityOutOfRange => ("priority", ErrorCode::OutOfRange),
    };
    field_error(FieldName::new(field), code, err.to_string())
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::{ErrorCode as DomainCode, TaskStatus};
    use rstest::rstest;
    use serde_json::Value;

    fn detail<'a>(error: &'a Error, key: &str) -> Option<&'a Value> {
        error.details().and_then(|details| details.get(key))
    }

    #[test]
    fn invalid_uuid_echoes_value() {
        let err = parse_uuid("nope", FieldName::new("id")).expect_err("invalid");
        assert_eq!(err.code(), DomainCode::InvalidRequest);
        assert_eq!(detail(&err, "code"), Some(&json!("invalid_uuid")));
        assert_eq!(detail(&err, "value"), Some(&json!("nope")));
    }

    #[test]
    fn choices_parse_through_from_str() {
        let status: TaskStatus = parse_choice("failed", FieldName::new("status")).expect("status");
        assert_eq!(status, TaskStatus::Failed);

        let err = parse_choice::<TaskStatus>("done", FieldName::new("status")).expect_err("bad");
        assert_eq!(detail(&err, "field"), Some(&json!("status")));
    }

    #[rstest]
    #[case(CommentTextError::Empty, "empty")]
    #[case(CommentTextError::TooLong { max: 1000 }, "too_long")]
    fn comment_errors_carry_codes(#[case] err: CommentTextError, #[case] code: &str) {
        let mapped = comment_text_error(err);
        assert_eq!(detail(&mapped, "field"), Some(&json!("text")));
        assert_eq!(detail(&mapped, "code"), Some(&json!(code)));
    }

    #[rstest]
    #[case(Some(0))]
    #[case(Some(101))]
    fn page_limits_are_bounded(#[case] limit: Option<u32>) {
        let err = page(limit, None).expect_err("out of range");
        assert_eq!(detail(&err, "field"), Some(&json!("limit")));
        assert_eq!(detail(&err, "code"), Some(&json!("out_of_range")));
    }

    #[test]
    fn unknown_task_types_point_at_task_type() {
        let err = task_error(TaskValidationError::UnknownType("nope".to_owned()));
        assert_eq!(detail(&err, "field"), Some(&json!("taskType")));
    }
}
