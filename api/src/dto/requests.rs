use crate::models::FileUpload;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use std::collections::BTreeMap;
use validator::{Validate, ValidationErrors};

/// Field name → messages, for inline display next to each input.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages = errors
                .iter()
                .map(|error| match &error.message {
                    Some(message) => message.to_string(),
                    None => error.code.to_string(),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct SignUpForm {
    #[validate(length(min = 2, message = "Name is too short"))]
    pub name: String,
    #[validate(length(min = 2, max = 50, message = "Username must be 2-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Clone, Validate, Deserialize)]
pub struct SignInForm {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// A picked file, base64 encoded for transport.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    pub name: String,
    pub content_type: String,
    pub data: String,
}

/// Body of `/create-post` and `/update-post/{id}`.
#[derive(Debug, Clone, Validate, Deserialize)]
pub struct PostForm {
    #[validate(length(min = 5, max = 2200, message = "Caption must be 5-2200 characters"))]
    pub caption: String,
    /// Comma separated.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub file: Vec<FilePayload>,
}

impl PostForm {
    /// Validates the form and decodes its files.
    pub fn checked_files(&self) -> Result<Vec<FileUpload>, FieldErrors> {
        self.validate().map_err(|e| field_errors(&e))?;

        self.file
            .iter()
            .map(|payload| {
                STANDARD
                    .decode(payload.data.as_bytes())
                    .map(|bytes| FileUpload::new(&payload.name, &payload.content_type, bytes))
                    .map_err(|_| {
                        FieldErrors::from([(
                            "file".to_string(),
                            vec![format!("{} is not valid base64", payload.name)],
                        )])
                    })
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExploreParams {
    #[serde(default)]
    pub q: String,
}
