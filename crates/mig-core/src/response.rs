//! Response payloads produced by the dispatch pipeline.

use serde::{Deserialize, Serialize};

/// Outcome marker for [`ResponseStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Error,
}

/// `{"Status": "Ok" | "Error", "Message": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseStatus {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
        }
    }
}

/// `{"ResponseValue": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseText {
    pub response_value: String,
}

impl ResponseText {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            response_value: value.into(),
        }
    }
}

/// Payload assigned to a client request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl ResponseData {
    /// Whether this payload is a `ResponseStatus` with `Status: Error`.
    pub fn is_error(&self) -> bool {
        match self {
            Self::Json(value) => value.get("Status").and_then(|s| s.as_str()) == Some("Error"),
            _ => false,
        }
    }

    /// Body bytes as sent on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Json(value) => value.to_string().into_bytes(),
            Self::Text(text) => text.clone().into_bytes(),
            Self::Bytes(bytes) => bytes.clone(),
        }
    }

    /// Body rendered as text; binary payloads are decoded lossily.
    pub fn to_text(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl From<ResponseStatus> for ResponseData {
    fn from(value: ResponseStatus) -> Self {
        Self::Json(serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
    }
}

impl From<ResponseText> for ResponseData {
    fn from(value: ResponseText) -> Self {
        Self::Json(serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
    }
}

impl From<serde_json::Value> for ResponseData {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for ResponseData {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ResponseData {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for ResponseData {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}
