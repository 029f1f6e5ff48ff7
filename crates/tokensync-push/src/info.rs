//! Persisted registration info.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PushError, PushResult};
use crate::token::DevicePushToken;

/// Record persisted under the installation's registration key.
///
/// Keys this crate does not know about are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Map<String, Value>>,

    /// Token whose registration has not been confirmed yet. Serialized as
    /// `null` once the server accepted it.
    #[serde(default)]
    pub pending_device_push_token: Option<DevicePushToken>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where and what to POST when registering a token.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationDescriptor {
    pub url: String,
    pub body: Map<String, Value>,
}

impl RegistrationInfo {
    /// Parse a persisted value.
    ///
    /// Anything other than a JSON object is reported as corrupted state.
    pub fn parse(raw: &str) -> PushResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| PushError::CorruptedState(e.to_string()))?;

        if !value.is_object() {
            return Err(PushError::CorruptedState(format!(
                "expected a JSON object, found {}",
                json_kind(&value)
            )));
        }

        serde_json::from_value(value).map_err(|e| PushError::CorruptedState(e.to_string()))
    }

    pub fn to_json(&self) -> PushResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The registration target, if both `url` and `body` are present.
    pub fn descriptor(&self) -> Option<RegistrationDescriptor> {
        match (&self.url, &self.body) {
            (Some(url), Some(body)) => Some(RegistrationDescriptor {
                url: url.clone(),
                body: body.clone(),
            }),
            _ => None,
        }
    }

    /// Copy of this record with the pending token replaced.
    pub fn with_pending(&self, token: Option<DevicePushToken>) -> Self {
        Self {
            pending_device_push_token: token,
            ..self.clone()
        }
    }

    /// Whether automatic registration of new tokens was switched on.
    pub fn auto_registration_enabled(&self) -> bool {
        self.is_enabled == Some(true)
    }
}

impl RegistrationDescriptor {
    pub fn new(url: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            url: url.into(),
            body,
        }
    }

    /// Request body for registering `token`: the stored body extended with the
    /// token, its push service type and the development flag.
    pub fn request_body(&self, token: &DevicePushToken, development: bool) -> Value {
        let mut body = self.body.clone();
        body.insert("deviceToken".to_string(), Value::String(token.data.clone()));
        body.insert(
            "type".to_string(),
            Value::String(token.registration_type().to_string()),
        );
        body.insert("development".to_string(), Value::Bool(development));
        Value::Object(body)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
