//! Device push tokens.

use serde::{Deserialize, Serialize};

/// Platform push token as handed out by the device's push service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevicePushToken {
    /// Platform the token belongs to (`ios`, `android`, `web`, ...).
    #[serde(rename = "type")]
    pub token_type: String,
    /// Opaque token value.
    pub data: String,
}

impl DevicePushToken {
    pub fn new(token_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            data: data.into(),
        }
    }

    /// Push service name the registration server expects for this token.
    pub fn registration_type(&self) -> &str {
        match self.token_type.as_str() {
            "ios" => "apns",
            "android" => "fcm",
            other => other,
        }
    }
}
