use serde::{Deserialize, Serialize};

/// Envelope wrapped around every JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Plain acknowledgement payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
    pub timestamp: String,
    pub environment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_omits_data() {
        let json = serde_json::to_value(ApiResponse::failure("Meeting not found")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "Meeting not found" })
        );
    }

    #[test]
    fn ok_omits_error() {
        let json = serde_json::to_value(ApiResponse::ok(MessageBody::new("done"))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": true, "data": { "message": "done" } })
        );
    }
}
