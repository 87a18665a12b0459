//! Request and response types exchanged with the Step Up Naija REST API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP verbs the offline service issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a body is sent with this verb.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported method: {}", other)),
        }
    }
}

/// One outbound call, already resolved from a queued operation or a live request.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    pub method: HttpMethod,
    /// Relative API path (`/api/projects/42/vote`) or absolute URL.
    pub target: String,
    /// JSON body; only sent for POST and PUT.
    pub body: Option<Value>,
}

/// Status and decoded body of a completed call.
///
/// Bodies that are not JSON are kept as a JSON string; empty bodies are `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkResponse {
    pub status: u16,
    pub body: Value,
}

impl NetworkResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 4xx statuses that retrying will not fix. 408 and 429 are excluded
    /// since the server is asking to try again later.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status) && self.status != 408 && self.status != 429
    }

    /// Decode a raw response body.
    pub fn decode_body(text: &str) -> Value {
        if text.trim().is_empty() {
            return Value::Null;
        }
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }

    /// Body rendered for error messages.
    pub fn body_text(&self) -> String {
        match &self.body {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classes() {
        assert!(NetworkResponse::new(204, Value::Null).is_success());
        assert!(!NetworkResponse::new(302, Value::Null).is_success());
        assert!(NetworkResponse::new(404, Value::Null).is_client_error());
        assert!(!NetworkResponse::new(429, Value::Null).is_client_error());
        assert!(!NetworkResponse::new(408, Value::Null).is_client_error());
        assert!(!NetworkResponse::new(503, Value::Null).is_client_error());
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(NetworkResponse::decode_body(""), Value::Null);
        assert_eq!(NetworkResponse::decode_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(
            NetworkResponse::decode_body("Bad Gateway"),
            Value::String("Bad Gateway".into())
        );
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert!("PATCH".parse::<HttpMethod>().is_err());
        assert!(HttpMethod::Put.carries_body());
        assert!(!HttpMethod::Delete.carries_body());
    }
}
