//! Control-socket protocol definitions.
//!
//! A JSON-RPC-like protocol over a Unix domain socket, one JSON document
//! per line in each direction.

use serde::{Deserialize, Serialize};

/// Methods the daemon answers on the control socket.
///
/// The wire carries the method as a plain string so that a request naming
/// an unknown method still parses and can be answered with
/// [`error_codes::METHOD_NOT_FOUND`] under its own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Health,
    Shutdown,
    DeliveryTrigger,
    DeliveryStatus,
    DeliveryStats,
    ChannelStatus,
    ChannelChallenge,
}

impl Method {
    /// The method's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Method::Health => "health",
            Method::Shutdown => "shutdown",
            Method::DeliveryTrigger => "delivery.trigger",
            Method::DeliveryStatus => "delivery.status",
            Method::DeliveryStats => "delivery.stats",
            Method::ChannelStatus => "channel.status",
            Method::ChannelChallenge => "channel.challenge",
        }
    }

    /// Look up a method by its wire name.
    pub fn from_name(name: &str) -> Option<Method> {
        match name {
            "health" => Some(Method::Health),
            "shutdown" => Some(Method::Shutdown),
            "delivery.trigger" => Some(Method::DeliveryTrigger),
            "delivery.status" => Some(Method::DeliveryStatus),
            "delivery.stats" => Some(Method::DeliveryStats),
            "channel.status" => Some(Method::ChannelStatus),
            "channel.challenge" => Some(Method::ChannelChallenge),
            _ => None,
        }
    }
}

/// Control request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed back on the response.
    pub id: String,
    /// Wire name of the method to invoke.
    pub method: String,
    /// Parameters for methods that take them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    /// Build a parameterless request with a fresh correlation id.
    pub fn new(method: Method) -> Self {
        Self::build(method, None)
    }

    /// Build a request carrying parameters.
    pub fn with_params(method: Method, params: serde_json::Value) -> Self {
        Self::build(method, Some(params))
    }

    fn build(method: Method, params: Option<serde_json::Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method: method.name().to_string(),
            params,
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Control response message. Success carries `result`; failure carries
/// `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id of the request being answered.
    pub id: String,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure details on error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Failure details attached to an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// One of the [`error_codes`] constants.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl Response {
    /// A response carrying a result.
    pub fn success(id: &str, result: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    /// A response carrying an error.
    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ErrorInfo {
                code,
                message: message.to_string(),
            }),
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// True when no error is attached.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// JSON-RPC standard error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}
