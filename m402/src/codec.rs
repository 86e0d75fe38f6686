//! JSON-RPC 2.0 envelope codec.
//!
//! Decoding turns raw request bytes into a [`CallRequest`], rejecting
//! malformed envelopes with the JSON-RPC protocol codes before anything
//! reaches the state machine. Encoding maps an [`Outcome`] to its wire form:
//!
//! | Outcome             | Wire form                                              |
//! |---------------------|--------------------------------------------------------|
//! | `Success`           | `result: { content, metadata }`                        |
//! | `PaymentRequired`   | `error: { code: -32001, data: { paymentRequirement } }` |
//! | `Failure`           | `error: { code: <per kind>, message }`                 |

use serde::{Deserialize, Serialize};

use crate::call::{CallId, CallRequest, Outcome};
use crate::codes;
use crate::error::{ErrorKind, Failure};
use crate::proof::PaymentProof;
use crate::registry::ToolRegistry;
use crate::requirement::PaymentRequirement;
use crate::tool::ToolResult;
use crate::value::{self, Map};
use crate::{JSONRPC_VERSION, PAYMENT_ARGUMENT_KEY};

/// Method name for tool calls.
pub const METHOD_CALL_TOOL: &str = "tools/call";

/// Method name for listing tools.
pub const METHOD_LIST_TOOLS: &str = "tools/list";

/// A malformed envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// The bytes are not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),
    /// The JSON is not a valid JSON-RPC 2.0 envelope.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The method is not supported.
    #[error("method not found: {0}")]
    MethodNotFound(String),
    /// The method parameters are malformed.
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

impl EnvelopeError {
    /// Returns the JSON-RPC error code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => codes::PARSE_ERROR,
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
        }
    }
}

/// A request that could not be decoded, with its id when one was readable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct DecodeError {
    /// Id of the offending request, if it could be read.
    pub id: Option<CallId>,
    /// What was wrong with it.
    pub error: EnvelopeError,
}

/// A decoded inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `tools/call`.
    CallTool(CallRequest),
    /// `tools/list`.
    ListTools {
        /// Request id.
        id: CallId,
    },
}

#[derive(Deserialize)]
struct RawRequest {
    #[serde(default)]
    jsonrpc: serde_json::Value,
    #[serde(default)]
    id: serde_json::Value,
    #[serde(default)]
    method: serde_json::Value,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCallParams {
    name: String,
    #[serde(default)]
    arguments: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    payment_proof: Option<PaymentProof>,
}

/// Decodes a request envelope.
///
/// The payment proof may travel either as `params.paymentProof` or as the
/// reserved argument `arguments._payment`; either way it is removed from the
/// business arguments. Supplying both is an error.
///
/// # Errors
///
/// Returns a [`DecodeError`] carrying the JSON-RPC protocol error to answer
/// with.
pub fn decode_request(bytes: &[u8]) -> Result<Inbound, DecodeError> {
    let json: serde_json::Value = serde_json::from_slice(bytes).map_err(|e| DecodeError {
        id: None,
        error: EnvelopeError::Parse(e.to_string()),
    })?;
    let not_object = || DecodeError {
        id: None,
        error: EnvelopeError::InvalidRequest("envelope must be an object".into()),
    };
    if !json.is_object() {
        return Err(not_object());
    }
    let raw: RawRequest = serde_json::from_value(json).map_err(|_| not_object())?;

    let id = match raw.id {
        serde_json::Value::Null => None,
        other => Some(serde_json::from_value::<CallId>(other).map_err(|_| DecodeError {
            id: None,
            error: EnvelopeError::InvalidRequest("id must be an integer or a string".into()),
        })?),
    };
    let Some(id) = id else {
        return Err(DecodeError {
            id: None,
            error: EnvelopeError::InvalidRequest("missing id".into()),
        });
    };
    let fail = |error: EnvelopeError| DecodeError {
        id: Some(id.clone()),
        error,
    };

    if raw.jsonrpc.as_str() != Some(JSONRPC_VERSION) {
        return Err(fail(EnvelopeError::InvalidRequest(format!(
            "jsonrpc must be \"{JSONRPC_VERSION}\""
        ))));
    }
    let Some(method) = raw.method.as_str() else {
        return Err(fail(EnvelopeError::InvalidRequest(
            "method must be a string".into(),
        )));
    };

    match method {
        METHOD_CALL_TOOL => decode_call(id.clone(), raw.params)
            .map(Inbound::CallTool)
            .map_err(fail),
        METHOD_LIST_TOOLS => Ok(Inbound::ListTools { id }),
        other => Err(fail(EnvelopeError::MethodNotFound(other.to_owned()))),
    }
}

fn decode_call(id: CallId, params: serde_json::Value) -> Result<CallRequest, EnvelopeError> {
    let params: RawCallParams = serde_json::from_value(params)
        .map_err(|e| EnvelopeError::InvalidParams(e.to_string()))?;
    let mut arguments = params.arguments.unwrap_or_default();

    let embedded = match arguments.remove(PAYMENT_ARGUMENT_KEY) {
        None | Some(serde_json::Value::Null) => None,
        Some(raw) => Some(serde_json::from_value::<PaymentProof>(raw).map_err(|e| {
            EnvelopeError::InvalidParams(format!("{PAYMENT_ARGUMENT_KEY}: {e}"))
        })?),
    };
    let payment_proof = match (params.payment_proof, embedded) {
        (Some(_), Some(_)) => {
            return Err(EnvelopeError::InvalidParams(format!(
                "payment proof supplied both as paymentProof and as arguments.{PAYMENT_ARGUMENT_KEY}"
            )));
        }
        (proof, embedded) => proof.or(embedded),
    };

    let arguments =
        value::map_from_json(arguments).map_err(|e| EnvelopeError::InvalidParams(e.to_string()))?;

    Ok(CallRequest {
        id,
        tool_name: params.name,
        arguments,
        payment_proof,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundCallParams<'a> {
    name: &'a str,
    arguments: &'a Map,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_proof: Option<&'a PaymentProof>,
}

#[derive(Serialize)]
struct OutboundRequest<'a, P> {
    jsonrpc: &'static str,
    id: &'a CallId,
    method: &'static str,
    params: P,
}

/// Encodes a `tools/call` request envelope.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_request(request: &CallRequest) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&OutboundRequest {
        jsonrpc: JSONRPC_VERSION,
        id: &request.id,
        method: METHOD_CALL_TOOL,
        params: OutboundCallParams {
            name: &request.tool_name,
            arguments: &request.arguments,
            payment_proof: request.payment_proof.as_ref(),
        },
    })
}

/// Encodes a `tools/list` request envelope.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_list_request(id: &CallId) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&OutboundRequest {
        jsonrpc: JSONRPC_VERSION,
        id,
        method: METHOD_LIST_TOOLS,
        params: serde_json::Map::new(),
    })
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request, `null` if it could not be read.
    #[serde(default)]
    pub id: Option<CallId>,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Present on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn success(id: Option<CallId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<CallId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    fn internal(id: Option<CallId>, e: &serde_json::Error) -> Self {
        Self::error(
            id,
            RpcError {
                code: codes::INTERNAL_ERROR,
                message: format!("failed to encode response: {e}"),
                data: None,
            },
        )
    }
}

/// The `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// `error.data` of a payment-required response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredData {
    /// What the caller must pay.
    pub payment_requirement: PaymentRequirement,
}

/// One entry of a `tools/list` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolListing {
    /// Tool name.
    pub name: String,
    /// Description, if the tool has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Price, absent for free tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<PaymentRequirement>,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolList {
    /// Registered tools in name order.
    pub tools: Vec<ToolListing>,
}

/// Encodes the outcome of a call.
#[must_use]
pub fn encode_outcome(id: &CallId, outcome: &Outcome) -> RpcResponse {
    let id = Some(id.clone());
    match outcome {
        Outcome::Success(result) => match serde_json::to_value(result) {
            Ok(result) => RpcResponse::success(id, result),
            Err(e) => RpcResponse::internal(id, &e),
        },
        Outcome::PaymentRequired(requirement) => {
            let data = PaymentRequiredData {
                payment_requirement: requirement.clone(),
            };
            match serde_json::to_value(data) {
                Ok(data) => RpcResponse::error(
                    id,
                    RpcError {
                        code: codes::PAYMENT_REQUIRED,
                        message: codes::PAYMENT_REQUIRED_MESSAGE.to_owned(),
                        data: Some(data),
                    },
                ),
                Err(e) => RpcResponse::internal(id, &e),
            }
        }
        Outcome::Failure(failure) => RpcResponse::error(
            id,
            RpcError {
                code: failure.kind.code(),
                message: failure.message.clone(),
                data: None,
            },
        ),
    }
}

/// Encodes a request that failed to decode.
#[must_use]
pub fn encode_decode_error(error: &DecodeError) -> RpcResponse {
    RpcResponse::error(
        error.id.clone(),
        RpcError {
            code: error.error.code(),
            message: error.error.to_string(),
            data: None,
        },
    )
}

/// Encodes the `tools/list` result for a registry.
#[must_use]
pub fn encode_tool_list(id: &CallId, registry: &ToolRegistry) -> RpcResponse {
    let list = ToolList {
        tools: registry
            .iter()
            .map(|tool| ToolListing {
                name: tool.name().to_owned(),
                description: tool.description().map(str::to_owned),
                price: tool.price().map(PaymentRequirement::from),
            })
            .collect(),
    };
    let id = Some(id.clone());
    match serde_json::to_value(list) {
        Ok(result) => RpcResponse::success(id, result),
        Err(e) => RpcResponse::internal(id, &e),
    }
}

/// Decodes a `tools/call` response back into an [`Outcome`].
///
/// Error codes this crate does not define decode as
/// [`ErrorKind::ProtocolError`].
///
/// # Errors
///
/// Returns an [`EnvelopeError`] if the bytes are not a valid response.
pub fn decode_response(bytes: &[u8]) -> Result<(Option<CallId>, Outcome), EnvelopeError> {
    let response: RpcResponse =
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Parse(e.to_string()))?;
    let outcome = match (response.result, response.error) {
        (_, Some(error)) if error.code == codes::PAYMENT_REQUIRED => {
            let data = error.data.ok_or_else(|| {
                EnvelopeError::InvalidRequest("payment required without requirement".into())
            })?;
            let data: PaymentRequiredData = serde_json::from_value(data)
                .map_err(|e| EnvelopeError::InvalidRequest(e.to_string()))?;
            Outcome::PaymentRequired(data.payment_requirement)
        }
        (_, Some(error)) => {
            let kind = ErrorKind::from_code(error.code).unwrap_or(ErrorKind::ProtocolError);
            Outcome::Failure(Failure::new(kind, error.message))
        }
        (Some(result), None) => {
            let result: ToolResult = serde_json::from_value(result)
                .map_err(|e| EnvelopeError::InvalidRequest(e.to_string()))?;
            Outcome::Success(result)
        }
        (None, None) => {
            return Err(EnvelopeError::InvalidRequest(
                "response has neither result nor error".into(),
            ));
        }
    };
    Ok((response.id, outcome))
}

/// Decodes a `tools/list` response.
///
/// # Errors
///
/// Returns an [`EnvelopeError`] if the bytes are not a valid list response.
pub fn decode_tool_list(bytes: &[u8]) -> Result<ToolList, EnvelopeError> {
    let response: RpcResponse =
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Parse(e.to_string()))?;
    if let Some(error) = response.error {
        return Err(EnvelopeError::InvalidRequest(format!(
            "{} ({})",
            error.message, error.code
        )));
    }
    let result = response
        .result
        .ok_or_else(|| EnvelopeError::InvalidRequest("missing result".into()))?;
    serde_json::from_value(result).map_err(|e| EnvelopeError::InvalidRequest(e.to_string()))
}
