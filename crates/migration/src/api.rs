//! Request/response surface over the migration controller.
//!
//! Hosts (an admin HTTP endpoint, the CLI) pass a JSON request such as
//! `{"action": "start", "reset": true}` together with the caller's context.
//! Every action requires the management capability and a valid request
//! token. Responses are `{"success": bool, "data": ...}` where `data` is a
//! progress snapshot on success and `{"code", "message"}` on failure.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::controller::MigrationController;
use crate::error::MigrationError;
use crate::snapshot::ProgressSnapshot;

/// Capability a caller needs to manage the migration.
pub const MANAGE_CAPABILITY: &str = "manage_options";

/// Actions accepted by the status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiAction {
    Start,
    Pause,
    Resume,
    Cancel,
    Status,
    Reset,
    ProcessBatch,
}

/// A request to the status API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub action: ApiAction,
    /// Only meaningful for `start`.
    #[serde(default)]
    pub reset: bool,
}

impl ApiRequest {
    /// Create a request for an action.
    pub fn new(action: ApiAction) -> Self {
        Self {
            action,
            reset: false,
        }
    }

    /// Ask `start` to discard the previous run first.
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }
}

/// Who is calling, as established by the host.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Capabilities granted to the caller.
    pub capabilities: Vec<String>,
    /// Anti-forgery token sent with the request.
    pub token: Option<String>,
}

impl RequestContext {
    /// Create a context with the given capabilities and no token.
    pub fn new(capabilities: Vec<String>) -> Self {
        Self {
            capabilities,
            token: None,
        }
    }

    /// Attach the request token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Check whether the caller holds a capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c: &String| c == capability)
    }
}

/// Decides whether a caller may perform an action.
pub trait Authorizer: Send + Sync {
    /// # Errors
    /// Returns `PermissionDenied` if the caller may not perform `action`.
    fn authorize(&self, action: ApiAction, context: &RequestContext) -> Result<(), MigrationError>;
}

/// Requires the management capability and a token matching the one issued
/// for this session.
#[derive(Debug, Clone)]
pub struct TokenAuthorizer {
    capability: String,
    token: String,
}

impl TokenAuthorizer {
    /// Create an authorizer expecting `token` and [`MANAGE_CAPABILITY`].
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            capability: MANAGE_CAPABILITY.to_string(),
            token: token.into(),
        }
    }
}

impl Authorizer for TokenAuthorizer {
    fn authorize(&self, action: ApiAction, context: &RequestContext) -> Result<(), MigrationError> {
        if !context.has_capability(&self.capability) {
            log::warn!("Rejected {:?}: missing capability {}", action, self.capability);
            return Err(MigrationError::PermissionDenied(format!(
                "missing capability {}",
                self.capability
            )));
        }
        if context.token.as_deref() != Some(self.token.as_str()) {
            log::warn!("Rejected {:?}: invalid request token", action);
            return Err(MigrationError::PermissionDenied(
                "invalid request token".to_string(),
            ));
        }
        Ok(())
    }
}

/// Failure payload of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub code: u16,
    pub message: String,
}

/// Response payload: a snapshot or a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiData {
    Snapshot(ProgressSnapshot),
    Failure(ApiFailure),
}

/// A status API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: ApiData,
}

impl ApiResponse {
    fn ok(snapshot: ProgressSnapshot) -> Self {
        Self {
            success: true,
            data: ApiData::Snapshot(snapshot),
        }
    }

    fn failure(code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: ApiData::Failure(ApiFailure {
                code,
                message: message.into(),
            }),
        }
    }

    /// HTTP status a host should answer with.
    pub fn status_code(&self) -> u16 {
        match &self.data {
            ApiData::Snapshot(_) => 200,
            ApiData::Failure(failure) => failure.code,
        }
    }

    /// The snapshot, if the request succeeded.
    pub fn snapshot(&self) -> Option<&ProgressSnapshot> {
        match &self.data {
            ApiData::Snapshot(snapshot) => Some(snapshot),
            ApiData::Failure(_) => None,
        }
    }
}

impl From<MigrationError> for ApiResponse {
    fn from(err: MigrationError) -> Self {
        ApiResponse::failure(err.status_code(), err.to_string())
    }
}

/// Authorizes requests and dispatches them to the controller.
pub struct StatusApi {
    controller: Arc<MigrationController>,
    authorizer: Arc<dyn Authorizer>,
}

impl StatusApi {
    /// Create an API over a controller.
    pub fn new(controller: Arc<MigrationController>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            controller,
            authorizer,
        }
    }

    /// Handle one request.
    pub async fn handle(&self, request: &ApiRequest, context: &RequestContext) -> ApiResponse {
        if let Err(e) = self.authorizer.authorize(request.action, context) {
            return e.into();
        }

        let result: Result<ProgressSnapshot, MigrationError> = match request.action {
            ApiAction::Start => self.controller.start(request.reset).await,
            ApiAction::Pause => self.controller.pause().await,
            ApiAction::Resume => self.controller.resume().await,
            ApiAction::Cancel => self.controller.cancel().await,
            ApiAction::Status => self.controller.status().await,
            ApiAction::Reset => self.controller.reset().await,
            ApiAction::ProcessBatch => self.controller.process_batch().await,
        };

        match result {
            Ok(snapshot) => ApiResponse::ok(snapshot),
            Err(e) => {
                if !e.is_recoverable() {
                    log::debug!("{:?} failed: {}", request.action, e);
                }
                e.into()
            }
        }
    }

    /// Handle a JSON-encoded request and return the JSON-encoded response.
    ///
    /// Malformed requests are answered with code 400.
    pub async fn handle_json(&self, body: &str, context: &RequestContext) -> String {
        let response: ApiResponse = match serde_json::from_str::<ApiRequest>(body) {
            Ok(request) => self.handle(&request, context).await,
            Err(e) => ApiResponse::failure(400, format!("Malformed request: {}", e)),
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(
                r#"{{"success":false,"data":{{"code":500,"message":"{}"}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}
