use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Type-tag namespace for host-to-frame messages.
pub const APP_EVENT_PREFIX: &str = "@app/";
/// Type-tag namespace for frame-to-host messages.
pub const FRAME_EVENT_PREFIX: &str = "@frame/";

const SUCCESS_SUFFIX: &str = "_SUCCESS";
const ERROR_SUFFIX: &str = "_ERROR";

/// Opaque token linking one outbound request to its eventual inbound reply.
/// Unique for the lifetime of a bridge instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a collision-resistant id for a new request.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An event failed structural validation at the channel boundary.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("schema violation in {event_type}: {reason}")]
pub struct SchemaViolation {
    pub event_type: String,
    pub reason: String,
}

impl SchemaViolation {
    fn new(event_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            reason: reason.into(),
        }
    }
}

/// Every operation the host can ask the sub-context to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppEventKind {
    ConnectEmail,
    ConnectDevice,
    ConnectOtp,
    ConnectSocial,
    ConnectFarcaster,
    GetFarcasterUri,
    GetSocialRedirectUri,
    GetUser,
    UpdateEmail,
    UpdateEmailPrimaryOtp,
    UpdateEmailSecondaryOtp,
    GetChainId,
    SwitchNetwork,
    GetSmartAccountEnabledNetworks,
    SetPreferredAccount,
    SyncTheme,
    SyncDappData,
    IsConnected,
    SignOut,
    RpcRequest,
}

impl AppEventKind {
    /// Bare operation name, without any direction prefix.
    pub fn operation(self) -> &'static str {
        match self {
            Self::ConnectEmail => "CONNECT_EMAIL",
            Self::ConnectDevice => "CONNECT_DEVICE",
            Self::ConnectOtp => "CONNECT_OTP",
            Self::ConnectSocial => "CONNECT_SOCIAL",
            Self::ConnectFarcaster => "CONNECT_FARCASTER",
            Self::GetFarcasterUri => "GET_FARCASTER_URI",
            Self::GetSocialRedirectUri => "GET_SOCIAL_REDIRECT_URI",
            Self::GetUser => "GET_USER",
            Self::UpdateEmail => "UPDATE_EMAIL",
            Self::UpdateEmailPrimaryOtp => "UPDATE_EMAIL_PRIMARY_OTP",
            Self::UpdateEmailSecondaryOtp => "UPDATE_EMAIL_SECONDARY_OTP",
            Self::GetChainId => "GET_CHAIN_ID",
            Self::SwitchNetwork => "SWITCH_NETWORK",
            Self::GetSmartAccountEnabledNetworks => "GET_SMART_ACCOUNT_ENABLED_NETWORKS",
            Self::SetPreferredAccount => "SET_PREFERRED_ACCOUNT",
            Self::SyncTheme => "SYNC_THEME",
            Self::SyncDappData => "SYNC_DAPP_DATA",
            Self::IsConnected => "IS_CONNECTED",
            Self::SignOut => "SIGN_OUT",
            Self::RpcRequest => "RPC_REQUEST",
        }
    }

    /// Wire type tag carried by the outbound envelope.
    pub fn wire_type(self) -> String {
        format!("{APP_EVENT_PREFIX}{}", self.operation())
    }

    /// Inbound type tag that answers this operation affirmatively.
    pub fn success_tag(self) -> String {
        format!("{FRAME_EVENT_PREFIX}{}{SUCCESS_SUFFIX}", self.operation())
    }

    /// Inbound type tag that answers this operation with a remote error.
    pub fn error_tag(self) -> String {
        format!("{FRAME_EVENT_PREFIX}{}{ERROR_SUFFIX}", self.operation())
    }

    /// User-interactive flows get a response deadline; everything else waits
    /// indefinitely for the sub-context.
    pub fn has_deadline(self) -> bool {
        matches!(
            self,
            Self::ConnectEmail
                | Self::ConnectDevice
                | Self::ConnectOtp
                | Self::ConnectSocial
                | Self::GetSocialRedirectUri
                | Self::GetFarcasterUri
        )
    }

    fn requires_payload(self) -> bool {
        matches!(
            self,
            Self::ConnectEmail
                | Self::ConnectOtp
                | Self::ConnectSocial
                | Self::GetSocialRedirectUri
                | Self::GetUser
                | Self::UpdateEmail
                | Self::UpdateEmailPrimaryOtp
                | Self::UpdateEmailSecondaryOtp
                | Self::SwitchNetwork
                | Self::SetPreferredAccount
                | Self::SyncTheme
                | Self::SyncDappData
                | Self::RpcRequest
        )
    }
}

/// Outbound host-to-frame event. Always carries a correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct AppEvent {
    pub kind: AppEventKind,
    pub id: CorrelationId,
    pub payload: Option<Value>,
}

impl AppEvent {
    pub fn new(kind: AppEventKind, payload: Option<Value>) -> Self {
        Self {
            kind,
            id: CorrelationId::fresh(),
            payload,
        }
    }

    /// Structural validation applied before transmission.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        let tag = self.kind.wire_type();
        if self.id.as_str().is_empty() {
            return Err(SchemaViolation::new(tag, "empty correlation id"));
        }
        if self.kind.requires_payload() && self.payload.is_none() {
            return Err(SchemaViolation::new(tag, "missing payload"));
        }
        match self.kind {
            AppEventKind::RpcRequest => {
                let method = self
                    .payload
                    .as_ref()
                    .and_then(|p| p.get("method"))
                    .and_then(Value::as_str);
                if method.is_none_or(str::is_empty) {
                    return Err(SchemaViolation::new(tag, "rpc payload missing method"));
                }
            }
            AppEventKind::SwitchNetwork => {
                let chain = self.payload.as_ref().and_then(|p| p.get("chainId"));
                if chain.is_none() {
                    return Err(SchemaViolation::new(tag, "payload missing chainId"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Serialize into the `{type, id, payload?}` envelope.
    pub fn to_wire(&self) -> Value {
        match &self.payload {
            Some(payload) => json!({
                "type": self.kind.wire_type(),
                "id": self.id.as_str(),
                "payload": payload,
            }),
            None => json!({
                "type": self.kind.wire_type(),
                "id": self.id.as_str(),
            }),
        }
    }
}

/// Whether an inbound event reports success or a remote error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Success,
    Error,
}

/// Inbound frame-to-host event, parsed from the wire envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEvent {
    pub id: CorrelationId,
    /// Bare operation name derived from the type tag.
    pub operation: String,
    pub status: ReplyStatus,
    pub payload: Option<Value>,
}

impl FrameEvent {
    /// Parse a raw message into a frame event. Returns `None` for anything
    /// malformed or outside the frame-event namespace; such messages must be
    /// ignored without matching any listener.
    pub fn parse(raw: &Value) -> Option<Self> {
        let tag = raw.get("type")?.as_str()?;
        let rest = tag.strip_prefix(FRAME_EVENT_PREFIX)?;
        let id = raw.get("id")?.as_str()?;
        if id.is_empty() {
            return None;
        }
        let (operation, status) = if let Some(op) = rest.strip_suffix(SUCCESS_SUFFIX) {
            (op, ReplyStatus::Success)
        } else if let Some(op) = rest.strip_suffix(ERROR_SUFFIX) {
            (op, ReplyStatus::Error)
        } else {
            return None;
        };
        if operation.is_empty() {
            return None;
        }
        Some(Self {
            id: CorrelationId::from(id),
            operation: operation.to_string(),
            status,
            payload: raw.get("payload").cloned(),
        })
    }
}
