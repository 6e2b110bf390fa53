use std::sync::{Arc, Mutex};

use chrono::Utc;
use palantir_core::{
    events::{AppEventKind, FrameEvent, ReplyStatus},
    messages::{
        rpc, AppMetadata, ChainIdResponse, ConnectEmailRequest, ConnectEmailResponse,
        ConnectRequest, ConnectSocialRequest, FarcasterConnectResponse, FarcasterUriResponse,
        IsConnectedResponse, OtpRequest, PreferredAccount, RpcCall, SecondaryOtpResponse,
        SmartAccountNetworksResponse, SocialRedirectRequest, SocialRedirectResponse,
        ThemeSettings, UpdateEmailRequest, UpdateEmailResponse, UserSession, ACCOUNT_TYPE_EOA,
    },
    outcome::CallOutcome,
    store::{SessionStore, StoreError},
};
use palantir_frame::SecureFrame;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{call::OpenRpcRequest, session::SessionCache, BridgeError};

/// Chain used when neither the caller nor the cache knows one.
const DEFAULT_CHAIN_ID: u64 = 1;
/// Minimum spacing between email login/update triggers.
const EMAIL_RETRY_WINDOW_SECS: i64 = 30;

type TimeoutHandler = Arc<dyn Fn() + Send + Sync>;
type RequestHook = Box<dyn Fn(&RpcCall) + Send + Sync>;
type SuccessHook = Box<dyn Fn(&CallOutcome<Value>, &RpcCall) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&BridgeError, &RpcCall) + Send + Sync>;

#[derive(Default)]
struct RpcHooks {
    request: Mutex<Option<RequestHook>>,
    success: Mutex<Option<SuccessHook>>,
    error: Mutex<Option<ErrorHook>>,
}

/// High-level operations against the wallet sub-context.
///
/// One bridge owns one frame handle and one in-flight request set. Construct
/// it explicitly and share it via `Arc` (or [`crate::registry`]) — there is
/// no implicit process singleton.
pub struct AuthBridge {
    frame: Arc<SecureFrame>,
    session: SessionCache,
    open_rpc: Mutex<Vec<OpenRpcRequest>>,
    on_timeout: Option<TimeoutHandler>,
    hooks: RpcHooks,
}

impl AuthBridge {
    /// Build a bridge over an existing frame handle and session store. The
    /// sub-context is mounted eagerly; a mount failure is logged and every
    /// call then resolves unavailable rather than erroring.
    pub fn new(frame: Arc<SecureFrame>, store: Arc<dyn SessionStore>) -> Self {
        if let Err(err) = frame.create() {
            warn!(%err, "sub-context mount failed; operations will resolve unavailable");
        }
        Self {
            frame,
            session: SessionCache::new(store),
            open_rpc: Mutex::new(Vec::new()),
            on_timeout: None,
            hooks: RpcHooks::default(),
        }
    }

    /// Callback invoked when an interactive operation hits its deadline
    /// (e.g. to prompt the user to retry). The call itself still resolves
    /// unavailable.
    pub fn with_timeout_handler(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(handler));
        self
    }

    /// Typed accessors over the durable session cache.
    pub fn session(&self) -> &SessionCache {
        &self.session
    }

    /// CAIP-2 ids of the networks the sub-context can operate on.
    pub fn available_chain_ids(&self) -> Vec<String> {
        self.frame.config().available_chain_ids()
    }

    pub(crate) fn frame(&self) -> &SecureFrame {
        &self.frame
    }

    pub(crate) fn open_rpc(&self) -> &Mutex<Vec<OpenRpcRequest>> {
        &self.open_rpc
    }

    pub(crate) fn notify_timeout(&self) {
        if let Some(handler) = &self.on_timeout {
            handler();
        }
    }

    // ── Connect flows ───────────────────────────────────────────────────

    /// Start an email login. Success hands back the next verification step
    /// and stamps the attempt for throttling.
    pub async fn connect_email(
        &self,
        request: ConnectEmailRequest,
    ) -> Result<CallOutcome<ConnectEmailResponse>, BridgeError> {
        self.ensure_email_allowed().await?;
        let outcome = self
            .call(AppEventKind::ConnectEmail, Some(payload(&request)?))
            .await?;
        if outcome.is_success() {
            best_effort(
                self.session.record_email_login_attempt().await,
                "email login stamp",
            );
        }
        decode(outcome, "CONNECT_EMAIL")
    }

    /// Start a device (passkey) login.
    pub async fn connect_device(&self) -> Result<CallOutcome<()>, BridgeError> {
        Ok(self
            .call(AppEventKind::ConnectDevice, None)
            .await?
            .map(|_| ()))
    }

    /// Submit the one-time code for a pending email login.
    pub async fn connect_otp(&self, request: OtpRequest) -> Result<CallOutcome<()>, BridgeError> {
        Ok(self
            .call(AppEventKind::ConnectOtp, Some(payload(&request)?))
            .await?
            .map(|_| ()))
    }

    /// Complete a social login from a redirect URI. A returned identity name
    /// is persisted for session resumption.
    pub async fn connect_social(
        &self,
        request: ConnectSocialRequest,
    ) -> Result<CallOutcome<UserSession>, BridgeError> {
        let outcome = self
            .call(AppEventKind::ConnectSocial, Some(payload(&request)?))
            .await?;
        let outcome: CallOutcome<UserSession> = decode(outcome, "CONNECT_SOCIAL")?;
        if let CallOutcome::Success(user) = &outcome {
            if let Some(user_name) = &user.user_name {
                best_effort(
                    self.session.record_social_login(user_name).await,
                    "social username",
                );
            }
        }
        Ok(outcome)
    }

    pub async fn connect_farcaster(
        &self,
    ) -> Result<CallOutcome<FarcasterConnectResponse>, BridgeError> {
        let outcome = self.call(AppEventKind::ConnectFarcaster, None).await?;
        let outcome: CallOutcome<FarcasterConnectResponse> =
            decode(outcome, "CONNECT_FARCASTER")?;
        if let CallOutcome::Success(response) = &outcome {
            best_effort(
                self.session.record_social_login(&response.user_name).await,
                "social username",
            );
        }
        Ok(outcome)
    }

    pub async fn get_farcaster_uri(
        &self,
    ) -> Result<CallOutcome<FarcasterUriResponse>, BridgeError> {
        let outcome = self.call(AppEventKind::GetFarcasterUri, None).await?;
        decode(outcome, "GET_FARCASTER_URI")
    }

    pub async fn get_social_redirect_uri(
        &self,
        request: SocialRedirectRequest,
    ) -> Result<CallOutcome<SocialRedirectResponse>, BridgeError> {
        let outcome = self
            .call(AppEventKind::GetSocialRedirectUri, Some(payload(&request)?))
            .await?;
        decode(outcome, "GET_SOCIAL_REDIRECT_URI")
    }

    /// Resume or establish a connection. Success persists the login email
    /// and the chain the session landed on.
    pub async fn connect(
        &self,
        request: ConnectRequest,
    ) -> Result<CallOutcome<UserSession>, BridgeError> {
        let outcome = self.fetch_user(request).await?;
        if let CallOutcome::Success(user) = &outcome {
            best_effort(
                self.session.record_login_success(user.email.as_deref()).await,
                "login success",
            );
            best_effort(
                self.session.set_last_used_chain_id(user.chain_id).await,
                "last used chain",
            );
        }
        Ok(outcome)
    }

    /// Like [`AuthBridge::connect`] but without cache side effects.
    pub async fn get_user(
        &self,
        request: ConnectRequest,
    ) -> Result<CallOutcome<UserSession>, BridgeError> {
        self.fetch_user(request).await
    }

    async fn fetch_user(
        &self,
        mut request: ConnectRequest,
    ) -> Result<CallOutcome<UserSession>, BridgeError> {
        if request.chain_id.is_none() {
            let cached = self.session.last_used_chain_id().await.unwrap_or_else(|err| {
                warn!(%err, "could not read last used chain id");
                None
            });
            request.chain_id = Some(cached.unwrap_or(DEFAULT_CHAIN_ID));
        }
        let outcome = self
            .call(AppEventKind::GetUser, Some(payload(&request)?))
            .await?;
        decode(outcome, "GET_USER")
    }

    // ── Email management ────────────────────────────────────────────────

    pub async fn update_email(
        &self,
        request: UpdateEmailRequest,
    ) -> Result<CallOutcome<UpdateEmailResponse>, BridgeError> {
        self.ensure_email_allowed().await?;
        let outcome = self
            .call(AppEventKind::UpdateEmail, Some(payload(&request)?))
            .await?;
        if outcome.is_success() {
            best_effort(
                self.session.record_email_login_attempt().await,
                "email login stamp",
            );
        }
        decode(outcome, "UPDATE_EMAIL")
    }

    /// Verify the one-time code sent to the current email.
    pub async fn update_email_primary_otp(
        &self,
        request: OtpRequest,
    ) -> Result<CallOutcome<()>, BridgeError> {
        Ok(self
            .call(AppEventKind::UpdateEmailPrimaryOtp, Some(payload(&request)?))
            .await?
            .map(|_| ()))
    }

    /// Verify the one-time code sent to the new email. Success records the
    /// new address as the login email.
    pub async fn update_email_secondary_otp(
        &self,
        request: OtpRequest,
    ) -> Result<CallOutcome<SecondaryOtpResponse>, BridgeError> {
        let outcome = self
            .call(
                AppEventKind::UpdateEmailSecondaryOtp,
                Some(payload(&request)?),
            )
            .await?;
        let outcome: CallOutcome<SecondaryOtpResponse> =
            decode(outcome, "UPDATE_EMAIL_SECONDARY_OTP")?;
        if let CallOutcome::Success(response) = &outcome {
            best_effort(
                self.session
                    .record_login_success(Some(&response.new_email))
                    .await,
                "login success",
            );
        }
        Ok(outcome)
    }

    // ── Network operations ──────────────────────────────────────────────

    pub async fn get_chain_id(&self) -> Result<CallOutcome<ChainIdResponse>, BridgeError> {
        let outcome = self.call(AppEventKind::GetChainId, None).await?;
        let outcome: CallOutcome<ChainIdResponse> = decode(outcome, "GET_CHAIN_ID")?;
        if let CallOutcome::Success(response) = &outcome {
            best_effort(
                self.session.set_last_used_chain_id(response.chain_id).await,
                "last used chain",
            );
        }
        Ok(outcome)
    }

    pub async fn switch_network(
        &self,
        chain_id: u64,
    ) -> Result<CallOutcome<ChainIdResponse>, BridgeError> {
        let outcome = self
            .call(
                AppEventKind::SwitchNetwork,
                Some(json!({ "chainId": chain_id })),
            )
            .await?;
        let outcome: CallOutcome<ChainIdResponse> = decode(outcome, "SWITCH_NETWORK")?;
        if let CallOutcome::Success(response) = &outcome {
            best_effort(
                self.session.set_last_used_chain_id(response.chain_id).await,
                "last used chain",
            );
        }
        Ok(outcome)
    }

    /// Fetch the smart-account-enabled network list. The cached list always
    /// reflects the latest answer: empty on anything but success.
    pub async fn get_smart_account_enabled_networks(
        &self,
    ) -> Result<CallOutcome<SmartAccountNetworksResponse>, BridgeError> {
        let outcome = self
            .call(AppEventKind::GetSmartAccountEnabledNetworks, None)
            .await?;
        let outcome: CallOutcome<SmartAccountNetworksResponse> =
            decode(outcome, "GET_SMART_ACCOUNT_ENABLED_NETWORKS")?;
        let networks = match &outcome {
            CallOutcome::Success(response) => response.smart_account_enabled_networks.clone(),
            _ => Vec::new(),
        };
        best_effort(
            self.session.set_smart_account_networks(&networks).await,
            "smart account networks",
        );
        Ok(outcome)
    }

    pub async fn set_preferred_account(
        &self,
        account_type: &str,
    ) -> Result<CallOutcome<PreferredAccount>, BridgeError> {
        let outcome = self
            .call(
                AppEventKind::SetPreferredAccount,
                Some(json!({ "type": account_type })),
            )
            .await?;
        decode(outcome, "SET_PREFERRED_ACCOUNT")
    }

    // ── Host metadata sync ──────────────────────────────────────────────

    pub async fn sync_theme(&self, theme: ThemeSettings) -> Result<CallOutcome<()>, BridgeError> {
        Ok(self
            .call(AppEventKind::SyncTheme, Some(payload(&theme)?))
            .await?
            .map(|_| ()))
    }

    pub async fn sync_app_metadata(
        &self,
        metadata: AppMetadata,
    ) -> Result<CallOutcome<()>, BridgeError> {
        Ok(self
            .call(AppEventKind::SyncDappData, Some(payload(&metadata)?))
            .await?
            .map(|_| ()))
    }

    // ── Connectivity ────────────────────────────────────────────────────

    /// Check whether the sub-context still holds a session. Anything except
    /// a positive answer clears the auth-login cache unit.
    pub async fn is_connected(&self) -> Result<CallOutcome<IsConnectedResponse>, BridgeError> {
        let outcome = self.call(AppEventKind::IsConnected, None).await?;
        let outcome: CallOutcome<IsConnectedResponse> = decode(outcome, "IS_CONNECTED")?;
        let still_connected = matches!(
            &outcome,
            CallOutcome::Success(response) if response.is_connected
        );
        if !still_connected {
            best_effort(
                self.session.clear_auth_login_cache().await,
                "auth login cache",
            );
        }
        Ok(outcome)
    }

    pub async fn disconnect(&self) -> Result<CallOutcome<()>, BridgeError> {
        let outcome = self.call(AppEventKind::SignOut, None).await?;
        best_effort(
            self.session.clear_auth_login_cache().await,
            "auth login cache",
        );
        Ok(outcome.map(|_| ()))
    }

    // ── Generic RPC ─────────────────────────────────────────────────────

    /// Relay a JSON-RPC call through the sub-context. `eth_chainId` is
    /// answered from the local cache without any outbound traffic; an
    /// unknown cached chain resolves unavailable.
    pub async fn request(&self, call: RpcCall) -> Result<CallOutcome<Value>, BridgeError> {
        if call.method == rpc::GET_CHAIN_ID {
            let cached = self.session.last_used_chain_id().await.unwrap_or_else(|err| {
                warn!(%err, "could not read last used chain id");
                None
            });
            return Ok(match cached {
                Some(chain_id) => CallOutcome::Success(json!(chain_id)),
                None => CallOutcome::Unavailable,
            });
        }

        self.run_request_hook(&call);
        let result = async {
            let body = payload(&call)?;
            self.call(AppEventKind::RpcRequest, Some(body)).await
        }
        .await;
        match &result {
            Ok(outcome) => self.run_success_hook(outcome, &call),
            Err(err) => self.run_error_hook(err, &call),
        }
        result
    }

    /// Wallet capability discovery; degrades to an empty capability map on
    /// any failure.
    pub async fn get_capabilities(&self) -> Value {
        match self.request(RpcCall::new(rpc::WALLET_GET_CAPABILITIES)).await {
            Ok(CallOutcome::Success(value)) if value.is_object() => value,
            Ok(_) => json!({}),
            Err(err) => {
                debug!(%err, "capability query failed");
                json!({})
            }
        }
    }

    // ── Observability hooks ─────────────────────────────────────────────

    pub fn on_rpc_request(&self, hook: impl Fn(&RpcCall) + Send + Sync + 'static) {
        if let Ok(mut guard) = self.hooks.request.lock() {
            *guard = Some(Box::new(hook));
        }
    }

    pub fn on_rpc_success(
        &self,
        hook: impl Fn(&CallOutcome<Value>, &RpcCall) + Send + Sync + 'static,
    ) {
        if let Ok(mut guard) = self.hooks.success.lock() {
            *guard = Some(Box::new(hook));
        }
    }

    pub fn on_rpc_error(&self, hook: impl Fn(&BridgeError, &RpcCall) + Send + Sync + 'static) {
        if let Ok(mut guard) = self.hooks.error.lock() {
            *guard = Some(Box::new(hook));
        }
    }

    fn run_request_hook(&self, call: &RpcCall) {
        if let Ok(guard) = self.hooks.request.lock() {
            if let Some(hook) = guard.as_ref() {
                hook(call);
            }
        }
    }

    fn run_success_hook(&self, outcome: &CallOutcome<Value>, call: &RpcCall) {
        if let Ok(guard) = self.hooks.success.lock() {
            if let Some(hook) = guard.as_ref() {
                hook(outcome, call);
            }
        }
    }

    fn run_error_hook(&self, error: &BridgeError, call: &RpcCall) {
        if let Ok(guard) = self.hooks.error.lock() {
            if let Some(hook) = guard.as_ref() {
                hook(error, call);
            }
        }
    }

    // ── Out-of-band notifications ───────────────────────────────────────

    /// A session was (re-)established, from any correlated call or push.
    pub fn on_connect(&self, callback: impl Fn(UserSession) + Send + 'static) {
        self.spawn_frame_listener(move |event| {
            if event.operation == AppEventKind::GetUser.operation()
                && event.status == ReplyStatus::Success
            {
                if let Some(body) = event.payload {
                    match serde_json::from_value::<UserSession>(body) {
                        Ok(user) => callback(user),
                        Err(err) => debug!(%err, "connect notification payload mismatch"),
                    }
                }
            }
        });
    }

    /// The connectivity check confirmed a live session.
    pub fn on_is_connected(&self, callback: impl Fn() + Send + 'static) {
        self.spawn_frame_listener(move |event| {
            if event.operation == AppEventKind::IsConnected.operation()
                && event.status == ReplyStatus::Success
                && is_connected_payload(event.payload.as_ref())
            {
                callback();
            }
        });
    }

    /// The connectivity check failed or reported no session.
    pub fn on_not_connected(&self, callback: impl Fn() + Send + 'static) {
        self.spawn_frame_listener(move |event| {
            if event.operation != AppEventKind::IsConnected.operation() {
                return;
            }
            match event.status {
                ReplyStatus::Error => callback(),
                ReplyStatus::Success if !is_connected_payload(event.payload.as_ref()) => {
                    callback();
                }
                ReplyStatus::Success => {}
            }
        });
    }

    /// The preferred account type changed. A remote error falls back to the
    /// externally-owned account type.
    pub fn on_set_preferred_account(&self, callback: impl Fn(PreferredAccount) + Send + 'static) {
        self.spawn_frame_listener(move |event| {
            if event.operation != AppEventKind::SetPreferredAccount.operation() {
                return;
            }
            match event.status {
                ReplyStatus::Success => {
                    if let Some(body) = event.payload {
                        match serde_json::from_value::<PreferredAccount>(body) {
                            Ok(account) => callback(account),
                            Err(err) => {
                                debug!(%err, "preferred account notification payload mismatch");
                            }
                        }
                    }
                }
                ReplyStatus::Error => callback(PreferredAccount {
                    account_type: ACCOUNT_TYPE_EOA.to_string(),
                    address: None,
                }),
            }
        });
    }

    /// The smart-account-enabled network list was refreshed. A remote error
    /// reports an empty list.
    pub fn on_smart_account_enabled_networks(
        &self,
        callback: impl Fn(Vec<u64>) + Send + 'static,
    ) {
        self.spawn_frame_listener(move |event| {
            if event.operation != AppEventKind::GetSmartAccountEnabledNetworks.operation() {
                return;
            }
            match event.status {
                ReplyStatus::Success => {
                    let networks = event
                        .payload
                        .and_then(|body| {
                            serde_json::from_value::<SmartAccountNetworksResponse>(body).ok()
                        })
                        .map(|response| response.smart_account_enabled_networks)
                        .unwrap_or_default();
                    callback(networks);
                }
                ReplyStatus::Error => callback(Vec::new()),
            }
        });
    }

    fn spawn_frame_listener(&self, handler: impl Fn(FrameEvent) + Send + 'static) {
        let mut events = self.frame.subscribe_all();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "frame event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ── Internals ───────────────────────────────────────────────────────

    async fn ensure_email_allowed(&self) -> Result<(), BridgeError> {
        let last = match self.session.last_email_login_at().await {
            Ok(last) => last,
            Err(err) => {
                warn!(%err, "could not read last email login time");
                return Ok(());
            }
        };
        if let Some(last) = last {
            let elapsed = (Utc::now() - last).num_seconds();
            let retry_in_secs = EMAIL_RETRY_WINDOW_SECS - elapsed;
            if retry_in_secs > 0 {
                return Err(BridgeError::EmailRateLimited { retry_in_secs });
            }
        }
        Ok(())
    }
}

fn is_connected_payload(payload: Option<&Value>) -> bool {
    payload
        .and_then(|body| body.get("isConnected"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn payload<T: Serialize>(request: &T) -> Result<Value, BridgeError> {
    serde_json::to_value(request).map_err(|err| BridgeError::Payload {
        operation: "request",
        reason: err.to_string(),
    })
}

fn decode<T: DeserializeOwned>(
    outcome: CallOutcome<Value>,
    operation: &'static str,
) -> Result<CallOutcome<T>, BridgeError> {
    match outcome {
        CallOutcome::Success(value) => {
            serde_json::from_value(value)
                .map(CallOutcome::Success)
                .map_err(|err| {
                    warn!(operation, %err, "success payload did not match the expected shape");
                    BridgeError::Payload {
                        operation,
                        reason: err.to_string(),
                    }
                })
        }
        CallOutcome::Recovered => Ok(CallOutcome::Recovered),
        CallOutcome::Unavailable => Ok(CallOutcome::Unavailable),
    }
}

fn best_effort(result: Result<(), StoreError>, what: &'static str) {
    if let Err(err) = result {
        warn!(%err, what, "session cache update failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use palantir_core::messages::VerifyAction;
    use palantir_frame::{FrameError, LoadBehavior};
    use tokio::sync::mpsc;

    use super::*;
    use crate::testing::harness;

    #[tokio::test(start_paused = true)]
    async fn email_connect_persists_stamp_and_clears_deadline() {
        let h = harness(LoadBehavior::Immediate);
        let bridge = Arc::clone(&h.bridge);
        let task = tokio::spawn(async move {
            bridge
                .connect_email(ConnectEmailRequest {
                    email: "user@example.com".to_string(),
                })
                .await
        });

        let outbound = h.outbound().await;
        assert_eq!(outbound["type"], "@app/CONNECT_EMAIL");
        assert_eq!(outbound["payload"]["email"], "user@example.com");

        h.reply_success(&outbound, "CONNECT_EMAIL", Some(json!({"action": "VERIFY_OTP"})));
        let outcome = task.await.expect("join").expect("no error");
        assert_eq!(
            outcome.success().expect("success").action,
            VerifyAction::VerifyOtp
        );
        assert!(h.cache.last_email_login_at().await.expect("read").is_some());

        // The deadline was cleared with the reply; it must never fire late.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(h.timeout_count(), 0);
        assert_eq!(h.frame.pending_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn email_flow_is_throttled_inside_retry_window() {
        let h = harness(LoadBehavior::Immediate);
        h.cache.record_email_login_attempt().await.expect("stamp");

        let err = h
            .bridge
            .connect_email(ConnectEmailRequest {
                email: "user@example.com".to_string(),
            })
            .await
            .expect_err("inside the retry window");
        assert!(matches!(err, BridgeError::EmailRateLimited { retry_in_secs } if retry_in_secs > 0));
        // Throttled before any dispatch.
        assert!(h.surface.try_next_outbound().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn chain_id_rpc_is_served_from_cache() {
        let h = harness(LoadBehavior::Immediate);
        h.cache.set_last_used_chain_id(137).await.expect("seed");

        let outcome = h
            .bridge
            .request(RpcCall::new("eth_chainId"))
            .await
            .expect("no error");

        assert_eq!(outcome, CallOutcome::Success(json!(137)));
        assert!(h.surface.try_next_outbound().is_none());
        assert_eq!(h.bridge.pending_rpc_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn chain_id_rpc_with_empty_cache_is_unavailable() {
        let h = harness(LoadBehavior::Immediate);
        let outcome = h
            .bridge
            .request(RpcCall::new("eth_chainId"))
            .await
            .expect("no error");
        assert!(outcome.is_unavailable());
        assert!(h.surface.try_next_outbound().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_defaults_chain_and_persists_login() {
        let h = harness(LoadBehavior::Immediate);
        let bridge = Arc::clone(&h.bridge);
        let task = tokio::spawn(async move { bridge.connect(ConnectRequest::default()).await });

        let outbound = h.outbound().await;
        assert_eq!(outbound["type"], "@app/GET_USER");
        // Nothing cached yet, so the default chain rides along.
        assert_eq!(outbound["payload"]["chainId"], 1);

        h.reply_success(
            &outbound,
            "GET_USER",
            Some(json!({
                "address": "0xabc",
                "chainId": 137,
                "email": "user@example.com",
            })),
        );
        let outcome = task.await.expect("join").expect("no error");
        let user = outcome.success().expect("success");
        assert_eq!(user.chain_id, 137);

        assert_eq!(
            h.cache.email().await.expect("read").as_deref(),
            Some("user@example.com")
        );
        assert!(h.cache.login_email_used().await.expect("read"));
        assert_eq!(h.cache.last_used_chain_id().await.expect("read"), Some(137));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connectivity_check_clears_auth_cache() {
        let h = harness(LoadBehavior::Immediate);
        h.cache
            .record_login_success(Some("user@example.com"))
            .await
            .expect("seed login");
        h.cache.set_last_used_chain_id(137).await.expect("seed chain");
        h.cache.record_social_login("wizard").await.expect("seed social");

        let bridge = Arc::clone(&h.bridge);
        let task = tokio::spawn(async move { bridge.is_connected().await });
        let outbound = h.outbound().await;
        h.reply_success(&outbound, "IS_CONNECTED", Some(json!({"isConnected": false})));

        let outcome = task.await.expect("join").expect("no error");
        assert!(!outcome.success().expect("success").is_connected);

        assert_eq!(h.cache.email().await.expect("read"), None);
        assert!(!h.cache.login_email_used().await.expect("read"));
        assert_eq!(h.cache.last_used_chain_id().await.expect("read"), None);
        assert_eq!(h.cache.social_username().await.expect("read"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_clears_auth_cache() {
        let h = harness(LoadBehavior::Immediate);
        h.cache
            .record_login_success(Some("user@example.com"))
            .await
            .expect("seed login");

        let bridge = Arc::clone(&h.bridge);
        let task = tokio::spawn(async move { bridge.disconnect().await });
        let outbound = h.outbound().await;
        assert_eq!(outbound["type"], "@app/SIGN_OUT");
        h.reply_success(&outbound, "SIGN_OUT", None);

        assert!(task.await.expect("join").expect("no error").is_success());
        assert_eq!(h.cache.email().await.expect("read"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn smart_account_networks_persist_empty_on_remote_error() {
        let h = harness(LoadBehavior::Immediate);
        h.cache
            .set_smart_account_networks(&[1, 137])
            .await
            .expect("seed");

        let bridge = Arc::clone(&h.bridge);
        let task = tokio::spawn(async move { bridge.get_smart_account_enabled_networks().await });
        let outbound = h.outbound().await;
        h.reply_error(&outbound, "GET_SMART_ACCOUNT_ENABLED_NETWORKS", None);

        let outcome = task.await.expect("join").expect("absorbed");
        assert!(outcome.is_recovered());
        assert!(h.cache.smart_account_networks().await.expect("read").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn capabilities_degrade_to_empty_map_when_unreachable() {
        let h = harness(LoadBehavior::Never);
        assert_eq!(h.bridge.get_capabilities().await, json!({}));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_rpc_payload_is_a_schema_error() {
        let h = harness(LoadBehavior::Immediate);
        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        h.bridge.on_rpc_error(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let err = h
            .bridge
            .request(RpcCall::new(""))
            .await
            .expect_err("empty method must fail validation");
        assert!(matches!(
            err,
            BridgeError::Frame(FrameError::Schema(_))
        ));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(h.surface.try_next_outbound().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rpc_hooks_observe_request_and_success() {
        let h = harness(LoadBehavior::Immediate);
        let (methods_tx, mut methods_rx) = mpsc::unbounded_channel();
        h.bridge.on_rpc_request(move |call| {
            let _ = methods_tx.send(call.method.clone());
        });
        let successes = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&successes);
        h.bridge.on_rpc_success(move |outcome, _| {
            if outcome.is_success() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let bridge = Arc::clone(&h.bridge);
        let task = tokio::spawn(async move { bridge.request(RpcCall::new("eth_blockNumber")).await });
        let outbound = h.outbound().await;
        h.reply_success(&outbound, "RPC_REQUEST", Some(json!("0x10")));

        let outcome = task.await.expect("join").expect("no error");
        assert_eq!(outcome, CallOutcome::Success(json!("0x10")));
        assert_eq!(methods_rx.recv().await.as_deref(), Some("eth_blockNumber"));
        assert_eq!(successes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_band_notifications_fan_out() {
        let h = harness(LoadBehavior::Immediate);

        let (connect_tx, mut connect_rx) = mpsc::unbounded_channel();
        h.bridge.on_connect(move |user| {
            let _ = connect_tx.send(user);
        });
        let (offline_tx, mut offline_rx) = mpsc::unbounded_channel();
        h.bridge.on_not_connected(move || {
            let _ = offline_tx.send(());
        });
        let (networks_tx, mut networks_rx) = mpsc::unbounded_channel();
        h.bridge.on_smart_account_enabled_networks(move |networks| {
            let _ = networks_tx.send(networks);
        });

        // Pushes arrive with ids no pending call owns.
        h.surface.push_inbound(json!({
            "type": "@frame/GET_USER_SUCCESS",
            "id": "push-1",
            "payload": {"address": "0xabc", "chainId": 137},
        }));
        h.surface.push_inbound(json!({
            "type": "@frame/IS_CONNECTED_SUCCESS",
            "id": "push-2",
            "payload": {"isConnected": false},
        }));
        h.surface.push_inbound(json!({
            "type": "@frame/GET_SMART_ACCOUNT_ENABLED_NETWORKS_ERROR",
            "id": "push-3",
        }));

        let user = connect_rx.recv().await.expect("connect notification");
        assert_eq!(user.address, "0xabc");
        offline_rx.recv().await.expect("offline notification");
        assert_eq!(
            networks_rx.recv().await.expect("network notification"),
            Vec::<u64>::new()
        );
    }
}
