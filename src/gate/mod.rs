//! Request authorization pipeline.
//!
//! Every inbound request flows through an ordered list of stages; each
//! stage either continues with an enriched context or short-circuits with a
//! structured rejection, and nothing downstream runs after a rejection.
//! Bearer routes run: per-minute window → per-hour window → token check.
//! Login and registration routes run the same two rate windows ahead of
//! the Account Guard.
//!
//! A correlation identifier is generated once per request and stamped on
//! the context, every audit event and any rejection, so a single request
//! can be traced across logs and the audit trail.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::config::RateLimitConfig;
use crate::error::{AppError, AuthError};
use crate::guard::{AccountGuard, AuthenticatedSession, LoginOutcome, RequestMeta};
use crate::rate_limit::RateLimiter;
use crate::token::{Claims, TokenKind, TokenService};

pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);
pub const HOUR_WINDOW: Duration = Duration::from_secs(3600);

/// Raw material the transport layer hands the gate.
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub client_ip: String,
    pub bearer_token: Option<String>,
}

impl GateRequest {
    pub fn anonymous(client_ip: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            bearer_token: None,
        }
    }

    pub fn bearer(client_ip: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            bearer_token: Some(token.into()),
        }
    }
}

/// Identity attached to the context once a bearer token checks out.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: String,
    pub claims: Claims,
}

/// Context built up as a request moves through the pipeline.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub client_ip: String,
    pub bearer_token: Option<String>,
    pub identity: Option<Identity>,
    /// Remaining quota in the per-minute window, for response headers.
    pub rate_remaining_minute: Option<u32>,
    pub rate_remaining_hour: Option<u32>,
}

impl RequestContext {
    fn new(request: &GateRequest) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            client_ip: request.client_ip.clone(),
            bearer_token: request.bearer_token.clone(),
            identity: None,
            rate_remaining_minute: None,
            rate_remaining_hour: None,
        }
    }

    pub fn meta(&self) -> RequestMeta {
        RequestMeta::correlated(self.client_ip.clone(), self.correlation_id)
    }
}

/// Structured rejection handed back to the transport layer.
#[derive(Debug)]
pub struct GateRejection {
    pub error: AppError,
    pub correlation_id: Uuid,
}

impl GateRejection {
    pub fn client_message(&self) -> &'static str {
        self.error.client_message()
    }

    pub fn status_hint(&self) -> u16 {
        self.error.status_hint()
    }

    pub fn retry_after(&self) -> Option<u64> {
        self.error.retry_after()
    }
}

/// Verdict of a single pipeline stage.
pub enum StageOutcome {
    Continue,
    ShortCircuit(AppError),
}

#[async_trait]
pub trait GateStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(&self, ctx: &mut RequestContext) -> StageOutcome;
}

/// One fixed-window rate check. The gate runs two of these back to back
/// with different windows; both must pass.
pub struct RateLimitStage {
    limiter: RateLimiter,
    limit: u32,
    window: Duration,
    label: &'static str,
}

impl RateLimitStage {
    pub fn new(limiter: RateLimiter, limit: u32, window: Duration, label: &'static str) -> Self {
        Self {
            limiter,
            limit,
            window,
            label,
        }
    }
}

#[async_trait]
impl GateStage for RateLimitStage {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn apply(&self, ctx: &mut RequestContext) -> StageOutcome {
        let identifier = format!("{}:{}", self.label, ctx.client_ip);
        let (allowed, remaining) = self
            .limiter
            .is_allowed(&identifier, self.limit, self.window)
            .await;

        match self.label {
            "minute" => ctx.rate_remaining_minute = Some(remaining),
            _ => ctx.rate_remaining_hour = Some(remaining),
        }

        if allowed {
            StageOutcome::Continue
        } else {
            warn!(
                client_ip = %ctx.client_ip,
                window = self.label,
                correlation_id = %ctx.correlation_id,
                "rate limit exceeded"
            );
            StageOutcome::ShortCircuit(AppError::RateLimitExceeded {
                retry_after: self.window.as_secs(),
            })
        }
    }
}

/// Bearer-token validation: decode, then require the access kind. A refresh
/// token presented at a resource endpoint is rejected here.
pub struct BearerAuthStage {
    tokens: TokenService,
}

impl BearerAuthStage {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl GateStage for BearerAuthStage {
    fn name(&self) -> &'static str {
        "bearer"
    }

    async fn apply(&self, ctx: &mut RequestContext) -> StageOutcome {
        let Some(token) = ctx.bearer_token.as_deref() else {
            return StageOutcome::ShortCircuit(AuthError::InvalidToken.into());
        };

        let claims = match self.tokens.decode(token) {
            Ok(claims) => claims,
            Err(e) => return StageOutcome::ShortCircuit(e),
        };

        if !TokenService::check_kind(&claims, TokenKind::Access) {
            return StageOutcome::ShortCircuit(AuthError::InvalidToken.into());
        }

        ctx.identity = Some(Identity {
            user_id: claims.sub.clone(),
            role: claims.role.clone(),
            claims,
        });
        StageOutcome::Continue
    }
}

pub struct RequestGate {
    bearer_stages: Vec<Box<dyn GateStage>>,
    login_stages: Vec<Box<dyn GateStage>>,
    guard: Arc<AccountGuard>,
    audit: Arc<dyn AuditSink>,
}

impl RequestGate {
    pub fn new(
        limiter: RateLimiter,
        tokens: TokenService,
        guard: Arc<AccountGuard>,
        audit: Arc<dyn AuditSink>,
        quotas: RateLimitConfig,
    ) -> Self {
        let bearer_stages: Vec<Box<dyn GateStage>> = vec![
            Box::new(RateLimitStage::new(
                limiter.clone(),
                quotas.per_minute,
                MINUTE_WINDOW,
                "minute",
            )),
            Box::new(RateLimitStage::new(
                limiter.clone(),
                quotas.per_hour,
                HOUR_WINDOW,
                "hour",
            )),
            Box::new(BearerAuthStage::new(tokens)),
        ];
        let login_stages: Vec<Box<dyn GateStage>> = vec![
            Box::new(RateLimitStage::new(
                limiter.clone(),
                quotas.per_minute,
                MINUTE_WINDOW,
                "minute",
            )),
            Box::new(RateLimitStage::new(
                limiter,
                quotas.per_hour,
                HOUR_WINDOW,
                "hour",
            )),
        ];

        Self {
            bearer_stages,
            login_stages,
            guard,
            audit,
        }
    }

    async fn run_stages(
        stages: &[Box<dyn GateStage>],
        ctx: &mut RequestContext,
    ) -> Result<(), AppError> {
        for stage in stages {
            match stage.apply(ctx).await {
                StageOutcome::Continue => continue,
                StageOutcome::ShortCircuit(error) => return Err(error),
            }
        }
        Ok(())
    }

    fn reject(&self, ctx: &RequestContext, method: &str, error: AppError) -> GateRejection {
        self.audit.emit(
            AuditEvent::security(method, ctx.client_ip.clone())
                .reason(error.to_string())
                .correlated(ctx.correlation_id),
        );
        GateRejection {
            error,
            correlation_id: ctx.correlation_id,
        }
    }

    /// Authorize a bearer-authenticated request. On success the returned
    /// context carries the caller's identity for downstream handlers.
    pub async fn authorize(&self, request: &GateRequest) -> Result<RequestContext, GateRejection> {
        let mut ctx = RequestContext::new(request);

        match Self::run_stages(&self.bearer_stages, &mut ctx).await {
            Ok(()) => Ok(ctx),
            Err(error) => Err(self.reject(&ctx, "request_rejected", error)),
        }
    }

    /// Rate-check then delegate a credential login to the Account Guard.
    pub async fn login(
        &self,
        request: &GateRequest,
        email: &str,
        password: &str,
        mfa_code: Option<&str>,
    ) -> Result<(RequestContext, LoginOutcome), GateRejection> {
        let mut ctx = RequestContext::new(request);

        if let Err(error) = Self::run_stages(&self.login_stages, &mut ctx).await {
            return Err(self.reject(&ctx, "login_rejected", error));
        }

        match self
            .guard
            .login(email, password, mfa_code, &ctx.meta())
            .await
        {
            Ok(outcome) => Ok((ctx, outcome)),
            // The guard has already audited the precise reason.
            Err(error) => Err(GateRejection {
                error,
                correlation_id: ctx.correlation_id,
            }),
        }
    }

    /// Rate-check then delegate a registration to the Account Guard.
    pub async fn register(
        &self,
        request: &GateRequest,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<(RequestContext, AuthenticatedSession), GateRejection> {
        let mut ctx = RequestContext::new(request);

        if let Err(error) = Self::run_stages(&self.login_stages, &mut ctx).await {
            return Err(self.reject(&ctx, "registration_rejected", error));
        }

        match self.guard.register(email, password, role, &ctx.meta()).await {
            Ok(session) => Ok((ctx, session)),
            Err(error) => Err(GateRejection {
                error,
                correlation_id: ctx.correlation_id,
            }),
        }
    }
}
