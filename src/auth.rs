use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    dispatch::{self, DashboardState, Page},
    error::AppError,
    models::Role,
    repository::RepositoryState,
    roles::{self, ResolvedRoles},
    session::SessionEvents,
};

/// Header accepted in `Env::Local` in place of a bearer token.
pub const LOCAL_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// The subset of the identity provider's JWT payload this service reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the identity's UUID, also the primary key of `profiles`.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    /// Audience (aud): `authenticated` for signed-in users.
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Identity
///
/// The authenticated-user handle of one request. The provider owns it; this
/// service only reads it from the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    /// Issue time (unix seconds) of the presented token, checked against sign-outs.
    pub issued_at: i64,
}

/// Extracts the raw bearer token, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Identity Extractor Implementation
///
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing
///    profile is accepted.
/// 2. Token validation: bearer JWT decoded with the provider's secret and audience.
/// 3. Revocation: tokens issued before the identity's last sign-out are refused.
///
/// Rejection: `AppError::InvalidSession` (401), or `LookupFailure` (503) when the
/// bypass lookup cannot reach storage.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
    SessionEvents: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let sessions = SessionEvents::from_ref(state);

        if config.env == Env::Local
            && let Some(identity) = local_bypass(parts, state).await?
        {
            return Ok(identity);
        }

        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::InvalidSession("missing bearer token".to_string()))?;

        let claims = decode_claims(token, &config)?;
        let identity = Identity {
            id: claims.sub,
            email: claims.email,
            issued_at: claims.iat as i64,
        };

        if sessions.is_revoked(identity.id, identity.issued_at).await {
            return Err(AppError::InvalidSession("session has been signed out".to_string()));
        }

        Ok(identity)
    }
}

/// Validates a provider-issued token: signature, expiry and audience.
pub fn decode_claims(token: &str, config: &AppConfig) -> Result<Claims, AppError> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.set_audience(&[config.jwt_audience.as_str()]);

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::InvalidSession("token expired".to_string()),
            _ => AppError::InvalidSession("token rejected".to_string()),
        })
}

async fn local_bypass<S>(parts: &Parts, state: &S) -> Result<Option<Identity>, AppError>
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
{
    let Some(user_id) = parts
        .headers
        .get(LOCAL_USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
    else {
        return Ok(None);
    };

    let repo = RepositoryState::from_ref(state);
    Ok(repo.get_profile(user_id).await?.map(|profile| Identity {
        id: profile.id,
        email: Some(profile.email),
        // No token behind a bypass session, so nothing to revoke.
        issued_at: i64::MAX,
    }))
}

/// SessionContext
///
/// Identity plus its freshly resolved roles, built once per request and passed
/// explicitly into every page handler.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub identity: Identity,
    pub access: ResolvedRoles,
}

impl SessionContext {
    pub fn state(&self) -> DashboardState {
        DashboardState::resolved(&self.access)
    }

    /// The primary role, or `NoAccess` when none is held.
    pub fn primary_role(&self) -> Result<Role, AppError> {
        self.access.primary_role.ok_or(AppError::NoAccess)
    }

    pub fn can_manage(&self, page: Page) -> bool {
        self.access
            .primary_role
            .is_some_and(|role| dispatch::can_manage(role, page))
    }

    /// Gate for create/post/mark actions on `page`.
    pub fn require_manage(&self, page: Page) -> Result<Role, AppError> {
        let role = self.primary_role()?;
        if dispatch::can_manage(role, page) {
            Ok(role)
        } else {
            Err(AppError::Forbidden(format!(
                "{role} accounts cannot manage {}",
                page.as_str()
            )))
        }
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
    SessionEvents: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        let repo = RepositoryState::from_ref(state);
        let access = roles::resolve(repo.as_ref(), &identity).await?;
        Ok(SessionContext { identity, access })
    }
}
