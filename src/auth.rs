use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, PasswordStorage};
use crate::entity::user::{self, Role};
use crate::error::AppError;
use crate::service::user as user_service;

/// The caller of a request, re-derived from the database on every request.
///
/// Only the token's subject is trusted; the role comes from the stored user so
/// that role changes apply on the next request even while older tokens still
/// carry the previous `ROLE_*` claim.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i32,
    pub username: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

impl From<&user::Model> for AuthUser {
    fn from(model: &user::Model) -> Self {
        Self {
            user_id: model.id,
            username: model.username.clone(),
            role: model.role,
        }
    }
}

/// An authenticated caller holding `ROLE_ADMIN`.
#[derive(Clone, Debug)]
pub struct AdminUser(pub AuthUser);

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: usize,
    pub exp: usize,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db = match req.app_data::<web::Data<DatabaseConnection>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception("database not configured").into()) });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception("config not registered").into()) });
            }
        };
        let token = extract_token(req);

        Box::pin(async move {
            let token = token.ok_or_else(AppError::need_login)?;
            let auth = authenticate_token(&db, &config, &token).await?;
            Ok(auth)
        })
    }
}

impl FromRequest for AdminUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let auth = AuthUser::from_request(req, payload);
        Box::pin(async move {
            let auth = auth.await?;
            if !auth.is_admin() {
                warn!("user {} denied admin route", auth.username);
                return Err(AppError::forbidden("需要管理员权限").into());
            }
            Ok(AdminUser(auth))
        })
    }
}

fn extract_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) async fn authenticate_token(
    db: &DatabaseConnection,
    config: &AppConfig,
    token: &str,
) -> Result<AuthUser, AppError> {
    let claims = decode_jwt(config, token)?;
    let user = match user_service::load_by_username(db, &claims.sub).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => return Err(AppError::need_login()),
        Err(e) => return Err(e),
    };
    if user.role.authority() != claims.role {
        debug!(
            "token role {} for {} is stale, using stored role {}",
            claims.role,
            user.username,
            user.role.authority()
        );
    }
    Ok(AuthUser::from(&user))
}

pub fn issue_token(config: &AppConfig, user: &user::Model) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.username.clone(),
        role: user.role.authority(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(config.jwt_ttl_hours)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::system_exception(format!("token encode failed: {}", e)))
}

pub fn decode_jwt(config: &AppConfig, token: &str) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            debug!("rejecting token: {}", e);
            AppError::need_login()
        })
}

pub fn hash_password(config: &AppConfig, raw: &str) -> Result<String, AppError> {
    match config.password_storage {
        PasswordStorage::Plaintext => Ok(raw.to_string()),
        PasswordStorage::Bcrypt => bcrypt::hash(raw, config.bcrypt_cost)
            .map_err(|e| AppError::system_exception(format!("password hash failed: {}", e))),
    }
}

pub fn verify_password(config: &AppConfig, raw: &str, stored: &str) -> bool {
    match config.password_storage {
        PasswordStorage::Plaintext => raw == stored,
        // a stored value that is not a bcrypt hash never matches
        PasswordStorage::Bcrypt => bcrypt::verify(raw, stored).unwrap_or(false),
    }
}
