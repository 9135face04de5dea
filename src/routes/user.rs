use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use super::dto::UserDto;
use super::{page_json, page_request};
use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::service::user as user_service;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/register").route(web::post().to(register)))
        .service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/teachers").route(web::get().to(teachers)));
}

#[derive(Deserialize)]
struct CredentialsRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    username: String,
    role: String,
    user_id: i32,
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u64>,
    size: Option<u64>,
}

async fn register(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    payload: web::Json<CredentialsRequest>,
) -> Result<HttpResponse, AppError> {
    let created = user_service::register(
        db.get_ref(),
        config.get_ref(),
        payload.username.as_deref(),
        payload.password.as_deref(),
    )
    .await?;
    Ok(HttpResponse::Created().json(UserDto::from(created)))
}

async fn login(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    payload: web::Json<CredentialsRequest>,
) -> Result<HttpResponse, AppError> {
    let (Some(username), Some(password)) = (payload.username.as_deref(), payload.password.as_deref()) else {
        return Err(AppError::bad_credentials());
    };
    let (token, user) = user_service::authenticate(db.get_ref(), config.get_ref(), username, password).await?;
    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        username: user.username,
        role: user.role.as_str().to_string(),
        user_id: user.id,
    }))
}

/// Teacher directory for course pickers.
async fn teachers(
    db: web::Data<DatabaseConnection>,
    _auth: AuthUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let req = page_request(query.page, query.size, 1000);
    let page = user_service::list_teachers(db.get_ref(), req).await?;
    Ok(page_json::<_, UserDto>(page))
}
