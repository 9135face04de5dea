use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use super::dto::UserDto;
use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::multipart::MultipartForm;
use crate::service::question as question_service;
use crate::service::resource as resource_service;
use crate::service::user::{self as user_service, ProfilePatch};
use crate::storage::{is_image, mime_from_name, FileStore};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(get_profile))
            .route(web::put().to(update_profile)),
    )
    .service(web::resource("/password").route(web::put().to(update_password)))
    .service(web::resource("/stats").route(web::get().to(stats)))
    .service(web::resource("/avatar").route(web::post().to(upload_avatar)))
    .service(web::resource("/avatar/{filename:.+}").route(web::get().to(get_avatar)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest {
    old_password: Option<String>,
    new_password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    question_count: u64,
    answered_count: u64,
    download_count: i64,
}

#[derive(Serialize)]
struct AvatarResponse {
    avatar: String,
    message: &'static str,
}

async fn get_profile(db: web::Data<DatabaseConnection>, auth: AuthUser) -> Result<HttpResponse, AppError> {
    let user = user_service::find_by_id(db.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(UserDto::from(user)))
}

async fn update_profile(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<ProfilePatch>,
) -> Result<HttpResponse, AppError> {
    let updated = user_service::update_profile(db.get_ref(), &auth.username, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserDto::from(updated)))
}

async fn update_password(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    auth: AuthUser,
    payload: web::Json<PasswordRequest>,
) -> Result<HttpResponse, AppError> {
    user_service::update_password(
        db.get_ref(),
        config.get_ref(),
        &auth.username,
        payload.old_password.as_deref(),
        payload.new_password.as_deref(),
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn stats(db: web::Data<DatabaseConnection>, auth: AuthUser) -> Result<HttpResponse, AppError> {
    let question_count = question_service::count_by_asker(db.get_ref(), auth.user_id).await?;
    let answered_count = question_service::count_answered_by_asker(db.get_ref(), auth.user_id).await?;
    let download_count = resource_service::sum_download_count_by_uploader(db.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(StatsResponse {
        question_count,
        answered_count,
        download_count,
    }))
}

async fn upload_avatar(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    store: web::Data<FileStore>,
    auth: AuthUser,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut form = MultipartForm::read(payload, config.max_upload_bytes).await?;
    let file = form
        .take_file("file")
        .ok_or_else(|| AppError::param_error("请选择头像文件"))?;
    if !is_image(&file) {
        return Err(AppError::param_error("只允许上传图片文件"));
    }

    let avatar = store.save_avatar(&file).await?;
    let patch = ProfilePatch {
        avatar: Some(avatar.clone()),
        ..Default::default()
    };
    user_service::update_profile(db.get_ref(), &auth.username, patch).await?;
    Ok(HttpResponse::Ok().json(AvatarResponse {
        avatar,
        message: "头像上传成功",
    }))
}

async fn get_avatar(
    store: web::Data<FileStore>,
    _auth: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let file_name = path.into_inner();
    let data = store.read_avatar(&file_name).await?;
    let clean = file_name.split('?').next().unwrap_or_default();
    Ok(HttpResponse::Ok()
        .content_type(mime_from_name(clean))
        .insert_header((header::CACHE_CONTROL, "public, max-age=3600"))
        .body(data))
}
