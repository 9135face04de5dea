use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use super::dto::ResourceDto;
use super::{file_response, page_json, page_request, DEFAULT_PAGE_SIZE};
use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::multipart::MultipartForm;
use crate::service::resource::{self as resource_service, ResourceEdit, ResourceForm};
use crate::storage::FileStore;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/upload").route(web::post().to(upload)))
        .service(web::resource("").route(web::get().to(search)))
        .service(web::resource("/download/{id:\\d+}").route(web::get().to(download)))
        .service(web::resource("/my-uploads").route(web::get().to(my_uploads)))
        .service(
            web::resource("/{id:\\d+}")
                .route(web::put().to(update))
                .route(web::delete().to(remove)),
        );
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    course_id: Option<i32>,
    keyword: Option<String>,
    page: Option<u64>,
    size: Option<u64>,
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u64>,
    size: Option<u64>,
}

/// `file` carries the bytes, `data` the JSON metadata.
async fn upload(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    store: web::Data<FileStore>,
    auth: AuthUser,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut form = MultipartForm::read(payload, config.max_upload_bytes).await?;
    let data: ResourceForm = form.json("data")?;
    let file = form.take_file_allow_empty("file");
    let created = resource_service::upload(db.get_ref(), store.get_ref(), &auth, data, file).await?;
    Ok(HttpResponse::Created().json(ResourceDto::from(created)))
}

async fn search(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let course_id = query
        .course_id
        .ok_or_else(|| AppError::param_error("缺少参数 courseId"))?;
    let req = page_request(query.page, query.size, DEFAULT_PAGE_SIZE);
    let page = resource_service::search(db.get_ref(), &auth, course_id, query.keyword.as_deref(), req).await?;
    Ok(page_json::<_, ResourceDto>(page))
}

async fn download(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let file = resource_service::download(db.get_ref(), store.get_ref(), &auth, path.into_inner()).await?;
    Ok(file_response(file.data, &file.file_name, &file.mime_type))
}

async fn my_uploads(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let req = page_request(query.page, query.size, DEFAULT_PAGE_SIZE);
    let page = resource_service::list_mine(db.get_ref(), &auth, req).await?;
    Ok(page_json::<_, ResourceDto>(page))
}

async fn update(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
    payload: web::Json<ResourceEdit>,
) -> Result<HttpResponse, AppError> {
    let updated = resource_service::update(db.get_ref(), &auth, path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ResourceDto::from(updated)))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    resource_service::delete(db.get_ref(), store.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
