//! Moderation and account management. Every handler takes [`AdminUser`], so
//! non-admin callers are rejected before any handler code runs.

use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use super::dto::{AnswerDto, CourseDto, QuestionDto, ResourceDto, UserDto};
use super::{page_json, page_request, ADMIN_PAGE_SIZE};
use crate::auth::AdminUser;
use crate::config::AppConfig;
use crate::entity::user::Role;
use crate::error::AppError;
use crate::service::answer::{self as answer_service, AnswerEdit};
use crate::service::question::{self as question_service, parse_status, QuestionEdit};
use crate::service::resource::{self as resource_service, ResourceEdit};
use crate::service::user::{self as user_service, AdminUserPatch, NewTeacher, ProfilePatch};
use crate::storage::FileStore;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/teachers")
            .route(web::get().to(list_teachers))
            .route(web::post().to(create_teacher)),
    )
    .service(web::resource("/teachers/assign-course").route(web::post().to(assign_course)))
    .service(
        web::resource("/teachers/{id:\\d+}")
            .route(web::put().to(update_teacher))
            .route(web::delete().to(delete_teacher)),
    )
    .service(web::resource("/users").route(web::get().to(list_users)))
    .service(web::resource("/users/{id:\\d+}").route(web::put().to(update_user)))
    .service(web::resource("/questions").route(web::get().to(list_questions)))
    .service(
        web::resource("/questions/{id:\\d+}")
            .route(web::put().to(update_question))
            .route(web::delete().to(delete_question)),
    )
    .service(web::resource("/answers").route(web::get().to(list_answers)))
    .service(
        web::resource("/answers/{id:\\d+}")
            .route(web::put().to(update_answer))
            .route(web::delete().to(delete_answer)),
    )
    .service(web::resource("/resources").route(web::get().to(list_resources)))
    .service(
        web::resource("/resources/{id:\\d+}")
            .route(web::put().to(update_resource))
            .route(web::delete().to(delete_resource)),
    );
}

#[derive(Deserialize)]
struct ListQuery {
    page: Option<u64>,
    size: Option<u64>,
    keyword: Option<String>,
    status: Option<String>,
    role: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignCourseRequest {
    course_id: Option<i32>,
    teacher_id: Option<i32>,
}

async fn list_teachers(
    db: web::Data<DatabaseConnection>,
    _admin: AdminUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let req = page_request(query.page, query.size, ADMIN_PAGE_SIZE);
    let page = user_service::list_teachers(db.get_ref(), req).await?;
    Ok(page_json::<_, UserDto>(page))
}

async fn create_teacher(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    AdminUser(admin): AdminUser,
    payload: web::Json<NewTeacher>,
) -> Result<HttpResponse, AppError> {
    let created = user_service::create_teacher(db.get_ref(), config.get_ref(), &admin, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(UserDto::from(created)))
}

async fn update_teacher(
    db: web::Data<DatabaseConnection>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
    payload: web::Json<ProfilePatch>,
) -> Result<HttpResponse, AppError> {
    let updated =
        user_service::update_teacher_profile(db.get_ref(), &admin, path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserDto::from(updated)))
}

async fn delete_teacher(
    db: web::Data<DatabaseConnection>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    user_service::delete_teacher(db.get_ref(), &admin, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn assign_course(
    db: web::Data<DatabaseConnection>,
    AdminUser(admin): AdminUser,
    payload: web::Json<AssignCourseRequest>,
) -> Result<HttpResponse, AppError> {
    let course =
        user_service::assign_course_to_teacher(db.get_ref(), &admin, payload.course_id, payload.teacher_id).await?;
    Ok(HttpResponse::Ok().json(CourseDto::from(course)))
}

async fn list_users(
    db: web::Data<DatabaseConnection>,
    _admin: AdminUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let role = match query.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => Some(Role::parse(raw).ok_or_else(|| AppError::param_error(format!("未知角色: {}", raw)))?),
        None => None,
    };
    let req = page_request(query.page, query.size, ADMIN_PAGE_SIZE);
    let page = user_service::list_users(db.get_ref(), role, query.keyword.as_deref(), req).await?;
    Ok(page_json::<_, UserDto>(page))
}

async fn update_user(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
    payload: web::Json<AdminUserPatch>,
) -> Result<HttpResponse, AppError> {
    let updated = user_service::admin_update_user(
        db.get_ref(),
        config.get_ref(),
        &admin,
        path.into_inner(),
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(UserDto::from(updated)))
}

async fn list_questions(
    db: web::Data<DatabaseConnection>,
    _admin: AdminUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let status = parse_status(query.status.as_deref())?;
    let req = page_request(query.page, query.size, ADMIN_PAGE_SIZE);
    let page = question_service::list_all(db.get_ref(), query.keyword.as_deref(), status, req).await?;
    Ok(page_json::<_, QuestionDto>(page))
}

async fn update_question(
    db: web::Data<DatabaseConnection>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
    payload: web::Json<QuestionEdit>,
) -> Result<HttpResponse, AppError> {
    let updated = question_service::update(db.get_ref(), &admin, path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(QuestionDto::from(updated)))
}

async fn delete_question(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    question_service::delete(db.get_ref(), store.get_ref(), &admin, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn list_answers(
    db: web::Data<DatabaseConnection>,
    _admin: AdminUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let req = page_request(query.page, query.size, ADMIN_PAGE_SIZE);
    let page = answer_service::list_all(db.get_ref(), query.keyword.as_deref(), req).await?;
    Ok(page_json::<_, AnswerDto>(page))
}

async fn update_answer(
    db: web::Data<DatabaseConnection>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
    payload: web::Json<AnswerEdit>,
) -> Result<HttpResponse, AppError> {
    let updated = answer_service::update(db.get_ref(), &admin, path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(AnswerDto::from(updated)))
}

async fn delete_answer(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    answer_service::delete(db.get_ref(), store.get_ref(), &admin, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn list_resources(
    db: web::Data<DatabaseConnection>,
    _admin: AdminUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let req = page_request(query.page, query.size, ADMIN_PAGE_SIZE);
    let page = resource_service::list_all(db.get_ref(), query.keyword.as_deref(), req).await?;
    Ok(page_json::<_, ResourceDto>(page))
}

async fn update_resource(
    db: web::Data<DatabaseConnection>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
    payload: web::Json<ResourceEdit>,
) -> Result<HttpResponse, AppError> {
    let updated = resource_service::update(db.get_ref(), &admin, path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ResourceDto::from(updated)))
}

async fn delete_resource(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    AdminUser(admin): AdminUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    resource_service::delete(db.get_ref(), store.get_ref(), &admin, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
