use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;

use super::dto::CourseDto;
use crate::auth::AuthUser;
use crate::entity::user::Role;
use crate::error::AppError;
use crate::policy::require_role;
use crate::service::course::{self as course_service, CourseForm};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list))
            .route(web::post().to(create)),
    )
    .service(web::resource("/mine").route(web::get().to(mine)))
    .service(
        web::resource("/{id:\\d+}")
            .route(web::get().to(get))
            .route(web::put().to(update))
            .route(web::delete().to(remove)),
    );
}

async fn list(db: web::Data<DatabaseConnection>, _auth: AuthUser) -> Result<HttpResponse, AppError> {
    let courses = course_service::list(db.get_ref()).await?;
    let dtos: Vec<CourseDto> = courses.into_iter().map(CourseDto::from).collect();
    Ok(HttpResponse::Ok().json(dtos))
}

async fn create(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    payload: web::Json<CourseForm>,
) -> Result<HttpResponse, AppError> {
    let created = course_service::create(db.get_ref(), &auth, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(CourseDto::from(created)))
}

async fn mine(db: web::Data<DatabaseConnection>, auth: AuthUser) -> Result<HttpResponse, AppError> {
    require_role(&auth, Role::Teacher, "只有教师拥有课程")?;
    let courses = course_service::list_owned(db.get_ref(), &auth).await?;
    let dtos: Vec<CourseDto> = courses.into_iter().map(CourseDto::from).collect();
    Ok(HttpResponse::Ok().json(dtos))
}

async fn get(
    db: web::Data<DatabaseConnection>,
    _auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let course = course_service::find_by_id(db.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(CourseDto::from(course)))
}

async fn update(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
    payload: web::Json<CourseForm>,
) -> Result<HttpResponse, AppError> {
    let updated = course_service::update(db.get_ref(), &auth, path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(CourseDto::from(updated)))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    course_service::delete(db.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
