use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use super::dto::{AnswerDto, QuestionDto};
use super::{file_response, page_json, page_request, DEFAULT_PAGE_SIZE};
use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entity::user::Role;
use crate::error::AppError;
use crate::multipart::MultipartForm;
use crate::policy::require_role;
use crate::service::answer::{self as answer_service, AnswerEdit, AnswerForm};
use crate::service::question::{self as question_service, parse_status, QuestionEdit, QuestionFilter, QuestionForm};
use crate::storage::{mime_from_name, FileStore};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/questions")
            .route(web::post().to(create_question))
            .route(web::get().to(search_questions)),
    )
    .service(web::resource("/questions/search").route(web::get().to(search_all_questions)))
    .service(
        web::resource("/questions/{id:\\d+}")
            .route(web::get().to(get_question))
            .route(web::put().to(update_question))
            .route(web::delete().to(delete_question)),
    )
    .service(web::resource("/questions/{id:\\d+}/answers").route(web::get().to(list_answers)))
    .service(web::resource("/questions/{id:\\d+}/answers/read").route(web::put().to(mark_answers_read)))
    .service(web::resource("/questions/{id:\\d+}/attachment").route(web::get().to(question_attachment)))
    .service(web::resource("/my-questions").route(web::get().to(my_questions)))
    .service(web::resource("/answers").route(web::post().to(create_answer)))
    .service(
        web::resource("/answers/{id:\\d+}")
            .route(web::put().to(update_answer))
            .route(web::delete().to(delete_answer)),
    )
    .service(web::resource("/answers/{id:\\d+}/attachment").route(web::get().to(answer_attachment)))
    .service(web::resource("/teacher/unanswered-count").route(web::get().to(teacher_unanswered_count)))
    .service(
        web::resource("/teacher/unanswered-count/{course_id:\\d+}").route(web::get().to(course_unanswered_count)),
    )
    .service(web::resource("/student/answered-count").route(web::get().to(student_answered_count)))
    .service(web::resource("/student/unread-answer-count").route(web::get().to(student_unread_count)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery {
    course_id: Option<i32>,
    teacher_id: Option<i32>,
    keyword: Option<String>,
    status: Option<String>,
    page: Option<u64>,
    size: Option<u64>,
}

#[derive(Deserialize)]
struct MyQuestionsQuery {
    status: Option<String>,
    page: Option<u64>,
    size: Option<u64>,
}

async fn create_question(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    store: web::Data<FileStore>,
    auth: AuthUser,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut form = MultipartForm::read(payload, config.max_upload_bytes).await?;
    let data: QuestionForm = form.json("data")?;
    let attachment = form.take_file("attachment");
    let created = question_service::create(db.get_ref(), store.get_ref(), &auth, data, attachment).await?;
    Ok(HttpResponse::Created().json(QuestionDto::from(created)))
}

/// Questions of one course; `courseId` is mandatory here.
async fn search_questions(
    db: web::Data<DatabaseConnection>,
    _auth: AuthUser,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let course_id = query
        .course_id
        .ok_or_else(|| AppError::param_error("缺少参数 courseId"))?;
    let status = parse_status(query.status.as_deref())?;
    let req = page_request(query.page, query.size, DEFAULT_PAGE_SIZE);
    let page = question_service::search(db.get_ref(), course_id, query.keyword.as_deref(), status, req).await?;
    Ok(page_json::<_, QuestionDto>(page))
}

async fn search_all_questions(
    db: web::Data<DatabaseConnection>,
    _auth: AuthUser,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let filter = QuestionFilter {
        course_id: query.course_id,
        teacher_id: query.teacher_id,
        status: parse_status(query.status.as_deref())?,
        keyword: query.keyword,
    };
    let req = page_request(query.page, query.size, DEFAULT_PAGE_SIZE);
    let page = question_service::search_global(db.get_ref(), filter, req).await?;
    Ok(page_json::<_, QuestionDto>(page))
}

async fn get_question(
    db: web::Data<DatabaseConnection>,
    _auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let question = question_service::find_by_id(db.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(QuestionDto::from(question)))
}

async fn update_question(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
    payload: web::Json<QuestionEdit>,
) -> Result<HttpResponse, AppError> {
    let updated = question_service::update(db.get_ref(), &auth, path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(QuestionDto::from(updated)))
}

async fn delete_question(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    question_service::delete(db.get_ref(), store.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn list_answers(
    db: web::Data<DatabaseConnection>,
    _auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let answers = answer_service::list_by_question(db.get_ref(), path.into_inner()).await?;
    let dtos: Vec<AnswerDto> = answers.into_iter().map(AnswerDto::from).collect();
    Ok(HttpResponse::Ok().json(dtos))
}

async fn mark_answers_read(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let updated = answer_service::mark_read_by_asker(db.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "updated": updated })))
}

async fn question_attachment(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    _auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let (data, file_name) = question_service::attachment(db.get_ref(), store.get_ref(), path.into_inner()).await?;
    Ok(file_response(data, &file_name, &mime_from_name(&file_name)))
}

async fn my_questions(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    query: web::Query<MyQuestionsQuery>,
) -> Result<HttpResponse, AppError> {
    let status = parse_status(query.status.as_deref())?;
    let req = page_request(query.page, query.size, DEFAULT_PAGE_SIZE);
    let page = question_service::list_mine(db.get_ref(), &auth, status, req).await?;
    Ok(page_json::<_, QuestionDto>(page))
}

async fn create_answer(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    store: web::Data<FileStore>,
    auth: AuthUser,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut form = MultipartForm::read(payload, config.max_upload_bytes).await?;
    let data: AnswerForm = form.json("data")?;
    let attachment = form.take_file("attachment");
    let created = answer_service::create(db.get_ref(), store.get_ref(), &auth, data, attachment).await?;
    Ok(HttpResponse::Created().json(AnswerDto::from(created)))
}

async fn update_answer(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
    payload: web::Json<AnswerEdit>,
) -> Result<HttpResponse, AppError> {
    let updated = answer_service::update(db.get_ref(), &auth, path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(AnswerDto::from(updated)))
}

async fn delete_answer(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    answer_service::delete(db.get_ref(), store.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn answer_attachment(
    db: web::Data<DatabaseConnection>,
    store: web::Data<FileStore>,
    _auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let (data, file_name) = answer_service::attachment(db.get_ref(), store.get_ref(), path.into_inner()).await?;
    Ok(file_response(data, &file_name, &mime_from_name(&file_name)))
}

async fn teacher_unanswered_count(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    require_role(&auth, Role::Teacher, "只有教师可以查看")?;
    let count = question_service::count_unanswered_for_teacher(db.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(count))
}

async fn course_unanswered_count(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    require_role(&auth, Role::Teacher, "只有教师可以查看")?;
    let count = question_service::count_unanswered_in_course(db.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(count))
}

async fn student_answered_count(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    require_role(&auth, Role::Student, "只有学生可以查看")?;
    let count = question_service::count_answered_by_asker(db.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(count))
}

async fn student_unread_count(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
) -> Result<HttpResponse, AppError> {
    require_role(&auth, Role::Student, "只有学生可以查看")?;
    let count = answer_service::count_unread_for_asker(db.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(count))
}
