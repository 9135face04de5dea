use chrono::Utc;
use log::{info, warn};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Select, Set,
};
use serde::Deserialize;

use super::{course as course_service, exec_sql, fetch_page, PageRequest};
use crate::auth::AuthUser;
use crate::entity::resource::{self, Visibility};
use crate::entity::user::Role;
use crate::error::AppError;
use crate::policy::{effective_visibility, ensure, may_modify_resource, may_upload_to, visible_scopes};
use crate::response::Page;
use crate::storage::{detect_mime, FileStore, Upload};
use crate::validate::Validator;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub course_id: Option<i32>,
    pub visibility: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEdit {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// A stored file ready to be streamed back.
#[derive(Debug)]
pub struct Download {
    pub data: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

fn validate_text(title: Option<&str>, description: Option<&str>) -> Result<(), AppError> {
    Validator::new()
        .not_blank("title", title)
        .max_len("title", title, 255)
        .max_len("description", description, 2000)
        .finish()
}

fn parse_visibility(raw: Option<&str>) -> Result<Option<Visibility>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Visibility::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::param_error(format!("未知的可见性: {}", s))),
    }
}

fn newest_first(select: Select<resource::Entity>) -> Select<resource::Entity> {
    select
        .order_by_desc(resource::Column::UploadTime)
        .order_by_desc(resource::Column::Id)
}

fn keyword_condition(keyword: &str) -> Condition {
    Condition::any()
        .add(resource::Column::Title.contains(keyword))
        .add(resource::Column::Description.contains(keyword))
}

/// Stores the file under a generated name. CLASS_ONLY survives only for teachers.
pub async fn upload(
    db: &DatabaseConnection,
    store: &FileStore,
    caller: &AuthUser,
    form: ResourceForm,
    file: Option<Upload>,
) -> Result<resource::Model, AppError> {
    let file = file.filter(|f| !f.is_empty());
    let (Some(file), Some(course_id)) = (file, form.course_id) else {
        return Err(AppError::param_error("文件或课程信息缺失"));
    };
    validate_text(form.title.as_deref(), form.description.as_deref())?;
    let requested = parse_visibility(form.visibility.as_deref())?;
    let course = match course_service::find_by_id(db, course_id).await {
        Ok(course) => course,
        Err(AppError::NotFound(msg)) => return Err(AppError::param_error(msg)),
        Err(e) => return Err(e),
    };
    ensure(
        may_upload_to(caller, &course),
        caller,
        "无权限：您不是该课程的授课教师，不能为该课程上传资源",
    )?;
    let visibility = effective_visibility(caller, requested);
    if requested.is_some_and(|v| v != visibility) {
        warn!("{} requested {:?} for course {}, stored as ALL", caller.username, requested, course_id);
    }

    let mime_type = detect_mime(&file);
    let stored = store.save(&file).await?;
    let model = resource::ActiveModel {
        title: Set(form.title.unwrap_or_default().trim().to_string()),
        description: Set(form.description),
        course_id: Set(course.id),
        uploader_id: Set(caller.user_id),
        upload_time: Set(Utc::now()),
        file_path: Set(stored.clone()),
        file_name: Set(file.file_name),
        file_mime_type: Set(Some(mime_type)),
        download_count: Set(0),
        visibility: Set(visibility),
        ..Default::default()
    };
    match model.insert(db).await {
        Ok(created) => {
            info!(
                "{} uploaded resource {} to course {} ({:?})",
                caller.username, created.id, course_id, created.visibility
            );
            Ok(created)
        }
        Err(e) => {
            store.remove(&stored).await;
            Err(e.into())
        }
    }
}

pub async fn find_by_id(db: &DatabaseConnection, id: i32) -> Result<resource::Model, AppError> {
    resource::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("资源不存在: {}", id)))
}

async fn scopes_for(db: &DatabaseConnection, caller: &AuthUser, course_id: i32) -> Result<Vec<Visibility>, AppError> {
    let taught = if caller.has_role(Role::Teacher) {
        course_service::taught_course_ids(db, caller.user_id).await?
    } else {
        Vec::new()
    };
    Ok(visible_scopes(caller, &taught, course_id))
}

/// Resources of one course the viewer is allowed to see.
pub async fn search(
    db: &DatabaseConnection,
    caller: &AuthUser,
    course_id: i32,
    keyword: Option<&str>,
    req: PageRequest,
) -> Result<Page<resource::Model>, AppError> {
    let scopes = scopes_for(db, caller, course_id).await?;
    let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());
    let select = resource::Entity::find()
        .filter(resource::Column::CourseId.eq(course_id))
        .filter(resource::Column::Visibility.is_in(scopes))
        .apply_if(keyword, |q, kw| q.filter(keyword_condition(kw)));
    fetch_page(db, newest_first(select), req).await
}

/// Reads the stored file, then bumps the counter with one atomic statement,
/// so only downloads that actually produced bytes are counted.
pub async fn download(
    db: &DatabaseConnection,
    store: &FileStore,
    caller: &AuthUser,
    id: i32,
) -> Result<Download, AppError> {
    let resource = find_by_id(db, id).await?;
    let scopes = scopes_for(db, caller, resource.course_id).await?;
    ensure(scopes.contains(&resource.visibility), caller, "无权限下载该资源")?;

    let data = store.read(&resource.file_path).await?;
    exec_sql(
        db,
        "UPDATE t_resource SET download_count = download_count + 1 WHERE id = ?",
        vec![id.into()],
    )
    .await?;

    Ok(Download {
        data,
        file_name: resource.file_name,
        mime_type: resource
            .file_mime_type
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    })
}

pub async fn update(
    db: &DatabaseConnection,
    caller: &AuthUser,
    id: i32,
    edit: ResourceEdit,
) -> Result<resource::Model, AppError> {
    let existing = find_by_id(db, id).await?;
    ensure(may_modify_resource(caller, &existing), caller, "只能修改自己上传的资源")?;
    validate_text(edit.title.as_deref(), edit.description.as_deref())?;

    let mut active = existing.into_active_model();
    active.title = Set(edit.title.unwrap_or_default().trim().to_string());
    if let Some(description) = edit.description {
        active.description = Set(Some(description));
    }
    Ok(active.update(db).await?)
}

pub async fn delete(db: &DatabaseConnection, store: &FileStore, caller: &AuthUser, id: i32) -> Result<(), AppError> {
    let existing = find_by_id(db, id).await?;
    ensure(may_modify_resource(caller, &existing), caller, "只能删除自己上传的资源")?;

    resource::Entity::delete_by_id(id).exec(db).await?;
    store.remove(&existing.file_path).await;
    info!("{} deleted resource {}", caller.username, id);
    Ok(())
}

pub async fn list_mine(
    db: &DatabaseConnection,
    caller: &AuthUser,
    req: PageRequest,
) -> Result<Page<resource::Model>, AppError> {
    let select = resource::Entity::find().filter(resource::Column::UploaderId.eq(caller.user_id));
    fetch_page(db, newest_first(select), req).await
}

/// Platform-wide listing for moderation, every visibility included.
pub async fn list_all(
    db: &DatabaseConnection,
    keyword: Option<&str>,
    req: PageRequest,
) -> Result<Page<resource::Model>, AppError> {
    let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());
    let select = resource::Entity::find().apply_if(keyword, |q, kw| q.filter(keyword_condition(kw)));
    fetch_page(db, newest_first(select), req).await
}

/// Total downloads of everything `uploader_id` has uploaded.
pub async fn sum_download_count_by_uploader(db: &DatabaseConnection, uploader_id: i32) -> Result<i64, AppError> {
    let counts: Vec<i32> = resource::Entity::find()
        .filter(resource::Column::UploaderId.eq(uploader_id))
        .select_only()
        .column(resource::Column::DownloadCount)
        .into_tuple()
        .all(db)
        .await?;
    Ok(counts.into_iter().map(i64::from).sum())
}
