use log::info;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::entity::user::Role;
use crate::entity::{course, question, resource};
use crate::error::AppError;
use crate::policy::{ensure, may_create_course, may_edit_course};
use crate::validate::Validator;

/// Body of both course creation and course update.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseForm {
    pub name: Option<String>,
    pub description: Option<String>,
    pub college: Option<String>,
}

impl CourseForm {
    fn validate(&self) -> Result<(), AppError> {
        Validator::new()
            .not_blank("name", self.name.as_deref())
            .max_len("name", self.name.as_deref(), 255)
            .max_len("description", self.description.as_deref(), 2000)
            .max_len("college", self.college.as_deref(), 255)
            .finish()
    }
}

/// The calling teacher becomes the owner.
pub async fn create(db: &DatabaseConnection, caller: &AuthUser, form: CourseForm) -> Result<course::Model, AppError> {
    ensure(may_create_course(caller), caller, "只有教师可以创建课程")?;
    form.validate()?;

    let model = course::ActiveModel {
        name: Set(form.name.unwrap_or_default().trim().to_string()),
        description: Set(form.description),
        college: Set(form.college),
        teacher_id: Set(caller.user_id),
        ..Default::default()
    };
    let created = model.insert(db).await?;
    info!("teacher {} created course {} id={}", caller.username, created.name, created.id);
    Ok(created)
}

/// Replaces name, description and college. The owner is checked against the
/// currently stored `teacher_id`.
pub async fn update(
    db: &DatabaseConnection,
    caller: &AuthUser,
    id: i32,
    form: CourseForm,
) -> Result<course::Model, AppError> {
    ensure(
        caller.is_admin() || caller.has_role(Role::Teacher),
        caller,
        "只有管理员或教师可以修改课程",
    )?;
    let existing = find_by_id(db, id).await?;
    ensure(may_edit_course(caller, &existing), caller, "只能修改自己的课程")?;
    form.validate()?;

    let mut active = existing.into_active_model();
    active.name = Set(form.name.unwrap_or_default().trim().to_string());
    active.description = Set(form.description);
    active.college = Set(form.college);
    Ok(active.update(db).await?)
}

pub async fn list(db: &DatabaseConnection) -> Result<Vec<course::Model>, AppError> {
    Ok(course::Entity::find().order_by_asc(course::Column::Id).all(db).await?)
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i32) -> Result<course::Model, AppError> {
    course::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("课程不存在: {}", id)))
}

/// Ids of the courses currently owned by `teacher_id`, read fresh every call.
pub async fn taught_course_ids<C: ConnectionTrait>(db: &C, teacher_id: i32) -> Result<Vec<i32>, AppError> {
    Ok(course::Entity::find()
        .filter(course::Column::TeacherId.eq(teacher_id))
        .select_only()
        .column(course::Column::Id)
        .into_tuple::<i32>()
        .all(db)
        .await?)
}

pub async fn list_owned(db: &DatabaseConnection, caller: &AuthUser) -> Result<Vec<course::Model>, AppError> {
    Ok(course::Entity::find()
        .filter(course::Column::TeacherId.eq(caller.user_id))
        .order_by_asc(course::Column::Id)
        .all(db)
        .await?)
}

/// Refuses while any question or resource still points at the course.
pub async fn delete(db: &DatabaseConnection, caller: &AuthUser, id: i32) -> Result<(), AppError> {
    ensure(caller.is_admin(), caller, "需要管理员权限")?;
    let existing = find_by_id(db, id).await?;

    let questions = question::Entity::find()
        .filter(question::Column::CourseId.eq(id))
        .count(db)
        .await?;
    let resources = resource::Entity::find()
        .filter(resource::Column::CourseId.eq(id))
        .count(db)
        .await?;
    if questions > 0 || resources > 0 {
        return Err(AppError::conflict(format!(
            "课程 {} 仍有 {} 个问题和 {} 个资源，不能删除",
            id, questions, resources
        )));
    }

    course::Entity::delete_by_id(id).exec(db).await?;
    info!("admin {} deleted course {} id={}", caller.username, existing.name, id);
    Ok(())
}
