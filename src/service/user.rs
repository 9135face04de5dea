use chrono::Utc;
use log::{info, warn};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, QueryTrait, Set, SqlErr,
};
use serde::Deserialize;

use super::{fetch_page, PageRequest};
use crate::auth::{self, AuthUser};
use crate::config::AppConfig;
use crate::entity::course;
use crate::entity::user::{self, Role};
use crate::error::AppError;
use crate::policy::require_role;
use crate::response::Page;
use crate::validate::Validator;

/// Self-service profile changes. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub title: Option<String>,
    pub introduction: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub username: Option<String>,
    pub password: Option<String>,
    pub title: Option<String>,
    pub introduction: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserPatch {
    pub role: Option<String>,
    pub password: Option<String>,
    pub title: Option<String>,
    pub introduction: Option<String>,
}

pub async fn load_by_username(db: &DatabaseConnection, username: &str) -> Result<user::Model, AppError> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("用户不存在: {}", username)))
}

pub async fn find_by_id(db: &DatabaseConnection, id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found("用户不存在"))
}

async fn username_taken(db: &DatabaseConnection, username: &str) -> Result<bool, AppError> {
    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .select_only()
        .column(user::Column::Id)
        .into_tuple::<i32>()
        .one(db)
        .await?;
    Ok(existing.is_some())
}

fn conflict_on_unique(err: DbErr, username: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::conflict(format!("用户名已存在: {}", username)),
        _ => AppError::Db(err),
    }
}

async fn insert_user(
    db: &DatabaseConnection,
    config: &AppConfig,
    username: &str,
    password: &str,
    role: Role,
    extra: ProfilePatch,
) -> Result<user::Model, AppError> {
    if username_taken(db, username).await? {
        return Err(AppError::conflict(format!("用户名已存在: {}", username)));
    }
    let model = user::ActiveModel {
        username: Set(username.to_string()),
        password: Set(auth::hash_password(config, password)?),
        role: Set(role),
        title: Set(extra.title),
        introduction: Set(extra.introduction),
        email: Set(extra.email),
        avatar: Set(extra.avatar),
        created: Set(Some(Utc::now())),
        ..Default::default()
    };
    // a concurrent insert can still slip past the lookup above
    model.insert(db).await.map_err(|e| conflict_on_unique(e, username))
}

/// Self-registration always creates a student.
pub async fn register(
    db: &DatabaseConnection,
    config: &AppConfig,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<user::Model, AppError> {
    Validator::new()
        .not_blank("username", username)
        .max_len("username", username, 255)
        .not_blank("password", password)
        .finish()?;
    let username = username.unwrap_or_default().trim();
    let password = password.unwrap_or_default();

    let created = insert_user(db, config, username, password, Role::Student, ProfilePatch::default()).await?;
    info!("registered student {} id={}", created.username, created.id);
    Ok(created)
}

/// Checks the credentials and issues a bearer token for the stored role.
pub async fn authenticate(
    db: &DatabaseConnection,
    config: &AppConfig,
    username: &str,
    password: &str,
) -> Result<(String, user::Model), AppError> {
    let user = match load_by_username(db, username.trim()).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => return Err(AppError::bad_credentials()),
        Err(e) => return Err(e),
    };
    if !auth::verify_password(config, password, &user.password) {
        warn!("failed login for {}", user.username);
        return Err(AppError::bad_credentials());
    }
    let token = auth::issue_token(config, &user)?;
    Ok((token, user))
}

pub async fn update_password(
    db: &DatabaseConnection,
    config: &AppConfig,
    username: &str,
    old_password: Option<&str>,
    new_password: Option<&str>,
) -> Result<user::Model, AppError> {
    Validator::new()
        .not_blank("oldPassword", old_password)
        .not_blank("newPassword", new_password)
        .min_len("newPassword", new_password, 6)
        .finish()?;

    let user = load_by_username(db, username).await?;
    if !auth::verify_password(config, old_password.unwrap_or_default(), &user.password) {
        return Err(AppError::param_error("原密码错误"));
    }
    let hashed = auth::hash_password(config, new_password.unwrap_or_default())?;
    let mut active = user.into_active_model();
    active.password = Set(hashed);
    Ok(active.update(db).await?)
}

/// Applies the present fields of `patch`; id, username and role never change here.
pub async fn update_profile(
    db: &DatabaseConnection,
    username: &str,
    patch: ProfilePatch,
) -> Result<user::Model, AppError> {
    Validator::new()
        .max_len("title", patch.title.as_deref(), 100)
        .max_len("introduction", patch.introduction.as_deref(), 500)
        .max_len("email", patch.email.as_deref(), 100)
        .max_len("avatar", patch.avatar.as_deref(), 500)
        .finish()?;

    let user = load_by_username(db, username).await?;
    let mut active = user.into_active_model();
    if let Some(title) = patch.title {
        active.title = Set(Some(title));
    }
    if let Some(introduction) = patch.introduction {
        active.introduction = Set(Some(introduction));
    }
    if let Some(email) = patch.email {
        active.email = Set(Some(email));
    }
    if let Some(avatar) = patch.avatar {
        active.avatar = Set(Some(avatar));
    }
    Ok(active.update(db).await?)
}

pub async fn create_teacher(
    db: &DatabaseConnection,
    config: &AppConfig,
    caller: &AuthUser,
    req: NewTeacher,
) -> Result<user::Model, AppError> {
    require_role(caller, Role::Admin, "需要管理员权限")?;
    Validator::new()
        .not_blank("username", req.username.as_deref())
        .max_len("username", req.username.as_deref(), 255)
        .not_blank("password", req.password.as_deref())
        .finish()?;

    let username = req.username.as_deref().unwrap_or_default().trim().to_string();
    let password = req.password.unwrap_or_default();
    let extra = ProfilePatch {
        title: req.title,
        introduction: req.introduction,
        email: req.email,
        avatar: None,
    };
    let created = insert_user(db, config, &username, &password, Role::Teacher, extra).await?;
    info!("admin {} created teacher {} id={}", caller.username, created.username, created.id);
    Ok(created)
}

async fn find_teacher(db: &DatabaseConnection, id: i32) -> Result<user::Model, AppError> {
    let user = find_by_id(db, id).await?;
    if user.role != Role::Teacher {
        return Err(AppError::param_error(format!("用户 {} 不是教师", id)));
    }
    Ok(user)
}

pub async fn update_teacher_profile(
    db: &DatabaseConnection,
    caller: &AuthUser,
    id: i32,
    patch: ProfilePatch,
) -> Result<user::Model, AppError> {
    require_role(caller, Role::Admin, "需要管理员权限")?;
    let teacher = find_teacher(db, id).await?;
    update_profile(db, &teacher.username, ProfilePatch { avatar: None, ..patch }).await
}

/// Hard delete. Courses, answers and resources that reference the teacher are
/// left in place.
pub async fn delete_teacher(db: &DatabaseConnection, caller: &AuthUser, id: i32) -> Result<(), AppError> {
    require_role(caller, Role::Admin, "需要管理员权限")?;
    let user = find_by_id(db, id).await?;
    if user.role != Role::Teacher {
        return Err(AppError::forbidden(format!("用户 {} 不是教师，不能删除", id)));
    }
    user::Entity::delete_by_id(id).exec(db).await?;
    info!("admin {} deleted teacher {} id={}", caller.username, user.username, id);
    Ok(())
}

pub async fn assign_course_to_teacher(
    db: &DatabaseConnection,
    caller: &AuthUser,
    course_id: Option<i32>,
    teacher_id: Option<i32>,
) -> Result<course::Model, AppError> {
    require_role(caller, Role::Admin, "需要管理员权限")?;
    Validator::new()
        .required("courseId", &course_id)
        .required("teacherId", &teacher_id)
        .finish()?;
    let (course_id, teacher_id) = (course_id.unwrap_or_default(), teacher_id.unwrap_or_default());

    let course = course::Entity::find_by_id(course_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::param_error(format!("课程不存在: {}", course_id)))?;
    let teacher = match find_teacher(db, teacher_id).await {
        Ok(teacher) => teacher,
        Err(AppError::NotFound(_)) => return Err(AppError::param_error(format!("教师不存在: {}", teacher_id))),
        Err(e) => return Err(e),
    };

    let mut active = course.into_active_model();
    active.teacher_id = Set(teacher.id);
    let updated = active.update(db).await?;
    info!("course {} assigned to teacher {}", updated.id, teacher.username);
    Ok(updated)
}

pub async fn admin_update_user(
    db: &DatabaseConnection,
    config: &AppConfig,
    caller: &AuthUser,
    id: i32,
    patch: AdminUserPatch,
) -> Result<user::Model, AppError> {
    require_role(caller, Role::Admin, "需要管理员权限")?;
    let role = match patch.role.as_deref().filter(|r| !r.trim().is_empty()) {
        Some(raw) => Some(Role::parse(raw).ok_or_else(|| AppError::param_error(format!("未知角色: {}", raw)))?),
        None => None,
    };
    Validator::new()
        .min_len("password", patch.password.as_deref().filter(|p| !p.is_empty()), 6)
        .max_len("title", patch.title.as_deref(), 100)
        .max_len("introduction", patch.introduction.as_deref(), 500)
        .finish()?;

    let user = find_by_id(db, id).await?;
    let mut active = user.into_active_model();
    if let Some(role) = role {
        active.role = Set(role);
    }
    if let Some(password) = patch.password.filter(|p| !p.is_empty()) {
        active.password = Set(auth::hash_password(config, &password)?);
    }
    if let Some(title) = patch.title {
        active.title = Set(Some(title));
    }
    if let Some(introduction) = patch.introduction {
        active.introduction = Set(Some(introduction));
    }
    let updated = active.update(db).await?;
    info!("admin {} updated user {} role={}", caller.username, updated.username, updated.role.as_str());
    Ok(updated)
}

pub async fn list_teachers(db: &DatabaseConnection, req: PageRequest) -> Result<Page<user::Model>, AppError> {
    let select = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Teacher))
        .order_by_asc(user::Column::Id);
    fetch_page(db, select, req).await
}

pub async fn list_users(
    db: &DatabaseConnection,
    role: Option<Role>,
    keyword: Option<&str>,
    req: PageRequest,
) -> Result<Page<user::Model>, AppError> {
    let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());
    let select = user::Entity::find()
        .apply_if(role, |q, role| q.filter(user::Column::Role.eq(role)))
        .apply_if(keyword, |q, kw| q.filter(user::Column::Username.contains(kw)))
        .order_by_desc(user::Column::Id);
    fetch_page(db, select, req).await
}

/// Creates the configured administrator when the database has none.
pub async fn ensure_admin(db: &DatabaseConnection, config: &AppConfig) -> Result<(), AppError> {
    let existing = user::Entity::find()
        .filter(user::Column::Role.eq(Role::Admin))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }
    let admin = insert_user(
        db,
        config,
        &config.admin_username,
        &config.admin_password,
        Role::Admin,
        ProfilePatch::default(),
    )
    .await?;
    info!("bootstrap administrator {} created", admin.username);
    Ok(())
}
