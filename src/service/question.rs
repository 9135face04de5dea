use chrono::Utc;
use log::{debug, info};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Select, Set, TransactionTrait,
};
use serde::Deserialize;

use super::{course as course_service, exec_sql, fetch_page, PageRequest};
use crate::auth::AuthUser;
use crate::entity::question::{self, QuestionStatus};
use crate::entity::user::Role;
use crate::entity::{answer, course};
use crate::error::{map_tx_error, AppError};
use crate::policy::{ensure, may_modify_question, require_role};
use crate::response::Page;
use crate::storage::{FileStore, Upload};
use crate::validate::Validator;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub course_id: Option<i32>,
}

/// Title and content edit; course and asker stay fixed.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEdit {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default)]
pub struct QuestionFilter {
    pub course_id: Option<i32>,
    pub teacher_id: Option<i32>,
    pub keyword: Option<String>,
    pub status: Option<QuestionStatus>,
}

fn validate_text(title: Option<&str>, content: Option<&str>, v: &mut Validator) {
    v.not_blank("title", title)
        .max_len("title", title, 255)
        .not_blank("content", content)
        .max_len("content", content, 5000);
}

/// `None` for an absent or blank value, 400 for an unknown one.
pub fn parse_status(raw: Option<&str>) -> Result<Option<QuestionStatus>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => QuestionStatus::parse(s)
            .map(Some)
            .ok_or_else(|| AppError::param_error(format!("未知的问题状态: {}", s))),
    }
}

fn keyword_condition(keyword: &str) -> Condition {
    Condition::any()
        .add(question::Column::Title.contains(keyword))
        .add(question::Column::Content.contains(keyword))
}

/// Blank keywords are ignored.
fn narrow(
    select: Select<question::Entity>,
    keyword: Option<&str>,
    status: Option<QuestionStatus>,
) -> Select<question::Entity> {
    let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());
    select
        .apply_if(keyword, |q, kw| q.filter(keyword_condition(kw)))
        .apply_if(status, |q, status| q.filter(question::Column::Status.eq(status)))
}

fn newest_first(select: Select<question::Entity>) -> Select<question::Entity> {
    select
        .order_by_desc(question::Column::AskTime)
        .order_by_desc(question::Column::Id)
}

pub async fn create(
    db: &DatabaseConnection,
    store: &FileStore,
    caller: &AuthUser,
    form: QuestionForm,
    attachment: Option<Upload>,
) -> Result<question::Model, AppError> {
    require_role(caller, Role::Student, "只有学生可以提问")?;
    let mut v = Validator::new();
    validate_text(form.title.as_deref(), form.content.as_deref(), &mut v);
    v.required("courseId", &form.course_id).finish()?;

    let course_id = form.course_id.unwrap_or_default();
    if course::Entity::find_by_id(course_id).one(db).await?.is_none() {
        return Err(AppError::param_error(format!("课程不存在: {}", course_id)));
    }

    let stored = match &attachment {
        Some(upload) => Some(store.save(upload).await?),
        None => None,
    };

    let model = question::ActiveModel {
        title: Set(form.title.unwrap_or_default().trim().to_string()),
        content: Set(form.content.unwrap_or_default()),
        asker_id: Set(caller.user_id),
        course_id: Set(course_id),
        ask_time: Set(Utc::now()),
        attachment_path: Set(stored.clone()),
        attachment_file_name: Set(attachment.map(|a| a.file_name)),
        status: Set(QuestionStatus::Unanswered),
        is_new: Set(true),
        ..Default::default()
    };
    match model.insert(db).await {
        Ok(created) => {
            info!("student {} asked question {} in course {}", caller.username, created.id, course_id);
            Ok(created)
        }
        Err(e) => {
            if let Some(name) = stored {
                store.remove(&name).await;
            }
            Err(e.into())
        }
    }
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i32) -> Result<question::Model, AppError> {
    question::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("问题不存在: {}", id)))
}

/// Questions of one course, optionally narrowed by keyword and status.
pub async fn search(
    db: &DatabaseConnection,
    course_id: i32,
    keyword: Option<&str>,
    status: Option<QuestionStatus>,
    req: PageRequest,
) -> Result<Page<question::Model>, AppError> {
    let select = question::Entity::find().filter(question::Column::CourseId.eq(course_id));
    fetch_page(db, newest_first(narrow(select, keyword, status)), req).await
}

/// Every filter is optional. `teacher_id` matches questions whose course is
/// currently owned by that teacher.
pub async fn search_global(
    db: &DatabaseConnection,
    filter: QuestionFilter,
    req: PageRequest,
) -> Result<Page<question::Model>, AppError> {
    let select = question::Entity::find()
        .apply_if(filter.course_id.filter(|id| *id > 0), |q, id| {
            q.filter(question::Column::CourseId.eq(id))
        })
        .apply_if(filter.teacher_id.filter(|id| *id > 0), |q, teacher_id| {
            q.filter(
                question::Column::CourseId.in_subquery(
                    Query::select()
                        .column(course::Column::Id)
                        .from(course::Entity)
                        .and_where(course::Column::TeacherId.eq(teacher_id))
                        .to_owned(),
                ),
            )
        });
    fetch_page(db, newest_first(narrow(select, filter.keyword.as_deref(), filter.status)), req).await
}

pub async fn list_mine(
    db: &DatabaseConnection,
    caller: &AuthUser,
    status: Option<QuestionStatus>,
    req: PageRequest,
) -> Result<Page<question::Model>, AppError> {
    let select = question::Entity::find()
        .filter(question::Column::AskerId.eq(caller.user_id))
        .apply_if(status, |q, status| q.filter(question::Column::Status.eq(status)));
    fetch_page(db, newest_first(select), req).await
}

/// Platform-wide listing for moderation.
pub async fn list_all(
    db: &DatabaseConnection,
    keyword: Option<&str>,
    status: Option<QuestionStatus>,
    req: PageRequest,
) -> Result<Page<question::Model>, AppError> {
    let filter = QuestionFilter {
        keyword: keyword.map(str::to_string),
        status,
        ..Default::default()
    };
    search_global(db, filter, req).await
}

/// Only called from answer creation, inside its transaction.
pub(crate) async fn mark_answered<C: ConnectionTrait>(db: &C, id: i32) -> Result<(), AppError> {
    question::Entity::update_many()
        .col_expr(question::Column::Status, Expr::value(QuestionStatus::Answered))
        .col_expr(question::Column::IsNew, Expr::value(false))
        .filter(question::Column::Id.eq(id))
        .exec(db)
        .await?;
    debug!("question {} marked answered", id);
    Ok(())
}

/// Single conditional statement: the question only goes back to UNANSWERED
/// if no answer references it at the moment the update runs.
pub(crate) async fn revert_if_unanswered<C: ConnectionTrait>(db: &C, id: i32) -> Result<bool, AppError> {
    let affected = exec_sql(
        db,
        "UPDATE t_question SET status = 'UNANSWERED' \
         WHERE id = ? AND NOT EXISTS (SELECT 1 FROM t_answer WHERE question_id = ?)",
        vec![id.into(), id.into()],
    )
    .await?;
    if affected > 0 {
        debug!("question {} reverted to unanswered", id);
    }
    Ok(affected > 0)
}

pub async fn update(
    db: &DatabaseConnection,
    caller: &AuthUser,
    id: i32,
    edit: QuestionEdit,
) -> Result<question::Model, AppError> {
    let existing = find_by_id(db, id).await?;
    ensure(may_modify_question(caller, &existing), caller, "只能修改自己的问题")?;
    let mut v = Validator::new();
    validate_text(edit.title.as_deref(), edit.content.as_deref(), &mut v);
    v.finish()?;

    let mut active = existing.into_active_model();
    active.title = Set(edit.title.unwrap_or_default().trim().to_string());
    active.content = Set(edit.content.unwrap_or_default());
    Ok(active.update(db).await?)
}

/// Removes the question together with its answers, then their stored files.
pub async fn delete(db: &DatabaseConnection, store: &FileStore, caller: &AuthUser, id: i32) -> Result<(), AppError> {
    let existing = find_by_id(db, id).await?;
    ensure(may_modify_question(caller, &existing), caller, "只能删除自己的问题")?;

    let mut files = db
        .transaction::<_, Vec<String>, AppError>(|txn| {
            Box::pin(async move {
                let answer_files: Vec<Option<String>> = answer::Entity::find()
                    .filter(answer::Column::QuestionId.eq(id))
                    .select_only()
                    .column(answer::Column::AttachmentPath)
                    .into_tuple()
                    .all(txn)
                    .await?;
                answer::Entity::delete_many()
                    .filter(answer::Column::QuestionId.eq(id))
                    .exec(txn)
                    .await?;
                question::Entity::delete_by_id(id).exec(txn).await?;
                Ok(answer_files.into_iter().flatten().collect())
            })
        })
        .await
        .map_err(map_tx_error)?;

    files.extend(existing.attachment_path);
    for name in &files {
        store.remove(name).await;
    }
    info!("{} deleted question {} ({} files)", caller.username, id, files.len());
    Ok(())
}

/// Stored bytes and original name of the question's attachment.
pub async fn attachment(
    db: &DatabaseConnection,
    store: &FileStore,
    id: i32,
) -> Result<(Vec<u8>, String), AppError> {
    let question = find_by_id(db, id).await?;
    let path = question
        .attachment_path
        .ok_or_else(|| AppError::not_found("该问题没有附件"))?;
    let data = store.read(&path).await?;
    Ok((data, question.attachment_file_name.unwrap_or(path)))
}

pub async fn count_by_asker(db: &DatabaseConnection, asker_id: i32) -> Result<u64, AppError> {
    Ok(question::Entity::find()
        .filter(question::Column::AskerId.eq(asker_id))
        .count(db)
        .await?)
}

pub async fn count_answered_by_asker(db: &DatabaseConnection, asker_id: i32) -> Result<u64, AppError> {
    Ok(question::Entity::find()
        .filter(question::Column::AskerId.eq(asker_id))
        .filter(question::Column::Status.eq(QuestionStatus::Answered))
        .count(db)
        .await?)
}

pub async fn count_unanswered_in_course(db: &DatabaseConnection, course_id: i32) -> Result<u64, AppError> {
    Ok(question::Entity::find()
        .filter(question::Column::CourseId.eq(course_id))
        .filter(question::Column::Status.eq(QuestionStatus::Unanswered))
        .count(db)
        .await?)
}

/// Unanswered questions across every course the teacher currently owns.
pub async fn count_unanswered_for_teacher(db: &DatabaseConnection, teacher_id: i32) -> Result<u64, AppError> {
    let course_ids = course_service::taught_course_ids(db, teacher_id).await?;
    if course_ids.is_empty() {
        return Ok(0);
    }
    Ok(question::Entity::find()
        .filter(question::Column::CourseId.is_in(course_ids))
        .filter(question::Column::Status.eq(QuestionStatus::Unanswered))
        .count(db)
        .await?)
}
