use chrono::Utc;
use log::{debug, info};
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, QueryTrait, Set, TransactionTrait,
};
use serde::Deserialize;

use super::{course as course_service, fetch_page, question as question_service, PageRequest};
use crate::auth::AuthUser;
use crate::entity::user::Role;
use crate::entity::{answer, question};
use crate::error::{map_tx_error, AppError};
use crate::policy::{ensure, may_answer_in, may_modify_answer, require_role};
use crate::response::Page;
use crate::storage::{FileStore, Upload};
use crate::validate::Validator;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerForm {
    pub content: Option<String>,
    pub question_id: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEdit {
    pub content: Option<String>,
}

fn validate_content(content: Option<&str>, v: &mut Validator) {
    v.not_blank("content", content).max_len("content", content, 5000);
}

/// Persists the answer and flips its question to ANSWERED in one transaction.
pub async fn create(
    db: &DatabaseConnection,
    store: &FileStore,
    caller: &AuthUser,
    form: AnswerForm,
    attachment: Option<Upload>,
) -> Result<answer::Model, AppError> {
    require_role(caller, Role::Teacher, "只有教师可以回答问题")?;
    let mut v = Validator::new();
    validate_content(form.content.as_deref(), &mut v);
    v.required("questionId", &form.question_id).finish()?;

    let question_id = form.question_id.unwrap_or_default();
    let question = match question_service::find_by_id(db, question_id).await {
        Ok(question) => question,
        Err(AppError::NotFound(msg)) => return Err(AppError::param_error(msg)),
        Err(e) => return Err(e),
    };
    let taught = course_service::taught_course_ids(db, caller.user_id).await?;
    ensure(
        may_answer_in(caller, &taught, question.course_id),
        caller,
        "无权限：该教师不负责该课程的问答",
    )?;

    let stored = match &attachment {
        Some(upload) => Some(store.save(upload).await?),
        None => None,
    };
    let model = answer::ActiveModel {
        content: Set(form.content.unwrap_or_default()),
        replier_id: Set(caller.user_id),
        question_id: Set(question.id),
        answer_time: Set(Utc::now()),
        attachment_path: Set(stored.clone()),
        attachment_file_name: Set(attachment.map(|a| a.file_name)),
        is_read_by_asker: Set(false),
        ..Default::default()
    };

    let result = db
        .transaction::<_, answer::Model, AppError>(|txn| {
            Box::pin(async move {
                let inserted = model.insert(txn).await?;
                question_service::mark_answered(txn, inserted.question_id).await?;
                Ok(inserted)
            })
        })
        .await
        .map_err(map_tx_error);

    match result {
        Ok(created) => {
            info!("teacher {} answered question {}", caller.username, created.question_id);
            Ok(created)
        }
        Err(e) => {
            if let Some(name) = stored {
                store.remove(&name).await;
            }
            Err(e)
        }
    }
}

pub async fn find_by_id(db: &DatabaseConnection, id: i32) -> Result<answer::Model, AppError> {
    answer::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::not_found(format!("回答不存在: {}", id)))
}

/// Deletes the answer; when it was the last one the question returns to UNANSWERED.
pub async fn delete(db: &DatabaseConnection, store: &FileStore, caller: &AuthUser, id: i32) -> Result<(), AppError> {
    let existing = find_by_id(db, id).await?;
    ensure(may_modify_answer(caller, &existing), caller, "只能删除自己的回答")?;

    let question_id = existing.question_id;
    let reverted = db
        .transaction::<_, bool, AppError>(|txn| {
            Box::pin(async move {
                answer::Entity::delete_by_id(id).exec(txn).await?;
                question_service::revert_if_unanswered(txn, question_id).await
            })
        })
        .await
        .map_err(map_tx_error)?;

    if let Some(name) = &existing.attachment_path {
        store.remove(name).await;
    }
    info!(
        "{} deleted answer {} of question {} (reverted={})",
        caller.username, id, question_id, reverted
    );
    Ok(())
}

/// Content only; replier and question stay fixed.
pub async fn update(
    db: &DatabaseConnection,
    caller: &AuthUser,
    id: i32,
    edit: AnswerEdit,
) -> Result<answer::Model, AppError> {
    let existing = find_by_id(db, id).await?;
    ensure(may_modify_answer(caller, &existing), caller, "只能修改自己的回答")?;
    let mut v = Validator::new();
    validate_content(edit.content.as_deref(), &mut v);
    v.finish()?;

    let mut active = existing.into_active_model();
    active.content = Set(edit.content.unwrap_or_default());
    Ok(active.update(db).await?)
}

pub async fn list_by_question(db: &DatabaseConnection, question_id: i32) -> Result<Vec<answer::Model>, AppError> {
    Ok(answer::Entity::find()
        .filter(answer::Column::QuestionId.eq(question_id))
        .order_by_asc(answer::Column::AnswerTime)
        .all(db)
        .await?)
}

/// Platform-wide listing for moderation; keyword matches the content.
pub async fn list_all(
    db: &DatabaseConnection,
    keyword: Option<&str>,
    req: PageRequest,
) -> Result<Page<answer::Model>, AppError> {
    let keyword = keyword.map(str::trim).filter(|k| !k.is_empty());
    let select = answer::Entity::find()
        .apply_if(keyword, |q, kw| q.filter(answer::Column::Content.contains(kw)))
        .order_by_desc(answer::Column::AnswerTime)
        .order_by_desc(answer::Column::Id);
    fetch_page(db, select, req).await
}

/// Marks every answer of the caller's question as read. Returns how many changed.
pub async fn mark_read_by_asker(db: &DatabaseConnection, caller: &AuthUser, question_id: i32) -> Result<u64, AppError> {
    let question = question_service::find_by_id(db, question_id).await?;
    ensure(
        question.asker_id == caller.user_id,
        caller,
        "只能标记自己问题的回答",
    )?;
    let result = answer::Entity::update_many()
        .col_expr(answer::Column::IsReadByAsker, Expr::value(true))
        .filter(answer::Column::QuestionId.eq(question_id))
        .filter(answer::Column::IsReadByAsker.eq(false))
        .exec(db)
        .await?;
    debug!("{} answers of question {} marked read", result.rows_affected, question_id);
    Ok(result.rows_affected)
}

/// Unread answers across every question the asker has posted.
pub async fn count_unread_for_asker(db: &DatabaseConnection, asker_id: i32) -> Result<u64, AppError> {
    Ok(answer::Entity::find()
        .filter(answer::Column::IsReadByAsker.eq(false))
        .filter(
            answer::Column::QuestionId.in_subquery(
                Query::select()
                    .column(question::Column::Id)
                    .from(question::Entity)
                    .and_where(question::Column::AskerId.eq(asker_id))
                    .to_owned(),
            ),
        )
        .count(db)
        .await?)
}

/// Stored bytes and original name of the answer's attachment.
pub async fn attachment(db: &DatabaseConnection, store: &FileStore, id: i32) -> Result<(Vec<u8>, String), AppError> {
    let answer = find_by_id(db, id).await?;
    let path = answer
        .attachment_path
        .ok_or_else(|| AppError::not_found("该回答没有附件"))?;
    let data = store.read(&path).await?;
    Ok((data, answer.attachment_file_name.unwrap_or(path)))
}

