use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::entity::question::QuestionStatus;
use crate::entity::resource::Visibility;
use crate::entity::user::Role;
use crate::entity::{answer, course, question, resource, user};

pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// A user as seen by clients. The password never leaves the server.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub role: Role,
    pub title: Option<String>,
    pub introduction: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub created: Option<String>,
}

impl From<user::Model> for UserDto {
    fn from(m: user::Model) -> Self {
        Self {
            id: m.id,
            username: m.username,
            role: m.role,
            title: m.title,
            introduction: m.introduction,
            email: m.email,
            avatar: m.avatar,
            created: m.created.map(to_rfc3339),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDto {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub college: Option<String>,
    pub teacher_id: i32,
}

impl From<course::Model> for CourseDto {
    fn from(m: course::Model) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            college: m.college,
            teacher_id: m.teacher_id,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub asker_id: i32,
    pub course_id: i32,
    pub ask_time: String,
    pub attachment_file_name: Option<String>,
    pub has_attachment: bool,
    pub status: QuestionStatus,
    pub is_new: bool,
}

impl From<question::Model> for QuestionDto {
    fn from(m: question::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            content: m.content,
            asker_id: m.asker_id,
            course_id: m.course_id,
            ask_time: to_rfc3339(m.ask_time),
            has_attachment: m.attachment_path.is_some(),
            attachment_file_name: m.attachment_file_name,
            status: m.status,
            is_new: m.is_new,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDto {
    pub id: i32,
    pub content: String,
    pub replier_id: i32,
    pub question_id: i32,
    pub answer_time: String,
    pub attachment_file_name: Option<String>,
    pub has_attachment: bool,
    pub is_read_by_asker: bool,
}

impl From<answer::Model> for AnswerDto {
    fn from(m: answer::Model) -> Self {
        Self {
            id: m.id,
            content: m.content,
            replier_id: m.replier_id,
            question_id: m.question_id,
            answer_time: to_rfc3339(m.answer_time),
            has_attachment: m.attachment_path.is_some(),
            attachment_file_name: m.attachment_file_name,
            is_read_by_asker: m.is_read_by_asker,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDto {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub course_id: i32,
    pub uploader_id: i32,
    pub upload_time: String,
    pub file_name: String,
    pub file_mime_type: Option<String>,
    pub download_count: i32,
    pub visibility: Visibility,
}

impl From<resource::Model> for ResourceDto {
    fn from(m: resource::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            description: m.description,
            course_id: m.course_id,
            uploader_id: m.uploader_id,
            upload_time: to_rfc3339(m.upload_time),
            file_name: m.file_name,
            file_mime_type: m.file_mime_type,
            download_count: m.download_count,
            visibility: m.visibility,
        }
    }
}
