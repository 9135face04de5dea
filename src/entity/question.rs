use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(20))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    #[sea_orm(string_value = "UNANSWERED")]
    Unanswered,
    #[sea_orm(string_value = "ANSWERED")]
    Answered,
}

impl QuestionStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "UNANSWERED" => Some(Self::Unanswered),
            "ANSWERED" => Some(Self::Answered),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "t_question")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub content: String,
    pub asker_id: i32,
    pub course_id: i32,
    pub ask_time: DateTimeUtc,
    pub attachment_path: Option<String>,
    pub attachment_file_name: Option<String>,
    pub status: QuestionStatus,
    /// Unread by the course teacher.
    pub is_new: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
