use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "t_answer")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub content: String,
    pub replier_id: i32,
    pub question_id: i32,
    pub answer_time: DateTimeUtc,
    pub attachment_path: Option<String>,
    pub attachment_file_name: Option<String>,
    pub is_read_by_asker: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
