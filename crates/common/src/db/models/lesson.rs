//! Lesson entity
//!
//! Lifecycle: a lesson starts pending (neither flag set). Completing or
//! cancelling is terminal; the two flags are mutually exclusive and once one
//! is set no further status transition is allowed. Row deletion is valid
//! from any state.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lessons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub student_id: Uuid,

    pub date: DateTimeWithTimeZone,

    pub duration_minutes: i32,

    pub is_completed: bool,

    pub is_cancelled: bool,

    pub notes: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Whether the lesson has reached a terminal state
    pub fn is_closed(&self) -> bool {
        self.is_completed || self.is_cancelled
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,

    #[sea_orm(
        belongs_to = "super::student::Entity",
        from = "Column::StudentId",
        to = "super::student::Column::Id"
    )]
    Student,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Student.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn lesson() -> Model {
        Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date: Utc::now().fixed_offset(),
            duration_minutes: 60,
            is_completed: false,
            is_cancelled: false,
            notes: None,
            created_at: Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn test_pending_lesson_is_open() {
        assert!(!lesson().is_closed());
    }

    #[test]
    fn test_either_flag_closes_the_lesson() {
        let mut completed = lesson();
        completed.is_completed = true;
        assert!(completed.is_closed());

        let mut cancelled = lesson();
        cancelled.is_cancelled = true;
        assert!(cancelled.is_closed());
    }
}
