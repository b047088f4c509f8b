//! User entity
//!
//! Owns every other row in the system; all queries are scoped by a user id.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub username: String,

    #[sea_orm(column_type = "Text")]
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub is_active: bool,

    pub is_admin: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::student::Entity")]
    Students,

    #[sea_orm(has_many = "super::lesson::Entity")]
    Lessons,

    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscriptions,

    #[sea_orm(has_many = "super::expense::Entity")]
    Expenses,

    #[sea_orm(has_many = "super::income::Entity")]
    Incomes,

    #[sea_orm(has_many = "super::rent_settings::Entity")]
    RentSettings,
}

impl Related<super::student::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Students.def()
    }
}

impl Related<super::lesson::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lessons.def()
    }
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl Related<super::expense::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl Related<super::income::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Incomes.def()
    }
}

impl Related<super::rent_settings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RentSettings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
