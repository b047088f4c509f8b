//! SeaORM entity models

mod expense;
mod income;
mod lesson;
mod rent_settings;
mod student;
mod subscription;
mod user;

pub use user::{
    ActiveModel as UserActiveModel, Column as UserColumn, Entity as UserEntity, Model as User,
};

pub use student::{
    ActiveModel as StudentActiveModel, Column as StudentColumn, Entity as StudentEntity,
    Model as Student,
};

pub use lesson::{
    ActiveModel as LessonActiveModel, Column as LessonColumn, Entity as LessonEntity,
    Model as Lesson,
};

pub use subscription::{
    ActiveModel as SubscriptionActiveModel, Column as SubscriptionColumn,
    Entity as SubscriptionEntity, Model as Subscription,
};

pub use expense::{
    ActiveModel as ExpenseActiveModel, Column as ExpenseColumn, Entity as ExpenseEntity,
    Model as Expense,
};

pub use income::{
    ActiveModel as IncomeActiveModel, Column as IncomeColumn, Entity as IncomeEntity,
    Model as Income,
};

pub use rent_settings::{
    ActiveModel as RentSettingsActiveModel, Column as RentSettingsColumn,
    Entity as RentSettingsEntity, Model as RentSettings,
};
