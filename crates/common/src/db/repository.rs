//! Repository pattern for database operations
//!
//! Every read and write is scoped by the owning user's id; a row owned by a
//! different user behaves exactly like a missing row. Partial updates go
//! through typed patch structs applied by explicit update functions.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

/// Fields accepted when registering a student
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub total_lessons: i32,
    pub remaining_lessons: i32,
}

/// Optional fields for a student update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct StudentPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub total_lessons: Option<i32>,
    pub remaining_lessons: Option<i32>,
}

/// Optional fields for a lesson update. Status flags and the student link are
/// deliberately absent: lifecycle changes go through the ledger.
#[derive(Debug, Clone, Default)]
pub struct LessonPatch {
    pub date: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<Option<String>>,
}

/// Fields for an expense or income entry
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub date: chrono::DateTime<chrono::FixedOffset>,
    pub amount: i64,
    pub category: String,
    pub description: Option<String>,
}

/// Optional fields for an expense or income update
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub date: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub amount: Option<i64>,
    pub category: Option<String>,
    pub description: Option<Option<String>>,
}

/// Filters for expense/income listings
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub start_date: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub end_date: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub category: Option<String>,
    pub offset: u64,
    pub limit: Option<u64>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user with an already-hashed password
    pub async fn create_user(
        &self,
        username: String,
        password_hash: String,
        is_admin: bool,
    ) -> Result<User> {
        let now = Utc::now().fixed_offset();
        let user = UserActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username),
            password_hash: Set(password_hash),
            is_active: Set(true),
            is_admin: Set(is_admin),
            created_at: Set(now),
        };
        user.insert(self.conn()).await.map_err(Into::into)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        UserEntity::find()
            .filter(UserColumn::Username.eq(username))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn update_user_password(&self, id: Uuid, password_hash: String) -> Result<()> {
        let user = self
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))?;
        let mut am: UserActiveModel = user.into();
        am.password_hash = Set(password_hash);
        am.update(self.conn()).await?;
        Ok(())
    }

    // ========================================================================
    // Student Operations
    // ========================================================================

    /// Create a student for the owner.
    /// Rejects a balance exceeding the lifetime count or negative counters.
    pub async fn create_student(&self, owner_id: Uuid, new: NewStudent) -> Result<Student> {
        check_balance_invariant(new.total_lessons, new.remaining_lessons)?;

        let now = Utc::now().fixed_offset();
        let student = StudentActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner_id),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            email: Set(new.email),
            phone: Set(new.phone),
            notes: Set(new.notes),
            total_lessons: Set(new.total_lessons),
            remaining_lessons: Set(new.remaining_lessons),
            created_at: Set(now),
        };
        student.insert(self.conn()).await.map_err(Into::into)
    }

    pub async fn list_students(
        &self,
        owner_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Student>> {
        StudentEntity::find()
            .filter(StudentColumn::UserId.eq(owner_id))
            .order_by_asc(StudentColumn::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_student(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Student>> {
        StudentEntity::find_by_id(id)
            .filter(StudentColumn::UserId.eq(owner_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Apply a patch to a student, revalidating the balance invariant on the
    /// merged result
    pub async fn update_student(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: StudentPatch,
    ) -> Result<Student> {
        let student = self
            .find_student(owner_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Student", id))?;

        let total = patch.total_lessons.unwrap_or(student.total_lessons);
        let remaining = patch.remaining_lessons.unwrap_or(student.remaining_lessons);
        check_balance_invariant(total, remaining)?;

        let mut am: StudentActiveModel = student.into();
        if let Some(v) = patch.first_name {
            am.first_name = Set(v);
        }
        if let Some(v) = patch.last_name {
            am.last_name = Set(v);
        }
        if let Some(v) = patch.email {
            am.email = Set(v);
        }
        if let Some(v) = patch.phone {
            am.phone = Set(v);
        }
        if let Some(v) = patch.notes {
            am.notes = Set(v);
        }
        am.total_lessons = Set(total);
        am.remaining_lessons = Set(remaining);

        am.update(self.conn()).await.map_err(Into::into)
    }

    /// Delete a student together with its lessons and subscription contracts,
    /// all in one transaction
    pub async fn delete_student(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let student = self
            .find_student(owner_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Student", id))?;

        let txn = self.conn().begin().await?;

        LessonEntity::delete_many()
            .filter(LessonColumn::StudentId.eq(student.id))
            .exec(&txn)
            .await?;

        SubscriptionEntity::delete_many()
            .filter(SubscriptionColumn::StudentId.eq(student.id))
            .exec(&txn)
            .await?;

        StudentEntity::delete_by_id(student.id).exec(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Lesson Operations (reads and the generic patch; lifecycle transitions
    // live on the ledger)
    // ========================================================================

    pub async fn list_lessons(
        &self,
        owner_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Lesson>> {
        LessonEntity::find()
            .filter(LessonColumn::UserId.eq(owner_id))
            .order_by_asc(LessonColumn::Date)
            .offset(offset)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_lesson(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Lesson>> {
        LessonEntity::find_by_id(id)
            .filter(LessonColumn::UserId.eq(owner_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn lessons_by_student(
        &self,
        owner_id: Uuid,
        student_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Lesson>> {
        LessonEntity::find()
            .filter(LessonColumn::UserId.eq(owner_id))
            .filter(LessonColumn::StudentId.eq(student_id))
            .order_by_asc(LessonColumn::Date)
            .offset(offset)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Lessons falling on the given calendar day (UTC window)
    pub async fn lessons_on_day(&self, owner_id: Uuid, day: NaiveDate) -> Result<Vec<Lesson>> {
        let start = Utc
            .from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN))
            .fixed_offset();
        let end = start + chrono::Duration::days(1);

        LessonEntity::find()
            .filter(LessonColumn::UserId.eq(owner_id))
            .filter(LessonColumn::Date.gte(start))
            .filter(LessonColumn::Date.lt(end))
            .order_by_asc(LessonColumn::Date)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn update_lesson(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: LessonPatch,
    ) -> Result<Lesson> {
        let lesson = self
            .find_lesson(owner_id, id)
            .await?
            .ok_or_else(|| AppError::not_found("Lesson", id))?;

        let mut am: LessonActiveModel = lesson.into();
        if let Some(v) = patch.date {
            am.date = Set(v);
        }
        if let Some(v) = patch.duration_minutes {
            am.duration_minutes = Set(v);
        }
        if let Some(v) = patch.notes {
            am.notes = Set(v);
        }

        am.update(self.conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Subscription Operations (creation goes through the ledger)
    // ========================================================================

    pub async fn list_subscriptions(
        &self,
        owner_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Subscription>> {
        SubscriptionEntity::find()
            .filter(SubscriptionColumn::UserId.eq(owner_id))
            .order_by_desc(SubscriptionColumn::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_subscription(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Subscription>> {
        SubscriptionEntity::find_by_id(id)
            .filter(SubscriptionColumn::UserId.eq(owner_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn subscriptions_by_student(
        &self,
        owner_id: Uuid,
        student_id: Uuid,
    ) -> Result<Vec<Subscription>> {
        SubscriptionEntity::find()
            .filter(SubscriptionColumn::UserId.eq(owner_id))
            .filter(SubscriptionColumn::StudentId.eq(student_id))
            .order_by_desc(SubscriptionColumn::CreatedAt)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Remove the contract row. Balance already granted to the student is
    /// not clawed back.
    pub async fn delete_subscription(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let result = SubscriptionEntity::delete_many()
            .filter(SubscriptionColumn::Id.eq(id))
            .filter(SubscriptionColumn::UserId.eq(owner_id))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::not_found("Subscription", id));
        }
        Ok(())
    }

    // ========================================================================
    // Expense Operations
    // ========================================================================

    pub async fn create_expense(&self, owner_id: Uuid, new: NewEntry) -> Result<Expense> {
        let expense = ExpenseActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner_id),
            date: Set(new.date),
            amount: Set(new.amount),
            category: Set(new.category),
            description: Set(new.description),
            created_at: Set(Utc::now().fixed_offset()),
        };
        expense.insert(self.conn()).await.map_err(Into::into)
    }

    pub async fn list_expenses(&self, owner_id: Uuid, filter: &EntryFilter) -> Result<Vec<Expense>> {
        let mut query = ExpenseEntity::find().filter(ExpenseColumn::UserId.eq(owner_id));
        if let Some(start) = filter.start_date {
            query = query.filter(ExpenseColumn::Date.gte(start));
        }
        if let Some(end) = filter.end_date {
            query = query.filter(ExpenseColumn::Date.lte(end));
        }
        if let Some(ref category) = filter.category {
            query = query.filter(ExpenseColumn::Category.eq(category.clone()));
        }
        query
            .order_by_desc(ExpenseColumn::Date)
            .offset(filter.offset)
            .limit(filter.limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn update_expense(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: EntryPatch,
    ) -> Result<Expense> {
        let expense = ExpenseEntity::find_by_id(id)
            .filter(ExpenseColumn::UserId.eq(owner_id))
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::not_found("Expense", id))?;

        let mut am: ExpenseActiveModel = expense.into();
        if let Some(v) = patch.date {
            am.date = Set(v);
        }
        if let Some(v) = patch.amount {
            am.amount = Set(v);
        }
        if let Some(v) = patch.category {
            am.category = Set(v);
        }
        if let Some(v) = patch.description {
            am.description = Set(v);
        }
        am.update(self.conn()).await.map_err(Into::into)
    }

    pub async fn delete_expense(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let result = ExpenseEntity::delete_many()
            .filter(ExpenseColumn::Id.eq(id))
            .filter(ExpenseColumn::UserId.eq(owner_id))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::not_found("Expense", id));
        }
        Ok(())
    }

    // ========================================================================
    // Income Operations
    // ========================================================================

    pub async fn create_income(&self, owner_id: Uuid, new: NewEntry) -> Result<Income> {
        let income = IncomeActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner_id),
            date: Set(new.date),
            amount: Set(new.amount),
            category: Set(new.category),
            description: Set(new.description),
            created_at: Set(Utc::now().fixed_offset()),
        };
        income.insert(self.conn()).await.map_err(Into::into)
    }

    pub async fn list_incomes(&self, owner_id: Uuid, filter: &EntryFilter) -> Result<Vec<Income>> {
        let mut query = IncomeEntity::find().filter(IncomeColumn::UserId.eq(owner_id));
        if let Some(start) = filter.start_date {
            query = query.filter(IncomeColumn::Date.gte(start));
        }
        if let Some(end) = filter.end_date {
            query = query.filter(IncomeColumn::Date.lte(end));
        }
        if let Some(ref category) = filter.category {
            query = query.filter(IncomeColumn::Category.eq(category.clone()));
        }
        query
            .order_by_desc(IncomeColumn::Date)
            .offset(filter.offset)
            .limit(filter.limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn update_income(
        &self,
        owner_id: Uuid,
        id: Uuid,
        patch: EntryPatch,
    ) -> Result<Income> {
        let income = IncomeEntity::find_by_id(id)
            .filter(IncomeColumn::UserId.eq(owner_id))
            .one(self.conn())
            .await?
            .ok_or_else(|| AppError::not_found("Income", id))?;

        let mut am: IncomeActiveModel = income.into();
        if let Some(v) = patch.date {
            am.date = Set(v);
        }
        if let Some(v) = patch.amount {
            am.amount = Set(v);
        }
        if let Some(v) = patch.category {
            am.category = Set(v);
        }
        if let Some(v) = patch.description {
            am.description = Set(v);
        }
        am.update(self.conn()).await.map_err(Into::into)
    }

    pub async fn delete_income(&self, owner_id: Uuid, id: Uuid) -> Result<()> {
        let result = IncomeEntity::delete_many()
            .filter(IncomeColumn::Id.eq(id))
            .filter(IncomeColumn::UserId.eq(owner_id))
            .exec(self.conn())
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::not_found("Income", id));
        }
        Ok(())
    }

    // ========================================================================
    // Rent Settings
    // ========================================================================

    pub async fn find_rent_settings(&self, owner_id: Uuid) -> Result<Option<RentSettings>> {
        RentSettingsEntity::find()
            .filter(RentSettingsColumn::UserId.eq(owner_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Create or replace the owner's rent settings
    pub async fn upsert_rent_settings(
        &self,
        owner_id: Uuid,
        amount: i64,
        payment_day: i32,
    ) -> Result<RentSettings> {
        match self.find_rent_settings(owner_id).await? {
            Some(existing) => {
                let mut am: RentSettingsActiveModel = existing.into();
                am.amount = Set(amount);
                am.payment_day = Set(payment_day);
                am.update(self.conn()).await.map_err(Into::into)
            }
            None => {
                let settings = RentSettingsActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(owner_id),
                    amount: Set(amount),
                    payment_day: Set(payment_day),
                };
                settings.insert(self.conn()).await.map_err(Into::into)
            }
        }
    }
}

fn check_balance_invariant(total: i32, remaining: i32) -> Result<()> {
    if total < 0 || remaining < 0 {
        return Err(AppError::Validation {
            message: "lesson counters must not be negative".to_string(),
        });
    }
    if remaining > total {
        return Err(AppError::Validation {
            message: "remaining_lessons must not exceed total_lessons".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Repository, Uuid) {
        let pool = DbPool::new_in_memory().await.expect("test database");
        let repo = Repository::new(pool);
        let user = repo
            .create_user("tutor".into(), "hash".into(), false)
            .await
            .expect("user");
        (repo, user.id)
    }

    fn new_student(remaining: i32) -> NewStudent {
        NewStudent {
            first_name: "Alex".into(),
            last_name: "Ivanov".into(),
            email: None,
            phone: Some("+7900000000".into()),
            notes: None,
            total_lessons: remaining,
            remaining_lessons: remaining,
        }
    }

    #[tokio::test]
    async fn test_student_crud_scoped_by_owner() {
        let (repo, owner) = setup().await;
        let other = repo
            .create_user("other".into(), "hash".into(), false)
            .await
            .unwrap();

        let student = repo.create_student(owner, new_student(4)).await.unwrap();
        assert_eq!(student.remaining_lessons, 4);

        // Visible to the owner
        assert!(repo.find_student(owner, student.id).await.unwrap().is_some());
        // Invisible to anyone else
        assert!(repo
            .find_student(other.id, student.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_student_rejects_excess_balance() {
        let (repo, owner) = setup().await;
        let mut bad = new_student(2);
        bad.remaining_lessons = 5;

        let err = repo.create_student(owner, bad).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_update_student_revalidates_invariant() {
        let (repo, owner) = setup().await;
        let student = repo.create_student(owner, new_student(4)).await.unwrap();

        let err = repo
            .update_student(
                owner,
                student.id,
                StudentPatch {
                    remaining_lessons: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        // Raising both together is fine
        let updated = repo
            .update_student(
                owner,
                student.id,
                StudentPatch {
                    total_lessons: Some(10),
                    remaining_lessons: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.total_lessons, 10);
        assert_eq!(updated.remaining_lessons, 10);
    }

    #[tokio::test]
    async fn test_patch_leaves_unset_fields_untouched() {
        let (repo, owner) = setup().await;
        let student = repo.create_student(owner, new_student(3)).await.unwrap();

        let updated = repo
            .update_student(
                owner,
                student.id,
                StudentPatch {
                    notes: Some(Some("prefers mornings".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.first_name, "Alex");
        assert_eq!(updated.phone.as_deref(), Some("+7900000000"));
        assert_eq!(updated.notes.as_deref(), Some("prefers mornings"));
        assert_eq!(updated.remaining_lessons, 3);
    }

    #[tokio::test]
    async fn test_expense_filters() {
        let (repo, owner) = setup().await;
        let jan = "2025-01-15T12:00:00Z"
            .parse::<chrono::DateTime<chrono::FixedOffset>>()
            .unwrap();
        let mar = "2025-03-15T12:00:00Z"
            .parse::<chrono::DateTime<chrono::FixedOffset>>()
            .unwrap();

        repo.create_expense(
            owner,
            NewEntry {
                date: jan,
                amount: 100,
                category: "rent".into(),
                description: None,
            },
        )
        .await
        .unwrap();
        repo.create_expense(
            owner,
            NewEntry {
                date: mar,
                amount: 70,
                category: "supplies".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        let all = repo
            .list_expenses(
                owner,
                &EntryFilter {
                    limit: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let feb_on = repo
            .list_expenses(
                owner,
                &EntryFilter {
                    start_date: Some(
                        "2025-02-01T00:00:00Z"
                            .parse::<chrono::DateTime<chrono::FixedOffset>>()
                            .unwrap(),
                    ),
                    limit: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(feb_on.len(), 1);
        assert_eq!(feb_on[0].category, "supplies");

        let rent_only = repo
            .list_expenses(
                owner,
                &EntryFilter {
                    category: Some("rent".into()),
                    limit: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(rent_only.len(), 1);
        assert_eq!(rent_only[0].amount, 100);
    }

    #[tokio::test]
    async fn test_rent_settings_upsert() {
        let (repo, owner) = setup().await;
        assert!(repo.find_rent_settings(owner).await.unwrap().is_none());

        let created = repo.upsert_rent_settings(owner, 15000, 5).await.unwrap();
        assert_eq!(created.amount, 15000);

        let replaced = repo.upsert_rent_settings(owner, 18000, 10).await.unwrap();
        assert_eq!(replaced.id, created.id);
        assert_eq!(replaced.amount, 18000);
        assert_eq!(replaced.payment_day, 10);
    }

    #[tokio::test]
    async fn test_delete_subscription_not_owned_is_not_found() {
        let (repo, owner) = setup().await;
        let err = repo
            .delete_subscription(owner, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }
}
