//! The lesson balance ledger
//!
//! Maintains the invariant that a student's `remaining_lessons` reflects
//! lessons paid for but not yet consumed:
//!
//! - scheduling a lesson debits one credit
//! - deleting a lesson refunds the credit, whatever state the lesson was in
//! - cancelling refunds the credit; completing consumes it for good
//! - granting a subscription adds a block to both counters
//!
//! Every operation runs in a single database transaction. The debit is a
//! conditional `UPDATE … WHERE remaining_lessons > 0`: under concurrent
//! requests the database serializes the row update and re-evaluates the
//! predicate, so two rival bookings against a balance of one produce exactly
//! one success and one `InsufficientBalance`, never a negative balance.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::metrics::names;
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbBackend, EntityTrait,
    QueryFilter, Set, Statement, TransactionTrait,
};
use tracing::info;
use uuid::Uuid;

/// Fields accepted when scheduling a lesson
#[derive(Debug, Clone)]
pub struct NewLesson {
    pub student_id: Uuid,
    pub date: chrono::DateTime<chrono::FixedOffset>,
    pub duration_minutes: i32,
    pub notes: Option<String>,
}

/// Fields accepted when granting a subscription
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub student_id: Uuid,
    pub lessons_count: i32,
    pub price: i64,
    pub start_date: chrono::DateTime<chrono::FixedOffset>,
    pub end_date: chrono::DateTime<chrono::FixedOffset>,
    pub notes: Option<String>,
}

/// Balance ledger over the entity store
#[derive(Clone)]
pub struct Ledger {
    pool: DbPool,
}

impl Ledger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn backend(&self) -> DbBackend {
        self.pool.conn().get_database_backend()
    }

    /// Schedule a lesson for a student, debiting one credit.
    ///
    /// Fails with `NotFound` if the student does not exist for this owner and
    /// with `InsufficientBalance` if the balance is zero. The debit and the
    /// insert commit together or not at all.
    pub async fn schedule_lesson(&self, owner_id: Uuid, new: NewLesson) -> Result<Lesson> {
        let txn = self.pool.conn().begin().await?;

        let student = find_student(&txn, owner_id, new.student_id)
            .await?
            .ok_or_else(|| AppError::not_found("Student", new.student_id))?;

        let debited = txn
            .execute(Statement::from_sql_and_values(
                self.backend(),
                "UPDATE students SET remaining_lessons = remaining_lessons - 1 \
                 WHERE id = $1 AND user_id = $2 AND remaining_lessons > 0",
                [student.id.into(), owner_id.into()],
            ))
            .await?;

        if debited.rows_affected() == 0 {
            txn.rollback().await?;
            counter!(names::INSUFFICIENT_BALANCE).increment(1);
            return Err(AppError::InsufficientBalance {
                student_id: student.id,
            });
        }

        let lesson = LessonActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner_id),
            student_id: Set(student.id),
            date: Set(new.date),
            duration_minutes: Set(new.duration_minutes),
            is_completed: Set(false),
            is_cancelled: Set(false),
            notes: Set(new.notes),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        counter!(names::LESSONS_SCHEDULED).increment(1);
        info!(lesson_id = %lesson.id, student_id = %student.id, "Lesson scheduled");
        Ok(lesson)
    }

    /// Delete a lesson and refund the credit, regardless of whether the
    /// lesson was pending, completed, or cancelled.
    pub async fn remove_lesson(&self, owner_id: Uuid, lesson_id: Uuid) -> Result<()> {
        let txn = self.pool.conn().begin().await?;

        let lesson = find_lesson(&txn, owner_id, lesson_id)
            .await?
            .ok_or_else(|| AppError::not_found("Lesson", lesson_id))?;

        LessonEntity::delete_by_id(lesson.id).exec(&txn).await?;
        self.credit(&txn, owner_id, lesson.student_id, 1).await?;

        txn.commit().await?;
        counter!(names::LESSONS_REMOVED).increment(1);
        info!(lesson_id = %lesson.id, student_id = %lesson.student_id, "Lesson removed, credit refunded");
        Ok(())
    }

    /// Mark a lesson completed. The credit was consumed at scheduling, so the
    /// balance is untouched.
    pub async fn complete_lesson(&self, owner_id: Uuid, lesson_id: Uuid) -> Result<Lesson> {
        let txn = self.pool.conn().begin().await?;

        let lesson = find_lesson(&txn, owner_id, lesson_id)
            .await?
            .ok_or_else(|| AppError::not_found("Lesson", lesson_id))?;
        self.close(&txn, &lesson, LessonColumn::IsCompleted).await?;

        txn.commit().await?;
        counter!(names::LESSONS_COMPLETED).increment(1);
        info!(lesson_id = %lesson.id, "Lesson completed");
        Ok(Lesson {
            is_completed: true,
            ..lesson
        })
    }

    /// Cancel a lesson and refund the credit: a cancelled lesson consumed
    /// nothing, so it does not count against the student's paid balance.
    pub async fn cancel_lesson(&self, owner_id: Uuid, lesson_id: Uuid) -> Result<Lesson> {
        let txn = self.pool.conn().begin().await?;

        let lesson = find_lesson(&txn, owner_id, lesson_id)
            .await?
            .ok_or_else(|| AppError::not_found("Lesson", lesson_id))?;
        self.close(&txn, &lesson, LessonColumn::IsCancelled).await?;
        self.credit(&txn, owner_id, lesson.student_id, 1).await?;

        txn.commit().await?;
        counter!(names::LESSONS_CANCELLED).increment(1);
        info!(lesson_id = %lesson.id, student_id = %lesson.student_id, "Lesson cancelled, credit refunded");
        Ok(Lesson {
            is_cancelled: true,
            ..lesson
        })
    }

    /// Create a subscription contract and add its lesson block to the
    /// student's lifetime and remaining counters, atomically.
    pub async fn grant_subscription(
        &self,
        owner_id: Uuid,
        new: NewSubscription,
    ) -> Result<Subscription> {
        if new.lessons_count < 1 {
            return Err(AppError::Validation {
                message: "lessons_count must be at least 1".to_string(),
            });
        }

        let txn = self.pool.conn().begin().await?;

        let student = find_student(&txn, owner_id, new.student_id)
            .await?
            .ok_or_else(|| AppError::not_found("Student", new.student_id))?;

        let subscription = SubscriptionActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner_id),
            student_id: Set(student.id),
            lessons_count: Set(new.lessons_count),
            price: Set(new.price),
            start_date: Set(new.start_date),
            end_date: Set(new.end_date),
            notes: Set(new.notes),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&txn)
        .await?;

        let granted = txn
            .execute(Statement::from_sql_and_values(
                self.backend(),
                "UPDATE students SET total_lessons = total_lessons + $1, \
                 remaining_lessons = remaining_lessons + $2 \
                 WHERE id = $3 AND user_id = $4",
                [
                    new.lessons_count.into(),
                    new.lessons_count.into(),
                    student.id.into(),
                    owner_id.into(),
                ],
            ))
            .await?;

        if granted.rows_affected() == 0 {
            txn.rollback().await?;
            return Err(AppError::Internal {
                message: format!("student {} vanished during subscription grant", student.id),
            });
        }

        txn.commit().await?;
        counter!(names::SUBSCRIPTIONS_GRANTED).increment(1);
        info!(
            subscription_id = %subscription.id,
            student_id = %student.id,
            lessons = new.lessons_count,
            "Subscription granted"
        );
        Ok(subscription)
    }

    /// Set a terminal flag on an open lesson. The update carries the
    /// open-state predicate so a rival transition loses cleanly.
    async fn close(
        &self,
        txn: &DatabaseTransaction,
        lesson: &Lesson,
        flag: LessonColumn,
    ) -> Result<()> {
        if lesson.is_closed() {
            return Err(AppError::LessonAlreadyClosed { id: lesson.id });
        }

        let column = match flag {
            LessonColumn::IsCompleted => "is_completed",
            LessonColumn::IsCancelled => "is_cancelled",
            _ => {
                return Err(AppError::Internal {
                    message: "close() called with a non-status column".to_string(),
                })
            }
        };

        let closed = txn
            .execute(Statement::from_sql_and_values(
                self.backend(),
                format!(
                    "UPDATE lessons SET {} = TRUE \
                     WHERE id = $1 AND user_id = $2 \
                     AND NOT is_completed AND NOT is_cancelled",
                    column
                ),
                [lesson.id.into(), lesson.user_id.into()],
            ))
            .await?;

        if closed.rows_affected() == 0 {
            return Err(AppError::LessonAlreadyClosed { id: lesson.id });
        }
        Ok(())
    }

    /// Give credits back to a student's balance
    async fn credit(
        &self,
        txn: &DatabaseTransaction,
        owner_id: Uuid,
        student_id: Uuid,
        count: i32,
    ) -> Result<()> {
        let credited = txn
            .execute(Statement::from_sql_and_values(
                self.backend(),
                "UPDATE students SET remaining_lessons = remaining_lessons + $1 \
                 WHERE id = $2 AND user_id = $3",
                [count.into(), student_id.into(), owner_id.into()],
            ))
            .await?;

        if credited.rows_affected() == 0 {
            return Err(AppError::Internal {
                message: format!("student {} missing during balance refund", student_id),
            });
        }
        Ok(())
    }
}

async fn find_student(
    txn: &DatabaseTransaction,
    owner_id: Uuid,
    id: Uuid,
) -> Result<Option<Student>> {
    StudentEntity::find_by_id(id)
        .filter(StudentColumn::UserId.eq(owner_id))
        .one(txn)
        .await
        .map_err(Into::into)
}

async fn find_lesson(
    txn: &DatabaseTransaction,
    owner_id: Uuid,
    id: Uuid,
) -> Result<Option<Lesson>> {
    LessonEntity::find_by_id(id)
        .filter(LessonColumn::UserId.eq(owner_id))
        .one(txn)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewStudent, Repository};

    struct Fixture {
        repo: Repository,
        ledger: Ledger,
        owner: Uuid,
        student: Uuid,
    }

    async fn setup(balance: i32) -> Fixture {
        let pool = DbPool::new_in_memory().await.expect("test database");
        let repo = Repository::new(pool.clone());
        let ledger = Ledger::new(pool);

        let owner = repo
            .create_user("tutor".into(), "hash".into(), false)
            .await
            .expect("user")
            .id;
        let student = repo
            .create_student(
                owner,
                NewStudent {
                    first_name: "Mira".into(),
                    last_name: "Petrova".into(),
                    email: None,
                    phone: None,
                    notes: None,
                    total_lessons: balance,
                    remaining_lessons: balance,
                },
            )
            .await
            .expect("student")
            .id;

        Fixture {
            repo,
            ledger,
            owner,
            student,
        }
    }

    fn new_lesson(student_id: Uuid) -> NewLesson {
        NewLesson {
            student_id,
            date: Utc::now().fixed_offset(),
            duration_minutes: 60,
            notes: None,
        }
    }

    async fn balance(fx: &Fixture) -> i32 {
        fx.repo
            .find_student(fx.owner, fx.student)
            .await
            .unwrap()
            .unwrap()
            .remaining_lessons
    }

    #[tokio::test]
    async fn test_schedule_fails_at_zero_balance_and_changes_nothing() {
        let fx = setup(0).await;

        let err = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { .. }));

        assert_eq!(balance(&fx).await, 0);
        let lessons = fx.repo.list_lessons(fx.owner, 0, 100).await.unwrap();
        assert!(lessons.is_empty());
    }

    #[tokio::test]
    async fn test_balance_of_n_allows_exactly_n_lessons() {
        let fx = setup(3).await;

        for expected in (0..3).rev() {
            fx.ledger
                .schedule_lesson(fx.owner, new_lesson(fx.student))
                .await
                .unwrap();
            assert_eq!(balance(&fx).await, expected);
        }

        let err = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { .. }));
        assert_eq!(balance(&fx).await, 0);
    }

    #[tokio::test]
    async fn test_remove_refunds_from_any_state() {
        let fx = setup(3).await;

        let pending = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap();
        let completed = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap();
        fx.ledger
            .complete_lesson(fx.owner, completed.id)
            .await
            .unwrap();
        assert_eq!(balance(&fx).await, 1);

        fx.ledger.remove_lesson(fx.owner, pending.id).await.unwrap();
        assert_eq!(balance(&fx).await, 2);

        fx.ledger
            .remove_lesson(fx.owner, completed.id)
            .await
            .unwrap();
        assert_eq!(balance(&fx).await, 3);
    }

    #[tokio::test]
    async fn test_complete_twice_fails() {
        let fx = setup(1).await;

        let lesson = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap();

        let done = fx.ledger.complete_lesson(fx.owner, lesson.id).await.unwrap();
        assert!(done.is_completed);

        let err = fx
            .ledger
            .complete_lesson(fx.owner, lesson.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LessonAlreadyClosed { .. }));
    }

    #[tokio::test]
    async fn test_cancel_refunds_and_is_terminal() {
        let fx = setup(1).await;

        let lesson = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap();
        assert_eq!(balance(&fx).await, 0);

        let cancelled = fx.ledger.cancel_lesson(fx.owner, lesson.id).await.unwrap();
        assert!(cancelled.is_cancelled);
        assert_eq!(balance(&fx).await, 1);

        // Neither transition leaves a terminal state
        let err = fx
            .ledger
            .complete_lesson(fx.owner, lesson.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LessonAlreadyClosed { .. }));
        let err = fx
            .ledger
            .cancel_lesson(fx.owner, lesson.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LessonAlreadyClosed { .. }));
        // The losing transitions refunded nothing
        assert_eq!(balance(&fx).await, 1);
    }

    #[tokio::test]
    async fn test_grant_subscription_raises_both_counters() {
        let fx = setup(2).await;

        let start = Utc::now().fixed_offset();
        fx.ledger
            .grant_subscription(
                fx.owner,
                NewSubscription {
                    student_id: fx.student,
                    lessons_count: 10,
                    price: 12000,
                    start_date: start,
                    end_date: start + chrono::Duration::days(30),
                    notes: None,
                },
            )
            .await
            .unwrap();

        let student = fx
            .repo
            .find_student(fx.owner, fx.student)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(student.total_lessons, 12);
        assert_eq!(student.remaining_lessons, 12);
    }

    #[tokio::test]
    async fn test_grant_subscription_missing_student() {
        let fx = setup(0).await;
        let start = Utc::now().fixed_offset();

        let err = fx
            .ledger
            .grant_subscription(
                fx.owner,
                NewSubscription {
                    student_id: Uuid::new_v4(),
                    lessons_count: 5,
                    price: 6000,
                    start_date: start,
                    end_date: start + chrono::Duration::days(30),
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let subscriptions = fx.repo.list_subscriptions(fx.owner, 0, 100).await.unwrap();
        assert!(subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_cross_user_access_is_not_found() {
        let fx = setup(2).await;
        let stranger = fx
            .repo
            .create_user("stranger".into(), "hash".into(), false)
            .await
            .unwrap()
            .id;

        let err = fx
            .ledger
            .schedule_lesson(stranger, new_lesson(fx.student))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        let lesson = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap();
        let err = fx
            .ledger
            .complete_lesson(stranger, lesson.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
        let err = fx
            .ledger
            .remove_lesson(stranger, lesson.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_scripted_consumption_scenario() {
        // Balance 2: schedule L1 -> 1, schedule L2 -> 0, L3 fails,
        // delete L1 -> 1, complete L2 -> still 1.
        let fx = setup(2).await;

        let l1 = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap();
        assert_eq!(balance(&fx).await, 1);

        let l2 = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap();
        assert_eq!(balance(&fx).await, 0);

        let err = fx
            .ledger
            .schedule_lesson(fx.owner, new_lesson(fx.student))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientBalance { .. }));
        assert_eq!(balance(&fx).await, 0);

        fx.ledger.remove_lesson(fx.owner, l1.id).await.unwrap();
        assert_eq!(balance(&fx).await, 1);

        let done = fx.ledger.complete_lesson(fx.owner, l2.id).await.unwrap();
        assert!(done.is_completed);
        assert_eq!(balance(&fx).await, 1);
    }
}
