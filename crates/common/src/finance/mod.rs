//! Finance aggregation
//!
//! Computes, for one user and an optional inclusive date range, total
//! expenses, total incomes, net income, and per-category breakdowns.
//! Read-only and deterministic for a fixed database snapshot.

use crate::db::{DbPool, EntryFilter, Repository};
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Aggregated finance figures for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceSummary {
    pub total_expenses: i64,
    pub total_incomes: i64,
    pub net_income: i64,
    pub expenses_by_category: BTreeMap<String, i64>,
    pub incomes_by_category: BTreeMap<String, i64>,
}

/// Inclusive date range bounds for a summary
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub start: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub end: Option<chrono::DateTime<chrono::FixedOffset>>,
}

/// Finance aggregator over the entity store
#[derive(Clone)]
pub struct FinanceAggregator {
    repo: Repository,
}

impl FinanceAggregator {
    pub fn new(pool: DbPool) -> Self {
        Self {
            repo: Repository::new(pool),
        }
    }

    /// Summarize the owner's expenses and incomes within the range
    pub async fn summarize(&self, owner_id: Uuid, range: DateRange) -> Result<FinanceSummary> {
        let filter = EntryFilter {
            start_date: range.start,
            end_date: range.end,
            category: None,
            offset: 0,
            limit: None,
        };

        let expenses = self.repo.list_expenses(owner_id, &filter).await?;
        let incomes = self.repo.list_incomes(owner_id, &filter).await?;

        let (total_expenses, expenses_by_category) =
            fold_by_category(expenses.iter().map(|e| (e.category.as_str(), e.amount)));
        let (total_incomes, incomes_by_category) =
            fold_by_category(incomes.iter().map(|i| (i.category.as_str(), i.amount)));

        Ok(FinanceSummary {
            total_expenses,
            total_incomes,
            net_income: total_incomes - total_expenses,
            expenses_by_category,
            incomes_by_category,
        })
    }
}

/// Sum amounts overall and per category; ordered keys keep responses stable
fn fold_by_category<'a>(
    entries: impl Iterator<Item = (&'a str, i64)>,
) -> (i64, BTreeMap<String, i64>) {
    let mut total = 0i64;
    let mut by_category = BTreeMap::new();
    for (category, amount) in entries {
        total += amount;
        *by_category.entry(category.to_string()).or_insert(0) += amount;
    }
    (total, by_category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewEntry;
    use chrono::{DateTime, FixedOffset};

    fn at(s: &str) -> DateTime<FixedOffset> {
        s.parse().unwrap()
    }

    #[test]
    fn test_fold_by_category() {
        let entries = vec![("rent", 100), ("rent", 50), ("supplies", 30)];
        let (total, by_category) = fold_by_category(entries.into_iter());

        assert_eq!(total, 180);
        assert_eq!(by_category.get("rent"), Some(&150));
        assert_eq!(by_category.get("supplies"), Some(&30));
    }

    #[test]
    fn test_fold_empty() {
        let (total, by_category) = fold_by_category(std::iter::empty());
        assert_eq!(total, 0);
        assert!(by_category.is_empty());
    }

    #[tokio::test]
    async fn test_summary_worked_example() {
        // Expenses rent 100 + rent 50, income lessons 300 => net 150
        let pool = DbPool::new_in_memory().await.unwrap();
        let repo = Repository::new(pool.clone());
        let owner = repo
            .create_user("tutor".into(), "hash".into(), false)
            .await
            .unwrap()
            .id;

        for amount in [100, 50] {
            repo.create_expense(
                owner,
                NewEntry {
                    date: at("2025-05-10T10:00:00Z"),
                    amount,
                    category: "rent".into(),
                    description: None,
                },
            )
            .await
            .unwrap();
        }
        repo.create_income(
            owner,
            NewEntry {
                date: at("2025-05-12T10:00:00Z"),
                amount: 300,
                category: "lessons".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        let summary = FinanceAggregator::new(pool)
            .summarize(owner, DateRange::default())
            .await
            .unwrap();

        assert_eq!(summary.total_expenses, 150);
        assert_eq!(summary.total_incomes, 300);
        assert_eq!(summary.net_income, 150);
        assert_eq!(summary.expenses_by_category.get("rent"), Some(&150));
        assert_eq!(summary.incomes_by_category.get("lessons"), Some(&300));
    }

    #[tokio::test]
    async fn test_summary_respects_date_range() {
        let pool = DbPool::new_in_memory().await.unwrap();
        let repo = Repository::new(pool.clone());
        let owner = repo
            .create_user("tutor".into(), "hash".into(), false)
            .await
            .unwrap()
            .id;

        repo.create_expense(
            owner,
            NewEntry {
                date: at("2025-01-10T10:00:00Z"),
                amount: 40,
                category: "rent".into(),
                description: None,
            },
        )
        .await
        .unwrap();
        repo.create_expense(
            owner,
            NewEntry {
                date: at("2025-06-10T10:00:00Z"),
                amount: 60,
                category: "rent".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        let summary = FinanceAggregator::new(pool)
            .summarize(
                owner,
                DateRange {
                    start: Some(at("2025-06-01T00:00:00Z")),
                    end: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(summary.total_expenses, 60);
        assert_eq!(summary.net_income, -60);
    }

    #[tokio::test]
    async fn test_summary_is_per_owner() {
        let pool = DbPool::new_in_memory().await.unwrap();
        let repo = Repository::new(pool.clone());
        let a = repo
            .create_user("a".into(), "hash".into(), false)
            .await
            .unwrap()
            .id;
        let b = repo
            .create_user("b".into(), "hash".into(), false)
            .await
            .unwrap()
            .id;

        repo.create_income(
            a,
            NewEntry {
                date: at("2025-05-12T10:00:00Z"),
                amount: 500,
                category: "lessons".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        let summary = FinanceAggregator::new(pool)
            .summarize(b, DateRange::default())
            .await
            .unwrap();
        assert_eq!(summary.total_incomes, 0);
        assert!(summary.incomes_by_category.is_empty());
    }
}
