use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::task::{
  Category,
  Task
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStats {
  pub total:                   usize,
  pub count_by_category:
    BTreeMap<Category, usize>,
  pub completion_rate_percent: u32
}

impl Default for TaskStats {
  fn default() -> Self {
    Self {
      total:                   0,
      count_by_category:       Category::ALL
        .into_iter()
        .map(|category| (category, 0))
        .collect(),
      completion_rate_percent: 0
    }
  }
}

impl TaskStats {
  fn push(
    &mut self,
    category: Category
  ) {
    self.total =
      self.total.saturating_add(1);
    let slot = self
      .count_by_category
      .entry(category)
      .or_insert(0);
    *slot = slot.saturating_add(1);
  }

  pub fn count(
    &self,
    category: Category
  ) -> usize {
    self
      .count_by_category
      .get(&category)
      .copied()
      .unwrap_or(0)
  }
}

/// Always computed over the unfiltered
/// collection.
#[tracing::instrument(skip_all, fields(total = all_tasks.len()))]
pub fn compute_stats(
  all_tasks: &[Task]
) -> TaskStats {
  let mut stats = TaskStats::default();
  for task in all_tasks {
    stats.push(task.category);
  }
  stats.completion_rate_percent =
    completion_rate(
      stats.count(Category::Completed),
      stats.total
    );
  stats
}

/// `round(100 * completed / total)`,
/// half away from zero; `0` for an
/// empty set.
fn completion_rate(
  completed: usize,
  total: usize
) -> u32 {
  if total == 0 {
    return 0;
  }
  ((completed as f64 * 100.0
    / total as f64)
    .round()) as u32
}

/// Tasks starting at or after `now`,
/// soonest first, at most `limit`.
pub fn upcoming_tasks<'a>(
  filtered: &[&'a Task],
  now: NaiveDateTime,
  limit: usize
) -> Vec<&'a Task> {
  let mut upcoming: Vec<&Task> =
    filtered
      .iter()
      .copied()
      .filter(|task| {
        task.start_date >= now
      })
      .collect();
  upcoming
    .sort_by_key(|task| task.start_date);
  upcoming.truncate(limit);
  upcoming
}

/// Unfinished tasks whose end has
/// passed.
pub fn overdue_tasks<'a>(
  filtered: &[&'a Task],
  now: NaiveDateTime
) -> Vec<&'a Task> {
  filtered
    .iter()
    .copied()
    .filter(|task| {
      task.end_date < now
        && task.category
          != Category::Completed
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    NaiveDateTime
  };

  use super::*;
  use crate::task::TaskId;

  fn at(
    day: u32,
    h: u32
  ) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
      .expect("valid date")
      .and_hms_opt(h, 0, 0)
      .expect("valid time")
  }

  fn task(
    name: &str,
    category: Category,
    start: NaiveDateTime,
    end: NaiveDateTime
  ) -> Task {
    Task {
      id: TaskId::from(name),
      name: name.to_string(),
      category,
      start_date: start,
      end_date: end,
      created_at: at(1, 0)
    }
  }

  #[test]
  fn empty_set_has_zero_rate() {
    let stats = compute_stats(&[]);
    assert_eq!(stats.total, 0);
    assert_eq!(
      stats.completion_rate_percent,
      0
    );
    assert_eq!(
      stats.count_by_category.len(),
      4
    );
  }

  #[test]
  fn counts_sum_to_total() {
    let categories = [
      Category::ToDo,
      Category::ToDo,
      Category::InProgress,
      Category::Review,
      Category::Completed,
      Category::Completed,
      Category::Completed
    ];
    for n in 0..=categories.len() {
      let tasks: Vec<Task> = categories
        [..n]
        .iter()
        .enumerate()
        .map(|(idx, category)| {
          task(
            &format!("t{idx}"),
            *category,
            at(1, 0),
            at(1, 0)
          )
        })
        .collect();
      let stats = compute_stats(&tasks);
      assert_eq!(stats.total, n);
      assert_eq!(
        stats
          .count_by_category
          .values()
          .sum::<usize>(),
        stats.total
      );
    }
  }

  #[test]
  fn completion_rate_rounds() {
    let tasks = vec![
      task(
        "a",
        Category::Completed,
        at(1, 0),
        at(1, 0)
      ),
      task(
        "b",
        Category::ToDo,
        at(1, 0),
        at(1, 0)
      ),
      task(
        "c",
        Category::Review,
        at(1, 0),
        at(1, 0)
      ),
    ];
    // 1/3 -> 33
    assert_eq!(
      compute_stats(&tasks)
        .completion_rate_percent,
      33
    );
    // 2/3 -> 67
    let mut two = tasks.clone();
    two[1].category = Category::Completed;
    assert_eq!(
      compute_stats(&two)
        .completion_rate_percent,
      67
    );
    assert_eq!(completion_rate(1, 8), 13);
  }

  #[test]
  fn upcoming_sorted_and_limited() {
    let tasks: Vec<Task> = (0..8)
      .map(|i| {
        task(
          &format!("t{i}"),
          Category::ToDo,
          at(20 - i, 9),
          at(20 - i, 10)
        )
      })
      .collect();
    let refs: Vec<&Task> =
      tasks.iter().collect();
    let upcoming =
      upcoming_tasks(&refs, at(14, 0), 5);
    let days: Vec<u32> = upcoming
      .iter()
      .map(|task| {
        chrono::Datelike::day(
          &task.start_date
        )
      })
      .collect();
    assert_eq!(days, vec![
      14, 15, 16, 17, 18
    ]);
  }

  #[test]
  fn overdue_skips_completed() {
    let tasks = vec![
      task(
        "late",
        Category::InProgress,
        at(1, 0),
        at(2, 0)
      ),
      task(
        "done",
        Category::Completed,
        at(1, 0),
        at(2, 0)
      ),
      task(
        "future",
        Category::ToDo,
        at(9, 0),
        at(10, 0)
      ),
    ];
    let refs: Vec<&Task> =
      tasks.iter().collect();
    let overdue =
      overdue_tasks(&refs, at(5, 0));
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].name, "late");
  }
}
