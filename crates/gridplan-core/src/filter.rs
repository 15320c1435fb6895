use std::collections::{
  BTreeMap,
  BTreeSet
};
use std::fmt;
use std::str::FromStr;

use chrono::{
  Duration,
  NaiveDate,
  NaiveDateTime
};
use tracing::trace;

use crate::daterange::{
  day_ceil,
  day_floor,
  is_date_within_range,
  is_same_day,
  ranges_overlap
};
use crate::error::PlannerError;
use crate::grid::CalendarDay;
use crate::task::{
  Category,
  Task
};

/// Rolling window measured from the
/// start of today.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq
)]
pub enum TimeFilter {
  #[default]
  All,
  OneWeek,
  TwoWeeks,
  ThreeWeeks
}

impl TimeFilter {
  pub fn weeks(self) -> Option<i64> {
    match self {
      | TimeFilter::All => None,
      | TimeFilter::OneWeek => Some(1),
      | TimeFilter::TwoWeeks => Some(2),
      | TimeFilter::ThreeWeeks => {
        Some(3)
      }
    }
  }

  pub fn as_key(self) -> &'static str {
    match self {
      | TimeFilter::All => "all",
      | TimeFilter::OneWeek => "1-week",
      | TimeFilter::TwoWeeks => {
        "2-weeks"
      }
      | TimeFilter::ThreeWeeks => {
        "3-weeks"
      }
    }
  }
}

impl fmt::Display for TimeFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_key())
  }
}

impl FromStr for TimeFilter {
  type Err = PlannerError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(TimeFilter::All),
      | "1-week" | "1w" => {
        Ok(TimeFilter::OneWeek)
      }
      | "2-weeks" | "2w" => {
        Ok(TimeFilter::TwoWeeks)
      }
      | "3-weeks" | "3w" => {
        Ok(TimeFilter::ThreeWeeks)
      }
      | other => {
        Err(PlannerError::Validation(
          format!(
            "unknown time filter: \
             {other}"
          )
        ))
      }
    }
  }
}

/// Session view configuration. The
/// default shows every category over
/// all time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
  pub categories:   BTreeSet<Category>,
  pub time_filter:  TimeFilter,
  pub search_query: String
}

impl Default for FilterState {
  fn default() -> Self {
    Self {
      categories:   Category::ALL
        .into_iter()
        .collect(),
      time_filter:  TimeFilter::All,
      search_query: String::new()
    }
  }
}

impl FilterState {
  pub fn toggle_category(
    &mut self,
    category: Category
  ) {
    if !self.categories.remove(&category)
    {
      self.categories.insert(category);
    }
  }

  pub fn set_categories<I>(
    &mut self,
    categories: I
  ) where
    I: IntoIterator<Item = Category>
  {
    self.categories =
      categories.into_iter().collect();
  }

  pub fn select_all_categories(
    &mut self
  ) {
    self.set_categories(Category::ALL);
  }

  pub fn deselect_all_categories(
    &mut self
  ) {
    self.categories.clear();
  }

  pub fn set_time_filter(
    &mut self,
    time_filter: TimeFilter
  ) {
    self.time_filter = time_filter;
  }

  pub fn set_search_query(
    &mut self,
    query: impl Into<String>
  ) {
    self.search_query = query.into();
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }
}

fn filter_by_category<'a>(
  tasks: Vec<&'a Task>,
  categories: &BTreeSet<Category>
) -> Vec<&'a Task> {
  tasks
    .into_iter()
    .filter(|task| {
      categories.contains(&task.category)
    })
    .collect()
}

/// Keeps tasks overlapping
/// `[start of today, end of today + N
/// weeks]`.
pub fn filter_tasks_by_time<'a>(
  tasks: Vec<&'a Task>,
  time_filter: TimeFilter,
  now: NaiveDateTime
) -> Vec<&'a Task> {
  let Some(weeks) = time_filter.weeks()
  else {
    return tasks;
  };

  let window_start = day_floor(now);
  let window_end = day_ceil(
    window_start
      + Duration::weeks(weeks)
  );
  tasks
    .into_iter()
    .filter(|task| {
      ranges_overlap(
        task.start_date,
        task.end_date,
        window_start,
        window_end
      )
    })
    .collect()
}

/// Case-insensitive substring match on
/// the name. A blank query passes
/// everything through.
pub fn search_tasks<'a>(
  tasks: Vec<&'a Task>,
  query: &str
) -> Vec<&'a Task> {
  let needle = query.trim();
  if needle.is_empty() {
    return tasks;
  }
  let needle = needle.to_lowercase();
  tasks
    .into_iter()
    .filter(|task| {
      task
        .name
        .to_lowercase()
        .contains(&needle)
    })
    .collect()
}

/// Category, then time window, then
/// search. Order of `all_tasks` is
/// preserved.
#[tracing::instrument(skip(all_tasks, filter), fields(total = all_tasks.len()))]
pub fn compute_filtered_tasks<'a>(
  all_tasks: &'a [Task],
  filter: &FilterState,
  now: NaiveDateTime
) -> Vec<&'a Task> {
  if filter.categories.is_empty() {
    trace!("no categories selected");
    return Vec::new();
  }

  let stage =
    all_tasks.iter().collect();
  let stage = filter_by_category(
    stage,
    &filter.categories
  );
  let stage = filter_tasks_by_time(
    stage,
    filter.time_filter,
    now
  );
  let stage = search_tasks(
    stage,
    &filter.search_query
  );

  trace!(
    visible = stage.len(),
    "filtered tasks"
  );
  stage
}

/// Tasks whose day range contains
/// `day`, in input order.
pub fn compute_day_buckets<'a, I>(
  tasks: I,
  day: NaiveDate
) -> Vec<&'a Task>
where
  I: IntoIterator<Item = &'a Task>
{
  tasks
    .into_iter()
    .filter(|task| {
      is_date_within_range(
        day,
        task.start_date,
        task.end_date
      )
    })
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
  /// The task's first day; shown in
  /// full.
  Start,
  /// Any later day it spans; shown as a
  /// marker.
  Continuation
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayEntry<'a> {
  pub task: &'a Task,
  pub kind: EntryKind
}

pub fn day_entries<'a, I>(
  tasks: I,
  day: NaiveDate
) -> Vec<DayEntry<'a>>
where
  I: IntoIterator<Item = &'a Task>
{
  compute_day_buckets(tasks, day)
    .into_iter()
    .map(|task| {
      let kind = if is_same_day(
        task.start_date,
        day
      ) {
        EntryKind::Start
      } else {
        EntryKind::Continuation
      };
      DayEntry {
        task,
        kind
      }
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell<'a> {
  pub day:     CalendarDay,
  pub entries: Vec<DayEntry<'a>>
}

/// Pairs every grid cell with the
/// filtered tasks active on it.
#[tracing::instrument(skip_all, fields(cells = grid.len(), tasks = filtered.len()))]
pub fn build_month_view<'a>(
  grid: &[CalendarDay],
  filtered: &[&'a Task]
) -> Vec<DayCell<'a>> {
  grid
    .iter()
    .map(|day| {
      DayCell {
        day:     *day,
        entries: day_entries(
          filtered.iter().copied(),
          day.date
        )
      }
    })
    .collect()
}

/// Groups the filtered list by
/// category; every category is present
/// even when empty.
pub fn tasks_by_category<'a>(
  filtered: &[&'a Task]
) -> BTreeMap<Category, Vec<&'a Task>> {
  let mut grouped: BTreeMap<
    Category,
    Vec<&'a Task>
  > = Category::ALL
    .into_iter()
    .map(|category| {
      (category, Vec::new())
    })
    .collect();
  for task in filtered.iter().copied() {
    grouped
      .entry(task.category)
      .or_default()
      .push(task);
  }
  grouped
}
