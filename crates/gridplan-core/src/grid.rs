use chrono::{
  Datelike,
  NaiveDate,
  Weekday
};

use crate::datetime::add_days;
use crate::daterange::days_between;

/// One cell of a month view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDay {
  pub date:             NaiveDate,
  pub is_current_month: bool,
  pub is_today:         bool
}

pub fn parse_week_start(
  raw: &str
) -> Weekday {
  if raw
    .trim()
    .eq_ignore_ascii_case("monday")
  {
    Weekday::Mon
  } else {
    Weekday::Sun
  }
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let mut year = date.year();
  let mut month =
    date.month() as i32 + months;

  while month < 1 {
    month += 12;
    year = year.saturating_sub(1);
  }
  while month > 12 {
    month -= 12;
    year = year.saturating_add(1);
  }

  let month = month as u32;
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

pub fn next_month(
  anchor: NaiveDate
) -> NaiveDate {
  shift_months(anchor, 1)
}

pub fn previous_month(
  anchor: NaiveDate
) -> NaiveDate {
  shift_months(anchor, -1)
}

pub fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_monday()
    as i64;
  let start_idx = week_start
    .num_days_from_monday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}

pub fn end_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  add_days(
    start_of_week(day, week_start),
    6
  )
}

/// Whole weeks covering the anchor's
/// month. `today` is taken per call so
/// a regenerated grid picks up a new
/// day.
#[tracing::instrument]
pub fn generate_month_grid(
  anchor: NaiveDate,
  today: NaiveDate,
  week_start: Weekday
) -> Vec<CalendarDay> {
  let first = first_day_of_month(
    anchor.year(),
    anchor.month()
  );
  let last = last_day_of_month(
    anchor.year(),
    anchor.month()
  );
  let grid_start =
    start_of_week(first, week_start);
  let grid_end =
    end_of_week(last, week_start);

  let days: Vec<CalendarDay> =
    days_between(grid_start, grid_end)
      .map(|date| {
        CalendarDay {
          date,
          is_current_month: date
            .year()
            == anchor.year()
            && date.month()
              == anchor.month(),
          is_today: date == today
        }
      })
      .collect();

  tracing::debug!(
    cells = days.len(),
    rows = days.len() / 7,
    "generated month grid"
  );
  days
}

pub fn weeks(
  grid: &[CalendarDay]
) -> impl Iterator<Item = &[CalendarDay]>
{
  grid.chunks(7)
}

pub fn weekday_labels(
  week_start: Weekday
) -> Vec<&'static str> {
  let mut day = week_start;
  (0..7)
    .map(|_| {
      let label = match day {
        | Weekday::Mon => "Mon",
        | Weekday::Tue => "Tue",
        | Weekday::Wed => "Wed",
        | Weekday::Thu => "Thu",
        | Weekday::Fri => "Fri",
        | Weekday::Sat => "Sat",
        | Weekday::Sun => "Sun"
      };
      day = day.succ();
      label
    })
    .collect()
}

pub fn month_title(
  anchor: NaiveDate
) -> String {
  anchor.format("%B %Y").to_string()
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    NaiveDate,
    Weekday
  };

  use super::*;

  fn d(
    y: i32,
    m: u32,
    day: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day)
      .expect("valid date")
  }

  #[test]
  fn june_2024_sunday_start_has_six_rows()
  {
    let grid = generate_month_grid(
      d(2024, 6, 15),
      d(2024, 6, 10),
      Weekday::Sun
    );
    assert_eq!(grid.len(), 42);
    assert_eq!(
      grid[0].date,
      d(2024, 5, 26)
    );
    assert_eq!(
      grid[41].date,
      d(2024, 7, 6)
    );
    assert!(!grid[0].is_current_month);
    assert!(grid[6].is_current_month);
    assert!(!grid[41].is_current_month);
    let today: Vec<_> = grid
      .iter()
      .filter(|cell| cell.is_today)
      .collect();
    assert_eq!(today.len(), 1);
    assert_eq!(
      today[0].date,
      d(2024, 6, 10)
    );
  }

  #[test]
  fn february_2015_fits_four_rows() {
    let grid = generate_month_grid(
      d(2015, 2, 1),
      d(2000, 1, 1),
      Weekday::Sun
    );
    assert_eq!(grid.len(), 28);
    assert!(
      grid
        .iter()
        .all(|cell| cell.is_current_month
          && !cell.is_today)
    );
  }

  #[test]
  fn monday_start_aligns_rows() {
    let grid = generate_month_grid(
      d(2024, 6, 1),
      d(2024, 6, 1),
      Weekday::Mon
    );
    assert_eq!(grid.len(), 35);
    assert_eq!(
      grid[0].date.weekday(),
      Weekday::Mon
    );
    assert_eq!(
      grid[34].date,
      d(2024, 6, 30)
    );
    assert!(weeks(&grid).all(|row| {
      row.len() == 7
    }));
  }

  #[test]
  fn every_month_grid_is_whole_weeks() {
    for month in 1..=12 {
      let grid = generate_month_grid(
        d(2025, month, 1),
        d(2025, 1, 1),
        Weekday::Sun
      );
      assert_eq!(grid.len() % 7, 0);
      let rows = grid.len() / 7;
      assert!((4..=6).contains(&rows));
      let in_month = grid
        .iter()
        .filter(|c| c.is_current_month)
        .count() as u32;
      assert_eq!(
        in_month,
        last_day_of_month(2025, month)
          .day()
      );
    }
  }

  #[test]
  fn month_navigation_clamps_day() {
    assert_eq!(
      next_month(d(2024, 1, 31)),
      d(2024, 2, 29)
    );
    assert_eq!(
      previous_month(d(2024, 3, 31)),
      d(2024, 2, 29)
    );
    assert_eq!(
      previous_month(d(2024, 1, 15)),
      d(2023, 12, 15)
    );
    assert_eq!(
      month_title(d(2024, 6, 2)),
      "June 2024"
    );
  }

  #[test]
  fn labels_follow_week_start() {
    assert_eq!(
      weekday_labels(Weekday::Sun)[0],
      "Sun"
    );
    assert_eq!(
      weekday_labels(parse_week_start(
        "Monday"
      ))[6],
      "Sun"
    );
  }
}
