//! Day-granular date range helpers.
//!
//! Every comparison strips the
//! time-of-day first. Reversed ranges
//! are accepted and treated as if their
//! endpoints were swapped.

use std::iter::FusedIterator;

use chrono::{
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime
};

/// Anything that names a calendar day.
pub trait DayPoint {
  fn day(&self) -> NaiveDate;
}

impl DayPoint for NaiveDate {
  fn day(&self) -> NaiveDate {
    *self
  }
}

impl DayPoint for NaiveDateTime {
  fn day(&self) -> NaiveDate {
    self.date()
  }
}

impl<T: DayPoint + ?Sized> DayPoint
  for &T
{
  fn day(&self) -> NaiveDate {
    (**self).day()
  }
}

#[must_use]
pub fn day_floor(
  date: impl DayPoint
) -> NaiveDateTime {
  date.day().and_time(NaiveTime::MIN)
}

#[must_use]
pub fn day_ceil(
  date: impl DayPoint
) -> NaiveDateTime {
  // wraps to 23:59:59.999999999
  date.day().and_time(
    NaiveTime::MIN
      - Duration::nanoseconds(1)
  )
}

fn ordered(
  a: NaiveDate,
  b: NaiveDate
) -> (NaiveDate, NaiveDate) {
  if a > b { (b, a) } else { (a, b) }
}

/// Lazy, inclusive walk over calendar
/// days.
#[derive(Debug, Clone)]
pub struct DaysBetween {
  next: Option<NaiveDate>,
  last: NaiveDate
}

impl Iterator for DaysBetween {
  type Item = NaiveDate;

  fn next(
    &mut self
  ) -> Option<Self::Item> {
    let current = self.next?;
    self.next = if current < self.last
    {
      current.succ_opt()
    } else {
      None
    };
    Some(current)
  }

  fn size_hint(
    &self
  ) -> (usize, Option<usize>) {
    match self.next {
      | Some(next) => {
        let remaining = (self.last
          - next)
          .num_days()
          .max(0)
          as usize
          + 1;
        (remaining, Some(remaining))
      }
      | None => (0, Some(0))
    }
  }
}

impl ExactSizeIterator for DaysBetween {}

impl FusedIterator for DaysBetween {}

/// Days from `min(a, b)` to
/// `max(a, b)` inclusive. Swapped
/// input is not an error.
pub fn days_between(
  a: impl DayPoint,
  b: impl DayPoint
) -> DaysBetween {
  let (first, last) =
    ordered(a.day(), b.day());
  DaysBetween {
    next: Some(first),
    last
  }
}

/// True iff `date`'s day lies within
/// `[day_floor(start), day_ceil(end)]`.
pub fn is_date_within_range(
  date: impl DayPoint,
  start: impl DayPoint,
  end: impl DayPoint
) -> bool {
  let (lo, hi) =
    ordered(start.day(), end.day());
  let point = day_floor(&date);
  point >= day_floor(lo)
    && point <= day_ceil(hi)
}

/// True iff the two day-widened
/// intervals share at least one
/// instant.
pub fn ranges_overlap(
  start_a: impl DayPoint,
  end_a: impl DayPoint,
  start_b: impl DayPoint,
  end_b: impl DayPoint
) -> bool {
  let (a_lo, a_hi) =
    ordered(start_a.day(), end_a.day());
  let (b_lo, b_hi) =
    ordered(start_b.day(), end_b.day());
  day_floor(a_lo) <= day_ceil(b_hi)
    && day_ceil(a_hi) >= day_floor(b_lo)
}

pub fn is_same_day(
  a: impl DayPoint,
  b: impl DayPoint
) -> bool {
  a.day() == b.day()
}

/// `Jun 1, 2024` for a single day,
/// `Jun 1 - Jun 3, 2024` otherwise.
pub fn format_task_date_range(
  start: impl DayPoint,
  end: impl DayPoint
) -> String {
  let start = start.day();
  let end = end.day();
  if start == end {
    return start
      .format("%b %-d, %Y")
      .to_string();
  }
  format!(
    "{} - {}",
    start.format("%b %-d"),
    end.format("%b %-d, %Y")
  )
}
