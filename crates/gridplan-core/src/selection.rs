use chrono::NaiveDate;

use crate::daterange::{
  DaysBetween,
  days_between,
  is_date_within_range
};

/// Provisional day range while the user
/// drags across the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DragSelection {
  pub start_date:   Option<NaiveDate>,
  pub end_date:     Option<NaiveDate>,
  pub is_selecting: bool
}

impl DragSelection {
  pub fn start(
    &mut self,
    day: NaiveDate
  ) {
    *self = Self {
      start_date:   Some(day),
      end_date:     Some(day),
      is_selecting: true
    };
  }

  /// Ignored unless a drag is in
  /// progress.
  pub fn update(
    &mut self,
    day: NaiveDate
  ) {
    if self.is_selecting {
      self.end_date = Some(day);
    }
  }

  /// Commits the range exactly as
  /// dragged (it may run backwards) and
  /// resets the selection.
  pub fn end(
    &mut self
  ) -> Option<(NaiveDate, NaiveDate)> {
    let committed =
      self.start_date.zip(self.end_date);
    *self = Self::default();
    committed
  }

  pub fn cancel(&mut self) {
    *self = Self::default();
  }

  pub fn days(
    &self
  ) -> Option<DaysBetween> {
    let (start, end) =
      self.start_date.zip(self.end_date)?;
    Some(days_between(start, end))
  }

  pub fn contains(
    &self,
    day: NaiveDate
  ) -> bool {
    match self.start_date.zip(self.end_date)
    {
      | Some((start, end)) => {
        is_date_within_range(
          day, start, end
        )
      }
      | None => false
    }
  }
}
