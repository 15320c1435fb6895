use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

use crate::datetime::{
  format_persisted,
  parse_date
};
use crate::error::PlannerError;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash
)]
pub enum Category {
  #[serde(rename = "To-Do")]
  ToDo,
  #[serde(rename = "In Progress")]
  InProgress,
  #[serde(rename = "Review")]
  Review,
  #[serde(rename = "Completed")]
  Completed
}

impl Category {
  pub const ALL: [Category; 4] = [
    Category::ToDo,
    Category::InProgress,
    Category::Review,
    Category::Completed
  ];

  pub fn label(self) -> &'static str {
    match self {
      | Category::ToDo => "To-Do",
      | Category::InProgress => {
        "In Progress"
      }
      | Category::Review => "Review",
      | Category::Completed => {
        "Completed"
      }
    }
  }
}

impl fmt::Display for Category {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.label())
  }
}

impl FromStr for Category {
  type Err = PlannerError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let normalized: String = s
      .trim()
      .chars()
      .filter(|c| c.is_alphanumeric())
      .collect::<String>()
      .to_ascii_lowercase();
    match normalized.as_str() {
      | "todo" => Ok(Category::ToDo),
      | "inprogress" | "doing" => {
        Ok(Category::InProgress)
      }
      | "review" => Ok(Category::Review),
      | "completed" | "done" => {
        Ok(Category::Completed)
      }
      | _ => {
        Err(PlannerError::Validation(
          format!(
            "unknown category: {s}"
          )
        ))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize
)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
  pub fn generate() -> Self {
    Self(Uuid::new_v4().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for TaskId {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl fmt::Display for TaskId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// One plannable work item. The
/// `start_date <= end_date` ordering
/// is not enforced here; range
/// consumers tolerate either order.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct Task {
  pub id:         TaskId,
  pub name:       String,
  pub category:   Category,
  pub start_date: NaiveDateTime,
  pub end_date:   NaiveDateTime,
  pub created_at: NaiveDateTime
}

/// Fields an update may replace. `id`
/// and `created_at` are deliberately
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
  pub name:       Option<String>,
  pub category:   Option<Category>,
  pub start_date: Option<NaiveDateTime>,
  pub end_date:   Option<NaiveDateTime>
}

impl TaskPatch {
  pub fn dates(
    start_date: NaiveDateTime,
    end_date: NaiveDateTime
  ) -> Self {
    Self {
      start_date: Some(start_date),
      end_date: Some(end_date),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    self.name.is_none()
      && self.category.is_none()
      && self.start_date.is_none()
      && self.end_date.is_none()
  }
}

impl Task {
  pub fn apply(
    &self,
    patch: &TaskPatch
  ) -> Task {
    let mut next = self.clone();
    if let Some(name) = &patch.name {
      if name.trim().is_empty() {
        tracing::warn!(
          id = %self.id,
          "ignoring blank name in task update"
        );
      } else {
        next.name = name.clone();
      }
    }
    if let Some(category) =
      patch.category
    {
      next.category = category;
    }
    if let Some(start) =
      patch.start_date
    {
      next.start_date = start;
    }
    if let Some(end) = patch.end_date {
      next.end_date = end;
    }
    next
  }

  pub fn to_record(
    &self
  ) -> TaskRecord {
    TaskRecord {
      id:         self.id.clone(),
      name:       self.name.clone(),
      category:   self.category,
      start_date: format_persisted(
        self.start_date
      ),
      end_date:   format_persisted(
        self.end_date
      ),
      created_at: format_persisted(
        self.created_at
      )
    }
  }
}

/// Persisted shape of a task: dates
/// travel as ISO-8601 strings and are
/// parsed back individually so one bad
/// record can be dropped on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
  pub id:         TaskId,
  pub name:       String,
  pub category:   Category,
  pub start_date: String,
  pub end_date:   String,
  pub created_at: String
}

impl TryFrom<TaskRecord> for Task {
  type Error = PlannerError;

  fn try_from(
    record: TaskRecord
  ) -> Result<Self, Self::Error> {
    Ok(Task {
      start_date: parse_date(
        &record.start_date
      )?,
      end_date:   parse_date(
        &record.end_date
      )?,
      created_at: parse_date(
        &record.created_at
      )?,
      id:         record.id,
      name:       record.name,
      category:   record.category
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    Category,
    Task,
    TaskId,
    TaskPatch,
    TaskRecord
  };
  use crate::error::PlannerError;

  fn sample() -> Task {
    let day = NaiveDate::from_ymd_opt(
      2024, 6, 1
    )
    .expect("valid date");
    Task {
      id:         TaskId::from("t-1"),
      name:       "Plan sprint"
        .to_string(),
      category:   Category::ToDo,
      start_date: day
        .and_hms_opt(9, 0, 0)
        .expect("valid time"),
      end_date:   day
        .and_hms_opt(17, 0, 0)
        .expect("valid time"),
      created_at: day
        .and_hms_opt(8, 0, 0)
        .expect("valid time")
    }
  }

  #[test]
  fn category_parses_loose_spellings() {
    assert_eq!(
      "To-Do"
        .parse::<Category>()
        .expect("to-do"),
      Category::ToDo
    );
    assert_eq!(
      "in progress"
        .parse::<Category>()
        .expect("in progress"),
      Category::InProgress
    );
    assert_eq!(
      "DONE"
        .parse::<Category>()
        .expect("done"),
      Category::Completed
    );
    assert!(
      "someday"
        .parse::<Category>()
        .is_err()
    );
  }

  #[test]
  fn record_uses_camel_case_and_labels()
  {
    let json = serde_json::to_string(
      &sample().to_record()
    )
    .expect("serialize");
    assert!(json.contains(
      "\"startDate\":\"2024-06-01T09:00:00\""
    ));
    assert!(json.contains(
      "\"category\":\"To-Do\""
    ));
    assert!(
      json.contains("\"createdAt\"")
    );
  }

  #[test]
  fn record_with_bad_date_is_rejected() {
    let mut record = sample().to_record();
    record.end_date =
      "31/31/2024".to_string();
    let err = Task::try_from(record)
      .expect_err("bad date");
    assert!(matches!(
      err,
      PlannerError::InvalidDate { .. }
    ));
  }

  #[test]
  fn record_accepts_utc_offsets() {
    let record = TaskRecord {
      start_date:
        "2024-06-01T00:00:00.000Z"
          .to_string(),
      ..sample().to_record()
    };
    assert!(
      Task::try_from(record).is_ok()
    );
  }

  #[test]
  fn patch_keeps_name_when_blank() {
    let task = sample();
    let patched =
      task.apply(&TaskPatch {
        name: Some("   ".to_string()),
        category: Some(
          Category::Review
        ),
        ..TaskPatch::default()
      });
    assert_eq!(patched.name, task.name);
    assert_eq!(
      patched.category,
      Category::Review
    );
    assert_eq!(patched.id, task.id);
    assert_eq!(
      patched.created_at,
      task.created_at
    );
  }
}
