use chrono::{
  NaiveDate,
  NaiveDateTime
};
use tracing::{
  debug,
  info,
  warn
};

use crate::datastore::TaskStorage;
use crate::datetime::Clock;
use crate::error::PlannerError;
use crate::task::{
  Category,
  Task,
  TaskId,
  TaskPatch
};

/// Immutable view of the collection at
/// one version. Mutations build a new
/// set; an old one held by a caller
/// never changes underneath it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSet {
  version: u64,
  tasks:   Vec<Task>
}

impl TaskSet {
  pub fn new(tasks: Vec<Task>) -> Self {
    Self {
      version: 0,
      tasks
    }
  }

  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  pub fn get(
    &self,
    id: &TaskId
  ) -> Option<&Task> {
    self
      .tasks
      .iter()
      .find(|task| &task.id == id)
  }

  fn successor(
    &self,
    tasks: Vec<Task>
  ) -> Self {
    Self {
      version: self.version + 1,
      tasks
    }
  }
}

/// Result of a mutation. The mutation
/// itself always stands; `warning`
/// carries a persistence failure.
#[derive(Debug)]
#[must_use]
pub struct Outcome<T> {
  pub value:   T,
  pub warning: Option<PlannerError>
}

pub struct TaskStore<S, C> {
  storage:         S,
  clock:           C,
  current:         TaskSet,
  dropped_on_load: usize
}

impl<S, C> TaskStore<S, C>
where
  S: TaskStorage,
  C: Clock
{
  /// Loads the persisted collection.
  /// Bad records are dropped; only an
  /// unreadable backend is an error.
  #[tracing::instrument(skip_all)]
  pub fn open(
    storage: S,
    clock: C
  ) -> anyhow::Result<Self> {
    let report = storage.load()?;
    if report.dropped > 0 {
      warn!(
        dropped = report.dropped,
        "some stored tasks could not be read"
      );
    }
    info!(
      tasks = report.tasks.len(),
      "task store opened"
    );
    Ok(Self {
      storage,
      clock,
      current: TaskSet::new(
        report.tasks
      ),
      dropped_on_load: report.dropped
    })
  }

  pub fn snapshot(&self) -> &TaskSet {
    &self.current
  }

  pub fn tasks(&self) -> &[Task] {
    self.current.tasks()
  }

  pub fn version(&self) -> u64 {
    self.current.version()
  }

  pub fn dropped_on_load(&self) -> usize {
    self.dropped_on_load
  }

  pub fn clock(&self) -> &C {
    &self.clock
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn get(
    &self,
    id: &TaskId
  ) -> Option<&Task> {
    self.current.get(id)
  }

  /// Exact id, else a unique id prefix.
  pub fn resolve(
    &self,
    prefix: &str
  ) -> Result<&Task, PlannerError> {
    let needle = prefix.trim();
    if needle.is_empty() {
      return Err(
        PlannerError::Validation(
          "task id cannot be empty"
            .to_string()
        )
      );
    }
    if let Some(task) = self
      .tasks()
      .iter()
      .find(|task| {
        task.id.as_str() == needle
      })
    {
      return Ok(task);
    }

    let mut matches = self
      .tasks()
      .iter()
      .filter(|task| {
        task.id.as_str().starts_with(needle)
      });
    match (matches.next(), matches.next())
    {
      | (Some(task), None) => Ok(task),
      | (None, _) => Err(
        PlannerError::NotFound(
          needle.to_string()
        )
      ),
      | (Some(_), Some(_)) => {
        Err(PlannerError::Validation(
          format!(
            "task id prefix {needle:?} \
             is ambiguous"
          )
        ))
      }
    }
  }

  #[tracing::instrument(skip(self, name), fields(category = %category))]
  pub fn create(
    &mut self,
    name: &str,
    category: Category,
    start_date: NaiveDateTime,
    end_date: NaiveDateTime
  ) -> Result<Outcome<Task>, PlannerError>
  {
    if name.trim().is_empty() {
      return Err(
        PlannerError::Validation(
          "task name cannot be empty"
            .to_string()
        )
      );
    }
    if start_date > end_date {
      debug!(
        %start_date,
        %end_date,
        "creating task with reversed range"
      );
    }

    let task = Task {
      id: TaskId::generate(),
      name: name.to_string(),
      category,
      start_date,
      end_date,
      created_at: self.clock.now()
    };

    let mut tasks =
      self.current.tasks().to_vec();
    tasks.push(task.clone());
    let warning = self.commit(tasks);

    info!(id = %task.id, "task created");
    Ok(Outcome {
      value: task,
      warning
    })
  }

  /// Merges `patch` into the task with
  /// `id`. Unknown ids and patches that
  /// change nothing are a silent no-op
  /// (`value == false`).
  #[tracing::instrument(skip(self, patch), fields(id = %id))]
  pub fn update(
    &mut self,
    id: &TaskId,
    patch: &TaskPatch
  ) -> Outcome<bool> {
    let Some(idx) = self
      .current
      .tasks()
      .iter()
      .position(|task| &task.id == id)
    else {
      debug!("update ignored; unknown id");
      return Outcome {
        value:   false,
        warning: None
      };
    };

    let updated =
      self.current.tasks()[idx].apply(patch);
    if updated == self.current.tasks()[idx]
    {
      debug!("update ignored; nothing changed");
      return Outcome {
        value:   false,
        warning: None
      };
    }

    let mut tasks =
      self.current.tasks().to_vec();
    tasks[idx] = updated;
    let warning = self.commit(tasks);
    Outcome {
      value: true,
      warning
    }
  }

  pub fn move_task(
    &mut self,
    id: &TaskId,
    start_date: NaiveDateTime,
    end_date: NaiveDateTime
  ) -> Outcome<bool> {
    self.update(
      id,
      &TaskPatch::dates(
        start_date, end_date
      )
    )
  }

  pub fn resize_task(
    &mut self,
    id: &TaskId,
    start_date: NaiveDateTime,
    end_date: NaiveDateTime
  ) -> Outcome<bool> {
    self.update(
      id,
      &TaskPatch::dates(
        start_date, end_date
      )
    )
  }

  /// Drop-on-day move: the task starts
  /// on `target` at its old
  /// time-of-day and keeps its length.
  /// A shifted end past the calendar's
  /// range leaves the task untouched.
  pub fn move_to_day(
    &mut self,
    id: &TaskId,
    target: NaiveDate
  ) -> Outcome<bool> {
    let Some(task) = self.get(id) else {
      debug!(id = %id, "move ignored; unknown id");
      return Outcome {
        value:   false,
        warning: None
      };
    };
    let span =
      task.end_date - task.start_date;
    let start = target
      .and_time(task.start_date.time());
    let Some(end) =
      start.checked_add_signed(span)
    else {
      warn!(
        id = %id,
        %target,
        "move ignored; shifted end is out of range"
      );
      return Outcome {
        value:   false,
        warning: None
      };
    };
    self.move_task(id, start, end)
  }

  #[tracing::instrument(skip(self), fields(id = %id))]
  pub fn delete(
    &mut self,
    id: &TaskId
  ) -> Outcome<bool> {
    let before = self.current.len();
    let tasks: Vec<Task> = self
      .current
      .tasks()
      .iter()
      .filter(|task| &task.id != id)
      .cloned()
      .collect();

    if tasks.len() == before {
      debug!("delete ignored; unknown id");
      return Outcome {
        value:   false,
        warning: None
      };
    }

    let warning = self.commit(tasks);
    info!("task deleted");
    Outcome {
      value: true,
      warning
    }
  }

  #[tracing::instrument(skip(self))]
  pub fn clear_all(
    &mut self
  ) -> Outcome<usize> {
    let removed = self.current.len();
    let warning =
      self.commit(Vec::new());
    info!(removed, "cleared all tasks");
    Outcome {
      value: removed,
      warning
    }
  }

  fn commit(
    &mut self,
    tasks: Vec<Task>
  ) -> Option<PlannerError> {
    self.current =
      self.current.successor(tasks);
    debug!(
      version = self.current.version(),
      count = self.current.len(),
      "task set replaced"
    );

    match self
      .storage
      .save(self.current.tasks())
    {
      | Ok(()) => None,
      | Err(err) => {
        warn!(
          error = %format!("{err:#}"),
          "persisting tasks failed; keeping in-memory state"
        );
        Some(PlannerError::storage(&err))
      }
    }
  }
}
