use std::cell::{
  Cell,
  RefCell
};
use std::fs;
use std::io::{
  BufRead,
  BufReader,
  Write
};
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tempfile::NamedTempFile;
use tracing::{
  debug,
  info,
  warn
};

use crate::task::{
  Task,
  TaskRecord
};

/// What `load` produced: the tasks
/// that survived parsing plus how many
/// records were dropped.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
  pub tasks:   Vec<Task>,
  pub dropped: usize
}

/// Storage collaborator. `load` runs
/// once per session, `save` after every
/// mutation.
pub trait TaskStorage {
  fn load(
    &self
  ) -> anyhow::Result<LoadReport>;

  fn save(
    &self,
    tasks: &[Task]
  ) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct FileStorage {
  pub data_dir:   PathBuf,
  pub tasks_path: PathBuf
}

impl FileStorage {
  #[tracing::instrument(skip(data_dir))]
  pub fn open(
    data_dir: &Path
  ) -> anyhow::Result<Self> {
    let data_dir =
      data_dir.to_path_buf();
    fs::create_dir_all(&data_dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          data_dir.display()
        )
      })?;

    let tasks_path =
      data_dir.join("tasks.data");
    if !tasks_path.exists() {
      fs::write(&tasks_path, "")?;
    }

    info!(
      data_dir = %data_dir.display(),
      tasks = %tasks_path.display(),
      "opened datastore"
    );

    Ok(Self {
      data_dir,
      tasks_path
    })
  }
}

impl TaskStorage for FileStorage {
  #[tracing::instrument(skip(self))]
  fn load(
    &self
  ) -> anyhow::Result<LoadReport> {
    let file =
      fs::File::open(&self.tasks_path)
        .with_context(|| {
          format!(
            "failed to open {}",
            self.tasks_path.display()
          )
        })?;
    let mut lines = Vec::new();
    for line in
      BufReader::new(file).lines()
    {
      lines.push(line.with_context(
        || {
          format!(
            "failed reading {}",
            self.tasks_path.display()
          )
        }
      )?);
    }
    Ok(decode_lines(
      &self.tasks_path.display().to_string(),
      lines.iter().map(String::as_str)
    ))
  }

  #[tracing::instrument(skip(self, tasks))]
  fn save(
    &self,
    tasks: &[Task]
  ) -> anyhow::Result<()> {
    save_jsonl_atomic(
      &self.tasks_path,
      tasks
    )
    .context("failed to save tasks.data")
  }
}

/// In-process backend using the same
/// line codec as the file backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  lines:      RefCell<Vec<String>>,
  fail_saves: Cell<bool>,
  saves:      Cell<usize>
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seeds raw lines, e.g. records
  /// written by an older build.
  pub fn with_lines<I, S>(
    lines: I
  ) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>
  {
    let storage = Self::default();
    storage.lines.replace(
      lines
        .into_iter()
        .map(Into::into)
        .collect()
    );
    storage
  }

  pub fn set_fail_saves(
    &self,
    fail: bool
  ) {
    self.fail_saves.set(fail);
  }

  pub fn save_count(&self) -> usize {
    self.saves.get()
  }

  pub fn lines(&self) -> Vec<String> {
    self.lines.borrow().clone()
  }
}

impl TaskStorage for MemoryStorage {
  fn load(
    &self
  ) -> anyhow::Result<LoadReport> {
    let lines = self.lines.borrow();
    Ok(decode_lines(
      "memory",
      lines.iter().map(String::as_str)
    ))
  }

  fn save(
    &self,
    tasks: &[Task]
  ) -> anyhow::Result<()> {
    if self.fail_saves.get() {
      return Err(anyhow!(
        "memory storage rejected write"
      ));
    }
    let encoded = encode_tasks(tasks)?;
    self.lines.replace(encoded);
    self
      .saves
      .set(self.saves.get() + 1);
    Ok(())
  }
}

fn encode_tasks(
  tasks: &[Task]
) -> anyhow::Result<Vec<String>> {
  tasks
    .iter()
    .map(|task| {
      serde_json::to_string(
        &task.to_record()
      )
      .with_context(|| {
        format!(
          "failed to encode task {}",
          task.id
        )
      })
    })
    .collect()
}

fn decode_lines<'a>(
  source: &str,
  lines: impl Iterator<Item = &'a str>
) -> LoadReport {
  debug!(source, "decoding task records");
  let mut report = LoadReport::default();

  for (idx, line) in lines.enumerate() {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let record = match serde_json::from_str::<
      TaskRecord,
    >(trimmed)
    {
      | Ok(record) => record,
      | Err(err) => {
        warn!(
          source,
          line = idx + 1,
          error = %err,
          "dropping malformed task record"
        );
        report.dropped += 1;
        continue;
      }
    };

    match Task::try_from(record) {
      | Ok(task) => report.tasks.push(task),
      | Err(err) => {
        warn!(
          source,
          line = idx + 1,
          error = %err,
          "dropping task record with invalid date"
        );
        report.dropped += 1;
      }
    }
  }

  debug!(
    count = report.tasks.len(),
    dropped = report.dropped,
    "loaded task records"
  );
  report
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(
  path: &Path,
  tasks: &[Task]
) -> anyhow::Result<()> {
  debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

  let dir = path
    .parent()
    .unwrap_or_else(|| Path::new("."));
  let mut temp =
    NamedTempFile::new_in(dir)?;
  for line in encode_tasks(tasks)? {
    writeln!(temp, "{line}")?;
  }
  temp.flush()?;

  temp.persist(path).map_err(|err| {
    anyhow!(
      "failed to persist {}: {}",
      path.display(),
      err
    )
  })?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use tempfile::tempdir;

  use super::{
    FileStorage,
    MemoryStorage,
    TaskStorage
  };
  use crate::task::{
    Category,
    Task,
    TaskId
  };

  fn task(
    id: &str,
    day: u32
  ) -> Task {
    let date = NaiveDate::from_ymd_opt(
      2024, 6, day
    )
    .expect("valid date");
    Task {
      id:         TaskId::from(id),
      name:       format!("task {id}"),
      category:   Category::Review,
      start_date: date
        .and_hms_opt(0, 0, 0)
        .expect("valid time"),
      end_date:   date
        .and_hms_opt(10, 30, 0)
        .expect("valid time"),
      created_at: date
        .and_hms_opt(7, 0, 0)
        .expect("valid time")
    }
  }

  #[test]
  fn file_storage_roundtrip() {
    let temp =
      tempdir().expect("tempdir");
    let storage =
      FileStorage::open(temp.path())
        .expect("open storage");
    assert!(
      storage
        .load()
        .expect("load empty")
        .tasks
        .is_empty()
    );

    let tasks =
      vec![task("a", 1), task("b", 2)];
    storage
      .save(&tasks)
      .expect("save tasks");

    let report =
      storage.load().expect("load");
    assert_eq!(report.tasks, tasks);
    assert_eq!(report.dropped, 0);
  }

  #[test]
  fn bad_records_are_dropped_individually(
  ) {
    let good = serde_json::to_string(
      &task("ok", 3).to_record()
    )
    .expect("encode");
    let storage =
      MemoryStorage::with_lines([
        good.as_str(),
        r#"{"id":"x","name":"x","category":"To-Do","startDate":"garbage","endDate":"2024-06-01","createdAt":"2024-06-01"}"#,
        r#"{"id":"y","name":"y","category":"Someday","startDate":"2024-06-01","endDate":"2024-06-01","createdAt":"2024-06-01"}"#,
        "{not json",
        ""
      ]);

    let report =
      storage.load().expect("load");
    assert_eq!(report.tasks.len(), 1);
    assert_eq!(
      report.tasks[0].id,
      TaskId::from("ok")
    );
    assert_eq!(report.dropped, 3);
  }

  #[test]
  fn memory_storage_can_fail_saves() {
    let storage = MemoryStorage::new();
    storage.set_fail_saves(true);
    assert!(
      storage
        .save(&[task("a", 1)])
        .is_err()
    );
    assert_eq!(storage.save_count(), 0);
    storage.set_fail_saves(false);
    storage
      .save(&[task("a", 1)])
      .expect("save");
    assert_eq!(storage.save_count(), 1);
    assert_eq!(storage.lines().len(), 1);
  }
}
