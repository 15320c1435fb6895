//! `~/.gridplanrc` settings.
//!
//! The file holds `key = value` lines,
//! `#` comments and `include <path>`
//! directives. Relative includes are
//! resolved against the including
//! file. A file is read at most once
//! per load, so include cycles stop at
//! the first repeat.

use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Weekday;
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::grid::parse_week_start;

const RC_ENV_VAR: &str = "GRIDPLANRC";
const RC_FILE_NAME: &str = ".gridplanrc";
const DATA_DIR_NAME: &str = ".gridplan";

const DEFAULTS: [(&str, &str); 4] = [
  ("data.location", "~/.gridplan"),
  ("calendar.week_start", "sunday"),
  ("color", "on"),
  ("default.command", "month")
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting {
    key:   &'a str,
    value: &'a str
  }
}

/// `None` for blank and comment-only
/// lines.
fn parse_rc_line(
  raw: &str
) -> Result<Option<RcLine<'_>>, String> {
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(rest) =
    line.strip_prefix("include ")
  {
    return Ok(Some(RcLine::Include(
      rest.trim()
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      "expected `key = value` or \
       `include <path>`"
        .to_string()
    })?;
  let key = key.trim();
  if key.is_empty() {
    return Err(
      "setting has no key".to_string()
    );
  }
  Ok(Some(RcLine::Setting {
    key,
    value: value.trim()
  }))
}

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  /// Canonical paths, in load order.
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      map:          DEFAULTS
        .iter()
        .map(|(key, value)| {
          (
            key.to_string(),
            value.to_string()
          )
        })
        .collect(),
      loaded_files: Vec::new()
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "loading gridplanrc");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no gridplanrc found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Later overrides win. A leading
  /// `rc.` is dropped from each key.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .unwrap_or(&key);
      debug!(key, value = %value, "applying override");
      self.set(key, &value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn week_start(&self) -> Weekday {
    let raw = self
      .map
      .get("calendar.week_start")
      .map(String::as_str)
      .unwrap_or("sunday");
    if !matches!(
      raw.trim().to_ascii_lowercase().as_str(),
      "sunday" | "monday"
    ) {
      warn!(
        value = raw,
        "calendar.week_start must be \
         sunday or monday; using sunday"
      );
    }
    parse_week_start(raw)
  }

  fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    if !DEFAULTS
      .iter()
      .any(|(known, _)| *known == key)
    {
      debug!(key, "unrecognised config key");
    }
    trace!(key, value, "config key set");
    self
      .map
      .insert(key.to_string(), value.to_string());
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let canonical = fs::canonicalize(
      &path
    )
    .with_context(|| {
      format!(
        "failed to read {}",
        path.display()
      )
    })?;
    if self.loaded_files.contains(&canonical)
    {
      warn!(
        file = %canonical.display(),
        "rc file already loaded; skipping repeated include"
      );
      return Ok(());
    }

    let text = fs::read_to_string(
      &canonical
    )
    .with_context(|| {
      format!(
        "failed to read {}",
        canonical.display()
      )
    })?;
    self
      .loaded_files
      .push(canonical.clone());
    self.load_text(&canonical, &text)
  }

  fn load_text(
    &mut self,
    path: &Path,
    text: &str
  ) -> anyhow::Result<()> {
    let base_dir = path
      .parent()
      .unwrap_or_else(|| Path::new("."));

    for (idx, raw) in
      text.lines().enumerate()
    {
      let parsed =
        parse_rc_line(raw).map_err(
          |reason| {
            anyhow!(
              "invalid config line \
               {}:{}: {reason}",
              path.display(),
              idx + 1
            )
          }
        )?;

      match parsed {
        | None => {}
        | Some(RcLine::Setting {
          key,
          value
        }) => self.set(key, value),
        | Some(RcLine::Include(
          target
        )) => {
          let include = base_dir
            .join(expand_tilde(
              Path::new(target)
            ));
          if !include.exists() {
            warn!(
              include = %include.display(),
              "include file does not exist; skipping"
            );
            continue;
          }
          debug!(
            file = %path.display(),
            include = %include.display(),
            line = idx + 1,
            "processing include"
          );
          self.load_file(&include)?;
        }
      }
    }

    Ok(())
  }
}

/// `--data` wins over `data.location`.
/// The directory is created when
/// missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match (
    override_dir,
    cfg.get("data.location")
  ) {
    | (Some(path), _) => {
      path.to_path_buf()
    }
    | (None, Some(location)) => {
      expand_tilde(Path::new(&location))
    }
    | (None, None) => {
      dirs::home_dir()
        .map(|home| {
          home.join(DATA_DIR_NAME)
        })
        .ok_or_else(|| {
          anyhow!(
            "cannot determine home \
             directory"
          )
        })?
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

/// `--gridplanrc`, then `$GRIDPLANRC`
/// (`/dev/null` disables), then
/// `~/.gridplanrc` if present.
fn resolve_rc_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (rc_env != "/dev/null")
      .then(|| PathBuf::from(rc_env));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping gridplanrc"
    );
    return None;
  };
  let candidate = home.join(RC_FILE_NAME);
  candidate.exists().then_some(candidate)
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use chrono::Weekday;
  use tempfile::tempdir;

  use super::{
    Config,
    RcLine,
    parse_rc_line
  };

  #[test]
  fn rc_file_with_include_and_comments() {
    let temp =
      tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    fs::write(
      &extra,
      "color = off\n"
    )
    .expect("write include");
    let main = temp.path().join("main.rc");
    fs::write(
      &main,
      "# planner settings\n\
       calendar.week_start = monday  # iso\n\
       include extra.rc\n\
       \n\
       data.location = /tmp/gp\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(main.as_path()))
      .expect("load config");
    assert_eq!(cfg.week_start(), Weekday::Mon);
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("off")
    );
    assert_eq!(
      cfg.get("data.location").as_deref(),
      Some("/tmp/gp")
    );
    assert_eq!(cfg.loaded_files.len(), 2);
  }

  #[test]
  fn include_cycles_stop_at_first_repeat() {
    let temp =
      tempdir().expect("tempdir");
    let own = temp.path().join("self.rc");
    fs::write(
      &own,
      "color = off\ninclude self.rc\n"
    )
    .expect("write self rc");

    let cfg = Config::load(Some(own.as_path()))
      .expect("self include");
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("off")
    );
    assert_eq!(cfg.loaded_files.len(), 1);

    let a = temp.path().join("a.rc");
    let b = temp.path().join("b.rc");
    fs::write(
      &a,
      "include b.rc\ncolor = on\n"
    )
    .expect("write a");
    fs::write(
      &b,
      "calendar.week_start = monday\n\
       include a.rc\n"
    )
    .expect("write b");

    let cfg = Config::load(Some(a.as_path()))
      .expect("mutual include");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(cfg.week_start(), Weekday::Mon);
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("on")
    );
  }

  #[test]
  fn malformed_line_is_an_error() {
    let temp =
      tempdir().expect("tempdir");
    let main = temp.path().join("bad.rc");
    fs::write(&main, "just words\n")
      .expect("write rc");
    let err = Config::load(Some(main.as_path()))
      .expect_err("malformed");
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }

  #[test]
  fn rc_lines_parse() {
    assert_eq!(
      parse_rc_line("   # only a comment"),
      Ok(None)
    );
    assert_eq!(
      parse_rc_line("color = off # quiet"),
      Ok(Some(RcLine::Setting {
        key:   "color",
        value: "off"
      }))
    );
    assert_eq!(
      parse_rc_line("include  ~/shared.rc"),
      Ok(Some(RcLine::Include(
        "~/shared.rc"
      )))
    );
    assert!(parse_rc_line("= value").is_err());
    assert!(parse_rc_line("include ").is_err());
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    assert_eq!(cfg.week_start(), Weekday::Sun);
    cfg.apply_overrides([(
      "rc.calendar.week_start"
        .to_string(),
      "monday".to_string()
    )]);
    assert_eq!(cfg.week_start(), Weekday::Mon);

    cfg.apply_overrides([(
      "calendar.week_start".to_string(),
      "friday".to_string()
    )]);
    assert_eq!(cfg.week_start(), Weekday::Sun);
  }
}
