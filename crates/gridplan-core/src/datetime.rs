//! Clock, project timezone and date
//! input.
//!
//! The CLI parses every date strictly
//! through `parse_date_expr`.
//! `parse_date_or` is library API for
//! front ends that pre-fill an edit
//! form from the task's current dates
//! and keep them when the typed value
//! does not parse.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::error::PlannerError;

const TIMEZONE_CONFIG_FILE: &str =
  "gridplan-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "GRIDPLAN_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "GRIDPLAN_TIME_CONFIG";

/// Wire format for persisted
/// wall-clock timestamps.
pub const PERSISTED_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Source of "now" for every
/// computation that needs it. Values
/// are wall-clock times in the project
/// timezone.
pub trait Clock {
  fn now(&self) -> NaiveDateTime;

  fn today(&self) -> NaiveDate {
    self.now().date()
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> NaiveDateTime {
    Utc::now()
      .with_timezone(project_timezone())
      .naive_local()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
  fn now(&self) -> NaiveDateTime {
    self.0
  }
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no project timezone configured; \
     using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn format_persisted(
  value: NaiveDateTime
) -> String {
  value
    .format(PERSISTED_FORMAT)
    .to_string()
}

/// Parses a stored or typed absolute
/// timestamp. Offset-bearing values
/// are moved into the project
/// timezone; bare dates land on
/// midnight.
pub fn parse_date(
  input: &str
) -> Result<NaiveDateTime, PlannerError>
{
  let token = input.trim();
  if token.is_empty() {
    return Err(
      PlannerError::invalid_date(
        input,
        "empty date"
      )
    );
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      token,
      PERSISTED_FORMAT
    )
  {
    return Ok(ndt);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(
      dt.with_timezone(
        project_timezone()
      )
      .naive_local()
    );
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(
      date.and_time(NaiveTime::MIN)
    );
  }

  for fmt in
    ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
  {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(ndt);
    }
  }

  Err(PlannerError::invalid_date(
    input,
    "expected YYYY-MM-DD, \
     YYYY-MM-DDTHH:MM[:SS[.f]] or \
     RFC3339"
  ))
}

/// Parses user date input, including
/// relative forms resolved against
/// `now`.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: NaiveDateTime
) -> Result<NaiveDateTime, PlannerError>
{
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = now.date();

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return Ok(
        today.and_time(NaiveTime::MIN)
      );
    }
    | "tomorrow" => {
      return Ok(
        add_days(today, 1)
          .and_time(NaiveTime::MIN)
      );
    }
    | "yesterday" => {
      return Ok(
        add_days(today, -1)
          .and_time(NaiveTime::MIN)
      );
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(
      next_weekday_date(
        today,
        target_weekday
      )
      .and_time(NaiveTime::MIN)
    );
  }

  if let Some(re) = relative_re()
    && let Some(caps) =
      re.captures(&lower)
  {
    let num: i64 = caps
      .name("num")
      .and_then(|m| {
        m.as_str().parse().ok()
      })
      .ok_or_else(|| {
        PlannerError::invalid_date(
          input,
          "relative amount out of range"
        )
      })?;
    let days = match caps
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("w") => num * 7,
      | _ => num
    };
    let signed = if caps
      .name("sign")
      .map(|m| m.as_str())
      == Some("-")
    {
      -days
    } else {
      days
    };
    return Ok(
      add_days(today, signed)
        .and_time(NaiveTime::MIN)
    );
  }

  parse_date(token)
}

/// Edit-form population: an
/// unparseable value falls back to
/// `default` instead of failing. Not
/// used by the CLI.
pub fn parse_date_or(
  input: &str,
  default: NaiveDateTime
) -> NaiveDateTime {
  match parse_date(input) {
    | Ok(value) => value,
    | Err(err) => {
      tracing::debug!(
        error = %err,
        fallback = %default,
        "using fallback date"
      );
      default
    }
  }
}

fn relative_re() -> Option<&'static Regex>
{
  static RELATIVE_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  RELATIVE_RE
    .get_or_init(|| {
      Regex::new(
        r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$"
      )
      .ok()
    })
    .as_ref()
}

pub(crate) fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  add_days(from, delta)
}
