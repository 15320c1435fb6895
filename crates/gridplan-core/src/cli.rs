use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::filter::{FilterState, TimeFilter};
use crate::task::Category;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "gridplan",
    version,
    about = "Month-grid task planner",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "gridplanrc")]
    pub gridplanrc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a task.
    Add {
        #[arg(required = true, num_args = 1..)]
        name: Vec<String>,
        #[arg(long, short = 'c', default_value = "todo")]
        category: Category,
        #[arg(long, default_value = "today")]
        start: String,
        /// Defaults to the start.
        #[arg(long)]
        end: Option<String>,
    },
    /// Change fields of an existing task.
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, short = 'c')]
        category: Option<Category>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Move a task onto another day, keeping its length.
    Move { id: String, day: String },
    /// Replace both ends of a task's range.
    Resize {
        id: String,
        start: String,
        end: String,
    },
    Delete {
        id: String,
    },
    /// Remove every task.
    Clear,
    List {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Tasks active on a single day.
    Day {
        #[arg(default_value = "today")]
        date: String,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Render the month grid around ANCHOR.
    Month {
        anchor: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    Stats,
    Upcoming {
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[command(flatten)]
        filters: FilterArgs,
    },
    Overdue {
        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Show only these categories (repeatable).
    #[arg(long = "category", short = 'c', action = ArgAction::Append)]
    pub categories: Vec<Category>,

    /// Deselect every category.
    #[arg(long = "no-categories", conflicts_with = "categories")]
    pub no_categories: bool,

    /// all, 1-week, 2-weeks or 3-weeks.
    #[arg(long = "within", default_value_t = TimeFilter::All)]
    pub within: TimeFilter,

    #[arg(long = "search", short = 's')]
    pub search: Option<String>,
}

impl FilterArgs {
    pub fn to_filter_state(&self) -> FilterState {
        let mut state = FilterState::default();
        if self.no_categories {
            state.deselect_all_categories();
        } else if !self.categories.is_empty() {
            state.set_categories(self.categories.iter().copied());
        }
        state.set_time_filter(self.within);
        if let Some(query) = &self.search {
            state.set_search_query(query);
        }
        state
    }
}

impl Command {
    /// Command used when none is given on the command line.
    pub fn from_default(cfg: &Config) -> anyhow::Result<Self> {
        let name = cfg
            .get("default.command")
            .unwrap_or_else(|| "month".to_string());
        debug!(command = %name, "no explicit command, using default");
        let filters = FilterArgs::default();
        match name.trim() {
            "month" => Ok(Self::Month {
                anchor: None,
                filters,
            }),
            "list" => Ok(Self::List { filters }),
            "day" => Ok(Self::Day {
                date: "today".to_string(),
                filters,
            }),
            "stats" => Ok(Self::Stats),
            "upcoming" => Ok(Self::Upcoming { limit: 5, filters }),
            "overdue" => Ok(Self::Overdue { filters }),
            other => Err(anyhow!("unsupported default.command: {other}")),
        }
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = rest.split_once('=').or_else(|| rest.split_once(':'));

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((format!("rc.{k}"), v.to_string()));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use clap::Parser;

    use super::{Command, GlobalCli, preprocess_args};
    use crate::config::Config;
    use crate::filter::TimeFilter;
    use crate::task::Category;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&args(&[
            "gridplan",
            "rc.color=off",
            "list",
            "rc.calendar.week_start:monday",
        ]))
        .expect("preprocess");

        assert_eq!(pre.cleaned_args, args(&["gridplan", "list"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.color".to_string(), "off".to_string()),
                ("rc.calendar.week_start".to_string(), "monday".to_string()),
            ]
        );
    }

    #[test]
    fn filter_flags_build_state() {
        let cli = GlobalCli::try_parse_from([
            "gridplan",
            "list",
            "--category",
            "review",
            "-c",
            "done",
            "--within",
            "2-weeks",
            "--search",
            "Report",
        ])
        .expect("parse");

        let Some(Command::List { filters }) = cli.command else {
            panic!("expected list command");
        };
        let state = filters.to_filter_state();
        assert_eq!(state.categories.len(), 2);
        assert!(state.categories.contains(&Category::Review));
        assert!(state.categories.contains(&Category::Completed));
        assert_eq!(state.time_filter, TimeFilter::TwoWeeks);
        assert_eq!(state.search_query, "Report");
    }

    #[test]
    fn no_categories_deselects_everything() {
        let cli = GlobalCli::try_parse_from(["gridplan", "month", "--no-categories"])
            .expect("parse");
        let Some(Command::Month { filters, .. }) = cli.command else {
            panic!("expected month command");
        };
        assert!(filters.to_filter_state().categories.is_empty());
    }

    #[test]
    fn add_joins_name_words() {
        let cli = GlobalCli::try_parse_from([
            "gridplan", "add", "Write", "report", "-c", "in-progress", "--start", "2024-06-01",
        ])
        .expect("parse");
        let Some(Command::Add {
            name,
            category,
            start,
            end,
        }) = cli.command
        else {
            panic!("expected add command");
        };
        assert_eq!(name.join(" "), "Write report");
        assert_eq!(category, Category::InProgress);
        assert_eq!(start, "2024-06-01");
        assert_eq!(end, None);
    }

    #[test]
    fn default_command_comes_from_config() {
        let mut cfg = Config::default();
        assert!(matches!(
            Command::from_default(&cfg).expect("default"),
            Command::Month { .. }
        ));
        cfg.apply_overrides([("default.command".to_string(), "stats".to_string())]);
        assert!(matches!(
            Command::from_default(&cfg).expect("default"),
            Command::Stats
        ));
        cfg.apply_overrides([("default.command".to_string(), "bogus".to_string())]);
        assert!(Command::from_default(&cfg).is_err());
    }
}
