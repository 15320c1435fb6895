use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, instrument};

use crate::cli::{Command, FilterArgs};
use crate::config::Config;
use crate::datastore::TaskStorage;
use crate::daterange::format_task_date_range;
use crate::datetime::{Clock, parse_date_expr};
use crate::error::PlannerError;
use crate::filter::{
    build_month_view, compute_filtered_tasks, day_entries, tasks_by_category,
};
use crate::grid::{generate_month_grid, month_title, weekday_labels};
use crate::render::{Renderer, short_id};
use crate::stats::{compute_stats, overdue_tasks, upcoming_tasks};
use crate::store::TaskStore;
use crate::task::{Category, TaskPatch};

#[instrument(skip(store, cfg, renderer, command))]
pub fn dispatch<S, C>(
    store: &mut TaskStore<S, C>,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
) -> anyhow::Result<()>
where
    S: TaskStorage,
    C: Clock,
{
    let now = store.clock().now();
    debug!(?command, %now, "dispatching command");

    match command {
        Command::Add {
            name,
            category,
            start,
            end,
        } => cmd_add(store, &name.join(" "), category, &start, end.as_deref(), now),
        Command::Edit {
            id,
            name,
            category,
            start,
            end,
        } => {
            let patch = TaskPatch {
                name,
                category,
                start_date: parse_optional(start.as_deref(), now)?,
                end_date: parse_optional(end.as_deref(), now)?,
            };
            cmd_edit(store, &id, &patch)
        }
        Command::Move { id, day } => cmd_move(store, &id, &day, now),
        Command::Resize { id, start, end } => cmd_resize(store, &id, &start, &end, now),
        Command::Delete { id } => cmd_delete(store, &id),
        Command::Clear => cmd_clear(store),
        Command::List { filters } => cmd_list(store, renderer, &filters, now),
        Command::Day { date, filters } => cmd_day(store, renderer, &date, &filters, now),
        Command::Month { anchor, filters } => {
            cmd_month(store, cfg, renderer, anchor.as_deref(), &filters, now)
        }
        Command::Stats => cmd_stats(store, renderer),
        Command::Upcoming { limit, filters } => {
            let filtered = compute_filtered_tasks(store.tasks(), &filters.to_filter_state(), now);
            renderer.print_task_table(&upcoming_tasks(&filtered, now, limit), now)
        }
        Command::Overdue { filters } => {
            let filtered = compute_filtered_tasks(store.tasks(), &filters.to_filter_state(), now);
            renderer.print_task_table(&overdue_tasks(&filtered, now), now)
        }
    }
}

fn parse_optional(
    input: Option<&str>,
    now: NaiveDateTime,
) -> Result<Option<NaiveDateTime>, PlannerError> {
    input.map(|raw| parse_date_expr(raw, now)).transpose()
}

fn parse_day(input: &str, now: NaiveDateTime) -> Result<NaiveDate, PlannerError> {
    Ok(parse_date_expr(input, now)?.date())
}

/// A failed save leaves the change in memory only.
fn report_warning(warning: Option<PlannerError>) {
    if let Some(err) = warning {
        eprintln!("warning: {err}");
    }
}

#[instrument(skip(store, name, now))]
fn cmd_add<S: TaskStorage, C: Clock>(
    store: &mut TaskStore<S, C>,
    name: &str,
    category: Category,
    start: &str,
    end: Option<&str>,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command add");

    let start_date = parse_date_expr(start, now)?;
    let end_date = parse_optional(end, now)?.unwrap_or(start_date);

    let outcome = store.create(name, category, start_date, end_date)?;
    let task = &outcome.value;
    println!(
        "Created task {} \"{}\" ({}).",
        short_id(task),
        task.name,
        format_task_date_range(task.start_date, task.end_date)
    );
    report_warning(outcome.warning);
    Ok(())
}

#[instrument(skip(store, patch))]
fn cmd_edit<S: TaskStorage, C: Clock>(
    store: &mut TaskStore<S, C>,
    id: &str,
    patch: &TaskPatch,
) -> anyhow::Result<()> {
    info!("command edit");

    if patch.is_empty() {
        return Err(anyhow!("nothing to change; pass --name, --category, --start or --end"));
    }

    let task_id = store.resolve(id)?.id.clone();
    let outcome = store.update(&task_id, patch);
    if let Some(task) = store.get(&task_id) {
        if outcome.value {
            println!("Modified task {} \"{}\".", short_id(task), task.name);
        } else {
            println!("Task {} unchanged.", short_id(task));
        }
    }
    report_warning(outcome.warning);
    Ok(())
}

#[instrument(skip(store, now))]
fn cmd_move<S: TaskStorage, C: Clock>(
    store: &mut TaskStore<S, C>,
    id: &str,
    day: &str,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command move");

    let target = parse_day(day, now)?;
    let task_id = store.resolve(id)?.id.clone();
    let outcome = store.move_to_day(&task_id, target);
    if let Some(task) = store.get(&task_id) {
        if outcome.value {
            println!(
                "Moved task {} to {}.",
                short_id(task),
                format_task_date_range(task.start_date, task.end_date)
            );
        } else {
            println!("Task {} unchanged.", short_id(task));
        }
    }
    report_warning(outcome.warning);
    Ok(())
}

#[instrument(skip(store, now))]
fn cmd_resize<S: TaskStorage, C: Clock>(
    store: &mut TaskStore<S, C>,
    id: &str,
    start: &str,
    end: &str,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command resize");

    let start_date = parse_date_expr(start, now)?;
    let end_date = parse_date_expr(end, now)?;
    let task_id = store.resolve(id)?.id.clone();
    let outcome = store.resize_task(&task_id, start_date, end_date);
    if let Some(task) = store.get(&task_id) {
        if outcome.value {
            println!(
                "Resized task {} to {}.",
                short_id(task),
                format_task_date_range(task.start_date, task.end_date)
            );
        } else {
            println!("Task {} unchanged.", short_id(task));
        }
    }
    report_warning(outcome.warning);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_delete<S: TaskStorage, C: Clock>(
    store: &mut TaskStore<S, C>,
    id: &str,
) -> anyhow::Result<()> {
    info!("command delete");

    let task = store.resolve(id)?.clone();
    let outcome = store.delete(&task.id);
    println!("Deleted task {} \"{}\".", short_id(&task), task.name);
    report_warning(outcome.warning);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_clear<S: TaskStorage, C: Clock>(store: &mut TaskStore<S, C>) -> anyhow::Result<()> {
    info!("command clear");

    let outcome = store.clear_all();
    println!("Deleted {} task(s).", outcome.value);
    report_warning(outcome.warning);
    Ok(())
}

#[instrument(skip(store, renderer, filters, now))]
fn cmd_list<S: TaskStorage, C: Clock>(
    store: &TaskStore<S, C>,
    renderer: &mut Renderer,
    filters: &FilterArgs,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let filtered = compute_filtered_tasks(store.tasks(), &filters.to_filter_state(), now);
    debug!(visible = filtered.len(), "listing tasks");
    renderer.print_grouped(&tasks_by_category(&filtered), now)
}

#[instrument(skip(store, renderer, filters, now))]
fn cmd_day<S: TaskStorage, C: Clock>(
    store: &TaskStore<S, C>,
    renderer: &mut Renderer,
    date: &str,
    filters: &FilterArgs,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let day = parse_day(date, now)?;
    let filtered = compute_filtered_tasks(store.tasks(), &filters.to_filter_state(), now);
    let entries = day_entries(filtered.iter().copied(), day);
    renderer.print_day(day, &entries)
}

#[instrument(skip(store, cfg, renderer, filters, now))]
fn cmd_month<S: TaskStorage, C: Clock>(
    store: &TaskStore<S, C>,
    cfg: &Config,
    renderer: &mut Renderer,
    anchor: Option<&str>,
    filters: &FilterArgs,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let anchor = match anchor {
        Some(raw) => parse_day(raw, now)?,
        None => now.date(),
    };
    let week_start = cfg.week_start();

    let grid = generate_month_grid(anchor, now.date(), week_start);
    let filtered = compute_filtered_tasks(store.tasks(), &filters.to_filter_state(), now);
    let view = build_month_view(&grid, &filtered);

    renderer.print_month(&month_title(anchor), &weekday_labels(week_start), &view)
}

fn cmd_stats<S: TaskStorage, C: Clock>(
    store: &TaskStore<S, C>,
    renderer: &mut Renderer,
) -> anyhow::Result<()> {
    renderer.print_stats(&compute_stats(store.tasks()))
}
