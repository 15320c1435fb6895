use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::Config;
use crate::daterange::format_task_date_range;
use crate::filter::{DayCell, DayEntry, EntryKind};
use crate::stats::TaskStats;
use crate::task::{Category, Task};

const CELL_WIDTH: usize = 14;
const MAX_CELL_ENTRIES: usize = 3;
const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks, now))]
    pub fn print_task_table(&mut self, tasks: &[&Task], now: NaiveDateTime) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_table(&mut out, tasks, now)
    }

    /// One table per non-empty category.
    #[tracing::instrument(skip(self, grouped, now))]
    pub fn print_grouped(
        &mut self,
        grouped: &BTreeMap<Category, Vec<&Task>>,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let mut printed = false;
        for (category, tasks) in grouped {
            if tasks.is_empty() {
                continue;
            }
            if printed {
                writeln!(out)?;
            }
            let heading = format!("{} ({})", category.label(), tasks.len());
            writeln!(out, "{}", self.paint(&heading, category_color(*category)))?;
            self.write_task_table(&mut out, tasks, now)?;
            printed = true;
        }

        if !printed {
            writeln!(out, "No matches.")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, entries))]
    pub fn print_day(&mut self, day: NaiveDate, entries: &[DayEntry<'_>]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "{}", day.format("%A, %B %-d, %Y"))?;
        if entries.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let headers = vec![
            "".to_string(),
            "ID".to_string(),
            "Category".to_string(),
            "Dates".to_string(),
            "Name".to_string(),
        ];
        let rows = entries
            .iter()
            .map(|entry| {
                let marker = match entry.kind {
                    EntryKind::Start => "*",
                    EntryKind::Continuation => "~",
                };
                vec![
                    marker.to_string(),
                    self.paint(short_id(entry.task), "33"),
                    self.paint(entry.task.category.label(), category_color(entry.task.category)),
                    format_task_date_range(entry.task.start_date, entry.task.end_date),
                    entry.task.name.clone(),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    /// Month grid. A task's first day shows its name; later days it spans
    /// show a `~` continuation marker.
    #[tracing::instrument(skip(self, labels, view))]
    pub fn print_month(
        &mut self,
        title: &str,
        labels: &[&str],
        view: &[DayCell<'_>],
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "{title}")?;
        for label in labels {
            write!(out, "{}", fit(label, CELL_WIDTH))?;
        }
        writeln!(out)?;
        writeln!(out, "{:-<width$}", "", width = CELL_WIDTH * labels.len())?;

        for week in view.chunks(7) {
            for cell in week {
                let number = if cell.day.is_today {
                    format!("[{}]", cell.day.date.format("%-d"))
                } else {
                    format!(" {}", cell.day.date.format("%-d"))
                };
                let number = fit(&number, CELL_WIDTH);
                let number = if cell.day.is_today {
                    self.paint(&number, "1")
                } else if !cell.day.is_current_month {
                    self.paint(&number, "2")
                } else {
                    number
                };
                write!(out, "{number}")?;
            }
            writeln!(out)?;

            let rows = week
                .iter()
                .map(|cell| cell.entries.len().min(MAX_CELL_ENTRIES))
                .max()
                .unwrap_or(0);
            for row in 0..rows {
                for cell in week {
                    write!(out, "{}", self.cell_line(cell, row))?;
                }
                writeln!(out)?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    pub fn print_stats(&mut self, stats: &TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "{:<14}{}", "Total", stats.total)?;
        for (category, count) in &stats.count_by_category {
            let label = format!("{:<14}", category.label());
            writeln!(out, "{}{count}", self.paint(&label, category_color(*category)))?;
        }
        writeln!(out, "{:<14}{}%", "Completion", stats.completion_rate_percent)?;
        Ok(())
    }

    fn cell_line(&self, cell: &DayCell<'_>, row: usize) -> String {
        let overflow = cell.entries.len() > MAX_CELL_ENTRIES;
        if overflow && row == MAX_CELL_ENTRIES - 1 {
            let hidden = cell.entries.len() - (MAX_CELL_ENTRIES - 1);
            return self.paint(&fit(&format!(" +{hidden} more"), CELL_WIDTH), "2");
        }

        let Some(entry) = cell.entries.get(row) else {
            return " ".repeat(CELL_WIDTH);
        };
        let text = match entry.kind {
            EntryKind::Start => format!(" {}", entry.task.name),
            EntryKind::Continuation => " ~".to_string(),
        };
        self.paint(&fit(&text, CELL_WIDTH), category_color(entry.task.category))
    }

    fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[&Task],
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Category".to_string(),
            "Dates".to_string(),
            "Name".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let dates = format_task_date_range(task.start_date, task.end_date);
            let dates = if task.end_date < now && task.category != Category::Completed {
                self.paint(&dates, "31")
            } else {
                dates
            };

            rows.push(vec![
                self.paint(short_id(task), "33"),
                self.paint(task.category.label(), category_color(task.category)),
                dates,
                task.name.clone(),
            ]);
        }

        write_table(out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn category_color(category: Category) -> &'static str {
    match category {
        Category::ToDo => "34",
        Category::InProgress => "33",
        Category::Review => "35",
        Category::Completed => "32",
    }
}

pub(crate) fn short_id(task: &Task) -> &str {
    let id = task.id.as_str();
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Truncates to `width` display columns (marking the cut with `…`) and
/// pads the rest with spaces.
fn fit(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        let padding = width - UnicodeWidthStr::width(text);
        return format!("{text}{}", " ".repeat(padding));
    }

    let budget = width.saturating_sub(1);
    let mut used = 0;
    let mut out = String::with_capacity(width);
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    out.push('…');
    used += 1;
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use unicode_width::UnicodeWidthStr;

    use super::{Renderer, fit, strip_ansi, write_table};
    use crate::config::Config;
    use crate::task::{Category, Task, TaskId};

    #[test]
    fn fit_pads_and_truncates_by_display_width() {
        assert_eq!(fit("abc", 5), "abc  ");
        let cut = fit("quarterly report", 8);
        assert_eq!(UnicodeWidthStr::width(cut.as_str()), 8);
        assert!(cut.ends_with('…'));
        let wide = fit("日本語のタスク", 6);
        assert_eq!(UnicodeWidthStr::width(wide.as_str()), 6);
    }

    #[test]
    fn table_columns_ignore_color_codes() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["\x1b[31mred\x1b[0m".to_string(), "x".to_string()]],
        )
        .expect("write table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A   B ");
        assert_eq!(strip_ansi(lines[2]), "red x ");
    }

    #[test]
    fn invalid_color_setting_is_rejected() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("color".to_string(), "maybe".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }

    #[test]
    fn task_table_marks_nothing_without_color() {
        let mut cfg = Config::default();
        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg).expect("renderer");
        let at = NaiveDate::from_ymd_opt(2024, 6, 1)
            .expect("valid date")
            .and_hms_opt(9, 0, 0)
            .expect("valid time");
        let task = Task {
            id: TaskId::from("0123456789abcdef"),
            name: "Plan sprint".to_string(),
            category: Category::Review,
            start_date: at,
            end_date: at,
            created_at: at,
        };
        let mut buf = Vec::new();
        renderer
            .write_task_table(&mut buf, &[&task], at)
            .expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(!text.contains('\x1b'));
        assert!(text.contains("01234567 "));
        assert!(!text.contains("012345678"));
        assert!(text.contains("Jun 1, 2024"));
    }
}
