use std::io::{IsTerminal, Write};

use chrono::Local;
use tasklane_shared::{ChatRole, Task};
use unicode_width::UnicodeWidthStr;

use crate::chat::ChatMessage;
use crate::config::Config;
use crate::store::Pagination;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let wanted = cfg.get_bool("color")?.unwrap_or(true);
        Ok(Self {
            color: wanted && std::io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks, pagination))]
    pub fn print_task_table<W: Write>(
        &self,
        mut out: W,
        tasks: &[Task],
        pagination: &Pagination,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
        } else {
            let headers = vec![
                "ID".to_string(),
                "Done".to_string(),
                "Title".to_string(),
                "Description".to_string(),
            ];

            let rows = tasks
                .iter()
                .map(|task| {
                    let done = if task.is_completed {
                        self.paint("✓", "32")
                    } else {
                        String::new()
                    };
                    vec![
                        self.paint(&task.id, "33"),
                        done,
                        task.title.clone(),
                        task.description.clone().unwrap_or_default(),
                    ]
                })
                .collect();

            write_table(&mut out, headers, rows)?;
        }

        writeln!(
            out,
            "\nPage {} of {} ({} task{}){}{}",
            pagination.current_page,
            pagination.total_pages.max(1),
            pagination.total_items,
            if pagination.total_items == 1 { "" } else { "s" },
            if pagination.can_go_back { "  [prev]" } else { "" },
            if pagination.can_go_forward { "  [next]" } else { "" },
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, out, task))]
    pub fn print_task_info<W: Write>(&self, mut out: W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(
            out,
            "desc      {}",
            task.description.clone().unwrap_or_default()
        )?;
        writeln!(
            out,
            "status    {}",
            if task.is_completed { "completed" } else { "pending" }
        )?;
        writeln!(out, "owner     {}", task.user_id)?;
        if let Some(created) = task.created_at.as_deref() {
            writeln!(out, "created   {created}")?;
        }
        if let Some(updated) = task.updated_at.as_deref() {
            writeln!(out, "updated   {updated}")?;
        }
        Ok(())
    }

    pub fn print_chat_message<W: Write>(
        &self,
        mut out: W,
        message: &ChatMessage,
    ) -> anyhow::Result<()> {
        let stamp = message.timestamp.with_timezone(&Local).format("%H:%M");
        let speaker = match message.role {
            ChatRole::User => self.paint("you", "36"),
            ChatRole::Assistant => self.paint("assistant", "35"),
        };
        writeln!(out, "[{stamp}] {speaker}: {}", message.content)?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
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

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
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
    use super::*;

    fn task(id: &str, title: &str, done: bool) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            is_completed: done,
            user_id: "u1".to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn table_aligns_wide_titles() {
        let mut buf = Vec::new();
        let pagination = Pagination::from_server(1, 10, 2, 1);
        Renderer::plain()
            .print_task_table(
                &mut buf,
                &[task("a1", "買い物", false), task("b22", "Gym", true)],
                &pagination,
            )
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID  Done Title  Description ");
        assert_eq!(lines[2], "a1       買い物             ");
        assert_eq!(lines[3], "b22 ✓    Gym                ");
        assert!(text.ends_with("Page 1 of 1 (2 tasks)\n"));
    }

    #[test]
    fn color_setting_must_be_boolean() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("rc.color".to_string(), "off".to_string())]);
        assert!(!Renderer::new(&cfg).expect("color off").color);

        cfg.apply_overrides(vec![("rc.color".to_string(), "sometimes".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }

    #[test]
    fn strip_ansi_keeps_visible_text() {
        assert_eq!(strip_ansi("\x1b[33mt1\x1b[0m"), "t1");
    }
}
