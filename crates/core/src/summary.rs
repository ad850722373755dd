//! Job summary rendering

use crate::errors::Result;
use crate::stats::SummaryRow;
use crate::workflow::WorkflowEnv;

/// Stats content for the job summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsReport {
    /// Parsed JSON stats condensed into the hit-ratio row
    Table(SummaryRow),
    /// Tool output shown verbatim when structured stats are unavailable
    Raw(String),
}

/// Render a `## <title>` section for the job summary
///
/// The table is HTML because the single row mixes a header cell with data
/// cells, which markdown tables cannot express.
pub fn render_markdown(title: &str, report: &StatsReport) -> String {
    let body = match report {
        StatsReport::Table(row) => format!(
            "<table><tr><th>{}</th><td>{}</td><td>{}</td></tr></table>",
            escape_html(&row.label),
            escape_html(&row.fraction),
            escape_html(&row.percentage)
        ),
        StatsReport::Raw(text) => format!("```\n{}\n```", text.trim_end()),
    };
    format!("## {}\n\n{}\n", title.trim(), body)
}

/// Append the rendered section unless `title` is empty
pub fn write_job_summary(env: &WorkflowEnv, title: &str, report: &StatsReport) -> Result<bool> {
    if title.trim().is_empty() {
        return Ok(false);
    }
    env.append_summary(&render_markdown(title, report))?;
    Ok(true)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
