#![forbid(unsafe_code)]

use std::io::Write;

use sentiment_contracts::display::{snapshot_rows, DataSourceStatus};
use sentiment_contracts::sentiment::SentimentSnapshot;
use sentiment_os::presenter::{FeedbackNotice, FeedbackPresenter, NoticeSeverity};
use tracing::{info, warn};

/// Terminal rendering: the count table and data source go to stdout, dialogs
/// go to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePresenter;

impl ConsolePresenter {
    pub fn format_snapshot(snapshot: &SentimentSnapshot) -> String {
        let rows = snapshot_rows(snapshot);
        let width = rows.iter().map(|row| row.title.len()).max().unwrap_or(0);
        let mut out = String::new();
        for row in rows {
            out.push_str(&format!(
                "{:<width$}  {:>9}\n",
                row.title,
                row.formatted_count,
                width = width
            ));
        }
        out
    }

    pub fn format_notice(notice: &FeedbackNotice) -> String {
        let severity = match notice.severity {
            NoticeSeverity::Info => "info",
            NoticeSeverity::Warning => "warning",
            NoticeSeverity::Error => "error",
        };
        match &notice.footer {
            Some(footer) => format!("[{severity}] {}: {}\n  {footer}", notice.title, notice.text),
            None => format!("[{severity}] {}: {}", notice.title, notice.text),
        }
    }
}

impl FeedbackPresenter for ConsolePresenter {
    fn render_snapshot(&self, snapshot: &SentimentSnapshot) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(Self::format_snapshot(snapshot).as_bytes());
        let _ = writeln!(stdout, "total  {}", snapshot.total());
    }

    fn set_data_source(&self, status: DataSourceStatus) {
        println!("data source: {}", status.as_str());
    }

    fn notify(&self, notice: &FeedbackNotice) {
        match notice.severity {
            NoticeSeverity::Info => info!(title = %notice.title, "notice"),
            NoticeSeverity::Warning | NoticeSeverity::Error => {
                warn!(title = %notice.title, text = %notice.text, "notice")
            }
        }
        eprintln!("{}", Self::format_notice(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn at_console_presenter_01_table_is_aligned_and_grouped() {
        let counts = [("positive", 1_204_u64), ("very negative", 3)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>();
        let table = ConsolePresenter::format_snapshot(&SentimentSnapshot::v1(counts).unwrap());
        assert_eq!(
            table,
            "Positive           1,204\nVery Negative          3\n"
        );
    }

    #[test]
    fn at_console_presenter_02_notice_carries_footer() {
        let text = ConsolePresenter::format_notice(&FeedbackNotice::request_queued());
        assert!(text.starts_with("[info] Request Queued: "));
        assert!(text.ends_with("\n  Please refresh the page."));
    }
}
