#![forbid(unsafe_code)]

use sentiment_contracts::display::DataSourceStatus;
use sentiment_contracts::sentiment::SentimentSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeSeverity {
    Info,
    Warning,
    Error,
}

/// A user-facing dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackNotice {
    pub severity: NoticeSeverity,
    pub title: String,
    pub text: String,
    pub footer: Option<String>,
}

impl FeedbackNotice {
    pub fn request_queued() -> Self {
        Self {
            severity: NoticeSeverity::Info,
            title: "Request Queued".to_string(),
            text: "Your sentiment rating was queued for submission to the server.".to_string(),
            footer: Some("Please refresh the page.".to_string()),
        }
    }

    pub fn warning(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Warning,
            title: title.into(),
            text: text.into(),
            footer: None,
        }
    }

    pub fn error(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            severity: NoticeSeverity::Error,
            title: title.into(),
            text: text.into(),
            footer: None,
        }
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

/// Display side of the client: the chart/table, the data-source marker and
/// dialogs. Implementations must not block.
pub trait FeedbackPresenter: Send + Sync {
    fn render_snapshot(&self, snapshot: &SentimentSnapshot);
    fn set_data_source(&self, status: DataSourceStatus);
    fn notify(&self, notice: &FeedbackNotice);
}
