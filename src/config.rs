use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub refresh_interval: Duration,
    pub show_progress: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("rangedl/", env!("CARGO_PKG_VERSION")).to_string(),
            refresh_interval: Duration::from_millis(100),
            show_progress: true,
        }
    }
}

impl DownloadConfig {
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}
