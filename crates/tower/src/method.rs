use std::str::FromStr;

use relay_core::WorkError;

/// Operations a sub-job may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMethod {
    Get,
    Launch,
    Monitor,
}

impl FromStr for JobMethod {
    type Err = WorkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "launch" => Ok(Self::Launch),
            "monitor" => Ok(Self::Monitor),
            _ => Err(WorkError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Job statuses after which a monitored job will not change again.
pub const TERMINAL_STATUSES: [&str; 4] = ["successful", "failed", "error", "canceled"];

pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

/// Derive a page name from the job's href and the page number.
///
/// `/api/v2/jobs/7008/` page 1 becomes `api_v2_jobs_7008_page1.json`.
pub fn page_name(href_slug: &str, page: usize) -> String {
    let path = href_slug.split('?').next().unwrap_or_default();
    let stem = path.trim_matches('/').replace('/', "_");
    let stem = if stem.is_empty() { "root" } else { stem.as_str() };
    format!("{stem}_page{page}.json")
}
