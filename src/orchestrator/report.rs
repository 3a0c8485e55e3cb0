//! Per-run outcome record, persisted as `run-report.json`.

use crate::error::{Error, Result, Stage};
use crate::fsutil::write_atomic;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Built,
    Skipped,
    Failed,
    NotStarted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectOutcome {
    pub name: String,
    pub status: ProjectStatus,
    /// Stage a failed project stopped in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectOutcome {
    pub(crate) fn new(name: &str, status: ProjectStatus, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status,
            stage: None,
            duration_secs: duration.as_secs_f64(),
            error: None,
        }
    }

    pub(crate) fn failed(name: &str, err: &Error, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: ProjectStatus::Failed,
            stage: err.stage(),
            duration_secs: duration.as_secs_f64(),
            error: Some(err.to_string()),
        }
    }
}

/// The first failure of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure<'a> {
    pub project: &'a str,
    pub stage: Option<Stage>,
    pub message: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub platform: String,
    pub started_at: String,
    pub finished_at: String,
    /// Outcomes in build order.
    pub projects: Vec<ProjectOutcome>,
}

impl RunReport {
    pub(crate) fn start(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            started_at: now_utc(),
            finished_at: String::new(),
            projects: Vec::new(),
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = now_utc();
    }

    /// Every project was built or skipped.
    pub fn is_success(&self) -> bool {
        self.projects
            .iter()
            .all(|p| matches!(p.status, ProjectStatus::Built | ProjectStatus::Skipped))
    }

    pub fn failure(&self) -> Option<Failure<'_>> {
        self.projects
            .iter()
            .find(|p| p.status == ProjectStatus::Failed)
            .map(|p| Failure {
                project: &p.name,
                stage: p.stage,
                message: p.error.as_deref().unwrap_or_default(),
            })
    }

    pub fn outcome(&self, name: &str) -> Option<&ProjectOutcome> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn count(&self, status: ProjectStatus) -> usize {
        self.projects.iter().filter(|p| p.status == status).count()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serializing run report: {}", e)))?;
        write_atomic(path, format!("{}\n", json).as_bytes()).map_err(|e| {
            Error::Config(format!("writing run report '{}': {}", path.display(), e))
        })
    }
}

fn now_utc() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_names_project_and_stage() {
        let mut report = RunReport::start("linux");
        report
            .projects
            .push(ProjectOutcome::new("zlib", ProjectStatus::Built, Duration::from_secs(3)));
        let err = Error::Integrity {
            project: "curl".into(),
            url: "https://example.invalid/curl.tar.xz".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        report
            .projects
            .push(ProjectOutcome::failed("curl", &err, Duration::from_millis(5)));
        report
            .projects
            .push(ProjectOutcome::new("libnfs", ProjectStatus::NotStarted, Duration::ZERO));
        report.finish();

        let failure = report.failure().unwrap();
        assert_eq!(failure.project, "curl");
        assert_eq!(failure.stage, Some(Stage::Fetch));
        assert!(failure.message.contains("checksum mismatch"));
        assert!(!report.is_success());
        assert_eq!(report.count(ProjectStatus::NotStarted), 1);
    }

    #[test]
    fn written_report_is_json_with_snake_case_statuses() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("work/run-report.json");
        let mut report = RunReport::start("windows");
        report
            .projects
            .push(ProjectOutcome::new("opus", ProjectStatus::Skipped, Duration::ZERO));
        report.finish();
        report.write(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["platform"], "windows");
        assert_eq!(value["projects"][0]["status"], "skipped");
        assert!(value["projects"][0].get("stage").is_none());
        assert!(value["started_at"].as_str().unwrap().ends_with('Z'));
    }
}
