//! Per-run issue collection and status.

use std::fmt;

use crate::channel::ChannelId;
use crate::error::{FilterIssue, FitErrorKind, FitWarning};
use crate::fit::FitTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

/// One problem found on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelIssue {
    pub channel: ChannelId,
    pub severity: Severity,
    /// Short tag such as `insufficient_data` or `fit_quality`.
    pub kind: &'static str,
    /// Named numbers behind the issue.
    pub values: Vec<(&'static str, f64)>,
    pub message: String,
}

impl fmt::Display for ChannelIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.severity.name(), self.kind, self.message)
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pass,
    Partial { failed: usize, total: usize },
    /// Every channel failed.
    Fail,
}

impl RunStatus {
    pub fn from_counts(failed: usize, total: usize) -> Self {
        if failed == 0 {
            RunStatus::Pass
        } else if failed >= total {
            RunStatus::Fail
        } else {
            RunStatus::Partial { failed, total }
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pass => f.write_str("PASS"),
            RunStatus::Partial { failed, total } => write!(f, "PARTIAL ({failed}/{total} failed)"),
            RunStatus::Fail => f.write_str("FAIL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub label: String,
    pub total: usize,
    pub failed: usize,
    /// Channels whose fine fit was rejected and refitted on coarse.
    pub fallbacks: usize,
    pub issues: Vec<ChannelIssue>,
}

impl RunReport {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            total: 0,
            failed: 0,
            fallbacks: 0,
            issues: Vec::new(),
        }
    }

    /// Collect the errors and warnings of a fitted table.
    pub fn from_fits(label: impl Into<String>, fits: &FitTable) -> Self {
        let mut report = Self::new(label);
        report.add_fits(fits);
        report
    }

    pub fn add_fits(&mut self, fits: &FitTable) {
        for outcome in &fits.outcomes {
            self.total += 1;
            if outcome.fell_back() {
                self.fallbacks += 1;
            }
            match &outcome.result {
                Ok(record) => {
                    for warning in &record.warnings {
                        self.issues.push(warning_issue(outcome.channel, warning));
                    }
                }
                Err(error) => {
                    self.failed += 1;
                    self.issues.push(ChannelIssue {
                        channel: error.channel,
                        severity: Severity::Error,
                        kind: error.tag(),
                        values: error_values(&error.kind),
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    /// Record halves the filter could only partly repair, as warnings.
    ///
    /// `scope` names the table they came from when a run covers several.
    pub fn add_filter_issues(&mut self, scope: Option<&str>, issues: &[(ChannelId, FilterIssue)]) {
        for &(channel, issue) in issues {
            let message = match scope {
                Some(scope) => format!("{channel} {scope}: {issue}"),
                None => format!("{channel}: {issue}"),
            };
            let values = match issue {
                FilterIssue::InsufficientData { points, .. } => vec![("points", points as f64)],
            };
            self.issues.push(ChannelIssue {
                channel,
                severity: Severity::Warning,
                kind: issue.tag(),
                values,
                message,
            });
        }
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::from_counts(self.failed, self.total)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ChannelIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ChannelIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    /// Emit every issue and a summary line through `log`.
    pub fn log(&self) {
        for issue in &self.issues {
            match issue.severity {
                Severity::Warning => log::warn!("{}: {}", self.label, issue.message),
                Severity::Error => log::error!("{}: {}", self.label, issue.message),
            }
        }
        log::info!(
            "{}: {} channels, {} failed, {} fell back to coarse, {} warnings: {}",
            self.label,
            self.total,
            self.failed,
            self.fallbacks,
            self.warnings().count(),
            self.status()
        );
    }
}

fn warning_issue(channel: ChannelId, warning: &FitWarning) -> ChannelIssue {
    match *warning {
        FitWarning::FitQuality { quality, limit, .. } => ChannelIssue {
            channel,
            severity: Severity::Warning,
            kind: "fit_quality",
            values: vec![("quality", quality), ("limit", limit)],
            message: format!("{channel}: {warning}"),
        },
    }
}

fn error_values(kind: &FitErrorKind) -> Vec<(&'static str, f64)> {
    match *kind {
        FitErrorKind::InsufficientData {
            points, required, ..
        } => vec![("points", points as f64), ("required", required as f64)],
        FitErrorKind::SingularFit { points, .. } => vec![("points", points as f64)],
        FitErrorKind::InvalidGain { gain } => vec![("gain", gain)],
    }
}
