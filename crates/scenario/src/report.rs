//! Per-scenario and per-run outcomes, rendered as text or JSON.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;
use toolgraph_gateway::CallStats;
use toolgraph_graph::TrackerStats;
use toolgraph_model::ErrorKind;
use toolgraph_validate::ValidatorStats;

/// Ordered stages of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Populate,
    Validate,
    Mutate,
    Revalidate,
}

impl Phase {
    /// Every phase before teardown, in run order.
    pub const ALL: [Phase; 5] = [
        Phase::Setup,
        Phase::Populate,
        Phase::Validate,
        Phase::Mutate,
        Phase::Revalidate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Populate => "populate",
            Phase::Validate => "validate",
            Phase::Mutate => "mutate",
            Phase::Revalidate => "revalidate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named check and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub detail: String,
}

impl CheckRecord {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            kind: None,
            detail: detail.into(),
        }
    }

    pub fn fail(name: impl Into<String>, kind: Option<ErrorKind>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: Phase,
    pub status: PhaseStatus,
    /// Why the phase failed or was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checks: Vec<CheckRecord>,
    pub duration_ms: u64,
}

impl PhaseReport {
    /// A phase that ran. It fails when it returned an error or when any
    /// of its checks failed.
    pub fn finished(
        phase: Phase,
        error: Option<String>,
        checks: Vec<CheckRecord>,
        duration: Duration,
    ) -> Self {
        let failed_checks = checks.iter().filter(|c| !c.passed).count();
        let (status, detail) = match (error, failed_checks) {
            (Some(err), _) => (PhaseStatus::Failed, Some(err)),
            (None, 0) => (PhaseStatus::Passed, None),
            (None, n) => (PhaseStatus::Failed, Some(format!("{n} check(s) failed"))),
        };
        Self {
            phase,
            status,
            detail,
            checks,
            duration_ms: millis(duration),
        }
    }

    pub fn skipped(phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            phase,
            status: PhaseStatus::Skipped,
            detail: Some(reason.into()),
            checks: Vec::new(),
            duration_ms: 0,
        }
    }
}

/// Cleanup outcome, kept apart from the scenario verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub planned: usize,
    pub deleted: usize,
    pub failures: Vec<String>,
    pub duration_ms: u64,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub duration_ms: u64,
    pub phases: Vec<PhaseReport>,
    /// Registry state just before teardown.
    pub tracked: TrackerStats,
    pub teardown: TeardownReport,
}

impl ScenarioReport {
    /// Teardown problems never change this verdict.
    pub fn passed(&self) -> bool {
        self.phases.iter().all(|p| p.status == PhaseStatus::Passed)
    }

    pub fn checks(&self) -> impl Iterator<Item = &CheckRecord> {
        self.phases.iter().flat_map(|p| p.checks.iter())
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub scenarios: usize,
    pub scenarios_passed: usize,
    pub scenarios_failed: usize,
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub success_rate: f64,
    pub teardown_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub scenarios: Vec<ScenarioReport>,
    pub summary: RunSummary,
    pub validator: ValidatorStats,
    /// Per-operation remote call counts, when the store keeps them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_calls: Option<CallStats>,
}

impl RunReport {
    pub fn new(
        started_at: OffsetDateTime,
        scenarios: Vec<ScenarioReport>,
        validator: ValidatorStats,
        store_calls: Option<CallStats>,
    ) -> Self {
        let summary = summarize(&scenarios);
        Self {
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            scenarios,
            summary,
            validator,
            store_calls,
        }
    }

    pub fn success(&self) -> bool {
        self.summary.scenarios_failed == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        for scenario in &self.scenarios {
            let verdict = if scenario.passed() { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "[{verdict}] {} ({} ms)\n",
                scenario.name, scenario.duration_ms
            ));
            for phase in &scenario.phases {
                let status = match phase.status {
                    PhaseStatus::Passed => "ok",
                    PhaseStatus::Failed => "failed",
                    PhaseStatus::Skipped => "skipped",
                };
                out.push_str(&format!(
                    "  {:<11} {:<8} {} check(s), {} ms",
                    phase.phase.as_str(),
                    status,
                    phase.checks.len(),
                    phase.duration_ms
                ));
                if let Some(detail) = &phase.detail {
                    out.push_str(&format!(" - {detail}"));
                }
                out.push('\n');
                for check in phase.checks.iter().filter(|c| !c.passed) {
                    out.push_str(&format!("      x {}: {}\n", check.name, check.detail));
                }
            }
            let teardown = &scenario.teardown;
            out.push_str(&format!(
                "  {:<11} {}/{} deleted, {} failure(s)\n",
                "teardown",
                teardown.deleted,
                teardown.planned,
                teardown.failures.len()
            ));
        }

        let s = &self.summary;
        out.push_str(&format!(
            "Scenarios:   {} passed, {} failed\n",
            s.scenarios_passed, s.scenarios_failed
        ));
        out.push_str(&format!(
            "Checks:      {} passed, {} failed ({:.1}%)\n",
            s.passed_checks,
            s.failed_checks,
            s.success_rate * 100.0
        ));
        out.push_str(&format!(
            "Cache:       {} remote lookup(s), {} hit(s)\n",
            self.validator.remote_lookups, self.validator.cache_hits
        ));
        if s.teardown_failures > 0 {
            out.push_str(&format!("Teardown:    {} failure(s)\n", s.teardown_failures));
        }
        out
    }
}

fn summarize(scenarios: &[ScenarioReport]) -> RunSummary {
    let scenarios_passed = scenarios.iter().filter(|s| s.passed()).count();
    let total_checks = scenarios.iter().map(|s| s.checks().count()).sum();
    let passed_checks = scenarios
        .iter()
        .map(|s| s.checks().filter(|c| c.passed).count())
        .sum();
    RunSummary {
        scenarios: scenarios.len(),
        scenarios_passed,
        scenarios_failed: scenarios.len() - scenarios_passed,
        total_checks,
        passed_checks,
        failed_checks: total_checks - passed_checks,
        success_rate: if total_checks == 0 {
            0.0
        } else {
            passed_checks as f64 / total_checks as f64
        },
        teardown_failures: scenarios.iter().map(|s| s.teardown.failures.len()).sum(),
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
