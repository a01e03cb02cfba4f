/*!
 * Suite executor
 *
 * A [`Suite`] owns an ordered list of cases and runs them one after another
 * against a single target. Cases never run concurrently: size and count
 * probes change the bucket's state and would confound each other.
 *
 * Every case is validated first, so configuration errors surface before any
 * request. Then a full create-retrieve-verify-delete of a small object checks
 * that the target works at all. A dry run skips the check and
 * only lists the cases, without a single request to the target.
 *
 * Only a failed connection check or a permanent error aborts the suite; any
 * other failure is recorded in that case's result and the next case runs.
 * An abort after the first case still finishes the report, so results and
 * orphans of the cases already run reach the reporter.
 * Cancellation is honoured at case boundaries: the running case is marked
 * abandoned and the rest are reported as skipped.
 */

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::content::ContentSpec;
use crate::crvd::Crvd;
use crate::error::{ProbeError, Result};
use crate::keys::ObjectKey;
use crate::probe::{Case, CaseResult, ProbeContext};

/// Receives progress as a suite runs
pub trait SuiteReporter: Send {
    /// Dry run: the case at `index` would run
    fn dry_run(&mut self, index: usize, total: usize, case: &dyn Case);

    /// The connection check is about to start
    fn connection_check(&mut self);

    fn suite_started(&mut self, total: usize);

    fn case_started(&mut self, index: usize, total: usize, case: &dyn Case);

    fn case_finished(&mut self, index: usize, total: usize, result: &CaseResult);

    fn suite_finished(&mut self, report: &SuiteReport);
}

/// Aggregate outcome of a suite run
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub results: Vec<CaseResult>,
    /// Names of cases not run because of cancellation or an abort
    pub skipped: Vec<String>,
    pub elapsed: Duration,
    pub cancelled: bool,
    /// Case whose permanent error stopped the suite
    pub aborted: Option<String>,
    pub dry_run: bool,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    /// Every object left in the bucket, across all cases
    pub fn orphans(&self) -> impl Iterator<Item = &ObjectKey> {
        self.results.iter().flat_map(|r| r.orphans.iter())
    }

    pub fn all_passed(&self) -> bool {
        !self.cancelled
            && self.aborted.is_none()
            && self.skipped.is_empty()
            && self.results.iter().all(|r| r.success)
    }
}

/// A run of many cases against one target
pub struct Suite {
    cases: Vec<Box<dyn Case>>,
    ctx: ProbeContext,
    dry_run: bool,
    connection_check: ContentSpec,
}

impl Suite {
    pub fn new(cases: Vec<Box<dyn Case>>, ctx: ProbeContext) -> Self {
        Self {
            cases,
            ctx,
            dry_run: false,
            connection_check: ContentSpec::default(),
        }
    }

    /// List the cases without making any request
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Object used by the connection check
    pub fn with_connection_check(mut self, content: ContentSpec) -> Self {
        self.connection_check = content;
        self
    }

    pub fn cases(&self) -> &[Box<dyn Case>] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Run every case in order
    pub async fn execute(&self, reporter: &mut dyn SuiteReporter) -> Result<SuiteReport> {
        let total = self.cases.len();
        let mut report = SuiteReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        for case in &self.cases {
            case.validate(&self.ctx)?;
        }

        if self.dry_run {
            for (index, case) in self.cases.iter().enumerate() {
                reporter.dry_run(index, total, case.as_ref());
            }
            reporter.suite_finished(&report);
            return Ok(report);
        }

        reporter.connection_check();
        self.check_connection().await?;

        info!("Starting test suite ({} cases)", total);
        reporter.suite_started(total);
        let started = Instant::now();

        for (index, case) in self.cases.iter().enumerate() {
            if self.ctx.is_cancelled() {
                report.cancelled = true;
                report.skipped.push(case.name().to_string());
                continue;
            }

            reporter.case_started(index, total, case.as_ref());
            let case_started = Instant::now();
            let mut result = match case.execute(&self.ctx).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("{} aborted the suite: {}", case.name(), e);
                    report.aborted = Some(case.name().to_string());
                    report
                        .skipped
                        .extend(self.cases[index + 1..].iter().map(|c| c.name().to_string()));
                    finish(&mut report, started, reporter);
                    return Err(e);
                }
            };
            result.elapsed = case_started.elapsed();
            if result.abandoned {
                report.cancelled = true;
            }
            info!(
                "{}: {} ({:?})",
                result.name,
                if result.success { "ok" } else { "failed" },
                result.elapsed
            );
            reporter.case_finished(index, total, &result);
            report.results.push(result);
        }

        finish(&mut report, started, reporter);
        Ok(report)
    }

    async fn check_connection(&self) -> Result<()> {
        let mut crvd = Crvd::new(self.ctx.target.clone(), None, self.connection_check)
            .with_retry_policy(self.ctx.retry.clone());
        crvd.create_retrieve_verify_delete()
            .await
            .map_err(|e| ProbeError::ConnectionCheck(Box::new(e)))
    }
}

fn finish(report: &mut SuiteReport, started: Instant, reporter: &mut dyn SuiteReporter) {
    report.elapsed = started.elapsed();
    let orphans = report.orphans().count();
    if orphans > 0 {
        warn!("{} objects were left in the bucket", orphans);
    }
    reporter.suite_finished(report);
}
