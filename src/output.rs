// ABOUTME: Output formatting for CLI feedback: the run's status reporter.
// ABOUTME: Renders progress events, plans and reports in normal, quiet (CI) and JSON-lines modes.

use serde::Serialize;
use std::time::Instant;

use crate::diagnostics::Diagnostics;
use crate::engine::{Phase, ProgressEvent, RunReport, RunSnapshot, TeardownReport};
use crate::plan::{Plan, ResourceSpec};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (failures and the final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    fn emit<T: Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            println!("{json}");
        }
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.duration() {
                Some(elapsed) => println!("{message} ({:.1}s)", elapsed),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Render one phase transition.
    pub fn event(&self, event: &ProgressEvent) {
        match self.mode {
            OutputMode::Normal => println!("{}", format_event(event)),
            OutputMode::Quiet => {
                if event.phase == Phase::Failed {
                    println!("{}", format_event(event));
                }
            }
            OutputMode::Json => self.emit(&Tagged {
                event: "progress",
                body: event,
            }),
        }
    }

    pub fn plan(&self, plan: &Plan) {
        match self.mode {
            OutputMode::Json => self.emit(&Tagged {
                event: "plan",
                body: &PlanJson {
                    fingerprint: plan.fingerprint(),
                    resources: plan.specs(),
                },
            }),
            OutputMode::Quiet => {
                for spec in plan.specs() {
                    println!("{}", spec.id);
                }
            }
            OutputMode::Normal => {
                println!("Plan {} ({} resources):", plan.fingerprint(), plan.len());
                for (i, spec) in plan.specs().iter().enumerate() {
                    println!("{}", format_plan_line(i + 1, spec));
                }
            }
        }
    }

    pub fn report(&self, report: &RunReport) {
        if self.mode == OutputMode::Json {
            self.emit(&Tagged {
                event: "outcome",
                body: report,
            });
            return;
        }

        let summary = format!(
            "Bootstrap {}: {}/{} resources ready",
            report.outcome, report.ready, report.total
        );
        if report.outcome.is_success() {
            self.success(&summary);
        } else {
            println!("{summary}");
            for line in format_unfinished(report) {
                println!("{line}");
            }
        }
    }

    pub fn teardown(&self, report: &TeardownReport) {
        match self.mode {
            OutputMode::Json => self.emit(&Tagged {
                event: "teardown",
                body: report,
            }),
            OutputMode::Normal | OutputMode::Quiet => {
                if self.mode == OutputMode::Normal {
                    for id in &report.deleted {
                        println!("  deleted  {id}");
                    }
                    for id in &report.absent {
                        println!("  absent   {id}");
                    }
                }
                for (id, error) in &report.failed {
                    println!("  FAILED   {id}: {error}");
                }
                println!(
                    "Teardown: {} deleted, {} already absent, {} failed",
                    report.deleted.len(),
                    report.absent.len(),
                    report.failed.len()
                );
            }
        }
    }

    /// Render a stored run snapshot.
    pub fn snapshot(&self, instance: &str, snapshot: &RunSnapshot) {
        if self.mode == OutputMode::Json {
            self.emit(snapshot);
            return;
        }

        let outcome = snapshot
            .outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "in progress".to_string());
        println!(
            "{} run {} ({}), started {}",
            instance, snapshot.run_id, outcome, snapshot.started_at
        );
        if self.mode == OutputMode::Quiet {
            return;
        }
        for (id, record) in &snapshot.resources {
            let mut line = format!("  {:<13} {}", record.phase, id);
            if record.phase != Phase::Ready && record.attempts > 0 {
                line.push_str(&format!(" (attempts: {})", record.attempts));
            }
            if record.phase != Phase::Ready
                && let Some(error) = &record.last_error
            {
                line.push_str(&format!(": {}", error));
            }
            println!("{line}");
        }
    }

    pub fn warnings(&self, diagnostics: &Diagnostics) {
        if self.mode == OutputMode::Normal {
            for warning in diagnostics.warnings() {
                println!("Warning: {}", warning.message);
            }
        }
    }
}

pub fn format_event(event: &ProgressEvent) -> String {
    let mut line = format!("  {:<13} {}", event.phase, event.resource_id);
    if event.attempt > 1 {
        line.push_str(&format!(" (attempt {})", event.attempt));
    }
    if let Some(error) = &event.error {
        line.push_str(&format!(": {}", error));
    }
    line
}

fn format_plan_line(n: usize, spec: &ResourceSpec) -> String {
    if spec.depends_on.is_empty() {
        return format!("  {:>3}. {}", n, spec.id);
    }
    let deps: Vec<&str> = spec.depends_on.iter().map(|d| d.as_str()).collect();
    format!("  {:>3}. {}  <- {}", n, spec.id, deps.join(", "))
}

pub fn format_unfinished(report: &RunReport) -> Vec<String> {
    report
        .unfinished
        .iter()
        .map(|r| match (&r.blocked, &r.last_error) {
            (Some(blocked), _) => format!("  {:<13} {}: {}", r.phase, r.id, blocked),
            (None, Some(error)) => format!(
                "  {:<13} {} (attempts: {}): {}",
                r.phase, r.id, r.attempts, error
            ),
            (None, None) => format!("  {:<13} {} (attempts: {})", r.phase, r.id, r.attempts),
        })
        .collect()
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct Tagged<'a, T: Serialize> {
    event: &'a str,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Serialize)]
struct PlanJson<'a> {
    fingerprint: String,
    resources: &'a [ResourceSpec],
}
