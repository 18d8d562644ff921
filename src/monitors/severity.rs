//! Severity classification of collected target statuses
//!
//! Rules are evaluated in precedence order, first match wins:
//!
//! ```text
//! status != running                        → Down
//! host:      disk ≥ 90 | ram ≥ 95 | (cpu ≥ 100 & ram ≥ 90)             → Critical
//! container: ram ≥ 95 | (cpu ≥ 100 & ram ≥ 90)                         → Critical
//! host:      90 ≤ ram < 95 | (cpu ≥ 95 & ram ≥ 80) | (disk ≥ 85 & ram ≥ 80) → Warning
//! container: 90 ≤ ram < 95 | (cpu ≥ 95 & ram ≥ 80)                     → Warning
//! otherwise                                → Healthy
//! ```
//!
//! A missing metric never satisfies a comparison.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{RunState, TargetKind, TargetStatus};

const DISK_CRITICAL: f64 = 90.0;
const DISK_WARNING: f64 = 85.0;
const RAM_CRITICAL: f64 = 95.0;
const RAM_HIGH: f64 = 90.0;
const RAM_ELEVATED: f64 = 80.0;
const CPU_SATURATED: f64 = 100.0;
const CPU_HIGH: f64 = 95.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Healthy,
    Warning,
    Critical,
    Down,
}

impl Severity {
    /// Every tier that produces alerts, worst first.
    pub const ALERTING: [Severity; 3] = [Severity::Down, Severity::Critical, Severity::Warning];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Healthy => "healthy",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Down => "down",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "healthy" => Some(Severity::Healthy),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            "down" => Some(Severity::Down),
            _ => None,
        }
    }

    pub fn is_alerting(self) -> bool {
        self != Severity::Healthy
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn at_least(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|value| value >= threshold)
}

fn below(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|value| value < threshold)
}

#[derive(Debug, Clone, Copy)]
struct Usage {
    cpu: Option<f64>,
    ram: Option<f64>,
    disk: Option<f64>,
}

impl Usage {
    fn of(status: &TargetStatus) -> Option<Self> {
        status.metrics.as_ref().map(|metrics| Usage {
            cpu: metrics.cpu,
            ram: metrics.ram,
            disk: metrics.disk,
        })
    }

    fn memory_critical(&self) -> bool {
        at_least(self.ram, RAM_CRITICAL)
            || (at_least(self.cpu, CPU_SATURATED) && at_least(self.ram, RAM_HIGH))
    }

    fn memory_warning(&self) -> bool {
        (at_least(self.ram, RAM_HIGH) && below(self.ram, RAM_CRITICAL))
            || (at_least(self.cpu, CPU_HIGH) && at_least(self.ram, RAM_ELEVATED))
    }

    fn host_critical(&self) -> bool {
        at_least(self.disk, DISK_CRITICAL) || self.memory_critical()
    }

    fn host_warning(&self) -> bool {
        self.memory_warning()
            || (at_least(self.disk, DISK_WARNING) && at_least(self.ram, RAM_ELEVATED))
    }
}

/// Map a target's latest status to a severity tier.
pub fn classify(status: &TargetStatus) -> Severity {
    if status.status != RunState::Running {
        return Severity::Down;
    }

    let Some(usage) = Usage::of(status) else {
        return Severity::Healthy;
    };

    match status.kind {
        TargetKind::Host if usage.host_critical() => Severity::Critical,
        TargetKind::Host if usage.host_warning() => Severity::Warning,
        TargetKind::Container if usage.memory_critical() => Severity::Critical,
        TargetKind::Container if usage.memory_warning() => Severity::Warning,
        _ => Severity::Healthy,
    }
}

/// Human-readable reason for a classification, used in notifications.
pub fn describe(status: &TargetStatus, severity: Severity) -> String {
    let memory_label = match status.kind {
        TargetKind::Host => "RAM",
        TargetKind::Container => "Memory",
    };

    let usage = Usage::of(status).unwrap_or(Usage {
        cpu: None,
        ram: None,
        disk: None,
    });

    let mut issues = Vec::new();
    let mut push = |label: &str, value: Option<f64>, threshold: f64| {
        if let Some(value) = value
            && value >= threshold
        {
            issues.push(format!("{label}: {value:.1}%"));
        }
    };

    match (severity, status.kind) {
        (Severity::Down, TargetKind::Container) => {
            let state = status.reported_state().unwrap_or(status.status.as_str());
            return format!("Container state: {state}");
        }
        (Severity::Down, TargetKind::Host) => {
            return match (&status.error, status.reported_state()) {
                (Some(error), _) => format!("Server is not responding ({error})"),
                (None, Some(state)) => format!("Server state: {state}"),
                (None, None) => "Server is not responding".to_string(),
            };
        }
        (Severity::Healthy, _) => return "Healthy".to_string(),
        (Severity::Critical, TargetKind::Host) => {
            push("Disk", usage.disk, DISK_CRITICAL);
            push(memory_label, usage.ram, RAM_CRITICAL);
            push("CPU", usage.cpu, CPU_SATURATED);
        }
        (Severity::Critical, TargetKind::Container) => {
            push(memory_label, usage.ram, RAM_CRITICAL);
            push("CPU", usage.cpu, CPU_SATURATED);
        }
        (Severity::Warning, TargetKind::Host) => {
            push(memory_label, usage.ram, RAM_HIGH);
            push("CPU", usage.cpu, CPU_HIGH);
            push("Disk", usage.disk, DISK_WARNING);
        }
        (Severity::Warning, TargetKind::Container) => {
            push(memory_label, usage.ram, RAM_HIGH);
            push("CPU", usage.cpu, CPU_HIGH);
        }
    }

    issues.join(", ")
}
