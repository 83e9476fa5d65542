use std::fmt::Write;

use stackup_core::models::{ProcessStatus, SupervisedProcess};
use stackup_core::services::orchestrator::{RunReport, ServicePlan, ServiceReport};

/// Summary printed after a successful `up`.
pub fn render_run(report: &RunReport) -> String {
    let mut out = String::new();
    for service in &report.services {
        render_service(&mut out, service);
    }
    out
}

fn render_service(out: &mut String, service: &ServiceReport) {
    let _ = writeln!(out, "{}: {}", service.service, service.stage);
    let install = if service.installed { "installed" } else { "already present" };
    let _ = writeln!(out, "  install:   {install}");

    let database = match &service.database {
        None => "-".to_string(),
        Some(outcome) if !outcome.mutated() => "unchanged".to_string(),
        Some(outcome) => {
            let mut created = Vec::new();
            if outcome.created_user {
                created.push("login");
            }
            if outcome.created_schema {
                created.push("schema");
            }
            format!("created {}", created.join(" and "))
        }
    };
    let _ = writeln!(out, "  database:  {database}");

    let identity = match &service.identity {
        Some(outcome) => format!("registered (endpoint {})", outcome.endpoint_id),
        None if service.state.identity_account_exists => "unchanged".to_string(),
        None => "-".to_string(),
    };
    let _ = writeln!(out, "  identity:  {identity}");

    for process in &service.processes {
        let _ = writeln!(out, "  process:   {} (pid {})", process.binary, process.pid);
    }
}

pub fn render_plan(plans: &[ServicePlan]) -> String {
    let mut out = String::new();
    for plan in plans {
        let _ = writeln!(out, "{}", plan.service);
        for step in &plan.steps {
            let _ = writeln!(out, "  - {step}");
        }
    }
    out
}

pub fn render_status(service: &str, processes: &[(SupervisedProcess, ProcessStatus)]) -> String {
    if processes.is_empty() {
        return format!("{service}: no recorded processes\n");
    }
    let mut out = String::new();
    for (process, status) in processes {
        let status = match status {
            ProcessStatus::Running => "running",
            ProcessStatus::Exited => "exited",
            ProcessStatus::Reused => "gone (pid reused)",
        };
        let _ = writeln!(
            out,
            "{service}: pid {} {status}  {}  since {}  log {}",
            process.pid,
            process.binary,
            process.launched_at.format("%Y-%m-%d %H:%M:%S"),
            process.log_file.display()
        );
    }
    out
}
