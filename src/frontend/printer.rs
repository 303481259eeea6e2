// src/frontend/printer.rs

use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::errors::Result;

use super::{FrontendEvent, JobId, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    job: JobId,
    #[serde(flatten)]
    event: &'a FrontendEvent,
}

/// Drain the event channel onto stdout until every sender is gone.
pub async fn print_events(
    mut rx: mpsc::UnboundedReceiver<(JobId, FrontendEvent)>,
    format: OutputFormat,
) -> Result<()> {
    info!(?format, "event printer started");

    loop {
        let (job, event) = match rx.recv().await {
            Some(e) => e,
            None => {
                debug!("event channel closed; printer exiting");
                break;
            }
        };

        let line = match format {
            OutputFormat::Json => Some(
                serde_json::to_string(&JsonLine { job, event: &event })
                    .map_err(anyhow::Error::from)?,
            ),
            OutputFormat::Human => render(&event),
        };

        if let Some(line) = line {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{line}")?;
        }
    }

    Ok(())
}

/// kebab-case name of a serde enum value.
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => "?".to_string(),
    }
}

/// Human rendering; `None` for events not worth a line.
pub fn render(event: &FrontendEvent) -> Option<String> {
    match event {
        FrontendEvent::Locked(_) | FrontendEvent::ItemProgress { .. } => None,
        FrontendEvent::Status(status) => Some(format!("status: {}", label(status))),
        FrontendEvent::Percentage(p) => Some(format!("progress: {p}")),
        FrontendEvent::Package {
            info,
            package_id,
            summary,
        } => {
            if summary.is_empty() {
                Some(format!("{:<12} {package_id}", label(info)))
            } else {
                Some(format!("{:<12} {package_id} - {summary}", label(info)))
            }
        }
        FrontendEvent::Details {
            package_id,
            summary,
            size,
            ..
        } => {
            if summary.is_empty() {
                Some(format!("{package_id}: {size} bytes"))
            } else {
                Some(format!("{package_id}: {summary} ({size} bytes)"))
            }
        }
        FrontendEvent::Files { package_id, files } => {
            let mut out = format!("{package_id}:");
            for file in files {
                out.push_str("\n  ");
                out.push_str(file);
            }
            Some(out)
        }
        FrontendEvent::UpdateDetail {
            package_id,
            obsoletes,
            bugzilla,
            cve,
            restart,
            update_text,
        } => {
            let mut out = format!("{package_id} (restart: {})", label(restart));
            for (title, links) in [("obsoletes", obsoletes), ("bugzilla", bugzilla), ("cve", cve)] {
                if !links.is_empty() {
                    out.push_str(&format!("\n  {title}: {}", links.join(", ")));
                }
            }
            if !update_text.is_empty() {
                out.push_str(&format!("\n  {update_text}"));
            }
            Some(out)
        }
        FrontendEvent::Repo {
            alias,
            name,
            enabled,
        } => {
            let state = if *enabled { "enabled" } else { "disabled" };
            Some(format!("{alias:<20} {state:<9} {name}"))
        }
        FrontendEvent::EulaRequired {
            eula_id,
            package_id,
            vendor,
            ..
        } => Some(format!(
            "license agreement required: {eula_id} for {package_id} (vendor {vendor}); rerun with --accept-eula {eula_id}"
        )),
        FrontendEvent::RepoSignatureRequired {
            repo,
            url,
            key_id,
            key_name,
            fingerprint,
            ..
        } => Some(format!(
            "repository {repo} ({url}) is signed with untrusted key {key_id} ({key_name}, fingerprint {fingerprint}); rerun with --trust {key_id}"
        )),
        FrontendEvent::RequireRestart {
            restart,
            package_id,
        } => Some(format!("restart required ({}): {package_id}", label(restart))),
        FrontendEvent::Warning { code, message } => Some(format!("warning [{code}]: {message}")),
        FrontendEvent::Finished(Outcome::Success) => Some("finished: success".to_string()),
        FrontendEvent::Finished(Outcome::Failed { code, message }) => {
            Some(format!("finished: failed [{code}] {message}"))
        }
    }
}
