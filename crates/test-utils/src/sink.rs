use std::sync::{Arc, Mutex};

use pkbridge::frontend::{FrontendEvent, FrontendSink, JobId, Outcome};
use pkbridge::types::{ErrorCode, InfoKind, Percentage, Status};

/// Front-end sink that keeps everything it is sent.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(JobId, FrontendEvent)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<(JobId, FrontendEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<FrontendEvent> {
        self.all().into_iter().map(|(_, e)| e).collect()
    }

    pub fn events_for(&self, job: JobId) -> Vec<FrontendEvent> {
        self.all()
            .into_iter()
            .filter(|(j, _)| *j == job)
            .map(|(_, e)| e)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FrontendEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn percentages(&self) -> Vec<Percentage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FrontendEvent::Percentage(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// `(info, package_id)` of every package notification.
    pub fn packages(&self) -> Vec<(InfoKind, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FrontendEvent::Package {
                    info, package_id, ..
                } => Some((info, package_id)),
                _ => None,
            })
            .collect()
    }

    /// `(alias, name, enabled)` of every repository report.
    pub fn repos(&self) -> Vec<(String, String, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FrontendEvent::Repo {
                    alias,
                    name,
                    enabled,
                } => Some((alias, name, enabled)),
                _ => None,
            })
            .collect()
    }

    /// `(package_id, size)` of every details report.
    pub fn details(&self) -> Vec<(String, u64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FrontendEvent::Details {
                    package_id, size, ..
                } => Some((package_id, size)),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<(ErrorCode, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FrontendEvent::Warning { code, message } => Some((code, message)),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<Outcome> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FrontendEvent::Finished(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&FrontendEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl FrontendSink for RecordingSink {
    fn emit(&self, job: JobId, event: FrontendEvent) {
        self.events.lock().unwrap().push((job, event));
    }
}
