//! Recording service controller shared by the service tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use torrent_guard::services::{ServiceController, ServiceError};

/// Controller that records `(verb, unit, time)` for every call.
#[derive(Default)]
pub struct FakeController {
    pub installed: Vec<&'static str>,
    pub fail_stop: bool,
    pub fail_start: bool,
    pub calls: Mutex<Vec<(&'static str, String, Instant)>>,
}

impl FakeController {
    pub fn verbs(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(verb, _, _)| *verb)
            .collect()
    }

    pub fn time_of(&self, verb: &str) -> Option<Instant> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .find(|(v, _, _)| *v == verb)
            .map(|(_, _, at)| *at)
    }

    fn record(&self, verb: &'static str, unit: &str) {
        self.calls
            .lock()
            .expect("calls lock")
            .push((verb, unit.to_owned(), Instant::now()));
    }

    fn failure(verb: &'static str, unit: &str) -> ServiceError {
        ServiceError::Failed {
            action: verb,
            unit: unit.to_owned(),
            code: Some(1),
        }
    }
}

#[async_trait]
impl ServiceController for FakeController {
    async fn is_installed(&self, unit: &str) -> bool {
        self.record("lookup", unit);
        self.installed.contains(&unit)
    }

    async fn stop(&self, unit: &str) -> Result<(), ServiceError> {
        self.record("stop", unit);
        if self.fail_stop {
            return Err(Self::failure("stop", unit));
        }
        Ok(())
    }

    async fn start(&self, unit: &str) -> Result<(), ServiceError> {
        self.record("start", unit);
        if self.fail_start {
            return Err(Self::failure("start", unit));
        }
        Ok(())
    }

    async fn restart(&self, unit: &str) -> Result<(), ServiceError> {
        self.record("restart", unit);
        Ok(())
    }
}
