//! Error and status reporting sinks
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::{debug, warn};

use crate::error::Error;
use crate::ComponentId;

/// Fire-and-forget diagnostics sink consumed by every stack component.
///
/// Non-fatal faults are reported with the component that detected them
/// and two context arguments; periodic diagnostic values go to `status`.
/// Implementations must never fail the caller.
pub trait Reporter {
    /// Report a non-fatal fault
    fn error(&mut self, component: ComponentId, err: Error, arg1: u16, arg2: u16);

    /// Report a periodic diagnostic value
    fn status(&mut self, component: ComponentId, value: u16);
}

/// Reporter backed by the `log` facade
#[derive(Clone, Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn error(&mut self, component: ComponentId, err: Error, arg1: u16, arg2: u16) {
        warn!("{:?} error: {:?} ({}, {})", component, err, arg1, arg2);
    }

    fn status(&mut self, component: ComponentId, value: u16) {
        debug!("{:?} status: {}", component, value);
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::Reporter;
    use crate::error::Error;
    use crate::ComponentId;

    /// Mock reporter recording reports for inspection
    #[derive(Clone, Debug)]
    pub struct MockReporter {
        errors: Arc<Mutex<Vec<(ComponentId, Error, u16, u16)>>>,
        statuses: Arc<Mutex<Vec<(ComponentId, u16)>>>,
    }

    impl MockReporter {
        pub fn new() -> Self {
            Self {
                errors: Arc::new(Mutex::new(Vec::new())),
                statuses: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn errors(&self) -> Vec<(ComponentId, Error, u16, u16)> {
            self.errors.lock().unwrap().clone()
        }

        pub fn error_count(&self) -> usize {
            self.errors.lock().unwrap().len()
        }

        pub fn statuses(&self) -> Vec<(ComponentId, u16)> {
            self.statuses.lock().unwrap().clone()
        }
    }

    impl Reporter for MockReporter {
        fn error(&mut self, component: ComponentId, err: Error, arg1: u16, arg2: u16) {
            self.errors.lock().unwrap().push((component, err, arg1, arg2));
        }

        fn status(&mut self, component: ComponentId, value: u16) {
            self.statuses.lock().unwrap().push((component, value));
        }
    }
}
