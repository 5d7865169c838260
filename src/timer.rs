//! Stack timer API
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use crate::Ts;

/// Timer trait provides monotonic time to the stack state machines.
///
/// The value is relative to some unknown epoch; the stack only ever
/// compares and adds durations.
pub trait Timer {
    /// Returns the number of millisecond ticks since some unknown epoch
    fn ticks_ms(&self) -> Ts;
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};

    use crate::Ts;

    /// Mock timer implementation to assist with testing
    #[derive(Clone, Debug)]
    pub struct MockTimer(Arc<Mutex<Ts>>);

    impl MockTimer {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(0)))
        }

        pub fn set_ms(&mut self, val: Ts) {
            *self.0.lock().unwrap() = val;
        }

        pub fn advance_ms(&mut self, val: Ts) {
            *self.0.lock().unwrap() += val;
        }
    }

    impl super::Timer for MockTimer {
        fn ticks_ms(&self) -> Ts {
            *self.0.lock().unwrap()
        }
    }
}
