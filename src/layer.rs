//! Layer dispatch protocol
//!
//! Every layer in the stack speaks the same three-operation convention:
//!
//! - `send` moves a buffer towards the radio. The callee stamps the
//!   buffer `owner` field, optionally reserves space for its own header,
//!   and forwards to the next layer down. On failure ownership returns to
//!   the caller (the handle travels back inside [`SendFailure`]) and the
//!   caller disposes of the buffer.
//! - `receive` moves a buffer towards the application. The callee stamps
//!   `owner` on entry, then either consumes the buffer terminally or
//!   dispatches it further up by frame type or port. Unrecognised traffic
//!   is freed and reported, never propagated upwards.
//! - `send_done` notifies a transmission outcome. The completion travels
//!   up until it reaches the layer whose id matches the buffer `creator`
//!   field, which takes terminal disposition; relaying layers forward it
//!   unchanged. This is what lets a relay forward traffic without knowing
//!   its ultimate origin.
//!
//! All calls run to completion within a single event; the single-threaded
//! event model is what makes the unlocked `owner` bookkeeping safe.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use crate::error::Error;
use crate::pool::{Handle, Pool};
use crate::report::Reporter;

/// Transmission attempt outcome delivered with a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxResult {
    /// Frame left the radio
    Done,
    /// Transmission attempt failed
    Failed,
}

/// A failed downward send.
///
/// Carries the buffer back to the caller, which remains responsible for
/// its disposal.
#[derive(Debug, PartialEq)]
pub struct SendFailure {
    pub pkt: Handle,
    pub err: Error,
}

/// Downward transmit path below a layer
pub trait Lower {
    /// Take ownership of the buffer and begin a transmission attempt.
    ///
    /// A completion is delivered later via the receiving side's
    /// `send_done` path. On error the handle returns to the caller.
    fn send(&mut self, pool: &mut Pool, pkt: Handle) -> Result<(), SendFailure>;
}

/// Upward delivery path above a layer
pub trait Upper {
    /// Deliver a received buffer up the stack
    fn receive<R: Reporter>(&mut self, pool: &mut Pool, reporter: &mut R, pkt: Handle);

    /// Deliver a transmission completion, routed towards the buffer
    /// creator
    fn send_done<R: Reporter>(
        &mut self,
        pool: &mut Pool,
        reporter: &mut R,
        pkt: Handle,
        res: TxResult,
    );
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    use super::{Lower, SendFailure, TxResult, Upper};
    use crate::error::Error;
    use crate::pool::{Handle, Pool};
    use crate::report::Reporter;
    use crate::ComponentId;

    #[derive(Debug, Default)]
    struct LowerInner {
        sent: Vec<Handle>,
        fail: Option<Error>,
    }

    /// Mock transmit path capturing sent buffers
    #[derive(Clone, Debug)]
    pub struct MockLower(Arc<Mutex<LowerInner>>);

    impl MockLower {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(LowerInner::default())))
        }

        /// Fail subsequent sends with the given error
        pub fn set_fail(&mut self, err: Option<Error>) {
            self.0.lock().unwrap().fail = err;
        }

        /// Number of buffers accepted so far
        pub fn sent_count(&self) -> usize {
            self.0.lock().unwrap().sent.len()
        }

        /// Drain the captured buffers
        pub fn take_sent(&mut self) -> Vec<Handle> {
            core::mem::take(&mut self.0.lock().unwrap().sent)
        }
    }

    impl Lower for MockLower {
        fn send(&mut self, pool: &mut Pool, pkt: Handle) -> Result<(), SendFailure> {
            let mut inner = self.0.lock().unwrap();

            if let Some(err) = inner.fail {
                return Err(SendFailure { pkt, err });
            }

            pool.buf_mut(&pkt).owner = ComponentId::MacLow;
            inner.sent.push(pkt);

            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct UpperInner {
        received: Vec<Handle>,
        completions: Vec<(Handle, TxResult)>,
    }

    /// Mock upper layer capturing deliveries and completions
    #[derive(Clone, Debug)]
    pub struct MockUpper {
        id: ComponentId,
        inner: Arc<Mutex<UpperInner>>,
    }

    impl MockUpper {
        pub fn new(id: ComponentId) -> Self {
            Self {
                id,
                inner: Arc::new(Mutex::new(UpperInner::default())),
            }
        }

        pub fn received_count(&self) -> usize {
            self.inner.lock().unwrap().received.len()
        }

        pub fn take_received(&mut self) -> Vec<Handle> {
            core::mem::take(&mut self.inner.lock().unwrap().received)
        }

        pub fn completion_count(&self) -> usize {
            self.inner.lock().unwrap().completions.len()
        }

        pub fn take_completions(&mut self) -> Vec<(Handle, TxResult)> {
            core::mem::take(&mut self.inner.lock().unwrap().completions)
        }
    }

    impl Upper for MockUpper {
        fn receive<R: Reporter>(&mut self, pool: &mut Pool, _reporter: &mut R, pkt: Handle) {
            pool.buf_mut(&pkt).owner = self.id;
            self.inner.lock().unwrap().received.push(pkt);
        }

        fn send_done<R: Reporter>(
            &mut self,
            pool: &mut Pool,
            _reporter: &mut R,
            pkt: Handle,
            res: TxResult,
        ) {
            pool.buf_mut(&pkt).owner = self.id;
            self.inner.lock().unwrap().completions.push((pkt, res));
        }
    }
}
