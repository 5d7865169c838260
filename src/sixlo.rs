//! 6LoWPAN adaptation relay
//!
//! Carries datagrams between the port demultiplexer above and the MAC
//! scheduler below. Header compression itself lives in a separate codec;
//! this layer only frames each datagram with the uncompressed-IPv6
//! dispatch octet and applies the ownership and completion-routing rules
//! of [`crate::layer`].
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::trace;

use crate::beacon;
use crate::error::Error;
use crate::layer::{Lower, SendFailure, TxResult, Upper};
use crate::pool::{Handle, Pool};
use crate::report::Reporter;
use crate::ComponentId;

/// Uncompressed IPv6 dispatch per [RFC4944 Section 5.1](https://tools.ietf.org/html/rfc4944#section-5.1)
pub const DISPATCH_IPV6: u8 = 0b0100_0001;

/// Adaptation-layer relay over an upper consumer `U`
pub struct SixLo<U> {
    upper: U,
}

impl<U> SixLo<U> {
    pub fn new(upper: U) -> Self {
        Self { upper }
    }

    pub fn upper(&self) -> &U {
        &self.upper
    }

    pub fn upper_mut(&mut self) -> &mut U {
        &mut self.upper
    }
}

impl<U: Upper> SixLo<U> {
    /// Send a datagram down via the scheduler relay
    pub fn send<L: Lower>(
        &mut self,
        pool: &mut Pool,
        sched: &mut beacon::Scheduler,
        lower: &mut L,
        pkt: Handle,
    ) -> Result<(), SendFailure> {
        {
            let buf = pool.buf_mut(&pkt);
            buf.owner = ComponentId::SixLo;

            if let Err(err) = buf.reserve_header(1) {
                return Err(SendFailure { pkt, err });
            }
            buf.payload_mut()[0] = DISPATCH_IPV6;
        }

        match sched.send(pool, lower, pkt) {
            Ok(()) => Ok(()),
            Err(SendFailure { pkt, err }) => {
                // Back out this layer's header so the caller can retry
                // the datagram cleanly
                let _ = pool.buf_mut(&pkt).strip_header(1);
                Err(SendFailure { pkt, err })
            }
        }
    }
}

impl<U: Upper> Upper for SixLo<U> {
    fn receive<R: Reporter>(&mut self, pool: &mut Pool, reporter: &mut R, pkt: Handle) {
        pool.buf_mut(&pkt).owner = ComponentId::SixLo;

        let dispatch = pool.buf(&pkt).payload().first().copied();
        match dispatch {
            Some(DISPATCH_IPV6) => (),
            d => {
                reporter.error(
                    ComponentId::SixLo,
                    Error::UnknownDispatch,
                    d.unwrap_or(0) as u16,
                    0,
                );
                if let Err(e) = pool.free(pkt) {
                    reporter.error(ComponentId::SixLo, e, 0, 0);
                }
                return;
            }
        }

        trace!("Datagram RX");

        // Dispatch octet is consumed here, the datagram continues up
        if let Err(e) = pool.buf_mut(&pkt).strip_header(1) {
            reporter.error(ComponentId::SixLo, e, 0, 0);
            if let Err(e) = pool.free(pkt) {
                reporter.error(ComponentId::SixLo, e, 0, 0);
            }
            return;
        }

        self.upper.receive(pool, reporter, pkt);
    }

    fn send_done<R: Reporter>(
        &mut self,
        pool: &mut Pool,
        reporter: &mut R,
        pkt: Handle,
        res: TxResult,
    ) {
        let creator = {
            let buf = pool.buf_mut(&pkt);
            buf.owner = ComponentId::SixLo;
            buf.creator
        };

        if creator == ComponentId::SixLo {
            // This layer originates no traffic of its own
            reporter.error(ComponentId::SixLo, Error::UnexpectedSendDone, 0, 0);
            if let Err(e) = pool.free(pkt) {
                reporter.error(ComponentId::SixLo, e, 0, 0);
            }
        } else {
            self.upper.send_done(pool, reporter, pkt, res);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::mock::{MockLower, MockUpper};
    use crate::packet::FrameType;
    use crate::report::mock::MockReporter;

    fn setup() -> (
        Pool,
        beacon::Scheduler,
        SixLo<MockUpper>,
        MockLower,
        MockReporter,
    ) {
        (
            Pool::new(),
            beacon::Scheduler::new(beacon::Config::default()),
            SixLo::new(MockUpper::new(ComponentId::Udp)),
            MockLower::new(),
            MockReporter::new(),
        )
    }

    #[test]
    fn tx_prepends_dispatch() {
        let (mut pool, mut sched, mut sixlo, mut lower, _reporter) = setup();

        let pkt = pool.alloc(ComponentId::App).unwrap();
        {
            let buf = pool.buf_mut(&pkt);
            buf.reserve_header(3).unwrap();
            buf.payload_mut().copy_from_slice(&[1, 2, 3]);
        }

        sixlo
            .send(&mut pool, &mut sched, &mut lower, pkt)
            .unwrap();

        let pkt = lower.take_sent().pop().unwrap();
        let buf = pool.buf(&pkt);
        assert_eq!(buf.payload(), &[DISPATCH_IPV6, 1, 2, 3]);
        assert_eq!(buf.frame_type, FrameType::Data);
        assert_eq!(buf.creator, ComponentId::App);
    }

    #[test]
    fn tx_failure_returns_clean_buffer() {
        let (mut pool, mut sched, mut sixlo, mut lower, _reporter) = setup();

        lower.set_fail(Some(Error::Busy));

        let pkt = pool.alloc(ComponentId::App).unwrap();
        {
            let buf = pool.buf_mut(&pkt);
            buf.reserve_header(1).unwrap();
            buf.payload_mut()[0] = 9;
        }

        let SendFailure { pkt, err } = sixlo
            .send(&mut pool, &mut sched, &mut lower, pkt)
            .unwrap_err();

        // Ownership and an unmodified payload both came back
        assert_eq!(err, Error::Busy);
        assert_eq!(pool.buf(&pkt).payload(), &[9]);

        pool.free(pkt).unwrap();
    }

    #[test]
    fn rx_strips_dispatch() {
        let (mut pool, _sched, mut sixlo, _lower, mut reporter) = setup();

        let pkt = pool.alloc(ComponentId::MacLow).unwrap();
        pool.buf_mut(&pkt).load(&[DISPATCH_IPV6, 5, 6]).unwrap();

        sixlo.receive(&mut pool, &mut reporter, pkt);

        let pkt = sixlo.upper_mut().take_received().pop().unwrap();
        assert_eq!(pool.buf(&pkt).payload(), &[5, 6]);
        assert_eq!(reporter.error_count(), 0);

        pool.free(pkt).unwrap();
    }

    #[test]
    fn rx_unknown_dispatch_freed() {
        let (mut pool, _sched, mut sixlo, _lower, mut reporter) = setup();

        let pkt = pool.alloc(ComponentId::MacLow).unwrap();
        pool.buf_mut(&pkt).load(&[0x00, 5, 6]).unwrap();

        sixlo.receive(&mut pool, &mut reporter, pkt);

        assert_eq!(sixlo.upper().received_count(), 0);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(
            reporter.errors(),
            [(ComponentId::SixLo, Error::UnknownDispatch, 0, 0)]
        );
    }

    #[test]
    fn rx_empty_frame_freed() {
        let (mut pool, _sched, mut sixlo, _lower, mut reporter) = setup();

        let pkt = pool.alloc(ComponentId::MacLow).unwrap();

        sixlo.receive(&mut pool, &mut reporter, pkt);

        assert_eq!(pool.in_use(), 0);
        assert_eq!(reporter.error_count(), 1);
    }

    #[test]
    fn completion_forwarded_to_upper() {
        let (mut pool, _sched, mut sixlo, _lower, mut reporter) = setup();

        let pkt = pool.alloc(ComponentId::Echo).unwrap();
        sixlo.send_done(&mut pool, &mut reporter, pkt, TxResult::Done);

        assert_eq!(sixlo.upper().completion_count(), 1);

        let (pkt, _res) = sixlo.upper_mut().take_completions().pop().unwrap();
        pool.free(pkt).unwrap();
    }

    #[test]
    fn own_completion_unexpected() {
        let (mut pool, _sched, mut sixlo, _lower, mut reporter) = setup();

        let pkt = pool.alloc(ComponentId::SixLo).unwrap();
        sixlo.send_done(&mut pool, &mut reporter, pkt, TxResult::Done);

        assert_eq!(pool.in_use(), 0);
        assert_eq!(
            reporter.errors(),
            [(ComponentId::SixLo, Error::UnexpectedSendDone, 0, 0)]
        );
    }
}
