//! Stack composition
//!
//! Owns the buffer pool and every layer, and serialises all events
//! (timer ticks, frame deliveries, transmission completions and host
//! sends) into the single run-to-completion loop the ownership protocol
//! assumes. Nothing here blocks; waiting is expressed by returning to the
//! event loop and re-entering on the next timer or radio event.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use heapless::Deque;
use log::debug;

use crate::apps::Demux;
use crate::beacon;
use crate::error::Error;
use crate::layer::{Lower, SendFailure, TxResult};
use crate::packet::V6Addr;
use crate::pool::{Handle, Pool};
use crate::report::Reporter;
use crate::sixlo::SixLo;
use crate::timer::Timer;
use crate::ComponentId;

/// Deferred transmissions held while the send path is busy
pub const PENDING_TX_LEN: usize = 4;

/// Stack configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub beacon: beacon::Config,
}

/// Mesh stack core, generic over the lower transmit path (L), a timer (T)
/// and a diagnostics reporter (R).
pub struct Stack<L, T, R> {
    pool: Pool,
    timer: T,
    reporter: R,

    lower: L,
    sched: beacon::Scheduler,
    sixlo: SixLo<Demux>,

    pending: Deque<Handle, PENDING_TX_LEN>,
}

impl<L, T, R> Stack<L, T, R>
where
    L: Lower,
    T: Timer,
    R: Reporter,
{
    pub fn new(lower: L, timer: T, reporter: R, config: Config) -> Self {
        debug!("Setup stack at {} ms", timer.ticks_ms());

        Self {
            pool: Pool::new(),
            sched: beacon::Scheduler::new(config.beacon),
            sixlo: SixLo::new(Demux::new()),
            pending: Deque::new(),
            lower,
            timer,
            reporter,
        }
    }

    /// Periodic driver, called from the event loop
    pub fn tick(&mut self) {
        let now = self.timer.ticks_ms();

        self.sched
            .tick(now, &mut self.pool, &mut self.lower, &mut self.reporter);

        self.flush_pending();
        self.poll_echo();
    }

    /// Inbound frame from the lower MAC
    pub fn deliver(&mut self, pkt: Handle) {
        self.sched
            .receive(&mut self.pool, &mut self.sixlo, &mut self.reporter, pkt);
    }

    /// Transmission completion from the lower MAC, routed to the buffer
    /// creator
    pub fn transmit_done(&mut self, pkt: Handle, res: TxResult) {
        self.sched
            .send_done(&mut self.pool, &mut self.sixlo, &mut self.reporter, pkt, res);

        // The path below may have cleared, move waiting traffic
        self.flush_pending();
        self.poll_echo();
    }

    /// Send a host datagram.
    ///
    /// Accepted datagrams are either handed straight down the stack or
    /// deferred until the transmit path clears; completion is counted at
    /// the port demultiplexer.
    pub fn send(
        &mut self,
        dest: V6Addr,
        src_port: u16,
        dst_port: u16,
        data: &[u8],
    ) -> Result<(), Error> {
        let pkt = match self.pool.alloc(ComponentId::App) {
            Ok(pkt) => pkt,
            Err(e) => {
                self.reporter.error(ComponentId::App, e, 0, 0);
                return Err(e);
            }
        };

        if let Err(e) = self.pool.buf_mut(&pkt).reserve_header(data.len()) {
            self.reporter
                .error(ComponentId::App, e, data.len() as u16, 0);
            if let Err(e) = self.pool.free(pkt) {
                self.reporter.error(ComponentId::App, e, 0, 0);
            }
            return Err(e);
        }

        {
            let buf = self.pool.buf_mut(&pkt);
            buf.l3_addr = dest;
            buf.l4_src_port = src_port;
            buf.l4_dst_port = dst_port;
            buf.payload_mut().copy_from_slice(data);
        }

        match self
            .sixlo
            .send(&mut self.pool, &mut self.sched, &mut self.lower, pkt)
        {
            Ok(()) => Ok(()),
            Err(SendFailure {
                pkt,
                err: Error::Busy,
            }) => {
                // Hold the datagram until the path clears
                debug!("Send path busy, datagram deferred");
                match self.pending.push_back(pkt) {
                    Ok(()) => Ok(()),
                    Err(pkt) => {
                        self.reporter.error(ComponentId::App, Error::Busy, 0, 0);
                        if let Err(e) = self.pool.free(pkt) {
                            self.reporter.error(ComponentId::App, e, 0, 0);
                        }
                        Err(Error::Busy)
                    }
                }
            }
            Err(SendFailure { pkt, err }) => {
                self.reporter.error(ComponentId::App, err, 0, 0);
                if let Err(e) = self.pool.free(pkt) {
                    self.reporter.error(ComponentId::App, e, 0, 0);
                }
                Err(err)
            }
        }
    }

    /// Allocate a buffer for an inbound frame on behalf of the driver
    /// glue
    pub fn alloc_rx(&mut self) -> Result<Handle, Error> {
        match self.pool.alloc(ComponentId::MacLow) {
            Ok(pkt) => Ok(pkt),
            Err(e) => {
                self.reporter.error(ComponentId::MacLow, e, 0, 0);
                Err(e)
            }
        }
    }

    /// Periodic diagnostics to the status sink
    pub fn status(&mut self) {
        self.sched.status(&mut self.reporter);
        self.reporter
            .status(ComponentId::Pool, self.pool.in_use() as u16);
    }

    /// Access the buffer pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Mutable access to the buffer pool, used by driver glue to fill
    /// inbound frames
    pub fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    /// Access the advertisement scheduler
    pub fn scheduler(&self) -> &beacon::Scheduler {
        &self.sched
    }

    /// Access the application adapters
    pub fn apps(&self) -> &Demux {
        self.sixlo.upper()
    }

    fn flush_pending(&mut self) {
        while let Some(pkt) = self.pending.pop_front() {
            match self
                .sixlo
                .send(&mut self.pool, &mut self.sched, &mut self.lower, pkt)
            {
                Ok(()) => (),
                Err(SendFailure {
                    pkt,
                    err: Error::Busy,
                }) => {
                    // Still busy, retry on a later event
                    if let Err(pkt) = self.pending.push_front(pkt) {
                        // Slot was vacated by the pop above, cannot occur
                        self.drop_failed(pkt, Error::Busy);
                    }
                    break;
                }
                Err(SendFailure { pkt, err }) => self.drop_failed(pkt, err),
            }
        }
    }

    fn poll_echo(&mut self) {
        let reply = self
            .sixlo
            .upper_mut()
            .echo
            .poll(&mut self.pool, &mut self.reporter);

        if let Some(reply) = reply {
            match self
                .sixlo
                .send(&mut self.pool, &mut self.sched, &mut self.lower, reply)
            {
                Ok(()) => (),
                Err(SendFailure {
                    pkt,
                    err: Error::Busy,
                }) => {
                    if let Err(pkt) = self.pending.push_back(pkt) {
                        self.drop_failed(pkt, Error::Busy);
                    }
                }
                Err(SendFailure { pkt, err }) => self.drop_failed(pkt, err),
            }
        }
    }

    /// Dispose of a buffer whose downward send failed hard, on behalf of
    /// its creator
    fn drop_failed(&mut self, pkt: Handle, err: Error) {
        let creator = self.pool.buf(&pkt).creator;

        match creator {
            ComponentId::Echo => self.sixlo.upper_mut().echo.send_failed(
                &mut self.pool,
                &mut self.reporter,
                pkt,
                err,
            ),
            _ => {
                self.reporter.error(creator, err, 0, 0);
                if let Err(e) = self.pool.free(pkt) {
                    self.reporter.error(creator, e, 0, 0);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::apps::ECHO_PORT;
    use crate::beacon::State;
    use crate::layer::mock::MockLower;
    use crate::packet::FrameType;
    use crate::report::mock::MockReporter;
    use crate::sixlo::DISPATCH_IPV6;
    use crate::timer::mock::MockTimer;

    fn setup() -> (
        Stack<MockLower, MockTimer, MockReporter>,
        MockLower,
        MockTimer,
        MockReporter,
    ) {
        let _ = simplelog::SimpleLogger::init(
            log::LevelFilter::Debug,
            simplelog::Config::default(),
        );

        let lower = MockLower::new();
        let timer = MockTimer::new();
        let reporter = MockReporter::new();

        let stack = Stack::new(
            lower.clone(),
            timer.clone(),
            reporter.clone(),
            Config::default(),
        );

        (stack, lower, timer, reporter)
    }

    #[test]
    fn beacon_cadence() {
        let (mut stack, mut lower, mut timer, _reporter) = setup();

        // First tick arms the scheduler
        stack.tick();
        assert_eq!(lower.sent_count(), 0);

        // Advertisement at the period boundary
        timer.set_ms(1000);
        stack.tick();
        assert_eq!(lower.sent_count(), 1);
        assert_eq!(stack.scheduler().state(), State::Sending);

        // Nothing further mid-period
        timer.set_ms(1500);
        stack.tick();
        assert_eq!(lower.sent_count(), 1);

        // Completion re-opens the scheduler, next period sends again
        let adv = lower.take_sent().pop().unwrap();
        stack.transmit_done(adv, TxResult::Done);
        assert_eq!(stack.scheduler().state(), State::Idle);

        timer.set_ms(2000);
        stack.tick();
        assert_eq!(lower.sent_count(), 1);
        assert_eq!(stack.pool().in_use(), 1);
    }

    #[test]
    fn datagram_roundtrip() {
        let (mut stack, mut lower, _timer, reporter) = setup();

        stack
            .send(V6Addr([1u8; 16]), 40000, 9, b"hi")
            .unwrap();
        assert_eq!(lower.sent_count(), 1);

        let pkt = lower.take_sent().pop().unwrap();
        {
            let buf = stack.pool().buf(&pkt);
            assert_eq!(buf.creator, ComponentId::App);
            assert_eq!(buf.frame_type, FrameType::Data);
            assert_eq!(buf.payload(), &[DISPATCH_IPV6, b'h', b'i']);
        }

        // Completion travels back up through scheduler and adaptation
        // relays to the creator's terminal handler
        stack.transmit_done(pkt, TxResult::Done);

        assert_eq!(stack.apps().datagrams_done(), 1);
        assert_eq!(stack.pool().in_use(), 0);
        assert_eq!(reporter.error_count(), 0);
    }

    #[test]
    fn datagram_deferred_while_busy() {
        let (mut stack, mut lower, _timer, _reporter) = setup();

        lower.set_fail(Some(Error::Busy));
        stack.send(V6Addr::UNSPECIFIED, 1, 2, &[3]).unwrap();

        assert_eq!(lower.sent_count(), 0);
        assert_eq!(stack.pool().in_use(), 1);

        // Path clears, the deferred datagram drains on the next event
        lower.set_fail(None);
        stack.tick();

        assert_eq!(lower.sent_count(), 1);

        // The retried datagram carries exactly one dispatch octet
        let pkt = lower.take_sent().pop().unwrap();
        assert_eq!(stack.pool().buf(&pkt).payload(), &[DISPATCH_IPV6, 3]);
    }

    #[test]
    fn echo_request_response() {
        let (mut stack, mut lower, _timer, reporter) = setup();

        // Inbound request: dispatch octet, reply count 2, one body byte
        let pkt = stack.alloc_rx().unwrap();
        {
            let buf = stack.pool_mut().buf_mut(&pkt);
            buf.frame_type = FrameType::Data;
            buf.l4_src_port = 777;
            buf.l4_dst_port = ECHO_PORT;
            buf.load(&[DISPATCH_IPV6, 2, 0xaa]).unwrap();
        }

        stack.deliver(pkt);
        assert!(stack.apps().echo.busy());

        // First reply leaves on the next event
        stack.tick();
        assert_eq!(lower.sent_count(), 1);

        let reply = lower.take_sent().pop().unwrap();
        {
            let buf = stack.pool().buf(&reply);
            assert_eq!(buf.creator, ComponentId::Echo);
            assert_eq!(buf.l4_dst_port, 777);
            assert_eq!(buf.payload(), &[DISPATCH_IPV6, 0xaa]);
        }

        // Completion releases the next reply immediately
        stack.transmit_done(reply, TxResult::Done);
        assert_eq!(lower.sent_count(), 1);

        let reply = lower.take_sent().pop().unwrap();
        stack.transmit_done(reply, TxResult::Done);

        // Exchange complete, request buffer released, nothing leaked
        assert!(!stack.apps().echo.busy());
        assert_eq!(stack.pool().in_use(), 0);
        assert_eq!(reporter.error_count(), 0);
    }

    #[test]
    fn unknown_frame_type_dropped() {
        let (mut stack, _lower, _timer, reporter) = setup();

        let pkt = stack.alloc_rx().unwrap();
        stack.pool_mut().buf_mut(&pkt).frame_type = FrameType::Command;

        stack.deliver(pkt);

        assert_eq!(stack.pool().in_use(), 0);
        assert_eq!(
            reporter.errors(),
            [(
                ComponentId::Beacon,
                Error::UnknownFrameType,
                FrameType::Command.code() as u16,
                0
            )]
        );
    }

    #[test]
    fn status_reports() {
        let (mut stack, _lower, _timer, reporter) = setup();

        stack.status();

        let statuses = reporter.statuses();
        assert_eq!(statuses[0].0, ComponentId::Beacon);
        assert_eq!(statuses[1], (ComponentId::Pool, 0));
    }
}
