//! Periodic advertisement scheduler and MAC-layer relay
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::{debug, trace, warn};

use crate::error::Error;
use crate::layer::{Lower, SendFailure, TxResult, Upper};
use crate::packet::{l2_broadcast, FrameType};
use crate::pool::{Handle, Pool};
use crate::report::Reporter;
use crate::{ComponentId, Ts};

/// Space reserved in front of each advertisement for the 5-byte ASN.
/// The actual value is written by the slotted layer at transmit time.
pub const ADV_HEADER_LEN: usize = 5;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Enable periodic advertisement transmission
    pub enabled: bool,

    /// Advertisement period in milliseconds
    pub advert_period_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            advert_period_ms: 1000,
        }
    }
}

/// Scheduler states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No advertisement outstanding
    Idle,
    /// One advertisement handed down, awaiting its completion
    Sending,
}

/// Scheduler statistics
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stats {
    pub sent: u32,
    pub skipped_busy: u32,
    pub alloc_fail: u32,
    pub tx_fail: u32,
    pub unexpected_done: u32,
}

/// Periodic advertisement scheduler.
///
/// Sits between the adaptation layer above and the slotted transmit path
/// below. Each period it originates one broadcast advertisement; at most
/// one is outstanding at a time, ticks landing while the previous one is
/// still in flight are dropped rather than queued, as a held-back
/// advertisement would carry stale timing content by the time it left the
/// radio. A failed advertisement is not retried, the next period sends a
/// fresh one.
///
/// Data traffic from above is relayed down unchanged, and completions
/// from below are routed up by buffer creator.
pub struct Scheduler {
    config: Config,

    state: State,
    next_adv: Ts,

    stats: Stats,
}

impl Scheduler {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: State::Idle,
            next_adv: 0,
            stats: Stats::default(),
        }
    }

    /// Fetch the scheduler state
    pub fn state(&self) -> State {
        self.state
    }

    /// Fetch scheduler statistics
    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }

    /// Periodic driver, called from the event loop.
    ///
    /// Generates one advertisement per configured period once armed.
    pub fn tick<L: Lower, R: Reporter>(
        &mut self,
        now: Ts,
        pool: &mut Pool,
        lower: &mut L,
        reporter: &mut R,
    ) {
        if !self.config.enabled {
            return;
        }

        // Arm on the first tick
        if self.next_adv == 0 {
            self.next_adv = now + self.config.advert_period_ms as Ts;
            trace!("Armed first advertisement for {} ms", self.next_adv);
            return;
        }

        if now < self.next_adv {
            return;
        }
        self.next_adv += self.config.advert_period_ms as Ts;

        // Only send if the previous advertisement completed; the frame
        // may sit in the queue below for a long time, for example while
        // the node is still synchronising
        if self.state == State::Sending {
            debug!("Advertisement pending, dropping tick at {} ms", now);
            self.stats.skipped_busy = self.stats.skipped_busy.saturating_add(1);
            return;
        }

        let adv = match pool.alloc(ComponentId::Beacon) {
            Ok(adv) => adv,
            Err(e) => {
                // Skip this advertisement, the next period retries
                reporter.error(ComponentId::Beacon, e, 0, 0);
                self.stats.alloc_fail = self.stats.alloc_fail.saturating_add(1);
                return;
            }
        };

        {
            let buf = pool.buf_mut(&adv);
            buf.frame_type = FrameType::Beacon;
            buf.l2_addr = l2_broadcast();
        }

        if let Err(e) = pool.buf_mut(&adv).reserve_header(ADV_HEADER_LEN) {
            reporter.error(ComponentId::Beacon, e, ADV_HEADER_LEN as u16, 0);
            if let Err(e) = pool.free(adv) {
                reporter.error(ComponentId::Beacon, e, 0, 0);
            }
            return;
        }

        debug!("Advertisement TX at {} ms", now);

        match lower.send(pool, adv) {
            Ok(()) => {
                self.state = State::Sending;
                self.stats.sent = self.stats.sent.saturating_add(1);
            }
            Err(SendFailure { pkt, err }) => {
                warn!("Advertisement send failed: {:?}", err);
                reporter.error(ComponentId::Beacon, err, 0, 0);
                self.stats.tx_fail = self.stats.tx_fail.saturating_add(1);
                if let Err(e) = pool.free(pkt) {
                    reporter.error(ComponentId::Beacon, e, 0, 0);
                }
            }
        }
    }

    /// Relay a data frame from the layer above down the slotted transmit
    /// path
    pub fn send<L: Lower>(
        &mut self,
        pool: &mut Pool,
        lower: &mut L,
        pkt: Handle,
    ) -> Result<(), SendFailure> {
        {
            let buf = pool.buf_mut(&pkt);
            buf.owner = ComponentId::Beacon;
            buf.frame_type = FrameType::Data;
        }

        lower.send(pool, pkt)
    }

    /// Completion from the slotted layer, routed by buffer creator
    pub fn send_done<U: Upper, R: Reporter>(
        &mut self,
        pool: &mut Pool,
        upper: &mut U,
        reporter: &mut R,
        pkt: Handle,
        res: TxResult,
    ) {
        let creator = {
            let buf = pool.buf_mut(&pkt);
            buf.owner = ComponentId::Beacon;
            buf.creator
        };

        if creator == ComponentId::Beacon {
            // Discard advertisements this component created; success or
            // failure, the next one goes out on the next period
            if self.state != State::Sending {
                reporter.error(ComponentId::Beacon, Error::UnexpectedSendDone, 0, 0);
                self.stats.unexpected_done = self.stats.unexpected_done.saturating_add(1);
            }

            if res == TxResult::Failed {
                warn!("Advertisement TX failed");
                self.stats.tx_fail = self.stats.tx_fail.saturating_add(1);
            }

            if let Err(e) = pool.free(pkt) {
                reporter.error(ComponentId::Beacon, e, 0, 0);
            }

            // Clear to send the next advertisement
            self.state = State::Idle;
        } else {
            // Relayed traffic, the completion belongs further up
            upper.send_done(pool, reporter, pkt, res);
        }
    }

    /// Received frame from the slotted layer, dispatched by frame type
    pub fn receive<U: Upper, R: Reporter>(
        &mut self,
        pool: &mut Pool,
        upper: &mut U,
        reporter: &mut R,
        pkt: Handle,
    ) {
        pool.buf_mut(&pkt).owner = ComponentId::Beacon;

        let frame_type = pool.buf(&pkt).frame_type;
        match frame_type {
            FrameType::Data => upper.receive(pool, reporter, pkt),
            _ => {
                reporter.error(
                    ComponentId::Beacon,
                    Error::UnknownFrameType,
                    frame_type.code() as u16,
                    0,
                );
                if let Err(e) = pool.free(pkt) {
                    reporter.error(ComponentId::Beacon, e, 0, 0);
                }
            }
        }
    }

    /// Report diagnostics to the status sink
    pub fn status<R: Reporter>(&self, reporter: &mut R) {
        reporter.status(ComponentId::Beacon, self.stats.sent as u16);
    }
}
