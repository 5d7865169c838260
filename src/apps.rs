//! Upper-layer adapters
//!
//! Small application endpoints demonstrating the dispatch contract from
//! above: a terminal consumer that discards everything delivered to it,
//! an echo responder that originates counted replies, and the port
//! demultiplexer routing between them.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::{debug, info, warn};

use crate::error::Error;
use crate::layer::{TxResult, Upper};
use crate::packet::MAX_PAYLOAD_LEN;
use crate::pool::{Handle, Pool};
use crate::report::Reporter;
use crate::ComponentId;

/// Well-known echo responder port
pub const ECHO_PORT: u16 = 7;

/// Terminal payload consumer: logs and discards everything delivered
#[derive(Debug, Default)]
pub struct Sink {
    received: u32,
}

impl Sink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads consumed
    pub fn received(&self) -> u32 {
        self.received
    }
}

impl Upper for Sink {
    fn receive<R: Reporter>(&mut self, pool: &mut Pool, reporter: &mut R, pkt: Handle) {
        pool.buf_mut(&pkt).owner = ComponentId::Sink;

        {
            let buf = pool.buf(&pkt);
            info!(
                "Sink RX {} bytes from port {}",
                buf.payload().len(),
                buf.l4_src_port
            );
        }
        self.received = self.received.saturating_add(1);

        if let Err(e) = pool.free(pkt) {
            reporter.error(ComponentId::Sink, e, 0, 0);
        }
    }

    fn send_done<R: Reporter>(
        &mut self,
        pool: &mut Pool,
        reporter: &mut R,
        pkt: Handle,
        _res: TxResult,
    ) {
        // This adapter never transmits
        pool.buf_mut(&pkt).owner = ComponentId::Sink;
        reporter.error(ComponentId::Sink, Error::UnexpectedSendDone, 0, 0);
        if let Err(e) = pool.free(pkt) {
            reporter.error(ComponentId::Sink, e, 0, 0);
        }
    }
}

/// Echo responder.
///
/// A request's first payload byte asks for that many copies of the
/// remainder to be sent back, one at a time. The stored request buffer is
/// held (owned) for the duration of the exchange and released when the
/// last reply completes; a second request arriving mid-exchange is
/// dropped.
pub struct Echo {
    request: Option<Handle>,
    replies_left: u8,
    in_flight: bool,
}

impl Echo {
    pub fn new() -> Self {
        Self {
            request: None,
            replies_left: 0,
            in_flight: false,
        }
    }

    /// An exchange is in progress
    pub fn busy(&self) -> bool {
        self.request.is_some()
    }

    /// Produce the next pending reply, if any.
    ///
    /// The caller owns the returned buffer and pushes it down the send
    /// path; [`send_failed`](Self::send_failed) gives it back if that
    /// fails.
    pub fn poll<R: Reporter>(&mut self, pool: &mut Pool, reporter: &mut R) -> Option<Handle> {
        if self.in_flight || self.replies_left == 0 {
            return None;
        }

        // Address the reply back at the requester, ports swapped; the
        // echoed body is everything after the count byte
        let (l3_addr, src_port, dst_port, body, body_len) = {
            let rq = match &self.request {
                Some(r) => pool.buf(r),
                None => return None,
            };
            let p = rq.payload();

            let mut body = [0u8; MAX_PAYLOAD_LEN];
            let body_len = p.len().saturating_sub(1);
            if body_len > 0 {
                body[..body_len].copy_from_slice(&p[1..]);
            }

            (rq.l3_addr, rq.l4_dst_port, rq.l4_src_port, body, body_len)
        };

        let reply = match pool.alloc(ComponentId::Echo) {
            Ok(p) => p,
            Err(e) => {
                reporter.error(ComponentId::Echo, e, 0, 0);
                self.reset(pool, reporter);
                return None;
            }
        };

        {
            let buf = pool.buf_mut(&reply);
            buf.l3_addr = l3_addr;
            buf.l4_src_port = src_port;
            buf.l4_dst_port = dst_port;
        }

        if let Err(e) = pool.buf_mut(&reply).reserve_header(body_len) {
            reporter.error(ComponentId::Echo, e, body_len as u16, 0);
            if let Err(e) = pool.free(reply) {
                reporter.error(ComponentId::Echo, e, 0, 0);
            }
            self.reset(pool, reporter);
            return None;
        }
        pool.buf_mut(&reply)
            .payload_mut()
            .copy_from_slice(&body[..body_len]);

        self.replies_left -= 1;
        self.in_flight = true;

        debug!("Echo reply TX, {} left", self.replies_left);

        Some(reply)
    }

    /// Take back a reply whose downward send failed, aborting the
    /// exchange
    pub fn send_failed<R: Reporter>(
        &mut self,
        pool: &mut Pool,
        reporter: &mut R,
        pkt: Handle,
        err: Error,
    ) {
        reporter.error(ComponentId::Echo, err, 0, 0);
        if let Err(e) = pool.free(pkt) {
            reporter.error(ComponentId::Echo, e, 0, 0);
        }
        self.in_flight = false;
        self.reset(pool, reporter);
    }

    fn reset<R: Reporter>(&mut self, pool: &mut Pool, reporter: &mut R) {
        self.replies_left = 0;
        if let Some(rq) = self.request.take() {
            if let Err(e) = pool.free(rq) {
                reporter.error(ComponentId::Echo, e, 0, 0);
            }
        }
    }
}

impl Upper for Echo {
    fn receive<R: Reporter>(&mut self, pool: &mut Pool, reporter: &mut R, pkt: Handle) {
        pool.buf_mut(&pkt).owner = ComponentId::Echo;

        if self.request.is_some() {
            // One exchange at a time
            debug!("Echo busy, dropping request");
            if let Err(e) = pool.free(pkt) {
                reporter.error(ComponentId::Echo, e, 0, 0);
            }
            return;
        }

        let count = pool.buf(&pkt).payload().first().copied().unwrap_or(0);
        if count == 0 {
            // Nothing requested
            if let Err(e) = pool.free(pkt) {
                reporter.error(ComponentId::Echo, e, 0, 0);
            }
            return;
        }

        debug!("Echo request for {} replies", count);

        self.replies_left = count;
        self.request = Some(pkt);
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
            buf.owner = ComponentId::Echo;
            buf.creator
        };

        if creator != ComponentId::Echo {
            reporter.error(ComponentId::Echo, Error::UnexpectedSendDone, 0, 0);
        }
        if let Err(e) = pool.free(pkt) {
            reporter.error(ComponentId::Echo, e, 0, 0);
        }

        self.in_flight = false;

        if res == TxResult::Failed {
            // Lost reply, carry on with the rest of the exchange
            warn!("Echo reply TX failed");
        }

        if self.replies_left == 0 {
            self.reset(pool, reporter);
        }
    }
}

/// Datagram port demultiplexer.
///
/// Routes received datagrams up by destination port and completions up
/// by buffer creator; host application datagram completions terminate
/// here at the stack boundary.
pub struct Demux {
    pub sink: Sink,
    pub echo: Echo,

    datagrams_done: u32,
    datagrams_failed: u32,
}

impl Demux {
    pub fn new() -> Self {
        Self {
            sink: Sink::new(),
            echo: Echo::new(),
            datagrams_done: 0,
            datagrams_failed: 0,
        }
    }

    /// Completed host datagrams
    pub fn datagrams_done(&self) -> u32 {
        self.datagrams_done
    }

    /// Failed host datagrams
    pub fn datagrams_failed(&self) -> u32 {
        self.datagrams_failed
    }
}

impl Upper for Demux {
    fn receive<R: Reporter>(&mut self, pool: &mut Pool, reporter: &mut R, pkt: Handle) {
        pool.buf_mut(&pkt).owner = ComponentId::Udp;

        let port = pool.buf(&pkt).l4_dst_port;
        match port {
            ECHO_PORT => self.echo.receive(pool, reporter, pkt),
            _ => self.sink.receive(pool, reporter, pkt),
        }
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
            buf.owner = ComponentId::Udp;
            buf.creator
        };

        match creator {
            ComponentId::Echo => self.echo.send_done(pool, reporter, pkt, res),
            ComponentId::Sink => self.sink.send_done(pool, reporter, pkt, res),
            ComponentId::App => {
                // Host datagram completed at the stack boundary
                match res {
                    TxResult::Done => {
                        self.datagrams_done = self.datagrams_done.saturating_add(1)
                    }
                    TxResult::Failed => {
                        warn!("Host datagram TX failed");
                        self.datagrams_failed = self.datagrams_failed.saturating_add(1)
                    }
                }
                if let Err(e) = pool.free(pkt) {
                    reporter.error(ComponentId::Udp, e, 0, 0);
                }
            }
            _ => {
                reporter.error(ComponentId::Udp, Error::UnexpectedSendDone, 0, 0);
                if let Err(e) = pool.free(pkt) {
                    reporter.error(ComponentId::Udp, e, 0, 0);
                }
            }
        }
    }
}
