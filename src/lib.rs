//! LPWAN mesh stack core: packet buffer pool, layered dispatch protocol
//! and MAC advertisement scheduling for time-slotted low-power radios.
//!
//! The stack multiplexes one radio and a fixed pool of packet buffers
//! across several protocol layers without an allocator and without
//! threads. Buffers carry their own `creator`/`owner` identity so that
//! transmission completions can be routed back to their origin through
//! any number of relaying layers, see [`layer`] for the contract.

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod timer;

pub mod error;

pub mod report;

pub mod packet;

pub mod pool;

pub mod layer;

pub mod beacon;

pub mod sixlo;

pub mod apps;

pub mod stack;

pub mod prelude;


/// Timestamps are 64-bit in milliseconds
pub type Ts = u64;

/// Stack component identifiers.
///
/// Stamped into each packet buffer as `creator` and `owner`: the creator
/// routes completion notifications back to their origin, the owner tracks
/// which component is currently responsible for the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ComponentId {
    /// No component, used for free buffers
    Null,
    /// Buffer pool itself (diagnostics only)
    Pool,
    /// Slotted transmit path below the scheduler
    MacLow,
    /// Advertisement scheduler / data relay
    Beacon,
    /// 6LoWPAN adaptation relay
    SixLo,
    /// Datagram port demultiplexer
    Udp,
    /// Terminal payload consumer
    Sink,
    /// Echo responder
    Echo,
    /// Host application datagrams
    App,
}
