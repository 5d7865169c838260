//! Stack crate prelude
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub use crate::{ComponentId, Ts};

pub use crate::error::Error;

pub use crate::timer::Timer as StackTimer;

pub use crate::report::{LogReporter, Reporter};

pub use crate::packet::{FrameType, PacketBuffer, V6Addr, MAX_PAYLOAD_LEN};

pub use crate::pool::{Handle, Pool, PoolStats, POOL_LEN};

pub use crate::layer::{Lower, SendFailure, TxResult, Upper};

pub use crate::beacon::{self, Scheduler};

pub use crate::sixlo::SixLo;

pub use crate::apps::{Demux, Echo, Sink, ECHO_PORT};

pub use crate::stack::Stack;

pub use ieee802154::mac::{Address as MacAddress, ExtendedAddress, PanId, ShortAddress};
