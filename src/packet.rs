
use core::fmt;

use ieee802154::mac::{Address, PanId, ShortAddress};

use crate::error::Error;
use crate::ComponentId;

/// Payload capacity of a packet buffer
pub const MAX_PAYLOAD_LEN: usize = 128;

/// Link-layer frame type tag.
///
/// Set before a buffer is handed to the MAC, used for dispatch on receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    Beacon,
    Data,
    Ack,
    Command,
    /// Not yet assigned
    Undefined,
}

impl FrameType {
    /// Frame type field value per the 802.15.4 frame control field
    pub fn code(&self) -> u8 {
        match self {
            FrameType::Beacon => 0b000,
            FrameType::Data => 0b001,
            FrameType::Ack => 0b010,
            FrameType::Command => 0b011,
            FrameType::Undefined => 0b111,
        }
    }
}

/// 128-bit network-layer address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct V6Addr(pub [u8; 16]);

impl V6Addr {
    pub const UNSPECIFIED: V6Addr = V6Addr([0u8; 16]);
}

/// Link-layer broadcast address (16-bit, all ones)
pub fn l2_broadcast() -> Address {
    Address::Short(PanId(0xffff), ShortAddress(0xffff))
}

/// Packet buffer moving through the stack.
///
/// The buffer itself, not a separate message object, accumulates headers
/// as it descends towards the radio and is progressively unwrapped on the
/// way up: the valid payload region floats inside a fixed storage area,
/// growing backwards via [`reserve_header`](Self::reserve_header) on send
/// and shrinking forwards via [`strip_header`](Self::strip_header) on
/// receive.
///
/// `creator` identifies the component that allocated the buffer and never
/// changes while it is live; `owner` is updated by every component on
/// entry and tracks who is currently responsible for it.
pub struct PacketBuffer {
    /// Allocating component, routes completion notifications
    pub creator: ComponentId,
    /// Component currently responsible for the buffer
    pub owner: ComponentId,

    /// Link-layer frame type for dispatch
    pub frame_type: FrameType,
    /// Next (TX) or previous (RX) hop link-layer address
    pub l2_addr: Address,
    /// Network-layer destination (TX) or source (RX)
    pub l3_addr: V6Addr,
    /// Transport source port
    pub l4_src_port: u16,
    /// Transport destination port
    pub l4_dst_port: u16,

    /// Receive signal strength, stamped by the driver
    pub rssi: i16,

    data: [u8; MAX_PAYLOAD_LEN],
    offset: usize,
    len: usize,
}

impl Default for PacketBuffer {
    fn default() -> Self {
        Self {
            creator: ComponentId::Null,
            owner: ComponentId::Null,
            frame_type: FrameType::Undefined,
            l2_addr: Address::None,
            l3_addr: V6Addr::UNSPECIFIED,
            l4_src_port: 0,
            l4_dst_port: 0,
            rssi: 0,
            data: [0u8; MAX_PAYLOAD_LEN],
            offset: MAX_PAYLOAD_LEN,
            len: 0,
        }
    }
}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("creator", &self.creator)
            .field("owner", &self.owner)
            .field("frame_type", &self.frame_type)
            .field("len", &self.len)
            .finish()
    }
}

impl PacketBuffer {
    /// Clear all fields back to their free-buffer defaults
    pub(crate) fn reset(&mut self) {
        *self = PacketBuffer::default();
    }

    /// Valid payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.len]
    }

    /// Mutable view of the valid payload bytes
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.offset..self.offset + self.len]
    }

    /// Reserve `n` bytes of header space in front of the current payload.
    ///
    /// Fails without modifying the buffer when the capacity is exhausted.
    pub fn reserve_header(&mut self, n: usize) -> Result<(), Error> {
        if n > self.offset {
            return Err(Error::HeaderOverflow);
        }

        self.offset -= n;
        self.len += n;

        Ok(())
    }

    /// Drop `n` consumed header bytes from the front of the payload
    pub fn strip_header(&mut self, n: usize) -> Result<(), Error> {
        if n > self.len {
            return Err(Error::HeaderOverflow);
        }

        self.offset += n;
        self.len -= n;

        Ok(())
    }

    /// Load a received frame, end-aligned so upper layers strip headers
    /// forwards on the way up
    pub fn load(&mut self, frame: &[u8]) -> Result<(), Error> {
        if frame.len() > MAX_PAYLOAD_LEN {
            return Err(Error::FrameTooLong);
        }

        self.offset = MAX_PAYLOAD_LEN - frame.len();
        self.len = frame.len();
        self.data[self.offset..].copy_from_slice(frame);

        Ok(())
    }
}
