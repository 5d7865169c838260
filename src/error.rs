/// Faults raised by the pool and stack layers.
///
/// Every fault here has a local, buffer-scoped resolution (free and
/// report); none of them aborts the stack. Faults are carried to the
/// error sink together with two context arguments, see [`crate::report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// No free buffer in the pool
    Exhausted,

    /// Header reservation exceeded the buffer payload capacity
    HeaderOverflow,

    /// Received frame longer than a buffer payload
    FrameTooLong,

    /// Receive dispatch found a frame type with no consumer
    UnknownFrameType,

    /// Adaptation dispatch octet not recognised
    UnknownDispatch,

    /// Completion for a buffer this component did not send
    UnexpectedSendDone,

    /// Handle does not refer to a live pool entry
    BadHandle,

    /// Lower layer cannot accept another frame
    Busy,
}
