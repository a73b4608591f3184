//! The byte stream a channel runs over.

use std::rc::Rc;

use crate::{channel::WeakChannel, handshake::WebSocketUrl};

/// Opens byte streams.
pub trait Transport {
    /// Starts connecting to `url`.
    ///
    /// The transport reports progress through the channel's `on_transport_*` methods, which
    /// it reaches by upgrading `channel`. None of them may be called before `connect` returns.
    fn connect(
        &self,
        url: &WebSocketUrl,
        channel: WeakChannel,
    ) -> Result<Rc<dyn TransportHandle>, String>;
}

/// One open byte stream.
pub trait TransportHandle {
    /// Queues `data` for sending. `false` if the stream cannot take it.
    fn send(&self, data: &[u8]) -> bool;

    /// Closes the stream once everything queued has been sent.
    fn close(&self);

    /// Tears the stream down immediately.
    fn disconnect(&self);

    /// Bytes accepted by [`TransportHandle::send`] but not yet written.
    fn buffered_amount(&self) -> usize;
}
