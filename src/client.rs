use crate::{CloseCode, error::ChannelError};

/// Whether both Close frames were exchanged before the stream closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeCompleteness {
    Complete,
    Incomplete,
}

/// The outcome of a send call.
///
/// `Success` does not mean the bytes reached the wire, only that the message was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Success,
    InvalidState,
}

/// Receives everything a channel reports.
///
/// Implementations may call back into the channel, and may drop their last handle to it, from
/// inside any of these methods.
pub trait Client {
    fn did_connect(&self);

    fn did_receive_message(&self, message: String);

    fn did_receive_binary_data(&self, data: Vec<u8>);

    /// The channel failed. Called at most once per channel.
    fn did_receive_message_error(&self, error: &ChannelError);

    fn did_update_buffered_amount(&self, _buffered_amount: usize) {}

    fn did_start_closing_handshake(&self) {}

    /// The stream closed. Always the last call a client gets.
    fn did_close(
        &self,
        unhandled_buffered_amount: usize,
        completeness: HandshakeCompleteness,
        code: CloseCode,
        reason: String,
    );

    /// A `Set-Cookie` or `Set-Cookie2` value from the handshake response, before `did_connect`.
    fn did_receive_set_cookie(&self, _cookie: &str) {}
}
