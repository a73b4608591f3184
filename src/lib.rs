//! A callback driven, single threaded WebSocket client channel.
//!
//! A [`Channel`] runs one WebSocket connection over a byte stream it does not own: it writes
//! the opening handshake, frames and masks outgoing messages, parses and validates incoming
//! frames, reassembles fragmented messages, answers pings and runs the closing handshake.
//! `permessage-deflate` is negotiated when offered.
//!
//! The channel does no I/O itself. It talks to four collaborators:
//! - a [`Transport`](transport::Transport) that opens byte streams and feeds received bytes
//!   back through [`Channel::on_transport_data`] and the other `on_transport_*` methods.
//! - a [`Client`](client::Client) that receives messages and the terminal `did_close`.
//! - a [`Scheduler`](scheduler::Scheduler) for deferred and delayed work.
//! - a [`BlobLoader`](blob::BlobLoader) that resolves blobs to bytes before they are sent.
//!
//! # Examples
//!
//! In the following example, `Noop` is a mock type that implements every collaborator trait.
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use websocket_channel::mock::Noop;
//! use websocket_channel::{Channel, CloseCode, options::ChannelOptions};
//!
//! let channel = Channel::new(
//!     Rc::new(Noop),
//!     Rc::new(Noop),
//!     Rc::new(Noop),
//!     Rc::new(Noop),
//!     ChannelOptions::default().with_header("Origin", "http://example.com"),
//! );
//!
//! // Request the "chat" subprotocol.
//! channel
//!     .connect("ws://example.com/ws", "chat")
//!     .expect("Valid url");
//!
//! // The transport reports the open stream and the server's bytes.
//! channel.on_transport_open();
//! channel.on_transport_data(b"HTTP/1.1 101 Switching Protocols\r\n...");
//!
//! // Once the client got `did_connect`.
//! channel.send_text("Hello, WebSocket!");
//! channel.send_binary(vec![1, 2, 3]);
//!
//! channel.close(Some(CloseCode::Normal), "bye");
//! ```
//!
//! # Reentrancy
//!
//! Client callbacks run on the channel's stack and may call any method of the channel,
//! including [`Channel::close`] and [`Channel::disconnect`], or drop every handle to it. An open
//! channel keeps itself alive until the transport reports the stream closed.

#![deny(missing_debug_implementations)]

pub mod blob;

mod channel;
pub use channel::{Channel, ChannelState, WeakChannel};

pub mod client;

mod close_code;
pub use close_code::CloseCode;

mod close_frame;
pub use close_frame::CloseFrame;

pub mod codec;

pub mod compression;

pub mod error;

mod frame;
pub use frame::Frame;

pub mod handshake;

pub mod mask;

#[doc(hidden)]
pub mod mock;

mod opcode;
pub use opcode::OpCode;

pub mod options;

pub mod queue;

pub mod scheduler;

pub mod transport;
