//! Noop implementations of the collaborator traits for the documentation examples.

use std::{rc::Rc, time::Duration};

use crate::{
    CloseCode, WeakChannel,
    blob::{Blob, BlobCompletion, BlobLoader},
    client::{Client, HandshakeCompleteness},
    error::ChannelError,
    handshake::WebSocketUrl,
    scheduler::Scheduler,
    transport::{Transport, TransportHandle},
};

#[derive(Debug)]
pub struct Noop;

impl Transport for Noop {
    fn connect(
        &self,
        _url: &WebSocketUrl,
        _channel: WeakChannel,
    ) -> Result<Rc<dyn TransportHandle>, String> {
        Ok(Rc::new(Noop))
    }
}

impl TransportHandle for Noop {
    fn send(&self, _data: &[u8]) -> bool {
        true
    }

    fn close(&self) {}

    fn disconnect(&self) {}

    fn buffered_amount(&self) -> usize {
        0
    }
}

impl Client for Noop {
    fn did_connect(&self) {}

    fn did_receive_message(&self, _message: String) {}

    fn did_receive_binary_data(&self, _data: Vec<u8>) {}

    fn did_receive_message_error(&self, _error: &ChannelError) {}

    fn did_close(
        &self,
        _unhandled_buffered_amount: usize,
        _completeness: HandshakeCompleteness,
        _code: CloseCode,
        _reason: String,
    ) {
    }
}

impl Scheduler for Noop {
    fn post(&self, _task: Box<dyn FnOnce()>) {}

    fn post_delayed(&self, _delay: Duration, _task: Box<dyn FnOnce()>) {}
}

impl BlobLoader for Noop {
    fn start(&self, _blob: &Blob, _completion: BlobCompletion) {}

    fn cancel(&self) {}
}
