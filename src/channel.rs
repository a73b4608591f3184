//! One WebSocket connection, from the opening handshake to the closed stream.
//!
//! A [`Channel`] is driven by callbacks on a single thread: the transport reports bytes and
//! stream events, the blob loader reports loaded blobs, the scheduler runs deferred work. The
//! channel calls into its [`Client`] from inside those callbacks, and the client may call back
//! into the channel or drop its handles. No internal borrow is held across a call into any
//! collaborator, and every callback runs on a strong handle, so both are safe.
//!
//! # States
//!
//! ```text
//! Connecting --open--> Handshaking --101--> Open --close()/Close frame--> Closing
//!      \___________________\_____________________\_________________________\--stream closed--> Closed
//! ```
//!
//! Orthogonal to the state:
//!
//! - `remote_close_received`: only ever set in `Open`, which it leaves for `Closing` before any
//!   client code runs. Reachable in `Closing` and `Closed`.
//! - `discard_received_data`: set by the first failure, in any state after `Connecting`.
//! - `suspended`: independent of everything else. A stream that closes while suspended stays in
//!   `Closed` without notifying the client until resumed.

use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    CloseCode, Frame, OpCode,
    blob::{Blob, BlobCompletion, BlobLoadError, BlobLoader},
    client::{Client, HandshakeCompleteness, SendResult},
    close_frame::CloseFrame,
    codec::{self, FramesCodec},
    compression::CompressionFramer,
    error::{ChannelError, ProtocolError},
    handshake::{Handshake, HandshakeMode, WebSocketUrl},
    options::ChannelOptions,
    queue::{Next, OutgoingQueue, QueueStatus},
    scheduler::Scheduler,
    transport::{Transport, TransportHandle},
};

/// The largest payload a control frame may carry.
const MAX_CONTROL_PAYLOAD_LEN: usize = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Waiting for the transport to open.
    Connecting,
    /// The request was sent, the response has not been read yet.
    Handshaking,
    Open,
    /// A Close frame was queued.
    Closing,
    /// The stream is gone.
    Closed,
}

/// A fragmented message being received.
#[derive(Debug)]
struct Continuation {
    opcode: OpCode,
    data: Vec<u8>,
}

impl Continuation {
    fn into_received(self) -> Result<Received, ProtocolError> {
        match self.opcode {
            OpCode::Text => String::from_utf8(self.data)
                .map(Received::Text)
                .map_err(|_| ProtocolError::InvalidUtf8),
            _ => Ok(Received::Binary(self.data)),
        }
    }
}

/// The outcome of reading one frame.
#[derive(Debug)]
enum Received {
    Nothing,
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Close(CloseFrame),
}

#[derive(Debug)]
struct Core {
    state: ChannelState,
    options: ChannelOptions,
    codec: FramesCodec<StdRng>,
    handshake: Option<Handshake>,
    framer: CompressionFramer,
    buffer: Vec<u8>,
    continuation: Option<Continuation>,
    queue: OutgoingQueue,
    remote_close_received: bool,
    discard_received_data: bool,
    suspended: bool,
    close_code: CloseCode,
    close_reason: String,
    /// Bytes thrown away when the queue was aborted.
    aborted_bytes: usize,
    last_error: Option<ChannelError>,
    closing_timer_armed: bool,
    resume_posted: bool,
}

impl Core {
    fn new(options: ChannelOptions, rng: StdRng) -> Self {
        Self {
            state: ChannelState::Connecting,
            codec: FramesCodec::client(rng),
            handshake: None,
            framer: CompressionFramer::new(options.deflate.clone()),
            options,
            buffer: Vec::new(),
            continuation: None,
            queue: OutgoingQueue::new(),
            remote_close_received: false,
            discard_received_data: false,
            suspended: false,
            close_code: CloseCode::Abnormal,
            close_reason: String::new(),
            aborted_bytes: 0,
            last_error: None,
            closing_timer_armed: false,
            resume_posted: false,
        }
    }

    /// Reads one frame from the front of the receive buffer.
    ///
    /// `Ok(None)` means the frame is not complete yet.
    fn read_frame(&mut self) -> Result<Option<Received>, ChannelError> {
        let Some((frame, consumed)) = codec::decode(&self.buffer)? else {
            return Ok(None);
        };

        let frame = self.framer.inflate(frame)?;

        tracing::trace!(opcode = ?frame.opcode(), fin = frame.is_final(), len = frame.payload().len(), "Received frame");

        validate(&frame, self.continuation.is_some())?;

        let fin = frame.is_final();
        let opcode = frame.opcode();
        let payload = frame.into_payload().into_owned();

        self.buffer.drain(..consumed);

        let received = match opcode {
            OpCode::Continuation => {
                let mut continuation = self
                    .continuation
                    .take()
                    .ok_or(ProtocolError::UnexpectedContinuation)?;

                continuation.data.extend_from_slice(&payload);

                if fin {
                    continuation.into_received()?
                } else {
                    self.continuation = Some(continuation);

                    Received::Nothing
                }
            }
            OpCode::Text | OpCode::Binary if !fin => {
                self.continuation = Some(Continuation {
                    opcode,
                    data: payload,
                });

                Received::Nothing
            }
            OpCode::Text => String::from_utf8(payload)
                .map(Received::Text)
                .map_err(|_| ProtocolError::InvalidUtf8)?,
            OpCode::Binary => Received::Binary(payload),
            OpCode::Close => match CloseFrame::from_payload(&payload) {
                Ok(close) => {
                    self.close_code = close.code();
                    self.close_reason = close.reason().to_string();
                    self.remote_close_received = true;

                    Received::Close(close)
                }
                Err(error) => {
                    self.close_code = CloseCode::Abnormal;

                    return Err(error.into());
                }
            },
            OpCode::Ping => Received::Ping(payload),
            OpCode::Pong => Received::Nothing,
            OpCode::Reserved(_) => return Err(ProtocolError::reserved_opcode(opcode).into()),
        };

        Ok(Some(received))
    }
}

/// Checks the rules every received frame must follow, in order.
fn validate(frame: &Frame<'_>, continuation_open: bool) -> Result<(), ProtocolError> {
    let opcode = frame.opcode();

    if opcode.is_reserved() {
        return Err(ProtocolError::reserved_opcode(opcode));
    }

    if frame.rsv2() || frame.rsv3() {
        return Err(ProtocolError::ReservedBitsNotZero {
            rsv2: frame.rsv2() as u8,
            rsv3: frame.rsv3() as u8,
        });
    }

    if frame.is_masked() {
        return Err(ProtocolError::MaskedServerFrame);
    }

    if opcode.is_control() && !frame.is_final() {
        return Err(ProtocolError::ControlFrameFragmented {
            opcode: opcode.as_u8(),
        });
    }

    if opcode.is_control() && frame.payload().len() > MAX_CONTROL_PAYLOAD_LEN {
        return Err(ProtocolError::ControlFramePayloadTooLarge {
            len: frame.payload().len(),
        });
    }

    // Control frames may be interleaved with a fragmented message, data frames may not.
    if continuation_open && opcode.is_data() {
        return Err(ProtocolError::UnfinishedContinuation);
    }

    Ok(())
}

struct Inner {
    core: RefCell<Core>,
    client: RefCell<Option<Rc<dyn Client>>>,
    handle: RefCell<Option<Rc<dyn TransportHandle>>>,
    transport: Rc<dyn Transport>,
    scheduler: Rc<dyn Scheduler>,
    blob_loader: Rc<dyn BlobLoader>,
    /// Keeps the channel alive while the stream is open, whether or not anyone holds a handle.
    keep_alive: RefCell<Option<Rc<Inner>>>,
}

/// A handle to a WebSocket channel.
///
/// Cloning is cheap. Every clone refers to the same channel.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<Inner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("core", &self.inner.core)
            .finish_non_exhaustive()
    }
}

/// A handle that does not keep the channel alive. Handed to collaborators.
#[derive(Clone)]
pub struct WeakChannel {
    inner: Weak<Inner>,
}

impl WeakChannel {
    pub fn upgrade(&self) -> Option<Channel> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

impl fmt::Debug for WeakChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakChannel")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Channel {
    pub fn new(
        transport: Rc<dyn Transport>,
        client: Rc<dyn Client>,
        scheduler: Rc<dyn Scheduler>,
        blob_loader: Rc<dyn BlobLoader>,
        options: ChannelOptions,
    ) -> Self {
        Self::with_rng(
            transport,
            client,
            scheduler,
            blob_loader,
            options,
            StdRng::from_os_rng(),
        )
    }

    /// Like [`Channel::new`], drawing masking keys and the handshake key from `rng`.
    pub fn with_rng(
        transport: Rc<dyn Transport>,
        client: Rc<dyn Client>,
        scheduler: Rc<dyn Scheduler>,
        blob_loader: Rc<dyn BlobLoader>,
        options: ChannelOptions,
        rng: StdRng,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                core: RefCell::new(Core::new(options, rng)),
                client: RefCell::new(Some(client)),
                handle: RefCell::new(None),
                transport,
                scheduler,
                blob_loader,
                keep_alive: RefCell::new(None),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakChannel {
        WeakChannel {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.inner.core.borrow().state
    }

    pub fn closing_handshake_received(&self) -> bool {
        self.inner.core.borrow().remote_close_received
    }

    pub fn discards_received_data(&self) -> bool {
        self.inner.core.borrow().discard_received_data
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.core.borrow().suspended
    }

    /// The first failure of this channel.
    pub fn last_error(&self) -> Option<ChannelError> {
        self.inner.core.borrow().last_error.clone()
    }

    /// The subprotocol the server selected, empty until the handshake completed.
    pub fn subprotocol(&self) -> String {
        self.connected_handshake(|handshake| handshake.server_protocol().to_string())
    }

    /// The extensions the server accepted, empty until the handshake completed.
    pub fn extensions(&self) -> String {
        self.connected_handshake(|handshake| handshake.accepted_extensions().to_string())
    }

    fn connected_handshake(&self, f: impl FnOnce(&Handshake) -> String) -> String {
        self.inner
            .core
            .borrow()
            .handshake
            .as_ref()
            .filter(|handshake| handshake.mode() == HandshakeMode::Connected)
            .map(f)
            .unwrap_or_default()
    }

    /// Bytes accepted by the send methods that have not been written yet.
    pub fn buffered_amount(&self) -> usize {
        let transport = self
            .handle()
            .map(|handle| handle.buffered_amount())
            .unwrap_or_default();

        transport.saturating_add(self.inner.core.borrow().queue.pending_bytes())
    }

    fn client(&self) -> Option<Rc<dyn Client>> {
        self.inner.client.borrow().clone()
    }

    fn handle(&self) -> Option<Rc<dyn TransportHandle>> {
        self.inner.handle.borrow().clone()
    }

    /// Starts connecting to `url`, requesting the comma separated subprotocols in `protocol`.
    pub fn connect(&self, url: &str, protocol: &str) -> Result<(), ChannelError> {
        let url = WebSocketUrl::parse(url)?;

        {
            let mut core = self.inner.core.borrow_mut();
            let core = &mut *core;

            let misuse = core.handshake.is_some() || core.suspended;

            debug_assert!(!misuse, "connect on a used or suspended channel");

            if misuse {
                tracing::error!(url = url.as_str(), "Ignoring connect on a used or suspended channel");

                return Ok(());
            }

            let mut handshake = Handshake::new(url.clone(), protocol, core.codec.rng_mut());

            if core.framer.can_deflate() {
                if let Some(config) = core.framer.config() {
                    handshake.add_deflate_offer(config.clone());
                }
            }

            for (name, value) in core.options.headers() {
                handshake.add_header(name.clone(), value.clone());
            }

            core.handshake = Some(handshake);
        }

        tracing::debug!(url = url.as_str(), protocol, "Connecting");

        *self.inner.keep_alive.borrow_mut() = Some(Rc::clone(&self.inner));

        match self.inner.transport.connect(&url, self.downgrade()) {
            Ok(handle) => {
                *self.inner.handle.borrow_mut() = Some(handle);

                Ok(())
            }
            Err(reason) => {
                tracing::warn!(url = url.as_str(), %reason, "Failed to connect");

                let error = ChannelError::ConnectFailed(reason);

                {
                    let mut core = self.inner.core.borrow_mut();

                    core.state = ChannelState::Closed;
                    core.last_error = Some(error.clone());
                }

                let keep_alive = self.inner.keep_alive.borrow_mut().take();
                drop(keep_alive);

                Err(error)
            }
        }
    }

    pub fn send_text(&self, text: impl Into<String>) -> SendResult {
        let text = text.into();

        self.send(|queue| queue.enqueue_text(text))
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> SendResult {
        let data = data.into();

        self.send(|queue| queue.enqueue_raw(OpCode::Binary, data))
    }

    pub fn send_blob(&self, blob: Blob) -> SendResult {
        self.send(|queue| queue.enqueue_blob(OpCode::Binary, blob))
    }

    fn send(&self, enqueue: impl FnOnce(&mut OutgoingQueue)) -> SendResult {
        {
            let mut core = self.inner.core.borrow_mut();
            let state = core.state;

            match state {
                ChannelState::Open => enqueue(&mut core.queue),
                ChannelState::Closing | ChannelState::Closed => {
                    tracing::debug!(?state, "Dropping message sent after the closing handshake started");

                    return SendResult::Success;
                }
                ChannelState::Connecting | ChannelState::Handshaking => {
                    tracing::error!(?state, "Dropping message sent before the connection was established");

                    return SendResult::InvalidState;
                }
            }
        }

        self.process_outgoing_queue();

        SendResult::Success
    }

    /// Starts the closing handshake.
    ///
    /// `code` is sent with `reason` unless the server already closed. A code that may not
    /// appear on the wire is sent as an empty Close frame, and a reason too long for a control
    /// frame is cut short. Does nothing if the
    /// closing handshake already started. If the server does not close the stream within the
    /// closing timeout, the stream is disconnected.
    pub fn close(&self, code: Option<CloseCode>, reason: &str) {
        if self.handle().is_none() {
            return;
        }

        match self.state() {
            ChannelState::Connecting | ChannelState::Handshaking => {
                self.fail(ChannelError::ClosedBeforeEstablished);

                return;
            }
            ChannelState::Open => self.start_closing_handshake(code, reason),
            ChannelState::Closing => {}
            ChannelState::Closed => return,
        }

        self.arm_closing_timer();
    }

    fn arm_closing_timer(&self) {
        let timeout = {
            let mut core = self.inner.core.borrow_mut();

            if core.state != ChannelState::Closing || core.closing_timer_armed {
                return;
            }

            core.closing_timer_armed = true;
            core.options.closing_timeout()
        };

        let channel = self.downgrade();

        self.inner.scheduler.post_delayed(
            timeout,
            Box::new(move || {
                if let Some(channel) = channel.upgrade() {
                    channel.closing_timer_fired();
                }
            }),
        );
    }

    fn closing_timer_fired(&self) {
        if self.state() != ChannelState::Closing {
            return;
        }

        tracing::debug!("Closing handshake timed out");

        if let Some(handle) = self.handle() {
            handle.disconnect();
        }
    }

    fn start_closing_handshake(&self, code: Option<CloseCode>, reason: &str) {
        {
            let mut core = self.inner.core.borrow_mut();

            if core.state != ChannelState::Open {
                return;
            }

            let payload = match code {
                Some(code) if !core.remote_close_received && code.is_sendable() => {
                    CloseFrame::new(code, reason).to_payload()
                }
                Some(code) if !code.is_sendable() => {
                    tracing::debug!(?code, "Sending an empty Close frame in place of a local-only code");

                    Vec::new()
                }
                _ => Vec::new(),
            };

            core.queue.enqueue_raw(OpCode::Close, payload);
            core.state = ChannelState::Closing;
        }

        tracing::debug!(?code, reason, "Started closing handshake");

        self.process_outgoing_queue();

        if self.state() == ChannelState::Closed {
            return;
        }

        if let Some(client) = self.client() {
            client.did_start_closing_handshake();
        }
    }

    /// Fails the channel.
    ///
    /// Everything received afterwards is discarded, the client learns about the first failure,
    /// and the stream is disconnected.
    pub fn fail(&self, error: impl Into<ChannelError>) {
        let error = error.into();

        tracing::warn!(%error, "WebSocket channel failed");

        let (first, closed) = {
            let mut core = self.inner.core.borrow_mut();

            core.discard_received_data = true;
            core.buffer = Vec::new();
            core.framer.did_fail();
            core.continuation = None;

            let first = core.last_error.is_none();

            if first {
                core.last_error = Some(error.clone());
            }

            (first, core.state == ChannelState::Closed)
        };

        if first {
            if let Some(client) = self.client() {
                client.did_receive_message_error(&error);
            }
        }

        if !closed {
            if let Some(handle) = self.handle() {
                handle.disconnect();
            }
        }
    }

    /// Detaches the client and disconnects the stream. The client gets no further calls.
    pub fn disconnect(&self) {
        tracing::debug!("Disconnecting");

        let client = self.inner.client.borrow_mut().take();
        drop(client);

        if let Some(handle) = self.handle() {
            handle.disconnect();
        }
    }

    /// Stops processing received data until [`Channel::resume`].
    pub fn suspend(&self) {
        self.inner.core.borrow_mut().suspended = true;
    }

    /// Processes what arrived while suspended, on a later turn of the event loop.
    pub fn resume(&self) {
        let post = {
            let mut core = self.inner.core.borrow_mut();

            core.suspended = false;

            let pending = !core.buffer.is_empty() || core.state == ChannelState::Closed;

            if pending && !core.resume_posted && self.inner.client.borrow().is_some() {
                core.resume_posted = true;

                true
            } else {
                false
            }
        };

        if post {
            let channel = self.downgrade();

            self.inner.scheduler.post(Box::new(move || {
                if let Some(channel) = channel.upgrade() {
                    channel.resume_task();
                }
            }));
        }
    }

    fn resume_task(&self) {
        self.inner.core.borrow_mut().resume_posted = false;

        self.drain_receive_buffer();

        let closed = {
            let core = self.inner.core.borrow();

            !core.suspended && core.state == ChannelState::Closed
        };

        if closed && self.inner.client.borrow().is_some() {
            self.finish_close();
        }
    }

    /// The transport opened the stream.
    pub fn on_transport_open(&self) {
        let Some(handle) = self.handle() else {
            return;
        };

        let request = {
            let mut core = self.inner.core.borrow_mut();

            if core.state != ChannelState::Connecting {
                return;
            }

            let Some(request) = core.handshake.as_ref().map(Handshake::client_request) else {
                return;
            };

            core.state = ChannelState::Handshaking;

            request
        };

        tracing::debug!("Sending handshake request");

        if !handle.send(&request) {
            self.fail(ChannelError::HandshakeSendFailed);
        }
    }

    /// The transport received `data`. Empty `data` means the server closed its side.
    pub fn on_transport_data(&self, data: &[u8]) {
        if self.inner.client.borrow().is_none() {
            self.inner.core.borrow_mut().discard_received_data = true;

            if let Some(handle) = self.handle() {
                handle.disconnect();
            }

            return;
        }

        if data.is_empty() {
            if let Some(handle) = self.handle() {
                handle.disconnect();
            }

            return;
        }

        let overflow = {
            let mut core = self.inner.core.borrow_mut();

            if core.discard_received_data {
                return;
            }

            match core.buffer.len().checked_add(data.len()) {
                Some(len) if len <= core.options.max_receive_buffer() => {
                    core.buffer.extend_from_slice(data);

                    false
                }
                _ => {
                    core.discard_received_data = true;

                    true
                }
            }
        };

        if overflow {
            self.fail(ChannelError::ReceiveBufferOverflow);

            return;
        }

        self.drain_receive_buffer();
    }

    pub fn on_buffered_amount_update(&self, buffered_amount: usize) {
        if let Some(client) = self.client() {
            client.did_update_buffered_amount(buffered_amount);
        }
    }

    pub fn on_transport_failed(&self, reason: &str) {
        self.fail(ChannelError::Network(reason.to_string()));
    }

    /// The stream is gone. Always the last transport callback.
    pub fn on_transport_closed(&self) {
        let blob_in_flight = {
            let mut core = self.inner.core.borrow_mut();

            if core.state == ChannelState::Closed {
                return;
            }

            core.state = ChannelState::Closed;

            if core.queue.status() == QueueStatus::Closed {
                false
            } else {
                let aborted = core.queue.abort();

                core.aborted_bytes = aborted.pending_bytes;

                aborted.blob_in_flight
            }
        };

        tracing::debug!("Transport closed");

        if blob_in_flight {
            self.inner.blob_loader.cancel();
            self.fail(BlobLoadError::Aborted);
        }

        if self.is_suspended() {
            return;
        }

        self.finish_close();
    }

    fn finish_close(&self) {
        let handle = self.inner.handle.borrow_mut().take();

        let Some(handle) = handle else {
            return;
        };

        let unhandled = handle.buffered_amount();

        let (unhandled, completeness, code, reason) = {
            let mut core = self.inner.core.borrow_mut();

            let completeness = match core.remote_close_received {
                true => HandshakeCompleteness::Complete,
                false => HandshakeCompleteness::Incomplete,
            };

            (
                unhandled.saturating_add(core.aborted_bytes),
                completeness,
                core.close_code,
                std::mem::take(&mut core.close_reason),
            )
        };

        let client = self.inner.client.borrow_mut().take();

        if let Some(client) = client {
            client.did_close(unhandled, completeness, code, reason);
        }

        let keep_alive = self.inner.keep_alive.borrow_mut().take();
        drop(keep_alive);
    }

    pub(crate) fn did_finish_blob_load(
        &self,
        generation: u64,
        result: Result<Vec<u8>, BlobLoadError>,
    ) {
        match result {
            Ok(bytes) => {
                tracing::trace!(generation, len = bytes.len(), "Blob loaded");

                if self.inner.core.borrow_mut().queue.blob_loaded(generation, bytes) {
                    self.process_outgoing_queue();
                }
            }
            Err(error) => {
                tracing::trace!(generation, %error, "Blob load failed");

                if self.inner.core.borrow_mut().queue.blob_failed(generation) {
                    self.fail(error);
                }
            }
        }
    }

    fn drain_receive_buffer(&self) {
        while self.can_process() {
            if !self.process_buffer() {
                break;
            }
        }
    }

    fn can_process(&self) -> bool {
        let ready = {
            let core = self.inner.core.borrow();

            !core.suspended && !core.buffer.is_empty()
        };

        ready && self.inner.client.borrow().is_some()
    }

    /// Processes the handshake response or one frame. Returns whether to keep going.
    fn process_buffer(&self) -> bool {
        let handshake = {
            let mut core = self.inner.core.borrow_mut();
            let core = &mut *core;

            if core.discard_received_data {
                return false;
            }

            if core.remote_close_received {
                core.buffer.clear();

                return false;
            }

            let Some(handshake) = core.handshake.as_mut() else {
                return false;
            };

            match handshake.mode() {
                HandshakeMode::Connected => None,
                HandshakeMode::Failed => return false,
                HandshakeMode::Incomplete => {
                    let consumed = handshake.read_server_handshake(&core.buffer);

                    if consumed == 0 {
                        return false;
                    }

                    core.buffer.drain(..consumed);

                    match (handshake.mode(), handshake.failure_reason()) {
                        (HandshakeMode::Connected, _) => {
                            if let Some(params) = handshake.negotiated_deflate() {
                                core.framer.enable(params);
                            }

                            core.state = ChannelState::Open;

                            let cookies: Vec<String> = handshake
                                .server_set_cookie()
                                .into_iter()
                                .chain(handshake.server_set_cookie2())
                                .map(String::from)
                                .collect();

                            Some(Ok(cookies))
                        }
                        (_, Some(error)) => {
                            core.discard_received_data = true;

                            Some(Err(error.clone()))
                        }
                        _ => return false,
                    }
                }
            }
        };

        match handshake {
            None => self.process_frame(),
            Some(Ok(cookies)) => {
                if let Some(client) = self.client() {
                    for cookie in &cookies {
                        client.did_receive_set_cookie(cookie);
                    }

                    client.did_connect();
                }

                !self.inner.core.borrow().buffer.is_empty()
            }
            Some(Err(error)) => {
                self.fail(error);

                false
            }
        }
    }

    fn process_frame(&self) -> bool {
        let received = self.inner.core.borrow_mut().read_frame();

        let received = match received {
            Ok(Some(received)) => received,
            Ok(None) => return false,
            Err(error) => {
                self.fail(error);

                return false;
            }
        };

        match received {
            Received::Nothing => {}
            Received::Text(text) => {
                if let Some(client) = self.client() {
                    client.did_receive_message(text);
                }
            }
            Received::Binary(data) => {
                if let Some(client) = self.client() {
                    client.did_receive_binary_data(data);
                }
            }
            Received::Ping(payload) => {
                let queued = {
                    let mut core = self.inner.core.borrow_mut();

                    let open = core.queue.status() == QueueStatus::Open;

                    if open {
                        core.queue.enqueue_raw(OpCode::Pong, payload);
                    }

                    open
                };

                if queued {
                    self.process_outgoing_queue();
                }
            }
            Received::Close(close) => {
                self.start_closing_handshake(Some(close.code()), close.reason());

                let closing = {
                    let mut core = self.inner.core.borrow_mut();

                    let closing = core.state == ChannelState::Closing;

                    if closing {
                        core.queue.start_closing();
                    }

                    closing
                };

                if closing {
                    self.process_outgoing_queue();
                }
            }
        }

        !self.inner.core.borrow().buffer.is_empty()
    }

    /// Sends queued frames until the queue is empty or blocked on a blob.
    ///
    /// A frame that fails to send fails the channel, draining goes on.
    fn process_outgoing_queue(&self) {
        loop {
            let next = self.inner.core.borrow_mut().queue.next();

            match next {
                Next::Send { opcode, payload } => {
                    if let Err(error) = self.send_frame(opcode, payload) {
                        self.fail(error);
                    }
                }
                Next::LoadBlob { blob, generation } => {
                    tracing::trace!(blob = blob.id(), size = blob.size(), generation, "Loading blob");

                    self.inner
                        .blob_loader
                        .start(&blob, BlobCompletion::new(self.downgrade(), generation));

                    return;
                }
                Next::Close => {
                    if let Some(handle) = self.handle() {
                        handle.close();
                    }

                    return;
                }
                Next::Wait | Next::Idle => return,
            }
        }
    }

    fn send_frame(&self, opcode: OpCode, payload: Vec<u8>) -> Result<(), ChannelError> {
        let bytes = {
            let mut core = self.inner.core.borrow_mut();

            let frame = core.framer.deflate(Frame::new(true, opcode, payload))?;

            let mut bytes = Vec::new();
            core.codec.encode(&frame, &mut bytes);

            bytes
        };

        let handle = self.handle().ok_or(ChannelError::SendFailed)?;

        match handle.send(&bytes) {
            true => Ok(()),
            false => Err(ChannelError::SendFailed),
        }
    }
}
