//! Outgoing messages waiting to be framed and sent.

use std::collections::VecDeque;

use crate::{OpCode, blob::Blob};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueuedPayload {
    Text(String),
    Raw(Vec<u8>),
    Blob(Blob),
}

impl QueuedPayload {
    /// The bytes this payload will occupy before framing.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Raw(bytes) => bytes.len(),
            Self::Blob(blob) => blob.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    pub opcode: OpCode,
    pub payload: QueuedPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    Open,
    /// The closing handshake finished. Drain, then close the stream.
    Closing,
    /// Nothing may be enqueued anymore.
    Closed,
}

/// Where the blob at the head of the queue is.
#[derive(Debug, Default)]
enum BlobState {
    #[default]
    Idle,
    Loading {
        generation: u64,
    },
    Loaded(Vec<u8>),
    /// The channel was failed. The head stays blocked.
    Failed,
}

/// What the channel has to do next.
#[derive(Debug, PartialEq, Eq)]
pub enum Next {
    /// Frame and send these bytes.
    Send { opcode: OpCode, payload: Vec<u8> },
    /// Start loading `blob`. Nothing behind it goes out until it is loaded.
    LoadBlob { blob: Blob, generation: u64 },
    /// A blob load is in flight.
    Wait,
    /// The queue drained after closing. Close the stream.
    Close,
    Idle,
}

/// FIFO of outgoing messages.
///
/// Items stay at the head until they can be sent, so a blob blocks everything queued after it.
#[derive(Debug)]
pub struct OutgoingQueue {
    frames: VecDeque<QueuedFrame>,
    status: QueueStatus,
    blob: BlobState,
    /// Identifies the current blob load so stale completions can be ignored.
    generation: u64,
}

impl Default for OutgoingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutgoingQueue {
    pub const fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            status: QueueStatus::Open,
            blob: BlobState::Idle,
            generation: 0,
        }
    }

    pub const fn status(&self) -> QueueStatus {
        self.status
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bytes enqueued but not yet handed out.
    pub fn pending_bytes(&self) -> usize {
        self.frames
            .iter()
            .fold(0usize, |sum, frame| sum.saturating_add(frame.payload.len()))
    }

    pub fn enqueue_text(&mut self, text: String) {
        self.enqueue(OpCode::Text, QueuedPayload::Text(text));
    }

    pub fn enqueue_raw(&mut self, opcode: OpCode, bytes: Vec<u8>) {
        self.enqueue(opcode, QueuedPayload::Raw(bytes));
    }

    pub fn enqueue_blob(&mut self, opcode: OpCode, blob: Blob) {
        self.enqueue(opcode, QueuedPayload::Blob(blob));
    }

    fn enqueue(&mut self, opcode: OpCode, payload: QueuedPayload) {
        debug_assert_eq!(self.status, QueueStatus::Open, "enqueue on a closed queue");

        if self.status != QueueStatus::Open {
            tracing::error!(?opcode, status = ?self.status, "Dropping frame enqueued on a closed queue");

            return;
        }

        self.frames.push_back(QueuedFrame { opcode, payload });
    }

    /// Drain what is queued, then close.
    pub fn start_closing(&mut self) {
        if self.status == QueueStatus::Open {
            self.status = QueueStatus::Closing;
        }
    }

    /// Takes the next step of draining the queue.
    pub fn next(&mut self) -> Next {
        if self.status == QueueStatus::Closed {
            return Next::Idle;
        }

        let Some(head) = self.frames.front() else {
            if self.status == QueueStatus::Closing {
                self.status = QueueStatus::Closed;

                return Next::Close;
            }

            return Next::Idle;
        };

        match &head.payload {
            QueuedPayload::Blob(blob) => match core::mem::take(&mut self.blob) {
                BlobState::Idle => {
                    self.generation += 1;

                    let blob = blob.clone();

                    self.blob = BlobState::Loading {
                        generation: self.generation,
                    };

                    Next::LoadBlob {
                        blob,
                        generation: self.generation,
                    }
                }
                BlobState::Loaded(payload) => {
                    let opcode = head.opcode;

                    self.frames.pop_front();

                    Next::Send { opcode, payload }
                }
                state => {
                    self.blob = state;

                    Next::Wait
                }
            },
            QueuedPayload::Text(_) | QueuedPayload::Raw(_) => match self.frames.pop_front() {
                Some(QueuedFrame {
                    opcode,
                    payload: QueuedPayload::Text(text),
                }) => Next::Send {
                    opcode,
                    payload: text.into_bytes(),
                },
                Some(QueuedFrame {
                    opcode,
                    payload: QueuedPayload::Raw(payload),
                }) => Next::Send { opcode, payload },
                _ => Next::Idle,
            },
        }
    }

    /// Returns `false` if `generation` is not the load in flight.
    pub fn blob_loaded(&mut self, generation: u64, bytes: Vec<u8>) -> bool {
        match self.blob {
            BlobState::Loading { generation: current } if current == generation => {
                self.blob = BlobState::Loaded(bytes);

                true
            }
            _ => false,
        }
    }

    /// Returns `false` if `generation` is not the load in flight.
    pub fn blob_failed(&mut self, generation: u64) -> bool {
        match self.blob {
            BlobState::Loading { generation: current } if current == generation => {
                self.blob = BlobState::Failed;

                true
            }
            _ => false,
        }
    }

    /// Drops everything and closes the queue for good.
    pub fn abort(&mut self) -> Aborted {
        let pending_bytes = self.pending_bytes();

        let blob_in_flight = matches!(self.blob, BlobState::Loading { .. });

        self.frames.clear();
        self.status = QueueStatus::Closed;
        self.blob = BlobState::Idle;

        Aborted {
            pending_bytes,
            blob_in_flight,
        }
    }
}

/// What [`OutgoingQueue::abort`] threw away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted {
    pub pending_bytes: usize,
    /// A blob load was in flight and has to be cancelled.
    pub blob_in_flight: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(opcode: OpCode, payload: &[u8]) -> Next {
        Next::Send {
            opcode,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn fifo() {
        let mut queue = OutgoingQueue::new();

        queue.enqueue_text(String::from("A"));
        queue.enqueue_raw(OpCode::Binary, vec![1]);
        queue.enqueue_raw(OpCode::Close, vec![0x03, 0xE8]);

        assert_eq!(queue.pending_bytes(), 4);

        assert_eq!(queue.next(), send(OpCode::Text, b"A"));
        assert_eq!(queue.next(), send(OpCode::Binary, &[1]));
        assert_eq!(queue.next(), send(OpCode::Close, &[0x03, 0xE8]));
        assert_eq!(queue.next(), Next::Idle);
        assert_eq!(queue.pending_bytes(), 0);
    }

    #[test]
    fn blob_blocks_the_frames_behind_it() {
        let mut queue = OutgoingQueue::new();
        let blob = Blob::new("blob", 3);

        queue.enqueue_raw(OpCode::Text, b"X".to_vec());
        queue.enqueue_blob(OpCode::Binary, blob.clone());
        queue.enqueue_raw(OpCode::Text, b"Y".to_vec());

        assert_eq!(queue.next(), send(OpCode::Text, b"X"));
        assert_eq!(
            queue.next(),
            Next::LoadBlob {
                blob,
                generation: 1
            }
        );
        assert_eq!(queue.next(), Next::Wait);
        assert_eq!(queue.next(), Next::Wait);
        assert_eq!(queue.pending_bytes(), 4);

        assert!(queue.blob_loaded(1, vec![7, 8, 9]));

        assert_eq!(queue.next(), send(OpCode::Binary, &[7, 8, 9]));
        assert_eq!(queue.next(), send(OpCode::Text, b"Y"));
        assert_eq!(queue.next(), Next::Idle);
    }

    #[test]
    fn stale_blob_completion_is_ignored() {
        let mut queue = OutgoingQueue::new();

        queue.enqueue_blob(OpCode::Binary, Blob::new("blob", 1));

        assert!(matches!(queue.next(), Next::LoadBlob { generation: 1, .. }));
        assert!(!queue.blob_loaded(2, vec![1]));
        assert_eq!(queue.next(), Next::Wait);
    }

    #[test]
    fn failed_blob_keeps_blocking() {
        let mut queue = OutgoingQueue::new();

        queue.enqueue_blob(OpCode::Binary, Blob::new("blob", 1));
        queue.enqueue_raw(OpCode::Text, b"Y".to_vec());

        queue.next();

        assert!(queue.blob_failed(1));
        assert!(!queue.blob_loaded(1, vec![1]));
        assert_eq!(queue.next(), Next::Wait);
    }

    #[test]
    fn closing_drains_then_closes() {
        let mut queue = OutgoingQueue::new();

        queue.enqueue_raw(OpCode::Close, Vec::new());
        queue.start_closing();

        assert_eq!(queue.status(), QueueStatus::Closing);
        assert_eq!(queue.next(), send(OpCode::Close, &[]));
        assert_eq!(queue.next(), Next::Close);
        assert_eq!(queue.status(), QueueStatus::Closed);
        assert_eq!(queue.next(), Next::Idle);
    }

    #[test]
    fn abort() {
        let mut queue = OutgoingQueue::new();

        queue.enqueue_blob(OpCode::Binary, Blob::new("blob", 10));
        queue.enqueue_text(String::from("abc"));
        queue.next();

        let aborted = queue.abort();

        assert_eq!(
            aborted,
            Aborted {
                pending_bytes: 13,
                blob_in_flight: true,
            }
        );
        assert_eq!(queue.status(), QueueStatus::Closed);
        assert!(queue.is_empty());
        assert!(!queue.blob_loaded(1, vec![1]));
        assert_eq!(queue.next(), Next::Idle);
    }
}
