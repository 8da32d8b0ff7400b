//! Mock transport for testing.

use std::collections::VecDeque;

use super::traits::{Transport, TransportError, TransportKind};

/// Failure injected into the next `read` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFault {
    /// The read times out without consuming input.
    Timeout,
    /// The read returns at most this many bytes.
    Short(usize),
    /// The read fails with this OS errno, converted the way backends convert it.
    Os(i32),
}

/// In-memory transport for unit testing codecs and the dispatcher.
#[derive(Debug, Default)]
pub struct MockTransport {
    open: bool,
    /// Bytes the "camera" will return on read.
    rx: VecDeque<u8>,
    /// Faults consumed one per read call.
    read_faults: VecDeque<ReadFault>,
    /// Captured writes, one entry per `write` call.
    writes: Vec<Vec<u8>>,
    /// Simulated backend write limit.
    write_limit: Option<usize>,
    /// Feed every write back into the receive queue.
    loopback: bool,
    kind: Option<TransportKind>,
    /// Number of successful `close` calls on an open transport.
    closes: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock that is already open.
    pub fn opened() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    /// A mock whose writes come straight back on read.
    pub fn loopback() -> Self {
        Self {
            open: true,
            loopback: true,
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: TransportKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Queue bytes to be returned by subsequent reads.
    pub fn queue_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn fail_next_read(&mut self, fault: ReadFault) {
        self.read_faults.push_back(fault);
    }

    /// Accept at most `limit` bytes per write, reporting a short write beyond it.
    pub fn limit_writes(&mut self, limit: usize) {
        self.write_limit = Some(limit);
    }

    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub fn take_writes(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.writes)
    }

    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    pub fn close_count(&self) -> usize {
        self.closes
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.open {
            self.closes += 1;
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_available(&self) -> Option<bool> {
        Some(self.open)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if let Some(limit) = self.write_limit
            && data.len() > limit
        {
            self.writes.push(data[..limit].to_vec());
            return Err(TransportError::ShortWrite {
                requested: data.len(),
                actual: limit,
            });
        }
        self.writes.push(data.to_vec());
        if self.loopback {
            self.rx.extend(data.iter().copied());
        }
        Ok(())
    }

    fn read(&mut self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let available = match self.read_faults.pop_front() {
            Some(ReadFault::Timeout) => return Err(TransportError::Timeout { timeout_ms: 0 }),
            Some(ReadFault::Short(n)) => n.min(self.rx.len()),
            Some(ReadFault::Os(code)) => {
                return Err(std::io::Error::from_raw_os_error(code).into());
            }
            None => self.rx.len(),
        };
        if available < len {
            // Consume what "arrived" so the stream stays consistent.
            self.rx.drain(..available);
            return Err(TransportError::ShortRead {
                requested: len,
                actual: available,
            });
        }
        Ok(self.rx.drain(..len).collect())
    }

    fn kind(&self) -> Option<TransportKind> {
        self.kind
    }
}
