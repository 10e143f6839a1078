//! Scripted stand-in for a filter wheel on the other end of a serial line.
//!
//! Each write pops the next queued reply (if any) into the receive buffer,
//! which is how the real device behaves: one line back per command. Clones
//! share state, so a test can keep a handle after the port is moved into a
//! [`SerialInterface`](super::SerialInterface).

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::SerialPortIO;

#[derive(Debug, Default)]
struct MockState {
    rx: VecDeque<u8>,
    replies: VecDeque<Option<Vec<u8>>>,
    writes: Vec<Vec<u8>>,
    discards: usize,
    fail_next_write: bool,
    fail_reads: bool,
    chunk_size: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out received bytes at most `size` at a time, to exercise line assembly.
    pub fn with_chunk_size(self, size: usize) -> Self {
        self.lock().chunk_size = Some(size.max(1));
        self
    }

    /// Reply delivered after the next unanswered write.
    pub fn queue_reply(&self, reply: impl AsRef<[u8]>) {
        self.lock().replies.push_back(Some(reply.as_ref().to_vec()));
    }

    /// The next write gets no reply at all.
    pub fn queue_silence(&self) {
        self.lock().replies.push_back(None);
    }

    /// Bytes that are already waiting before any command is sent.
    pub fn inject_input(&self, bytes: impl AsRef<[u8]>) {
        self.lock().rx.extend(bytes.as_ref());
    }

    pub fn fail_next_write(&self) {
        self.lock().fail_next_write = true;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Raw byte sequences written so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Writes decoded as text, terminators included.
    pub fn written_frames(&self) -> Vec<String> {
        self.lock()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn pending_input(&self) -> usize {
        self.lock().rx.len()
    }

    /// How many times the receive buffer was cleared.
    pub fn discard_count(&self) -> usize {
        self.lock().discards
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SerialPortIO for MockPort {
    fn send_data(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        state.writes.push(data.to_vec());
        if let Some(Some(reply)) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let state = self.lock();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated read failure"));
        }
        Ok(state.rx.len())
    }

    fn read_data(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::Other, "simulated read failure"));
        }
        let limit = state.chunk_size.unwrap_or(usize::MAX).min(buffer.len());
        let n = limit.min(state.rx.len());
        for (slot, byte) in buffer.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        state.rx.clear();
        state.discards += 1;
        Ok(())
    }
}
