//! Per-connection reassembly queue: restores in-order message boundaries from data packets
//! that may arrive out of order, and computes the cumulative-ack sequence.
use std::collections::VecDeque;

use crate::error::Error;

use super::packet::DataPacket;
use super::sequence::Sequence;

/// Result of a [`ReassemblyQueue::read`] attempt.
pub enum ReadOutcome {
    /// `n` bytes of exactly one complete application message were written into the caller's
    /// buffer and the delivered packets were removed from the queue.
    Ready(usize),
    /// No complete, contiguous, in-order message is available yet. Not an error: the caller
    /// should wait for more data to arrive.
    Wait,
    /// A Shutdown sentinel has been reached with nothing left ahead of it.
    Eof,
}

/// One entry in the pending queue: either a real data packet, or the synthetic EOF sentinel
/// inserted when a Shutdown control packet is received.
enum Entry {
    Data(DataPacket),
    Eof,
}

impl Entry {
    fn seq(&self) -> Option<Sequence> {
        match self {
            Entry::Data(p) => Some(p.sequence),
            Entry::Eof => None,
        }
    }
}

/// Holds out-of-order data packets for one connection until they can be delivered in order.
///
/// `seq` tracks the highest sequence number already delivered to the application (or, before
/// the first delivery, the remote's initial sequence number minus one).
pub struct ReassemblyQueue {
    seq: Sequence,
    q: VecDeque<Entry>,
}

impl ReassemblyQueue {
    /// `initial_seq` is the peer's initial packet sequence number; the queue starts as if
    /// `initial_seq - 1` had already been delivered.
    pub fn new(initial_seq: Sequence) -> Self {
        Self {
            seq: initial_seq - 1,
            q: VecDeque::new(),
        }
    }

    /// Appends a data packet, keeping the queue sorted ascending by sequence number. Exact
    /// duplicates (same sequence as an already-queued packet) are dropped on insert.
    pub fn insert(&mut self, p: DataPacket) {
        if self.q.iter().any(|e| e.seq() == Some(p.sequence)) {
            return;
        }

        let pos = self
            .q
            .iter()
            .position(|e| match e.seq() {
                Some(s) => s > p.sequence,
                None => true,
            })
            .unwrap_or(self.q.len());

        self.q.insert(pos, Entry::Data(p));
    }

    /// Inserts the synthetic EOF sentinel, signalling no further data will arrive.
    pub fn insert_eof(&mut self) {
        if !self.q.iter().any(|e| matches!(e, Entry::Eof)) {
            self.q.push_back(Entry::Eof);
        }
    }

    /// Returns the cumulative-ack value: the highest sequence number such that every packet up
    /// to and including it has been received contiguously, starting from `seq`.
    pub fn ack(&self) -> Sequence {
        let mut a = self.seq;

        for e in &self.q {
            match e.seq() {
                Some(s) if (a + 1) == s => a = s,
                _ => break,
            }
        }

        a
    }

    /// Attempts to deliver one complete application message into `buf`.
    ///
    /// Unlike the reference implementation this never partially copies into `buf` before
    /// discovering it's too small: total length is computed first, so a `ShortBuffer` result
    /// never mutates the queue and a retry with a larger buffer sees the exact same state.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, Error> {
        let Some(first) = self.q.front() else {
            return Ok(ReadOutcome::Wait);
        };

        if matches!(first, Entry::Eof) {
            return Ok(ReadOutcome::Eof);
        }

        let Entry::Data(first_packet) = first else {
            unreachable!()
        };

        if (self.seq + 1) != first_packet.sequence || !first_packet.flags.is_first() {
            return Ok(ReadOutcome::Wait);
        }

        let msg = first_packet.message_number;

        let mut seq = self.seq;
        let mut end = None;

        for (i, e) in self.q.iter().enumerate() {
            let Entry::Data(p) = e else {
                // Hit the EOF sentinel before finding the message's Last packet.
                break;
            };

            if (seq + 1) != p.sequence {
                return Ok(ReadOutcome::Wait);
            }

            if msg != p.message_number {
                break;
            }

            if p.flags.is_last() {
                end = Some(i);
            }

            seq += 1;
        }

        let Some(end) = end else {
            return Ok(ReadOutcome::Wait);
        };

        let total: usize = self.q.iter().take(end + 1).map(|e| match e {
            Entry::Data(p) => p.payload.len(),
            Entry::Eof => 0,
        }).sum();

        if total > buf.len() {
            return Err(Error::ShortBuffer);
        }

        let mut n = 0;
        for _ in 0..=end {
            let Entry::Data(p) = self.q.pop_front().unwrap() else {
                unreachable!()
            };
            buf[n..n + p.payload.len()].copy_from_slice(&p.payload);
            n += p.payload.len();
        }

        self.seq += (end + 1) as u32;

        Ok(ReadOutcome::Ready(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srt::message::MessageNumber;
    use crate::srt::packet::DataFlags;
    use bytes::Bytes;

    fn packet(seq: u32, flags: DataFlags, msg: u32, payload: &[u8]) -> DataPacket {
        DataPacket {
            sequence: Sequence::from(seq),
            flags,
            message_number: MessageNumber::from(msg),
            timestamp: 0,
            destination_socket_id: 0,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn test_gap_blocks_then_delivers() {
        let mut q = ReassemblyQueue::new(Sequence::from(10));

        q.insert(packet(10, DataFlags::FIRST, 1, b"AAA"));
        q.insert(packet(12, DataFlags::LAST, 1, b"CCC"));

        assert!(matches!(q.read(&mut [0u8; 16]), Ok(ReadOutcome::Wait)));
        assert_eq!(q.ack().get(), 10);

        q.insert(packet(11, DataFlags::empty(), 1, b"BBB"));
        assert_eq!(q.ack().get(), 12);

        let mut buf = [0u8; 16];
        match q.read(&mut buf).unwrap() {
            ReadOutcome::Ready(n) => assert_eq!(&buf[..n], b"AAABBBCCC"),
            _ => panic!("expected Ready"),
        }
    }

    #[test]
    fn test_short_buffer_preserves_state() {
        let mut q = ReassemblyQueue::new(Sequence::from(1));
        q.insert(packet(1, DataFlags::FIRST | DataFlags::LAST, 0, &[1u8; 10]));

        let mut small = [0u8; 4];
        assert!(matches!(q.read(&mut small), Err(Error::ShortBuffer)));

        let mut big = [0u8; 10];
        match q.read(&mut big).unwrap() {
            ReadOutcome::Ready(n) => assert_eq!(n, 10),
            _ => panic!("expected Ready after retry"),
        }
    }

    #[test]
    fn test_eof_after_shutdown() {
        let mut q = ReassemblyQueue::new(Sequence::from(1));
        q.insert_eof();

        assert!(matches!(q.read(&mut [0u8; 1]), Ok(ReadOutcome::Eof)));
        assert!(matches!(q.read(&mut [0u8; 1]), Ok(ReadOutcome::Eof)));
    }

    #[test]
    fn test_empty_queue_waits() {
        let mut q = ReassemblyQueue::new(Sequence::from(1));
        assert!(matches!(q.read(&mut [0u8; 1]), Ok(ReadOutcome::Wait)));
    }
}
