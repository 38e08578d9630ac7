//! Outbound Aggregator
//!
//! Packs encoded commands into size-bounded frames. A frame starts out
//! addressed to everyone; a command for another destination is preceded
//! by an in-band `SetDestination` marker instead of opening a new frame.

use thiserror::Error;

use crate::protocol::{decode, CodecError, Command, CommandTag, Destination, Layout};

/// Size of the in-band destination marker.
pub const MARKER_LEN: usize = Layout::Marker.fixed_size();

/// Aggregation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregatorError {
    /// The command cannot fit even an empty frame.
    #[error("Command of {len} bytes exceeds frame limit {max}")]
    Oversized {
        /// Command length.
        len: usize,
        /// Frame limit.
        max: usize,
    },
}

/// One flushed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Raw frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the frame carries nothing.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Walk the frame, pairing each command with its destination.
    pub fn commands(&self) -> Result<Vec<(Destination, &[u8])>, CodecError> {
        let mut out = Vec::new();
        let mut destination = Destination::Broadcast;
        let mut offset = 0;
        while offset < self.bytes.len() {
            let rest = &self.bytes[offset..];
            let (command, consumed) = decode(rest)?;
            match command {
                Command::SetDestination(next) => destination = next,
                _ => out.push((destination, &rest[..consumed])),
            }
            offset += consumed;
        }
        Ok(out)
    }

    /// Concatenated commands a peer should receive from this frame.
    pub fn bytes_for(&self, peer: u8) -> Result<Vec<u8>, CodecError> {
        Ok(self
            .commands()?
            .into_iter()
            .filter(|(destination, _)| destination.includes(peer))
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect())
    }
}

/// Frame builder for one tick.
#[derive(Debug)]
pub struct OutboundAggregator {
    frames: Vec<Frame>,
    current: Vec<u8>,
    destination: Destination,
    max_frame: usize,
}

impl OutboundAggregator {
    /// Create an aggregator with a frame size limit.
    pub fn new(max_frame: usize) -> Self {
        Self {
            frames: Vec::new(),
            current: Vec::with_capacity(max_frame),
            destination: Destination::Broadcast,
            max_frame,
        }
    }

    /// Queue an encoded command.
    pub fn enqueue(&mut self, destination: Destination, bytes: &[u8]) -> Result<(), AggregatorError> {
        if bytes.len() + MARKER_LEN > self.max_frame {
            return Err(AggregatorError::Oversized {
                len: bytes.len(),
                max: self.max_frame,
            });
        }

        if self.current.len() + self.cost(destination, bytes) > self.max_frame {
            self.finish_frame();
        }
        if destination != self.destination {
            self.current.push(CommandTag::SetDestination as u8);
            self.current.push(destination.to_byte());
            self.destination = destination;
        }
        self.current.extend_from_slice(bytes);
        Ok(())
    }

    fn cost(&self, destination: Destination, bytes: &[u8]) -> usize {
        let marker = if destination == self.destination { 0 } else { MARKER_LEN };
        bytes.len() + marker
    }

    fn finish_frame(&mut self) {
        if !self.current.is_empty() {
            let bytes = std::mem::replace(&mut self.current, Vec::with_capacity(self.max_frame));
            self.frames.push(Frame { bytes });
        }
        self.destination = Destination::Broadcast;
    }

    /// Bytes queued in the open frame.
    pub fn pending_len(&self) -> usize {
        self.current.len()
    }

    /// Close the open frame and hand out every frame.
    pub fn flush(&mut self) -> Vec<Frame> {
        self.finish_frame();
        std::mem::take(&mut self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tile::TilePosition;
    use crate::protocol::encode;

    fn walk(x: u8) -> Vec<u8> {
        encode(&Command::walk(TilePosition::new(x, 1))).unwrap()
    }

    #[test]
    fn test_same_destination_no_marker() {
        let mut agg = OutboundAggregator::new(100);
        agg.enqueue(Destination::Broadcast, &walk(1)).unwrap();
        agg.enqueue(Destination::Broadcast, &walk(2)).unwrap();
        let frames = agg.flush();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 6);
    }

    #[test]
    fn test_destination_change_inserts_marker() {
        let mut agg = OutboundAggregator::new(100);
        agg.enqueue(Destination::Broadcast, &walk(1)).unwrap();
        agg.enqueue(Destination::Peer(2), &walk(2)).unwrap();
        agg.enqueue(Destination::Peer(2), &walk(3)).unwrap();
        agg.enqueue(Destination::Broadcast, &walk(4)).unwrap();
        let frames = agg.flush();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 4 * 3 + 2 * MARKER_LEN);

        let commands = frames[0].commands().unwrap();
        let destinations: Vec<_> = commands.iter().map(|(d, _)| *d).collect();
        assert_eq!(
            destinations,
            vec![
                Destination::Broadcast,
                Destination::Peer(2),
                Destination::Peer(2),
                Destination::Broadcast
            ]
        );
        assert_eq!(frames[0].bytes_for(1).unwrap(), [walk(1), walk(4)].concat());
        assert_eq!(frames[0].bytes_for(2).unwrap().len(), 12);
    }

    #[test]
    fn test_overflow_starts_new_frame() {
        let mut agg = OutboundAggregator::new(8);
        agg.enqueue(Destination::Broadcast, &walk(1)).unwrap();
        agg.enqueue(Destination::Broadcast, &walk(2)).unwrap();
        agg.enqueue(Destination::Peer(1), &walk(3)).unwrap();
        let frames = agg.flush();
        assert_eq!(frames.len(), 2);
        // The second frame is self-describing.
        assert_eq!(frames[1].commands().unwrap()[0].0, Destination::Peer(1));
        assert!(frames.iter().all(|f| f.len() <= 8));
    }

    #[test]
    fn test_oversized_rejected() {
        let mut agg = OutboundAggregator::new(4);
        assert_eq!(
            agg.enqueue(Destination::Broadcast, &walk(1)),
            Err(AggregatorError::Oversized { len: 3, max: 4 })
        );
        assert!(agg.flush().is_empty());
    }
}
