//! Drives a real `RingBuffer` and a `VecDeque` side by side.
//!
//! The ring is a byte FIFO bounded by its capacity, so after every operation
//! both must agree on contents, free space and what a read returns.

use std::collections::VecDeque;

use sidecar_ring::RingBuffer;

/// Largest capacity exercised; small capacities wrap more often.
pub const MAX_CAPACITY: u32 = 64;

#[derive(Debug, Clone)]
pub enum RingOp {
    Write(Vec<u8>),
    Read(usize),
}

/// Apply `ops` to a ring of `capacity` bytes and check it against the model.
pub fn execute_and_verify(capacity: u32, ops: &[RingOp]) -> Result<(), String> {
    let ring = RingBuffer::create(capacity).map_err(|e| e.to_string())?;
    let mut model: VecDeque<u8> = VecDeque::new();
    let cap = capacity as usize;

    for (step, op) in ops.iter().enumerate() {
        match op {
            RingOp::Write(bytes) => {
                let expected = bytes.len().min(cap - model.len());
                let written = ring.write(bytes) as usize;
                if written != expected {
                    return Err(format!(
                        "step {}: wrote {} bytes, expected {}",
                        step, written, expected
                    ));
                }
                model.extend(&bytes[..written]);
            }
            RingOp::Read(len) => {
                let mut buf = vec![0u8; *len];
                let read = ring.read(&mut buf) as usize;
                let expected: Vec<u8> = model.drain(..(*len).min(model.len())).collect();
                if buf[..read] != expected[..] {
                    return Err(format!(
                        "step {}: read {:?}, expected {:?}",
                        step,
                        &buf[..read],
                        expected
                    ));
                }
            }
        }

        let readable = ring.available_to_read() as usize;
        let writable = ring.available_to_write() as usize;
        if readable != model.len() {
            return Err(format!(
                "step {}: available_to_read {} but model holds {}",
                step,
                readable,
                model.len()
            ));
        }
        if readable + writable != cap {
            return Err(format!(
                "step {}: readable {} + writable {} != capacity {}",
                step, readable, writable, cap
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraparound_sequence() {
        let ops = vec![
            RingOp::Write(vec![1; 15]),
            RingOp::Read(14),
            RingOp::Write(vec![2, 3, 4, 5, 6]),
            RingOp::Read(16),
        ];
        execute_and_verify(16, &ops).unwrap();
    }

    #[test]
    fn overfull_write_is_truncated() {
        let ops = vec![
            RingOp::Write((0..20).collect()),
            RingOp::Write(vec![9]),
            RingOp::Read(3),
            RingOp::Write(vec![7; 10]),
            RingOp::Read(100),
        ];
        execute_and_verify(8, &ops).unwrap();
    }
}
