//! Bolero fuzzer for RingBuffer write/read sequences.
//!
//! Properties tested:
//! - Bytes come out in the order they went in
//! - A write stores exactly min(len, free space) bytes
//! - available_to_read + available_to_write == capacity after every step
//! - Wrap-around at any capacity, not only powers of two

use bolero::check;
use sidecar_fuzz::byte_ring_model::{MAX_CAPACITY, RingOp, execute_and_verify};

fn main() {
    check!()
        .with_type::<(u8, Vec<(bool, Vec<u8>)>)>()
        .for_each(|(capacity_byte, ops_data)| {
            let capacity = (*capacity_byte as u32 % MAX_CAPACITY) + 1;

            let ops: Vec<RingOp> = ops_data
                .iter()
                .map(|(is_write, bytes)| {
                    if *is_write {
                        RingOp::Write(bytes.clone())
                    } else {
                        RingOp::Read(bytes.len())
                    }
                })
                .collect();

            if let Err(e) = execute_and_verify(capacity, &ops) {
                panic!("Invariant violated: {}", e);
            }
        });
}
