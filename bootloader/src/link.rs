// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Link layer: the two UART endpoints the core talks through.
//!
//! The command channel is strictly request/response: the device is idle
//! whenever it is not processing a frame, so there is no flow control and no
//! interrupt-driven path. The debug channel is fire-and-forget and must
//! never be able to stall the command channel.

/// Blocking byte transport for the command UART.
///
/// Implementations busy-poll hardware status flags; there is no timeout
/// because a stalled host is recovered by external reset, not by the
/// bootloader (see spec §5).
pub trait CommandLink {
    /// Send `bytes` in order, blocking until each has left the transmit
    /// holding register.
    fn transmit(&mut self, bytes: &[u8]);

    /// Fill `buf` completely, blocking until every byte has arrived.
    fn receive(&mut self, buf: &mut [u8]);

    /// Block until the transmitter has fully drained (transmit-complete
    /// flag set), not merely until the holding register is empty.
    ///
    /// Required before any control transfer (`JMP_ADDR`, application
    /// handoff) so the host never observes a truncated reply.
    fn drain(&mut self);
}

/// Fire-and-forget diagnostic channel, separate from the command UART.
pub trait DebugTrace {
    /// Emit one trace line. May silently drop output (e.g. if a transmit
    /// FIFO is full) rather than block, since diagnostics must never add
    /// latency to the command loop.
    fn trace(&mut self, msg: &str);
}

/// A [`DebugTrace`] that discards everything, used when the `trace` feature
/// is off so the core never needs `cfg`-gated call sites.
#[derive(Default)]
pub struct NullTrace;

impl DebugTrace for NullTrace {
    fn trace(&mut self, _msg: &str) {}
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::CommandLink;
    use std::collections::VecDeque;

    /// An in-memory [`CommandLink`] double: `rx` is drained by `receive`,
    /// everything sent via `transmit` is appended to `tx`.
    #[derive(Default)]
    pub struct LoopbackLink {
        pub rx: VecDeque<u8>,
        pub tx: Vec<u8>,
        pub drains: usize,
    }

    impl LoopbackLink {
        pub fn with_rx(bytes: &[u8]) -> Self {
            Self {
                rx: bytes.iter().copied().collect(),
                tx: Vec::new(),
                drains: 0,
            }
        }
    }

    impl CommandLink for LoopbackLink {
        fn transmit(&mut self, bytes: &[u8]) {
            self.tx.extend_from_slice(bytes);
        }

        fn receive(&mut self, buf: &mut [u8]) {
            for slot in buf.iter_mut() {
                *slot = self.rx.pop_front().expect("loopback link underrun");
            }
        }

        fn drain(&mut self) {
            self.drains += 1;
        }
    }
}
