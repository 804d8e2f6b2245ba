// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounded, allocation-free diagnostic formatting.
//!
//! Debug lines are written into a fixed stack buffer and handed to a
//! [`crate::link::DebugTrace`] whole, never byte-by-byte, so a long message
//! is truncated rather than ever blocking the caller waiting on transmit
//! hardware.

use core::fmt::{self, Write as _};

const TRACE_BUF_LEN: usize = 96;

struct TraceBuf {
    buf: [u8; TRACE_BUF_LEN],
    len: usize,
}

impl TraceBuf {
    fn new() -> Self {
        Self { buf: [0; TRACE_BUF_LEN], len: 0 }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl fmt::Write for TraceBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = TRACE_BUF_LEN - self.len;
        let take = s.len().min(remaining);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Formats `args` into a bounded buffer and emits it through `sink`,
/// silently truncating if the formatted line would overflow
/// [`TRACE_BUF_LEN`].
pub fn emit(sink: &mut impl crate::link::DebugTrace, args: fmt::Arguments) {
    let mut buf = TraceBuf::new();
    let _ = buf.write_fmt(args);
    sink.trace(buf.as_str());
}

/// Emits one diagnostic line if the `trace` feature is enabled, otherwise
/// compiles to nothing.
#[macro_export]
macro_rules! trace {
    ($sink:expr, $($arg:tt)*) => {{
        #[cfg(feature = "trace")]
        {
            $crate::trace::emit($sink, core::format_args!($($arg)*));
        }
        #[cfg(not(feature = "trace"))]
        {
            let _ = &$sink;
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::DebugTrace;

    struct Captured(std::string::String);

    impl DebugTrace for Captured {
        fn trace(&mut self, msg: &str) {
            self.0.push_str(msg);
        }
    }

    #[test]
    fn short_message_emitted_in_full() {
        let mut sink = Captured(std::string::String::new());
        emit(&mut sink, format_args!("cmd={:#x}", 0xA1u8));
        assert_eq!(sink.0, "cmd=0xa1");
    }

    #[test]
    fn long_message_is_truncated_not_dropped() {
        let mut sink = Captured(std::string::String::new());
        let long = "x".repeat(TRACE_BUF_LEN * 2);
        emit(&mut sink, format_args!("{}", long));
        assert_eq!(sink.0.len(), TRACE_BUF_LEN);
    }
}
