//! SIGINT/SIGTERM → run cancellation.
//!
//! The handlers only set the token's flag; the run notices it at the next
//! entry boundary, skips the drain and closes both snapshots normally.

#![allow(missing_docs)]

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::core::errors::{DendrError, Result};
use crate::diff::cancel::CancelToken;

/// Signals that cancel a run.
pub const CANCEL_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

/// Route SIGINT and SIGTERM to `token`.
///
/// Registration stays in effect for the life of the process.
pub fn install_cancel_handler(token: &CancelToken) -> Result<()> {
    for signal in CANCEL_SIGNALS {
        signal_hook::flag::register(signal, token.flag()).map_err(|err| DendrError::Runtime {
            details: format!("failed to register handler for signal {signal}: {err}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn raised_signal_cancels_token() {
        let token = CancelToken::new();
        install_cancel_handler(&token).unwrap();
        assert!(!token.is_cancelled());
        signal_hook::low_level::raise(SIGTERM).unwrap();
        assert!(token.is_cancelled());
    }
}
