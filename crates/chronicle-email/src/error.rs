//! Maps IMAP/TLS errors onto the shared `ChannelError` vocabulary so the
//! client manager never depends on a concrete protocol's error type.

use chronicle_channels::ChannelError;

pub(crate) fn connect_failed(e: impl std::fmt::Display) -> ChannelError {
    ChannelError::ConnectionFailed(e.to_string())
}
