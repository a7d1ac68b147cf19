use std::io;

/// Failure to decode a datagram received from the process connector
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated {what}: needed {needed} bytes, got {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("netlink reported error {errno}")]
    Netlink { errno: i32 },
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("{op} failed on the process connector socket: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error(
        "permission denied while subscribing to process events (CAP_NET_ADMIN is required, try running as root)"
    )]
    PermissionDenied,
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ConnectorError {
    pub(crate) fn last_os(op: &'static str) -> Self {
        let source = io::Error::last_os_error();
        if source.kind() == io::ErrorKind::PermissionDenied {
            return ConnectorError::PermissionDenied;
        }
        ConnectorError::Io { op, source }
    }
}
