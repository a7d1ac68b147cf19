use crate::error::ConnectorError;
use crate::wire::{
    CN_IDX_PROC, PROC_CN_MCAST_IGNORE, PROC_CN_MCAST_LISTEN, ProcEvent, decode_datagram,
    encode_mcast_op,
};
use log::{debug, warn};
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// Receive buffer for a single datagram, a few pages is plenty for one batch of events
const RECV_BUFFER_SIZE: usize = 16 * 1024;

/// Kernel-side socket buffer. Bursts of forks (e.g. `make -j`) overflow the default one and
/// the kernel then drops events with ENOBUFS.
const SOCKET_RCVBUF_SIZE: libc::c_int = 4 * 1024 * 1024;

/// A subscription to the kernel process connector
///
/// Events are delivered for every process on the host, not only for the descendants of
/// the caller.
pub struct ProcConnector {
    fd: OwnedFd,
    buffer: Vec<u8>,
}

impl ProcConnector {
    /// Open a netlink connector socket and start listening for process events
    pub fn open() -> Result<Self, ConnectorError> {
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_DGRAM | libc::SOCK_CLOEXEC,
                libc::NETLINK_CONNECTOR,
            )
        };
        if raw < 0 {
            return Err(ConnectorError::last_os("socket"));
        }
        // SAFETY: `raw` is a freshly created descriptor that nothing else owns
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let address = netlink_address(CN_IDX_PROC);
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &address as *const libc::sockaddr_nl as *const libc::sockaddr,
                size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            return Err(ConnectorError::last_os("bind"));
        }

        let connector = Self {
            fd,
            buffer: vec![0; RECV_BUFFER_SIZE],
        };
        connector.grow_socket_buffer();
        connector.set_listening(true)?;
        debug!("Subscribed to the process connector");

        Ok(connector)
    }

    /// Block until the next datagram arrives and decode the events it carries
    ///
    /// An interrupted read yields an empty batch.
    pub fn recv(&mut self) -> Result<Vec<ProcEvent>, ConnectorError> {
        let received = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                self.buffer.as_mut_ptr() as *mut libc::c_void,
                self.buffer.len(),
                0,
            )
        };
        if received < 0 {
            let source = io::Error::last_os_error();
            if source.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(ConnectorError::Io {
                op: "recv",
                source,
            });
        }

        Ok(decode_datagram(&self.buffer[..received as usize])?)
    }

    fn set_listening(&self, listen: bool) -> Result<(), ConnectorError> {
        let op = if listen {
            PROC_CN_MCAST_LISTEN
        } else {
            PROC_CN_MCAST_IGNORE
        };
        let message = encode_mcast_op(op, std::process::id());
        let kernel = netlink_address(CN_IDX_PROC);

        let sent = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                message.as_ptr() as *const libc::c_void,
                message.len(),
                0,
                &kernel as *const libc::sockaddr_nl as *const libc::sockaddr,
                size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(ConnectorError::last_os("sendto"));
        }
        Ok(())
    }

    fn grow_socket_buffer(&self) {
        let size = SOCKET_RCVBUF_SIZE;
        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_RCVBUF,
                &size as *const libc::c_int as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            warn!(
                "Failed to grow the process connector socket buffer: {}",
                io::Error::last_os_error()
            );
        }
    }
}

impl Drop for ProcConnector {
    fn drop(&mut self) {
        if let Err(err) = self.set_listening(false) {
            debug!("Failed to unsubscribe from the process connector: {err}");
        }
    }
}

fn netlink_address(groups: u32) -> libc::sockaddr_nl {
    // SAFETY: sockaddr_nl is plain old data, all zeroes is a valid value
    let mut address: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
    address.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    address.nl_pid = 0;
    address.nl_groups = groups;
    address
}
