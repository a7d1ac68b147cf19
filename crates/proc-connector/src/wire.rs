//! Byte layout of the messages exchanged with the process connector
//!
//! A datagram holds one or more netlink messages. Each connector message is a
//! `nlmsghdr`, followed by a `cn_msg`, followed by a `proc_event`:
//!
//! ```text
//! nlmsghdr  | len u32 | type u16 | flags u16 | seq u32 | port u32 |
//! cn_msg    | idx u32 | val u32 | seq u32 | ack u32 | len u16 | flags u16 |
//! proc_event| what u32 | cpu u32 | timestamp_ns u64 | event_data ... |
//! ```
//!
//! All integers are in native byte order.

use crate::error::DecodeError;
use log::warn;

pub(crate) const NLMSG_HDRLEN: usize = 16;
const CN_MSG_LEN: usize = 20;
const PROC_EVENT_HEADER_LEN: usize = 16;
const COMM_LEN: usize = 16;

const NLMSG_NOOP: u16 = 1;
const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE: u16 = 3;

pub(crate) const CN_IDX_PROC: u32 = 1;
const CN_VAL_PROC: u32 = 1;

pub(crate) const PROC_CN_MCAST_LISTEN: u32 = 1;
pub(crate) const PROC_CN_MCAST_IGNORE: u32 = 2;

const PROC_EVENT_NONE: u32 = 0x0000_0000;
const PROC_EVENT_FORK: u32 = 0x0000_0001;
const PROC_EVENT_EXEC: u32 = 0x0000_0002;
const PROC_EVENT_COMM: u32 = 0x0000_0200;
const PROC_EVENT_EXIT: u32 = 0x8000_0000;

/// A decoded process connector event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcEvent {
    /// Acknowledgement of a multicast subscription change
    Ack { err: u32 },
    Fork {
        parent_pid: u32,
        parent_tgid: u32,
        child_pid: u32,
        child_tgid: u32,
    },
    Exec {
        process_pid: u32,
        process_tgid: u32,
    },
    Exit {
        process_pid: u32,
        process_tgid: u32,
        exit_code: u32,
        exit_signal: u32,
    },
    Comm {
        process_pid: u32,
        process_tgid: u32,
        comm: String,
    },
    /// uid, gid, sid, ptrace, coredump and future event kinds
    Other { what: u32 },
}

/// Decode every connector message contained in a received datagram
///
/// A malformed connector message is logged and skipped, the others are still returned.
/// Only a broken netlink framing or a netlink error fails the whole datagram.
pub fn decode_datagram(datagram: &[u8]) -> Result<Vec<ProcEvent>, DecodeError> {
    let mut events = Vec::new();
    let mut offset = 0;

    while datagram.len() - offset >= NLMSG_HDRLEN {
        let message = &datagram[offset..];
        let len = read_u32(message, 0, "netlink header")? as usize;
        let kind = read_u16(message, 4, "netlink header")?;
        if len < NLMSG_HDRLEN || len > message.len() {
            return Err(DecodeError::Truncated {
                what: "netlink message",
                needed: len.max(NLMSG_HDRLEN),
                available: message.len(),
            });
        }

        let payload = &message[NLMSG_HDRLEN..len];
        match kind {
            NLMSG_NOOP => {}
            NLMSG_ERROR => {
                let errno = read_u32(payload, 0, "netlink error")? as i32;
                if errno != 0 {
                    return Err(DecodeError::Netlink {
                        errno: errno.wrapping_neg(),
                    });
                }
            }
            _ => match decode_connector_message(payload) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(err) => warn!("Skipping a malformed process event: {err}"),
            },
        }

        offset = (offset + align(len)).min(datagram.len());
    }

    Ok(events)
}

fn decode_connector_message(payload: &[u8]) -> Result<Option<ProcEvent>, DecodeError> {
    let idx = read_u32(payload, 0, "connector header")?;
    let val = read_u32(payload, 4, "connector header")?;
    let data_len = read_u16(payload, 16, "connector header")? as usize;
    if idx != CN_IDX_PROC || val != CN_VAL_PROC {
        return Ok(None);
    }

    let data = payload
        .get(CN_MSG_LEN..CN_MSG_LEN + data_len)
        .ok_or(DecodeError::Truncated {
            what: "connector payload",
            needed: CN_MSG_LEN + data_len,
            available: payload.len(),
        })?;
    decode_proc_event(data).map(Some)
}

fn decode_proc_event(data: &[u8]) -> Result<ProcEvent, DecodeError> {
    let what = read_u32(data, 0, "process event header")?;
    let body = data
        .get(PROC_EVENT_HEADER_LEN..)
        .ok_or(DecodeError::Truncated {
            what: "process event header",
            needed: PROC_EVENT_HEADER_LEN,
            available: data.len(),
        })?;

    let event = match what {
        PROC_EVENT_NONE => ProcEvent::Ack {
            err: read_u32(body, 0, "ack event")?,
        },
        PROC_EVENT_FORK => ProcEvent::Fork {
            parent_pid: read_u32(body, 0, "fork event")?,
            parent_tgid: read_u32(body, 4, "fork event")?,
            child_pid: read_u32(body, 8, "fork event")?,
            child_tgid: read_u32(body, 12, "fork event")?,
        },
        PROC_EVENT_EXEC => ProcEvent::Exec {
            process_pid: read_u32(body, 0, "exec event")?,
            process_tgid: read_u32(body, 4, "exec event")?,
        },
        PROC_EVENT_EXIT => ProcEvent::Exit {
            process_pid: read_u32(body, 0, "exit event")?,
            process_tgid: read_u32(body, 4, "exit event")?,
            exit_code: read_u32(body, 8, "exit event")?,
            exit_signal: read_u32(body, 12, "exit event")?,
        },
        PROC_EVENT_COMM => {
            let comm = body
                .get(8..8 + COMM_LEN)
                .ok_or(DecodeError::Truncated {
                    what: "comm event",
                    needed: 8 + COMM_LEN,
                    available: body.len(),
                })?;
            ProcEvent::Comm {
                process_pid: read_u32(body, 0, "comm event")?,
                process_tgid: read_u32(body, 4, "comm event")?,
                comm: comm_str(comm),
            }
        }
        what => ProcEvent::Other { what },
    };
    Ok(event)
}

/// Build the message switching the multicast subscription on or off
pub(crate) fn encode_mcast_op(op: u32, port_id: u32) -> Vec<u8> {
    let total = NLMSG_HDRLEN + CN_MSG_LEN + 4;
    let mut message = Vec::with_capacity(total);

    message.extend_from_slice(&(total as u32).to_ne_bytes());
    message.extend_from_slice(&NLMSG_DONE.to_ne_bytes());
    message.extend_from_slice(&0u16.to_ne_bytes());
    message.extend_from_slice(&0u32.to_ne_bytes());
    message.extend_from_slice(&port_id.to_ne_bytes());

    message.extend_from_slice(&CN_IDX_PROC.to_ne_bytes());
    message.extend_from_slice(&CN_VAL_PROC.to_ne_bytes());
    message.extend_from_slice(&0u32.to_ne_bytes());
    message.extend_from_slice(&0u32.to_ne_bytes());
    message.extend_from_slice(&4u16.to_ne_bytes());
    message.extend_from_slice(&0u16.to_ne_bytes());

    message.extend_from_slice(&op.to_ne_bytes());
    message
}

fn comm_str(comm: &[u8]) -> String {
    let len = comm.iter().position(|&c| c == 0).unwrap_or(comm.len());
    String::from_utf8_lossy(&comm[..len]).into_owned()
}

fn align(len: usize) -> usize {
    (len + 3) & !3
}

fn read_u32(bytes: &[u8], at: usize, what: &'static str) -> Result<u32, DecodeError> {
    bytes
        .get(at..at + 4)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map(u32::from_ne_bytes)
        .ok_or(DecodeError::Truncated {
            what,
            needed: at + 4,
            available: bytes.len(),
        })
}

fn read_u16(bytes: &[u8], at: usize, what: &'static str) -> Result<u16, DecodeError> {
    bytes
        .get(at..at + 2)
        .and_then(|b| <[u8; 2]>::try_from(b).ok())
        .map(u16::from_ne_bytes)
        .ok_or(DecodeError::Truncated {
            what,
            needed: at + 2,
            available: bytes.len(),
        })
}
