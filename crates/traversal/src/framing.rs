//! Message framing for SIP over a byte stream.
//!
//! A REGISTER of this dialog carries no body, so a message ends at the first
//! blank line. The reader scans the accumulated bytes for a trailing
//! `CRLF CRLF` and stops exactly there.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::trace;

use crate::error::{Error, Result};

/// Blank line that ends the header section
pub const TERMINATOR: &[u8] = b"\r\n\r\n";

const INITIAL_CAPACITY: usize = 1024;

/// Read one message, terminator included.
///
/// Bytes that follow the terminator stay in `reader`. With `max_size` set, a
/// peer that sends `max_size` bytes without completing a message gets
/// [`Error::MessageTooLarge`]; `None` leaves the buffer unbounded.
pub async fn read_message<R>(reader: &mut R, max_size: Option<usize>) -> Result<BytesMut>
where
    R: AsyncBufRead + Unpin,
{
    let mut data = BytesMut::with_capacity(INITIAL_CAPACITY);

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(Error::ConnectionClosed(data.len()));
        }

        let mut used = 0;
        let mut complete = false;
        let mut overflow = false;

        for &byte in available {
            data.put_u8(byte);
            used += 1;

            if data.ends_with(TERMINATOR) {
                complete = true;
                break;
            }
            if max_size.is_some_and(|max| data.len() >= max) {
                overflow = true;
                break;
            }
        }

        reader.consume(used);
        trace!("framing: buffered {} bytes", data.len());

        if complete {
            return Ok(data);
        }
        if overflow {
            return Err(Error::MessageTooLarge(max_size.unwrap_or_default()));
        }
    }
}
