//! Reply framing over the control connection
//!
//! Decodes one logical reply at a time from a line-oriented transport.
//! The reader has no idea which command a reply belongs to.

use log::debug;
use std::io::{self, BufRead, BufReader, Read};

use super::Reply;
use crate::error::{FtpError, Result};

/// Longest reply line accepted, terminator included
pub const MAX_LINE_LEN: usize = 8192;

/// Buffered reply decoder over a control transport
#[derive(Debug)]
pub struct ReplyReader<R> {
    reader: BufReader<R>,
}

impl<R: Read> ReplyReader<R> {
    /// Create a reader over the given transport
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Borrow the underlying transport
    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Mutably borrow the underlying transport (used for writing commands)
    pub fn get_mut(&mut self) -> &mut R {
        self.reader.get_mut()
    }

    /// Read one complete reply, blocking until it is framed or the
    /// transport fails
    pub fn read_reply(&mut self) -> Result<Reply> {
        let line = self.read_line()?;
        let (code, separator) = parse_code(&line)?;

        // The 4th byte is ASCII, so byte offset 4 is a char boundary
        let first = &line[4..];
        if separator == b' ' {
            return Ok(Reply::new(code, first));
        }

        // Multi-line reply: runs until "<code> " opens a line
        let terminator = format!("{} ", &line[..3]);
        let mut lines = vec![first.to_string()];
        loop {
            match self.read_line() {
                Ok(next) => {
                    if let Some(last) = next.strip_prefix(&terminator) {
                        lines.push(last.to_string());
                        break;
                    }
                    lines.push(next);
                }
                Err(FtpError::Io(source)) => {
                    debug!(
                        "Reply {} cut short after {} lines: {}",
                        code,
                        lines.len(),
                        source
                    );
                    return Err(FtpError::IncompleteReply {
                        partial: Reply::new(code, lines.join("\n")),
                        source,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Reply::new(code, lines.join("\n")))
    }

    /// Read a single line without its CRLF (or bare LF) terminator.
    /// A final unterminated line before EOF is returned as is.
    fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let read = (&mut self.reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Err(FtpError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "control connection closed",
            )));
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if buf.len() == MAX_LINE_LEN {
            return Err(FtpError::Framing(format!(
                "reply line longer than {} bytes",
                MAX_LINE_LEN
            )));
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Validate the "<3 digits><SP|->" prefix of a reply's first line
fn parse_code(line: &str) -> Result<(u16, u8)> {
    let bytes = line.as_bytes();
    if bytes.len() < 4 {
        return Err(FtpError::Framing(format!("short reply line {:?}", line)));
    }

    if !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(FtpError::Framing(format!(
            "invalid reply code in {:?}",
            line
        )));
    }
    let code = bytes[..3]
        .iter()
        .fold(0u16, |acc, digit| acc * 10 + u16::from(digit - b'0'));

    match bytes[3] {
        separator @ (b' ' | b'-') => Ok((code, separator)),
        _ => Err(FtpError::Framing(format!(
            "expected space or hyphen after reply code in {:?}",
            line
        ))),
    }
}
