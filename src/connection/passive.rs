//! Passive-mode address negotiation (PASV / EPSV)

use log::debug;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::CommandConnection;
use crate::context::Context;
use crate::error::{FtpError, Result};
use crate::responses::status_codes::{EXTENDED_PASSIVE_MODE, PASSIVE_MODE};

const PASV_NO_PORT: &str = "PASV reply provided no port";
const EPSV_NO_PORT: &str = "EPSV reply provided no port";

// EPSV reply delimiters, e.g. "229 Entering Extended Passive Mode (|||6446|)"
const EPSV_START: &str = "(|||";
const EPSV_END: &str = "|)";

impl CommandConnection {
    /// Ask the server for a passive data address.
    ///
    /// IPv6 control connections use EPSV, everything else PASV.
    pub fn obtain_passive_address(&self, ctx: &Context) -> Result<SocketAddr> {
        if self.peer_addr().is_ipv6() {
            self.obtain_extended_passive_address(ctx)
        } else {
            self.obtain_ipv4_passive_address(ctx)
        }
    }

    fn obtain_ipv4_passive_address(&self, ctx: &Context) -> Result<SocketAddr> {
        let reply = self.send_command(ctx, "PASV")?;
        if reply.code() != PASSIVE_MODE {
            return Err(FtpError::Rejected(reply));
        }

        let addr = parse_pasv_reply(reply.message())?;
        debug!("PASV data address: {}", addr);
        Ok(addr)
    }

    fn obtain_extended_passive_address(&self, ctx: &Context) -> Result<SocketAddr> {
        let reply = self.send_command(ctx, "EPSV")?;
        if reply.code() != EXTENDED_PASSIVE_MODE {
            return Err(FtpError::Rejected(reply));
        }

        // EPSV names only the port; the host is the control peer
        let port = parse_epsv_reply(reply.message())?;
        let addr = SocketAddr::new(self.peer_addr().ip(), port);
        debug!("EPSV data address: {}", addr);
        Ok(addr)
    }
}

/// Extract `h1,h2,h3,h4,p1,p2` from anywhere in a PASV reply message
pub fn parse_pasv_reply(message: &str) -> Result<SocketAddr> {
    let bytes = message.as_bytes();

    for start in 0..bytes.len() {
        let begins_number =
            bytes[start].is_ascii_digit() && (start == 0 || !bytes[start - 1].is_ascii_digit());
        if !begins_number {
            continue;
        }

        if let Some([h1, h2, h3, h4, p1, p2]) = sextet_at(&message[start..]) {
            let ip = IpAddr::V4(Ipv4Addr::new(h1, h2, h3, h4));
            let port = (u16::from(p1) << 8) | u16::from(p2);
            return Ok(SocketAddr::new(ip, port));
        }
    }

    Err(FtpError::AddressParse(PASV_NO_PORT))
}

/// Six comma-separated byte values at the start of `text`
fn sextet_at(text: &str) -> Option<[u8; 6]> {
    let mut numbers = [0u8; 6];
    let mut rest = text;

    for (i, slot) in numbers.iter_mut().enumerate() {
        if i > 0 {
            rest = rest.strip_prefix(',')?;
        }
        let len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if len == 0 {
            return None;
        }
        *slot = rest[..len].parse().ok()?;
        rest = &rest[len..];
    }

    Some(numbers)
}

/// Extract the port between the last `(|||` and the last `|)`
pub fn parse_epsv_reply(message: &str) -> Result<u16> {
    let no_port = || FtpError::AddressParse(EPSV_NO_PORT);

    let start = message.rfind(EPSV_START).ok_or_else(no_port)? + EPSV_START.len();
    let end = message.rfind(EPSV_END).ok_or_else(no_port)?;
    if end <= start {
        return Err(no_port());
    }

    message[start..end].parse().map_err(|_| no_port())
}
