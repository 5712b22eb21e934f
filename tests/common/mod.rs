//! Scripted FTP server for integration tests
//!
//! Each server accepts one control connection and plays the given script
//! against it. Assertions inside the script fail the test on `join`.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rax_ftp_lite::Dialer;

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ScriptedServer {
    addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
}

impl ScriptedServer {
    /// Start a server on 127.0.0.1
    pub fn start<F>(script: F) -> Self
    where
        F: FnOnce(&mut Session) + Send + 'static,
    {
        Self::start_on("127.0.0.1:0", script).expect("bind loopback listener")
    }

    /// Start a server on the given address; `None` if it cannot be bound
    /// (e.g. no IPv6 loopback on this host)
    pub fn start_on<F>(bind: &str, script: F) -> Option<Self>
    where
        F: FnOnce(&mut Session) + Send + 'static,
    {
        let listener = TcpListener::bind(bind).ok()?;
        let addr = listener.local_addr().ok()?;

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept control connection");
            let mut session = Session::new(stream);
            script(&mut session);
        });

        Some(Self {
            addr,
            handle: Some(handle),
        })
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Wait for the script to finish, failing the test if it panicked
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.join().expect("server script failed");
        }
    }
}

pub struct Session {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Session {
    fn new(stream: TcpStream) -> Self {
        stream.set_read_timeout(Some(SCRIPT_TIMEOUT)).unwrap();
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    /// Send one reply line (CRLF appended)
    pub fn reply(&mut self, line: &str) {
        self.raw(&format!("{line}\r\n"));
    }

    /// Send text exactly as given
    pub fn raw(&mut self, text: &str) {
        self.writer.write_all(text.as_bytes()).unwrap();
        self.writer.flush().unwrap();
    }

    /// Read the next command line without its CRLF
    pub fn read_command(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        assert!(line.ends_with("\r\n"), "command not CRLF terminated: {line:?}");
        line.trim_end_matches("\r\n").to_string()
    }

    /// Read the next command and check it
    pub fn expect(&mut self, command: &str) {
        assert_eq!(self.read_command(), command);
    }

    /// Wait until the client closes the control connection
    pub fn expect_eof(&mut self) {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).unwrap_or(0);
        assert_eq!(read, 0, "unexpected data before close: {line:?}");
    }

    /// Listener for a passive data connection on the control connection's IP
    pub fn data_listener(&self) -> TcpListener {
        let ip = self.writer.local_addr().unwrap().ip();
        TcpListener::bind(SocketAddr::new(ip, 0)).unwrap()
    }

    /// Answer PASV with the address of `listener`
    pub fn reply_pasv(&mut self, listener: &TcpListener) {
        let addr = listener.local_addr().unwrap();
        let IpAddr::V4(ip) = addr.ip() else {
            panic!("PASV needs an IPv4 listener");
        };
        let [h1, h2, h3, h4] = ip.octets();
        let port = addr.port();
        self.reply(&format!(
            "227 Entering Passive Mode ({h1},{h2},{h3},{h4},{},{})",
            port >> 8,
            port & 0xff
        ));
    }

    /// Answer EPSV with the port of `listener`
    pub fn reply_epsv(&mut self, listener: &TcpListener) {
        let port = listener.local_addr().unwrap().port();
        self.reply(&format!("229 Entering Extended Passive Mode (|||{port}|)"));
    }

    /// Walk through TYPE and PASV, returning the data listener
    pub fn negotiate_pasv(&mut self, type_code: &str) -> TcpListener {
        self.expect(&format!("TYPE {type_code}"));
        self.reply("200 Type set");
        self.expect("PASV");
        let listener = self.data_listener();
        self.reply_pasv(&listener);
        listener
    }
}

/// Accept the passive data connection
pub fn accept_data(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().expect("accept data connection");
    stream.set_read_timeout(Some(SCRIPT_TIMEOUT)).unwrap();
    stream
}

/// Block until the client closes its end of a data connection.
/// A reset counts as closed: the client may hang up with data unread.
pub fn wait_for_data_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                panic!("client never closed the data connection")
            }
            Err(_) => break,
        }
    }
    received
}

/// Dialer with socket timeouts so a broken script cannot hang a test
pub fn test_dialer() -> Dialer {
    Dialer::new()
        .with_connect_timeout(SCRIPT_TIMEOUT)
        .with_io_timeout(SCRIPT_TIMEOUT)
}
