//! Syslog handler
//!
//! Writes every record to its baseline sink, then sends the same line to a
//! syslog daemon at the mapped severity. Sending is synchronous: a failed
//! send surfaces as [`EmitError::Transport`] after one reconnect attempt.

use super::baseline::BaselineSink;
use crate::core::{
    Attribute, CloseError, EmitError, Handler, LogLevel, LogRecord, SetupError, SharedHandler,
    SyslogSeverity,
};
use chrono::{Local, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::net::UnixDatagram;

/// Well-known local syslog sockets, tried in order
#[cfg(unix)]
const LOCAL_SOCKETS: [&str; 3] = ["/dev/log", "/var/run/syslog", "/var/run/log"];

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyslogNetwork {
    /// Local daemon over a Unix datagram socket
    Local,
    #[default]
    Udp,
    Tcp,
}

impl SyslogNetwork {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyslogNetwork::Local => "local",
            SyslogNetwork::Udp => "udp",
            SyslogNetwork::Tcp => "tcp",
        }
    }
}

impl fmt::Display for SyslogNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyslogNetwork {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "local" | "unix" | "unixgram" => Ok(SyslogNetwork::Local),
            "udp" | "udp4" | "udp6" => Ok(SyslogNetwork::Udp),
            "tcp" | "tcp4" | "tcp6" => Ok(SyslogNetwork::Tcp),
            other => Err(SetupError::config(
                "syslog",
                format!("unsupported network '{}'", other),
            )),
        }
    }
}

/// Syslog facilities (RFC 5424, section 6.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facility {
    Kern = 0,
    User = 1,
    Daemon = 3,
    Auth = 4,
    #[default]
    Local0 = 16,
    Local1 = 17,
    Local2 = 18,
    Local3 = 19,
    Local4 = 20,
    Local5 = 21,
    Local6 = 22,
    Local7 = 23,
}

impl Facility {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogConfig {
    pub network: SyslogNetwork,
    /// `host:port` for network transports; ignored for `Local`
    pub address: Option<String>,
    pub tag: String,
    pub facility: Facility,
}

impl SyslogConfig {
    pub fn new(network: SyslogNetwork, address: impl Into<String>) -> Self {
        Self {
            network,
            address: Some(address.into()),
            tag: "app".to_string(),
            facility: Facility::default(),
        }
    }

    /// Config for the local syslog daemon
    pub fn local() -> Self {
        Self {
            network: SyslogNetwork::Local,
            address: None,
            tag: "app".to_string(),
            facility: Facility::default(),
        }
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_facility(mut self, facility: Facility) -> Self {
        self.facility = facility;
        self
    }

    fn address_label(&self) -> String {
        self.address.clone().unwrap_or_else(|| "local".to_string())
    }
}

enum Transport {
    #[cfg(unix)]
    Local(UnixDatagram),
    Udp(UdpSocket),
    Tcp(TcpStream),
}

impl Transport {
    fn connect(config: &SyslogConfig) -> Result<Self, SetupError> {
        let address = config.address_label();
        let fail = |e: io::Error| SetupError::transport(config.network.as_str(), address.clone(), e);

        match config.network {
            SyslogNetwork::Local => Self::connect_local().map_err(fail),
            SyslogNetwork::Udp => {
                let target = resolve(&address).map_err(fail)?;
                let bind = if target.is_ipv6() {
                    SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
                } else {
                    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
                };
                let socket = UdpSocket::bind(bind).map_err(fail)?;
                socket.connect(target).map_err(fail)?;
                Ok(Transport::Udp(socket))
            }
            SyslogNetwork::Tcp => {
                let target = resolve(&address).map_err(fail)?;
                let stream = TcpStream::connect_timeout(&target, DIAL_TIMEOUT).map_err(fail)?;
                stream.set_write_timeout(Some(DIAL_TIMEOUT)).map_err(fail)?;
                Ok(Transport::Tcp(stream))
            }
        }
    }

    #[cfg(unix)]
    fn connect_local() -> io::Result<Self> {
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no local syslog socket");
        for path in LOCAL_SOCKETS {
            let socket = UnixDatagram::unbound()?;
            match socket.connect(path) {
                Ok(()) => return Ok(Transport::Local(socket)),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    #[cfg(not(unix))]
    fn connect_local() -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "local syslog requires a Unix socket",
        ))
    }

    fn is_local(&self) -> bool {
        #[cfg(unix)]
        {
            matches!(self, Transport::Local(_))
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            Transport::Local(socket) => socket.send(frame).map(|_| ()),
            Transport::Udp(socket) => socket.send(frame).map(|_| ()),
            Transport::Tcp(stream) => {
                stream.write_all(frame)?;
                stream.flush()
            }
        }
    }

    fn shutdown(self) -> io::Result<()> {
        match self {
            Transport::Tcp(stream) => match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

fn resolve(address: &str) -> io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address for {}", address),
        )
    })
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/proc/sys/kernel/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

struct Connection {
    transport: Option<Transport>,
    closed: bool,
}

struct SyslogWriter {
    config: SyslogConfig,
    hostname: String,
    pid: u32,
    connection: Mutex<Connection>,
}

impl SyslogWriter {
    /// Build an RFC 3164 frame; local daemons get the short form without hostname
    fn frame(&self, severity: SyslogSeverity, line: &str, local: bool) -> Vec<u8> {
        let priority = u16::from(self.config.facility.code()) * 8 + u16::from(severity.code());
        let mut frame = if local {
            format!(
                "<{}>{} {}[{}]: {}",
                priority,
                Local::now().format("%b %e %H:%M:%S"),
                self.config.tag,
                self.pid,
                line
            )
        } else {
            format!(
                "<{}>{} {} {}[{}]: {}",
                priority,
                Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                self.hostname,
                self.config.tag,
                self.pid,
                line
            )
        };
        if !frame.ends_with('\n') {
            frame.push('\n');
        }
        frame.into_bytes()
    }

    fn send(&self, severity: SyslogSeverity, line: &str) -> Result<(), EmitError> {
        let mut connection = self.connection.lock();
        if connection.closed {
            return Err(EmitError::closed("syslog"));
        }

        if let Some(transport) = connection.transport.as_mut() {
            let frame = self.frame(severity, line, transport.is_local());
            if transport.send(&frame).is_ok() {
                return Ok(());
            }
        }

        // Reconnect once, then give up on this record
        connection.transport = None;
        let mut transport = Transport::connect(&self.config).map_err(|e| match e {
            SetupError::Transport { source, .. } => EmitError::transport(source),
            other => EmitError::transport(io::Error::new(io::ErrorKind::NotConnected, other.to_string())),
        })?;
        let frame = self.frame(severity, line, transport.is_local());
        transport.send(&frame).map_err(EmitError::transport)?;
        connection.transport = Some(transport);
        Ok(())
    }

    fn close(&self) -> Result<(), CloseError> {
        let mut connection = self.connection.lock();
        connection.closed = true;
        match connection.transport.take() {
            Some(transport) => transport
                .shutdown()
                .map_err(|source| CloseError::Transport { source }),
            None => Ok(()),
        }
    }
}

/// Handler sending each record to syslog after writing it to its baseline
#[derive(Clone)]
pub struct SyslogHandler {
    baseline: BaselineSink,
    writer: Arc<SyslogWriter>,
}

impl SyslogHandler {
    /// Dial the syslog transport described by `config`
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Transport`] if the daemon cannot be reached or
    /// the address does not resolve.
    pub fn connect(config: SyslogConfig, baseline: BaselineSink) -> Result<Self, SetupError> {
        if config.network != SyslogNetwork::Local && config.address.is_none() {
            return Err(SetupError::config(
                "syslog",
                format!("{} transport needs an address", config.network),
            ));
        }
        let transport = Transport::connect(&config)?;

        Ok(Self {
            baseline,
            writer: Arc::new(SyslogWriter {
                config,
                hostname: hostname(),
                pid: std::process::id(),
                connection: Mutex::new(Connection {
                    transport: Some(transport),
                    closed: false,
                }),
            }),
        })
    }

    pub fn config(&self) -> &SyslogConfig {
        &self.writer.config
    }

    pub fn baseline(&self) -> &BaselineSink {
        &self.baseline
    }
}

impl Handler for SyslogHandler {
    fn enabled(&self, level: LogLevel) -> bool {
        self.baseline.enabled(level)
    }

    fn emit(&self, record: &LogRecord) -> crate::core::Result<()> {
        let written = self.baseline.emit(record);
        let line = self.baseline.encode(record);
        let sent = self
            .writer
            .send(SyslogSeverity::from_level(record.level()), &line);
        written.and(sent)
    }

    fn with_attributes(&self, extra: &[Attribute]) -> SharedHandler {
        Arc::new(Self {
            baseline: self.baseline.derive_attributes(extra),
            writer: Arc::clone(&self.writer),
        })
    }

    fn with_group(&self, name: &str) -> SharedHandler {
        Arc::new(Self {
            baseline: self.baseline.derive_group(name),
            writer: Arc::clone(&self.writer),
        })
    }

    fn close(&self) -> Result<(), CloseError> {
        let transport = self.writer.close();
        let baseline = self.baseline.close();
        transport.and(baseline)
    }

    fn name(&self) -> &str {
        "syslog"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attr;
    use crate::handlers::baseline::SharedBuffer;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    fn receiver() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        socket
    }

    fn recv_string(socket: &UdpSocket) -> String {
        let mut buf = [0u8; 8192];
        let n = socket.recv(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn udp_handler(socket: &UdpSocket) -> (SyslogHandler, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let baseline = BaselineSink::from_writer("memory", buffer.clone(), LogLevel::Debug);
        let config = SyslogConfig::new(SyslogNetwork::Udp, socket.local_addr().unwrap().to_string())
            .with_tag("orders");
        (SyslogHandler::connect(config, baseline).unwrap(), buffer)
    }

    #[test]
    fn test_network_parsing() {
        assert_eq!("".parse::<SyslogNetwork>().unwrap(), SyslogNetwork::Local);
        assert_eq!("UDP".parse::<SyslogNetwork>().unwrap(), SyslogNetwork::Udp);
        assert_eq!("tcp4".parse::<SyslogNetwork>().unwrap(), SyslogNetwork::Tcp);
        assert!("carrier-pigeon".parse::<SyslogNetwork>().is_err());
    }

    #[test]
    fn test_warn_record_sent_at_warning_severity() {
        let socket = receiver();
        let (handler, buffer) = udp_handler(&socket);

        let record = LogRecord::new(LogLevel::Warn, "stock low").with_attribute("order_id", 42);
        handler.emit(&record).unwrap();

        let frame = recv_string(&socket);
        // LOCAL0 (16) * 8 + WARNING (4)
        assert!(frame.starts_with("<132>"), "frame: {}", frame);
        assert!(frame.contains("orders["));
        assert!(frame.contains("order_id=42"));
        assert!(frame.contains("level=WARN"));

        assert_eq!(buffer.lines().len(), 1);
        assert!(buffer.lines()[0].contains("order_id=42"));
    }

    #[test]
    fn test_severity_per_level() {
        let socket = receiver();
        let (handler, _) = udp_handler(&socket);

        for (level, priority) in [
            (LogLevel::Debug, "<135>"),
            (LogLevel::Info, "<134>"),
            (LogLevel::Error, "<131>"),
        ] {
            handler.emit(&LogRecord::new(level, "x")).unwrap();
            assert!(recv_string(&socket).starts_with(priority));
        }
    }

    #[test]
    fn test_derived_handler_shares_transport() {
        let socket = receiver();
        let (handler, _) = udp_handler(&socket);
        let derived = handler.with_attributes(&[attr("tenant", "acme")]);

        derived.emit(&LogRecord::new(LogLevel::Info, "scoped")).unwrap();
        assert!(recv_string(&socket).contains("tenant=acme"));
    }

    #[test]
    fn test_tcp_transport_frames_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).unwrap();
            line
        });

        let baseline = BaselineSink::from_writer("memory", SharedBuffer::new(), LogLevel::Info);
        let handler = SyslogHandler::connect(SyslogConfig::new(SyslogNetwork::Tcp, address), baseline).unwrap();
        handler.emit(&LogRecord::new(LogLevel::Error, "db down")).unwrap();

        let line = server.join().unwrap();
        assert!(line.starts_with("<131>"));
        assert!(line.ends_with('\n'));
        handler.close().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let socket = receiver();
        let (handler, buffer) = udp_handler(&socket);

        handler.close().unwrap();
        handler.close().unwrap();

        assert!(handler.emit(&LogRecord::new(LogLevel::Info, "after close")).is_err());
        assert!(matches!(
            handler.writer.send(SyslogSeverity::Info, "late"),
            Err(EmitError::Closed { .. })
        ));
        // Writer-backed baselines are closed too, so nothing new lands there
        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn test_tcp_connect_failure_is_setup_error() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let baseline = BaselineSink::from_writer("memory", SharedBuffer::new(), LogLevel::Info);
        let result = SyslogHandler::connect(
            SyslogConfig::new(SyslogNetwork::Tcp, format!("127.0.0.1:{}", port)),
            baseline,
        );
        assert!(matches!(result, Err(SetupError::Transport { .. })));
    }

    #[test]
    fn test_missing_address_rejected() {
        let mut config = SyslogConfig::local();
        config.network = SyslogNetwork::Udp;
        let baseline = BaselineSink::from_writer("memory", SharedBuffer::new(), LogLevel::Info);
        assert!(matches!(
            SyslogHandler::connect(config, baseline),
            Err(SetupError::InvalidConfiguration { .. })
        ));
    }
}
