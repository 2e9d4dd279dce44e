//! Raw TCP / TLS connection to a single node
//!
//! One connection per node per collection round. Reads and writes are
//! bounded by socket timeouts, which is what enforces the per-task timeout
//! of the fan-out pool.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::control_plane::{ControlPlane, ControlPlaneExt};
use crate::config::TlsConfig;
use crate::utils::error::is_transient_server_error;
use crate::utils::{
    AssessError, ConnectionError, ProtocolError, RespDecoder, RespEncoder, RespValue,
};

/// Raw connection wrapper (TCP or TLS)
pub enum RawConnection {
    Tcp {
        writer: BufWriter<TcpStream>,
        reader: BufReader<TcpStream>,
    },
    #[cfg(feature = "native-tls-backend")]
    NativeTls {
        stream: BufReader<native_tls::TlsStream<TcpStream>>,
    },
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConnectionError> {
    let connect_failed = |source| ConnectionError::ConnectFailed {
        host: host.to_string(),
        port,
        source,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(connect_failed)?
        .next()
        .ok_or_else(|| {
            connect_failed(io::Error::new(
                io::ErrorKind::NotFound,
                "No addresses found",
            ))
        })
}

fn open_socket(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    let addr = resolve(host, port)?;
    let stream = TcpStream::connect_timeout(&addr, connect_timeout).map_err(|e| {
        if e.kind() == io::ErrorKind::TimedOut {
            ConnectionError::Timeout(connect_timeout.as_millis() as u64)
        } else {
            ConnectionError::ConnectFailed {
                host: host.to_string(),
                port,
                source: e,
            }
        }
    })?;

    stream.set_nodelay(true).ok();
    stream.set_read_timeout(Some(io_timeout)).ok();
    stream.set_write_timeout(Some(io_timeout)).ok();
    Ok(stream)
}

impl RawConnection {
    /// Create new TCP connection
    pub fn connect_tcp(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let stream = open_socket(host, port, connect_timeout, io_timeout)?;
        let writer = BufWriter::with_capacity(
            8192,
            stream
                .try_clone()
                .map_err(|e| ConnectionError::ConnectFailed {
                    host: host.to_string(),
                    port,
                    source: e,
                })?,
        );
        let reader = BufReader::with_capacity(65536, stream);

        Ok(RawConnection::Tcp { writer, reader })
    }

    /// Create new TLS connection
    #[cfg(feature = "native-tls-backend")]
    pub fn connect_tls(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        io_timeout: Duration,
        tls_config: &TlsConfig,
    ) -> Result<Self, ConnectionError> {
        use native_tls::{Certificate, Identity, TlsConnector};

        let mut builder = TlsConnector::builder();

        if tls_config.skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(ref ca_path) = tls_config.ca_cert {
            let ca_data = std::fs::read(ca_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read CA cert: {}", e))
            })?;
            let cert = Certificate::from_pem(&ca_data)
                .map_err(|e| ConnectionError::TlsFailed(format!("Invalid CA cert: {}", e)))?;
            builder.add_root_certificate(cert);
        }

        if let (Some(ref cert_path), Some(ref key_path)) =
            (&tls_config.client_cert, &tls_config.client_key)
        {
            let cert_data = std::fs::read(cert_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read client cert: {}", e))
            })?;
            let key_data = std::fs::read(key_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read client key: {}", e))
            })?;
            let identity = Identity::from_pkcs8(&cert_data, &key_data).map_err(|e| {
                ConnectionError::TlsFailed(format!("Invalid client identity: {}", e))
            })?;
            builder.identity(identity);
        }

        let connector = builder.build().map_err(|e| {
            ConnectionError::TlsFailed(format!("Failed to build TLS connector: {}", e))
        })?;

        let tcp_stream = open_socket(host, port, connect_timeout, io_timeout)?;
        let tls_stream = connector
            .connect(tls_config.server_name(host), tcp_stream)
            .map_err(|e| ConnectionError::TlsFailed(format!("TLS handshake failed: {}", e)))?;

        Ok(RawConnection::NativeTls {
            stream: BufReader::with_capacity(65536, tls_stream),
        })
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            RawConnection::Tcp { writer, .. } => {
                writer.write_all(buf)?;
                writer.flush()
            }
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => {
                stream.get_mut().write_all(buf)?;
                stream.get_mut().flush()
            }
        }
    }

    fn read_response(&mut self) -> io::Result<RespValue> {
        match self {
            RawConnection::Tcp { reader, .. } => RespDecoder::new(reader).decode(),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => RespDecoder::new(stream).decode(),
        }
    }

    /// Send a pre-encoded command and read one reply
    pub fn execute_encoded(&mut self, encoder: &RespEncoder) -> io::Result<RespValue> {
        self.write_all(encoder.as_bytes())?;
        self.read_response()
    }
}

impl ControlPlane for RawConnection {
    fn execute(&mut self, args: &[&str]) -> io::Result<RespValue> {
        let mut encoder = RespEncoder::with_capacity(64);
        encoder.encode_command_str(args);
        self.execute_encoded(&encoder)
    }
}

/// Connection factory for creating connections with common config
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub tls_config: Option<TlsConfig>,
    pub auth_password: Option<String>,
    pub auth_username: Option<String>,
}

impl ConnectionFactory {
    /// Open and authenticate a connection to host:port
    pub fn create(&self, host: &str, port: u16) -> Result<RawConnection, AssessError> {
        debug!("Connecting to {}:{}", host, port);

        let mut conn = match &self.tls_config {
            #[cfg(feature = "native-tls-backend")]
            Some(tls) => {
                RawConnection::connect_tls(host, port, self.connect_timeout, self.io_timeout, tls)?
            }
            #[cfg(not(feature = "native-tls-backend"))]
            Some(_) => {
                return Err(ConnectionError::TlsFailed(
                    "TLS support not compiled in (enable feature native-tls-backend)".to_string(),
                )
                .into());
            }
            None => RawConnection::connect_tcp(host, port, self.connect_timeout, self.io_timeout)?,
        };

        if let Some(ref password) = self.auth_password {
            conn.authenticate(password, self.auth_username.as_deref())
                .map_err(auth_error)?;
        }

        Ok(conn)
    }
}

/// A refused AUTH (`WRONGPASS`, `NOAUTH`, ...) is final; transport errors
/// and transient server replies keep their kind so the caller can retry
fn auth_error(err: AssessError) -> AssessError {
    match err {
        AssessError::Protocol(ProtocolError::Server(msg)) if !is_transient_server_error(&msg) => {
            ConnectionError::AuthFailed(msg).into()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Read};
    use std::net::TcpListener;
    use std::thread;

    // Need a running Valkey server on localhost
    #[test]
    #[ignore]
    fn test_tcp_connection() {
        let factory = ConnectionFactory {
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(5),
            tls_config: None,
            auth_password: None,
            auth_username: None,
        };

        let mut conn = factory.create("127.0.0.1", 6379).expect("Failed to connect");
        assert!(conn.ping().expect("Ping failed"));
    }

    #[test]
    fn test_auth_error_classification() {
        let refused = auth_error(
            ProtocolError::Server("WRONGPASS invalid username-password pair".into()).into(),
        );
        assert!(matches!(refused, AssessError::Connection(ConnectionError::AuthFailed(_))));
        assert!(!refused.is_transient());

        let loading = auth_error(ProtocolError::Server("LOADING dataset".into()).into());
        assert!(matches!(loading, AssessError::Protocol(ProtocolError::Server(_))));
        assert!(loading.is_transient());

        let timed_out =
            auth_error(io::Error::new(io::ErrorKind::TimedOut, "read timed out").into());
        assert!(matches!(timed_out, AssessError::Io(_)));
        assert!(timed_out.is_transient());
    }

    /// Server that answers the first command line with `reply`, or hangs up when `None`
    fn one_shot_server(reply: Option<&'static str>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            // Drain the rest of the AUTH array
            let mut buf = [0u8; 256];
            let _ = reader.read(&mut buf);
            if let Some(reply) = reply {
                let mut stream = stream;
                stream.write_all(reply.as_bytes()).unwrap();
                thread::sleep(Duration::from_millis(200));
            }
        });
        port
    }

    fn factory_with_password() -> ConnectionFactory {
        ConnectionFactory {
            connect_timeout: Duration::from_millis(500),
            io_timeout: Duration::from_millis(500),
            tls_config: None,
            auth_password: Some("secret".to_string()),
            auth_username: None,
        }
    }

    #[test]
    fn test_auth_rejected_is_not_retryable() {
        let port = one_shot_server(Some("-WRONGPASS invalid username-password pair\r\n"));
        let err = factory_with_password()
            .create("127.0.0.1", port)
            .err()
            .expect("AUTH should fail");
        assert!(matches!(err, AssessError::Connection(ConnectionError::AuthFailed(_))));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_auth_hangup_stays_transient() {
        let port = one_shot_server(None);
        let err = factory_with_password()
            .create("127.0.0.1", port)
            .err()
            .expect("AUTH should fail");
        assert!(!matches!(err, AssessError::Connection(ConnectionError::AuthFailed(_))));
        assert!(err.is_transient(), "{:?}", err);
    }

    #[test]
    fn test_connect_refused_is_reported() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = RawConnection::connect_tcp(
            "127.0.0.1",
            port,
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .err()
        .expect("connect should fail");
        assert!(matches!(
            err,
            ConnectionError::ConnectFailed { .. } | ConnectionError::Timeout(_)
        ));
    }
}
