//! Upstream endpoints: address parsing, bootstrap resolution and the
//! per-scheme wire exchange.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_resolver::config::{
    NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts,
};
use hickory_resolver::TokioAsyncResolver;
use log::debug;
use rustls::pki_types::ServerName;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::OnceCell;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::handler::error::HandlerError;

use super::error::ExchangeError;
use super::ForwardArgs;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One upstream entry from the forward config.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamEntry {
    pub addr: String,
    pub ip_addr: Vec<String>,
}

/// Anything the forwarder can exchange a message with. The seam exists so
/// the racing and dedup logic can be exercised without sockets.
#[async_trait]
pub(crate) trait Exchanger: Send + Sync {
    async fn exchange(&self, query: &Message) -> Result<Message, ExchangeError>;

    /// Human-readable endpoint name for log lines.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Udp,
    Tcp,
    Tls,
    Https,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Scheme::Udp | Scheme::Tcp => 53,
            Scheme::Tls => 853,
            Scheme::Https => 443,
        }
    }
}

/// A parsed upstream address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAddr {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// DoH endpoint path; unused by the other schemes.
    pub path: String,
}

impl UpstreamAddr {
    /// Parse `addr`, inferring the protocol from the scheme. A bare
    /// `host` or `host:port` is plain UDP.
    pub fn parse(tag: &str, addr: &str) -> Result<Self, HandlerError> {
        let normalized = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("udp://{addr}")
        };
        let url = Url::parse(&normalized).map_err(|e| {
            HandlerError::invalid_args(tag, format!("invalid upstream addr '{addr}': {e}"))
        })?;

        let scheme = match url.scheme() {
            "udp" => Scheme::Udp,
            "tcp" => Scheme::Tcp,
            "tls" => Scheme::Tls,
            "https" => Scheme::Https,
            "quic" => {
                return Err(HandlerError::invalid_args(
                    tag,
                    format!("quic upstreams are not supported: '{addr}'"),
                ));
            }
            other => {
                return Err(HandlerError::invalid_args(
                    tag,
                    format!("unknown upstream scheme '{other}' in '{addr}'"),
                ));
            }
        };

        let host = url
            .host_str()
            .map(|h| h.trim_matches(['[', ']']).to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                HandlerError::invalid_args(tag, format!("upstream addr '{addr}' has no host"))
            })?;
        let port = url.port().unwrap_or_else(|| scheme.default_port());

        let path = match url.path() {
            "" | "/" => "/dns-query".to_string(),
            p => p.to_string(),
        };

        Ok(Self { scheme, host, port, path })
    }
}

/// A configured upstream endpoint with its transport state.
pub struct Upstream {
    addr: UpstreamAddr,
    display: String,
    pinned: Vec<IpAddr>,
    bootstrap: Vec<SocketAddr>,
    timeout: Duration,
    tls: Option<(TlsConnector, ServerName<'static>)>,
    http: Option<(reqwest::Client, String)>,
    resolved: OnceCell<Vec<IpAddr>>,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("addr", &self.addr)
            .field("display", &self.display)
            .field("pinned", &self.pinned)
            .field("bootstrap", &self.bootstrap)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Upstream {
    /// Build an upstream from one config entry plus the plugin-wide
    /// options. All validation happens here so exchange-time failures are
    /// genuinely environmental.
    pub fn build(tag: &str, entry: &UpstreamEntry, args: &ForwardArgs) -> Result<Self, HandlerError> {
        let addr = UpstreamAddr::parse(tag, &entry.addr)?;

        let mut pinned = Vec::with_capacity(entry.ip_addr.len());
        for raw in &entry.ip_addr {
            let ip: IpAddr = raw.parse().map_err(|_| {
                HandlerError::invalid_args(tag, format!("invalid ip addr '{raw}'"))
            })?;
            pinned.push(ip);
        }

        let mut bootstrap = Vec::with_capacity(args.bootstrap.len());
        for raw in &args.bootstrap {
            bootstrap.push(parse_bootstrap(tag, raw)?);
        }

        let timeout = if args.timeout == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_secs(args.timeout)
        };

        let tls = match addr.scheme {
            Scheme::Tls => {
                let server_name = ServerName::try_from(addr.host.clone()).map_err(|_| {
                    HandlerError::invalid_args(
                        tag,
                        format!("invalid TLS server name '{}'", addr.host),
                    )
                })?;
                let config = tls_client_config(args.insecure_skip_verify);
                Some((TlsConnector::from(Arc::new(config)), server_name))
            }
            _ => None,
        };

        let http = match addr.scheme {
            Scheme::Https => {
                let mut builder = reqwest::Client::builder()
                    .use_rustls_tls()
                    .danger_accept_invalid_certs(args.insecure_skip_verify);
                for ip in &pinned {
                    builder = builder.resolve(&addr.host, SocketAddr::new(*ip, addr.port));
                }
                let client = builder.build().map_err(|e| {
                    HandlerError::invalid_args(tag, format!("failed to build DoH client: {e}"))
                })?;
                let url = format!("https://{}:{}{}", addr.host, addr.port, addr.path);
                Some((client, url))
            }
            _ => None,
        };

        Ok(Self {
            addr,
            display: entry.addr.clone(),
            pinned,
            bootstrap,
            timeout,
            tls,
            http,
            resolved: OnceCell::new(),
        })
    }

    async fn exchange_inner(&self, query: &Message) -> Result<Message, ExchangeError> {
        match self.addr.scheme {
            Scheme::Udp => self.exchange_udp(query).await,
            Scheme::Tcp => self.exchange_tcp(query).await,
            Scheme::Tls => self.exchange_tls(query).await,
            Scheme::Https => self.exchange_https(query).await,
        }
    }

    async fn exchange_udp(&self, query: &Message) -> Result<Message, ExchangeError> {
        let server = self.server_addr().await?;
        let bind: SocketAddr = if server.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(server).await?;
        socket.send(&query.to_vec()?).await?;

        let mut buf = vec![0u8; 65_535];
        loop {
            let n = socket.recv(&mut buf).await?;
            let response = match Message::from_vec(&buf[..n]) {
                Ok(m) => m,
                // Junk datagram; the timeout bounds how long we listen.
                Err(_) => continue,
            };
            if response.id() != query.id() {
                continue;
            }
            if response.truncated() {
                return self.exchange_tcp(query).await;
            }
            return Ok(response);
        }
    }

    async fn exchange_tcp(&self, query: &Message) -> Result<Message, ExchangeError> {
        let server = self.server_addr().await?;
        let stream = TcpStream::connect(server).await?;
        exchange_stream(stream, query).await
    }

    async fn exchange_tls(&self, query: &Message) -> Result<Message, ExchangeError> {
        let (connector, server_name) = self
            .tls
            .as_ref()
            .ok_or_else(|| ExchangeError::ServerName(self.addr.host.clone()))?;
        let server = self.server_addr().await?;
        let tcp = TcpStream::connect(server).await?;
        let stream = connector.connect(server_name.clone(), tcp).await?;
        exchange_stream(stream, query).await
    }

    async fn exchange_https(&self, query: &Message) -> Result<Message, ExchangeError> {
        let (client, url) = self
            .http
            .as_ref()
            .ok_or_else(|| ExchangeError::NoAddress(self.addr.host.clone()))?;

        // RFC 8484: zero the id on the wire, restore the caller's on the
        // way back.
        let mut outbound = query.clone();
        outbound.set_id(0);
        let body = outbound.to_vec()?;

        let response = client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/dns-message")
            .header(reqwest::header::ACCEPT, "application/dns-message")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;

        let mut reply = Message::from_vec(&bytes)?;
        reply.set_id(query.id());
        Ok(reply)
    }

    /// The socket address to exchange with: pinned IPs win, an IP-literal
    /// host needs no lookup, otherwise resolve once through the bootstrap
    /// servers (or system configuration) and cache the answer.
    async fn server_addr(&self) -> Result<SocketAddr, ExchangeError> {
        if let Some(ip) = self.pinned.first() {
            return Ok(SocketAddr::new(*ip, self.addr.port));
        }
        if let Ok(ip) = self.addr.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.addr.port));
        }

        let ips = self
            .resolved
            .get_or_try_init(|| self.resolve_host())
            .await?;
        ips.first()
            .map(|ip| SocketAddr::new(*ip, self.addr.port))
            .ok_or_else(|| ExchangeError::NoAddress(self.addr.host.clone()))
    }

    async fn resolve_host(&self) -> Result<Vec<IpAddr>, ExchangeError> {
        let resolver = if self.bootstrap.is_empty() {
            TokioAsyncResolver::tokio_from_system_conf()?
        } else {
            let mut group = NameServerConfigGroup::new();
            for server in &self.bootstrap {
                group.push(NameServerConfig::new(*server, Protocol::Udp));
            }
            let config = ResolverConfig::from_parts(None, Vec::new(), group);
            TokioAsyncResolver::tokio(config, ResolverOpts::default())
        };

        let lookup = resolver.lookup_ip(self.addr.host.as_str()).await?;
        Ok(lookup.iter().collect())
    }
}

#[async_trait]
impl Exchanger for Upstream {
    async fn exchange(&self, query: &Message) -> Result<Message, ExchangeError> {
        match tokio::time::timeout(self.timeout, self.exchange_inner(query)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("upstream {} timed out after {:?}", self.display, self.timeout);
                Err(ExchangeError::Timeout)
            }
        }
    }

    fn name(&self) -> &str {
        &self.display
    }
}

/// Length-prefixed exchange over any byte stream (TCP and TLS share this).
async fn exchange_stream<S>(mut stream: S, query: &Message) -> Result<Message, ExchangeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let wire = query.to_vec()?;
    let mut framed = Vec::with_capacity(wire.len() + 2);
    framed.extend_from_slice(&(wire.len() as u16).to_be_bytes());
    framed.extend_from_slice(&wire);
    stream.write_all(&framed).await?;
    stream.flush().await?;

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Message::from_vec(&body)?)
}

fn parse_bootstrap(tag: &str, raw: &str) -> Result<SocketAddr, HandlerError> {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| HandlerError::invalid_args(tag, format!("invalid bootstrap server '{raw}'")))
}

fn tls_client_config(insecure_skip_verify: bool) -> rustls::ClientConfig {
    if insecure_skip_verify {
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification::new()))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    }
}

/// Certificate verifier for `insecure_skip_verify`: accepts any chain but
/// still checks handshake signatures.
#[derive(Debug)]
struct NoVerification(rustls::crypto::WebPkiSupportedAlgorithms);

impl NoVerification {
    fn new() -> Self {
        Self(rustls::crypto::ring::default_provider().signature_verification_algorithms)
    }
}

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.supported_schemes()
    }
}
