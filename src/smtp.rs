//! Minimal SMTP submission client used as the outbound transport.
//!
//! One connection is opened per batch and reused for every message. Replies are read in
//! full (multi-line `250-` continuations included) so the reply code of every command,
//! `NOOP` in particular, is available to the caller.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::{SmtpConfig, SmtpSecurity};
use crate::constants::SMTP_CONNECT_TIMEOUT_SECS;
use crate::error::AppError;
use crate::message::OutgoingMessage;
use crate::traits::{Transport, TransportFactory};

pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

#[derive(Debug, Clone)]
pub(crate) struct SmtpCredentials {
    pub(crate) username: String,
    pub(crate) password: String,
}

#[derive(Debug)]
struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    fn text(&self) -> String {
        self.lines.join(" ")
    }
}

/// Opens authenticated SMTP connections.
pub(crate) struct SmtpTransportFactory {
    config: SmtpConfig,
    sender: String,
    credentials: Option<SmtpCredentials>,
    hello_name: String,
}

impl SmtpTransportFactory {
    pub(crate) fn new(config: SmtpConfig, sender: String, credentials: Option<SmtpCredentials>) -> Self {
        Self {
            config,
            sender,
            credentials,
            hello_name: "localhost".to_string(),
        }
    }
}

#[async_trait]
impl TransportFactory for SmtpTransportFactory {
    async fn connect(&self) -> Result<Box<dyn Transport>, AppError> {
        let conn = SmtpConnection::open(
            &self.config,
            &self.hello_name,
            self.credentials.as_ref(),
            &self.sender,
        )
        .await?;
        Ok(Box::new(conn))
    }
}

pub(crate) struct SmtpConnection {
    stream: BufReader<Box<dyn AsyncStream>>,
    sender: String,
    closed: bool,
}

impl SmtpConnection {
    fn new(stream: Box<dyn AsyncStream>, sender: &str) -> Self {
        Self {
            stream: BufReader::new(stream),
            sender: sender.to_string(),
            closed: false,
        }
    }

    /// Connect, negotiate TLS and authenticate. Every failure here is a connect error.
    pub(crate) async fn open(
        config: &SmtpConfig,
        hello_name: &str,
        credentials: Option<&SmtpCredentials>,
        sender: &str,
    ) -> Result<Self, AppError> {
        let host = config.host.as_str();
        info!(host = %host, port = config.port, "Connecting to SMTP server");

        let tcp = tokio::time::timeout(
            Duration::from_secs(SMTP_CONNECT_TIMEOUT_SECS),
            TcpStream::connect((host, config.port)),
        )
        .await
        .map_err(|_| AppError::TransportConnect(format!("timed out connecting to {host}")))?
        .map_err(|e| AppError::TransportConnect(format!("{host}:{}: {e}", config.port)))?;

        let stream: Box<dyn AsyncStream> = match config.security {
            SmtpSecurity::Tls => Box::new(tls_connect(host, Box::new(tcp)).await?),
            SmtpSecurity::Starttls | SmtpSecurity::None => Box::new(tcp),
        };

        let mut conn = Self::new(stream, sender);
        conn.expect_reply(&[220]).await.map_err(as_connect_error)?;
        let capabilities = conn.ehlo(hello_name).await.map_err(as_connect_error)?;

        if config.security == SmtpSecurity::Starttls {
            if !supports(&capabilities, "STARTTLS") {
                return Err(AppError::TransportConnect(format!(
                    "{host} does not offer STARTTLS"
                )));
            }
            conn.command("STARTTLS", &[220]).await.map_err(as_connect_error)?;
            let tls = tls_connect(host, conn.stream.into_inner()).await?;
            conn = Self::new(Box::new(tls), sender);
            conn.ehlo(hello_name).await.map_err(as_connect_error)?;
        }

        if let Some(creds) = credentials {
            conn.authenticate(creds).await?;
        }

        info!(host = %host, "SMTP connection ready");
        Ok(conn)
    }

    async fn ehlo(&mut self, hello_name: &str) -> Result<Vec<String>, AppError> {
        let reply = self.command(&format!("EHLO {hello_name}"), &[250]).await?;
        Ok(reply.lines.into_iter().skip(1).collect())
    }

    async fn authenticate(&mut self, creds: &SmtpCredentials) -> Result<(), AppError> {
        let token = BASE64.encode(format!("\0{}\0{}", creds.username, creds.password));
        debug!("SMTP > AUTH PLAIN ****");
        self.write_line(&format!("AUTH PLAIN {token}")).await.map_err(as_connect_error)?;
        let reply = self.read_reply().await.map_err(as_connect_error)?;
        if reply.code != 235 {
            return Err(AppError::TransportConnect(format!(
                "authentication rejected: {} {}",
                reply.code,
                reply.text()
            )));
        }
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), AppError> {
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))
    }

    async fn read_reply(&mut self) -> Result<Reply, AppError> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = self
                .stream
                .read_line(&mut line)
                .await
                .map_err(|e| AppError::Transport(e.to_string()))?;
            if n == 0 {
                return Err(AppError::Transport("connection closed by server".into()));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            let code = line
                .get(..3)
                .and_then(|c| c.parse::<u16>().ok())
                .ok_or_else(|| AppError::Transport(format!("malformed reply: {line:?}")))?;
            let more = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line.get(4..).unwrap_or_default().to_string());
            if !more {
                debug!(code, "SMTP < {}", lines.join(" | "));
                return Ok(Reply { code, lines });
            }
        }
    }

    async fn expect_reply(&mut self, accepted: &[u16]) -> Result<Reply, AppError> {
        let reply = self.read_reply().await?;
        if accepted.contains(&reply.code) {
            Ok(reply)
        } else {
            Err(AppError::Transport(format!("{} {}", reply.code, reply.text())))
        }
    }

    async fn command(&mut self, line: &str, accepted: &[u16]) -> Result<Reply, AppError> {
        debug!("SMTP > {line}");
        self.write_line(line).await?;
        self.expect_reply(accepted).await
    }

    async fn transaction(&mut self, message: &OutgoingMessage) -> Result<(), AppError> {
        // Render first so a bad header never reaches the server.
        let data = format_message(&self.sender, message, Utc::now())?;

        self.command(&format!("MAIL FROM:<{}>", self.sender), &[250]).await?;
        self.command(&format!("RCPT TO:<{}>", message.to), &[250, 251]).await?;
        self.command("DATA", &[354]).await?;

        self.stream
            .write_all(data.as_bytes())
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;
        self.write_line("\r\n.").await?;
        self.expect_reply(&[250]).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpConnection {
    async fn send(&mut self, message: &OutgoingMessage) -> Result<(), AppError> {
        let result = self.transaction(message).await;
        if result.is_err() {
            // Leave the session ready for the next attempt.
            if let Err(e) = self.command("RSET", &[250]).await {
                debug!("RSET after failed send: {e}");
            }
        }
        result
    }

    async fn probe_health(&mut self) -> Result<u16, AppError> {
        debug!("SMTP > NOOP");
        self.write_line("NOOP").await?;
        Ok(self.read_reply().await?.code)
    }

    async fn close(&mut self) -> Result<(), AppError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let quit = self.command("QUIT", &[221]).await;
        if let Err(e) = self.stream.get_mut().shutdown().await {
            warn!("SMTP shutdown: {e}");
        }
        quit.map(|_| ())
    }
}

fn as_connect_error(e: AppError) -> AppError {
    match e {
        AppError::Transport(msg) => AppError::TransportConnect(msg),
        other => other,
    }
}

fn supports(capabilities: &[String], keyword: &str) -> bool {
    capabilities.iter().any(|c| {
        c.split_whitespace()
            .next()
            .is_some_and(|k| k.eq_ignore_ascii_case(keyword))
    })
}

async fn tls_connect(
    host: &str,
    stream: Box<dyn AsyncStream>,
) -> Result<tokio_rustls::client::TlsStream<Box<dyn AsyncStream>>, AppError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| AppError::TransportConnect(format!("invalid server name {host}: {e}")))?;
    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| AppError::TransportConnect(format!("TLS handshake with {host} failed: {e}")))
}

/// Render headers and body for DATA: CRLF line endings, leading dots doubled.
/// The terminating `.` line is not included.
///
/// Addresses and the subject must be single-line; anything else is refused.
pub(crate) fn format_message(
    sender: &str,
    message: &OutgoingMessage,
    date: DateTime<Utc>,
) -> Result<String, AppError> {
    single_line("sender", sender)?;
    single_line("recipient", &message.to)?;
    if let Some(subject) = &message.subject {
        single_line("subject", subject)?;
    }

    let mut out = String::new();
    out.push_str(&format!("From: {sender}\r\n"));
    out.push_str(&format!("To: {}\r\n", message.to));
    if let Some(subject) = &message.subject {
        out.push_str(&format!("Subject: {}\r\n", encode_header(subject)));
    }
    out.push_str(&format!("Date: {}\r\n", date.to_rfc2822()));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");

    let body = message.body.replace("\r\n", "\n");
    let lines: Vec<String> = body
        .split('\n')
        .map(|line| {
            if line.starts_with('.') {
                format!(".{line}")
            } else {
                line.to_string()
            }
        })
        .collect();
    out.push_str(&lines.join("\r\n"));
    Ok(out)
}

fn single_line(field: &str, value: &str) -> Result<(), AppError> {
    if value.contains(['\r', '\n']) {
        return Err(AppError::Transport(format!("line break in {field} {value:?}")));
    }
    Ok(())
}

fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", BASE64.encode(value))
    }
}
