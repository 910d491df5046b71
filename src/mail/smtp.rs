//! Minimal SMTP submission client.
//!
//! Speaks just enough RFC 5321 to hand one message to a relay: greeting,
//! EHLO, optional STARTTLS, MAIL FROM, RCPT TO, DATA and QUIT. No
//! authentication is performed.

use super::{ComposedMessage, MailTransport};
use crate::config::{MailConfig, StartTlsPolicy};
use crate::error::TransportError;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

/// Transport that submits messages to the configured relay.
pub struct SmtpTransport {
    config: MailConfig,
    helo_name: String,
}

impl SmtpTransport {
    /// `helo_name` is the name this host introduces itself with.
    pub fn new(config: MailConfig, helo_name: String) -> Self {
        Self { config, helo_name }
    }
}

impl MailTransport for SmtpTransport {
    async fn send(&mut self, message: &ComposedMessage) -> Result<(), TransportError> {
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let addr = (self.config.relay_host.as_str(), self.config.relay_port);

        info!(
            action = "connect",
            component = "smtp",
            relay = %self.config.relay_host,
            port = self.config.relay_port,
            "Connecting to mail relay"
        );
        let tcp = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(self.config.timeout_seconds))??;

        deliver(tcp, &self.config, &self.helo_name, message).await
    }
}

/// Run one complete submission over an already connected stream.
pub async fn deliver<S>(
    io: S,
    config: &MailConfig,
    helo_name: &str,
    message: &ComposedMessage,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let timeout = Duration::from_secs(config.timeout_seconds);
    let mut session = SmtpSession::open(io, timeout).await?;
    session.ehlo(helo_name).await?;

    let mut session = match config.starttls {
        StartTlsPolicy::Disabled => session,
        _ if session.supports("STARTTLS") => session.starttls(&config.relay_host, helo_name).await?,
        StartTlsPolicy::Required => return Err(TransportError::NotSupported("STARTTLS".into())),
        StartTlsPolicy::Opportunistic => {
            warn!(relay = %config.relay_host, "Relay does not offer STARTTLS, sending in plain text");
            session
        }
    };

    let eight_bit = message.is_8bit() && session.supports("8BITMIME");
    session.mail_from(&message.from, eight_bit).await?;
    session.rcpt_to(&message.to).await?;
    session.data(&message.raw).await?;
    session.quit().await
}

/// SMTP reply: three-digit code and the text of every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    fn into_error(self) -> TransportError {
        TransportError::smtp(self.code, self.lines.join("\n"))
    }
}

/// Parse reply lines (`250-first`, `250 last`) into a [`Reply`].
pub fn parse_reply(lines: &[String]) -> Result<Reply, TransportError> {
    let first = lines
        .first()
        .ok_or_else(|| TransportError::Protocol("empty reply".into()))?;

    let code = first
        .get(..3)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| TransportError::Protocol(format!("invalid reply: {}", first)))?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        match line.len() {
            3 => text.push(String::new()),
            n if n > 3 => text.push(line.get(4..).unwrap_or_default().to_string()),
            _ => return Err(TransportError::Protocol(format!("malformed reply line: {}", line))),
        }
    }

    Ok(Reply { code, lines: text })
}

/// Whether a reply line is the last one of a (possibly multi-line) reply.
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}

enum SmtpStream<S> {
    Plain(BufReader<S>),
    Tls(Box<BufReader<TlsStream<S>>>),
}

struct SmtpSession<S> {
    stream: SmtpStream<S>,
    extensions: Vec<String>,
    timeout: Duration,
}

impl<S> SmtpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn open(io: S, timeout: Duration) -> Result<Self, TransportError> {
        let mut session = Self {
            stream: SmtpStream::Plain(BufReader::new(io)),
            extensions: Vec::new(),
            timeout,
        };

        let greeting = session.read_reply().await?;
        if greeting.code != 220 {
            return Err(greeting.into_error());
        }
        debug!(greeting = ?greeting.lines, "Relay greeting");
        Ok(session)
    }

    fn supports(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }

    async fn ehlo(&mut self, helo_name: &str) -> Result<(), TransportError> {
        let reply = self.command(&format!("EHLO {}", helo_name)).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        // first line is the relay's greeting, the rest are extension keywords
        self.extensions = reply
            .lines
            .iter()
            .skip(1)
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_ascii_uppercase)
            .collect();
        debug!(extensions = ?self.extensions, "Relay capabilities");
        Ok(())
    }

    async fn starttls(mut self, host: &str, helo_name: &str) -> Result<Self, TransportError> {
        let reply = self.command("STARTTLS").await?;
        if reply.code != 220 {
            return Err(reply.into_error());
        }

        let io = match self.stream {
            SmtpStream::Plain(reader) => reader.into_inner(),
            SmtpStream::Tls(_) => return Err(TransportError::Protocol("already using TLS".into())),
        };

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| TransportError::Protocol(format!("invalid relay host name: {}", host)))?;
        let tls = tls_connector()?.connect(server_name, io).await?;
        debug!(relay = host, "TLS established");

        let mut session = Self {
            stream: SmtpStream::Tls(Box::new(BufReader::new(tls))),
            extensions: Vec::new(),
            timeout: self.timeout,
        };
        session.ehlo(helo_name).await?;
        Ok(session)
    }

    async fn mail_from(&mut self, from: &str, eight_bit: bool) -> Result<(), TransportError> {
        let command = if eight_bit {
            format!("MAIL FROM:<{}> BODY=8BITMIME", from)
        } else {
            format!("MAIL FROM:<{}>", from)
        };
        self.expect_success(&command).await
    }

    async fn rcpt_to(&mut self, to: &str) -> Result<(), TransportError> {
        self.expect_success(&format!("RCPT TO:<{}>", to)).await
    }

    /// Send the message body with CRLF line endings and dot stuffing.
    async fn data(&mut self, content: &str) -> Result<(), TransportError> {
        let reply = self.command("DATA").await?;
        if reply.code != 354 {
            return Err(reply.into_error());
        }

        for line in content.lines() {
            if line.starts_with('.') {
                self.write_all(b".").await?;
            }
            self.write_all(line.as_bytes()).await?;
            self.write_all(b"\r\n").await?;
        }
        self.write_all(b".\r\n").await?;

        let reply = self.read_reply().await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(())
    }

    async fn quit(mut self) -> Result<(), TransportError> {
        let reply = self.command("QUIT").await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(())
    }

    async fn expect_success(&mut self, command: &str) -> Result<(), TransportError> {
        let reply = self.command(command).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(())
    }

    async fn command(&mut self, command: &str) -> Result<Reply, TransportError> {
        debug!(command, "SMTP >");
        self.write_all(command.as_bytes()).await?;
        self.write_all(b"\r\n").await?;
        self.read_reply().await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        match &mut self.stream {
            SmtpStream::Plain(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            SmtpStream::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();
        let read = match &mut self.stream {
            SmtpStream::Plain(reader) => {
                tokio::time::timeout(self.timeout, reader.read_line(&mut line)).await
            }
            SmtpStream::Tls(reader) => {
                tokio::time::timeout(self.timeout, reader.read_line(&mut line)).await
            }
        };

        let n = read.map_err(|_| TransportError::Timeout(self.timeout.as_secs()))??;
        if n == 0 {
            return Err(TransportError::Protocol("connection closed by relay".into()));
        }
        Ok(line.trim_end().to_string())
    }

    async fn read_reply(&mut self) -> Result<Reply, TransportError> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                continue;
            }
            debug!(line = %line, "SMTP <");

            let is_last = is_last_reply_line(&line);
            lines.push(line);
            if is_last {
                break;
            }
        }
        parse_reply(&lines)
    }
}

fn tls_connector() -> Result<TlsConnector, TransportError> {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Protocol(format!("TLS setup failed: {}", e)))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::compose_message;
    use chrono::DateTime;
    use tokio_test::io::Builder;

    fn config(starttls: StartTlsPolicy) -> MailConfig {
        MailConfig {
            relay_host: "relay.example.com".to_string(),
            starttls,
            ..MailConfig::default()
        }
    }

    fn message(body: &str) -> ComposedMessage {
        let date = DateTime::parse_from_rfc3339("2019-07-12T16:10:00-03:00").unwrap();
        compose_message(
            "domain-summary@host.example.com",
            "lista@dominio.com.br",
            "Zimbra Domain Summary",
            body,
            date,
        )
    }

    /// Bytes the client is expected to send after DATA.
    fn wire_data(message: &ComposedMessage) -> Vec<u8> {
        let mut data = Vec::new();
        for line in message.raw.lines() {
            if line.starts_with('.') {
                data.push(b'.');
            }
            data.extend_from_slice(line.as_bytes());
            data.extend_from_slice(b"\r\n");
        }
        data.extend_from_slice(b".\r\n");
        data
    }

    #[test]
    fn test_parse_reply() {
        let lines = vec![
            "250-relay.example.com".to_string(),
            "250-PIPELINING".to_string(),
            "250 8BITMIME".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, vec!["relay.example.com", "PIPELINING", "8BITMIME"]);
        assert!(reply.is_success());

        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&["abc hello".to_string()]).is_err());
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(is_last_reply_line("250"));
        assert!(!is_last_reply_line("250-PIPELINING"));
    }

    #[tokio::test]
    async fn test_deliver_plain_session() {
        let message = message("domain | total\n.hidden | 1\n");
        let mock = Builder::new()
            .read(b"220 relay.example.com ESMTP ready\r\n")
            .write(b"EHLO host.example.com\r\n")
            .read(b"250-relay.example.com\r\n250-PIPELINING\r\n250 8BITMIME\r\n")
            .write(b"MAIL FROM:<domain-summary@host.example.com>\r\n")
            .read(b"250 2.1.0 Ok\r\n")
            .write(b"RCPT TO:<lista@dominio.com.br>\r\n")
            .read(b"250 2.1.5 Ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
            .write(&wire_data(&message))
            .read(b"250 2.0.0 Ok: queued\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 2.0.0 Bye\r\n")
            .build();

        deliver(
            mock,
            &config(StartTlsPolicy::Opportunistic),
            "host.example.com",
            &message,
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_wire_data_stuffs_dots() {
        let data = wire_data(&message(".hidden\n"));
        let text = String::from_utf8(data).unwrap();
        assert!(text.contains("\r\n..hidden\r\n"));
        assert!(text.ends_with("\r\n.\r\n"));
    }

    #[tokio::test]
    async fn test_required_starttls_not_offered() {
        let mock = Builder::new()
            .read(b"220 relay.example.com ESMTP\r\n")
            .write(b"EHLO host.example.com\r\n")
            .read(b"250-relay.example.com\r\n250 8BITMIME\r\n")
            .build();

        let err = deliver(
            mock,
            &config(StartTlsPolicy::Required),
            "host.example.com",
            &message("report\n"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_rejected_recipient() {
        let mock = Builder::new()
            .read(b"220 relay.example.com ESMTP\r\n")
            .write(b"EHLO host.example.com\r\n")
            .read(b"250 relay.example.com\r\n")
            .write(b"MAIL FROM:<domain-summary@host.example.com>\r\n")
            .read(b"250 Ok\r\n")
            .write(b"RCPT TO:<lista@dominio.com.br>\r\n")
            .read(b"550 5.1.1 User unknown\r\n")
            .build();

        let err = deliver(
            mock,
            &config(StartTlsPolicy::Disabled),
            "host.example.com",
            &message("report\n"),
        )
        .await
        .unwrap_err();
        match err {
            TransportError::Smtp { code, message } => {
                assert_eq!(code, 550);
                assert_eq!(message, "5.1.1 User unknown");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_relay_refuses_service() {
        let mock = Builder::new()
            .read(b"554 No SMTP service here\r\n")
            .build();

        let err = deliver(
            mock,
            &config(StartTlsPolicy::Disabled),
            "host.example.com",
            &message("report\n"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TransportError::Smtp { code: 554, .. }));
    }
}
