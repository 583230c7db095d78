//! IMAP mailbox over implicit TLS.
//!
//! Each tick opens a fresh session: LOGIN, SELECT, `UID SEARCH UNSEEN`, then
//! one `UID FETCH` per message with `BODY.PEEK[]` so fetching never sets
//! `\Seen`. Handled messages are flagged with `UID STORE` before LOGOUT.
//! Message ids are UIDs. Every command round trip is bounded by a timeout.
//!
//! A message that cannot be fetched never blocks the others. Oversized
//! messages are drained and skipped; a timeout or protocol failure leaves the
//! session unusable, so the remaining UIDs are fetched on a new connection.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use herald_common::config::AppConfig;
use herald_common::error::MailboxError;
use herald_common::types::RawMessage;
use herald_parser::mime::parse_message;

use crate::mailbox::Mailbox;

/// Longest response line accepted.
const MAX_LINE_LEN: usize = 1024 * 1024;

/// Largest literal kept (one full message). Larger ones are read and dropped.
const MAX_LITERAL_LEN: usize = 50 * 1024 * 1024;

static FETCH_UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUID (\d+)").expect("uid pattern is valid"));

static INTERNALDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)INTERNALDATE "([^"]+)""#).expect("internaldate pattern is valid")
});

/// Connection settings for the polled mailbox.
#[derive(Clone)]
pub struct ImapSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub mailbox: String,
    pub mark_seen: bool,
    pub timeout: Duration,
}

impl ImapSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            host: config.imap_host.clone(),
            port: config.imap_port,
            user: config.imap_user.clone(),
            password: config.imap_password.clone(),
            mailbox: config.imap_mailbox.clone(),
            mark_seen: config.imap_mark_seen,
            timeout: config.network_timeout(),
        }
    }

    /// `user@host/mailbox`, for logs and notifications.
    pub fn label(&self) -> String {
        format!("{}@{}/{}", self.user, self.host, self.mailbox)
    }
}

/// Size limits applied to server responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_line_len: usize,
    pub max_literal_len: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_line_len: MAX_LINE_LEN,
            max_literal_len: MAX_LITERAL_LEN,
        }
    }
}

/// One server response: its text with literals cut out, plus the literals.
#[derive(Debug, Default)]
struct Response {
    text: String,
    literals: Vec<Vec<u8>>,
    /// Literals over the size limit, drained without being kept.
    dropped_literals: usize,
}

/// Tagged completion status.
#[derive(Debug, PartialEq, Eq)]
enum Completion {
    Ok,
    No(String),
    Bad(String),
}

/// A message as returned by `UID FETCH`.
#[derive(Debug)]
pub struct FetchedMessage {
    pub uid: u32,
    pub internal_date: Option<DateTime<Utc>>,
    pub raw: Vec<u8>,
}

/// Result of fetching a list of UIDs on one session.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub messages: Vec<RawMessage>,
    /// UIDs not attempted because the session broke first.
    pub remaining: Vec<u32>,
}

/// Authenticated-or-not IMAP session over any byte stream.
pub struct ImapSession<S> {
    stream: BufStream<S>,
    next_tag: u32,
    timeout: Duration,
    limits: SessionLimits,
    broken: bool,
}

impl<S> ImapSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream and consume the server greeting.
    pub async fn start(stream: S, timeout: Duration) -> Result<Self, MailboxError> {
        Self::start_with_limits(stream, timeout, SessionLimits::default()).await
    }

    pub async fn start_with_limits(
        stream: S,
        timeout: Duration,
        limits: SessionLimits,
    ) -> Result<Self, MailboxError> {
        let mut session = Self {
            stream: BufStream::new(stream),
            next_tag: 0,
            timeout,
            limits,
            broken: false,
        };

        let greeting = tokio::time::timeout(timeout, session.read_response())
            .await
            .map_err(|_| MailboxError::Timeout(timeout))??;

        let upper = greeting.text.to_ascii_uppercase();
        if upper.starts_with("* OK") || upper.starts_with("* PREAUTH") {
            Ok(session)
        } else if upper.starts_with("* BYE") {
            Err(MailboxError::Connection(format!(
                "server refused connection: {}",
                greeting.text
            )))
        } else {
            Err(MailboxError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.text
            )))
        }
    }

    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), MailboxError> {
        let command = format!("LOGIN {} {}", quote(user)?, quote(password)?);
        match self.command(&command).await? {
            (Completion::Ok, _) => Ok(()),
            (Completion::No(detail) | Completion::Bad(detail), _) => {
                Err(MailboxError::Auth(detail))
            }
        }
    }

    pub async fn select(&mut self, mailbox: &str) -> Result<(), MailboxError> {
        let (completion, _) = self.command(&format!("SELECT {}", quote(mailbox)?)).await?;
        expect_ok("SELECT", completion)
    }

    /// UIDs of unseen messages, ascending.
    pub async fn search_unseen(&mut self) -> Result<Vec<u32>, MailboxError> {
        let (completion, responses) = self.command("UID SEARCH UNSEEN").await?;
        expect_ok("UID SEARCH", completion)?;

        let mut uids: Vec<u32> = responses
            .iter()
            .filter_map(|r| r.text.strip_prefix("* SEARCH"))
            .flat_map(str::split_whitespace)
            .filter_map(|n| n.parse().ok())
            .collect();
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Fetch one message without setting `\Seen`.
    ///
    /// `None` when the server refuses, returns no body, or the body is over
    /// the literal size limit.
    pub async fn fetch(&mut self, uid: u32) -> Result<Option<FetchedMessage>, MailboxError> {
        let (completion, responses) = self
            .command(&format!("UID FETCH {uid} (UID INTERNALDATE BODY.PEEK[])"))
            .await?;

        if let Completion::No(detail) | Completion::Bad(detail) = completion {
            tracing::warn!(uid, %detail, "Server refused fetch");
            return Ok(None);
        }

        if responses.iter().any(|r| r.dropped_literals > 0) {
            tracing::warn!(
                uid,
                limit = self.limits.max_literal_len,
                "Message too large, skipping"
            );
            return Ok(None);
        }

        let fetched = responses.into_iter().find(|r| {
            r.text.contains(" FETCH ")
                && !r.literals.is_empty()
                && response_uid(&r.text).is_none_or(|found| found == uid)
        });

        Ok(fetched.map(|mut r| FetchedMessage {
            uid,
            internal_date: parse_internal_date(&r.text),
            raw: r.literals.swap_remove(0),
        }))
    }

    /// Search, then fetch every unseen message. See [`ImapSession::fetch_messages`].
    pub async fn fetch_unseen_messages(&mut self) -> Result<FetchBatch, MailboxError> {
        let uids = self.search_unseen().await?;
        tracing::debug!(count = uids.len(), "Unseen messages");
        Ok(self.fetch_messages(&uids).await)
    }

    /// Fetch `uids` in order, skipping any message that cannot be fetched.
    ///
    /// A transport or protocol error drops the failing UID and breaks the
    /// session; the UIDs after it are returned in [`FetchBatch::remaining`].
    pub async fn fetch_messages(&mut self, uids: &[u32]) -> FetchBatch {
        let mut batch = FetchBatch {
            messages: Vec::with_capacity(uids.len()),
            remaining: Vec::new(),
        };

        for (idx, &uid) in uids.iter().enumerate() {
            match self.fetch(uid).await {
                Ok(Some(fetched)) => batch.messages.push(parse_message(
                    fetched.uid.to_string(),
                    &fetched.raw,
                    fetched.internal_date,
                )),
                Ok(None) => tracing::warn!(uid, "Skipping message without body"),
                Err(e) => {
                    tracing::warn!(uid, error = %e, "Fetch failed, skipping message");
                    self.broken = true;
                    batch.remaining = uids[idx + 1..].to_vec();
                    break;
                }
            }
        }
        batch
    }

    /// Whether a fetch left the stream in an unknown state.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub async fn mark_seen(&mut self, uids: &[u32]) -> Result<(), MailboxError> {
        if uids.is_empty() {
            return Ok(());
        }
        let set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let (completion, _) = self
            .command(&format!("UID STORE {set} +FLAGS.SILENT (\\Seen)"))
            .await?;
        expect_ok("UID STORE", completion)
    }

    pub async fn logout(&mut self) -> Result<(), MailboxError> {
        let (completion, _) = self.command("LOGOUT").await?;
        let _ = self.stream.shutdown().await;
        expect_ok("LOGOUT", completion)
    }

    async fn command(
        &mut self,
        command: &str,
    ) -> Result<(Completion, Vec<Response>), MailboxError> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.exchange(command))
            .await
            .map_err(|_| MailboxError::Timeout(timeout))?
    }

    async fn exchange(
        &mut self,
        command: &str,
    ) -> Result<(Completion, Vec<Response>), MailboxError> {
        self.next_tag += 1;
        let tag = format!("A{:04}", self.next_tag);

        if !command.starts_with("LOGIN") {
            tracing::trace!(%tag, command, "IMAP command");
        }
        self.stream
            .write_all(format!("{tag} {command}\r\n").as_bytes())
            .await?;
        self.stream.flush().await?;

        let mut untagged = Vec::new();
        loop {
            let response = self.read_response().await?;
            let Some(rest) = response
                .text
                .strip_prefix(tag.as_str())
                .and_then(|r| r.strip_prefix(' '))
            else {
                untagged.push(response);
                continue;
            };

            let (status, detail) = rest.split_once(' ').unwrap_or((rest, ""));
            let completion = match status.to_ascii_uppercase().as_str() {
                "OK" => Completion::Ok,
                "NO" => Completion::No(detail.to_string()),
                "BAD" => Completion::Bad(detail.to_string()),
                other => {
                    return Err(MailboxError::Protocol(format!(
                        "unknown completion status {other}"
                    )));
                }
            };
            return Ok((completion, untagged));
        }
    }

    /// Read one response, following any `{n}` literals to the final line.
    async fn read_response(&mut self) -> Result<Response, MailboxError> {
        let mut response = Response::default();
        loop {
            let line = self.read_line().await?;
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            response.text.push_str(text);

            let Some(len) = literal_length(text) else {
                return Ok(response);
            };
            if len > self.limits.max_literal_len {
                self.drain(len).await?;
                response.dropped_literals += 1;
                continue;
            }
            let mut literal = vec![0u8; len];
            self.stream.read_exact(&mut literal).await?;
            response.literals.push(literal);
        }
    }

    /// Read and discard `len` literal bytes.
    async fn drain(&mut self, len: usize) -> Result<(), MailboxError> {
        let mut limited = (&mut self.stream).take(len as u64);
        let drained = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        if drained < len as u64 {
            return Err(MailboxError::Connection(
                "server closed the connection".to_string(),
            ));
        }
        Ok(())
    }

    /// Read one line, never buffering more than the line limit.
    async fn read_line(&mut self) -> Result<Vec<u8>, MailboxError> {
        let max = self.limits.max_line_len;
        let mut line = Vec::new();
        let read = (&mut self.stream)
            .take(max as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Err(MailboxError::Connection(
                "server closed the connection".to_string(),
            ));
        }
        if line.len() > max {
            return Err(MailboxError::Protocol("response line too long".to_string()));
        }
        Ok(line)
    }
}

fn expect_ok(command: &str, completion: Completion) -> Result<(), MailboxError> {
    match completion {
        Completion::Ok => Ok(()),
        Completion::No(detail) | Completion::Bad(detail) => Err(MailboxError::Protocol(
            format!("{command} failed: {detail}"),
        )),
    }
}

/// Quoted-string form of an argument.
fn quote(value: &str) -> Result<String, MailboxError> {
    if value.contains(['\r', '\n']) {
        return Err(MailboxError::Protocol(
            "argument contains a line break".to_string(),
        ));
    }
    Ok(format!(
        "\"{}\"",
        value.replace('\\', "\\\\").replace('"', "\\\"")
    ))
}

/// Length announced by a trailing `{n}` or `{n+}`.
fn literal_length(line: &str) -> Option<usize> {
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].trim_end_matches('+').parse().ok()
}

fn response_uid(text: &str) -> Option<u32> {
    FETCH_UID.captures(text)?.get(1)?.as_str().parse().ok()
}

/// `INTERNALDATE "01-Jul-2025 10:52:37 +0200"`.
fn parse_internal_date(text: &str) -> Option<DateTime<Utc>> {
    let value = INTERNALDATE.captures(text)?.get(1)?.as_str().trim();
    DateTime::parse_from_str(value, "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn tls_connector() -> TlsConnector {
    let roots = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn connect_tls(host: &str, port: u16) -> Result<TlsStream<TcpStream>, MailboxError> {
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| MailboxError::Connection(format!("{host}:{port}: {e}")))?;

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| MailboxError::Connection(format!("invalid server name {host}: {e}")))?;

    tls_connector()
        .connect(server_name, tcp)
        .await
        .map_err(|e| MailboxError::Connection(format!("TLS handshake with {host} failed: {e}")))
}

/// [`Mailbox`] backed by an IMAP server.
pub struct ImapMailbox {
    settings: ImapSettings,
    session: Option<ImapSession<TlsStream<TcpStream>>>,
}

impl ImapMailbox {
    pub fn new(settings: ImapSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    async fn open(&self) -> Result<ImapSession<TlsStream<TcpStream>>, MailboxError> {
        let timeout = self.settings.timeout;
        let tls = tokio::time::timeout(
            timeout,
            connect_tls(&self.settings.host, self.settings.port),
        )
        .await
        .map_err(|_| MailboxError::Timeout(timeout))??;

        let mut session = ImapSession::start(tls, timeout).await?;
        session
            .login(&self.settings.user, &self.settings.password)
            .await?;
        session.select(&self.settings.mailbox).await?;
        Ok(session)
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_unseen(&mut self) -> Result<Vec<RawMessage>, MailboxError> {
        if let Some(mut stale) = self.session.take() {
            let _ = stale.logout().await;
        }

        let mut session = self.open().await?;
        let mut batch = match session.fetch_unseen_messages().await {
            Ok(batch) => batch,
            Err(e) => {
                let _ = session.logout().await;
                return Err(e);
            }
        };

        let mut messages = std::mem::take(&mut batch.messages);
        loop {
            if !session.is_broken() {
                self.session = Some(session);
                return Ok(messages);
            }
            if batch.remaining.is_empty() {
                return Ok(messages);
            }

            tracing::info!(
                remaining = batch.remaining.len(),
                "Reconnecting to fetch remaining messages"
            );
            session = match self.open().await {
                Ok(fresh) => fresh,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        remaining = batch.remaining.len(),
                        "Reconnect failed, leaving messages for the next poll"
                    );
                    return Ok(messages);
                }
            };
            batch = session.fetch_messages(&batch.remaining).await;
            messages.append(&mut batch.messages);
        }
    }

    async fn mark_seen(&mut self, ids: &[String]) -> Result<(), MailboxError> {
        if !self.settings.mark_seen {
            return Ok(());
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let uids: Vec<u32> = ids.iter().filter_map(|id| id.parse().ok()).collect();
        session.mark_seen(&uids).await
    }

    async fn close(&mut self) -> Result<(), MailboxError> {
        match self.session.take() {
            Some(mut session) => session.logout().await,
            None => Ok(()),
        }
    }
}
