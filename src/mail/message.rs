//! Plain-text MIME message composition.

use chrono::{DateTime, FixedOffset};
use std::fmt;

/// A fully composed message, ready to print or hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    /// Envelope and header sender.
    pub from: String,
    /// Envelope and header recipient.
    pub to: String,
    pub subject: String,
    /// Message body as given by the caller.
    pub body: String,
    /// Headers and body, `\n` line endings.
    pub raw: String,
}

impl ComposedMessage {
    /// Whether the body needs an 8-bit clean channel.
    pub fn is_8bit(&self) -> bool {
        !self.body.is_ascii()
    }
}

impl fmt::Display for ComposedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Build a single-part `text/plain` message.
///
/// ASCII bodies are sent as `us-ascii`/`7bit`; anything else as
/// `utf-8`/`8bit`.
pub fn compose_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    date: DateTime<FixedOffset>,
) -> ComposedMessage {
    let (charset, encoding) = if body.is_ascii() {
        ("us-ascii", "7bit")
    } else {
        ("utf-8", "8bit")
    };

    let mut raw = String::new();
    raw.push_str(&format!("Content-Type: text/plain; charset=\"{}\"\n", charset));
    raw.push_str("MIME-Version: 1.0\n");
    raw.push_str(&format!("Content-Transfer-Encoding: {}\n", encoding));
    raw.push_str(&format!("Subject: {}\n", subject));
    raw.push_str(&format!("From: {}\n", from));
    raw.push_str(&format!("To: {}\n", to));
    raw.push_str(&format!("Date: {}\n", date.to_rfc2822()));
    raw.push('\n');
    raw.push_str(body);

    ComposedMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2019-07-12T16:10:00-03:00").unwrap()
    }

    #[test]
    fn test_compose_ascii_message() {
        let message = compose_message(
            "domain-summary@mail.example.com",
            "lista@dominio.com.br",
            "Zimbra Domain Summary",
            "domain | total\n",
            date(),
        );

        let expected = concat!(
            "Content-Type: text/plain; charset=\"us-ascii\"\n",
            "MIME-Version: 1.0\n",
            "Content-Transfer-Encoding: 7bit\n",
            "Subject: Zimbra Domain Summary\n",
            "From: domain-summary@mail.example.com\n",
            "To: lista@dominio.com.br\n",
            "Date: Fri, 12 Jul 2019 16:10:00 -0300\n",
            "\n",
            "domain | total\n",
        );
        assert_eq!(message.raw, expected);
        assert_eq!(message.to_string(), expected);
        assert!(!message.is_8bit());
    }

    #[test]
    fn test_compose_utf8_message() {
        let message = compose_message("a@b", "c@d", "s", "domínio.com.br | 1\n", date());
        assert!(message.raw.contains("charset=\"utf-8\""));
        assert!(message.raw.contains("Content-Transfer-Encoding: 8bit"));
        assert!(message.is_8bit());
    }
}
