//! Outgoing mail.

use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;

use crate::error::{RelayError, RelayResult};

static ADDRESS_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("ADDRESS_REGEX pattern is valid")
});

/// A bare `local@domain.tld` address, with no display name or whitespace.
pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_REGEX.is_match(address)
}

/// A plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Extra headers such as `List-Unsubscribe`.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Mail {
    /// Render as an RFC 5322 message with CRLF line endings.
    ///
    /// Header values must be single-line; a CR or LF would start a new header.
    pub fn to_rfc5322(&self, message_id: &str) -> RelayResult<String> {
        let mut out = String::new();
        let mut header = |name: &str, value: &str| -> RelayResult<()> {
            if value.chars().any(char::is_control) {
                return Err(RelayError::Mail(format!(
                    "{}: control character in {name} header",
                    self.to.escape_debug()
                )));
            }
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
            Ok(())
        };
        header("From", &self.from)?;
        header("To", &self.to)?;
        header("Subject", &encode_subject(&self.subject))?;
        header("Date", &Utc::now().to_rfc2822())?;
        header("Message-ID", &format!("<{message_id}>"))?;
        for (name, value) in &self.headers {
            header(name, value)?;
        }
        header("MIME-Version", "1.0")?;
        header("Content-Type", "text/plain; charset=utf-8")?;
        header("Content-Transfer-Encoding", "8bit")?;

        out.push_str("\r\n");
        out.push_str(&self.body.replace("\r\n", "\n").replace('\n', "\r\n"));
        Ok(out)
    }
}

/// Longest UTF-8 chunk per encoded word, keeping each word within 75 characters.
const ENCODED_WORD_BYTES: usize = 45;

/// RFC 2047 `B` encoding for subjects that aren't plain ASCII.
///
/// Words are separated by a space so the result stays a single header line.
fn encode_subject(subject: &str) -> String {
    if subject.is_ascii() {
        return subject.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in subject.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }
    words.join(" ")
}

fn encoded_word(text: &str) -> String {
    format!("=?utf-8?B?{}?=", STANDARD.encode(text))
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> RelayResult<()>;
}

/// Drops each message as an `.eml` file into a directory for the local MTA.
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: PathBuf) -> Self {
        OutboxMailer { dir }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, mail: &Mail) -> RelayResult<()> {
        let id = uuid::Uuid::new_v4();
        let message = mail.to_rfc5322(&format!("{id}@ical-relay"))?;

        let mail_error = |e: std::io::Error| RelayError::Mail(format!("{}: {}", mail.to, e));
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(mail_error)?;

        // Write under a temporary name so a spool reader never sees half a message.
        let temp = self.dir.join(format!(".{id}.tmp"));
        let path = self.dir.join(format!("{id}.eml"));
        tokio::fs::write(&temp, message).await.map_err(mail_error)?;
        tokio::fs::rename(&temp, &path).await.map_err(mail_error)?;

        tracing::info!(to = %mail.to, path = %path.display(), "queued mail");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mail() -> Mail {
        Mail {
            from: "relay@example.com".into(),
            to: "a@example.com".into(),
            subject: "Calendar Notification for team".into(),
            headers: vec![("List-Unsubscribe".into(), "https://x/unsub".into())],
            body: "Added:\n\nStandup\n".into(),
        }
    }

    #[test]
    fn test_rfc5322_layout() {
        let text = mail().to_rfc5322("id@ical-relay").unwrap();

        assert!(text.starts_with("From: relay@example.com\r\nTo: a@example.com\r\n"));
        assert!(text.contains("Subject: Calendar Notification for team\r\n"));
        assert!(text.contains("List-Unsubscribe: https://x/unsub\r\n"));
        assert!(text.contains("Message-ID: <id@ical-relay>\r\n"));
        assert!(text.ends_with("\r\n\r\nAdded:\r\n\r\nStandup\r\n"));
    }

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("a@example.com"));
        assert!(is_valid_address("first.last+tag@mail.example.org"));
        assert!(!is_valid_address("example.com"));
        assert!(!is_valid_address("@example.com"));
        assert!(!is_valid_address("a@b@c.com"));
        assert!(!is_valid_address("a b@example.com"));
        assert!(!is_valid_address("a@example.com\r\nBcc:victim"));
        assert!(!is_valid_address("a@example.com\n"));
        assert!(!is_valid_address("Jane <a@example.com>"));
    }

    #[test]
    fn test_header_values_cannot_carry_line_breaks() {
        let mut injected = mail();
        injected.to = "a@example.com\r\nBcc: victim@example.com".into();
        assert!(matches!(injected.to_rfc5322("id"), Err(RelayError::Mail(_))));

        let mut injected = mail();
        injected.subject = "Hello\nBcc: victim@example.com".into();
        assert!(matches!(injected.to_rfc5322("id"), Err(RelayError::Mail(_))));

        let mut injected = mail();
        injected.headers = vec![("List-Unsubscribe".into(), "https://x\r\nX-Evil: 1".into())];
        assert!(matches!(injected.to_rfc5322("id"), Err(RelayError::Mail(_))));
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let mut message = mail();
        message.subject = "Calendar Notification for Küche".into();
        let text = message.to_rfc5322("id").unwrap();

        let expected = format!(
            "Subject: =?utf-8?B?{}?=\r\n",
            STANDARD.encode("Calendar Notification for Küche")
        );
        assert!(text.contains(&expected));
        let headers = text.split("\r\n\r\n").next().unwrap();
        assert!(headers.is_ascii());
    }

    #[test]
    fn test_long_non_ascii_subject_is_split_into_words() {
        let subject = "Ärger ".repeat(20);
        let encoded = encode_subject(&subject);

        let words: Vec<&str> = encoded.split(' ').collect();
        assert!(words.len() > 1);
        assert!(words.iter().all(|w| w.len() <= 75 && w.starts_with("=?utf-8?B?")));
        let decoded: Vec<u8> = words
            .iter()
            .flat_map(|w| {
                let payload = w.trim_start_matches("=?utf-8?B?").trim_end_matches("?=");
                STANDARD.decode(payload).unwrap()
            })
            .collect();
        assert_eq!(String::from_utf8(decoded).unwrap(), subject);
    }

    #[tokio::test]
    async fn test_outbox_refuses_injected_recipient() {
        let dir = TempDir::new().unwrap();
        let mailer = OutboxMailer::new(dir.path().join("outbox"));
        let mut injected = mail();
        injected.to = "a@example.com\r\nBcc: victim@example.com".into();

        assert!(mailer.send(&injected).await.is_err());
        let written = std::fs::read_dir(dir.path().join("outbox"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_outbox_writes_one_file_per_message() {
        let dir = TempDir::new().unwrap();
        let mailer = OutboxMailer::new(dir.path().join("outbox"));

        mailer.send(&mail()).await.unwrap();
        mailer.send(&mail()).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(dir.path().join("outbox"))
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().is_some_and(|e| e == "eml")));
    }
}
