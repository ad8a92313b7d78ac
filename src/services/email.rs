//! Email service for contact notifications

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Mutex;

use crate::config::{MailConfig, SmtpTls};
use crate::models::ContactRequest;

/// Mail errors
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to create SMTP transport: {0}")]
    Transport(String),

    #[error("Failed to send email: {0}")]
    Send(String),
}

/// A plain-text message ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound mail transport
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Mailer relaying through an SMTP server
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        let from = format!("{} <{}>", config.from_name, config.from);
        let from: Mailbox = from.parse().map_err(|e: lettre::address::AddressError| {
            MailError::InvalidAddress {
                address: config.from.clone(),
                reason: e.to_string(),
            }
        })?;

        let host = config.smtp_host.as_str();
        let builder = match config.tls_mode() {
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| MailError::Transport(e.to_string()))?,
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| MailError::Transport(e.to_string()))?,
            SmtpTls::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };
        let mut builder = builder.port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(mail.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for to in &mail.to {
            builder = builder.to(mailbox(to)?);
        }
        if let Some(reply_to) = &mail.reply_to {
            builder = builder.reply_to(mailbox(reply_to)?);
        }
        let message = builder
            .body(mail.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;
        Ok(())
    }
}

/// Mailer that keeps messages in memory
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    failing: Mutex<bool>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(MailError::Send("connection refused".to_string()));
        }
        tracing::info!(to = ?mail.to, subject = %mail.subject, "Mail captured");
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(mail.clone());
        Ok(())
    }
}

/// Notification sent to the office for a new contact request
pub fn contact_notification(request: &ContactRequest, recipients: &[String]) -> OutgoingMail {
    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let body = format!(
        "A new contact request was submitted.\n\n\
         Name: {}\n\
         Email: {}\n\
         Phone: {}\n\
         Company: {}\n\
         Service: {}\n\
         Received: {}\n\n\
         Message:\n{}\n",
        request.name,
        request.email,
        optional(&request.phone),
        optional(&request.company),
        request.service,
        request.created_at.format("%Y-%m-%d %H:%M UTC"),
        request.message,
    );

    OutgoingMail {
        to: recipients.to_vec(),
        reply_to: Some(request.email.clone()),
        subject: format!("New contact request: {} ({})", request.service, request.name),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactStatus, RecordId};
    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Plain-text SMTP server for one connection; yields every line it received
    async fn smtp_server(offer_starttls: bool) -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut received = Vec::new();
            let mut in_data = false;

            let _ = write.write_all(b"220 plain smtp ready ESMTP\r\n").await;
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim_end_matches('\r').to_string();
                received.push(line.clone());

                if in_data {
                    if line == "." {
                        in_data = false;
                        let _ = write.write_all(b"250 queued\r\n").await;
                    }
                    continue;
                }

                let verb = line.split_whitespace().next().unwrap_or("").to_uppercase();
                let reply: &[u8] = match verb.as_str() {
                    "EHLO" if offer_starttls => b"250-stub\r\n250 STARTTLS\r\n",
                    "EHLO" => b"250 stub\r\n",
                    "DATA" => {
                        in_data = true;
                        b"354 end with <CRLF>.<CRLF>\r\n"
                    }
                    "STARTTLS" => {
                        let _ = write.write_all(b"220 go ahead\r\n").await;
                        break;
                    }
                    "QUIT" => {
                        let _ = write.write_all(b"221 bye\r\n").await;
                        break;
                    }
                    _ => b"250 ok\r\n",
                };
                let _ = write.write_all(reply).await;
            }
            received
        });

        (port, handle)
    }

    fn local_config(port: u16) -> MailConfig {
        MailConfig {
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: port,
            from: "site@example.com".to_string(),
            recipients: vec!["office@example.com".to_string()],
            ..MailConfig::default()
        }
    }

    fn request() -> ContactRequest {
        ContactRequest {
            id: RecordId::new("1"),
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            company: Some("Analytical Ltd".to_string()),
            service: "Structural survey".to_string(),
            message: "Cracks above the lintel".to_string(),
            terms_accepted: true,
            status: ContactStatus::Pending,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_contact_notification_contents() {
        let mail = contact_notification(&request(), &["office@example.com".to_string()]);

        assert_eq!(mail.to, vec!["office@example.com"]);
        assert_eq!(mail.reply_to.as_deref(), Some("ada@example.com"));
        assert_eq!(mail.subject, "New contact request: Structural survey (Ada Lovelace)");
        assert!(mail.body.contains("Company: Analytical Ltd"));
        assert!(mail.body.contains("Phone: -"));
        assert!(mail.body.contains("Received: 2024-03-01 09:30 UTC"));
        assert!(mail.body.ends_with("Cracks above the lintel\n"));
    }

    #[test]
    fn test_smtp_mailer_rejects_bad_from_address() {
        let config = MailConfig {
            smtp_host: "smtp.example.com".to_string(),
            from: "not an address".to_string(),
            ..MailConfig::default()
        };
        assert!(matches!(
            SmtpMailer::from_config(&config),
            Err(MailError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_submission_port_starts_in_plain_text() {
        let (port, server) = smtp_server(true).await;
        let config = local_config(port);
        assert_eq!(config.tls_mode(), SmtpTls::Starttls);

        let mailer = SmtpMailer::from_config(&config).unwrap();
        let mail = contact_notification(&request(), &config.recipients);
        // The stub cannot complete the TLS upgrade
        assert!(mailer.send(&mail).await.is_err());

        let received = server.await.unwrap();
        assert!(received[0].starts_with("EHLO"), "{:?}", received);
        assert!(received.iter().any(|l| l == "STARTTLS"), "{:?}", received);
    }

    #[tokio::test]
    async fn test_plain_relay_delivers_message() {
        let (port, server) = smtp_server(false).await;
        let config = MailConfig {
            tls: Some(SmtpTls::Plain),
            ..local_config(port)
        };

        let mailer = SmtpMailer::from_config(&config).unwrap();
        let mail = contact_notification(&request(), &config.recipients);
        mailer.send(&mail).await.unwrap();

        let received = server.await.unwrap();
        assert!(received.iter().any(|l| l.starts_with("MAIL FROM:<site@example.com>")));
        assert!(received.iter().any(|l| l.starts_with("RCPT TO:<office@example.com>")));
        assert!(received.iter().any(|l| l.starts_with("Reply-To: ada@example.com")));
        assert!(received.iter().any(|l| l.starts_with("Subject: New contact request")));
    }

    #[tokio::test]
    async fn test_memory_mailer_captures_and_fails_on_demand() {
        let mailer = MemoryMailer::default();
        let mail = contact_notification(&request(), &["office@example.com".to_string()]);

        mailer.send(&mail).await.unwrap();
        assert_eq!(mailer.sent(), vec![mail.clone()]);

        mailer.set_failing(true);
        assert!(matches!(mailer.send(&mail).await, Err(MailError::Send(_))));
    }
}
