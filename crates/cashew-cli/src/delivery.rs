//! Link delivery: stdout, a text file or SMTP email

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use cashew_core::{CashewLink, EmailConfig};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Port on which the server expects TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

pub enum Delivery {
    Print,
    File(PathBuf),
    Email(EmailConfig),
}

impl Delivery {
    pub async fn deliver(&self, links: &[CashewLink]) -> Result<()> {
        match self {
            Delivery::Print => {
                print!("{}", links_text(links));
                Ok(())
            }
            Delivery::File(path) => write_links_file(path, links),
            Delivery::Email(config) => send_email(config, links).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Delivery::Print => "stdout".to_string(),
            Delivery::File(path) => path.display().to_string(),
            Delivery::Email(config) => config.recipient.clone(),
        }
    }
}

/// `Link1: <url>` blocks separated by blank lines
pub fn links_text(links: &[CashewLink]) -> String {
    links
        .iter()
        .enumerate()
        .map(|(i, link)| format!("Link{}: {}\n\n", i + 1, link.url))
        .collect()
}

pub fn links_html(links: &[CashewLink]) -> String {
    let mut html = String::from("<p>Hello,</p>\n<p>Here are your Cashew app links:</p>\n<p>\n");
    for (i, link) in links.iter().enumerate() {
        html.push_str(&format!(
            "<a href=\"{}\">Link{}</a> ({}, {} transactions)<br>\n",
            link.url,
            i + 1,
            html_escape(&link.account),
            link.transactions.len()
        ));
    }
    html.push_str("</p>\n<p>Click the links to add the transactions in the Cashew app.</p>\n");
    html
}

pub fn write_links_file(path: &Path, links: &[CashewLink]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, links_text(links))
        .with_context(|| format!("Failed to write links to {}", path.display()))?;
    info!("Saved {} links to {}", links.len(), path.display());
    Ok(())
}

pub fn build_message(config: &EmailConfig, links: &[CashewLink]) -> Result<Message> {
    let from: Mailbox = config
        .sender
        .parse()
        .with_context(|| format!("Invalid sender address: {}", config.sender))?;
    let to: Mailbox = config
        .recipient
        .parse()
        .with_context(|| format!("Invalid recipient address: {}", config.recipient))?;

    let plain = format!(
        "Hello,\n\nHere are your Cashew app links:\n\n{}Click the links to add the transactions in the Cashew app.\n",
        links_text(links)
    );

    Message::builder()
        .from(from)
        .to(to)
        .subject(&config.subject)
        .multipart(MultiPart::alternative_plain_html(plain, links_html(links)))
        .context("Failed to build email")
}

pub async fn send_email(config: &EmailConfig, links: &[CashewLink]) -> Result<()> {
    let message = build_message(config, links)?;
    let smtp = &config.smtp;

    let builder = if smtp.port == IMPLICIT_TLS_PORT {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.server)
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.server)
    }
    .with_context(|| format!("Invalid SMTP server: {}", smtp.server))?;

    let mailer = builder
        .port(smtp.port)
        .credentials(Credentials::new(smtp.user.clone(), smtp.password.clone()))
        .timeout(Some(SMTP_TIMEOUT))
        .build();

    info!(
        "Sending {} links to {} via {}:{}",
        links.len(),
        config.recipient,
        smtp.server,
        smtp.port
    );
    mailer
        .send(message)
        .await
        .with_context(|| format!("Failed to send email via {}", smtp.server))?;
    info!("Email sent");
    Ok(())
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
