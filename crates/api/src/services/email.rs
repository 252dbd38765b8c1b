//! Order lifecycle e-mails.
//!
//! Three notifications are rendered from Askama templates (HTML with a
//! plain-text alternative) and delivered over SMTP with lettre. When SMTP is
//! not configured the [`Mailer`] logs a warning and reports
//! [`SendOutcome::Skipped`] instead of failing.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use dermosul_core::{Cents, Email};

use crate::config::SmtpConfig;
use crate::models::OrderDetails;

/// Signature printed at the bottom of every e-mail.
pub const FOOTER: &str = "Equipe Dermosul • CNPJ 60.426.816/0001-03";

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Which lifecycle e-mail to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    PaymentApproved,
    Pending,
    Shipped,
}

impl Notification {
    /// Width of the progress bar, in percent.
    const fn progress(self) -> u8 {
        match self {
            Self::PaymentApproved | Self::Pending => 66,
            Self::Shipped => 90,
        }
    }
}

/// Data for one order e-mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderEmail {
    pub to: Email,
    pub name: String,
    pub order_id: String,
    pub item: String,
    pub total: Cents,
    pub installments: i32,
    pub link: Option<String>,
    pub tracking: Option<String>,
}

impl OrderEmail {
    /// Build the e-mail data for an order. `None` when the order has no
    /// customer to write to.
    #[must_use]
    pub fn from_details(details: &OrderDetails, tracking_base: Option<&str>) -> Option<Self> {
        let customer = details.customer.as_ref()?;
        let order_id = details.order.id.to_string();

        Some(Self {
            to: customer.email.clone(),
            name: customer.display_name(),
            link: tracking_base.map(|base| tracking_link(base, &order_id)),
            item: details.headline_item(),
            total: details.order.total,
            installments: details.payment.as_ref().map_or(1, |p| p.installments),
            tracking: details
                .order
                .tracking_code
                .clone()
                .filter(|code| !code.trim().is_empty()),
            order_id,
        })
    }
}

/// Link to the tracking page of an order.
#[must_use]
pub fn tracking_link(base: &str, order_id: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(order_id)
    )
}

/// `3x Sem juros` or `à vista`.
#[must_use]
pub fn payment_terms(installments: i32) -> String {
    if installments > 1 {
        format!("{installments}x Sem juros")
    } else {
        "à vista".to_string()
    }
}

/// Template context shared by every e-mail.
struct EmailView<'a> {
    name: &'a str,
    order_id: &'a str,
    item: &'a str,
    total: String,
    terms: String,
    link: Option<&'a str>,
    tracking: Option<&'a str>,
    progress: u8,
    footer: &'static str,
}

#[derive(Template)]
#[template(path = "email/approved.html")]
struct ApprovedHtml<'a> {
    v: &'a EmailView<'a>,
}

#[derive(Template)]
#[template(path = "email/approved.txt")]
struct ApprovedText<'a> {
    v: &'a EmailView<'a>,
}

#[derive(Template)]
#[template(path = "email/pending.html")]
struct PendingHtml<'a> {
    v: &'a EmailView<'a>,
}

#[derive(Template)]
#[template(path = "email/pending.txt")]
struct PendingText<'a> {
    v: &'a EmailView<'a>,
}

#[derive(Template)]
#[template(path = "email/shipped.html")]
struct ShippedHtml<'a> {
    v: &'a EmailView<'a>,
}

#[derive(Template)]
#[template(path = "email/shipped.txt")]
struct ShippedText<'a> {
    v: &'a EmailView<'a>,
}

/// A rendered e-mail, ready to send.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Render the subject and both bodies of a notification.
///
/// # Errors
///
/// Returns `EmailError::Template` if a template fails to render.
pub fn render(kind: Notification, email: &OrderEmail) -> Result<Rendered, EmailError> {
    let view = EmailView {
        name: &email.name,
        order_id: &email.order_id,
        item: &email.item,
        total: email.total.format_brl(),
        terms: payment_terms(email.installments),
        link: email.link.as_deref(),
        tracking: email.tracking.as_deref(),
        progress: kind.progress(),
        footer: FOOTER,
    };
    let v = &view;

    let rendered = match kind {
        Notification::PaymentApproved => Rendered {
            subject: format!("Pagamento aprovado - Pedido #{}", email.order_id),
            html: ApprovedHtml { v }.render()?,
            text: ApprovedText { v }.render()?,
        },
        Notification::Pending => Rendered {
            subject: format!("Estamos preparando seu pedido #{}", email.order_id),
            html: PendingHtml { v }.render()?,
            text: PendingText { v }.render()?,
        },
        Notification::Shipped => Rendered {
            subject: format!("Pedido #{} enviado", email.order_id),
            html: ShippedHtml { v }.render()?,
            text: ShippedText { v }.render()?,
        },
    };
    Ok(rendered)
}

/// Result of a send attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// SMTP is not configured.
    Skipped,
}

/// Delivers order notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Render and send one notification.
    async fn notify(
        &self,
        kind: Notification,
        email: &OrderEmail,
    ) -> Result<SendOutcome, EmailError>;
}

struct Transport {
    smtp: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Option<Mailbox>,
}

/// SMTP notifier.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<std::sync::Arc<Transport>>,
}

impl Mailer {
    /// Build the mailer. `None` configuration yields a mailer that skips
    /// every send.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Smtp` if the relay cannot be configured and
    /// `EmailError::InvalidAddress` for a malformed sender or reply-to.
    pub fn new(config: Option<&SmtpConfig>) -> Result<Self, EmailError> {
        let Some(config) = config else {
            return Ok(Self::disabled());
        };

        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let builder = if config.implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let smtp = builder.port(config.port).credentials(credentials).build();

        let from = parse_mailbox(&config.from)?;
        let reply_to = config.reply_to.as_deref().map(parse_mailbox).transpose()?;

        Ok(Self {
            transport: Some(std::sync::Arc::new(Transport {
                smtp,
                from,
                reply_to,
            })),
        })
    }

    /// A mailer that never sends.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { transport: None }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, EmailError> {
    raw.parse()
        .map_err(|_| EmailError::InvalidAddress(raw.to_string()))
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Notifier for Mailer {
    #[tracing::instrument(skip(self, email), fields(order_id = %email.order_id))]
    async fn notify(
        &self,
        kind: Notification,
        email: &OrderEmail,
    ) -> Result<SendOutcome, EmailError> {
        let Some(transport) = &self.transport else {
            tracing::warn!(to = %email.to, "SMTP not configured, skipping e-mail");
            return Ok(SendOutcome::Skipped);
        };

        let rendered = render(kind, email)?;

        let mut builder = Message::builder()
            .from(transport.from.clone())
            .to(parse_mailbox(email.to.as_str())?)
            .subject(&rendered.subject);
        if let Some(reply_to) = &transport.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }

        let message = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(rendered.text),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(rendered.html),
                ),
        )?;

        transport.smtp.send(message).await?;

        tracing::info!(to = %email.to, subject = %rendered.subject, "Email sent");
        Ok(SendOutcome::Sent)
    }
}
