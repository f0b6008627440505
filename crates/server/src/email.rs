//! Transactional email: the order-history message and the HTTP mailer that
//! delivers it.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use storefront_core::domain::download::DownloadVerification;
use storefront_core::domain::order::OrderHistoryEntry;
use storefront_core::format::{format_cents, format_date};
use storefront_core::notify::{EmailError, Mailer, OutboundEmail};
use tera::{Context, Tera};
use tracing::{error, info};

pub const ORDER_HISTORY_TEMPLATE: &str = "email/order_history.html";
pub const ORDER_HISTORY_SUBJECT: &str = "Order History";

#[derive(Debug, Serialize)]
struct OrderHistoryLine {
    order_id: String,
    product_name: String,
    product_description: String,
    image_url: String,
    price_paid: String,
    purchased_on: String,
    download_url: String,
}

/// An order paired with the download grant minted for this email.
pub struct OrderDownload<'a> {
    pub order: &'a OrderHistoryEntry,
    pub verification: &'a DownloadVerification,
}

pub fn download_url(public_url: &str, verification: &DownloadVerification) -> String {
    format!("{public_url}/products/download/{}", verification.id.0)
}

fn absolute_url(public_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{public_url}/{}", path.trim_start_matches('/'))
    }
}

pub fn render_order_history(
    templates: &Tera,
    public_url: &str,
    link_ttl_hours: i64,
    downloads: &[OrderDownload<'_>],
) -> Result<String, EmailError> {
    let orders: Vec<OrderHistoryLine> = downloads
        .iter()
        .map(|entry| OrderHistoryLine {
            order_id: entry.order.order_id.0.clone(),
            product_name: entry.order.product_name.clone(),
            product_description: entry.order.product_description.clone(),
            image_url: absolute_url(public_url, &entry.order.product_image_path),
            price_paid: format_cents(entry.order.price_paid_in_cents),
            purchased_on: format_date(entry.order.created_at.date_naive()),
            download_url: download_url(public_url, entry.verification),
        })
        .collect();

    let mut context = Context::new();
    context.insert("orders", &orders);
    context.insert("link_ttl_hours", &link_ttl_hours);

    templates
        .render(ORDER_HISTORY_TEMPLATE, &context)
        .map_err(|error| EmailError::Render(error.to_string()))
}

/// Mailer backed by a Resend-compatible `POST /emails` API.
pub struct HttpMailer {
    client: Client,
    api_base_url: String,
    api_key: SecretString,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

impl HttpMailer {
    pub fn new(client: Client, api_base_url: &str, api_key: SecretString) -> Self {
        Self { client, api_base_url: api_base_url.trim_end_matches('/').to_string(), api_key }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<String, EmailError> {
        let response = self
            .client
            .post(format!("{}/emails", self.api_base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&SendEmailRequest {
                from: &email.from,
                to: [email.to.as_str()],
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await
            .map_err(|error| {
                error!(
                    event_name = "email.send.transport_error",
                    error = %error,
                    "email request failed"
                );
                EmailError::Transport(error.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected(format!("email provider returned {status}: {body}")));
        }

        let sent: SendEmailResponse = response
            .json()
            .await
            .map_err(|error| {
                EmailError::Transport(format!("failed to decode email response: {error}"))
            })?;
        info!(
            event_name = "email.send.accepted",
            message_id = %sent.id,
            "email accepted by provider"
        );
        Ok(sent.id)
    }
}

pub fn order_history_email(sender: &str, to: &str, html: String) -> OutboundEmail {
    OutboundEmail {
        from: sender.to_string(),
        to: to.to_string(),
        subject: ORDER_HISTORY_SUBJECT.to_string(),
        html,
    }
}
