//! Email service for password resets and reservation notifications.
//!
//! Bodies are rendered from the HTML templates below with minijinja; `.html`
//! template names turn on auto-escaping, so user-supplied names are safe to embed.

use chrono::NaiveDate;
use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use minijinja::{Environment, context};
use std::path::Path;
use url::Url;

use crate::{api::models::reservations::ReservationStatus, config::Config, errors::Error};

const LAYOUT: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{% block title %}{% endblock %}</title>
    <style>
        body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
        .container { max-width: 600px; margin: 0 auto; padding: 20px; }
        .footer { margin-top: 30px; font-size: 12px; color: #666; }
    </style>
</head>
<body>
    <div class="container">
        <p>{% if name %}Hello {{ name }},{% else %}Hello,{% endif %}</p>
        {% block content %}{% endblock %}
        <div class="footer">
            <p>This is an automated message from {{ site_name }}, please do not reply to this email.</p>
        </div>
    </div>
</body>
</html>"#;

const PASSWORD_RESET: &str = r#"{% extends "layout.html" %}
{% block title %}Password Reset Request{% endblock %}
{% block content %}
<p>We received a request to reset your password. If you didn't make this request, you can safely ignore this email.</p>
<p><a href="{{ reset_link }}">Reset your password</a></p>
<p>Or copy and paste this link into your browser:</p>
<p>{{ reset_link }}</p>
<p>This link will expire in {{ expires_minutes }} minutes.</p>
{% endblock %}"#;

const RESERVATION_CREATED: &str = r#"{% extends "layout.html" %}
{% block title %}New reservation{% endblock %}
{% block content %}
<p>{{ customer_name }} booked <strong>{{ service_name }}</strong> on {{ date }}{% if time %} at {{ time }}{% endif %}.</p>
{% if notes %}<p>Notes from the customer: {{ notes }}</p>{% endif %}
<p><a href="{{ link }}">Review the reservation</a></p>
{% endblock %}"#;

const RESERVATION_STATUS: &str = r#"{% extends "layout.html" %}
{% block title %}Reservation update{% endblock %}
{% block content %}
<p>Your reservation for <strong>{{ service_name }}</strong> with {{ professional_name }} on {{ date }}{% if time %} at {{ time }}{% endif %} is now <strong>{{ status }}</strong>.</p>
<p><a href="{{ link }}">View your reservations</a></p>
{% endblock %}"#;

/// Reservation details shared by the notification emails
#[derive(Debug, Clone)]
pub struct ReservationEmail {
    pub customer_name: String,
    pub professional_name: String,
    pub service_name: String,
    pub date: NaiveDate,
    /// Already formatted as `HH:mm`
    pub time: Option<String>,
    pub notes: Option<String>,
}

pub struct EmailService {
    transport: EmailTransport,
    templates: Environment<'static>,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
    frontend_url: Url,
    reset_token_minutes: u64,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            crate::config::EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            crate::config::EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        let mut templates = Environment::new();
        for (name, source) in [
            ("layout.html", LAYOUT),
            ("password_reset.html", PASSWORD_RESET),
            ("reservation_created.html", RESERVATION_CREATED),
            ("reservation_status.html", RESERVATION_STATUS),
        ] {
            templates.add_template(name, source).map_err(|e| Error::Internal {
                operation: format!("load email template {name}: {e}"),
            })?;
        }

        Ok(Self {
            transport,
            templates,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reply_to: email_config.reply_to.clone(),
            frontend_url: config.frontend_url.clone(),
            reset_token_minutes: config.auth.native.password_reset_token_duration.as_secs() / 60,
        })
    }

    fn frontend_link(&self, path: &str) -> String {
        self.frontend_url
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{}", self.frontend_url.as_str().trim_end_matches('/'), path))
    }

    fn render(&self, template: &str, ctx: minijinja::Value) -> Result<String, Error> {
        self.templates
            .get_template(template)
            .and_then(|t| t.render(ctx))
            .map_err(|e| Error::Internal {
                operation: format!("render email template {template}: {e}"),
            })
    }

    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        token_id: &uuid::Uuid,
        token: &str,
    ) -> Result<(), Error> {
        let reset_link = self.frontend_link(&format!("/reset-password?id={token_id}&token={token}"));
        let body = self.create_password_reset_body(to_name, &reset_link)?;
        self.send_email(to_email, to_name, "Password Reset Request", &body).await
    }

    /// Tell a professional that a customer booked one of their services
    pub async fn send_reservation_created_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        reservation: &ReservationEmail,
    ) -> Result<(), Error> {
        let body = self.render(
            "reservation_created.html",
            context! {
                name => to_name,
                site_name => &self.from_name,
                customer_name => &reservation.customer_name,
                service_name => &reservation.service_name,
                date => reservation.date.to_string(),
                time => &reservation.time,
                notes => &reservation.notes,
                link => self.frontend_link("/dashboard/reservations"),
            },
        )?;
        let subject = format!("New reservation: {}", reservation.service_name);
        self.send_email(to_email, to_name, &subject, &body).await
    }

    /// Tell a customer that their reservation changed status
    pub async fn send_reservation_status_email(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        reservation: &ReservationEmail,
        status: ReservationStatus,
    ) -> Result<(), Error> {
        let body = self.create_reservation_status_body(to_name, reservation, status)?;
        let subject = format!("Your reservation is {status}");
        self.send_email(to_email, to_name, &subject, &body).await
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let mut builder = Message::builder().from(from).to(to).subject(subject).header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            let reply_to = reply_to.parse::<Mailbox>().map_err(|e| Error::Internal {
                operation: format!("parse reply-to email: {e}"),
            })?;
            builder = builder.reply_to(reply_to);
        }
        let message = builder.body(body.to_string()).map_err(|e| Error::Internal {
            operation: format!("build email message: {e}"),
        })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }

    fn create_password_reset_body(&self, to_name: Option<&str>, reset_link: &str) -> Result<String, Error> {
        self.render(
            "password_reset.html",
            context! {
                name => to_name,
                site_name => &self.from_name,
                reset_link => reset_link,
                expires_minutes => self.reset_token_minutes,
            },
        )
    }

    fn create_reservation_status_body(
        &self,
        to_name: Option<&str>,
        reservation: &ReservationEmail,
        status: ReservationStatus,
    ) -> Result<String, Error> {
        self.render(
            "reservation_status.html",
            context! {
                name => to_name,
                site_name => &self.from_name,
                service_name => &reservation.service_name,
                professional_name => &reservation.professional_name,
                date => reservation.date.to_string(),
                time => &reservation.time,
                status => status.to_string(),
                link => self.frontend_link("/reservations"),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailTransportConfig;
    use crate::test_utils::create_test_config;

    fn reservation() -> ReservationEmail {
        ReservationEmail {
            customer_name: "Ana <script>".to_string(),
            professional_name: "Bob Builder".to_string(),
            service_name: "Kitchen repair".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            time: Some("09:30".to_string()),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_password_reset_email_body() {
        let config = create_test_config();
        let email_service = EmailService::new(&config).unwrap();

        let body = email_service
            .create_password_reset_body(Some("John Doe"), "https://example.com/reset?token=abc123")
            .unwrap();

        assert!(body.contains("Hello John Doe,"));
        // HTML templates are autoescaped, slashes included
        assert!(body.contains(r#"href="https:&#x2f;&#x2f;example.com&#x2f;reset?token=abc123""#));
        assert!(!body.contains("https://example.com"));
        assert!(body.contains("expire in 30 minutes"));

        let body = email_service
            .create_password_reset_body(None, r#"https://example.com/reset?a=1&b="><script>"#)
            .unwrap();
        assert!(body.contains("a=1&amp;b=&quot;&gt;&lt;script&gt;"));
        assert!(!body.contains("<script>"));
    }

    #[tokio::test]
    async fn test_password_reset_email_body_no_name() {
        let config = create_test_config();
        let email_service = EmailService::new(&config).unwrap();

        let body = email_service
            .create_password_reset_body(None, "https://example.com/reset?token=abc123")
            .unwrap();
        assert!(body.contains("Hello,"));
    }

    #[tokio::test]
    async fn test_status_email_body() {
        let config = create_test_config();
        let email_service = EmailService::new(&config).unwrap();

        let body = email_service
            .create_reservation_status_body(Some("Ana"), &reservation(), ReservationStatus::Confirmed)
            .unwrap();
        assert!(body.contains("is now <strong>confirmed</strong>"));
        assert!(body.contains("at 09:30"));
        assert!(body.contains("Bob Builder"));
    }

    #[tokio::test]
    async fn test_emails_are_written_by_file_transport() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        };
        let email_service = EmailService::new(&config).unwrap();

        email_service
            .send_reservation_created_email("pro@example.com", Some("Bob"), &reservation())
            .await
            .unwrap();

        let written: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(written.len(), 1);
        let contents = std::fs::read_to_string(written[0].as_ref().unwrap().path()).unwrap();
        assert!(contents.contains("New reservation: Kitchen repair"));
        // User-supplied names are escaped
        assert!(!contents.contains("<script>"));
    }
}
