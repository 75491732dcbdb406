//! Notification seams: who to notify and how to deliver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use slotwise_booking::{Appointment, AppointmentStatus, TenantRegistry};
use slotwise_core::{
    config::{NotificationProvider, NotificationsConfig},
    reminder::NotificationKind,
    AppointmentId, TenantId,
};
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError};

/// A resolved delivery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub address: String,
}

#[async_trait]
pub trait RecipientResolver: Send + Sync {
    /// `Ok(None)` when the subject has no usable address; the caller skips
    /// the notification without recording anything.
    async fn resolve_contact(
        &self,
        tenant: &TenantId,
        appointment: &Appointment,
    ) -> Result<Option<Recipient>>;
}

/// What the provider said about a send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub accepted: bool,
    /// Provider message id, when it returned one.
    pub reference: Option<String>,
}

impl SendReceipt {
    pub fn is_confirmed(&self) -> bool {
        self.accepted || self.reference.is_some()
    }
}

/// Template data for one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub tenant: TenantId,
    pub appointment_id: AppointmentId,
    pub recipient_name: String,
    pub start: DateTime<Utc>,
    /// Start rendered in the tenant's zone, e.g. `2026-10-19 09:00 (Europe/Madrid)`.
    pub local_start: String,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    /// Set for reminders only.
    pub offset_minutes: Option<i64>,
}

impl NotificationData {
    pub fn new(
        appointment: &Appointment,
        recipient: &Recipient,
        tz: Tz,
        offset_minutes: Option<i64>,
    ) -> Self {
        let local = appointment.start.with_timezone(&tz);
        Self {
            tenant: appointment.tenant_id.clone(),
            appointment_id: appointment.id.clone(),
            recipient_name: recipient.name.clone(),
            start: appointment.start,
            local_start: format!("{} ({})", local.format("%Y-%m-%d %H:%M"), tz.name()),
            duration_minutes: appointment.duration_minutes,
            status: appointment.status,
            offset_minutes,
        }
    }
}

/// Plain-text body. Rich templates are rendered by the email provider.
pub fn render_text(kind: NotificationKind, data: &NotificationData) -> String {
    let greeting = if data.recipient_name.is_empty() {
        "Hello,".to_string()
    } else {
        format!("Hello {},", data.recipient_name)
    };
    let line = match kind {
        NotificationKind::Created => "your appointment has been booked",
        NotificationKind::Updated => "your appointment has been updated",
        NotificationKind::Cancelled => "your appointment has been cancelled",
        NotificationKind::Reactivated => "your appointment is active again",
        NotificationKind::Completed => "thank you for visiting, your appointment is complete",
        NotificationKind::Deleted => "your appointment has been removed",
        NotificationKind::Reminder => "this is a reminder of your upcoming appointment",
    };
    format!(
        "{greeting}\n\n{line}: {} ({} min).\n\nReference: {}\n",
        data.local_start, data.duration_minutes, data.appointment_id
    )
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        kind: NotificationKind,
        to: &Recipient,
        data: &NotificationData,
    ) -> Result<SendReceipt>;
}

/// Dry-run sender: logs and reports acceptance.
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        kind: NotificationKind,
        to: &Recipient,
        data: &NotificationData,
    ) -> Result<SendReceipt> {
        info!(
            %kind,
            to = %to.address,
            tenant = %data.tenant,
            appointment_id = %data.appointment_id,
            offset = ?data.offset_minutes,
            "notification (dry run)"
        );
        Ok(SendReceipt {
            accepted: true,
            reference: None,
        })
    }
}

/// Sends email through an HTTP relay that takes a Resend-style JSON body
/// and answers with `{"id": "..."}`. Only a returned id counts as delivered.
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct EmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: String,
}

#[derive(Deserialize)]
struct EmailResponse {
    id: Option<String>,
}

impl HttpEmailSender {
    pub fn new(cfg: &NotificationsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            endpoint: cfg.endpoint.clone(),
            api_key: cfg.api_key.clone(),
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl NotificationSender for HttpEmailSender {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(
        &self,
        kind: NotificationKind,
        to: &Recipient,
        data: &NotificationData,
    ) -> Result<SendReceipt> {
        let body = EmailBody {
            from: &self.from,
            to: [to.address.as_str()],
            subject: kind.subject(),
            text: render_text(kind, data),
        };

        debug!(%kind, appointment_id = %data.appointment_id, "sending email");
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "email relay error");
            return Err(SchedulerError::SendFailed(format!(
                "relay answered {status}: {text}"
            )));
        }

        let parsed: EmailResponse = resp
            .json()
            .await
            .map_err(|e| SchedulerError::SendFailed(format!("unreadable relay response: {e}")))?;
        Ok(SendReceipt {
            accepted: false,
            reference: parsed.id,
        })
    }
}

/// Build the sender named in config.
pub fn build_sender(cfg: &NotificationsConfig) -> Result<Arc<dyn NotificationSender>> {
    match cfg.provider {
        NotificationProvider::Log => Ok(Arc::new(LogSender)),
        NotificationProvider::Http => {
            if cfg.api_key.is_none() {
                warn!(endpoint = %cfg.endpoint, "http notifications configured without an api key");
            }
            Ok(Arc::new(HttpEmailSender::new(cfg)?))
        }
    }
}

/// Looks recipients up in each tenant's `clients` table.
pub struct ClientDirectory {
    registry: Arc<TenantRegistry>,
}

impl ClientDirectory {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RecipientResolver for ClientDirectory {
    async fn resolve_contact(
        &self,
        tenant: &TenantId,
        appointment: &Appointment,
    ) -> Result<Option<Recipient>> {
        let store = self.registry.store(tenant)?;
        let contact = store.get_contact(tenant, &appointment.subject_id)?;
        Ok(contact.and_then(|c| {
            c.email.map(|address| Recipient {
                name: c.name,
                address,
            })
        }))
    }
}

/// Resolver and sender bundled for the sweep and for lifecycle messages.
#[derive(Clone)]
pub struct Notifier {
    pub resolver: Arc<dyn RecipientResolver>,
    pub sender: Arc<dyn NotificationSender>,
}

impl Notifier {
    pub fn new(resolver: Arc<dyn RecipientResolver>, sender: Arc<dyn NotificationSender>) -> Self {
        Self { resolver, sender }
    }

    /// Resolve and send one lifecycle message. `Ok(None)` when the subject
    /// has no address.
    pub async fn notify(
        &self,
        kind: NotificationKind,
        appointment: &Appointment,
        tz: Tz,
    ) -> Result<Option<SendReceipt>> {
        let Some(to) = self
            .resolver
            .resolve_contact(&appointment.tenant_id, appointment)
            .await?
        else {
            debug!(appointment_id = %appointment.id, %kind, "no address; notification skipped");
            return Ok(None);
        };
        let data = NotificationData::new(appointment, &to, tz, None);
        self.sender.send(kind, &to, &data).await.map(Some)
    }

    /// Fire-and-forget variant for request handlers. Failures are logged only.
    pub fn spawn_notify(&self, kind: NotificationKind, appointment: Appointment, tz: Tz) {
        let notifier = self.clone();
        tokio::spawn(async move {
            match notifier.notify(kind, &appointment, tz).await {
                Ok(Some(receipt)) if !receipt.is_confirmed() => {
                    warn!(appointment_id = %appointment.id, %kind, "notification not confirmed")
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        appointment_id = %appointment.id,
                        %kind,
                        code = e.code(),
                        "notification failed: {e}"
                    )
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotwise_booking::types::Contact;

    fn appointment(tenant: &str, subject: &str) -> Appointment {
        Appointment {
            id: AppointmentId::new(),
            tenant_id: tenant.into(),
            subject_id: subject.into(),
            service_ids: vec![],
            start: DateTime::parse_from_rfc3339("2026-10-19T07:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            duration_minutes: 60,
            total_price_cents: 0,
            status: AppointmentStatus::Pending,
            notes: String::new(),
            reminder_offsets: vec![],
            sent_offsets: Default::default(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn receipt_confirmation() {
        assert!(!SendReceipt::default().is_confirmed());
        assert!(SendReceipt { accepted: true, reference: None }.is_confirmed());
        assert!(SendReceipt { accepted: false, reference: Some("re_1".into()) }.is_confirmed());
    }

    #[test]
    fn data_renders_local_start() {
        let appt = appointment("acme", "ana");
        let to = Recipient {
            name: "Ana".into(),
            address: "ana@example.com".into(),
        };
        let data = NotificationData::new(&appt, &to, chrono_tz::Europe::Madrid, Some(60));
        assert_eq!(data.local_start, "2026-10-19 09:00 (Europe/Madrid)");
        let text = render_text(NotificationKind::Reminder, &data);
        assert!(text.starts_with("Hello Ana,"));
        assert!(text.contains("2026-10-19 09:00"));
    }

    #[tokio::test]
    async fn directory_skips_subjects_without_email() {
        let registry = Arc::new(TenantRegistry::in_memory(4, "Europe/Madrid"));
        let tenant: TenantId = "acme".into();
        let store = registry.store(&tenant).unwrap();
        store
            .upsert_contact(
                &tenant,
                &Contact {
                    subject_id: "ana".into(),
                    name: "Ana".into(),
                    email: Some("ana@example.com".into()),
                },
            )
            .unwrap();
        store
            .upsert_contact(
                &tenant,
                &Contact {
                    subject_id: "ben".into(),
                    name: "Ben".into(),
                    email: None,
                },
            )
            .unwrap();

        let dir = ClientDirectory::new(registry);
        let ana = dir
            .resolve_contact(&tenant, &appointment("acme", "ana"))
            .await
            .unwrap();
        assert_eq!(ana.unwrap().address, "ana@example.com");
        assert!(dir
            .resolve_contact(&tenant, &appointment("acme", "ben"))
            .await
            .unwrap()
            .is_none());
        assert!(dir
            .resolve_contact(&tenant, &appointment("acme", "nobody"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn log_sender_accepts() {
        let to = Recipient {
            name: "Ana".into(),
            address: "ana@example.com".into(),
        };
        let appt = appointment("acme", "ana");
        let data = NotificationData::new(&appt, &to, chrono_tz::UTC, None);
        let receipt = LogSender
            .send(NotificationKind::Created, &to, &data)
            .await
            .unwrap();
        assert!(receipt.is_confirmed());
    }
}
