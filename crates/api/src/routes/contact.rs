//! Contact form endpoint

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MESSAGE_MIN: usize = 10;
const MESSAGE_MAX: usize = 1000;
const NAME_MAX: usize = 100;
const TOPIC_MAX: usize = 120;

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub topic: Option<String>,
    pub message: String,
    pub source: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ContactSubmission {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub topic: Option<String>,
    pub message: String,
    pub source: String,
    pub status: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
    pub data: ContactSubmission,
}

/// POST /api/contact
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(req): Json<ContactRequest>,
) -> ApiResult<Json<ContactResponse>> {
    validate(&req).map_err(ApiError::Validation)?;

    // Fail closed before persisting anything: a submission nobody is
    // notified about would silently disappear into the database.
    if !state.email.is_enabled() || state.email.admin_address().is_none() {
        return Err(ApiError::NotConfigured("Email service"));
    }

    let source = req.source.as_deref().unwrap_or("website");

    let submission: ContactSubmission = sqlx::query_as(
        r#"
        INSERT INTO contact_submissions (name, email, phone, topic, message, source)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, name, email, phone, topic, message, source, status, created_at
        "#,
    )
    .bind(req.name.trim())
    .bind(req.email.trim())
    .bind(req.phone.as_deref().map(str::trim))
    .bind(req.topic.as_deref().map(str::trim))
    .bind(&req.message)
    .bind(source)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        submission_id = %submission.id,
        source = %submission.source,
        "Contact submission recorded"
    );

    // Transient send failures are logged, not surfaced; the submission is
    // already durable and staff can follow up from the dashboard.
    if let Err(e) = state
        .email
        .send_contact_notification(
            &submission.name,
            &submission.email,
            submission.topic.as_deref(),
            &submission.message,
        )
        .await
    {
        tracing::error!(
            submission_id = %submission.id,
            error = %e,
            "Failed to send contact notification email"
        );
    }

    Ok(Json(ContactResponse {
        success: true,
        message: "Thanks for reaching out. We'll get back to you within one business day."
            .to_string(),
        data: submission,
    }))
}

/// Validate a contact request, collecting one message per failing field.
fn validate(req: &ContactRequest) -> Result<(), HashMap<String, String>> {
    let mut errors = HashMap::new();

    let name = req.name.trim();
    if name.is_empty() {
        errors.insert("name".to_string(), "Name is required".to_string());
    } else if name.len() > NAME_MAX {
        errors.insert(
            "name".to_string(),
            format!("Name must be at most {} characters", NAME_MAX),
        );
    }

    if !is_valid_email(req.email.trim()) {
        errors.insert("email".to_string(), "Invalid email address".to_string());
    }

    if let Some(phone) = req.phone.as_deref().map(str::trim) {
        if !phone.is_empty() && !is_valid_phone(phone) {
            errors.insert("phone".to_string(), "Invalid phone number".to_string());
        }
    }

    if let Some(topic) = req.topic.as_deref() {
        if topic.len() > TOPIC_MAX {
            errors.insert(
                "topic".to_string(),
                format!("Topic must be at most {} characters", TOPIC_MAX),
            );
        }
    }

    if req.message.len() < MESSAGE_MIN {
        errors.insert(
            "message".to_string(),
            format!("Message must be at least {} characters", MESSAGE_MIN),
        );
    } else if req.message.len() > MESSAGE_MAX {
        errors.insert(
            "message".to_string(),
            format!("Message must be at most {} characters", MESSAGE_MAX),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > 254 || email.contains(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}

fn is_valid_phone(phone: &str) -> bool {
    if phone.len() > 20 {
        return false;
    }

    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | '.' | ' '));

    allowed && (7..=15).contains(&digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(message: &str) -> ContactRequest {
        ContactRequest {
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            phone: None,
            topic: None,
            message: message.to_string(),
            source: None,
        }
    }

    #[test]
    fn message_below_minimum_is_rejected() {
        let errors = validate(&request("too short")).unwrap_err();
        assert!(errors.contains_key("message"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn message_at_boundaries() {
        // 10 chars: minimum accepted
        assert!(validate(&request(&"x".repeat(10))).is_ok());
        // 1000 chars: maximum accepted
        assert!(validate(&request(&"x".repeat(1000))).is_ok());
        // 1001 chars: rejected
        let errors = validate(&request(&"x".repeat(1001))).unwrap_err();
        assert!(errors.contains_key("message"));
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("j.doe+tag@sub.example.co"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@domain"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@.com"));
        assert!(!is_valid_email("jane doe@example.com"));
    }

    #[test]
    fn phone_validation() {
        assert!(is_valid_phone("+1 (555) 123-4567"));
        assert!(is_valid_phone("5551234567"));
        assert!(!is_valid_phone("123"));
        assert!(!is_valid_phone("call me maybe"));
        assert!(!is_valid_phone("+1 (555) 123-4567 ext 890123"));
    }

    #[test]
    fn empty_phone_is_allowed() {
        let mut req = request(&"x".repeat(50));
        req.phone = Some("   ".to_string());
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn multiple_failures_are_collected() {
        let req = ContactRequest {
            name: "".to_string(),
            email: "nope".to_string(),
            phone: Some("abc".to_string()),
            topic: Some("t".repeat(121)),
            message: "short".to_string(),
            source: None,
        };

        let errors = validate(&req).unwrap_err();
        assert_eq!(errors.len(), 5);
        for field in ["name", "email", "phone", "topic", "message"] {
            assert!(errors.contains_key(field), "missing error for {}", field);
        }
    }
}
