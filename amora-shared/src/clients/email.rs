use reqwest::Client;
use serde::Serialize;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Clone)]
pub struct EmailClient {
    client: Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: String,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
}

impl EmailClient {
    pub fn new(api_key: &str, from_email: &str, from_name: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            from_email: from_email.to_string(),
            from_name: from_name.to_string(),
        }
    }

    pub async fn send_email(&self, to: &str, subject: &str, html: String) -> Result<(), String> {
        let request = ResendRequest {
            from: format!("{} <{}>", self.from_name, self.from_email),
            to: [to],
            subject,
            html,
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("email send failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("email API error ({status}): {body}"));
        }

        tracing::debug!(subject = %subject, "email sent");
        Ok(())
    }

    pub async fn send_password_reset_code(&self, to: &str, code: &str, valid_minutes: i64) -> Result<(), String> {
        self.send_email(to, "Amora - Your password reset code", reset_code_html(code, valid_minutes))
            .await
    }
}

fn reset_code_html(code: &str, valid_minutes: i64) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
        <h2 style="color: #e11d48;">Amora - Password Reset</h2>
        <p>Use this code to reset your password:</p>
        <div style="background: #fff1f2; color: #e11d48; font-size: 32px; font-weight: bold; text-align: center; padding: 20px; border-radius: 8px; letter-spacing: 8px;">{code}</div>
        <p style="color: #666; margin-top: 20px;">This code expires in {valid_minutes} minutes. If you did not request it, you can ignore this email.</p>
        </div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_email_carries_code_and_expiry() {
        let html = reset_code_html("482913", 10);
        assert!(html.contains("482913"));
        assert!(html.contains("expires in 10 minutes"));
    }
}
