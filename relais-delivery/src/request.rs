use relais_mime::NormalizedMessage;
use serde::Serialize;

/// JSON body of `POST /email/send`.
#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub html: &'a str,
    #[serde(rename = "appName")]
    pub app_name: &'a str,
}

impl<'a> From<&'a NormalizedMessage> for SendRequest<'a> {
    fn from(message: &'a NormalizedMessage) -> Self {
        Self {
            to: &message.recipient,
            subject: &message.subject,
            text: &message.text,
            html: &message.html,
            app_name: message.app_name.as_str(),
        }
    }
}
