//! Flattening of submitted messages into a subject, a plain-text body and an
//! HTML body with inline images embedded.

pub mod decoder;
pub mod message;
pub mod rewriter;
pub mod walker;

use mailparse::MailHeaderMap;
pub use message::{Content, Embedded, NO_SUBJECT, NormalizedMessage};

/// Parse and flatten a raw message.
///
/// A message that can't be parsed is passed through as-is: the subject is
/// [`NO_SUBJECT`] and the raw bytes become the text body.
#[tracing::instrument(level = "debug", skip_all, fields(size = raw.len()))]
pub fn normalize(raw: &[u8]) -> Content {
    let mail = match mailparse::parse_mail(raw) {
        Ok(mail) => mail,
        Err(err) => {
            tracing::warn!("Unable to parse message, passing it through as text: {err}");
            return unparsed(raw);
        }
    };

    let subject = mail
        .headers
        .get_first_value("Subject")
        .filter(|subject| !subject.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let walker::Extracted { mut text, html } = walker::extract(&mail);
    if text.is_empty() && !html.is_empty() {
        text.clone_from(&html);
    }

    Content {
        subject,
        text: text.trim().to_string(),
        html: html.trim().to_string(),
    }
}

fn unparsed(raw: &[u8]) -> Content {
    Content {
        subject: NO_SUBJECT.to_string(),
        text: String::from_utf8_lossy(raw).into_owned(),
        html: String::new(),
    }
}
