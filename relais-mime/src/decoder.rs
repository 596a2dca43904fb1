//! Turning a single MIME leaf into something usable.

use base64::{Engine, engine::general_purpose::STANDARD};
use encoding_rs::{Encoding, UTF_8};
use mailparse::ParsedMail;

use crate::message::Embedded;

/// The character set a part declares, falling back to UTF-8 when the
/// parameter is missing or names something we don't recognise.
fn charset(part: &ParsedMail<'_>) -> &'static Encoding {
    part.ctype
        .params
        .get("charset")
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8)
}

/// Undo the part's transfer encoding, then its character set.
///
/// Malformed byte sequences are replaced rather than rejected. A part whose
/// transfer encoding can't be undone contributes nothing.
pub fn decode(part: &ParsedMail<'_>) -> String {
    match part.get_body_raw() {
        Ok(bytes) => {
            let (text, encoding, lossy) = charset(part).decode(&bytes);
            if lossy {
                tracing::debug!(
                    charset = encoding.name(),
                    "Replaced malformed sequences while decoding part"
                );
            }
            text.into_owned()
        }
        Err(err) => {
            tracing::warn!(
                mimetype = %part.ctype.mimetype,
                "Unable to decode part body, skipping it: {err}"
            );
            String::new()
        }
    }
}

/// Base64 the part's decoded bytes for use in a `data:` URI.
///
/// `None` if the transfer encoding can't be undone; the image is then simply
/// left unresolved.
pub fn embed(part: &ParsedMail<'_>, media_type: &str) -> Option<Embedded> {
    match part.get_body_raw() {
        Ok(bytes) => Some(Embedded {
            media_type: media_type.to_string(),
            payload: STANDARD.encode(bytes),
        }),
        Err(err) => {
            tracing::warn!(media_type, "Unable to decode inline image: {err}");
            None
        }
    }
}
