use relais_common::label::AppLabel;

/// Subject line used when a message has none.
pub const NO_SUBJECT: &str = "No Subject";

/// An inline image, ready to be dropped into a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embedded {
    /// Lowercase `type/subtype`
    pub media_type: String,
    /// Standard, padded base64 of the decoded image bytes
    pub payload: String,
}

impl Embedded {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.payload)
    }
}

/// The readable parts of a message, flattened out of its MIME tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Content {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// A message as it is handed to delivery: flattened content plus who it is
/// for and which application sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub recipient: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub app_name: AppLabel,
}

impl NormalizedMessage {
    pub fn new(content: Content, recipient: impl Into<String>, app_name: AppLabel) -> Self {
        let Content {
            subject,
            text,
            html,
        } = content;

        Self {
            recipient: recipient.into(),
            subject,
            text,
            html,
            app_name,
        }
    }
}
