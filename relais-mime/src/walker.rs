//! Recursive extraction of text, HTML and inline images from a MIME tree.
//!
//! Every entity is classified into a [`Node`] first, so the merge rules live in
//! one place: the first non-empty text found anywhere wins, the last non-empty
//! HTML wins, inline images are collected for the whole traversal and
//! attachments are ignored.

use std::collections::BTreeMap;

use mailparse::{MailHeaderMap, ParsedMail};

use crate::{decoder, message::Embedded, rewriter};

/// A MIME entity, classified by how extraction treats it.
#[derive(Debug)]
pub enum Node<'a, 'm> {
    /// `text/plain`
    Text(&'a ParsedMail<'m>),
    /// `text/html`
    Html(&'a ParsedMail<'m>),
    /// An `image/*` child of a multipart that carries a `Content-ID`
    InlineImage {
        part: &'a ParsedMail<'m>,
        content_id: String,
    },
    /// A child of a multipart whose disposition is `attachment`
    Attachment,
    /// Any other single media type; its body is treated as text
    Other(&'a ParsedMail<'m>),
    Multipart(&'a [ParsedMail<'m>]),
    /// No usable `Content-Type`; the body is treated as text
    Unlabelled(&'a ParsedMail<'m>),
}

impl<'a, 'm> Node<'a, 'm> {
    /// Classify an entity on its own, e.g. the top of the tree.
    pub fn classify(part: &'a ParsedMail<'m>) -> Self {
        let labelled = part
            .headers
            .get_first_value("Content-Type")
            .is_some_and(|_| part.ctype.mimetype.contains('/'));

        if !labelled {
            return Self::Unlabelled(part);
        }

        match part.ctype.mimetype.as_str() {
            mimetype if mimetype.starts_with("multipart/") => Self::Multipart(&part.subparts),
            "text/plain" => Self::Text(part),
            "text/html" => Self::Html(part),
            _ => Self::Other(part),
        }
    }

    /// Classify an entity found inside a multipart, where attachments and then
    /// inline images are recognised before anything else.
    pub fn classify_child(part: &'a ParsedMail<'m>) -> Self {
        if part
            .headers
            .get_first_value("Content-Disposition")
            .is_some_and(|disposition| is_attachment(&disposition))
        {
            return Self::Attachment;
        }

        if part.ctype.mimetype.starts_with("image/")
            && let Some(content_id) = part
                .headers
                .get_first_value("Content-ID")
                .filter(|id| !id.trim().is_empty())
        {
            return Self::InlineImage {
                part,
                content_id: content_id
                    .trim()
                    .trim_matches(|c| c == '<' || c == '>')
                    .to_string(),
            };
        }

        Self::classify(part)
    }
}

fn is_attachment(disposition: &str) -> bool {
    disposition
        .trim_start()
        .get(.."attachment".len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("attachment"))
}

/// Text and HTML pulled out of (part of) a MIME tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub html: String,
}

impl Extracted {
    /// Fold a child's result into this one: text is first-wins, html is last-wins.
    fn merge(&mut self, child: Self) {
        if self.text.is_empty() && !child.text.is_empty() {
            self.text = child.text;
        }

        if !child.html.is_empty() {
            self.html = child.html;
        }
    }
}

/// State for one traversal of one message.
#[derive(Debug, Default)]
pub struct Walker {
    images: BTreeMap<String, Embedded>,
}

impl Walker {
    /// Inline images found so far, keyed by content-id without angle brackets
    pub const fn images(&self) -> &BTreeMap<String, Embedded> {
        &self.images
    }

    pub fn walk(&mut self, node: Node<'_, '_>) -> Extracted {
        match node {
            Node::Text(part) => Extracted {
                text: decoder::decode(part),
                html: String::new(),
            },
            Node::Html(part) => Extracted {
                text: String::new(),
                html: decoder::decode(part),
            },
            Node::Other(part) | Node::Unlabelled(part) => Extracted {
                text: decoder::decode(part),
                html: String::new(),
            },
            Node::InlineImage { part, content_id } => {
                if let Some(image) = decoder::embed(part, &part.ctype.mimetype) {
                    tracing::trace!(content_id, "Registered inline image");
                    self.images.insert(content_id, image);
                }
                Extracted::default()
            }
            Node::Attachment => Extracted::default(),
            Node::Multipart(children) => {
                children
                    .iter()
                    .map(Node::classify_child)
                    .fold(Extracted::default(), |mut acc, child| {
                        let extracted = self.walk(child);
                        acc.merge(extracted);
                        acc
                    })
            }
        }
    }
}

/// Pull text and HTML out of a parsed message, with every inline image the
/// HTML references by content-id embedded as a `data:` URI.
pub fn extract(entity: &ParsedMail<'_>) -> Extracted {
    let mut walker = Walker::default();
    let mut extracted = walker.walk(Node::classify(entity));

    if !walker.images.is_empty() && !extracted.html.is_empty() {
        extracted.html = rewriter::rewrite(&extracted.html, &walker.images);
    }

    extracted
}
