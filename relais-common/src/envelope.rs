use mailparse::{MailAddr, MailAddrList};

#[derive(Default, Debug, Clone)]
pub struct Envelope {
    sender: Option<MailAddr>,
    recipients: Option<MailAddrList>,
    declared_size: Option<usize>,
}

impl Envelope {
    /// Returns a reference to the [`Envelope`] sender for this message.
    ///
    /// `None` is either the null reverse-path (`MAIL FROM:<>`) or no `MAIL`
    /// command at all; the session state tells the two apart.
    #[inline]
    pub const fn sender(&self) -> Option<&MailAddr> {
        self.sender.as_ref()
    }

    /// Returns a mutable reference to the [`Envelope`] sender for this message
    #[inline]
    pub const fn sender_mut(&mut self) -> &mut Option<MailAddr> {
        &mut self.sender
    }

    /// Returns a reference to the [`Envelope`] recipients for this message
    #[inline]
    pub const fn recipients(&self) -> Option<&MailAddrList> {
        self.recipients.as_ref()
    }

    /// Returns a mutable reference to the [`Envelope`] recipients for this message
    #[inline]
    pub const fn recipients_mut(&mut self) -> &mut Option<MailAddrList> {
        &mut self.recipients
    }

    /// Number of recipients accepted so far
    pub fn recipient_count(&self) -> usize {
        self.recipients.as_ref().map_or(0, |rcpts| rcpts.len())
    }

    /// The `SIZE=` value the client declared on `MAIL`, if any
    #[inline]
    pub const fn declared_size(&self) -> Option<usize> {
        self.declared_size
    }

    #[inline]
    pub const fn declared_size_mut(&mut self) -> &mut Option<usize> {
        &mut self.declared_size
    }

    /// The bare address of the sender, if one was given
    pub fn sender_address(&self) -> Option<&str> {
        self.sender.as_ref().and_then(address_of)
    }

    /// The bare address of the first recipient; the only one a message is
    /// delivered to.
    pub fn first_recipient(&self) -> Option<&str> {
        self.recipients
            .as_ref()
            .and_then(|rcpts| rcpts.iter().find_map(address_of))
    }

    /// Forget everything about the current transaction
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

fn address_of(addr: &MailAddr) -> Option<&str> {
    match addr {
        MailAddr::Single(single) => Some(single.addr.as_str()),
        MailAddr::Group(group) => group.addrs.first().map(|single| single.addr.as_str()),
    }
}
