//! Mail transaction envelope.

use super::Address;

/// Sender, recipients and raw body of one mail transaction.
///
/// Created by `MAIL FROM`, filled by `RCPT TO` and `DATA`, and handed to the
/// relay by value once the body is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    sender: Address,
    recipients: Vec<Address>,
    body: Vec<u8>,
}

impl Envelope {
    /// Starts an envelope for the given sender.
    #[must_use]
    pub const fn new(sender: Address) -> Self {
        Self {
            sender,
            recipients: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a recipient. Order is preserved and duplicates are kept.
    pub fn add_recipient(&mut self, recipient: Address) {
        self.recipients.push(recipient);
    }

    /// Sets the message body.
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Returns the envelope sender.
    #[must_use]
    pub const fn sender(&self) -> &Address {
        &self.sender
    }

    /// Returns the recipients in the order they were given.
    #[must_use]
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    /// Returns the raw message bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
