use crate::error::AppError;
use crate::helpers::split_message;
use crate::recipients::Recipient;

/// A single unit handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutgoingMessage {
    pub(crate) to: String,
    pub(crate) subject: Option<String>,
    pub(crate) body: String,
}

/// The prediction in both shapes a batch needs: whole for email, numbered parts for SMS.
#[derive(Debug, Clone)]
pub(crate) struct PreparedMessage {
    full: String,
    chunks: Vec<String>,
    signoff: String,
}

impl PreparedMessage {
    pub(crate) fn new(prediction: &str, sms_chunk_len: usize, signoff: &str) -> Result<Self, AppError> {
        Ok(Self {
            full: prediction.to_string(),
            chunks: split_message(prediction, sms_chunk_len)?,
            signoff: signoff.to_string(),
        })
    }

    /// Message units for one recipient, in delivery order.
    pub(crate) fn units_for(&self, recipient: &Recipient) -> Vec<OutgoingMessage> {
        let to = recipient.address().to_string();
        if recipient.is_length_limited() {
            return self
                .chunks
                .iter()
                .map(|chunk| OutgoingMessage {
                    to: to.clone(),
                    subject: None,
                    body: chunk.clone(),
                })
                .collect();
        }

        let subject = match recipient.display_name() {
            Some(name) => format!("{name}, your snow day prediction is here..."),
            None => "Your snow day prediction is here...".to_string(),
        };
        let body = if self.signoff.is_empty() {
            self.full.clone()
        } else {
            format!("{}\n\n{}", self.full, self.signoff)
        };
        vec![OutgoingMessage {
            to,
            subject: Some(subject),
            body,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sms() -> Recipient {
        Recipient::SmsGateway {
            address: "5551234567@vtext.com".into(),
        }
    }

    #[test]
    fn test_email_gets_whole_message_with_subject_and_signoff() {
        let prepared = PreparedMessage::new("85% chance of a snow day.", 10, "Stay cool,\nBlizzard").unwrap();
        let units = prepared.units_for(&Recipient::Email {
            address: "sam@example.com".into(),
            display_name: Some("Sam".into()),
        });
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].to, "sam@example.com");
        assert_eq!(
            units[0].subject.as_deref(),
            Some("Sam, your snow day prediction is here...")
        );
        assert_eq!(units[0].body, "85% chance of a snow day.\n\nStay cool,\nBlizzard");
    }

    #[test]
    fn test_email_without_name_uses_generic_subject() {
        let prepared = PreparedMessage::new("text", 130, "").unwrap();
        let units = prepared.units_for(&Recipient::Email {
            address: "a@example.com".into(),
            display_name: None,
        });
        assert_eq!(units[0].subject.as_deref(), Some("Your snow day prediction is here..."));
        assert_eq!(units[0].body, "text");
    }

    #[test]
    fn test_sms_gets_numbered_chunks_without_subject() {
        let prepared = PreparedMessage::new("snow snow snow", 9, "sig").unwrap();
        let units = prepared.units_for(&sms());
        let bodies: Vec<&str> = units.iter().map(|u| u.body.as_str()).collect();
        assert_eq!(bodies, vec!["snow snow (1/2)", "snow (2/2)"]);
        assert!(units.iter().all(|u| u.subject.is_none()));
        assert!(units.iter().all(|u| u.to == "5551234567@vtext.com"));
    }

    #[test]
    fn test_empty_prediction_gives_no_sms_units() {
        let prepared = PreparedMessage::new("", 130, "sig").unwrap();
        assert!(prepared.units_for(&sms()).is_empty());
    }
}
