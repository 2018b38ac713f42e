pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const SIGNATURE_PREFIX: &str = "sha256=";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Discriminator Meta puts in the `object` field of every WhatsApp webhook
pub const WHATSAPP_OBJECT: &str = "whatsapp_business_account";
pub const MESSAGES_FIELD: &str = "messages";

/// Maximum body length WhatsApp accepts for a text message
pub const WHATSAPP_MAX_TEXT_LEN: usize = 4096;

/// National significant number length used to detect a missing country code
pub const NATIONAL_NUMBER_LEN: usize = 10;

pub const COURTESY_REPLY_TEXT: &str =
    "Sorry, this translation service is restricted to authorized numbers. Your message was not processed.";
