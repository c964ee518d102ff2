//! Static funnel copy.

/// First message of the combo delivery.
pub const APOLOGY_TEXT: &str = "Hi, sorry for the delay. I'll send everything";

/// Closing text, used when no closing audio is configured.
pub const CLOSING_TEXT: &str = "Once you've had a look, tell me if you liked it, okay? 🤍";

/// Upsell pitch.
pub const UPSELL_TEXT: &str = "Did you like the little preview I sent you? 🥰\n\
The full collection is inside my VIP, here is what you get:\n\n\
💎 Every photo and video set\n\
💎 Exclusive content made just for members\n\
💎 My personal contact\n\
💎 New posts all the time\n\
💎 And much more...\n\n\
Pick a VIP option below to get access right away";

/// Prompt above the offer keyboard.
pub const OFFER_PROMPT: &str = "Choose your VIP below 👇";

/// Label of the one month tier.
pub const OFFER_1_MONTH_LABEL: &str = "[$10] 1 MONTH 🔥";
/// Label of the six months tier.
pub const OFFER_6_MONTHS_LABEL: &str = "[$17] 6 MONTHS + SURPRISE 👀🔥";
/// Label of the one year tier.
pub const OFFER_1_YEAR_LABEL: &str = "[$20] 1 YEAR + EXCLUSIVE VIDEO 🎁";

/// Remarketing discount text.
pub const REMARKETING_TEXT: &str = "Okay, I've already applied the discount for you 😘\n\
Take advantage now, this message won't stay up for long, just tap here 👇";

/// Label of the remarketing button.
pub const REMARKETING_BUTTON_LABEL: &str = "I WANT THIS 🔥";

/// Sent once membership is confirmed.
pub const GROUP_APPROVED_MESSAGE: &str = "I've accepted you into the group, hope you enjoy it";
