// SPDX-License-Identifier: GPL-3.0-only

//! What the host asks for and what it gets back

use crate::recognition::{RecognitionMode, RecognitionResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Options of one scan, fixed for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanRequest {
    pub sound_enabled: bool,
    pub scan_expiration_date: bool,
    pub scan_card_holder: bool,
    pub grab_card_image: bool,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            scan_expiration_date: true,
            scan_card_holder: true,
            grab_card_image: false,
        }
    }
}

impl ScanRequest {
    /// Recognizer mode flags; the number is always recognized
    pub fn to_mode(&self) -> RecognitionMode {
        let mut mode = RecognitionMode::NUMBER;
        if self.scan_expiration_date {
            mode |= RecognitionMode::DATE;
        }
        if self.scan_card_holder {
            mode |= RecognitionMode::NAME;
        }
        if self.grab_card_image {
            mode |= RecognitionMode::GRAB_CARD_IMAGE;
        }
        mode
    }
}

/// A recognized card
///
/// `Display` and `Debug` never show the full number.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Digits only
    pub number: String,
    pub holder: Option<String>,
    /// `MM/YY`
    pub expiration_date: Option<String>,
}

impl Card {
    pub fn new(number: impl Into<String>, holder: Option<String>, expiration_date: Option<String>) -> Self {
        Self {
            number: number.into(),
            holder,
            expiration_date,
        }
    }

    /// Card from a final recognition result
    pub fn from_result(result: &RecognitionResult) -> Self {
        Self {
            number: result.number.clone().unwrap_or_default(),
            holder: result.name.clone().filter(|name| !name.is_empty()),
            expiration_date: result.date.as_deref().and_then(format_expiration_date),
        }
    }

    pub fn number_redacted(&self) -> String {
        redact_card_number(&self.number)
    }

    pub fn number_pretty(&self) -> String {
        pretty_print_card_number(&self.number)
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Card{{number='{}', holder='{}', expiration_date='{}'}}",
            self.number_redacted(),
            self.holder.as_deref().unwrap_or(""),
            self.expiration_date.as_deref().unwrap_or("")
        )
    }
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Card")
            .field("number", &self.number_redacted())
            .field("holder", &self.holder)
            .field("expiration_date", &self.expiration_date)
            .finish()
    }
}

/// `MMYY` → `MM/YY`; empty input means no date
pub fn format_expiration_date(date: &str) -> Option<String> {
    if date.is_empty() {
        return None;
    }
    if date.len() == 4 && date.is_char_boundary(2) {
        Some(format!("{}/{}", &date[..2], &date[2..]))
    } else {
        Some(date.to_string())
    }
}

/// Mask the middle digits
///
/// 16 digits keep the first six and last two, 15 digits the first six and
/// last one. Other lengths give an empty string.
pub fn redact_card_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().collect();
    let (tail, gaps): (usize, &[usize]) = match digits.len() {
        16 => (2, &[4, 9, 14]),
        15 => (1, &[4, 11]),
        _ => return String::new(),
    };
    let mut masked: Vec<char> = digits[..6].to_vec();
    masked.extend("********".chars());
    masked.extend_from_slice(&digits[digits.len() - tail..]);
    for &gap in gaps {
        masked.insert(gap, ' ');
    }
    masked.into_iter().collect()
}

/// Group digits with non-breaking spaces (4-4-4-4 or 4-6-5)
pub fn pretty_print_card_number(number: &str) -> String {
    let len = number.chars().count();
    let mut out = String::with_capacity(len + 4);
    for (i, c) in number.chars().enumerate() {
        let gap = match len {
            16 => i != 0 && i % 4 == 0,
            15 => i == 4 || i == 10,
            _ => false,
        };
        if gap {
            out.push('\u{a0}');
        }
        out.push(c);
    }
    out
}

/// Why the user left without a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    BackPressed,
    AddManually,
}

impl CancelReason {
    /// Numeric code hosts used to receive
    pub fn code(&self) -> i32 {
        match self {
            CancelReason::BackPressed => 1,
            CancelReason::AddManually => 2,
        }
    }
}

/// End of a scan as seen by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Completed {
        card: Card,
        /// JPEG-encoded card image, when requested and delivered
        #[serde(skip_serializing_if = "Option::is_none", default)]
        image: Option<Vec<u8>>,
    },
    Cancelled {
        reason: CancelReason,
    },
    Failed {
        message: String,
    },
}
