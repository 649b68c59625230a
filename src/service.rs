// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Transport-independent request handling
//!
//! A chat transport turns its updates into [`BotEvent`]s and sends back the
//! [`OutgoingMessage`]s the handler returns. The handler never fails: any
//! inference error becomes an explanation for the user.

use crate::error::{HazardError, Result};
use crate::inference::{HazardClassifier, InferenceResult};
use serde::{Deserialize, Serialize};

pub const GREETING: &str =
    "Hi! Send me a photo of a product's ingredient list and I will check how safe it is.";
pub const ANOTHER_PRODUCT_PROMPT: &str =
    "Want to check another product? Send a photo of its ingredient list!";

/// Converts a photograph into text
pub trait OcrEngine: Send + Sync {
    fn extract_text(&self, image: &[u8]) -> Result<String>;
}

/// OCR stand-in for clients that already extracted the text: the payload is
/// read as UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8TextOcr;

impl OcrEngine for Utf8TextOcr {
    fn extract_text(&self, image: &[u8]) -> Result<String> {
        if image.is_empty() {
            return Err(HazardError::OcrFailure("empty payload".to_string()));
        }
        let text = String::from_utf8_lossy(image).into_owned();
        if text.trim().is_empty() {
            return Err(HazardError::OcrFailure("no text recognized".to_string()));
        }
        Ok(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    /// The `/start` command
    Start,
    /// A photo to analyze
    Image(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Text { text: String },
    Analysis { text: String, result: InferenceResult },
}

impl OutgoingMessage {
    fn text(text: impl Into<String>) -> Self {
        OutgoingMessage::Text { text: text.into() }
    }

    /// The text shown to the user
    pub fn body(&self) -> &str {
        match self {
            OutgoingMessage::Text { text } | OutgoingMessage::Analysis { text, .. } => text,
        }
    }
}

pub struct RequestHandler<O: OcrEngine> {
    ocr: O,
    classifier: HazardClassifier,
}

impl<O: OcrEngine> RequestHandler<O> {
    pub fn new(ocr: O, classifier: HazardClassifier) -> Self {
        Self { ocr, classifier }
    }

    /// Produce the replies for one incoming event
    pub fn handle(&self, event: BotEvent) -> Vec<OutgoingMessage> {
        match event {
            BotEvent::Start => vec![OutgoingMessage::text(GREETING)],
            BotEvent::Image(bytes) => {
                let first = match self.analyze(&bytes) {
                    Ok(result) => OutgoingMessage::Analysis {
                        text: result.render_report(),
                        result,
                    },
                    Err(e) => {
                        tracing::warn!("Request failed: {}", e);
                        OutgoingMessage::text(e.user_message())
                    }
                };
                vec![first, OutgoingMessage::text(ANOTHER_PRODUCT_PROMPT)]
            }
        }
    }

    fn analyze(&self, image: &[u8]) -> Result<InferenceResult> {
        let text = self.ocr.extract_text(image)?;
        self.classifier.classify(&text)
    }
}
