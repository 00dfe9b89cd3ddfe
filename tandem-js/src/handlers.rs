//! Single-use answer slot for one instruction

use serde_json::Value as JsonValue;
use tandem_ipc::ErrorEnvelope;

use crate::error::WorkerError;

/// Holds the answer to the instruction being processed.
///
/// Exactly one of [`respond`](Self::respond) or [`fail`](Self::fail) may be
/// used, once.
#[derive(Debug, Default)]
pub struct InstructionHandlers {
    reply: Option<JsonValue>,
}

impl InstructionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with a serialized value
    pub fn respond(&mut self, value: JsonValue) -> Result<(), WorkerError> {
        if self.reply.is_some() {
            return Err(WorkerError::HandlerAlreadyUsed);
        }
        self.reply = Some(value);
        Ok(())
    }

    /// Answer with an error envelope
    pub fn fail(&mut self, error: ErrorEnvelope) -> Result<(), WorkerError> {
        self.respond(error.to_envelope())
    }

    pub fn is_answered(&self) -> bool {
        self.reply.is_some()
    }

    /// The answer, `null` when the delegate never gave one
    pub fn into_reply(self) -> JsonValue {
        self.reply.unwrap_or(JsonValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_respond_once() {
        let mut handlers = InstructionHandlers::new();
        assert!(!handlers.is_answered());

        handlers.respond(json!([1, 2])).unwrap();
        assert!(handlers.is_answered());
        assert_eq!(handlers.into_reply(), json!([1, 2]));
    }

    #[test]
    fn test_second_use_fails() {
        let mut handlers = InstructionHandlers::new();
        handlers.respond(JsonValue::Null).unwrap();

        let again = handlers.fail(ErrorEnvelope::new("late", None));
        assert!(matches!(again, Err(WorkerError::HandlerAlreadyUsed)));

        let mut handlers = InstructionHandlers::new();
        handlers.fail(ErrorEnvelope::new("first", None)).unwrap();
        assert!(matches!(handlers.respond(json!(1)), Err(WorkerError::HandlerAlreadyUsed)));
    }

    #[test]
    fn test_unanswered_reply_is_null() {
        assert_eq!(InstructionHandlers::new().into_reply(), JsonValue::Null);
    }
}
