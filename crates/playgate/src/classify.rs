// Failure classification for engine error events.

use crate::events::{EngineError, ErrorDetails, ErrorType};

/// How the session reacts to an engine error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Non-fatal engine notice: logged, otherwise ignored
    Notice,
    /// Fragment load failure or timeout: one reload per attachment
    RecoverableNetwork,
    /// Manifest, level, key or any other fatal network failure: no retry
    StructuralNetwork,
    /// Decode/parse failure: recovered in place, no bound
    Media,
    /// Fatal error outside the known categories: treated as structural
    UnclassifiedFatal,
}

impl FailureClass {
    /// Whether this class ends the attachment immediately
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FailureClass::StructuralNetwork | FailureClass::UnclassifiedFatal
        )
    }
}

pub fn classify(error: &EngineError) -> FailureClass {
    if !error.fatal {
        return FailureClass::Notice;
    }

    match error.kind {
        ErrorType::Network => match error.details {
            ErrorDetails::FragLoadError | ErrorDetails::FragLoadTimeout => {
                FailureClass::RecoverableNetwork
            }
            _ => FailureClass::StructuralNetwork,
        },
        ErrorType::Media => FailureClass::Media,
        // TODO: revisit once an engine reports recoverable key-system or mux errors
        _ => FailureClass::UnclassifiedFatal,
    }
}
