use std::fmt;

use crate::call::call_record::CallId;

/// User-facing notifications produced by the controller, in the order they
/// happened. The UI typically renders them as toasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNotice {
    IncomingCall { from: String },
    CallInProgress,
    MicrophoneRequired,
    CallDeclined,
    /// The remote side ended the call.
    CallEnded { call_id: CallId },
    Failure(String),
}

impl CallNotice {
    pub fn title(&self) -> &'static str {
        match self {
            CallNotice::IncomingCall { .. } => "Incoming call",
            CallNotice::CallInProgress => "Call in Progress",
            CallNotice::MicrophoneRequired => "Mic required",
            CallNotice::CallDeclined => "Call Declined",
            CallNotice::CallEnded { .. } => "Call ended",
            CallNotice::Failure(_) => "Something went wrong",
        }
    }

    /// Rendered with destructive styling.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CallNotice::CallInProgress | CallNotice::MicrophoneRequired | CallNotice::Failure(_)
        )
    }
}

impl fmt::Display for CallNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallNotice::IncomingCall { from } => write!(f, "{}: {from} is calling", self.title()),
            CallNotice::CallInProgress => write!(
                f,
                "{}: A call is already active in this session.",
                self.title()
            ),
            CallNotice::MicrophoneRequired => write!(
                f,
                "{}: Audio permissions are required for calls.",
                self.title()
            ),
            CallNotice::CallDeclined => f.write_str(self.title()),
            CallNotice::CallEnded { call_id } => write!(f, "{}: {call_id}", self.title()),
            CallNotice::Failure(reason) => write!(f, "{}: {reason}", self.title()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toast_text() {
        assert_eq!(
            CallNotice::MicrophoneRequired.to_string(),
            "Mic required: Audio permissions are required for calls."
        );
        assert_eq!(CallNotice::CallDeclined.to_string(), "Call Declined");
        assert!(CallNotice::CallInProgress.is_error());
        assert!(!CallNotice::IncomingCall { from: "x".into() }.is_error());
    }
}
