use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("unsupported item type: {0}")]
    UnsupportedItemType(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream rejected request with status {status}: {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ForwardError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::UnsupportedItemType(_) => "unsupported_item_type",
            ForwardError::MissingRequiredField(_) => "missing_required_field",
            ForwardError::Transport(_) => "transport_error",
            ForwardError::UpstreamRejected { .. } => "upstream_rejected",
            ForwardError::Internal(_) => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ForwardError::Transport(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ForwardError::UnsupportedItemType(_) | ForwardError::MissingRequiredField(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(ForwardError::Transport("reset".into()).is_retryable());
        assert!(
            !ForwardError::UpstreamRejected {
                status: 422,
                body: "bad".into()
            }
            .is_retryable()
        );
        assert!(!ForwardError::MissingRequiredField("name".into()).is_retryable());
    }

    #[test]
    fn display_names_the_missing_field() {
        let error = ForwardError::MissingRequiredField("title".into());
        assert_eq!(error.to_string(), "missing required field: title");
        assert!(error.is_validation());
    }
}
