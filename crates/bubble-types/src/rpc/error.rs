//! The Guardian's numeric error taxonomy.
//!
//! Standard JSON-RPC 2.0 reserves `-32700..-32600` for transport/envelope
//! failures; the Guardian produces those directly from malformed requests,
//! never from the DataServer. Everything else lives in the
//! `-32000..-32099` application range and is split into two
//! bands: `-32000..-32007` are authorization-band errors the Guardian itself
//! produces, `-32020..-32025` are storage-band errors the DataServer
//! produces and the Guardian passes through verbatim. `-32040..-32099` is
//! reserved for implementation-specific DataServer errors this crate does
//! not assign a variant to.

/// A Guardian-specific or standard JSON-RPC error code, with its wire
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GuardianErrorCode {
    #[error("parse error")]
    ParseError,
    #[error("invalid request")]
    InvalidRequest,
    #[error("method not found")]
    MethodNotFound,
    #[error("invalid params")]
    InvalidParams,

    #[error("blockchain not supported")]
    BlockchainNotSupported,
    #[error("bubble has been terminated")]
    BubbleTerminated,
    #[error("permission denied")]
    PermissionDenied,
    #[error("authentication failure")]
    AuthenticationFailure,
    #[error("method failed")]
    MethodFailed,
    #[error("internal error")]
    InternalError,
    #[error("invalid content id")]
    InvalidContentId,
    #[error("subscription terminated")]
    SubscriptionTerminated,

    #[error("bubble already exists")]
    BubbleAlreadyExists,
    #[error("bubble does not exist")]
    BubbleDoesNotExist,
    #[error("file does not exist")]
    FileDoesNotExist,
    #[error("directory already exists")]
    DirectoryAlreadyExists,
    #[error("invalid option")]
    InvalidOption,
    #[error("internal server error")]
    InternalServerError,
}

impl GuardianErrorCode {
    /// The numeric wire code.
    pub fn code(&self) -> i64 {
        use GuardianErrorCode::*;
        match self {
            ParseError => -32700,
            InvalidRequest => -32600,
            MethodNotFound => -32601,
            InvalidParams => -32602,

            BlockchainNotSupported => -32000,
            BubbleTerminated => -32001,
            PermissionDenied => -32002,
            AuthenticationFailure => -32003,
            MethodFailed => -32004,
            InternalError => -32005,
            InvalidContentId => -32006,
            SubscriptionTerminated => -32007,

            BubbleAlreadyExists => -32020,
            BubbleDoesNotExist => -32021,
            FileDoesNotExist => -32022,
            DirectoryAlreadyExists => -32023,
            InvalidOption => -32024,
            InternalServerError => -32025,
        }
    }

    /// Reconstructs a code from its numeric wire value, if recognized.
    pub fn from_code(code: i64) -> Option<Self> {
        use GuardianErrorCode::*;
        let all = [
            ParseError,
            InvalidRequest,
            MethodNotFound,
            InvalidParams,
            BlockchainNotSupported,
            BubbleTerminated,
            PermissionDenied,
            AuthenticationFailure,
            MethodFailed,
            InternalError,
            InvalidContentId,
            SubscriptionTerminated,
            BubbleAlreadyExists,
            BubbleDoesNotExist,
            FileDoesNotExist,
            DirectoryAlreadyExists,
            InvalidOption,
            InternalServerError,
        ];
        all.into_iter().find(|variant| variant.code() == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_band_has_stable_numeric_codes() {
        assert_eq!(GuardianErrorCode::BlockchainNotSupported.code(), -32000);
        assert_eq!(GuardianErrorCode::BubbleTerminated.code(), -32001);
        assert_eq!(GuardianErrorCode::PermissionDenied.code(), -32002);
        assert_eq!(GuardianErrorCode::AuthenticationFailure.code(), -32003);
        assert_eq!(GuardianErrorCode::MethodFailed.code(), -32004);
        assert_eq!(GuardianErrorCode::InternalError.code(), -32005);
        assert_eq!(GuardianErrorCode::InvalidContentId.code(), -32006);
        assert_eq!(GuardianErrorCode::SubscriptionTerminated.code(), -32007);
    }

    #[test]
    fn storage_band_has_stable_numeric_codes() {
        assert_eq!(GuardianErrorCode::BubbleAlreadyExists.code(), -32020);
        assert_eq!(GuardianErrorCode::BubbleDoesNotExist.code(), -32021);
        assert_eq!(GuardianErrorCode::FileDoesNotExist.code(), -32022);
        assert_eq!(GuardianErrorCode::DirectoryAlreadyExists.code(), -32023);
        assert_eq!(GuardianErrorCode::InvalidOption.code(), -32024);
        assert_eq!(GuardianErrorCode::InternalServerError.code(), -32025);
    }

    #[test]
    fn from_code_round_trips() {
        assert_eq!(
            GuardianErrorCode::from_code(GuardianErrorCode::PermissionDenied.code()),
            Some(GuardianErrorCode::PermissionDenied)
        );
        assert_eq!(GuardianErrorCode::from_code(1), None);
    }
}
