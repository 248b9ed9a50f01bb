//! Fixed transaction exit-code table and the response envelope.
//!
//! A response payload is the JSON 2-tuple `[[code, human], data]` where
//! `data` is null or a JSON value. The code strings are wire constants;
//! clients match on them literally.

use serde_json::Value;

/// Every result code a response envelope can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    Ok,
    InvalidToken,
    InvalidCredentials,
    AccountNotFound,
    UsernameAlreadyUsed,
    InvalidPassword,
    ChatNotFound,
    NotChatOwner,
    InvalidParticipant,
    MessageNotFoundOrNotOwner,
    InvalidChatId,
    // The `_filed` spellings below are protocol constants.
    MessageEncryptionFiled,
    MessageDecryptionFiled,
    TokenNotOwner,
    InvalidTransactionCode,
    ServerOtherError,
}

impl ExitCode {
    /// The stable wire identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidToken => "invalid_token",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountNotFound => "account_not_found",
            Self::UsernameAlreadyUsed => "username_already_used",
            Self::InvalidPassword => "invalid_password",
            Self::ChatNotFound => "chat_not_found",
            Self::NotChatOwner => "not_chat_owner",
            Self::InvalidParticipant => "invalid_participant",
            Self::MessageNotFoundOrNotOwner => "message_not_found_or_not_owner",
            Self::InvalidChatId => "invalid_chat_id",
            Self::MessageEncryptionFiled => "message_encryption_filed",
            Self::MessageDecryptionFiled => "message_decryption_filed",
            Self::TokenNotOwner => "token_not_owner",
            Self::InvalidTransactionCode => "invalid_transaction_code",
            Self::ServerOtherError => "server_other_error",
        }
    }

    /// Human-readable companion string sent alongside the code.
    pub fn human(self) -> &'static str {
        match self {
            Self::Ok => "Success",
            Self::InvalidToken => "Session token is invalid or expired",
            Self::InvalidCredentials => "Credentials rejected",
            Self::AccountNotFound => "Account does not exist",
            Self::UsernameAlreadyUsed => "Username is already taken",
            Self::InvalidPassword => "Password is incorrect",
            Self::ChatNotFound => "Chat does not exist or is not visible",
            Self::NotChatOwner => "Operation requires chat ownership",
            Self::InvalidParticipant => "Participant account does not exist",
            Self::MessageNotFoundOrNotOwner => "Message does not exist or was sent by someone else",
            Self::InvalidChatId => "Invalid chat id",
            Self::MessageEncryptionFiled => "Message encryption failed",
            Self::MessageDecryptionFiled => "Message decryption failed",
            Self::TokenNotOwner => "Token belongs to another account",
            Self::InvalidTransactionCode => "Unknown transaction code",
            Self::ServerOtherError => "Internal server error",
        }
    }

    /// The `(code, human)` result tuple.
    pub fn as_pair(self) -> (&'static str, &'static str) {
        (self.as_str(), self.human())
    }
}

/// Serialize a `(result, data)` response envelope.
pub fn envelope(code: ExitCode, data: Option<Value>) -> Vec<u8> {
    serde_json::to_vec(&(code.as_pair(), data)).expect("envelope serialization")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_shape() {
        let bytes = envelope(ExitCode::Ok, None);
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v, json!([["ok", "Success"], null]));

        let bytes = envelope(ExitCode::InvalidToken, Some(json!({"x": 1})));
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v[0][0], "invalid_token");
        assert_eq!(v[1]["x"], 1);
    }

    #[test]
    fn wire_constants_are_stable() {
        // These strings are matched by deployed clients.
        assert_eq!(ExitCode::MessageEncryptionFiled.as_str(), "message_encryption_filed");
        assert_eq!(ExitCode::MessageDecryptionFiled.as_str(), "message_decryption_filed");
        assert_eq!(ExitCode::InvalidTransactionCode.as_str(), "invalid_transaction_code");
    }
}
