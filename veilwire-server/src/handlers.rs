//! Application transaction handlers.
//!
//! Every handler has the same shape: typed args in, serialized envelope
//! and response code out. Domain failures never escape as errors; they
//! become exit codes and the connection stays open.

use std::collections::HashMap;

use serde_json::json;
use veilwire_crypto::sha256;

use crate::dispatch::{Args, Handler};
use crate::exit_codes::{ExitCode, envelope};
use crate::storage::{AppStorage, StorageError};

/// The transaction table, keyed by lowercase code.
pub(crate) fn table() -> HashMap<&'static str, Handler> {
    HashMap::from([
        ("reg_account", reg_account as Handler),
        ("login", login as Handler),
        ("verify_token", verify_token as Handler),
        ("delete_token", delete_token as Handler),
        ("get_user_tokens", get_user_tokens as Handler),
        ("change_username", change_username as Handler),
        ("change_password", change_password as Handler),
        ("create_chat", create_chat as Handler),
        ("delete_chat", delete_chat as Handler),
        ("add_participant_to_chat", add_participant_to_chat as Handler),
        ("remove_participant_from_chat", remove_participant_from_chat as Handler),
        ("get_chat_by_id", get_chat_by_id as Handler),
        ("get_user_chats", get_user_chats as Handler),
        ("change_chat_name", change_chat_name as Handler),
        ("send_message", send_message as Handler),
        ("read_messages", read_messages as Handler),
        ("edit_message", edit_message as Handler),
        ("delete_message", delete_message as Handler),
    ])
}

fn password_hash(password: &str) -> String {
    hex::encode(sha256!(password.as_bytes()))
}

// Storage failures all collapse to one client-visible code.
fn internal(e: StorageError) -> ExitCode {
    tracing::error!("storage failure: {e}");
    ExitCode::ServerOtherError
}

// Token gate shared by every authenticated handler: invalid_token first,
// then account_not_found.
fn auth(stg: &AppStorage, args: &Args) -> Result<String, ExitCode> {
    let token = args.str_arg("token").ok_or(ExitCode::ServerOtherError)?;
    let username = stg
        .validate_token(&token)
        .map_err(internal)?
        .ok_or(ExitCode::InvalidToken)?;
    if !stg.user_exists(&username).map_err(internal)? {
        return Err(ExitCode::AccountNotFound);
    }
    Ok(username)
}

// ─── Accounts ────────────────────────────────────────────────────────────────

fn reg_account(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "REG_ACCOUNT:RESPONSE";
    let (Some(username), Some(password)) = (args.str_arg("username"), args.str_arg("password"))
    else {
        return (envelope(ExitCode::ServerOtherError, None), RESP.into());
    };

    let code = match stg.user_exists(&username) {
        Ok(true) => ExitCode::UsernameAlreadyUsed,
        Ok(false) => match stg.insert_user(&username, &password_hash(&password)) {
            Ok(()) => ExitCode::Ok,
            Err(e) => internal(e),
        },
        Err(e) => internal(e),
    };
    (envelope(code, None), RESP.into())
}

fn login(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "LOGIN:RESPONSE";
    let (Some(username), Some(password)) = (args.str_arg("username"), args.str_arg("password"))
    else {
        return (envelope(ExitCode::ServerOtherError, None), RESP.into());
    };

    match stg.user_exists(&username) {
        Ok(true) => {}
        Ok(false) => return (envelope(ExitCode::AccountNotFound, None), RESP.into()),
        Err(e) => return (envelope(internal(e), None), RESP.into()),
    }

    let hash = password_hash(&password);
    match stg.check_password(&username, &hash) {
        Ok(true) => {}
        Ok(false) => return (envelope(ExitCode::InvalidPassword, None), RESP.into()),
        Err(e) => return (envelope(internal(e), None), RESP.into()),
    }

    match stg.generate_token(&username, &hash) {
        Ok(Some(token)) => (
            envelope(ExitCode::Ok, Some(json!({"token": token}))),
            RESP.into(),
        ),
        Ok(None) => (envelope(ExitCode::InvalidCredentials, None), RESP.into()),
        Err(e) => (envelope(internal(e), None), RESP.into()),
    }
}

fn change_username(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    // Response code predates the transaction's rename; kept for clients.
    const RESP: &str = "CHANGE_NICKNAME:RESPONSE";
    let code = match auth(stg, args) {
        Err(code) => code,
        Ok(username) => match args.str_arg("new_username") {
            None => ExitCode::ServerOtherError,
            Some(new_username) => match stg.user_exists(&new_username) {
                Ok(true) => ExitCode::UsernameAlreadyUsed,
                Ok(false) => match stg.change_username(&username, &new_username) {
                    Ok(true) => ExitCode::Ok,
                    Ok(false) => ExitCode::ServerOtherError,
                    Err(e) => internal(e),
                },
                Err(e) => internal(e),
            },
        },
    };
    (envelope(code, None), RESP.into())
}

fn change_password(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "CHANGE_PASSWORD:RESPONSE";
    let code = match auth(stg, args) {
        Err(code) => code,
        Ok(username) => {
            let (Some(old), Some(new)) =
                (args.str_arg("old_password"), args.str_arg("new_password"))
            else {
                return (envelope(ExitCode::ServerOtherError, None), RESP.into());
            };
            match stg.check_password(&username, &password_hash(&old)) {
                Ok(false) => ExitCode::InvalidPassword,
                Ok(true) => match stg.change_password(&username, &password_hash(&new)) {
                    Ok(true) => ExitCode::Ok,
                    Ok(false) => ExitCode::ServerOtherError,
                    Err(e) => internal(e),
                },
                Err(e) => internal(e),
            }
        }
    };
    (envelope(code, None), RESP.into())
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

fn verify_token(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "VERIFY_TOKEN:RESPONSE";
    match auth(stg, args) {
        Ok(username) => (
            envelope(ExitCode::Ok, Some(json!({"username": username}))),
            RESP.into(),
        ),
        Err(code) => (envelope(code, None), RESP.into()),
    }
}

fn delete_token(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "DELETE_TOKEN:RESPONSE";
    let code = match auth(stg, args) {
        Err(code) => code,
        Ok(username) => match args.int_arg("r_token_id") {
            None => ExitCode::ServerOtherError,
            Some(t_id) => match stg.delete_token_by_id(t_id, &username) {
                Ok(true) => ExitCode::Ok,
                Ok(false) => ExitCode::TokenNotOwner,
                Err(e) => internal(e),
            },
        },
    };
    (envelope(code, None), RESP.into())
}

fn get_user_tokens(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "GET_USER_TOKENS:RESPONSE";
    match auth(stg, args) {
        Err(code) => (envelope(code, None), RESP.into()),
        Ok(username) => match stg.get_user_tokens(&username) {
            Ok(tokens) => (
                envelope(ExitCode::Ok, Some(json!({"tokens": tokens}))),
                RESP.into(),
            ),
            Err(e) => (envelope(internal(e), None), RESP.into()),
        },
    }
}

// ─── Chats ───────────────────────────────────────────────────────────────────

fn create_chat(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "CREATE_CHAT:RESPONSE";
    let username = match auth(stg, args) {
        Ok(u) => u,
        Err(code) => return (envelope(code, None), RESP.into()),
    };
    let Some(participants) = args.str_list_arg("participants") else {
        return (envelope(ExitCode::ServerOtherError, None), RESP.into());
    };

    for participant in &participants {
        match stg.user_exists(participant) {
            Ok(true) => {}
            Ok(false) => return (envelope(ExitCode::InvalidParticipant, None), RESP.into()),
            Err(e) => return (envelope(internal(e), None), RESP.into()),
        }
    }

    match stg.create_chat(&username, participants, args.str_arg("name")) {
        Ok(chat_id) => (
            envelope(ExitCode::Ok, Some(json!({"chat_id": chat_id}))),
            RESP.into(),
        ),
        Err(e) => (envelope(internal(e), None), RESP.into()),
    }
}

fn delete_chat(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "DELETE_CHAT:RESPONSE";
    let code = match auth(stg, args) {
        Err(code) => code,
        Ok(username) => match args.int_arg("chat_id") {
            None => ExitCode::ServerOtherError,
            Some(chat_id) => match stg.get_chat_by_id(chat_id, &username) {
                Ok(None) => ExitCode::ChatNotFound,
                Ok(Some(_)) => match stg.delete_chat(chat_id) {
                    Ok(true) => ExitCode::Ok,
                    Ok(false) => ExitCode::ChatNotFound,
                    Err(e) => internal(e),
                },
                Err(e) => internal(e),
            },
        },
    };
    (envelope(code, None), RESP.into())
}

// Owner-only membership change shared by add/remove.
fn change_membership(
    stg: &AppStorage,
    args: &Args,
    target_arg: &str,
    apply: fn(&AppStorage, i64, &str) -> Result<bool, StorageError>,
) -> ExitCode {
    let username = match auth(stg, args) {
        Ok(u) => u,
        Err(code) => return code,
    };
    let (Some(chat_id), Some(target)) = (args.int_arg("chat_id"), args.str_arg(target_arg)) else {
        return ExitCode::ServerOtherError;
    };
    match stg.get_chat_by_id(chat_id, &username) {
        Ok(None) => ExitCode::ChatNotFound,
        Ok(Some(chat)) if !chat.is_owner => ExitCode::NotChatOwner,
        Ok(Some(_)) => match stg.user_exists(&target) {
            Ok(false) => ExitCode::InvalidParticipant,
            Ok(true) => match apply(stg, chat_id, &target) {
                Ok(true) => ExitCode::Ok,
                Ok(false) => ExitCode::ChatNotFound,
                Err(e) => internal(e),
            },
            Err(e) => internal(e),
        },
        Err(e) => internal(e),
    }
}

fn add_participant_to_chat(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "ADD_PARTICIPANT_TO_CHAT:RESPONSE";
    let code = change_membership(stg, args, "username_to_add", AppStorage::add_participant_to_chat);
    (envelope(code, None), RESP.into())
}

fn remove_participant_from_chat(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "REMOVE_PARTICIPANT_FROM_CHAT:RESPONSE";
    let code = change_membership(
        stg,
        args,
        "username_to_remove",
        AppStorage::remove_participant_from_chat,
    );
    (envelope(code, None), RESP.into())
}

fn get_chat_by_id(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "GET_CHAT_BY_ID:RESPONSE";
    let username = match auth(stg, args) {
        Ok(u) => u,
        Err(code) => return (envelope(code, None), RESP.into()),
    };
    let Some(chat_id) = args.int_arg("chat_id") else {
        return (envelope(ExitCode::ServerOtherError, None), RESP.into());
    };
    match stg.get_chat_by_id(chat_id, &username) {
        Ok(Some(chat)) => match serde_json::to_value(&chat) {
            Ok(data) => (envelope(ExitCode::Ok, Some(data)), RESP.into()),
            Err(e) => {
                tracing::error!("chat serialization failed: {e}");
                (envelope(ExitCode::ServerOtherError, None), RESP.into())
            }
        },
        Ok(None) => (envelope(ExitCode::ChatNotFound, None), RESP.into()),
        Err(e) => (envelope(internal(e), None), RESP.into()),
    }
}

fn get_user_chats(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "GET_USER_CHATS:RESPONSE";
    match auth(stg, args) {
        Err(code) => (envelope(code, None), RESP.into()),
        Ok(username) => match stg.get_user_chats(&username) {
            Ok(chats) => (
                envelope(ExitCode::Ok, Some(json!({"chats": chats}))),
                RESP.into(),
            ),
            Err(e) => (envelope(internal(e), None), RESP.into()),
        },
    }
}

fn change_chat_name(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "CHANGE_CHAT_NAME:RESPONSE";
    let code = match auth(stg, args) {
        Err(code) => code,
        Ok(username) => {
            let (Some(chat_id), Some(new_name)) =
                (args.int_arg("chat_id"), args.str_arg("new_name"))
            else {
                return (envelope(ExitCode::ServerOtherError, None), RESP.into());
            };
            if new_name.trim().is_empty() {
                ExitCode::ServerOtherError
            } else {
                match stg.get_chat_by_id(chat_id, &username) {
                    Ok(None) => ExitCode::ChatNotFound,
                    Ok(Some(_)) => match stg.change_chat_name(chat_id, &new_name) {
                        Ok(true) => ExitCode::Ok,
                        Ok(false) => ExitCode::ChatNotFound,
                        Err(e) => internal(e),
                    },
                    Err(e) => internal(e),
                }
            }
        }
    };
    (envelope(code, None), RESP.into())
}

// ─── Messages ────────────────────────────────────────────────────────────────

fn send_message(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "SEND_MESSAGE_TOKEN:RESPONSE";
    let code = match auth(stg, args) {
        Err(code) => code,
        Ok(username) => {
            let (Some(chat_id), Some(payload)) = (args.int_arg("chat_id"), args.str_arg("payload"))
            else {
                return (envelope(ExitCode::ServerOtherError, None), RESP.into());
            };
            match stg.insert_message(&username, &payload, chat_id) {
                Ok(()) => ExitCode::Ok,
                Err(StorageError::InvalidChat | StorageError::EmptyPayload) => {
                    ExitCode::InvalidChatId
                }
                Err(e) => {
                    tracing::error!("message encryption failed: {e}");
                    ExitCode::MessageEncryptionFiled
                }
            }
        }
    };
    (envelope(code, None), RESP.into())
}

fn read_messages(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "READ_MESSAGES_TOKEN:RESPONSE";
    match auth(stg, args) {
        Err(code) => (envelope(code, None), RESP.into()),
        Ok(username) => match stg.messages_for_user(&username) {
            Ok(messages) => match serde_json::to_value(&messages) {
                Ok(data) => (envelope(ExitCode::Ok, Some(data)), RESP.into()),
                Err(e) => {
                    tracing::error!("message serialization failed: {e}");
                    (envelope(ExitCode::ServerOtherError, None), RESP.into())
                }
            },
            Err(e) => {
                tracing::error!("message retrieval failed: {e}");
                (envelope(ExitCode::MessageDecryptionFiled, None), RESP.into())
            }
        },
    }
}

fn edit_message(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "EDIT_MESSAGE:RESPONSE";
    let code = match auth(stg, args) {
        Err(code) => code,
        Ok(username) => {
            let (Some(m_id), Some(new_payload)) =
                (args.int_arg("m_id"), args.str_arg("new_payload"))
            else {
                return (envelope(ExitCode::ServerOtherError, None), RESP.into());
            };
            match stg.edit_message(m_id, &username, &new_payload) {
                Ok(true) => ExitCode::Ok,
                Ok(false) => ExitCode::MessageNotFoundOrNotOwner,
                Err(e) => {
                    tracing::error!("message edit failed: {e}");
                    ExitCode::MessageEncryptionFiled
                }
            }
        }
    };
    (envelope(code, None), RESP.into())
}

fn delete_message(stg: &AppStorage, args: &Args) -> (Vec<u8>, String) {
    const RESP: &str = "DELETE_MESSAGE:RESPONSE";
    let code = match auth(stg, args) {
        Err(code) => code,
        Ok(username) => match args.int_arg("m_id") {
            None => ExitCode::ServerOtherError,
            Some(m_id) => match stg.delete_message(m_id, &username) {
                Ok(true) => ExitCode::Ok,
                Ok(false) => ExitCode::MessageNotFoundOrNotOwner,
                Err(e) => internal(e),
            },
        },
    };
    (envelope(code, None), RESP.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::Value;

    use crate::dispatch::Dispatcher;

    fn setup() -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(AppStorage::open(dir.path()).unwrap());
        (dir, Dispatcher::new(storage))
    }

    fn call(d: &Dispatcher, code: &str, payload: Value) -> (Value, String) {
        let bytes = serde_json::to_vec(&payload).unwrap();
        let (body, resp) = d.dispatch(code, &bytes);
        (serde_json::from_slice(&body).unwrap(), resp)
    }

    fn result_code(v: &Value) -> &str {
        v[0][0].as_str().unwrap()
    }

    #[test]
    fn register_then_login() {
        let (_dir, d) = setup();

        let (v, resp) = call(&d, "REG_ACCOUNT", json!({"username": "alice", "password": "pw"}));
        assert_eq!(resp, "REG_ACCOUNT:RESPONSE");
        assert_eq!(result_code(&v), "ok");

        let (v, _) = call(&d, "REG_ACCOUNT", json!({"username": "alice", "password": "pw"}));
        assert_eq!(result_code(&v), "username_already_used");

        let (v, resp) = call(&d, "LOGIN", json!({"username": "alice", "password": "pw"}));
        assert_eq!(resp, "LOGIN:RESPONSE");
        assert_eq!(result_code(&v), "ok");
        assert!(v[1]["token"].is_string());

        let (v, _) = call(&d, "LOGIN", json!({"username": "alice", "password": "nope"}));
        assert_eq!(result_code(&v), "invalid_password");

        let (v, _) = call(&d, "LOGIN", json!({"username": "ghost", "password": "pw"}));
        assert_eq!(result_code(&v), "account_not_found");
    }

    #[test]
    fn token_verification() {
        let (_dir, d) = setup();
        call(&d, "REG_ACCOUNT", json!({"username": "alice", "password": "pw"}));
        let (v, _) = call(&d, "LOGIN", json!({"username": "alice", "password": "pw"}));
        let token = v[1]["token"].as_str().unwrap().to_owned();

        let (v, resp) = call(&d, "VERIFY_TOKEN", json!({"token": token}));
        assert_eq!(resp, "VERIFY_TOKEN:RESPONSE");
        assert_eq!(result_code(&v), "ok");
        assert_eq!(v[1]["username"], "alice");

        let (v, _) = call(&d, "VERIFY_TOKEN", json!({"token": "bogus"}));
        assert_eq!(result_code(&v), "invalid_token");
    }

    #[test]
    fn missing_arguments_are_soft() {
        let (_dir, d) = setup();
        let (v, resp) = call(&d, "REG_ACCOUNT", json!({"username": "alice"}));
        assert_eq!(resp, "REG_ACCOUNT:RESPONSE");
        assert_eq!(result_code(&v), "server_other_error");
    }

    #[test]
    fn chat_flow_with_membership_rules() {
        let (_dir, d) = setup();
        for user in ["alice", "bob", "carol"] {
            call(&d, "REG_ACCOUNT", json!({"username": user, "password": "pw"}));
        }
        let (v, _) = call(&d, "LOGIN", json!({"username": "alice", "password": "pw"}));
        let alice = v[1]["token"].as_str().unwrap().to_owned();
        let (v, _) = call(&d, "LOGIN", json!({"username": "bob", "password": "pw"}));
        let bob = v[1]["token"].as_str().unwrap().to_owned();

        let (v, _) = call(
            &d,
            "CREATE_CHAT",
            json!({"token": alice, "participants": ["bob"], "name": "pair"}),
        );
        assert_eq!(result_code(&v), "ok");
        let chat_id = v[1]["chat_id"].as_i64().unwrap();

        let (v, _) = call(
            &d,
            "CREATE_CHAT",
            json!({"token": alice, "participants": ["nobody"]}),
        );
        assert_eq!(result_code(&v), "invalid_participant");

        // Only the owner may change membership.
        let (v, _) = call(
            &d,
            "ADD_PARTICIPANT_TO_CHAT",
            json!({"token": bob, "chat_id": chat_id, "username_to_add": "carol"}),
        );
        assert_eq!(result_code(&v), "not_chat_owner");
        let (v, _) = call(
            &d,
            "ADD_PARTICIPANT_TO_CHAT",
            json!({"token": alice, "chat_id": chat_id, "username_to_add": "carol"}),
        );
        assert_eq!(result_code(&v), "ok");

        let (v, _) = call(&d, "GET_CHAT_BY_ID", json!({"token": bob, "chat_id": chat_id}));
        assert_eq!(result_code(&v), "ok");
        assert_eq!(v[1]["is_owner"], false);
        assert_eq!(v[1]["name"], "pair");

        let (v, _) = call(&d, "GET_CHAT_BY_ID", json!({"token": bob, "chat_id": 999}));
        assert_eq!(result_code(&v), "chat_not_found");
    }

    #[test]
    fn message_round_trip_through_handlers() {
        let (_dir, d) = setup();
        call(&d, "REG_ACCOUNT", json!({"username": "alice", "password": "pw"}));
        let (v, _) = call(&d, "LOGIN", json!({"username": "alice", "password": "pw"}));
        let token = v[1]["token"].as_str().unwrap().to_owned();

        let (v, _) = call(&d, "CREATE_CHAT", json!({"token": token, "participants": []}));
        let chat_id = v[1]["chat_id"].as_i64().unwrap();

        let (v, resp) = call(
            &d,
            "SEND_MESSAGE",
            json!({"token": token, "chat_id": chat_id, "payload": "hello"}),
        );
        assert_eq!(resp, "SEND_MESSAGE_TOKEN:RESPONSE");
        assert_eq!(result_code(&v), "ok");

        let (v, _) = call(
            &d,
            "SEND_MESSAGE",
            json!({"token": token, "chat_id": 999, "payload": "hello"}),
        );
        assert_eq!(result_code(&v), "invalid_chat_id");

        let (v, resp) = call(&d, "READ_MESSAGES", json!({"token": token}));
        assert_eq!(resp, "READ_MESSAGES_TOKEN:RESPONSE");
        assert_eq!(result_code(&v), "ok");
        let rows = v[1].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "hello");
        let m_id = rows[0][0].as_i64().unwrap();

        let (v, _) = call(
            &d,
            "EDIT_MESSAGE",
            json!({"token": token, "m_id": m_id, "new_payload": "edited"}),
        );
        assert_eq!(result_code(&v), "ok");
        let (v, _) = call(&d, "DELETE_MESSAGE", json!({"token": token, "m_id": m_id}));
        assert_eq!(result_code(&v), "ok");
        let (v, _) = call(&d, "DELETE_MESSAGE", json!({"token": token, "m_id": m_id}));
        assert_eq!(result_code(&v), "message_not_found_or_not_owner");
    }

    #[test]
    fn rename_and_password_change() {
        let (_dir, d) = setup();
        call(&d, "REG_ACCOUNT", json!({"username": "alice", "password": "pw"}));
        call(&d, "REG_ACCOUNT", json!({"username": "bob", "password": "pw"}));
        let (v, _) = call(&d, "LOGIN", json!({"username": "alice", "password": "pw"}));
        let token = v[1]["token"].as_str().unwrap().to_owned();

        let (v, resp) = call(
            &d,
            "CHANGE_USERNAME",
            json!({"token": token, "new_username": "bob"}),
        );
        assert_eq!(resp, "CHANGE_NICKNAME:RESPONSE");
        assert_eq!(result_code(&v), "username_already_used");

        let (v, _) = call(
            &d,
            "CHANGE_USERNAME",
            json!({"token": token, "new_username": "alicia"}),
        );
        assert_eq!(result_code(&v), "ok");

        let (v, _) = call(
            &d,
            "CHANGE_PASSWORD",
            json!({"token": token, "old_password": "wrong", "new_password": "pw2"}),
        );
        assert_eq!(result_code(&v), "invalid_password");
        let (v, _) = call(
            &d,
            "CHANGE_PASSWORD",
            json!({"token": token, "old_password": "pw", "new_password": "pw2"}),
        );
        assert_eq!(result_code(&v), "ok");

        let (v, _) = call(&d, "LOGIN", json!({"username": "alicia", "password": "pw2"}));
        assert_eq!(result_code(&v), "ok");
    }

    #[test]
    fn token_management() {
        let (_dir, d) = setup();
        call(&d, "REG_ACCOUNT", json!({"username": "alice", "password": "pw"}));
        let (v, _) = call(&d, "LOGIN", json!({"username": "alice", "password": "pw"}));
        let t1 = v[1]["token"].as_str().unwrap().to_owned();
        call(&d, "LOGIN", json!({"username": "alice", "password": "pw"}));

        let (v, _) = call(&d, "GET_USER_TOKENS", json!({"token": t1}));
        assert_eq!(result_code(&v), "ok");
        let tokens = v[1]["tokens"].as_array().unwrap();
        assert_eq!(tokens.len(), 2);
        let other_id = tokens[1]["t_id"].as_i64().unwrap();

        let (v, _) = call(
            &d,
            "DELETE_TOKEN",
            json!({"token": t1, "r_token_id": other_id}),
        );
        assert_eq!(result_code(&v), "ok");
        let (v, _) = call(
            &d,
            "DELETE_TOKEN",
            json!({"token": t1, "r_token_id": 777}),
        );
        assert_eq!(result_code(&v), "token_not_owner");
    }
}
