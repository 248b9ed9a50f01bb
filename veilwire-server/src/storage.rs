//! Application records over the sealed store.
//!
//! One store file (`stg_mas.stg`) holds four tables, each a CBOR list of
//! typed records: users, session tokens, chats, messages. Message
//! payloads get a second layer of encryption under a long-lived key kept
//! in `keys/crypt_messages_key.bin` next to the store, so reading the
//! table entry alone never exposes message text.

use std::fs;
use std::path::Path;

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use veilwire_crypto::{SealError, Sealer, gen_key};
use veilwire_store::{SealedStore, StoreError, Value};

const STORE_NAME: &str = "mas";

const USERS_TABLE: &str = "users_table";
const TOKENS_TABLE: &str = "tokens_table";
const CHATS_TABLE: &str = "chats_table";
const MESSAGES_TABLE: &str = "messages_table";

const MESSAGES_KEY_FILE: &str = "crypt_messages_key.bin";
const KEY_FILE_LEN: usize = 512;

/// Failures surfaced by the application storage.
#[derive(Debug)]
pub enum StorageError {
    Store(StoreError),
    Io(std::io::Error),
    /// A table entry decoded to an unexpected shape.
    Codec(String),
    /// Message sent to a chat the sender is not part of.
    InvalidChat,
    /// Empty message payload.
    EmptyPayload,
    Crypto(SealError),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "{e}"),
            Self::Io(e) => write!(f, "storage I/O error: {e}"),
            Self::Codec(e) => write!(f, "table decode error: {e}"),
            Self::InvalidChat => write!(f, "invalid chat id or sender not in chat"),
            Self::EmptyPayload => write!(f, "message payload cannot be empty"),
            Self::Crypto(e) => write!(f, "payload crypto error: {e}"),
        }
    }
}
impl std::error::Error for StorageError {}

impl From<StoreError> for StorageError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
impl From<SealError> for StorageError {
    fn from(e: SealError) -> Self {
        Self::Crypto(e)
    }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
    pub active: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenRecord {
    pub t_id: i64,
    pub token: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat_id: i64,
    pub name: Option<String>,
    pub owner: String,
    pub participants: Vec<String>,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: i64,
    pub sender: String,
    /// Sealed under the long-lived messages key, never plaintext.
    pub payload: Vec<u8>,
    pub chat_id: i64,
    pub created_at: String,
}

/// A chat as seen by one user.
#[derive(Clone, Debug, Serialize)]
pub struct ChatView {
    pub chat_id: i64,
    pub name: Option<String>,
    pub owner: String,
    pub participants: Vec<String>,
    pub created_at: String,
    pub is_owner: bool,
}

/// Decrypted message row: `(m_id, payload, sender, chat_id, chat_name, created_at)`.
pub type MessageView = (i64, String, String, i64, String, String);

/// Token metadata listed back to its owner.
#[derive(Clone, Debug, Serialize)]
pub struct TokenView {
    pub t_id: i64,
    pub token: String,
    pub created_at: String,
}

fn now_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ─── AppStorage ──────────────────────────────────────────────────────────────

/// The application's persistent state.
pub struct AppStorage {
    store: SealedStore,
    message_sealer: Sealer,
}

impl AppStorage {
    /// Open the store under `storage_dir`, ensure the tables and the
    /// messages key file exist.
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = storage_dir.as_ref();
        let store = SealedStore::open(dir, STORE_NAME)?;
        let key = ensure_message_key(&dir.join("keys"))?;

        let storage = Self { store, message_sealer: Sealer::new(key) };
        for table in [USERS_TABLE, TOKENS_TABLE, CHATS_TABLE, MESSAGES_TABLE] {
            storage.store.write_entry_if_absent(table, empty_table()?)?;
        }
        tracing::info!("storage '{STORE_NAME}' initialized");
        Ok(storage)
    }

    // ── Users ────────────────────────────────────────────────────────────

    pub fn user_exists(&self, username: &str) -> Result<bool, StorageError> {
        let users: Vec<UserRecord> = self.read_table(USERS_TABLE)?;
        Ok(users.iter().any(|u| u.username == username))
    }

    pub fn insert_user(&self, username: &str, password_hash: &str) -> Result<(), StorageError> {
        let mut users: Vec<UserRecord> = self.read_table(USERS_TABLE)?;
        users.push(UserRecord {
            user_id: next_id(users.last().map(|u| u.user_id)),
            username: username.to_owned(),
            password_hash: password_hash.to_owned(),
            created_at: now_stamp(),
            active: true,
        });
        self.write_table(USERS_TABLE, &users)
    }

    pub fn check_password(&self, username: &str, password_hash: &str) -> Result<bool, StorageError> {
        let users: Vec<UserRecord> = self.read_table(USERS_TABLE)?;
        Ok(users
            .iter()
            .any(|u| u.username == username && u.password_hash == password_hash))
    }

    /// Rename an account everywhere the old name is referenced.
    pub fn change_username(&self, old: &str, new: &str) -> Result<bool, StorageError> {
        let mut users: Vec<UserRecord> = self.read_table(USERS_TABLE)?;
        let Some(user) = users.iter_mut().find(|u| u.username == old) else {
            return Ok(false);
        };
        user.username = new.to_owned();
        self.write_table(USERS_TABLE, &users)?;

        let mut tokens: Vec<TokenRecord> = self.read_table(TOKENS_TABLE)?;
        for t in tokens.iter_mut().filter(|t| t.username == old) {
            t.username = new.to_owned();
        }
        self.write_table(TOKENS_TABLE, &tokens)?;

        let mut chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        for c in chats.iter_mut() {
            if c.owner == old {
                c.owner = new.to_owned();
            }
            for p in c.participants.iter_mut().filter(|p| p.as_str() == old) {
                *p = new.to_owned();
            }
        }
        self.write_table(CHATS_TABLE, &chats)?;

        let mut messages: Vec<MessageRecord> = self.read_table(MESSAGES_TABLE)?;
        for m in messages.iter_mut().filter(|m| m.sender == old) {
            m.sender = new.to_owned();
        }
        self.write_table(MESSAGES_TABLE, &messages)?;
        Ok(true)
    }

    pub fn change_password(&self, username: &str, new_hash: &str) -> Result<bool, StorageError> {
        let mut users: Vec<UserRecord> = self.read_table(USERS_TABLE)?;
        let Some(user) = users.iter_mut().find(|u| u.username == username) else {
            return Ok(false);
        };
        user.password_hash = new_hash.to_owned();
        self.write_table(USERS_TABLE, &users)?;
        Ok(true)
    }

    // ── Tokens ───────────────────────────────────────────────────────────

    /// Mint a session token; `None` when the credentials do not match.
    pub fn generate_token(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<String>, StorageError> {
        if !self.check_password(username, password_hash)? {
            return Ok(None);
        }
        let mut tokens: Vec<TokenRecord> = self.read_table(TOKENS_TABLE)?;
        let token = uuid::Uuid::new_v4().to_string();
        tokens.push(TokenRecord {
            t_id: next_id(tokens.last().map(|t| t.t_id)),
            token: token.clone(),
            username: username.to_owned(),
            created_at: now_stamp(),
        });
        self.write_table(TOKENS_TABLE, &tokens)?;
        Ok(Some(token))
    }

    /// Resolve a token to its owning username.
    pub fn validate_token(&self, token: &str) -> Result<Option<String>, StorageError> {
        let tokens: Vec<TokenRecord> = self.read_table(TOKENS_TABLE)?;
        Ok(tokens
            .iter()
            .find(|t| t.token == token)
            .map(|t| t.username.clone()))
    }

    /// Delete one of the caller's tokens by id. `false` when the id does
    /// not exist or belongs to another account.
    pub fn delete_token_by_id(&self, t_id: i64, username: &str) -> Result<bool, StorageError> {
        let mut tokens: Vec<TokenRecord> = self.read_table(TOKENS_TABLE)?;
        let before = tokens.len();
        tokens.retain(|t| !(t.t_id == t_id && t.username == username));
        if tokens.len() == before {
            return Ok(false);
        }
        self.write_table(TOKENS_TABLE, &tokens)?;
        Ok(true)
    }

    pub fn get_user_tokens(&self, username: &str) -> Result<Vec<TokenView>, StorageError> {
        let tokens: Vec<TokenRecord> = self.read_table(TOKENS_TABLE)?;
        Ok(tokens
            .into_iter()
            .filter(|t| t.username == username)
            .map(|t| TokenView { t_id: t.t_id, token: t.token, created_at: t.created_at })
            .collect())
    }

    // ── Chats ────────────────────────────────────────────────────────────

    pub fn create_chat(
        &self,
        owner: &str,
        participants: Vec<String>,
        name: Option<String>,
    ) -> Result<i64, StorageError> {
        let mut chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        let chat_id = next_id(chats.last().map(|c| c.chat_id));
        chats.push(ChatRecord {
            chat_id,
            name,
            owner: owner.to_owned(),
            participants,
            created_at: now_stamp(),
        });
        self.write_table(CHATS_TABLE, &chats)?;
        Ok(chat_id)
    }

    /// The chat as visible to `username`; `None` when it does not exist
    /// or the user is neither owner nor participant.
    pub fn get_chat_by_id(
        &self,
        chat_id: i64,
        username: &str,
    ) -> Result<Option<ChatView>, StorageError> {
        let chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        Ok(chats
            .into_iter()
            .find(|c| c.chat_id == chat_id && is_member(c, username))
            .map(|c| view_for(c, username)))
    }

    pub fn get_user_chats(&self, username: &str) -> Result<Vec<ChatView>, StorageError> {
        let chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        Ok(chats
            .into_iter()
            .filter(|c| is_member(c, username))
            .map(|c| view_for(c, username))
            .collect())
    }

    pub fn change_chat_name(&self, chat_id: i64, new_name: &str) -> Result<bool, StorageError> {
        let mut chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        let Some(chat) = chats.iter_mut().find(|c| c.chat_id == chat_id) else {
            return Ok(false);
        };
        chat.name = Some(new_name.to_owned());
        self.write_table(CHATS_TABLE, &chats)?;
        Ok(true)
    }

    pub fn add_participant_to_chat(
        &self,
        chat_id: i64,
        username: &str,
    ) -> Result<bool, StorageError> {
        let mut chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        let Some(chat) = chats.iter_mut().find(|c| c.chat_id == chat_id) else {
            return Ok(false);
        };
        if !chat.participants.iter().any(|p| p == username) {
            chat.participants.push(username.to_owned());
            self.write_table(CHATS_TABLE, &chats)?;
        }
        Ok(true)
    }

    pub fn remove_participant_from_chat(
        &self,
        chat_id: i64,
        username: &str,
    ) -> Result<bool, StorageError> {
        let mut chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        let Some(chat) = chats.iter_mut().find(|c| c.chat_id == chat_id) else {
            return Ok(false);
        };
        chat.participants.retain(|p| p != username);
        self.write_table(CHATS_TABLE, &chats)?;
        Ok(true)
    }

    /// Delete a chat and every message in it.
    pub fn delete_chat(&self, chat_id: i64) -> Result<bool, StorageError> {
        let mut chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        let before = chats.len();
        chats.retain(|c| c.chat_id != chat_id);
        if chats.len() == before {
            return Ok(false);
        }
        self.write_table(CHATS_TABLE, &chats)?;

        let mut messages: Vec<MessageRecord> = self.read_table(MESSAGES_TABLE)?;
        messages.retain(|m| m.chat_id != chat_id);
        self.write_table(MESSAGES_TABLE, &messages)?;
        Ok(true)
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Seal a message payload under the long-lived key and append it.
    pub fn insert_message(
        &self,
        sender: &str,
        payload: &str,
        chat_id: i64,
    ) -> Result<(), StorageError> {
        let chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        let member = chats
            .iter()
            .find(|c| c.chat_id == chat_id)
            .is_some_and(|c| is_member(c, sender));
        if !member {
            return Err(StorageError::InvalidChat);
        }
        if payload.trim().is_empty() {
            return Err(StorageError::EmptyPayload);
        }

        let sealed = self.message_sealer.seal(payload.as_bytes());
        let mut messages: Vec<MessageRecord> = self.read_table(MESSAGES_TABLE)?;
        messages.push(MessageRecord {
            message_id: next_id(messages.last().map(|m| m.message_id)),
            sender: sender.to_owned(),
            payload: sealed,
            chat_id,
            created_at: now_stamp(),
        });
        self.write_table(MESSAGES_TABLE, &messages)
    }

    /// Every message in the user's chats, decrypted. Records that fail
    /// to open are skipped, not fatal.
    pub fn messages_for_user(&self, username: &str) -> Result<Vec<MessageView>, StorageError> {
        let chats: Vec<ChatRecord> = self.read_table(CHATS_TABLE)?;
        let messages: Vec<MessageRecord> = self.read_table(MESSAGES_TABLE)?;

        let mut out = Vec::new();
        for m in messages {
            let Some(chat) = chats
                .iter()
                .find(|c| c.chat_id == m.chat_id && is_member(c, username))
            else {
                continue;
            };
            if m.payload.is_empty() {
                tracing::warn!("skipping message {}: empty payload", m.message_id);
                continue;
            }
            let plain = match self.message_sealer.open(&m.payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!("failed to decrypt message {}: {e}", m.message_id);
                    continue;
                }
            };
            let text = String::from_utf8_lossy(&plain).into_owned();
            out.push((
                m.message_id,
                text,
                m.sender,
                m.chat_id,
                chat.name.clone().unwrap_or_default(),
                m.created_at,
            ));
        }
        Ok(out)
    }

    /// Remove a message; only its sender may do so.
    pub fn delete_message(&self, message_id: i64, username: &str) -> Result<bool, StorageError> {
        let mut messages: Vec<MessageRecord> = self.read_table(MESSAGES_TABLE)?;
        let before = messages.len();
        messages.retain(|m| !(m.message_id == message_id && m.sender == username));
        if messages.len() == before {
            return Ok(false);
        }
        self.write_table(MESSAGES_TABLE, &messages)?;
        Ok(true)
    }

    /// Replace a message's payload; only its sender may do so.
    pub fn edit_message(
        &self,
        message_id: i64,
        username: &str,
        new_payload: &str,
    ) -> Result<bool, StorageError> {
        let mut messages: Vec<MessageRecord> = self.read_table(MESSAGES_TABLE)?;
        let Some(m) = messages
            .iter_mut()
            .find(|m| m.message_id == message_id && m.sender == username)
        else {
            return Ok(false);
        };
        m.payload = self.message_sealer.seal(new_payload.as_bytes());
        self.write_table(MESSAGES_TABLE, &messages)?;
        Ok(true)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn read_table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StorageError> {
        match self.store.read_entry(name)? {
            Some(value) => value
                .deserialized()
                .map_err(|e| StorageError::Codec(format!("{name}: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn write_table<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<(), StorageError> {
        let value = Value::serialized(&rows)
            .map_err(|e| StorageError::Codec(format!("{name}: {e}")))?;
        self.store.write_entry(name, value)?;
        Ok(())
    }
}

fn empty_table() -> Result<Value, StorageError> {
    Value::serialized(&Vec::<UserRecord>::new())
        .map_err(|e| StorageError::Codec(e.to_string()))
}

fn next_id(last: Option<i64>) -> i64 {
    last.map(|id| id + 1).unwrap_or(0)
}

fn is_member(chat: &ChatRecord, username: &str) -> bool {
    chat.owner == username || chat.participants.iter().any(|p| p == username)
}

fn view_for(chat: ChatRecord, username: &str) -> ChatView {
    let is_owner = chat.owner == username;
    ChatView {
        chat_id: chat.chat_id,
        name: chat.name,
        owner: chat.owner,
        participants: chat.participants,
        created_at: chat.created_at,
        is_owner,
    }
}

// Create the long-lived messages key on first run; regenerate undersized
// key files rather than limping along with weak material.
fn ensure_message_key(keys_dir: &Path) -> Result<Vec<u8>, StorageError> {
    fs::create_dir_all(keys_dir)?;
    let path = keys_dir.join(MESSAGES_KEY_FILE);
    if let Ok(existing) = fs::read(&path) {
        if existing.len() >= 32 {
            return Ok(existing);
        }
        tracing::warn!("key file {MESSAGES_KEY_FILE} is too short, regenerating");
    }
    let key = gen_key(KEY_FILE_LEN);
    fs::write(&path, &key)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, AppStorage) {
        let dir = tempfile::tempdir().unwrap();
        let stg = AppStorage::open(dir.path()).unwrap();
        (dir, stg)
    }

    #[test]
    fn account_lifecycle() {
        let (_dir, stg) = storage();
        assert!(!stg.user_exists("alice").unwrap());
        stg.insert_user("alice", "h1").unwrap();
        assert!(stg.user_exists("alice").unwrap());
        assert!(stg.check_password("alice", "h1").unwrap());
        assert!(!stg.check_password("alice", "h2").unwrap());

        assert!(stg.change_password("alice", "h2").unwrap());
        assert!(stg.check_password("alice", "h2").unwrap());
        assert!(!stg.change_password("nobody", "h").unwrap());
    }

    #[test]
    fn tokens_resolve_to_their_owner() {
        let (_dir, stg) = storage();
        stg.insert_user("alice", "h").unwrap();

        assert_eq!(stg.generate_token("alice", "wrong").unwrap(), None);
        let token = stg.generate_token("alice", "h").unwrap().unwrap();
        assert_eq!(stg.validate_token(&token).unwrap(), Some("alice".to_owned()));
        assert_eq!(stg.validate_token("bogus").unwrap(), None);

        let listed = stg.get_user_tokens("alice").unwrap();
        assert_eq!(listed.len(), 1);
        let t_id = listed[0].t_id;
        assert!(!stg.delete_token_by_id(t_id, "mallory").unwrap());
        assert!(stg.delete_token_by_id(t_id, "alice").unwrap());
        assert_eq!(stg.validate_token(&token).unwrap(), None);
    }

    #[test]
    fn rename_updates_every_reference() {
        let (_dir, stg) = storage();
        stg.insert_user("alice", "h").unwrap();
        stg.insert_user("bob", "h").unwrap();
        let token = stg.generate_token("alice", "h").unwrap().unwrap();
        let chat = stg.create_chat("alice", vec!["bob".into()], None).unwrap();
        stg.insert_message("alice", "hi", chat).unwrap();

        assert!(stg.change_username("alice", "alicia").unwrap());
        assert!(!stg.user_exists("alice").unwrap());
        assert_eq!(stg.validate_token(&token).unwrap(), Some("alicia".to_owned()));
        let view = stg.get_chat_by_id(chat, "alicia").unwrap().unwrap();
        assert!(view.is_owner);
        let msgs = stg.messages_for_user("alicia").unwrap();
        assert_eq!(msgs[0].2, "alicia");
    }

    #[test]
    fn chat_membership_gates_visibility() {
        let (_dir, stg) = storage();
        for u in ["alice", "bob", "carol"] {
            stg.insert_user(u, "h").unwrap();
        }
        let chat = stg
            .create_chat("alice", vec!["bob".into()], Some("pair".into()))
            .unwrap();

        assert!(stg.get_chat_by_id(chat, "alice").unwrap().unwrap().is_owner);
        assert!(!stg.get_chat_by_id(chat, "bob").unwrap().unwrap().is_owner);
        assert!(stg.get_chat_by_id(chat, "carol").unwrap().is_none());
        assert_eq!(stg.get_user_chats("carol").unwrap().len(), 0);

        stg.add_participant_to_chat(chat, "carol").unwrap();
        assert!(stg.get_chat_by_id(chat, "carol").unwrap().is_some());
        stg.remove_participant_from_chat(chat, "carol").unwrap();
        assert!(stg.get_chat_by_id(chat, "carol").unwrap().is_none());
    }

    #[test]
    fn messages_are_sealed_at_rest() {
        let (_dir, stg) = storage();
        stg.insert_user("alice", "h").unwrap();
        let chat = stg.create_chat("alice", vec![], None).unwrap();
        stg.insert_message("alice", "attack at dawn", chat).unwrap();

        let raw: Vec<MessageRecord> = stg.read_table(MESSAGES_TABLE).unwrap();
        let needle = b"attack at dawn";
        assert!(!raw[0].payload.windows(needle.len()).any(|w| w == needle));

        let msgs = stg.messages_for_user("alice").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].1, "attack at dawn");
    }

    #[test]
    fn message_guards() {
        let (_dir, stg) = storage();
        stg.insert_user("alice", "h").unwrap();
        stg.insert_user("eve", "h").unwrap();
        let chat = stg.create_chat("alice", vec![], None).unwrap();

        assert!(matches!(
            stg.insert_message("eve", "hi", chat),
            Err(StorageError::InvalidChat)
        ));
        assert!(matches!(
            stg.insert_message("alice", "hi", 999),
            Err(StorageError::InvalidChat)
        ));
        assert!(matches!(
            stg.insert_message("alice", "   ", chat),
            Err(StorageError::EmptyPayload)
        ));
    }

    #[test]
    fn edit_and_delete_are_sender_only() {
        let (_dir, stg) = storage();
        stg.insert_user("alice", "h").unwrap();
        stg.insert_user("bob", "h").unwrap();
        let chat = stg.create_chat("alice", vec!["bob".into()], None).unwrap();
        stg.insert_message("alice", "v1", chat).unwrap();
        let m_id = stg.messages_for_user("alice").unwrap()[0].0;

        assert!(!stg.edit_message(m_id, "bob", "v2").unwrap());
        assert!(stg.edit_message(m_id, "alice", "v2").unwrap());
        assert_eq!(stg.messages_for_user("bob").unwrap()[0].1, "v2");

        assert!(!stg.delete_message(m_id, "bob").unwrap());
        assert!(stg.delete_message(m_id, "alice").unwrap());
        assert!(stg.messages_for_user("alice").unwrap().is_empty());
    }

    #[test]
    fn delete_chat_cascades_to_messages() {
        let (_dir, stg) = storage();
        stg.insert_user("alice", "h").unwrap();
        let keep = stg.create_chat("alice", vec![], Some("keep".into())).unwrap();
        let doomed = stg.create_chat("alice", vec![], Some("doomed".into())).unwrap();
        stg.insert_message("alice", "stays", keep).unwrap();
        stg.insert_message("alice", "goes", doomed).unwrap();

        assert!(stg.delete_chat(doomed).unwrap());
        assert!(!stg.delete_chat(doomed).unwrap());
        let msgs = stg.messages_for_user("alice").unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].1, "stays");
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let stg = AppStorage::open(dir.path()).unwrap();
            stg.insert_user("alice", "h").unwrap();
            let chat = stg.create_chat("alice", vec![], Some("c".into())).unwrap();
            stg.insert_message("alice", "persisted", chat).unwrap();
        }
        let stg = AppStorage::open(dir.path()).unwrap();
        assert!(stg.user_exists("alice").unwrap());
        let msgs = stg.messages_for_user("alice").unwrap();
        assert_eq!(msgs[0].1, "persisted");
    }
}
