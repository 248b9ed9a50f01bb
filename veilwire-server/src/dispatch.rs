//! Transaction-code dispatch and response post-processing.
//!
//! The handler table is explicit: lowercase transaction code → function
//! of uniform shape `(storage, args) → (response bytes, response code)`.
//! The dispatcher owns the request-uuid convention: a `request_uuid`
//! found in the request map is removed before the handler runs and
//! injected back into the response data afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::exit_codes::{ExitCode, envelope};
use crate::handlers;
use crate::storage::AppStorage;

/// Decoded request arguments with typed accessors.
///
/// Accessors coerce the way the protocol's clients expect: scalars
/// stringify, numeric strings parse as integers.
pub struct Args(Map<String, Value>);

impl Args {
    pub(crate) fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn str_arg(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn int_arg(&self, name: &str) -> Option<i64> {
        match self.0.get(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn str_list_arg(&self, name: &str) -> Option<Vec<String>> {
        let Value::Array(items) = self.0.get(name)? else {
            return None;
        };
        items
            .iter()
            .map(|v| match v {
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Uniform handler shape: serialized envelope plus response code.
pub type Handler = fn(&AppStorage, &Args) -> (Vec<u8>, String);

const ERROR_RESPONSE: &str = "ERROR:RESPONSE";
const CONNECTION_TEST: &str = "CONNECTION_TEST";

/// Resolves transaction codes to handlers and frames their responses.
pub struct Dispatcher {
    storage: Arc<AppStorage>,
    handlers: HashMap<&'static str, Handler>,
}

impl Dispatcher {
    pub fn new(storage: Arc<AppStorage>) -> Self {
        Self { storage, handlers: handlers::table() }
    }

    /// Handle one decrypted request. Always produces a response; unknown
    /// codes and undecodable payloads are soft failures.
    pub fn dispatch(&self, trans_code: &str, payload: &[u8]) -> (Vec<u8>, String) {
        let mut request_uuid = None;
        let mut args = Map::new();
        if let Ok(Value::Object(mut obj)) = serde_json::from_slice::<Value>(payload) {
            if let Some(uuid) = obj.remove("request_uuid") {
                request_uuid = Some(uuid);
            }
            args = obj;
        }

        if trans_code == CONNECTION_TEST {
            let echoed = payload.to_vec();
            return (
                add_request_uuid(echoed, request_uuid),
                format!("{CONNECTION_TEST}:RESPONSE"),
            );
        }

        let (body, response_code) = match self.handlers.get(trans_code.to_lowercase().as_str()) {
            Some(handler) => handler(&self.storage, &Args::new(args)),
            None => (
                envelope(ExitCode::InvalidTransactionCode, None),
                ERROR_RESPONSE.to_owned(),
            ),
        };
        (add_request_uuid(body, request_uuid), response_code)
    }
}

/// Thread the request's uuid back into the response data.
///
/// The response must parse as the `(result, data)` 2-tuple; anything
/// else passes through untouched. `data` is normalized to a map first:
/// null becomes `{}`, a non-map value is wrapped as `{"data": value}`.
fn add_request_uuid(response: Vec<u8>, request_uuid: Option<Value>) -> Vec<u8> {
    let Some(uuid) = request_uuid else {
        return response;
    };
    let Ok(Value::Array(tuple)) = serde_json::from_slice::<Value>(&response) else {
        return response;
    };
    let Ok([result, data]) = <[Value; 2]>::try_from(tuple) else {
        return response;
    };

    let mut data = match data {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        scalar => Map::from_iter([("data".to_owned(), scalar)]),
    };
    data.insert("request_uuid".to_owned(), uuid);

    serde_json::to_vec(&Value::Array(vec![result, Value::Object(data)]))
        .expect("response re-serialization")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> (tempfile::TempDir, Dispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(AppStorage::open(dir.path()).unwrap());
        (dir, Dispatcher::new(storage))
    }

    fn parse(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn connection_test_echoes_payload() {
        let (_dir, d) = dispatcher();
        let payload = serde_json::to_vec(&json!({"hello": "world"})).unwrap();
        let (body, code) = d.dispatch("CONNECTION_TEST", &payload);
        assert_eq!(code, "CONNECTION_TEST:RESPONSE");
        assert_eq!(body, payload);
    }

    #[test]
    fn connection_test_keeps_request_uuid() {
        let (_dir, d) = dispatcher();
        let payload =
            serde_json::to_vec(&json!({"request_uuid": "u1", "hello": "world"})).unwrap();
        let (body, code) = d.dispatch("CONNECTION_TEST", &payload);
        assert_eq!(code, "CONNECTION_TEST:RESPONSE");
        // The echo is not an envelope, so the uuid step leaves it alone;
        // the original payload already carries the uuid.
        let v = parse(&body);
        assert_eq!(v["request_uuid"], "u1");
        assert_eq!(v["hello"], "world");
    }

    #[test]
    fn unknown_code_is_soft_error() {
        let (_dir, d) = dispatcher();
        let (body, code) = d.dispatch("NO_SUCH", b"{}");
        assert_eq!(code, "ERROR:RESPONSE");
        let v = parse(&body);
        assert_eq!(v[0][0], "invalid_transaction_code");
        assert_eq!(v[1], Value::Null);
    }

    #[test]
    fn unknown_code_with_uuid_gets_it_back() {
        let (_dir, d) = dispatcher();
        let payload = serde_json::to_vec(&json!({"request_uuid": "u7"})).unwrap();
        let (body, _) = d.dispatch("NO_SUCH", &payload);
        let v = parse(&body);
        assert_eq!(v[0][0], "invalid_transaction_code");
        assert_eq!(v[1]["request_uuid"], "u7");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let (_dir, d) = dispatcher();
        let payload = serde_json::to_vec(&json!({"username": "a", "password": "b"})).unwrap();
        let (body, code) = d.dispatch("Reg_Account", &payload);
        assert_eq!(code, "REG_ACCOUNT:RESPONSE");
        assert_eq!(parse(&body)[0][0], "ok");
    }

    #[test]
    fn garbage_payload_still_gets_a_response() {
        let (_dir, d) = dispatcher();
        let (body, code) = d.dispatch("NO_SUCH", b"\xff not json");
        assert_eq!(code, "ERROR:RESPONSE");
        assert_eq!(parse(&body)[0][0], "invalid_transaction_code");
    }

    #[test]
    fn uuid_normalizes_null_data() {
        let out = add_request_uuid(
            serde_json::to_vec(&json!([["ok", "Success"], null])).unwrap(),
            Some(json!("u1")),
        );
        let v = parse(&out);
        assert_eq!(v[1], json!({"request_uuid": "u1"}));
    }

    #[test]
    fn uuid_wraps_non_map_data() {
        let out = add_request_uuid(
            serde_json::to_vec(&json!([["ok", "Success"], [1, 2, 3]])).unwrap(),
            Some(json!("u1")),
        );
        let v = parse(&out);
        assert_eq!(v[1]["data"], json!([1, 2, 3]));
        assert_eq!(v[1]["request_uuid"], "u1");
    }

    #[test]
    fn uuid_leaves_unparseable_response_alone() {
        let raw = b"not an envelope".to_vec();
        assert_eq!(add_request_uuid(raw.clone(), Some(json!("u1"))), raw);

        let not_a_pair = serde_json::to_vec(&json!([1, 2, 3])).unwrap();
        assert_eq!(
            add_request_uuid(not_a_pair.clone(), Some(json!("u1"))),
            not_a_pair
        );
    }

    #[test]
    fn no_uuid_means_untouched_response() {
        let raw = serde_json::to_vec(&json!([["ok", "Success"], null])).unwrap();
        assert_eq!(add_request_uuid(raw.clone(), None), raw);
    }

    #[test]
    fn args_accessors_coerce() {
        let map = json!({
            "name": "alice",
            "n": 42,
            "n_str": "17",
            "list": ["a", "b"],
            "bad_list": ["a", 1],
        });
        let Value::Object(map) = map else { unreachable!() };
        let args = Args::new(map);

        assert_eq!(args.str_arg("name").as_deref(), Some("alice"));
        assert_eq!(args.str_arg("n").as_deref(), Some("42"));
        assert_eq!(args.str_arg("missing"), None);
        assert_eq!(args.int_arg("n"), Some(42));
        assert_eq!(args.int_arg("n_str"), Some(17));
        assert_eq!(args.int_arg("name"), None);
        assert_eq!(args.str_list_arg("list").unwrap(), vec!["a", "b"]);
        assert_eq!(args.str_list_arg("bad_list"), None);
    }
}
