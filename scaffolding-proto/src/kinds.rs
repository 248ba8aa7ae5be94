use crate::framing::{Response, STATUS_NOT_READY, STATUS_OK, STATUS_UNKNOWN_KIND};
use crate::{Result, ScaffoldingError};
use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub const KIND_PING: &str = "c:ping";
pub const KIND_PROTOCOLS: &str = "c:protocols";
pub const KIND_SERVER_PORT: &str = "c:server_port";
pub const KIND_PLAYER_PING: &str = "c:player_ping";
pub const KIND_PLAYER_PROFILES_LIST: &str = "c:player_profiles_list";

/// Fingerprint echoed by `c:ping` in the reference check tool
pub const PING_FINGERPRINT: [u8; 16] = [
    0x41, 0x57, 0x50, 0x48, 0x86, 0x37, 0x40, 0x59, 0x57, 0x44, 0x92, 0x43, 0x96, 0x99, 0x85, 0x01,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProfileKind {
    Host,
    Guest,
    Local,
}

/// A player as reported by `c:player_profiles_list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub machine_id: String,
    pub vendor: String,
    #[serde(deserialize_with = "deserialize_profile_kind")]
    pub kind: ProfileKind,
}

/// Body of `c:player_ping`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRegistration {
    pub name: String,
    pub machine_id: String,
    pub vendor: String,
}

impl PlayerRegistration {
    pub fn new(name: impl Into<String>, machine_id: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            machine_id: machine_id.into(),
            vendor: vendor.into(),
        }
    }

    pub fn to_body(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ScaffoldingError::Encoding(format!("player registration: {}", e)))
    }
}

/// Services emit the profile kind either as `"HOST"` or as
/// `{"Value":"HOST"}`. The bare form is tried first.
fn deserialize_profile_kind<'de, D>(deserializer: D) -> std::result::Result<ProfileKind, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KindRepr {
        Bare(ProfileKind),
        Wrapped {
            #[serde(rename = "Value")]
            value: ProfileKind,
        },
    }

    Ok(match KindRepr::deserialize(deserializer)? {
        KindRepr::Bare(kind) => kind,
        KindRepr::Wrapped { value } => value,
    })
}

/// Generates a random machine id as 32 hex characters
pub fn generate_machine_id() -> String {
    let mut rng = rand::thread_rng();
    let id: [u8; 16] = rng.gen();
    hex::encode(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPort {
    Ready(u16),
    /// The host has not reached its ready state yet
    NotReady,
}

/// A decoded response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ping(Bytes),
    Protocols(Vec<String>),
    ServerPort(ServerPort),
    PlayerPing,
    PlayerProfiles(Vec<PlayerProfile>),
    /// Status 0 for a kind the registry does not know
    Raw(Bytes),
}

/// True when a `c:ping` reply echoes the fingerprint byte for byte
pub fn ping_matches(sent: &[u8], received: &[u8]) -> bool {
    sent == received
}

type DecodeFn = fn(&Response) -> Result<Reply>;
type ValidateFn = fn(&[u8]) -> Result<()>;

struct KindEntry {
    decode: DecodeFn,
    validate: Option<ValidateFn>,
    /// Non-zero statuses the decoder handles itself
    accepted_statuses: &'static [u8],
}

/// Maps kind names to payload decoders and request body checks.
pub struct ProtocolRegistry {
    kinds: HashMap<&'static str, KindEntry>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        kind: &'static str,
        decode: DecodeFn,
        validate: Option<ValidateFn>,
        accepted_statuses: &'static [u8],
    ) {
        self.kinds.insert(
            kind,
            KindEntry {
                decode,
                validate,
                accepted_statuses,
            },
        );
    }

    pub fn is_known(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Known kind names, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.kinds.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Checks a request body before it is sent. Unknown kinds pass; the
    /// service decides whether it supports them.
    pub fn validate_body(&self, kind: &str, body: &[u8]) -> Result<()> {
        match self.kinds.get(kind).and_then(|entry| entry.validate) {
            Some(validate) => validate(body),
            None => Ok(()),
        }
    }

    pub fn decode(&self, kind: &str, response: &Response) -> Result<Reply> {
        if response.status == STATUS_UNKNOWN_KIND {
            return Err(ScaffoldingError::UnsupportedKind {
                kind: kind.to_string(),
                message: response.text_lossy(),
            });
        }

        let Some(entry) = self.kinds.get(kind) else {
            if response.status == STATUS_OK {
                debug!("Returning raw payload for unregistered kind {}", kind);
                return Ok(Reply::Raw(response.data.clone()));
            }
            return Err(rejected(kind, response));
        };

        if response.status != STATUS_OK && !entry.accepted_statuses.contains(&response.status) {
            return Err(rejected(kind, response));
        }

        (entry.decode)(response)
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(KIND_PING, decode_ping, None, &[]);
        registry.register(KIND_PROTOCOLS, decode_protocols, None, &[]);
        registry.register(KIND_SERVER_PORT, decode_server_port, None, &[STATUS_NOT_READY]);
        registry.register(KIND_PLAYER_PING, decode_player_ping, Some(validate_player_ping), &[]);
        registry.register(KIND_PLAYER_PROFILES_LIST, decode_player_profiles, None, &[]);
        registry
    }
}

fn rejected(kind: &str, response: &Response) -> ScaffoldingError {
    ScaffoldingError::Rejected {
        kind: kind.to_string(),
        status: response.status,
        message: response.text_lossy(),
    }
}

fn utf8(data: &Bytes) -> Result<String> {
    Ok(String::from_utf8(data.to_vec())?)
}

fn decode_ping(response: &Response) -> Result<Reply> {
    Ok(Reply::Ping(response.data.clone()))
}

fn decode_protocols(response: &Response) -> Result<Reply> {
    let text = utf8(&response.data)?;
    let kinds = text
        .split('\0')
        .filter(|kind| !kind.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Reply::Protocols(kinds))
}

fn decode_server_port(response: &Response) -> Result<Reply> {
    if response.status == STATUS_NOT_READY {
        return Ok(Reply::ServerPort(ServerPort::NotReady));
    }

    match response.data.get(..2) {
        Some(&[hi, lo]) => Ok(Reply::ServerPort(ServerPort::Ready(u16::from_be_bytes([hi, lo])))),
        _ => Err(ScaffoldingError::Protocol(format!(
            "{} payload is {} bytes, need 2",
            KIND_SERVER_PORT,
            response.data.len()
        ))),
    }
}

fn decode_player_ping(response: &Response) -> Result<Reply> {
    if !response.data.is_empty() {
        debug!("Ignoring {} bytes after successful player ping", response.data.len());
    }
    Ok(Reply::PlayerPing)
}

fn decode_player_profiles(response: &Response) -> Result<Reply> {
    let text = utf8(&response.data)?;
    let profiles: Vec<PlayerProfile> = serde_json::from_str(&text)?;
    Ok(Reply::PlayerProfiles(profiles))
}

fn validate_player_ping(body: &[u8]) -> Result<()> {
    serde_json::from_slice::<PlayerRegistration>(body)
        .map(|_| ())
        .map_err(|e| ScaffoldingError::Encoding(format!("{} body: {}", KIND_PLAYER_PING, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(data: &'static [u8]) -> Response {
        Response::new(STATUS_OK, data)
    }

    #[test]
    fn test_generate_machine_id() {
        let id1 = generate_machine_id();
        let id2 = generate_machine_id();

        assert_eq!(id1.len(), 32);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_fingerprint_constant() {
        assert_eq!(hex::encode(PING_FINGERPRINT), "41575048863740595744924396998501");
    }

    #[test]
    fn test_ping_echo() {
        let registry = ProtocolRegistry::default();
        let reply = registry
            .decode(KIND_PING, &Response::new(STATUS_OK, PING_FINGERPRINT.to_vec()))
            .unwrap();

        match reply {
            Reply::Ping(data) => assert!(ping_matches(&PING_FINGERPRINT, &data)),
            other => panic!("unexpected reply: {:?}", other),
        }
        assert!(!ping_matches(&PING_FINGERPRINT, &PING_FINGERPRINT[..15]));
    }

    #[test]
    fn test_protocols_split_in_order() {
        let registry = ProtocolRegistry::default();
        let reply = registry
            .decode(KIND_PROTOCOLS, &ok(b"c:ping\0c:protocols\0c:server_port"))
            .unwrap();

        assert_eq!(
            reply,
            Reply::Protocols(vec![
                "c:ping".to_string(),
                "c:protocols".to_string(),
                "c:server_port".to_string(),
            ])
        );
    }

    #[test]
    fn test_protocols_invalid_utf8() {
        let registry = ProtocolRegistry::default();
        let result = registry.decode(KIND_PROTOCOLS, &ok(&[0xff, 0xfe]));

        assert!(matches!(result, Err(ScaffoldingError::Decode(_))));
    }

    #[test]
    fn test_server_port_ready_and_not_ready() {
        let registry = ProtocolRegistry::default();

        let ready = registry.decode(KIND_SERVER_PORT, &ok(&[0x63, 0xDD])).unwrap();
        assert_eq!(ready, Reply::ServerPort(ServerPort::Ready(25565)));

        let waiting = registry
            .decode(KIND_SERVER_PORT, &Response::new(STATUS_NOT_READY, Bytes::new()))
            .unwrap();
        assert_eq!(waiting, Reply::ServerPort(ServerPort::NotReady));
    }

    #[test]
    fn test_server_port_short_payload() {
        let registry = ProtocolRegistry::default();
        let result = registry.decode(KIND_SERVER_PORT, &ok(&[0x63]));

        assert!(matches!(result, Err(ScaffoldingError::Protocol(_))));
    }

    #[test]
    fn test_server_port_other_status_rejected() {
        let registry = ProtocolRegistry::default();
        let result = registry.decode(KIND_SERVER_PORT, &Response::new(1, &b"down"[..]));

        assert!(matches!(
            result,
            Err(ScaffoldingError::Rejected { status: 1, .. })
        ));
    }

    #[test]
    fn test_not_ready_only_special_for_server_port() {
        let registry = ProtocolRegistry::default();
        let result = registry.decode(KIND_PROTOCOLS, &Response::new(STATUS_NOT_READY, Bytes::new()));

        assert!(matches!(
            result,
            Err(ScaffoldingError::Rejected { status: 32, .. })
        ));
    }

    #[test]
    fn test_profile_kind_both_encodings() {
        let json = br#"[
            {"name":"Alice","machine_id":"0123456789abcdef0123456789abcdef","vendor":"Launcher","kind":"HOST"},
            {"name":"Bob","machine_id":"fedcba9876543210fedcba9876543210","vendor":"Launcher","kind":{"Value":"HOST"}},
            {"name":"Carol","machine_id":"00000000000000000000000000000000","vendor":"Other","kind":{"Value":"GUEST"}}
        ]"#;

        let registry = ProtocolRegistry::default();
        let reply = registry.decode(KIND_PLAYER_PROFILES_LIST, &ok(json)).unwrap();

        let Reply::PlayerProfiles(profiles) = reply else {
            panic!("expected profiles");
        };
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[0].kind, ProfileKind::Host);
        assert_eq!(profiles[1].kind, ProfileKind::Host);
        assert_eq!(profiles[2].kind, ProfileKind::Guest);
        assert_eq!(profiles[1].name, "Bob");
    }

    #[test]
    fn test_profile_kind_unknown_value() {
        let json = br#"[{"name":"A","machine_id":"x","vendor":"v","kind":{"Other":"HOST"}}]"#;
        let registry = ProtocolRegistry::default();

        assert!(matches!(
            registry.decode(KIND_PLAYER_PROFILES_LIST, &ok(json)),
            Err(ScaffoldingError::Decode(_))
        ));
    }

    #[test]
    fn test_profiles_not_json() {
        let registry = ProtocolRegistry::default();

        assert!(matches!(
            registry.decode(KIND_PLAYER_PROFILES_LIST, &ok(b"not json")),
            Err(ScaffoldingError::Decode(_))
        ));
    }

    #[test]
    fn test_profile_serializes_bare_kind() {
        let profile = PlayerProfile {
            name: "Host".to_string(),
            machine_id: "m".to_string(),
            vendor: "v".to_string(),
            kind: ProfileKind::Local,
        };

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["kind"], "LOCAL");
    }

    #[test]
    fn test_unknown_status_255() {
        let registry = ProtocolRegistry::default();
        let result = registry.decode(
            "c:invalid_protocol",
            &Response::new(STATUS_UNKNOWN_KIND, &b"unknown protocol"[..]),
        );

        match result {
            Err(ScaffoldingError::UnsupportedKind { kind, message }) => {
                assert_eq!(kind, "c:invalid_protocol");
                assert_eq!(message, "unknown protocol");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_kind_returns_raw() {
        let registry = ProtocolRegistry::default();
        let reply = registry.decode("x:custom", &ok(b"\x01\x02")).unwrap();

        assert_eq!(reply, Reply::Raw(Bytes::from_static(b"\x01\x02")));
    }

    #[test]
    fn test_player_ping_error_text() {
        let registry = ProtocolRegistry::default();
        let result = registry.decode(KIND_PLAYER_PING, &Response::new(2, &b"bad machine id"[..]));

        match result {
            Err(ScaffoldingError::Rejected { status, message, .. }) => {
                assert_eq!(status, 2);
                assert_eq!(message, "bad machine id");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_player_ping_body_validation() {
        let registry = ProtocolRegistry::default();
        let body = PlayerRegistration::new("TestPlayer", "0123456789abcdef0123456789abcdef", "Test")
            .to_body()
            .unwrap();

        assert!(registry.validate_body(KIND_PLAYER_PING, &body).is_ok());
        assert!(matches!(
            registry.validate_body(KIND_PLAYER_PING, b"{\"name\":1}"),
            Err(ScaffoldingError::Encoding(_))
        ));
        assert!(registry.validate_body("x:custom", b"anything").is_ok());
    }

    #[test]
    fn test_default_registry_kinds() {
        let registry = ProtocolRegistry::default();

        assert_eq!(
            registry.kinds(),
            vec![
                KIND_PING,
                KIND_PLAYER_PING,
                KIND_PLAYER_PROFILES_LIST,
                KIND_PROTOCOLS,
                KIND_SERVER_PORT,
            ]
        );
        assert!(!registry.is_known("c:invalid_protocol"));
    }
}
