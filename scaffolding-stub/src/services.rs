use crate::config::{HostSettings, KindEncoding};
use crate::directory::{PlayerDirectory, Upsert};
use scaffolding_proto::{
    PlayerProfile, PlayerRegistration, Response, KIND_PING, KIND_PLAYER_PING,
    KIND_PLAYER_PROFILES_LIST, KIND_PROTOCOLS, KIND_SERVER_PORT, STATUS_NOT_READY, STATUS_OK,
    STATUS_UNKNOWN_KIND,
};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Returned when a `c:player_ping` body cannot be used
pub const STATUS_INVALID_PLAYER: u8 = 1;

/// Kinds answered by the stub, in the order `c:protocols` lists them
pub const SUPPORTED_KINDS: [&str; 5] = [
    KIND_PING,
    KIND_PROTOCOLS,
    KIND_SERVER_PORT,
    KIND_PLAYER_PING,
    KIND_PLAYER_PROFILES_LIST,
];

/// State shared by every connection
pub struct ServiceContext {
    pub host: HostSettings,
    pub directory: PlayerDirectory,
    pub kind_encoding: KindEncoding,
}

/// Answers one request
pub async fn dispatch(kind: &str, body: &[u8], ctx: &ServiceContext) -> Response {
    debug!("Dispatching {} with {} byte body", kind, body.len());

    match kind {
        KIND_PING => Response::new(STATUS_OK, body.to_vec()),
        KIND_PROTOCOLS => Response::new(STATUS_OK, SUPPORTED_KINDS.join("\0").into_bytes()),
        KIND_SERVER_PORT => server_port(&ctx.host),
        KIND_PLAYER_PING => player_ping(body, &ctx.directory).await,
        KIND_PLAYER_PROFILES_LIST => {
            let profiles = ctx.directory.list().await;
            profiles_list(&profiles, ctx.kind_encoding)
        }
        _ => Response::new(
            STATUS_UNKNOWN_KIND,
            format!("Unknown protocol: {}", kind).into_bytes(),
        ),
    }
}

fn server_port(host: &HostSettings) -> Response {
    if host.ready {
        Response::new(STATUS_OK, host.server_port.to_be_bytes().to_vec())
    } else {
        Response::new(STATUS_NOT_READY, Vec::new())
    }
}

async fn player_ping(body: &[u8], directory: &PlayerDirectory) -> Response {
    let registration: PlayerRegistration = match serde_json::from_slice(body) {
        Ok(registration) => registration,
        Err(e) => {
            return Response::new(
                STATUS_INVALID_PLAYER,
                format!("Invalid player: {}", e).into_bytes(),
            );
        }
    };

    if registration.machine_id.is_empty() {
        return Response::new(STATUS_INVALID_PLAYER, b"Invalid player: empty machine_id".to_vec());
    }

    if registration.machine_id == directory.host().machine_id {
        return Response::new(
            STATUS_INVALID_PLAYER,
            b"Invalid player: machine_id belongs to the host".to_vec(),
        );
    }

    let name = registration.name.clone();
    match directory.upsert(registration).await {
        Upsert::Registered => info!("Player {} joined", name),
        Upsert::Refreshed => debug!("Player {} refreshed", name),
    }

    Response::new(STATUS_OK, Vec::new())
}

fn profiles_list(profiles: &[PlayerProfile], encoding: KindEncoding) -> Response {
    let entries: Vec<Value> = profiles
        .iter()
        .map(|profile| {
            let kind = match encoding {
                KindEncoding::Bare => json!(profile.kind),
                KindEncoding::Wrapped => json!({ "Value": profile.kind }),
            };
            json!({
                "name": profile.name,
                "machine_id": profile.machine_id,
                "vendor": profile.vendor,
                "kind": kind,
            })
        })
        .collect();

    Response::new(STATUS_OK, Value::Array(entries).to_string().into_bytes())
}
