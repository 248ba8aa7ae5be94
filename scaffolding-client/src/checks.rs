use clap::ValueEnum;
use scaffolding_proto::{
    ClientSession, PlayerRegistration, ProfileKind, ScaffoldingError, ServerPort, SessionConfig,
    KIND_PING, KIND_PLAYER_PING, KIND_PLAYER_PROFILES_LIST, KIND_PROTOCOLS, KIND_SERVER_PORT,
    STATUS_UNKNOWN_KIND,
};
use tracing::warn;

pub const KIND_INVALID: &str = "c:invalid_protocol";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Check {
    Ping,
    Protocols,
    #[value(name = "server_port")]
    ServerPort,
    #[value(name = "player_ping")]
    PlayerPing,
    #[value(name = "player_profiles_list")]
    PlayerProfilesList,
    Invalid,
    All,
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub lines: Vec<String>,
}

impl CheckOutcome {
    fn pass(name: &str, lines: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            lines,
        }
    }

    fn fail(name: &str, err: &ScaffoldingError) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            lines: vec![err.to_string()],
        }
    }
}

/// Runs checks against a service, one session per check.
pub struct CheckRunner {
    session: SessionConfig,
    fingerprint: Vec<u8>,
    player: PlayerRegistration,
}

impl CheckRunner {
    pub fn new(session: SessionConfig, fingerprint: Vec<u8>, player: PlayerRegistration) -> Self {
        Self {
            session,
            fingerprint,
            player,
        }
    }

    pub fn run(&self, check: Check) -> Vec<CheckOutcome> {
        match check {
            Check::Ping => vec![self.check_ping()],
            Check::Protocols => vec![self.check_protocols()],
            Check::ServerPort => vec![self.check_server_port()],
            Check::PlayerPing => vec![self.check_player_ping(&self.player, "register")],
            Check::PlayerProfilesList => vec![self.check_profiles()],
            Check::Invalid => vec![self.check_invalid()],
            Check::All => {
                let updated = PlayerRegistration {
                    name: "UpdatedPlayer".to_string(),
                    ..self.player.clone()
                };
                vec![
                    self.check_ping(),
                    self.check_protocols(),
                    self.check_server_port(),
                    self.check_player_ping(&self.player, "register"),
                    self.check_player_ping(&updated, "update"),
                    self.check_profiles(),
                    self.check_invalid(),
                ]
            }
        }
    }

    /// Opens a session for one check; it is closed on return whatever the
    /// outcome.
    fn with_session<F>(&self, name: &str, check: F) -> CheckOutcome
    where
        F: FnOnce(&mut ClientSession) -> Result<Vec<String>, ScaffoldingError>,
    {
        let result =
            ClientSession::open(self.session.clone()).and_then(|mut session| check(&mut session));

        match result {
            Ok(lines) => CheckOutcome::pass(name, lines),
            Err(e) => {
                warn!("Check {} failed: {}", name, e);
                CheckOutcome::fail(name, &e)
            }
        }
    }

    fn check_ping(&self) -> CheckOutcome {
        self.with_session(KIND_PING, |session| {
            session.ping(&self.fingerprint)?;
            Ok(vec![format!(
                "fingerprint {} echoed",
                hex::encode(&self.fingerprint)
            )])
        })
    }

    fn check_protocols(&self) -> CheckOutcome {
        self.with_session(KIND_PROTOCOLS, |session| {
            let kinds = session.protocols()?;
            let mut lines = vec![format!("{} supported protocols:", kinds.len())];
            lines.extend(kinds.iter().map(|kind| format!("  - {}", kind)));
            Ok(lines)
        })
    }

    fn check_server_port(&self) -> CheckOutcome {
        self.with_session(KIND_SERVER_PORT, |session| {
            Ok(vec![match session.server_port()? {
                ServerPort::Ready(port) => format!("server port: {}", port),
                ServerPort::NotReady => "host is not ready yet (status 32)".to_string(),
            }])
        })
    }

    fn check_player_ping(&self, player: &PlayerRegistration, label: &str) -> CheckOutcome {
        let name = format!("{} ({})", KIND_PLAYER_PING, label);
        self.with_session(&name, |session| {
            session.player_ping(player)?;
            Ok(vec![format!(
                "registered {} [{}] via {}",
                player.name, player.machine_id, player.vendor
            )])
        })
    }

    fn check_profiles(&self) -> CheckOutcome {
        self.with_session(KIND_PLAYER_PROFILES_LIST, |session| {
            let profiles = session.player_profiles_list()?;
            let mut lines = vec![format!("{} players:", profiles.len())];
            for profile in profiles {
                let kind = match profile.kind {
                    ProfileKind::Host => "HOST",
                    ProfileKind::Guest => "GUEST",
                    ProfileKind::Local => "LOCAL",
                };
                lines.push(format!("  {} ({})", profile.name, kind));
                lines.push(format!("     machine id: {}", profile.machine_id));
                lines.push(format!("     vendor: {}", profile.vendor));
            }
            Ok(lines)
        })
    }

    /// Services may accept unknown kinds, so any complete response passes.
    fn check_invalid(&self) -> CheckOutcome {
        self.with_session(KIND_INVALID, |session| {
            let response = session.request(KIND_INVALID, &[])?;
            Ok(if response.status == STATUS_UNKNOWN_KIND {
                vec![
                    "rejected with status 255".to_string(),
                    format!("message: {}", response.text_lossy()),
                ]
            } else {
                vec![format!(
                    "service answered status {} for an unknown kind",
                    response.status
                )]
            })
        })
    }
}

/// Prints outcomes and a summary; returns true when every check passed.
pub fn report(outcomes: &[CheckOutcome]) -> bool {
    for outcome in outcomes {
        println!("\n=== {}", outcome.name);
        for line in &outcome.lines {
            println!("    {}", line);
        }
        println!("    [{}]", if outcome.passed { "PASS" } else { "FAIL" });
    }

    let passed = outcomes.iter().filter(|o| o.passed).count();
    println!("\nSummary: {}/{} passed", passed, outcomes.len());
    for outcome in outcomes {
        let mark = if outcome.passed { "PASS" } else { "FAIL" };
        println!("  {}  {}", mark, outcome.name);
    }

    passed == outcomes.len()
}
