use chrono::{DateTime, Duration, Utc};
use scaffolding_proto::{PlayerProfile, PlayerRegistration, ProfileKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Players currently known to the stub, keyed by machine id
#[derive(Clone)]
pub struct PlayerDirectory {
    host: PlayerProfile,
    guests: Arc<RwLock<HashMap<String, GuestEntry>>>,
    ttl: Option<Duration>,
}

struct GuestEntry {
    profile: PlayerProfile,
    last_seen: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Upsert {
    Registered,
    Refreshed,
}

impl PlayerDirectory {
    /// A `ttl_secs` of 0 keeps guests forever.
    pub fn new(host: PlayerProfile, ttl_secs: u64) -> anyhow::Result<Self> {
        let ttl = match ttl_secs {
            0 => None,
            secs => Some(
                i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .ok_or_else(|| anyhow::anyhow!("player_ttl_secs out of range: {}", secs))?,
            ),
        };

        Ok(Self {
            host,
            guests: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        })
    }

    pub fn host(&self) -> &PlayerProfile {
        &self.host
    }

    /// Inserts or refreshes a guest. Repeated pings for one machine id
    /// replace the name and vendor.
    pub async fn upsert(&self, registration: PlayerRegistration) -> Upsert {
        self.upsert_at(registration, Utc::now()).await
    }

    async fn upsert_at(&self, registration: PlayerRegistration, now: DateTime<Utc>) -> Upsert {
        let mut guests = self.guests.write().await;

        let profile = PlayerProfile {
            name: registration.name,
            machine_id: registration.machine_id.clone(),
            vendor: registration.vendor,
            kind: ProfileKind::Guest,
        };

        let previous = guests.insert(
            registration.machine_id,
            GuestEntry {
                profile,
                last_seen: now,
            },
        );

        if previous.is_some() {
            Upsert::Refreshed
        } else {
            Upsert::Registered
        }
    }

    /// Host first, then live guests ordered by name
    pub async fn list(&self) -> Vec<PlayerProfile> {
        self.list_at(Utc::now()).await
    }

    async fn list_at(&self, now: DateTime<Utc>) -> Vec<PlayerProfile> {
        let mut guests = self.guests.write().await;

        if let Some(ttl) = self.ttl {
            let before = guests.len();
            guests.retain(|_, entry| now - entry.last_seen < ttl);
            if guests.len() < before {
                debug!("Dropped {} stale players", before - guests.len());
            }
        }

        let mut live: Vec<_> = guests.values().map(|entry| entry.profile.clone()).collect();
        live.sort_by(|a, b| a.name.cmp(&b.name));

        let mut profiles = Vec::with_capacity(live.len() + 1);
        profiles.push(self.host.clone());
        profiles.extend(live);
        profiles
    }
}
