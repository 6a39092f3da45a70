//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from core types

use serde::Serialize;
use utoipa::ToSchema;
use waveband_core::{ActiveListener, StoredEvent};

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: String) -> Self {
        Self { ok: false, error }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OkBody {
    pub ok: bool,
}

impl OkBody {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// The shape of every coalescable write: `{ok}` when stored, plus
/// `ignored` when suppressed and `pushed` when fanned out live
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteBody {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pushed: Option<bool>,
}

impl WriteBody {
    pub fn stored() -> Self {
        Self {
            ok: true,
            ignored: None,
            pushed: None,
        }
    }

    pub fn ignored() -> Self {
        Self {
            ok: true,
            ignored: Some(true),
            pushed: None,
        }
    }

    pub fn pushed(pushed: bool) -> Self {
        Self {
            ok: true,
            ignored: None,
            pushed: Some(pushed),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceBody {
    pub ok: bool,
    pub exists: bool,
    pub in_game: bool,
    pub have_pass: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSessionBody {
    pub ok: bool,
    pub code: String,
    pub exp: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSessionBody {
    pub ok: bool,
    pub username: String,
    pub have_pass: bool,
    pub token: Option<String>,
    pub token_exp: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventsBody {
    pub ok: bool,
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<StoredEvent>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBody {
    pub ok: bool,
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub username: String,
    pub track_index: i64,
    pub track_name: String,
    pub position_sec: f64,
    pub is_playing: bool,
    pub muted: bool,
    pub last_seen_ms: u64,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T> {
    fn to_serialized(&self) -> T;
}

impl ToSerialized<Listener> for ActiveListener {
    fn to_serialized(&self) -> Listener {
        Listener {
            username: self.username.clone(),
            track_index: self.track_index,
            track_name: self.track_name.clone(),
            position_sec: self.position_sec,
            is_playing: self.is_playing,
            muted: self.muted,
            last_seen_ms: self.last_seen_ms,
        }
    }
}

impl<T, U> ToSerialized<Vec<U>> for Vec<T>
where
    T: ToSerialized<U>,
{
    fn to_serialized(&self) -> Vec<U> {
        self.iter().map(|item| item.to_serialized()).collect()
    }
}
