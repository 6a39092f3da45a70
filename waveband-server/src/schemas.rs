use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PresenceSchema {
    #[validate(length(min = 1, max = 128))]
    pub username: Option<String>,
    pub in_game: Option<bool>,
    pub have_pass: Option<bool>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateSessionSchema {
    #[validate(length(min = 1, max = 128))]
    pub username: Option<String>,
    pub have_pass: Option<bool>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VerifySessionSchema {
    #[validate(length(min = 1, max = 16))]
    pub code: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JoinSchema {
    #[validate(length(min = 1, max = 128))]
    pub username: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MuteSchema {
    #[validate(length(min = 1, max = 128))]
    pub username: Option<String>,
    pub muted: Option<bool>,
    pub token: Option<String>,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StateSchema {
    #[validate(length(min = 1, max = 128))]
    pub username: Option<String>,
    pub track_index: Option<i64>,
    #[validate(length(max = 256))]
    pub track_name: Option<String>,
    pub position_sec: Option<f64>,
    pub is_playing: Option<bool>,
    pub muted: Option<bool>,
    pub token: Option<String>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| ServerError::BadRequest("invalid_json"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| ServerError::BadRequest("invalid_body"))?;

        Ok(Self(extracted_json.0))
    }
}
