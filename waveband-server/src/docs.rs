use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipauto::utoipauto;

#[utoipauto(paths = "./waveband-server/src")]
#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    info(
        description = "waveband-server bridges game-server presence and browser radio clients"
    ))
]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            components.add_security_scheme(
                "RadioToken",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-radio-token"))),
            );
            components.add_security_scheme(
                "ServerKey",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-roblox-key"))),
            );
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
