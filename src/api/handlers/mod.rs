pub mod health;
pub mod metrics;
pub mod positions;
pub mod signals;
pub mod trades;
pub mod wallets;
pub mod webhooks;

use serde::Serialize;

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(e: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(e.to_string()),
        }
    }
}
