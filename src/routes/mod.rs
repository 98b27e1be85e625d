/**
 * Routes Module
 * API route handlers
 */

pub mod accounts;
pub mod auth;
pub mod demandas;
pub mod feedback;
pub mod health;
pub mod offers;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::marketplace::SearchTerm;
use crate::state::AppState;

/// `?search=` query string of the list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

impl SearchQuery {
    pub fn term(&self) -> SearchTerm {
        SearchTerm::new(self.search.as_deref())
    }
}

/// Display name of a user for the read models; empty when the account is gone.
pub(crate) async fn display_name(state: &AppState, user_id: Uuid) -> ApiResult<String> {
    Ok(state
        .store
        .find_account(user_id)
        .await?
        .map(|account| account.display_name())
        .unwrap_or_default())
}
