use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;

use crate::error::ExternalError;
use crate::utils::config::SupabaseConfig;

/// Thin PostgREST client carrying the service key on every request.
#[derive(Clone)]
pub struct SupabaseRest {
    client: Client,
    supabase_url: String,
    supabase_key: String,
}

impl SupabaseRest {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            client: Client::new(),
            supabase_url: config.url.trim_end_matches('/').to_string(),
            supabase_key: config.key.clone(),
        }
    }

    /// `GET /rest/v1/{table}?{filter}` and return the matching rows.
    pub async fn select(&self, table: &str, filter: &str) -> Result<Vec<Value>, ExternalError> {
        let url = format!("{}/rest/v1/{}?{}", self.supabase_url, table, filter);

        let response = self
            .client
            .get(&url)
            .header("apikey", &self.supabase_key)
            .header("Authorization", format!("Bearer {}", self.supabase_key))
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// `POST /rest/v1/rpc/{function}` with a JSON body.
    pub async fn rpc<T: Serialize + ?Sized>(
        &self,
        function: &str,
        body: &T,
    ) -> Result<(), ExternalError> {
        let url = format!("{}/rest/v1/rpc/{}", self.supabase_url, function);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.supabase_key)
            .header("Authorization", format!("Bearer {}", self.supabase_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ExternalError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ExternalError::Status {
        status: status.as_u16(),
        body,
    })
}
