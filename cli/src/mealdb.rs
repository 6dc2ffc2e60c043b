use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use cookbuddy_core::mealdb::{MealsResponse, first_recipe, search_results};
use cookbuddy_core::models::{Recipe, RecipeSummary};
use cookbuddy_core::resolver::{LookupError, RecipeLookup};

pub struct MealDbClient {
    client: reqwest::Client,
    base_url: String,
}

impl MealDbClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "cookbuddy/{} (recipe sharing)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_meals(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<MealsResponse> {
        let url = format!("{}/{endpoint}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .context("Failed to reach TheMealDB API")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("TheMealDB API returned HTTP {status}");
        }

        resp.json()
            .await
            .context("Failed to parse TheMealDB response")
    }

    pub async fn lookup_async(&self, recipe_id: &str) -> Result<Option<Recipe>> {
        debug!(recipe_id, "looking up recipe");
        let data = self.get_meals("lookup.php", &[("i", recipe_id)]).await?;
        Ok(first_recipe(data))
    }

    pub async fn search_async(&self, query: &str) -> Result<Vec<RecipeSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        debug!(query, "searching recipes");
        let data = self.get_meals("search.php", &[("s", query)]).await?;
        Ok(search_results(data))
    }
}

#[async_trait]
impl RecipeLookup for MealDbClient {
    async fn lookup(&self, recipe_id: &str) -> Result<Recipe, LookupError> {
        match self.lookup_async(recipe_id).await {
            Ok(Some(recipe)) => Ok(recipe),
            Ok(None) => Err(LookupError::NotFound(recipe_id.to_string())),
            Err(e) => Err(LookupError::Transport(format!("{e:#}"))),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<RecipeSummary>, LookupError> {
        self.search_async(query)
            .await
            .map_err(|e| LookupError::Transport(format!("{e:#}")))
    }
}
