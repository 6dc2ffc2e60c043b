use std::collections::HashMap;

use serde::Deserialize;

use crate::models::{Ingredient, Recipe, RecipeSummary};

pub const DEFAULT_BASE_URL: &str = "https://www.themealdb.com/api/json/v1/1";

/// TheMealDB numbers ingredient slots 1 through 20.
pub const MAX_INGREDIENTS: usize = 20;

/// Shared shape of `lookup.php` and `search.php` responses. `meals` is `null`
/// when nothing matched.
#[derive(Debug, Deserialize)]
pub struct MealsResponse {
    pub meals: Option<Vec<MealData>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MealData {
    #[serde(rename = "idMeal")]
    pub id_meal: Option<String>,
    #[serde(rename = "strMeal")]
    pub str_meal: Option<String>,
    #[serde(rename = "strMealThumb")]
    pub str_meal_thumb: Option<String>,
    #[serde(rename = "strCategory")]
    pub str_category: Option<String>,
    #[serde(rename = "strArea")]
    pub str_area: Option<String>,
    #[serde(rename = "strInstructions")]
    pub str_instructions: Option<String>,
    #[serde(rename = "strTags")]
    pub str_tags: Option<String>,
    // strIngredient1..20 / strMeasure1..20 and anything else we don't model
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl MealData {
    fn extra_str(&self, key: &str) -> Option<String> {
        self.extra
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Ingredient/measure pairs in slot order, skipping blank ingredient names.
    #[must_use]
    pub fn ingredients(&self) -> Vec<Ingredient> {
        (1..=MAX_INGREDIENTS)
            .filter_map(|i| {
                let name = self.extra_str(&format!("strIngredient{i}"))?;
                Some(Ingredient {
                    name,
                    measure: self.extra_str(&format!("strMeasure{i}")),
                })
            })
            .collect()
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Convert a wire meal into a `Recipe`. Meals without an id or a name are
/// unusable and yield `None`.
#[must_use]
pub fn meal_to_recipe(m: MealData) -> Option<Recipe> {
    let ingredients = m.ingredients();
    let id = non_empty(m.id_meal)?;
    let title = non_empty(m.str_meal)?;

    Some(Recipe {
        id,
        title,
        thumbnail: non_empty(m.str_meal_thumb),
        category: non_empty(m.str_category),
        area: non_empty(m.str_area),
        instructions: non_empty(m.str_instructions),
        tags: non_empty(m.str_tags),
        ingredients,
    })
}

#[must_use]
pub fn meal_to_summary(m: MealData) -> Option<RecipeSummary> {
    Some(RecipeSummary {
        id: non_empty(m.id_meal)?,
        title: non_empty(m.str_meal)?,
        thumbnail: non_empty(m.str_meal_thumb),
        category: non_empty(m.str_category),
    })
}

/// First usable recipe in a lookup response, if any.
#[must_use]
pub fn first_recipe(resp: MealsResponse) -> Option<Recipe> {
    resp.meals?.into_iter().next().and_then(meal_to_recipe)
}

#[must_use]
pub fn search_results(resp: MealsResponse) -> Vec<RecipeSummary> {
    resp.meals
        .unwrap_or_default()
        .into_iter()
        .filter_map(meal_to_summary)
        .collect()
}
