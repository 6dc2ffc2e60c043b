use anyhow::Result;
use serde::Serialize;
use std::process;
use tabled::{Table, Tabled, settings::Style};

use crate::config::Config;
use crate::mealdb::MealDbClient;
use cookbuddy_core::models::Recipe;
use cookbuddy_core::service::CookbookService;

use super::current_session;
use super::helpers::{json_error, print_json, print_summary_table};

pub(crate) async fn cmd_discover(client: &MealDbClient, query: &str, json: bool) -> Result<()> {
    let results = client.search_async(query).await?;

    if results.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found for '{query}'");
        }
        process::exit(2);
    }

    if json {
        print_json(&results)?;
    } else {
        print_summary_table(&results);
    }
    Ok(())
}

#[derive(Serialize)]
struct RecipeView<'a> {
    #[serde(flatten)]
    recipe: &'a Recipe,
    saved: bool,
}

pub(crate) async fn cmd_recipe(
    svc: &CookbookService,
    config: &Config,
    client: &MealDbClient,
    recipe_id: &str,
    json: bool,
) -> Result<()> {
    let Some(recipe) = client.lookup_async(recipe_id.trim()).await? else {
        if json {
            println!("{}", json_error(&format!("Recipe '{recipe_id}' not found")));
        } else {
            eprintln!("Recipe '{recipe_id}' not found");
        }
        process::exit(2);
    };

    let session = current_session(svc, config)?;
    let saved = svc.is_saved(session.as_ref(), &recipe.id)?;

    if json {
        return print_json(&RecipeView {
            recipe: &recipe,
            saved,
        });
    }

    print_recipe(&recipe, saved);
    Ok(())
}

fn print_recipe(recipe: &Recipe, saved: bool) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Ingredient")]
        ingredient: String,
    }

    let title = &recipe.title;
    let id = &recipe.id;
    let marker = if saved { " [saved]" } else { "" };
    println!("{title} (id: {id}){marker}");

    let meta: Vec<&str> = [recipe.category.as_deref(), recipe.area.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    if !meta.is_empty() {
        println!("{}", meta.join(" / "));
    }
    if let Some(tags) = &recipe.tags {
        println!("Tags: {tags}");
    }

    if !recipe.ingredients.is_empty() {
        let rows: Vec<IngredientRow> = recipe
            .ingredients
            .iter()
            .enumerate()
            .map(|(i, ing)| IngredientRow {
                idx: i + 1,
                ingredient: ing.display(),
            })
            .collect();
        println!("\n{}", Table::new(&rows).with(Style::rounded()));
    }

    if let Some(instructions) = &recipe.instructions {
        println!("\n{instructions}");
    }
}
