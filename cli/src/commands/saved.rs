use anyhow::Result;
use std::process;

use crate::config::Config;
use crate::mealdb::MealDbClient;
use cookbuddy_core::service::CookbookService;

use super::current_session;
use super::helpers::{json_error, print_json, print_saved_table};

pub(crate) fn cmd_save(
    svc: &CookbookService,
    config: &Config,
    recipe_id: &str,
    json: bool,
) -> Result<()> {
    let session = current_session(svc, config)?;
    let saved = svc.save_recipe(session.as_ref(), recipe_id)?;

    if json {
        print_json(&saved)?;
    } else {
        let id = &saved.recipe_id;
        println!("Saved recipe {id}");
    }
    Ok(())
}

pub(crate) fn cmd_unsave(
    svc: &CookbookService,
    config: &Config,
    recipe_id: &str,
    json: bool,
) -> Result<()> {
    let session = current_session(svc, config)?;
    if svc.unsave_recipe(session.as_ref(), recipe_id)? {
        if json {
            println!("{}", serde_json::json!({ "removed": recipe_id.trim() }));
        } else {
            println!("Removed recipe {} from saved", recipe_id.trim());
        }
    } else {
        if json {
            println!(
                "{}",
                json_error(&format!("Recipe '{recipe_id}' is not in your saved list"))
            );
        } else {
            eprintln!("Recipe '{recipe_id}' is not in your saved list");
        }
        process::exit(2);
    }
    Ok(())
}

pub(crate) async fn cmd_saved(
    svc: &CookbookService,
    config: &Config,
    client: &MealDbClient,
    json: bool,
) -> Result<()> {
    let session = current_session(svc, config)?;
    if session.is_none() {
        eprintln!("Not signed in. Saved recipes are shown after `cookbuddy signin`.");
    }

    let recipes = svc
        .saved_recipes(client, config.resolver_config(), session.as_ref())
        .await?;

    if recipes.is_empty() {
        if json {
            println!("[]");
        } else if session.is_some() {
            eprintln!("No saved recipes yet");
        }
        process::exit(2);
    }

    if json {
        print_json(&recipes)?;
    } else {
        print_saved_table(&recipes);
        let missing = recipes.iter().filter(|r| !r.found).count();
        if missing > 0 {
            eprintln!("Note: {missing} saved recipe(s) could not be loaded right now");
        }
    }
    Ok(())
}
