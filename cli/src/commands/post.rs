use anyhow::{Result, bail};
use std::process;

use crate::config::Config;
use crate::mealdb::MealDbClient;
use cookbuddy_core::models::{NewPost, PostSort, Session, UpdatePost};
use cookbuddy_core::service::CookbookService;

use super::current_session;
use super::helpers::{
    print_comments, print_json, print_posts_table, print_saved_table, prompt_choice, short_date,
};

/// Resolve the user's saved recipes and let them pick one.
async fn choose_saved_recipe(
    svc: &CookbookService,
    config: &Config,
    client: &MealDbClient,
    session: Option<&Session>,
) -> Result<String> {
    let saved = svc
        .saved_recipes(client, config.resolver_config(), session)
        .await?;
    if saved.is_empty() {
        bail!("No saved recipes to post about. Save one with `cookbuddy save <id>` first");
    }

    print_saved_table(&saved);
    let idx = prompt_choice("recipe", saved.len())?;
    Ok(saved[idx].recipe_id.clone())
}

pub(crate) async fn cmd_post_create(
    svc: &CookbookService,
    config: &Config,
    client: &MealDbClient,
    mut post: NewPost,
    json: bool,
) -> Result<()> {
    let session = current_session(svc, config)?;
    if post.recipe_id.is_none() && session.is_some() {
        post.recipe_id = Some(choose_saved_recipe(svc, config, client, session.as_ref()).await?);
    }
    let post = svc.create_post(session.as_ref(), post)?;

    if json {
        print_json(&post)?;
    } else {
        let id = post.id;
        let title = &post.title;
        println!("Created post: {title} (id: {id})");
    }
    Ok(())
}

pub(crate) fn cmd_post_list(
    svc: &CookbookService,
    search: Option<&str>,
    sort: &str,
    json: bool,
) -> Result<()> {
    let sort = PostSort::parse(sort)?;
    let posts = svc.list_posts(search, sort)?;

    if posts.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No posts found");
        }
        process::exit(2);
    }

    if json {
        print_json(&posts)?;
    } else {
        print_posts_table(&posts);
    }
    Ok(())
}

pub(crate) fn cmd_post_show(svc: &CookbookService, id: i64, json: bool) -> Result<()> {
    let detail = svc.get_post_detail(id)?;
    if json {
        return print_json(&detail);
    }

    let post = &detail.post;
    let title = &post.title;
    let upvotes = post.upvotes;
    let posted = short_date(&post.created_at);
    println!("{title} (id: {id})");
    println!("Posted {posted} by user {} - {upvotes} upvote(s)", post.user_id);
    if let Some(recipe_id) = &post.recipe_id {
        println!("Recipe: {recipe_id} (see `cookbuddy recipe {recipe_id}`)");
    }
    if let Some(image) = &post.image_url {
        println!("Image: {image}");
    }
    if let Some(content) = &post.content {
        println!("\n{content}");
    }

    let count = detail.comments.len();
    println!("\nComments ({count}):");
    print_comments(&detail.comments);
    Ok(())
}

pub(crate) fn cmd_post_edit(
    svc: &CookbookService,
    config: &Config,
    id: i64,
    update: UpdatePost,
    json: bool,
) -> Result<()> {
    let session = current_session(svc, config)?;
    let post = svc.update_post(session.as_ref(), id, update)?;

    if json {
        print_json(&post)?;
    } else {
        println!("Updated post {id}");
    }
    Ok(())
}

pub(crate) fn cmd_post_delete(
    svc: &CookbookService,
    config: &Config,
    id: i64,
    json: bool,
) -> Result<()> {
    let session = current_session(svc, config)?;
    svc.delete_post(session.as_ref(), id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted post {id}");
    }
    Ok(())
}

pub(crate) fn cmd_post_upvote(svc: &CookbookService, id: i64, json: bool) -> Result<()> {
    let post = svc.upvote_post(id)?;

    if json {
        print_json(&post)?;
    } else {
        let upvotes = post.upvotes;
        println!("Upvoted post {id} ({upvotes} total)");
    }
    Ok(())
}

pub(crate) fn cmd_comment(
    svc: &CookbookService,
    config: &Config,
    post_id: i64,
    text: &str,
    json: bool,
) -> Result<()> {
    let session = current_session(svc, config)?;
    let comment = svc.add_comment(session.as_ref(), post_id, text)?;

    if json {
        print_json(&comment)?;
    } else {
        let id = comment.id;
        println!("Added comment {id} to post {post_id}");
    }
    Ok(())
}
