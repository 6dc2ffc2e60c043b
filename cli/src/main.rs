mod commands;
mod config;
mod mealdb;
mod server;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_comment, cmd_discover, cmd_post_create, cmd_post_delete, cmd_post_edit, cmd_post_list,
    cmd_post_show, cmd_post_upvote, cmd_recipe, cmd_save, cmd_saved, cmd_signin, cmd_signout,
    cmd_signup, cmd_unsave, cmd_whoami,
};
use crate::config::Config;
use crate::mealdb::MealDbClient;
use cookbuddy_core::models::{NewPost, UpdatePost};
use cookbuddy_core::service::CookbookService;

#[derive(Parser)]
#[command(
    name = "cookbuddy",
    version,
    about = "Discover recipes, keep the ones you love, and share what you cooked"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup {
        /// Email address
        email: String,
        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign in to an existing account
    Signin {
        /// Email address
        email: String,
        /// Password (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out and forget the stored session
    Signout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the signed-in account
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search `TheMealDB` for recipes by name
    Discover {
        /// Search query
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe's ingredients and instructions
    Recipe {
        /// `TheMealDB` recipe ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a recipe to your list
    Save {
        /// `TheMealDB` recipe ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a recipe from your list
    Unsave {
        /// `TheMealDB` recipe ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your saved recipes
    Saved {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Share and browse posts about recipes
    Post {
        #[command(subcommand)]
        command: PostCommands,
    },
    /// Comment on a post
    Comment {
        /// Post ID
        post_id: i64,
        /// Comment text
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum PostCommands {
    /// Create a post about a recipe
    Create {
        /// Post title
        title: String,
        /// Saved recipe ID the post is about (pick from your saved list when omitted)
        #[arg(short, long)]
        recipe: Option<String>,
        /// Post body
        #[arg(short, long)]
        content: Option<String>,
        /// Image URL
        #[arg(long)]
        image_url: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List posts
    List {
        /// Only posts whose title contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Sort order: newest, upvotes
        #[arg(long, default_value = "newest")]
        sort: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a post with its comments
    Show {
        /// Post ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit one of your posts
    Edit {
        /// Post ID
        id: i64,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New body
        #[arg(long, conflicts_with = "clear_content")]
        content: Option<String>,
        /// Remove the body
        #[arg(long)]
        clear_content: bool,
        /// New image URL
        #[arg(long, conflicts_with = "clear_image")]
        image_url: Option<String>,
        /// Remove the image
        #[arg(long)]
        clear_image: bool,
        /// New recipe ID (must be one of your saved recipes)
        #[arg(long)]
        recipe: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete one of your posts (and its comments)
    Delete {
        /// Post ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upvote a post
    Upvote {
        /// Post ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Logs go to stderr so `--json` output on stdout stays clean.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "cookbuddy={default_level},cookbuddy_core={default_level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = CookbookService::new(&config.db_path)?;
    let client = MealDbClient::new(&config.mealdb_url)?;

    match cli.command {
        Commands::Signup {
            email,
            password,
            json,
        } => cmd_signup(&svc, &config, &email, password, json),
        Commands::Signin {
            email,
            password,
            json,
        } => cmd_signin(&svc, &config, &email, password, json),
        Commands::Signout { json } => cmd_signout(&svc, &config, json),
        Commands::Whoami { json } => cmd_whoami(&svc, &config, json),
        Commands::Discover { query, json } => cmd_discover(&client, &query, json).await,
        Commands::Recipe { id, json } => cmd_recipe(&svc, &config, &client, &id, json).await,
        Commands::Save { id, json } => cmd_save(&svc, &config, &id, json),
        Commands::Unsave { id, json } => cmd_unsave(&svc, &config, &id, json),
        Commands::Saved { json } => cmd_saved(&svc, &config, &client, json).await,
        Commands::Post { command } => match command {
            PostCommands::Create {
                title,
                recipe,
                content,
                image_url,
                json,
            } => {
                let post = NewPost {
                    title,
                    content,
                    image_url,
                    recipe_id: recipe,
                };
                cmd_post_create(&svc, &config, &client, post, json).await
            }
            PostCommands::List { search, sort, json } => {
                cmd_post_list(&svc, search.as_deref(), &sort, json)
            }
            PostCommands::Show { id, json } => cmd_post_show(&svc, id, json),
            PostCommands::Edit {
                id,
                title,
                content,
                clear_content,
                image_url,
                clear_image,
                recipe,
                json,
            } => {
                let clearable = |clear: bool, value: Option<String>| {
                    if clear { Some(None) } else { value.map(Some) }
                };
                let update = UpdatePost {
                    title,
                    content: clearable(clear_content, content),
                    image_url: clearable(clear_image, image_url),
                    recipe_id: recipe,
                };
                cmd_post_edit(&svc, &config, id, update, json)
            }
            PostCommands::Delete { id, json } => cmd_post_delete(&svc, &config, id, json),
            PostCommands::Upvote { id, json } => cmd_post_upvote(&svc, id, json),
        },
        Commands::Comment {
            post_id,
            text,
            json,
        } => cmd_comment(&svc, &config, post_id, &text, json),
        Commands::Serve { port, bind } => {
            let resolver = config.resolver_config();
            server::start_server(svc, Arc::new(client), resolver, port, &bind).await
        }
    }
}
