use anyhow::Result;
use std::process;

use crate::config::Config;
use cookbuddy_core::service::CookbookService;

use super::current_session;
use super::helpers::{json_error, print_json, prompt_line};

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(p) => Ok(p),
        None => prompt_line("Password"),
    }
}

pub(crate) fn cmd_signup(
    svc: &CookbookService,
    config: &Config,
    email: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = password_or_prompt(password)?;
    let session = svc.sign_up(email, &password)?;
    config.save_session_token(&session.token)?;

    if json {
        print_json(&session)?;
    } else {
        let email = &session.email;
        println!("Account created. Signed in as {email}");
    }
    Ok(())
}

pub(crate) fn cmd_signin(
    svc: &CookbookService,
    config: &Config,
    email: &str,
    password: Option<String>,
    json: bool,
) -> Result<()> {
    let password = password_or_prompt(password)?;
    let session = svc.sign_in(email, &password)?;
    config.save_session_token(&session.token)?;

    if json {
        print_json(&session)?;
    } else {
        let email = &session.email;
        println!("Signed in as {email}");
    }
    Ok(())
}

pub(crate) fn cmd_signout(svc: &CookbookService, config: &Config, json: bool) -> Result<()> {
    let ended = match config.load_session_token()? {
        Some(token) => svc.sign_out(&token)?,
        None => false,
    };
    config.clear_session_token()?;

    if json {
        println!("{}", serde_json::json!({ "signed_out": ended }));
    } else if ended {
        println!("Signed out");
    } else {
        println!("Not signed in");
    }
    Ok(())
}

pub(crate) fn cmd_whoami(svc: &CookbookService, config: &Config, json: bool) -> Result<()> {
    let Some(session) = current_session(svc, config)? else {
        if json {
            println!("{}", json_error("Not signed in"));
        } else {
            eprintln!("Not signed in");
        }
        process::exit(2);
    };

    if json {
        print_json(&session)?;
    } else {
        let email = &session.email;
        let id = session.user_id;
        println!("Signed in as {email} (user id: {id})");
    }
    Ok(())
}
