//! `login` and `logout`: HPC credentials

use super::{print_error, print_success, LoginArgs, LogoutArgs};
use crate::config::DEFAULT_IDENTIFIER;
use crate::error::{WardenError, WardenResult};
use crate::hpc::{self, CredentialError, CredentialStore};
use dialoguer::{Input, Password};
use std::path::Path;
use tracing::{debug, info};

pub async fn login(args: &LoginArgs, credentials_file: &Path) -> WardenResult<()> {
    let mut store = CredentialStore::open(credentials_file)?;

    if args.default {
        store_defaults(&mut store, args)?;
        print_success("Default credentials have been stored.");
        return Ok(());
    }

    // stored values fill the gaps before anything is prompted for
    let stored = match store.access(
        args.url.as_deref(),
        args.user.as_deref(),
        args.password.as_deref(),
    ) {
        Ok(resolved) => Some(resolved),
        Err(err @ (CredentialError::NotStored(_) | CredentialError::Expired(_))) => {
            debug!(error = %err, "no usable stored credentials");
            None
        }
        Err(err) => return Err(err.into()),
    };

    let (url, user, password) = match stored {
        Some(resolved) => (resolved.url, resolved.user, resolved.password),
        None => {
            let url = match args.url.clone().or_else(|| store.default_url().map(str::to_string)) {
                Some(url) => url,
                None => prompt_text("Cluster URL")?,
            };
            let user = match &args.user {
                Some(user) => user.clone(),
                None => prompt_text("Username")?,
            };
            let password = match &args.password {
                Some(password) => password.clone(),
                None => prompt_password()?,
            };
            (url, user, password)
        }
    };

    let token = hpc::login(&url, &user, &password).await?;
    info!(url = %url, user = %user, "login succeeded");

    store.store(Some(&user), Some(&password), Some(&url), false, None)?;
    print_success(format!("Stored credentials for {url}."));

    if args.test_token {
        println!("Token: {token}");
    }
    Ok(())
}

/// Store whatever was given as the defaults; at least one value is needed.
pub fn store_defaults(store: &mut CredentialStore, args: &LoginArgs) -> WardenResult<String> {
    if args.url.is_none() && args.user.is_none() && args.password.is_none() {
        return Err(WardenError::Validation {
            message: "--default needs at least one of --url, --user or --password".to_string(),
            field: Some("default".to_string()),
            value: None,
        });
    }

    Ok(store.store(
        args.user.as_deref(),
        args.password.as_deref(),
        args.url.as_deref(),
        true,
        None,
    )?)
}

pub fn logout(args: &LogoutArgs, credentials_file: &Path) -> WardenResult<()> {
    let mut store = CredentialStore::open(credentials_file)?;
    let identifier = args.url.as_deref().unwrap_or(DEFAULT_IDENTIFIER);

    if store.delete(identifier)? {
        print_success(format!("Credentials for {identifier} have been deleted."));
    } else {
        print_error(format!("No credentials stored for {identifier}."));
    }
    Ok(())
}

fn prompt_text(prompt: &str) -> WardenResult<String> {
    Input::<String>::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(prompt_error)
}

fn prompt_password() -> WardenResult<String> {
    Password::new()
        .with_prompt("Password")
        .interact()
        .map_err(prompt_error)
}

fn prompt_error(err: dialoguer::Error) -> WardenError {
    WardenError::Auth {
        message: format!("could not read input: {err}"),
        source: Some(Box::new(err)),
    }
}
