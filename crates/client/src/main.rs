//! `adminpanel` command-line front end.
//!
//! ```text
//! adminpanel login <email> <password>
//! adminpanel users
//! adminpanel set-role <id> <client|staff|admin>
//! adminpanel logout
//! ```
//!
//! Backend URL and timeouts come from `ADMINPANEL_*` environment variables.

use std::process::ExitCode;

use adminpanel_client::{AdminError, AdminSession, Role, User, UserId};
use anyhow::{Context, Result, bail};

const USAGE: &str = "usage: adminpanel <login <email> <password> | users | set-role <id> <role> | logout>";

#[tokio::main]
async fn main() -> ExitCode {
    adminpanel_observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err.downcast_ref::<AdminError>(), Some(e) if e.requires_login()) {
                eprintln!("Session expired or missing. Please log in: adminpanel login <email> <password>");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> Result<()> {
    let session = AdminSession::from_env().context("failed to set up admin session")?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["login", email, password] => {
            session.login(email, password).await.map_err(|err| match err {
                AdminError::InvalidCredentials => anyhow::anyhow!("incorrect email or password"),
                other => anyhow::Error::new(other).context("login failed"),
            })?;
            println!("Logged in as {email}.");
        }
        ["users"] => {
            let directory = session.directory();
            let users = directory.load_users().await?;
            print_users(&users);
        }
        ["set-role", id, role] => {
            let user_id: UserId = id.parse().with_context(|| format!("invalid user id '{id}'"))?;
            let role: Role = role.parse()?;

            let directory = session.directory();
            directory.load_users().await?;
            let outcome = directory.change_role(user_id, role).await?;

            let user = outcome.user();
            println!("{} <{}> is now {}", user.name, user.email, user.role);
        }
        ["logout"] => {
            session.logout();
            println!("Logged out.");
        }
        _ => bail!(USAGE),
    }

    Ok(())
}

fn print_users(users: &[User]) {
    if users.is_empty() {
        println!("No users.");
        return;
    }

    let name_width = users.iter().map(|u| u.name.len()).max().unwrap_or(0).max(4);
    let email_width = users.iter().map(|u| u.email.len()).max().unwrap_or(0).max(5);

    println!("{:>6}  {:<name_width$}  {:<email_width$}  ROLE", "ID", "NAME", "EMAIL");
    for user in users {
        println!(
            "{:>6}  {:<name_width$}  {:<email_width$}  {}",
            user.id, user.name, user.email, user.role
        );
    }
}
