//! CLI command handlers for login, status, token, and logout.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::device::LoginCallback;
use crate::session::BearerTokenSession;
use crate::token::{BearerTokenAuthState, PendingAuthorization, SessionKey};

/// SSO bearer token CLI
#[derive(Parser, Debug)]
#[command(name = "sso-bearer", version, about = "SSO bearer token acquisition and refresh")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in via the device-authorization flow
    Login(SessionArgs),
    /// Show authentication status
    Status(SessionArgs),
    /// Print a usable access token
    Token(SessionArgs),
    /// Sign out and clear the cached token
    Logout(SessionArgs),
}

/// Identity selection shared by every subcommand.
#[derive(Parser, Debug)]
pub struct SessionArgs {
    /// SSO start URL
    #[arg(long)]
    pub start_url: String,

    /// Identity-provider region
    #[arg(long)]
    pub region: String,

    /// OAuth scopes (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub scopes: Vec<String>,
}

impl SessionArgs {
    fn session(&self, interactive: bool) -> BearerTokenSession {
        let key = SessionKey::new(&self.start_url, &self.region, self.scopes.clone());
        let mut builder = BearerTokenSession::builder(key);
        if interactive {
            builder = builder.with_login_callback(Arc::new(ConsoleLoginCallback));
        }
        builder.build()
    }
}

/// Prints the browser step to the terminal.
struct ConsoleLoginCallback;

impl LoginCallback for ConsoleLoginCallback {
    fn on_pending_authorization(&self, authorization: &PendingAuthorization) {
        let uri = authorization
            .verification_uri_complete
            .as_deref()
            .unwrap_or(&authorization.verification_uri);
        println!("🔗 Visit: {uri}");
        println!("📋 Enter code: {}", authorization.user_code);
        println!("⏳ Waiting for authorization...");
    }
}

/// Handle `sso-bearer login`.
pub async fn handle_login(args: &SessionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = args.session(true);
    if session.state() == BearerTokenAuthState::Authorized {
        println!("✅ Already signed in to {}", args.start_url);
        return Ok(());
    }
    let token = session.resolve_token().await?;
    println!("✅ Signed in; token valid until {}", token.expires_at);
    Ok(())
}

/// Handle `sso-bearer status`.
pub async fn handle_status(args: &SessionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = args.session(false);
    match session.current_token() {
        Some(token) => println!(
            "{}: {} (expires {})",
            args.start_url,
            session.state(),
            token.expires_at
        ),
        None => println!("{}: {}", args.start_url, session.state()),
    }
    Ok(())
}

/// Handle `sso-bearer token`.
pub async fn handle_token(args: &SessionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = args.session(true);
    let token = session.resolve_token().await?;
    println!("{}", token.access_token);
    Ok(())
}

/// Handle `sso-bearer logout`.
pub async fn handle_logout(args: &SessionArgs) -> Result<(), Box<dyn std::error::Error>> {
    let session = args.session(false);
    session.invalidate().await?;
    println!("✅ Signed out of {}", args.start_url);
    Ok(())
}
