//! Password digest command.

use clap::Args;
use mig_core::credentials::{password_digest, DEFAULT_REALM};

/// Passwd command arguments.
#[derive(Args)]
pub struct PasswdArgs {
    /// User name
    pub user: String,

    /// Plain-text password
    pub password: String,

    /// Authentication realm of the HTTP gateway
    #[arg(long, default_value = DEFAULT_REALM)]
    pub realm: String,
}

/// The value to store as the user's `password` in the configuration.
pub fn digest(args: &PasswdArgs) -> String {
    password_digest(&args.user, &args.realm, &args.password)
}
