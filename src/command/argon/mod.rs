mod error;

use argh::FromArgs;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};

pub use error::Error;

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "argon",
    description = "Hash a password for the basic mechanism following the argon2id algorithm"
)]
pub struct Options {
    #[argh(option)]
    /// print a ready-to-paste `[mechanism.basic.users.<id>]` section for this identity id
    user_id: Option<String>,

    #[argh(option)]
    /// username of the printed section, defaults to the identity id
    username: Option<String>,
}

pub struct Command {}

impl Command {
    pub fn run(options: &Options) -> Result<(), Error> {
        let password = rpassword::prompt_password("Input Password: ")?;
        let hash = generate_password(&password)?;

        match &options.user_id {
            Some(user_id) => {
                let username = options.username.as_deref().unwrap_or(user_id);
                println!("{}", user_section(user_id, username, &hash));
            }
            None => println!("{hash}"),
        }
        Ok(())
    }
}

fn generate_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(OsRng);

    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default());
    let hash = argon.hash_password(password.as_bytes(), &salt)?;

    Ok(hash.to_string())
}

fn user_section(user_id: &str, username: &str, hash: &str) -> String {
    format!(
        "[mechanism.basic.users.{user_id}]\nusername = \"{username}\"\npassword = \"{hash}\"\n"
    )
}
