use sheetgate::users::hash_password;
use std::env;

/// Print an Argon2 hash for the password given on the command line, for the
/// `password_hash` field of the users file.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);

    let (Some(password), None) = (args.next(), args.next()) else {
        eprintln!("Usage: hash_password <password>");
        std::process::exit(2);
    };

    println!("{}", hash_password(&password)?);
    Ok(())
}
