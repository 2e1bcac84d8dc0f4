//! Produces `ENC:` tokens for encryption-flagged settings.

use anyhow::{Context, Result};
use clap::Parser;

use chartwatch::config::ENCRYPTED_PREFIX;
use chartwatch::SecretCodec;

#[derive(Parser)]
#[command(name = "encrypt-env")]
#[command(author, version, about = "Encrypt a value for use in a chartwatchd environment variable")]
struct Cli {
    /// Passphrase the server reads from ENCRYPTION_KEY
    passphrase: String,

    /// Value to encrypt
    plaintext: String,

    /// Environment variable named in the export hints
    #[arg(long, default_value = "GITHUB_TOKEN")]
    var: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let codec = SecretCodec::new(&cli.passphrase);
    let token = codec
        .encrypt(&cli.plaintext)
        .context("Failed to encrypt value")?;

    println!("Encrypted value: {}", token);
    println!("Encrypted value with {} prefix: {}{}", ENCRYPTED_PREFIX, ENCRYPTED_PREFIX, token);
    println!();
    println!("To use this in your environment:");
    println!("export ENCRYPTION_KEY='<passphrase>'");
    println!("export {}='{}{}'", cli.var, ENCRYPTED_PREFIX, token);
    println!("# or without the prefix (legacy form):");
    println!("export {}='{}'", cli.var, token);

    Ok(())
}
