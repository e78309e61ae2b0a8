use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use notary_core::signature::{address_of, generate_key, parse_key, sign_message};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "notary-cli")]
#[command(about = "CLI client for the star notary node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8000)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8000")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a wallet key and print it with its address
    Keygen,
    /// Sign a message locally with a hex private key
    Sign {
        #[arg(long)]
        key: String,
        #[arg(long)]
        message: String,
    },
    /// Ask the node for an ownership challenge
    Challenge {
        #[arg(long)]
        address: String,
    },
    /// Submit a signed challenge together with star data
    Submit {
        #[arg(long)]
        address: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        signature: String,
        /// Star data as JSON
        #[arg(long)]
        star: String,
    },
    /// Challenge, sign and submit in one go
    Register {
        #[arg(long)]
        key: String,
        /// Star data as JSON
        #[arg(long)]
        star: String,
    },
    /// Fetch one block by height or hash
    Block {
        #[arg(long, conflicts_with = "hash", required_unless_present = "hash")]
        height: Option<u64>,
        #[arg(long)]
        hash: Option<String>,
    },
    /// List the blocks owned by an address
    Owned {
        #[arg(long)]
        address: String,
    },
    /// Show the chain tip
    Head,
    /// Ask the node to validate the whole chain
    Validate,
}

#[derive(Serialize)]
struct ChallengeIn<'a> {
    address: &'a str,
}

#[derive(Serialize)]
struct SubmitIn<'a> {
    address: &'a str,
    message: &'a str,
    signature: &'a str,
    star: Value,
}

struct Client {
    node: String,
    http: reqwest::Client,
}

impl Client {
    fn new(node: &str) -> Self {
        Self {
            node: node.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        debug!(path, "GET");
        let res = self.http.get(format!("{}{path}", self.node)).send().await?;
        read(res).await
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        debug!(path, "POST");
        let res = self
            .http
            .post(format!("{}{path}", self.node))
            .json(body)
            .send()
            .await?;
        read(res).await
    }

    async fn challenge(&self, address: &str) -> Result<String> {
        let res = self.post("/challenge", &ChallengeIn { address }).await?;
        res["message"]
            .as_str()
            .map(str::to_string)
            .context("node answered without a challenge message")
    }
}

async fn read(res: reqwest::Response) -> Result<Value> {
    let status = res.status();
    let body: Value = res.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        bail!("node returned {status}: {body}");
    }
    Ok(body)
}

fn parse_star(star: &str) -> Result<Value> {
    serde_json::from_str(star).context("--star must be valid JSON")
}

fn print(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.node);
    match cli.cmd {
        Command::Keygen => {
            let key = generate_key();
            println!("private key: {}", hex::encode(key.to_bytes()));
            println!("address:     {}", address_of(key.verifying_key()));
        }
        Command::Sign { key, message } => {
            println!("{}", sign_message(&parse_key(&key)?, &message)?);
        }
        Command::Challenge { address } => {
            println!("{}", client.challenge(&address).await?);
        }
        Command::Submit {
            address,
            message,
            signature,
            star,
        } => {
            let body = SubmitIn {
                address: &address,
                message: &message,
                signature: &signature,
                star: parse_star(&star)?,
            };
            print(&client.post("/submit", &body).await?)?;
        }
        Command::Register { key, star } => {
            let star = parse_star(&star)?;
            let key = parse_key(&key)?;
            let address = address_of(key.verifying_key());
            let message = client.challenge(&address).await?;
            let signature = sign_message(&key, &message)?;
            let body = SubmitIn {
                address: &address,
                message: &message,
                signature: &signature,
                star,
            };
            print(&client.post("/submit", &body).await?)?;
        }
        Command::Block { height, hash } => {
            let path = match (height, hash) {
                (Some(height), _) => format!("/block/{height}"),
                (None, Some(hash)) => format!("/block/hash/{hash}"),
                (None, None) => bail!("pass --height or --hash"),
            };
            print(&client.get(&path).await?)?;
        }
        Command::Owned { address } => {
            print(&client.get(&format!("/blocks/owner/{address}")).await?)?;
        }
        Command::Head => print(&client.get("/chain/head").await?)?,
        Command::Validate => print(&client.get("/chain/validate").await?)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn node_flag_is_global() {
        let cli = Cli::try_parse_from(["notary-cli", "head", "--node", "http://example:9000"]).unwrap();
        assert_eq!(cli.node, "http://example:9000");
        assert!(matches!(cli.cmd, Command::Head));
    }

    #[test]
    fn block_needs_height_or_hash() {
        assert!(Cli::try_parse_from(["notary-cli", "block"]).is_err());
        assert!(Cli::try_parse_from(["notary-cli", "block", "--height", "1", "--hash", "ab"]).is_err());
        let cli = Cli::try_parse_from(["notary-cli", "block", "--height", "3"]).unwrap();
        assert!(matches!(cli.cmd, Command::Block { height: Some(3), hash: None }));
    }

    #[test]
    fn star_must_be_json() {
        assert!(parse_star(r#"{"story":"Antares"}"#).is_ok());
        assert!(parse_star("not json").is_err());
    }

    #[test]
    fn client_trims_trailing_slash() {
        assert_eq!(Client::new("http://127.0.0.1:8000/").node, "http://127.0.0.1:8000");
    }
}
