use clap::{Parser, Subcommand};
use serde::Deserialize;

/// Thin HTTP client for the registry's catalog/admin surface. Deliberately
/// contains no registry logic of its own -- it just shapes requests and
/// prints responses.
#[derive(Parser)]
#[command(name = "nscr-cli")]
struct Cli {
    #[arg(long, default_value = "http://localhost:7000")]
    url: String,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    ListRepos,
    ListTags { repo: String },
    DeleteImage { repo: String, tag: String },
    GarbageCollect,
    GcStats,
    Status,
}

#[derive(Deserialize)]
struct Catalog {
    repositories: Vec<String>,
}

#[derive(Deserialize)]
struct TagsList {
    tags: Vec<String>,
}

fn maybe_auth(cli: &Cli, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match (&cli.username, &cli.password) {
        (Some(u), Some(p)) => req.basic_auth(u, Some(p)),
        _ => req,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let http = reqwest::Client::new();

    let exit_ok = match &cli.command {
        Command::ListRepos => {
            let url = format!("{}/v2/_catalog", cli.url);
            let resp = maybe_auth(&cli, http.get(&url)).send().await?;
            let ok = resp.status().is_success();
            if ok {
                let catalog: Catalog = resp.json().await?;
                for r in catalog.repositories {
                    println!("{r}");
                }
            } else {
                eprintln!("list-repos failed: {}", resp.status());
            }
            ok
        }
        Command::ListTags { repo } => {
            let url = format!("{}/v2/{}/tags/list", cli.url, repo);
            let resp = maybe_auth(&cli, http.get(&url)).send().await?;
            let ok = resp.status().is_success();
            if ok {
                let tags: TagsList = resp.json().await?;
                for t in tags.tags {
                    println!("{t}");
                }
            } else {
                eprintln!("list-tags failed: {}", resp.status());
            }
            ok
        }
        Command::DeleteImage { repo, tag } => {
            let url = format!("{}/v2/{}/manifests/{}", cli.url, repo, tag);
            let resp = maybe_auth(&cli, http.delete(&url)).send().await?;
            let ok = resp.status().is_success();
            if !ok {
                eprintln!("delete-image failed: {}", resp.status());
            }
            ok
        }
        Command::GarbageCollect => {
            let url = format!("{}/api/garbage-collect", cli.url);
            let resp = maybe_auth(&cli, http.post(&url)).send().await?;
            let ok = resp.status().is_success();
            let text = resp.text().await?;
            println!("{text}");
            ok
        }
        Command::GcStats => {
            let url = format!("{}/api/garbage-collect/stats", cli.url);
            let resp = maybe_auth(&cli, http.get(&url)).send().await?;
            let ok = resp.status().is_success();
            let text = resp.text().await?;
            println!("{text}");
            ok
        }
        Command::Status => {
            let url = format!("{}/v2/", cli.url);
            let resp = maybe_auth(&cli, http.get(&url)).send().await?;
            resp.status().is_success()
        }
    };

    if exit_ok {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
