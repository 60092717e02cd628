//! CLI probe for the catalog core.
//!
//! # Responsibility
//! - Open a catalog database (migrating it if needed) and print one folded
//!   list page as JSON.
//!
//! ```text
//! catalog_cli <database|config.toml> <products|users> [page] [size]
//! ```

use catalog_core::{Catalog, CatalogConfig, Document, ServiceError};
use serde_json::Value;
use std::process::ExitCode;

const USAGE: &str = "usage: catalog_cli <database|config.toml> <products|users> [page] [size]";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (Some(target), Some(listing)) = (args.first(), args.get(1)) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let listing = match listing.as_str() {
        "products" => Listing::Products,
        "users" => Listing::Users,
        other => {
            eprintln!("unknown listing `{other}`; {USAGE}");
            return ExitCode::from(2);
        }
    };

    let config = if target.ends_with(".toml") {
        match CatalogConfig::load(target) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::from(2);
            }
        }
    } else {
        CatalogConfig {
            database_path: target.into(),
            ..CatalogConfig::default()
        }
    };
    if let Err(err) = catalog_core::init_from_config(&config) {
        eprintln!("{err}");
    }

    let mut params = Document::new();
    for (key, value) in ["page", "size"].into_iter().zip(args.iter().skip(2)) {
        params.insert(key.to_string(), Value::String(value.clone()));
    }

    match run(&config, listing, params).await {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("event=cli_list module=cli status=error error={}", err);
            let reply = err.to_reply();
            println!(
                "{}",
                serde_json::to_string_pretty(&reply).unwrap_or_else(|_| reply.message.clone())
            );
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Listing {
    Products,
    Users,
}

async fn run(config: &CatalogConfig, listing: Listing, params: Document) -> Result<String, ServiceError> {
    let catalog = Catalog::open_sqlite(config).await?;
    let page = match listing {
        Listing::Products => catalog.products.list(params).await?,
        Listing::Users => catalog.users.list(params).await?,
    };
    Ok(serde_json::to_string_pretty(&page).unwrap_or_default())
}
