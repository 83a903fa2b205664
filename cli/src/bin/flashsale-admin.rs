//! Product administration for the flash sale store.
//!
//! ```text
//! flashsale-admin init <product_id> <stock>
//! flashsale-admin status <product_id>
//! flashsale-admin reset <product_id>
//! flashsale-admin buyers <product_id>
//! ```

use clap::{Parser, Subcommand};
use flashsale_cli::config;
use flashsale_core::inventory::InventoryAdmin;
use flashsale_redis::RedisInventoryStore;

#[derive(Parser, Debug)]
#[command(
    name = "flashsale-admin",
    version,
    about = "Manage flash sale products",
    arg_required_else_help = true
)]
struct Cli {
    /// Redis URL (falls back to `redis://$REDIS_ADDR`).
    #[arg(long, global = true, env = "REDIS_URL", value_name = "URL")]
    redis_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set a product's stock and clear its buyer ledger.
    Init {
        /// Product id.
        product_id: String,
        /// Units available for sale.
        #[arg(allow_negative_numbers = true)]
        stock: i64,
    },

    /// Show remaining stock and buyer count.
    Status {
        /// Product id.
        product_id: String,
    },

    /// Delete the product record.
    Reset {
        /// Product id.
        product_id: String,
    },

    /// List successful buyers in purchase order.
    Buyers {
        /// Product id.
        product_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    flashsale_cli::init_tracing();

    let cli = Cli::parse();
    let redis_url = cli
        .redis_url
        .unwrap_or_else(|| config::redis_url(|key| std::env::var(key).ok()));
    let store = RedisInventoryStore::connect(&redis_url).await?;

    match cli.command {
        Command::Init { product_id, stock } => {
            store.initialize(&product_id, stock).await?;
            println!("Product '{product_id}' initialized with {stock} units");
        }
        Command::Status { product_id } => match store.status(&product_id).await? {
            Some(status) => {
                println!("=== Product Status: {product_id} ===");
                println!("Remaining Stock:   {}", status.remaining_stock);
                println!("Successful Buyers: {}", status.buyer_count);
            }
            None => println!("Product '{product_id}' not found"),
        },
        Command::Reset { product_id } => {
            store.reset(&product_id).await?;
            println!("Product '{product_id}' reset");
        }
        Command::Buyers { product_id } => {
            let buyers = store.list_buyers(&product_id).await?;
            println!("=== Buyers for {product_id} ({} total) ===", buyers.len());
            for (i, buyer) in buyers.iter().enumerate() {
                println!("{}. {buyer}", i + 1);
            }
        }
    }

    Ok(())
}
