//! Load generator for the flash sale server.

use clap::Parser;
use flashsale_cli::loadtest::{self, LoadTestPlan};

#[derive(Parser, Debug)]
#[command(name = "flashsale-loadtest", version, about = "Hammer a flash sale server")]
struct Cli {
    /// Server address.
    #[arg(long, default_value = "localhost:8080")]
    addr: String,

    /// Product to buy.
    #[arg(long, default_value = "iphone15")]
    product: String,

    /// Concurrent connections.
    #[arg(long, default_value_t = 1000)]
    clients: usize,

    /// Sequential attempts per connection.
    #[arg(long, default_value_t = 10)]
    attempts: usize,

    /// Stock the product was initialized with, for the oversell check.
    #[arg(long, default_value_t = 100)]
    expected_stock: u64,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    flashsale_cli::init_tracing();

    let cli = Cli::parse();
    let plan = LoadTestPlan {
        addr: cli.addr,
        product_id: cli.product,
        clients: cli.clients,
        attempts: cli.attempts,
    };

    println!("Server:   {}", plan.addr);
    println!("Product:  {}", plan.product_id);
    println!("Clients:  {} x {} attempts", plan.clients, plan.attempts);
    println!();

    let report = loadtest::run(&plan).await;

    println!("{report}");
    match report.oversold(cli.expected_stock) {
        None => println!("Oversell Check:    PASS"),
        Some(over) => {
            println!("Oversell Check:    FAIL (oversold by {over})");
            std::process::exit(1);
        }
    }
}
