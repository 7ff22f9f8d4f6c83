//! `loopbot validate`: checks a market file without trading.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::warn;

use crate::market_file::MarketFile;

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Market file (TOML)
    #[arg(short, long, env = "LOOPBOT_MARKET")]
    pub market: PathBuf,

    /// Print the overview as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let file = MarketFile::load(&args.market)?;
    let overview = file.overview()?;

    for pair in &overview.empty_books {
        warn!(pair = %pair, "Pair has an empty order book");
    }
    if overview.funded_coins == 0 {
        warn!("No coin has an available balance; every loop will be untradeable");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!("Market file: {}", args.market.display());
    println!("  Fund:          {}", file.fund);
    println!("  Exchanges:     {}", overview.exchanges.join(", "));
    println!("  Pairs:         {}", overview.pairs);
    println!("  Cross links:   {}", overview.cross_links);
    println!("  Coins:         {}", overview.coins);
    println!("  Funded coins:  {}", overview.funded_coins);
    if !overview.empty_books.is_empty() {
        println!("  Empty books:   {}", overview.empty_books.join(", "));
    }
    Ok(())
}
