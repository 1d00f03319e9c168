use super::{block_on, SourceArgs};
use clap::Args;
use colored::Colorize;
use recordjoin_query::{Dataset, QueryResults};
use tracing::info;

#[derive(Args)]
pub struct SearchCommand {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Words to search for, e.g. `Cooper` or `Sheldon Coop.`
    #[arg(required = true)]
    pub text: Vec<String>,
}

impl SearchCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        block_on(self.run())?
    }

    async fn run(self) -> anyhow::Result<()> {
        let mut joiner = self.source.open().await?;
        let text = self.text.join(" ");

        let results = joiner
            .search_text(&text)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No free-text templates configured"))?;
        info!("Search for \"{}\" found {} records", text, results.len());
        if results.is_empty() {
            println!("{}", "Nothing found.".bright_yellow());
            return Ok(());
        }

        let columns = joiner.schema().columns().to_vec();
        for dataset in results.iter() {
            let values = columns
                .iter()
                .map(|column| dataset.get(column).map(Option::unwrap_or_default))
                .collect::<recordjoin_query::Result<Vec<_>>>()?;
            println!("{}  {}", dataset.key().bright_cyan(), values.join(" | "));
        }

        let added = joiner.add_to_cache(results.as_ref());
        println!();
        println!(
            "{} {}",
            "Added to cache:".bright_white().bold(),
            added.len().to_string().bright_green()
        );
        Ok(())
    }
}
