use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = sel_api::Args::parse();

	sel_api::run(args).await
}
