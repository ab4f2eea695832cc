use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use unipus_autopilot::{
	answer_bank::{AnswerBank, BankSource},
	config::{AppConfig, SettingsFlags, Timings},
	login,
	page::BrowserPage,
	sequencer::{Sequencer, run_stop_hook},
	state::{CheckpointStore, RunState, StopHandle},
	task_map::TaskMap,
};
use v_utils::{elog, log};

#[derive(Debug, Parser)]
#[command(name = "unipus_autopilot")]
#[command(about = "Works through Unipus course tasks in a headless browser", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Command>,

	#[clap(flatten)]
	settings: SettingsFlags,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Log in and work through the course until stopped (default)
	Run,
	/// Load the answer bank and print what it holds
	Bank {
		/// Case-insensitive keyword to look for in the answers
		#[arg(long)]
		search: Option<String>,
	},
	/// Forget the last processed task, so the next run does not treat it as a stall
	Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn")))
		.init();

	let cli = Cli::parse();
	let config = AppConfig::try_build(cli.settings).map_err(|e| eyre!("Failed to load config: {e}"))?;

	match cli.command.unwrap_or(Command::Run) {
		Command::Run => run(config).await,
		Command::Bank { search } => bank(&config, search.as_deref()).await,
		Command::Reset => {
			checkpoint_store().clear()?;
			log!("Checkpoint cleared");
			Ok(())
		}
	}
}

fn checkpoint_store() -> Box<dyn CheckpointStore> {
	#[cfg(feature = "xdg")]
	{
		Box::new(unipus_autopilot::state::FileStore::in_state_dir())
	}
	#[cfg(not(feature = "xdg"))]
	{
		Box::new(unipus_autopilot::state::MemoryStore::default())
	}
}

fn bank_source(config: &AppConfig) -> BankSource {
	#[cfg(feature = "xdg")]
	let default_cache = Some(v_utils::xdg_state_dir!("answer_bank").join("bank.json"));
	#[cfg(not(feature = "xdg"))]
	let default_cache = None;

	BankSource {
		cache_path: config.bank_cache.as_ref().map(std::path::PathBuf::from).or(default_cache),
		remote_url: config.remote_bank_url().map(str::to_string),
	}
}

async fn bank(config: &AppConfig, search: Option<&str>) -> Result<()> {
	let (bank, origin) = AnswerBank::load(&bank_source(config)).await;
	log!("Answer bank loaded from {origin:?}");

	match search {
		None => println!("{}", bank.stats()),
		Some(keyword) => {
			let hits = bank.search(keyword);
			if hits.is_empty() {
				println!("No answers contain '{keyword}'");
			}
			for hit in hits {
				println!("{hit}");
			}
		}
	}
	Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
	if config.course_url.is_empty() {
		return Err(eyre!("course_url is not set"));
	}

	let map = match &config.task_map {
		Some(path) => TaskMap::load(std::path::Path::new(path))?,
		None => TaskMap::builtin(),
	};
	let (bank, origin) = AnswerBank::load(&bank_source(&config)).await;
	log!("Answer bank loaded from {origin:?}: {} answers", bank.stats().answers);

	let browser_config = if config.visible {
		BrowserConfig::builder()
			.with_head() // Visible browser with UI
			.build()
			.map_err(|e| eyre!("Failed to build browser config: {e}"))?
	} else {
		BrowserConfig::builder().build().map_err(|e| eyre!("Failed to build browser config: {e}"))?
	};

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {e}"))?;

	// Spawn a task to handle browser events (suppress errors as they're mostly noise)
	let handle = tokio::spawn(async move {
		while let Some(_event) = handler.next().await {
			// Silently consume events to prevent the browser from hanging
		}
	});

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {e}"))?;

	if let Err(e) = login::login_and_navigate(&page, &config).await {
		elog!("{e}");
		run_stop_hook(config.stop_hook.as_deref(), &format!("Login failed: {e}"));
		return Err(e);
	}

	let stop = StopHandle::default();
	{
		let stop = stop.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				log!("Ctrl-C received, stopping after the current step...");
				stop.stop();
			}
		});
	}

	let course = BrowserPage::new(page);
	let state = RunState::new(checkpoint_store(), stop);
	let mut sequencer = Sequencer::new(&course, &map, &bank, Timings::from(&config), state).with_stop_hook(config.stop_hook.clone());
	sequencer.run().await;

	browser.close().await.map_err(|e| eyre!("Failed to close browser: {e}"))?;
	drop(browser);
	handle.abort();

	Ok(())
}
