use std::time::Duration;

use v_utils::macros::{MyConfigPrimitives, Settings};

pub const DEFAULT_BANK_URL: &str = "https://raw.githubusercontent.com/twj0/Unipus_AI-4/refs/heads/main/U%E6%A0%A1%E5%9B%AD%20%E6%96%B0%E4%B8%80%E4%BB%A3%E5%A4%A7%E5%AD%A6%E8%8B%B1%E8%AF%AD%20%E7%BB%BC%E5%90%88%E6%95%99%E7%A8%8B1%E8%8B%B1%E8%AF%AD%E9%A2%98%E5%BA%93.json";

#[derive(Clone, Debug, Default, MyConfigPrimitives, Settings)]
pub struct AppConfig {
	pub username: String,
	pub password: String,
	/// Course page to open after login (the "continue learning" player URL)
	pub course_url: String,
	/// Remote answer bank (JSON or the line-oriented text format); [DEFAULT_BANK_URL] when unset
	#[serde(default)]
	pub bank_url: Option<String>,
	/// Local answer bank cache; defaults to the XDG state dir
	#[serde(default)]
	pub bank_cache: Option<String>,
	/// JSON task map for a course other than the built-in one
	#[serde(default)]
	pub task_map: Option<String>,
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
	/// Command to run on completion/error (receives message as argument)
	#[serde(default)]
	pub stop_hook: Option<String>,
	/// Wait after clicking a sub task tab, for the new view to render (default: 2000)
	#[serde(default = "default_tab_render_delay_ms")]
	pub tab_render_delay_ms: u64,
	/// Pause between consecutive answer clicks/fills (default: 400)
	#[serde(default = "default_click_delay_ms")]
	pub click_delay_ms: u64,
	/// Wait after a submit click, and between next-question and submit (default: 1500)
	#[serde(default = "default_submit_delay_ms")]
	pub submit_delay_ms: u64,
	/// Ceiling for the video handler; some players never fire `canplay` (default: 20000)
	#[serde(default = "default_video_timeout_ms")]
	pub video_timeout_ms: u64,
	/// Max flashcard "next" clicks per vocabulary sub task (default: 60)
	#[serde(default = "default_flashcard_max_clicks")]
	pub flashcard_max_clicks: u32,
	/// Random pause between flashcard clicks, lower bound (default: 400)
	#[serde(default = "default_flashcard_jitter_min_ms")]
	pub flashcard_jitter_min_ms: u64,
	/// Random pause between flashcard clicks, upper bound (default: 1200)
	#[serde(default = "default_flashcard_jitter_max_ms")]
	pub flashcard_jitter_max_ms: u64,
	/// Re-run the sequencer after this long even if the URL did not change (default: 15000)
	#[serde(default = "default_idle_retick_ms")]
	pub idle_retick_ms: u64,
	/// Consecutive unreadable task titles before giving up (default: 3)
	#[serde(default = "default_max_label_failures")]
	pub max_label_failures: u32,
	/// Stop after this many sequencer cycles; unlimited when unset
	#[serde(default)]
	pub max_cycles: Option<u32>,
}

fn default_tab_render_delay_ms() -> u64 {
	2000
}

fn default_click_delay_ms() -> u64 {
	400
}

fn default_submit_delay_ms() -> u64 {
	1500
}

fn default_video_timeout_ms() -> u64 {
	20_000
}

fn default_flashcard_max_clicks() -> u32 {
	60
}

fn default_flashcard_jitter_min_ms() -> u64 {
	400
}

fn default_flashcard_jitter_max_ms() -> u64 {
	1200
}

fn default_idle_retick_ms() -> u64 {
	15_000
}

fn default_max_label_failures() -> u32 {
	3
}

/// Waits and ceilings the automation runs with, split out of [AppConfig] so tests can zero them
#[derive(Clone, Debug)]
pub struct Timings {
	pub tab_render: Duration,
	pub click: Duration,
	pub submit: Duration,
	pub video_timeout: Duration,
	pub flashcard_max_clicks: u32,
	/// Inclusive range, milliseconds
	pub flashcard_jitter_ms: (u64, u64),
	pub idle_retick: Duration,
	/// How often the URL is polled while waiting for navigation
	pub poll: Duration,
	pub max_label_failures: u32,
	pub max_cycles: Option<u32>,
}

impl From<&AppConfig> for Timings {
	fn from(c: &AppConfig) -> Self {
		let (lo, hi) = (c.flashcard_jitter_min_ms, c.flashcard_jitter_max_ms);
		Self {
			tab_render: Duration::from_millis(c.tab_render_delay_ms),
			click: Duration::from_millis(c.click_delay_ms),
			submit: Duration::from_millis(c.submit_delay_ms),
			video_timeout: Duration::from_millis(c.video_timeout_ms),
			flashcard_max_clicks: c.flashcard_max_clicks,
			flashcard_jitter_ms: (lo.min(hi), lo.max(hi)),
			idle_retick: Duration::from_millis(c.idle_retick_ms),
			poll: Duration::from_millis(500),
			max_label_failures: c.max_label_failures.max(1),
			max_cycles: c.max_cycles,
		}
	}
}

impl AppConfig {
	/// Configured bank URL, the default one if unset. An empty string disables the remote bank.
	pub fn remote_bank_url(&self) -> Option<&str> {
		match self.bank_url.as_deref() {
			None => Some(DEFAULT_BANK_URL),
			Some("") => None,
			Some(url) => Some(url),
		}
	}
}

impl Timings {
	/// No waiting at all
	pub fn instant() -> Self {
		Self {
			tab_render: Duration::ZERO,
			click: Duration::ZERO,
			submit: Duration::ZERO,
			video_timeout: Duration::from_millis(200),
			flashcard_max_clicks: 60,
			flashcard_jitter_ms: (0, 0),
			idle_retick: Duration::ZERO,
			poll: Duration::ZERO,
			max_label_failures: 3,
			max_cycles: None,
		}
	}
}
