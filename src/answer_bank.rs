//! Answer bank: `unit -> main task -> sub task -> answer`, loaded once per session.

use std::{
	collections::BTreeMap,
	fmt,
	path::{Path, PathBuf},
	sync::LazyLock,
	time::Duration,
};

use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use v_utils::{elog, log};

const BUILTIN_BANK: &str = include_str!("../data/answer_bank.json");

/// Tried in order when a task with per-tab answers is looked up without a tab
pub const COMMON_SUB_TASKS: [&str; 6] = ["Reading comprehension", "Dealing with vocabulary", "Application", "Part I", "Part II", "Part III"];

/// "1-2 iExplore 1: Learning before class" -> ("1", "iExplore 1: Learning before class")
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)-\d+\s*(.*)$").expect("static regex"));
static UNIT_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Unit\s+\d+\s*$").expect("static regex"));

/// Answers of one main task: either split per tab, or a single answer for the whole task
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskAnswers {
	Single(String),
	Parts(BTreeMap<String, String>),
}

impl TaskAnswers {
	fn count(&self) -> usize {
		match self {
			TaskAnswers::Single(_) => 1,
			TaskAnswers::Parts(parts) => parts.len(),
		}
	}
}

/// Position of the currently rendered view inside the bank
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct BankKey {
	pub unit: String,
	pub task: String,
	pub sub_task: Option<String>,
}

impl BankKey {
	/// Derive the key from the page's main task title and the active tab (if any).
	///
	/// Returns `None` when the title carries no "<unit>-<n>" id.
	pub fn from_title(title: &str, sub_task: Option<&str>) -> Option<Self> {
		let caps = TITLE_RE.captures(title.trim())?;
		let unit = format!("Unit {}", &caps[1]);
		let task = caps[2].trim_start_matches([':', '：', '.', '-', ' ']).trim().to_string();
		Some(Self {
			unit,
			task,
			sub_task: sub_task.map(str::to_string),
		})
	}
}

impl fmt::Display for BankKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} / {}", self.unit, self.task)?;
		if let Some(sub) = &self.sub_task {
			write!(f, " / {sub}")?;
		}
		Ok(())
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
	pub unit: String,
	pub task: String,
	pub sub_task: Option<String>,
	pub answer: String,
}

impl fmt::Display for SearchHit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{} / {}", self.unit, self.task)?;
		if let Some(sub) = &self.sub_task {
			write!(f, " / {sub}")?;
		}
		write!(f, "]\n{}", self.answer)
	}
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BankStats {
	pub units: usize,
	pub tasks: usize,
	pub answers: usize,
}

impl fmt::Display for BankStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} unit(s), {} task(s), {} answer(s)", self.units, self.tasks, self.answers)
	}
}

/// Where a loaded bank came from
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BankOrigin {
	Cache,
	Remote,
	Builtin,
}

/// Where to look for a bank, in order: local cache, remote URL, built-in
#[derive(Clone, Debug, Default)]
pub struct BankSource {
	pub cache_path: Option<PathBuf>,
	pub remote_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnswerBank {
	units: BTreeMap<String, BTreeMap<String, TaskAnswers>>,
}

impl AnswerBank {
	pub fn builtin() -> Self {
		// The embedded file is covered by tests, an error here means a broken build artifact
		Self::from_json(BUILTIN_BANK).unwrap_or_default()
	}

	pub fn from_json(raw: &str) -> Result<Self> {
		serde_json::from_str(raw).map_err(|e| eyre!("Failed to parse answer bank JSON: {e}"))
	}

	/// Parse the line-oriented text format:
	///
	/// ```text
	/// Unit 1
	/// ## iExplore 1: Learning before class
	/// ### Reading comprehension
	/// A B A B A
	/// ```
	///
	/// Lines under a `##` task without any `###` become that task's single answer.
	pub fn from_text(raw: &str) -> Self {
		let mut bank = Self::default();
		let mut unit: Option<String> = None;
		let mut task: Option<String> = None;
		let mut sub: Option<String> = None;
		let mut buf: Vec<&str> = Vec::new();

		for line in raw.lines() {
			let line = line.trim();
			if line.is_empty() {
				continue;
			}
			if UNIT_HEADER_RE.is_match(line) {
				bank.flush(&unit, &task, &sub, &mut buf);
				unit = Some(line.split_whitespace().collect::<Vec<_>>().join(" "));
				task = None;
				sub = None;
			} else if let Some(name) = line.strip_prefix("###") {
				bank.flush(&unit, &task, &sub, &mut buf);
				sub = Some(name.trim().to_string());
			} else if let Some(name) = line.strip_prefix("##") {
				bank.flush(&unit, &task, &sub, &mut buf);
				task = Some(name.trim().to_string());
				sub = None;
			} else if unit.is_some() && task.is_some() {
				buf.push(line);
			} else {
				tracing::debug!("Ignoring answer bank line outside of a task: {line}");
			}
		}
		bank.flush(&unit, &task, &sub, &mut buf);
		bank
	}

	fn flush(&mut self, unit: &Option<String>, task: &Option<String>, sub: &Option<String>, buf: &mut Vec<&str>) {
		if buf.is_empty() {
			return;
		}
		let answer = buf.join("\n");
		buf.clear();
		let (Some(unit), Some(task)) = (unit, task) else {
			return;
		};
		let tasks = self.units.entry(unit.clone()).or_default();
		match sub {
			Some(sub) => {
				let entry = tasks.entry(task.clone()).or_insert_with(|| TaskAnswers::Parts(BTreeMap::new()));
				if let TaskAnswers::Single(_) = entry {
					*entry = TaskAnswers::Parts(BTreeMap::new());
				}
				if let TaskAnswers::Parts(parts) = entry {
					parts.insert(sub.clone(), answer);
				}
			}
			None => {
				tasks.insert(task.clone(), TaskAnswers::Single(answer));
			}
		}
	}

	/// JSON if the body starts with `{`, the text format otherwise
	pub fn parse(body: &str) -> Result<Self> {
		let bank = if body.trim_start().starts_with('{') { Self::from_json(body)? } else { Self::from_text(body) };
		if bank.is_empty() {
			bail!("Answer bank contains no answers");
		}
		Ok(bank)
	}

	pub fn is_empty(&self) -> bool {
		self.units.values().all(|tasks| tasks.is_empty())
	}

	/// Exact lookup of the tab's answer. Without a tab (standalone task) the common sub task
	/// names are tried in order; a single-answer task answers either way.
	pub fn get(&self, key: &BankKey) -> Option<&str> {
		let task = self.units.get(&key.unit)?.get(&key.task)?;
		match task {
			TaskAnswers::Single(answer) => Some(answer.as_str()),
			TaskAnswers::Parts(parts) => match key.sub_task.as_deref() {
				// A tab without its own entry is a miss, never a sibling tab's answer
				Some(sub) => parts.get(sub).map(String::as_str),
				None => COMMON_SUB_TASKS.iter().find_map(|name| parts.get(*name)).map(String::as_str),
			},
		}
	}

	/// Case-insensitive substring search over all answers
	pub fn search(&self, keyword: &str) -> Vec<SearchHit> {
		let needle = keyword.to_lowercase();
		let mut hits = Vec::new();
		for (unit, tasks) in &self.units {
			for (task, answers) in tasks {
				let candidates: Vec<(Option<&String>, &String)> = match answers {
					TaskAnswers::Single(answer) => vec![(None, answer)],
					TaskAnswers::Parts(parts) => parts.iter().map(|(s, a)| (Some(s), a)).collect(),
				};
				for (sub, answer) in candidates {
					if answer.to_lowercase().contains(&needle) {
						hits.push(SearchHit {
							unit: unit.clone(),
							task: task.clone(),
							sub_task: sub.cloned(),
							answer: answer.clone(),
						});
					}
				}
			}
		}
		hits
	}

	pub fn stats(&self) -> BankStats {
		BankStats {
			units: self.units.len(),
			tasks: self.units.values().map(|t| t.len()).sum(),
			answers: self.units.values().flat_map(|t| t.values()).map(TaskAnswers::count).sum(),
		}
	}

	pub fn save(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent).map_err(|e| eyre!("Failed to create bank cache dir: {e}"))?;
		}
		let json = serde_json::to_string_pretty(self).map_err(|e| eyre!("Failed to serialize answer bank: {e}"))?;
		std::fs::write(path, json).map_err(|e| eyre!("Failed to write answer bank to {}: {e}", path.display()))?;
		Ok(())
	}

	pub fn load_file(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| eyre!("Failed to read {}: {e}", path.display()))?;
		Self::parse(&raw)
	}

	pub async fn fetch(url: &str) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.map_err(|e| eyre!("Failed to build HTTP client: {e}"))?;
		let body = client
			.get(url)
			.send()
			.await
			.and_then(|r| r.error_for_status())
			.map_err(|e| eyre!("Failed to fetch answer bank from {url}: {e}"))?
			.text()
			.await
			.map_err(|e| eyre!("Failed to read answer bank body: {e}"))?;
		Self::parse(&body)
	}

	/// Local cache, then remote (written back to the cache), then the built-in bank.
	///
	/// Never fails: every miss is logged and the next source is tried.
	pub async fn load(source: &BankSource) -> (Self, BankOrigin) {
		if let Some(path) = &source.cache_path {
			match Self::load_file(path) {
				Ok(bank) => {
					log!("Loaded answer bank from {} ({})", path.display(), bank.stats());
					return (bank, BankOrigin::Cache);
				}
				Err(e) => tracing::debug!("No usable cached answer bank: {e}"),
			}
		}

		if let Some(url) = &source.remote_url {
			match Self::fetch(url).await {
				Ok(bank) => {
					log!("Downloaded answer bank ({})", bank.stats());
					if let Some(path) = &source.cache_path {
						if let Err(e) = bank.save(path) {
							elog!("Failed to cache answer bank: {e}");
						}
					}
					return (bank, BankOrigin::Remote);
				}
				Err(e) => elog!("{e}"),
			}
		}

		let bank = Self::builtin();
		tracing::warn!("Using built-in answer bank ({})", bank.stats());
		(bank, BankOrigin::Builtin)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(unit: &str, task: &str, sub: Option<&str>) -> BankKey {
		BankKey {
			unit: unit.into(),
			task: task.into(),
			sub_task: sub.map(Into::into),
		}
	}

	#[test]
	fn builtin_bank_parses() {
		let bank = AnswerBank::from_json(BUILTIN_BANK).unwrap();
		assert_eq!(bank.stats(), BankStats { units: 2, tasks: 5, answers: 9 });
	}

	#[test]
	fn key_from_title() {
		let k = BankKey::from_title("1-2 iExplore 1: Learning before class", Some("Reading comprehension")).unwrap();
		assert_eq!(k, key("Unit 1", "iExplore 1: Learning before class", Some("Reading comprehension")));

		let k = BankKey::from_title("  2-6: Unit test ", None).unwrap();
		assert_eq!(k.unit, "Unit 2");
		assert_eq!(k.task, "Unit test");

		assert!(BankKey::from_title("Course overview", None).is_none());
	}

	#[test]
	fn common_sub_tasks_only_without_a_tab() {
		let bank = AnswerBank::builtin();
		assert_eq!(
			bank.get(&key("Unit 1", "iExplore 1: Learning before class", Some("Dealing with vocabulary"))),
			Some("A B A A A B")
		);
		// Unknown tab is a miss; only a tab-less lookup goes through the common names
		assert_eq!(bank.get(&key("Unit 1", "iExplore 1: Learning before class", Some("Warm up"))), None);
		assert_eq!(bank.get(&key("Unit 1", "iExplore 1: Learning before class", None)), Some("A B A B A"));
		assert_eq!(bank.get(&key("Unit 1", "Unit test", None)), Some("1) prevails\n2) a variety of\n3) interact\n4) hanging out\n5) scale\n6) In contrast\n7) crucial\n8) engage\n9) in person\n10) directly"));
		assert_eq!(bank.get(&key("Unit 9", "Unit test", None)), None);
		assert_eq!(bank.get(&key("Unit 1", "Nope", None)), None);
	}

	#[test]
	fn text_format() {
		let raw = "\
stray line before any header
Unit 3
## iExplore 1: Learning before class
### Reading comprehension
C C A B
### Application
1. First line.
2. Second line.
## Unit test
A B
Unit 4
## Opener
### Part I
D
";
		let bank = AnswerBank::parse(raw).unwrap();
		assert_eq!(bank.get(&key("Unit 3", "iExplore 1: Learning before class", Some("Reading comprehension"))), Some("C C A B"));
		assert_eq!(bank.get(&key("Unit 3", "iExplore 1: Learning before class", Some("Application"))), Some("1. First line.\n2. Second line."));
		assert_eq!(bank.get(&key("Unit 3", "Unit test", Some("Part II"))), Some("A B"));
		assert_eq!(bank.get(&key("Unit 4", "Opener", None)), Some("D"));
		assert_eq!(bank.stats(), BankStats { units: 2, tasks: 3, answers: 4 });
	}

	#[test]
	fn parse_rejects_empty() {
		assert!(AnswerBank::parse("nothing useful here").is_err());
		assert!(AnswerBank::parse("{}").is_err());
		assert!(AnswerBank::parse("{ not json").is_err());
	}

	#[test]
	fn search_is_case_insensitive() {
		let bank = AnswerBank::builtin();
		let hits = bank.search("IN CONTRAST");
		assert_eq!(hits.len(), 1);
		assert_eq!(hits[0].unit, "Unit 1");
		assert_eq!(hits[0].sub_task.as_deref(), Some("Part I"));
		assert!(bank.search("zebra").is_empty());
	}

	#[test]
	fn save_and_reload() {
		let path = std::env::temp_dir().join(format!("unipus_autopilot_bank_{}.json", std::process::id()));
		let bank = AnswerBank::builtin();
		bank.save(&path).unwrap();
		let reloaded = AnswerBank::load_file(&path).unwrap();
		std::fs::remove_file(&path).ok();
		assert_eq!(reloaded, bank);
	}

	#[tokio::test]
	async fn load_prefers_cache_then_builtin() {
		let path = std::env::temp_dir().join(format!("unipus_autopilot_cache_{}.json", std::process::id()));
		std::fs::write(&path, "Unit 7\n## Unit test\n### Part I\nA").unwrap();
		let (bank, origin) = AnswerBank::load(&BankSource {
			cache_path: Some(path.clone()),
			remote_url: None,
		})
		.await;
		std::fs::remove_file(&path).ok();
		assert_eq!(origin, BankOrigin::Cache);
		assert_eq!(bank.get(&key("Unit 7", "Unit test", Some("Part I"))), Some("A"));

		let (bank, origin) = AnswerBank::load(&BankSource {
			cache_path: Some(path),
			remote_url: None,
		})
		.await;
		assert_eq!(origin, BankOrigin::Builtin);
		assert_eq!(bank, AnswerBank::builtin());
	}
}
