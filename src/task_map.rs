//! Authored course layout: which main tasks exist and how each one is worked through.

use std::path::Path;

use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use derive_new::new;
use serde::{Deserialize, Serialize};

/// How a single (sub)task is handled
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
	/// Play the video to its end
	Video,
	/// Nothing to do, just move on
	Skip,
	/// Page through flashcards
	Vocabulary,
	/// Fill answers from the answer bank
	Quiz,
}

impl Method {
	pub fn name(&self) -> &'static str {
		match self {
			Method::Video => "video",
			Method::Skip => "skip",
			Method::Vocabulary => "vocabulary",
			Method::Quiz => "quiz",
		}
	}
}

/// A tab inside a composite main task
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, new)]
pub struct SubTask {
	/// Exact tab label as shown on the page
	pub name: String,
	pub method: Method,
	#[serde(default)]
	pub needs_submit: bool,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskKind {
	Standalone {
		method: Method,
		#[serde(default)]
		needs_submit: bool,
	},
	/// Tabs are worked through strictly in this order
	Composite { children: Vec<SubTask> },
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TaskMapEntry {
	/// Unit-local identifier, e.g. "1-2". Must occur in the page's task title.
	pub id: String,
	pub name: String,
	#[serde(flatten)]
	pub kind: TaskKind,
}

impl TaskMapEntry {
	/// Whether `title` refers to this entry.
	///
	/// The id has to occur as a whole token: "1-1" does not match "11-1" or "1-12".
	pub fn matches(&self, title: &str) -> bool {
		let bytes = title.as_bytes();
		title.match_indices(self.id.as_str()).any(|(start, m)| {
			let end = start + m.len();
			let before_ok = start == 0 || !bytes[start - 1].is_ascii_digit();
			let after_ok = end == bytes.len() || !bytes[end].is_ascii_digit();
			before_ok && after_ok
		})
	}

	pub fn is_composite(&self) -> bool {
		matches!(self.kind, TaskKind::Composite { .. })
	}
}

/// Ordered list of every main task of one course
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TaskMap {
	pub entries: Vec<TaskMapEntry>,
}

impl TaskMap {
	pub fn new(entries: Vec<TaskMapEntry>) -> Result<Self> {
		let map = Self { entries };
		map.validate()?;
		Ok(map)
	}

	/// First entry whose id occurs in `title`
	pub fn lookup(&self, title: &str) -> Option<&TaskMapEntry> {
		self.entries.iter().find(|e| e.matches(title))
	}

	/// Rejects maps where an id could match another entry's title
	pub fn validate(&self) -> Result<()> {
		for (i, a) in self.entries.iter().enumerate() {
			if a.id.trim().is_empty() {
				bail!("Task map entry '{}' has an empty id", a.name);
			}
			if matches!(&a.kind, TaskKind::Composite { children } if children.is_empty()) {
				bail!("Composite task {} has no sub tasks", a.id);
			}
			for b in self.entries.iter().skip(i + 1) {
				if a.id == b.id {
					bail!("Duplicate task id {}", a.id);
				}
				if a.matches(&b.id) || b.matches(&a.id) {
					bail!("Ambiguous task ids {} and {}", a.id, b.id);
				}
			}
		}
		Ok(())
	}

	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| eyre!("Failed to read task map {}: {e}", path.display()))?;
		let map: TaskMap = serde_json::from_str(&raw).map_err(|e| eyre!("Failed to parse task map {}: {e}", path.display()))?;
		map.validate()?;
		Ok(map)
	}

	/// Layout of the default course ("新一代大学英语 综合教程"), units 1 through 8
	pub fn builtin() -> Self {
		let mut entries = Vec::new();
		for unit in 1..=8 {
			entries.extend(unit_layout(unit));
		}
		Self { entries }
	}
}

fn standalone(id: String, name: &str, method: Method, needs_submit: bool) -> TaskMapEntry {
	TaskMapEntry {
		id,
		name: name.to_string(),
		kind: TaskKind::Standalone { method, needs_submit },
	}
}

fn composite(id: String, name: &str, children: Vec<SubTask>) -> TaskMapEntry {
	TaskMapEntry {
		id,
		name: name.to_string(),
		kind: TaskKind::Composite { children },
	}
}

fn unit_layout(unit: u32) -> Vec<TaskMapEntry> {
	let sub = |name: &str, method, needs_submit| SubTask::new(name.to_string(), method, needs_submit);
	vec![
		standalone(format!("{unit}-1"), "Unit opener", Method::Video, false),
		composite(format!("{unit}-2"), "iExplore 1: Learning before class", vec![
			sub("Video", Method::Video, false),
			sub("Reading comprehension", Method::Quiz, true),
			sub("Dealing with vocabulary", Method::Quiz, true),
		]),
		composite(format!("{unit}-3"), "iExplore 1: Reviewing after class", vec![
			sub("Vocabulary", Method::Vocabulary, false),
			sub("Application", Method::Quiz, true),
		]),
		composite(format!("{unit}-4"), "iExplore 2: Learning before class", vec![
			sub("Video", Method::Video, false),
			sub("Reading comprehension", Method::Quiz, true),
		]),
		standalone(format!("{unit}-5"), "iProduce", Method::Skip, false),
		composite(format!("{unit}-6"), "Unit test", vec![sub("Part I", Method::Quiz, true), sub("Part II", Method::Quiz, true)]),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builtin_map_is_valid() {
		let map = TaskMap::builtin();
		map.validate().unwrap();
		assert_eq!(map.entries.len(), 48);
	}

	#[test]
	fn lookup_uses_whole_id_token() {
		let map = TaskMap::builtin();
		let entry = map.lookup("1-2 iExplore 1: Learning before class").unwrap();
		assert_eq!(entry.id, "1-2");
		assert!(entry.is_composite());

		assert_eq!(map.lookup("Unit 3 · 3-6 Unit test").unwrap().id, "3-6");
		assert!(map.lookup("11-2 Something else").is_none());
		assert!(map.lookup("Course overview").is_none());
	}

	#[test]
	fn rejects_ambiguous_ids() {
		let entries = vec![
			standalone("1-1".into(), "a", Method::Skip, false),
			standalone("1-1".into(), "b", Method::Skip, false),
		];
		assert!(TaskMap::new(entries).is_err());

		let empty = vec![composite("2-1".into(), "c", vec![])];
		assert!(TaskMap::new(empty).is_err());
	}

	#[test]
	fn parses_json_layout() {
		let raw = r#"{"entries": [
			{"id": "1-1", "name": "Opener", "kind": "standalone", "method": "video"},
			{"id": "1-2", "name": "Reading", "kind": "composite", "children": [
				{"name": "Reading comprehension", "method": "quiz", "needs_submit": true},
				{"name": "Words", "method": "vocabulary"}
			]}
		]}"#;
		let map: TaskMap = serde_json::from_str(raw).unwrap();
		map.validate().unwrap();
		match &map.entries[1].kind {
			TaskKind::Composite { children } => {
				assert_eq!(children[0], SubTask::new("Reading comprehension".into(), Method::Quiz, true));
				assert_eq!(children[1].method, Method::Vocabulary);
				assert!(!children[1].needs_submit);
			}
			other => panic!("expected composite, got {other:?}"),
		}
		assert_eq!(map.entries[0].kind, TaskKind::Standalone {
			method: Method::Video,
			needs_submit: false
		});
	}
}
