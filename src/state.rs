//! Run state carried through the sequencing loop, plus the checkpoint that survives restarts.

use std::{
	path::PathBuf,
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
};

use color_eyre::{Result, eyre::eyre};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Phase {
	Idle,
	Running,
	/// Last tick saw the same task and URL as the checkpoint and forced navigation
	Stalled,
	Stopped { reason: String },
}

/// Cooperative stop flag, shared with the Ctrl-C handler
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
	pub fn stop(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_stopped(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}

	fn reset(&self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

/// Last fully processed main task. Only ever compared against to detect a stall.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Checkpoint {
	pub last_task: String,
	pub last_url: String,
	/// Unix seconds
	pub saved_at: i64,
}

impl Checkpoint {
	pub fn now(last_task: &str, last_url: &str) -> Self {
		Self {
			last_task: last_task.to_string(),
			last_url: last_url.to_string(),
			saved_at: chrono::Utc::now().timestamp(),
		}
	}

	pub fn is_same_view(&self, task: &str, url: &str) -> bool {
		self.last_task == task && self.last_url == url
	}
}

pub trait CheckpointStore {
	fn load(&self) -> Result<Option<Checkpoint>>;
	fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;
	fn clear(&mut self) -> Result<()>;
}

/// JSON file, normally under the XDG state dir
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
}

impl FileStore {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}

	#[cfg(feature = "xdg")]
	pub fn in_state_dir() -> Self {
		Self::new(v_utils::xdg_state_dir!("checkpoint").join("last_task.json"))
	}
}

impl CheckpointStore for FileStore {
	fn load(&self) -> Result<Option<Checkpoint>> {
		if !self.path.exists() {
			return Ok(None);
		}
		let raw = std::fs::read_to_string(&self.path).map_err(|e| eyre!("Failed to read checkpoint {}: {e}", self.path.display()))?;
		let checkpoint = serde_json::from_str(&raw).map_err(|e| eyre!("Failed to parse checkpoint {}: {e}", self.path.display()))?;
		Ok(Some(checkpoint))
	}

	fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent).map_err(|e| eyre!("Failed to create checkpoint dir: {e}"))?;
		}
		let json = serde_json::to_string_pretty(checkpoint).map_err(|e| eyre!("Failed to serialize checkpoint: {e}"))?;
		std::fs::write(&self.path, json).map_err(|e| eyre!("Failed to write checkpoint {}: {e}", self.path.display()))?;
		Ok(())
	}

	fn clear(&mut self) -> Result<()> {
		if self.path.exists() {
			std::fs::remove_file(&self.path).map_err(|e| eyre!("Failed to remove checkpoint {}: {e}", self.path.display()))?;
		}
		Ok(())
	}
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	inner: Option<Checkpoint>,
}

impl CheckpointStore for MemoryStore {
	fn load(&self) -> Result<Option<Checkpoint>> {
		Ok(self.inner.clone())
	}

	fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
		self.inner = Some(checkpoint.clone());
		Ok(())
	}

	fn clear(&mut self) -> Result<()> {
		self.inner = None;
		Ok(())
	}
}

pub struct RunState {
	phase: Phase,
	processing: bool,
	/// "<page title>::<sub task>" of the last view an answer was applied to
	last_answered: Option<String>,
	label_failures: u32,
	checkpoint: Option<Checkpoint>,
	store: Box<dyn CheckpointStore>,
	stop: StopHandle,
}

impl RunState {
	/// Reads the persisted checkpoint once; an unreadable one is dropped with a warning.
	pub fn new(store: Box<dyn CheckpointStore>, stop: StopHandle) -> Self {
		let checkpoint = store.load().unwrap_or_else(|e| {
			tracing::warn!("Ignoring checkpoint: {e}");
			None
		});
		Self {
			phase: Phase::Idle,
			processing: false,
			last_answered: None,
			label_failures: 0,
			checkpoint,
			store,
			stop,
		}
	}

	pub fn phase(&self) -> &Phase {
		&self.phase
	}

	/// Running or Stalled, and nobody pulled the stop handle
	pub fn is_active(&self) -> bool {
		matches!(self.phase, Phase::Running | Phase::Stalled) && !self.stop.is_stopped()
	}

	/// Resets the per-run flags; the checkpoint is kept
	pub fn start(&mut self) {
		self.stop.reset();
		self.phase = Phase::Running;
		self.processing = false;
		self.last_answered = None;
		self.label_failures = 0;
	}

	pub fn stop(&mut self, reason: impl Into<String>) {
		let reason = reason.into();
		tracing::info!("Automation stopped: {reason}");
		self.stop.stop();
		self.phase = Phase::Stopped { reason };
	}

	/// Moves to `Stopped` if the handle was pulled from outside
	pub fn sync_stop(&mut self) {
		if self.stop.is_stopped() && !matches!(self.phase, Phase::Stopped { .. }) {
			self.phase = Phase::Stopped {
				reason: "stopped by user".to_string(),
			};
		}
	}

	pub fn mark_stalled(&mut self) {
		if self.is_active() {
			self.phase = Phase::Stalled;
		}
	}

	pub fn mark_running(&mut self) {
		if self.is_active() {
			self.phase = Phase::Running;
		}
	}

	pub fn is_processing(&self) -> bool {
		self.processing
	}

	/// Returns false if already processing
	pub fn begin_processing(&mut self) -> bool {
		if self.processing {
			return false;
		}
		self.processing = true;
		true
	}

	pub fn end_processing(&mut self) {
		self.processing = false;
	}

	pub fn already_answered(&self, key: &str) -> bool {
		self.last_answered.as_deref() == Some(key)
	}

	pub fn record_answered(&mut self, key: String) {
		self.last_answered = Some(key);
	}

	/// Returns the number of consecutive failures so far
	pub fn record_label_failure(&mut self) -> u32 {
		self.label_failures += 1;
		self.label_failures
	}

	pub fn clear_label_failures(&mut self) {
		self.label_failures = 0;
	}

	pub fn checkpoint(&self) -> Option<&Checkpoint> {
		self.checkpoint.as_ref()
	}

	pub fn is_stalled_at(&self, task: &str, url: &str) -> bool {
		self.checkpoint.as_ref().is_some_and(|c| c.is_same_view(task, url))
	}

	/// Kept in memory even if writing it out fails
	pub fn save_checkpoint(&mut self, task: &str, url: &str) {
		let checkpoint = Checkpoint::now(task, url);
		if let Err(e) = self.store.save(&checkpoint) {
			tracing::warn!("Failed to persist checkpoint: {e}");
		}
		self.checkpoint = Some(checkpoint);
	}
}

/// Dedup key of a rendered view
pub fn view_key(title: &str, sub_task: Option<&str>) -> String {
	format!("{title}::{}", sub_task.unwrap_or(""))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn state() -> RunState {
		RunState::new(Box::new(MemoryStore::default()), StopHandle::default())
	}

	#[test]
	fn lifecycle() {
		let mut s = state();
		assert_eq!(s.phase(), &Phase::Idle);
		assert!(!s.is_active());

		s.start();
		assert!(s.is_active());
		s.mark_stalled();
		assert_eq!(s.phase(), &Phase::Stalled);
		assert!(s.is_active());
		s.mark_running();
		assert_eq!(s.phase(), &Phase::Running);

		s.stop("done");
		assert_eq!(s.phase(), &Phase::Stopped { reason: "done".into() });
		assert!(!s.is_active());
		// No way back from Stopped except start()
		s.mark_running();
		assert!(!s.is_active());
		s.start();
		assert!(s.is_active());
	}

	#[test]
	fn external_stop_handle() {
		let handle = StopHandle::default();
		let mut s = RunState::new(Box::new(MemoryStore::default()), handle.clone());
		s.start();
		handle.stop();
		assert!(!s.is_active());
		s.sync_stop();
		assert!(matches!(s.phase(), Phase::Stopped { .. }));
	}

	#[test]
	fn reentrancy_guard() {
		let mut s = state();
		assert!(s.begin_processing());
		assert!(!s.begin_processing());
		s.end_processing();
		assert!(s.begin_processing());
	}

	#[test]
	fn start_resets_flags_but_keeps_checkpoint() {
		let mut s = state();
		s.start();
		s.record_answered(view_key("1-2 Reading", Some("Part I")));
		assert_eq!(s.record_label_failure(), 1);
		s.save_checkpoint("1-2 Reading", "https://x/1");
		s.start();
		assert!(!s.already_answered(&view_key("1-2 Reading", Some("Part I"))));
		assert_eq!(s.record_label_failure(), 1);
		assert!(s.is_stalled_at("1-2 Reading", "https://x/1"));
		assert!(!s.is_stalled_at("1-2 Reading", "https://x/2"));
		assert!(!s.is_stalled_at("1-3 Reading", "https://x/1"));
	}

	#[test]
	fn file_store_round_trip() {
		let path = std::env::temp_dir().join(format!("unipus_autopilot_state_{}", std::process::id())).join("cp.json");
		let mut store = FileStore::new(path.clone());
		assert_eq!(store.load().unwrap(), None);

		let cp = Checkpoint::now("2-1 Unit opener", "https://ucontent.unipus.cn/x");
		store.save(&cp).unwrap();
		assert_eq!(store.load().unwrap(), Some(cp.clone()));

		// A fresh state picks the persisted checkpoint up
		let s = RunState::new(Box::new(FileStore::new(path.clone())), StopHandle::default());
		assert!(s.is_stalled_at("2-1 Unit opener", "https://ucontent.unipus.cn/x"));

		store.clear().unwrap();
		assert_eq!(store.load().unwrap(), None);
		std::fs::remove_dir_all(path.parent().unwrap()).ok();
	}
}
