//! Drives the course one main task at a time, re-run on every navigation.

use std::{fmt, time::Instant};

use color_eyre::Result;
use v_utils::{elog, log};

use crate::{
	answer_bank::AnswerBank,
	config::Timings,
	handlers::{self, Outcome, StepCtx},
	page::CoursePage,
	state::{Phase, RunState},
	task_map::{Method, TaskKind, TaskMap},
};

/// Run the stop hook with a message if configured
pub fn run_stop_hook(hook: Option<&str>, message: &str) {
	if let Some(hook) = hook {
		log!("Running stop hook: {} {:?}", hook, message);
		// Escape single quotes for shell: replace ' with '\''
		let escaped = message.replace('\'', "'\\''");
		let _ = tokio::process::Command::new("sh").arg("-c").arg(format!("{} '{}'", hook, escaped)).spawn();
	}
}

/// What a single tick did
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TickReport {
	/// Not running, or a tick is already in progress
	Skipped,
	LabelUnreadable { failures: u32 },
	/// Same task and URL as the checkpoint: navigation was forced instead of processing
	Stalled,
	/// Title not in the task map: moved on without answering
	Unmapped { title: String },
	Completed { title: String },
	/// Stopped from outside while working on the task
	Interrupted { title: String },
	Failed { error: String },
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
	pub ticks: u32,
	pub tasks_completed: u32,
	pub steps: u32,
	pub skipped_sub_tasks: u32,
	pub answers_applied: u32,
	pub submits: u32,
	pub stalls: u32,
	pub unmapped: u32,
}

impl fmt::Display for RunStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "Tasks completed:   {}", self.tasks_completed)?;
		writeln!(f, "Steps handled:     {}", self.steps)?;
		writeln!(f, "Tabs not found:    {}", self.skipped_sub_tasks)?;
		writeln!(f, "Answers applied:   {}", self.answers_applied)?;
		writeln!(f, "Submissions:       {}", self.submits)?;
		writeln!(f, "Stalls:            {}", self.stalls)?;
		write!(f, "Unmapped tasks:    {}", self.unmapped)
	}
}

pub struct Sequencer<'a, P: CoursePage> {
	page: &'a P,
	map: &'a TaskMap,
	bank: &'a AnswerBank,
	timings: Timings,
	state: RunState,
	stats: RunStats,
	stop_hook: Option<String>,
}

impl<'a, P: CoursePage> Sequencer<'a, P> {
	pub fn new(page: &'a P, map: &'a TaskMap, bank: &'a AnswerBank, timings: Timings, state: RunState) -> Self {
		Self {
			page,
			map,
			bank,
			timings,
			state,
			stats: RunStats::default(),
			stop_hook: None,
		}
	}

	pub fn with_stop_hook(mut self, hook: Option<String>) -> Self {
		self.stop_hook = hook;
		self
	}

	pub fn state(&self) -> &RunState {
		&self.state
	}

	pub fn state_mut(&mut self) -> &mut RunState {
		&mut self.state
	}

	pub fn stats(&self) -> &RunStats {
		&self.stats
	}

	/// One pass over whatever main task is currently shown.
	///
	/// Errors never escape: any failure stops the run and is reported as [TickReport::Failed].
	pub async fn tick(&mut self) -> TickReport {
		self.state.sync_stop();
		if !self.state.is_active() || !self.state.begin_processing() {
			return TickReport::Skipped;
		}
		self.stats.ticks += 1;

		let report = match self.process().await {
			Ok(report) => report,
			Err(e) => {
				elog!("Automation halted: {e}");
				self.state.stop(format!("error: {e}"));
				TickReport::Failed { error: e.to_string() }
			}
		};

		self.state.end_processing();
		report
	}

	async fn process(&mut self) -> Result<TickReport> {
		let closed = self.page.dismiss_popups().await?;
		if closed > 0 {
			tracing::debug!("Dismissed {closed} popup(s)");
		}

		let Some(title) = self.page.main_task_label().await? else {
			let failures = self.state.record_label_failure();
			elog!("Could not read the current task title ({failures}/{})", self.timings.max_label_failures);
			if failures >= self.timings.max_label_failures {
				self.state.stop(format!("task title unreadable {failures} times in a row"));
			}
			return Ok(TickReport::LabelUnreadable { failures });
		};
		self.state.clear_label_failures();

		let url = self.page.current_url().await?;
		if self.state.is_stalled_at(&title, &url) {
			self.stats.stalls += 1;
			self.state.mark_stalled();
			log!("No progress on '{title}' since the last cycle, forcing navigation");
			if !self.page.navigate_next_task().await? {
				self.state.stop("no further task to navigate to");
			}
			return Ok(TickReport::Stalled);
		}
		self.state.mark_running();

		let Some(entry) = self.map.lookup(&title) else {
			tracing::warn!("'{title}' is not in the task map, moving to the next task");
			self.stats.unmapped += 1;
			// Seen again at the same URL, it counts as a stall like any other task
			self.state.save_checkpoint(&title, &url);
			self.page.navigate_next_task().await?;
			return Ok(TickReport::Unmapped { title });
		};

		log!("==================== {title} ====================");
		match &entry.kind {
			TaskKind::Standalone { method, needs_submit } => {
				self.run_step(*method, &title, None).await?;
				if *needs_submit {
					self.submit().await?;
				}
			}
			TaskKind::Composite { children } =>
				for sub in children {
					if !self.state.is_active() {
						log!("Stopped before '{}'", sub.name);
						return Ok(TickReport::Interrupted { title });
					}
					if !self.page.click_sub_tab(&sub.name).await? {
						tracing::warn!("Tab '{}' not found on '{title}', skipping it", sub.name);
						self.stats.skipped_sub_tasks += 1;
						continue;
					}
					log!("--- {} [{}] ---", sub.name, sub.method.name());
					tokio::time::sleep(self.timings.tab_render).await;
					self.run_step(sub.method, &title, Some(sub.name.as_str())).await?;
					if sub.needs_submit {
						self.submit().await?;
					}
				},
		}

		if !self.state.is_active() {
			return Ok(TickReport::Interrupted { title });
		}

		self.submit().await?;
		let url = self.page.current_url().await?;
		self.state.save_checkpoint(&title, &url);
		self.stats.tasks_completed += 1;

		if !self.page.navigate_next_task().await? {
			log!("'{title}' is the last task in the menu");
		}
		Ok(TickReport::Completed { title })
	}

	async fn run_step(&mut self, method: Method, title: &str, sub_task: Option<&str>) -> Result<()> {
		let ctx = StepCtx {
			page: self.page,
			bank: self.bank,
			timings: &self.timings,
			title,
			sub_task,
		};
		let outcome = handlers::attempt(method, &ctx, &mut self.state).await?;
		tracing::debug!("{} step on '{title}': {outcome:?}", method.name());
		self.stats.steps += 1;
		if let Outcome::Answered(n) = outcome {
			self.stats.answers_applied += n as u32;
		}
		Ok(())
	}

	async fn submit(&mut self) -> Result<()> {
		if handlers::submit(self.page, &self.timings).await? {
			self.stats.submits += 1;
		}
		Ok(())
	}

	/// Tick, wait for navigation (or the idle interval), repeat until stopped
	pub async fn run(&mut self) -> RunStats {
		self.state.start();
		let mut cycles = 0;

		loop {
			self.tick().await;
			cycles += 1;
			self.state.sync_stop();
			if !self.state.is_active() {
				break;
			}
			if self.timings.max_cycles.is_some_and(|max| cycles >= max) {
				self.state.stop(format!("reached {cycles} cycles"));
				break;
			}
			if let Err(e) = self.wait_for_navigation().await {
				elog!("Lost the page while waiting for navigation: {e}");
				self.state.stop(format!("error: {e}"));
				break;
			}
		}

		let reason = match self.state.phase() {
			Phase::Stopped { reason } => reason.clone(),
			other => format!("{other:?}"),
		};
		log!("Automation stopped: {reason}\n{}", self.stats);
		run_stop_hook(self.stop_hook.as_deref(), &format!("Automation stopped: {reason}"));
		self.stats.clone()
	}

	/// Returns once the URL changes, the idle interval passes, or the run is stopped
	async fn wait_for_navigation(&self) -> Result<()> {
		let initial_url = self.page.current_url().await?;
		let started = Instant::now();

		while self.state.is_active() && started.elapsed() < self.timings.idle_retick {
			tokio::time::sleep(self.timings.poll).await;

			let current_url = self.page.current_url().await?;
			if current_url != initial_url {
				// Wait a bit for the new task to render
				tokio::time::sleep(self.timings.tab_render).await;
				return Ok(());
			}
		}
		Ok(())
	}
}
