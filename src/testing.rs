//! In-memory course player for driving handlers and the sequencer without a browser.

use std::{
	cell::{Cell, RefCell},
	collections::VecDeque,
};

use color_eyre::{Result, eyre::bail};

use crate::{
	ChoiceBlock, ChoiceOption, QuizView, TextInput,
	page::{CoursePage, caption_allowed},
	state::StopHandle,
};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Event {
	Tab(String),
	Seek(f64),
	Flashcard,
	Choice { block: usize, option: usize },
	Fill { input: usize, text: String },
	NextQuestion,
	Submit(String),
	Modal,
	Navigate,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FakeView {
	pub quiz: QuizView,
	/// Duration of the video, if there is one
	pub video: Option<f64>,
	/// `canplay` never fires
	pub video_stuck: bool,
	pub flashcards: u32,
	pub next_question: bool,
	pub submit_caption: Option<String>,
	pub modal_after_submit: bool,
}

impl FakeView {
	pub fn quiz(blocks: Vec<ChoiceBlock>, inputs: Vec<TextInput>) -> Self {
		Self {
			quiz: QuizView { blocks, inputs },
			..Default::default()
		}
	}
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FakeScreen {
	pub url: String,
	pub label: Option<String>,
	pub main: FakeView,
	pub tabs: Vec<(String, FakeView)>,
}

impl FakeScreen {
	pub fn new(url: &str, label: Option<&str>) -> Self {
		Self {
			url: url.to_string(),
			label: label.map(str::to_string),
			..Default::default()
		}
	}

	pub fn with_main(mut self, view: FakeView) -> Self {
		self.main = view;
		self
	}

	pub fn with_tab(mut self, name: &str, view: FakeView) -> Self {
		self.tabs.push((name.to_string(), view));
		self
	}
}

pub(crate) struct FakePage {
	screens: RefCell<VecDeque<FakeScreen>>,
	tab: Cell<Option<usize>>,
	modal_open: Cell<bool>,
	events: RefCell<Vec<Event>>,
	fail_on: Option<&'static str>,
	flashcard_stop: Option<(u32, StopHandle)>,
	flashcards_clicked: Cell<u32>,
	choice_stop: Option<(u32, StopHandle)>,
	choices_clicked: Cell<u32>,
}

impl FakePage {
	/// The first screen is the one shown; navigation moves to the next
	pub fn new(screens: Vec<FakeScreen>) -> Self {
		Self {
			screens: RefCell::new(screens.into()),
			tab: Cell::new(None),
			modal_open: Cell::new(false),
			events: RefCell::new(Vec::new()),
			fail_on: None,
			flashcard_stop: None,
			flashcards_clicked: Cell::new(0),
			choice_stop: None,
			choices_clicked: Cell::new(0),
		}
	}

	/// Every call of the named port method errors
	pub fn failing(mut self, method: &'static str) -> Self {
		self.fail_on = Some(method);
		self
	}

	/// Pull `handle` once `n` flashcards have been clicked, as a user pressing stop would
	pub fn stop_after_flashcards(mut self, n: u32, handle: StopHandle) -> Self {
		self.flashcard_stop = Some((n, handle));
		self
	}

	/// Pull `handle` once `n` options have been clicked
	pub fn stop_after_choices(mut self, n: u32, handle: StopHandle) -> Self {
		self.choice_stop = Some((n, handle));
		self
	}

	pub fn events(&self) -> Vec<Event> {
		self.events.borrow().clone()
	}

	pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
		self.events.borrow().iter().filter(|e| pred(e)).count()
	}

	pub fn choices(&self) -> Vec<(usize, usize)> {
		self.events
			.borrow()
			.iter()
			.filter_map(|e| match e {
				Event::Choice { block, option } => Some((*block, *option)),
				_ => None,
			})
			.collect()
	}

	fn record(&self, event: Event) {
		self.events.borrow_mut().push(event);
	}

	fn check(&self, method: &str) -> Result<()> {
		if self.fail_on == Some(method) {
			bail!("{method} failed: target closed");
		}
		Ok(())
	}

	fn with_view<R>(&self, f: impl FnOnce(&mut FakeView) -> R) -> Option<R> {
		let mut screens = self.screens.borrow_mut();
		let screen = screens.front_mut()?;
		let view = match self.tab.get() {
			Some(i) => &mut screen.tabs[i].1,
			None => &mut screen.main,
		};
		Some(f(view))
	}
}

pub(crate) fn abcd_blocks(n: usize) -> Vec<ChoiceBlock> {
	(0..n)
		.map(|_| ChoiceBlock {
			options: ["A", "B", "C", "D"]
				.iter()
				.map(|c| ChoiceOption {
					caption: c.to_string(),
					selected: false,
				})
				.collect(),
		})
		.collect()
}

pub(crate) fn text_inputs(values: &[&str]) -> Vec<TextInput> {
	values.iter().map(|v| TextInput { value: v.to_string() }).collect()
}

impl CoursePage for FakePage {
	async fn current_url(&self) -> Result<String> {
		self.check("current_url")?;
		Ok(self.screens.borrow().front().map(|s| s.url.clone()).unwrap_or_default())
	}

	async fn main_task_label(&self) -> Result<Option<String>> {
		self.check("main_task_label")?;
		Ok(self.screens.borrow().front().and_then(|s| s.label.clone()))
	}

	async fn click_sub_tab(&self, label: &str) -> Result<bool> {
		self.check("click_sub_tab")?;
		let found = self.screens.borrow().front().and_then(|s| s.tabs.iter().position(|(name, _)| name == label));
		match found {
			Some(i) => {
				self.tab.set(Some(i));
				self.record(Event::Tab(label.to_string()));
				Ok(true)
			}
			None => Ok(false),
		}
	}

	async fn has_video(&self) -> Result<bool> {
		self.check("has_video")?;
		Ok(self.with_view(|v| v.video.is_some()).unwrap_or(false))
	}

	async fn video_ready(&self) -> Result<f64> {
		self.check("video_ready")?;
		let (duration, stuck) = self.with_view(|v| (v.video.unwrap_or(0.0), v.video_stuck)).unwrap_or((0.0, false));
		if stuck {
			std::future::pending::<()>().await;
		}
		Ok(duration)
	}

	async fn seek_and_play(&self, at_secs: f64) -> Result<()> {
		self.check("seek_and_play")?;
		self.record(Event::Seek(at_secs));
		Ok(())
	}

	async fn click_flashcard_next(&self) -> Result<bool> {
		self.check("click_flashcard_next")?;
		let clicked = self
			.with_view(|v| {
				if v.flashcards == 0 {
					return false;
				}
				v.flashcards -= 1;
				true
			})
			.unwrap_or(false);
		if clicked {
			self.record(Event::Flashcard);
			let total = self.flashcards_clicked.get() + 1;
			self.flashcards_clicked.set(total);
			if let Some((n, handle)) = &self.flashcard_stop {
				if total >= *n {
					handle.stop();
				}
			}
		}
		Ok(clicked)
	}

	async fn quiz_view(&self) -> Result<QuizView> {
		self.check("quiz_view")?;
		Ok(self.with_view(|v| v.quiz.clone()).unwrap_or_default())
	}

	async fn click_choice(&self, block: usize, option: usize) -> Result<()> {
		self.check("click_choice")?;
		let ok = self
			.with_view(|v| {
				let Some(b) = v.quiz.blocks.get_mut(block) else { return false };
				if option >= b.options.len() {
					return false;
				}
				for (i, o) in b.options.iter_mut().enumerate() {
					o.selected = i == option;
				}
				true
			})
			.unwrap_or(false);
		if !ok {
			bail!("no option {option} in block {block}");
		}
		self.record(Event::Choice { block, option });
		let total = self.choices_clicked.get() + 1;
		self.choices_clicked.set(total);
		if let Some((n, handle)) = &self.choice_stop {
			if total >= *n {
				handle.stop();
			}
		}
		Ok(())
	}

	async fn fill_input(&self, input: usize, text: &str) -> Result<()> {
		self.check("fill_input")?;
		let ok = self
			.with_view(|v| match v.quiz.inputs.get_mut(input) {
				Some(i) => {
					i.value = text.to_string();
					true
				}
				None => false,
			})
			.unwrap_or(false);
		if !ok {
			bail!("no input {input}");
		}
		self.record(Event::Fill { input, text: text.to_string() });
		Ok(())
	}

	async fn click_next_question(&self) -> Result<bool> {
		self.check("click_next_question")?;
		let clicked = self.with_view(|v| std::mem::take(&mut v.next_question)).unwrap_or(false);
		if clicked {
			self.record(Event::NextQuestion);
		}
		Ok(clicked)
	}

	async fn click_submit(&self, captions: &[&str]) -> Result<Option<String>> {
		self.check("click_submit")?;
		let hit = self
			.with_view(|v| {
				let caption = v.submit_caption.clone()?;
				caption_allowed(&caption, captions).then_some((caption, v.modal_after_submit))
			})
			.flatten();
		let Some((caption, modal)) = hit else {
			return Ok(None);
		};
		self.record(Event::Submit(caption.clone()));
		if modal {
			self.modal_open.set(true);
		}
		Ok(Some(caption))
	}

	async fn confirm_modal(&self) -> Result<bool> {
		self.check("confirm_modal")?;
		if !self.modal_open.replace(false) {
			return Ok(false);
		}
		self.record(Event::Modal);
		Ok(true)
	}

	async fn navigate_next_task(&self) -> Result<bool> {
		self.check("navigate_next_task")?;
		self.record(Event::Navigate);
		let mut screens = self.screens.borrow_mut();
		if screens.len() < 2 {
			return Ok(false);
		}
		screens.pop_front();
		self.tab.set(None);
		Ok(true)
	}

	async fn dismiss_popups(&self) -> Result<usize> {
		self.check("dismiss_popups")?;
		Ok(0)
	}
}
