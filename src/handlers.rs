//! Per-(sub)task handlers and the submit sequence

use color_eyre::Result;
use v_utils::log;

use crate::{
	answer_bank::{AnswerBank, BankKey},
	config::Timings,
	matcher::{self, Action},
	page::{CoursePage, SUBMIT_CAPTIONS},
	state::{RunState, view_key},
	task_map::Method,
};

/// Seconds left unplayed when fast-forwarding, so the player still fires its own "ended"
pub const VIDEO_TAIL_SECS: f64 = 1.5;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
	Done,
	/// Number of clicks/fills applied
	Answered(usize),
	NothingToDo,
	/// The run was stopped while the handler was looping
	Stopped,
}

/// What a handler gets to see of the current view
pub struct StepCtx<'a, P: CoursePage> {
	pub page: &'a P,
	pub bank: &'a AnswerBank,
	pub timings: &'a Timings,
	/// Main task title as read from the page
	pub title: &'a str,
	/// Active tab, for composite tasks
	pub sub_task: Option<&'a str>,
}

pub async fn attempt<P: CoursePage>(method: Method, ctx: &StepCtx<'_, P>, state: &mut RunState) -> Result<Outcome> {
	match method {
		Method::Video => play_video(ctx).await,
		Method::Skip => Ok(Outcome::NothingToDo),
		Method::Vocabulary => flip_flashcards(ctx, state).await,
		Method::Quiz => answer_quiz(ctx, state).await,
	}
}

pub fn seek_target(duration: f64) -> f64 {
	if duration > VIDEO_TAIL_SECS { duration - VIDEO_TAIL_SECS } else { 0.0 }
}

async fn play_video<P: CoursePage>(ctx: &StepCtx<'_, P>) -> Result<Outcome> {
	if !ctx.page.has_video().await? {
		tracing::debug!("No video on '{}', nothing to play", ctx.title);
		return Ok(Outcome::Done);
	}

	let fast_forward = async {
		let duration = ctx.page.video_ready().await?;
		let at = seek_target(duration);
		ctx.page.seek_and_play(at).await?;
		Ok::<_, color_eyre::Report>((duration, at))
	};

	match tokio::time::timeout(ctx.timings.video_timeout, fast_forward).await {
		Ok(Ok((duration, at))) => log!("Video ({duration:.0}s) fast-forwarded to {at:.1}s"),
		Ok(Err(e)) => return Err(e),
		Err(_) => tracing::warn!("Video not playable after {:?}, moving on", ctx.timings.video_timeout),
	}
	Ok(Outcome::Done)
}

async fn flip_flashcards<P: CoursePage>(ctx: &StepCtx<'_, P>, state: &RunState) -> Result<Outcome> {
	let ceiling = ctx.timings.flashcard_max_clicks;
	let (lo, hi) = ctx.timings.flashcard_jitter_ms;
	let mut clicks = 0;

	while clicks < ceiling {
		if !state.is_active() {
			log!("Stopped after {clicks} flashcard(s)");
			return Ok(Outcome::Stopped);
		}
		if !ctx.page.click_flashcard_next().await? {
			break;
		}
		clicks += 1;
		let pause = rand::random_range(lo..=hi);
		tokio::time::sleep(std::time::Duration::from_millis(pause)).await;
	}

	if clicks == ceiling {
		tracing::warn!("Flashcard ceiling of {ceiling} reached on '{}'", ctx.title);
	} else {
		log!("Paged through {clicks} flashcard(s)");
	}
	Ok(if clicks > 0 { Outcome::Done } else { Outcome::NothingToDo })
}

async fn answer_quiz<P: CoursePage>(ctx: &StepCtx<'_, P>, state: &mut RunState) -> Result<Outcome> {
	let dedup = view_key(ctx.title, ctx.sub_task);
	if state.already_answered(&dedup) {
		tracing::debug!("Already answered {dedup}");
		return Ok(Outcome::NothingToDo);
	}

	let Some(key) = BankKey::from_title(ctx.title, ctx.sub_task) else {
		tracing::warn!("Cannot derive a unit from '{}', not answering", ctx.title);
		return Ok(Outcome::NothingToDo);
	};
	let Some(answer) = ctx.bank.get(&key) else {
		tracing::warn!("No answer in the bank for {key}");
		return Ok(Outcome::NothingToDo);
	};

	let view = ctx.page.quiz_view().await?;
	tracing::debug!("Quiz view for {key}:\n{view}");
	let plan = match matcher::plan(answer, &view) {
		Ok(plan) => plan,
		Err(mismatch) => {
			tracing::warn!("Not applying answer for {key}: {mismatch}");
			return Ok(Outcome::NothingToDo);
		}
	};

	let mut applied = 0;
	for action in &plan.actions {
		if !state.is_active() {
			return Ok(Outcome::Stopped);
		}
		if applied > 0 {
			tokio::time::sleep(ctx.timings.click).await;
		}
		match action {
			Action::Choose { block, option, letter } => {
				tracing::debug!("Question {}: {letter}", block + 1);
				ctx.page.click_choice(*block, *option).await?;
			}
			Action::Fill { input, text } => {
				tracing::debug!("Input {}: {text}", input + 1);
				ctx.page.fill_input(*input, text).await?;
			}
		}
		applied += 1;
	}
	// Only a fully applied view counts; a stopped one is picked up again on the next run
	state.record_answered(dedup);

	log!("{key}: applied {applied}, {} already answered, {} unmatched", plan.already_answered, plan.unmatched);
	Ok(if applied > 0 { Outcome::Answered(applied) } else { Outcome::NothingToDo })
}

/// Next question (if the quiz pages internally), then an allow-listed submit button, then a confirm dialog.
///
/// Returns whether anything was clicked. Callers only log this.
pub async fn submit<P: CoursePage>(page: &P, timings: &Timings) -> Result<bool> {
	let mut acted = false;

	if page.click_next_question().await? {
		log!("Clicked next question");
		acted = true;
		tokio::time::sleep(timings.submit).await;
	}

	if let Some(caption) = page.click_submit(&SUBMIT_CAPTIONS).await? {
		log!("Clicked '{caption}'");
		acted = true;
		tokio::time::sleep(timings.submit).await;

		if page.confirm_modal().await? {
			log!("Confirmed submission dialog");
			tokio::time::sleep(timings.submit).await;
		}
	}

	Ok(acted)
}
