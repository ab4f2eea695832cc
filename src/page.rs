//! Everything the automation needs from the course player, and the chromiumoxide implementation of it.
//!
//! The selector catalog lives here and nowhere else; the rest of the crate only sees [`CoursePage`].
#![allow(async_fn_in_trait)]

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use serde::de::DeserializeOwned;

use crate::QuizView;

/// Captions a submit-like button may carry before we are willing to click it
pub const SUBMIT_CAPTIONS: [&str; 6] = ["submit", "continue", "view", "提交", "继续", "查看"];

/// Whether a button caption starts with one of the allow-listed captions, ignoring case.
///
/// Prefix, not substring: "View answers" is allowed, "Preview" and "Review" are not.
pub fn caption_allowed(caption: &str, allowed: &[&str]) -> bool {
	let lower = caption.trim().to_lowercase();
	allowed.iter().any(|a| lower.starts_with(a))
}

pub trait CoursePage {
	async fn current_url(&self) -> Result<String>;

	/// Title of the active main task in the course menu, e.g. "1-2 iExplore 1: Learning before class"
	async fn main_task_label(&self) -> Result<Option<String>>;

	/// Click the sub task tab whose label equals `label` exactly. False if there is no such tab.
	async fn click_sub_tab(&self, label: &str) -> Result<bool>;

	async fn has_video(&self) -> Result<bool>;

	/// Mute the video and wait until it can play; returns its duration in seconds
	async fn video_ready(&self) -> Result<f64>;

	async fn seek_and_play(&self, at_secs: f64) -> Result<()>;

	/// Click the flashcard "next" control. False when there is no enabled one left.
	async fn click_flashcard_next(&self) -> Result<bool>;

	async fn quiz_view(&self) -> Result<QuizView>;

	async fn click_choice(&self, block: usize, option: usize) -> Result<()>;

	/// Set the value of the i-th free-text input and dispatch input/change events
	async fn fill_input(&self, input: usize, text: &str) -> Result<()>;

	/// Click an enabled "next question" control, if any
	async fn click_next_question(&self) -> Result<bool>;

	/// Click the first visible submit-like button whose caption passes [caption_allowed].
	/// Returns the caption clicked.
	async fn click_submit(&self, captions: &[&str]) -> Result<Option<String>>;

	/// Click the primary action of a modal confirmation, if one is open
	async fn confirm_modal(&self) -> Result<bool>;

	/// Ordinal navigation: open the menu item after the active one
	async fn navigate_next_task(&self) -> Result<bool>;

	/// Close "got it"/"confirm" notices that cover the player. Returns how many were closed.
	async fn dismiss_popups(&self) -> Result<usize>;
}

/// JS helpers shared by every snippet
const DOM_HELPERS_JS: &str = r#"
	function isVisible(el) {
		if (!el) return false;
		const style = window.getComputedStyle(el);
		return style.display !== 'none' && style.visibility !== 'hidden' && el.offsetParent !== null;
	}
	function isEnabled(el) {
		return !el.disabled && !el.classList.contains('disabled') && el.getAttribute('aria-disabled') !== 'true';
	}
	function captionOf(el) {
		return (el.textContent || el.value || '').trim();
	}
	function choiceBlocks() {
		return Array.from(document.querySelectorAll('.question-common-abs-choice, .question-common-abs-reply, .choice-question'))
			.filter(isVisible);
	}
	function choiceOptions(block) {
		return Array.from(block.querySelectorAll('.option, .ant-radio-wrapper, .ant-checkbox-wrapper, label'));
	}
	function textInputs() {
		return Array.from(document.querySelectorAll(
			'textarea, .question-common-abs-scoop input[type="text"], .fill-blank input, input.input-box'
		)).filter(isVisible);
	}
"#;

pub struct BrowserPage {
	page: Page,
}

impl BrowserPage {
	pub fn new(page: Page) -> Self {
		Self { page }
	}

	async fn eval_bool(&self, script: String, what: &str) -> Result<bool> {
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to {what}: {e}"))?;
		Ok(result.value().and_then(|v| v.as_bool()).unwrap_or(false))
	}

	/// Snippets hand structured results back as a JSON string
	async fn eval_json<T: DeserializeOwned>(&self, script: String, what: &str) -> Result<Option<T>> {
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to {what}: {e}"))?;
		let Some(json_str) = result.value().and_then(|v| v.as_str()) else {
			return Ok(None);
		};
		let parsed = serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse result of {what}: {e} - raw: '{json_str}'"))?;
		Ok(Some(parsed))
	}
}

pub(crate) fn js_string(s: &str) -> String {
	// serde_json string escaping is valid JS string literal syntax
	serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

impl CoursePage for BrowserPage {
	async fn current_url(&self) -> Result<String> {
		let url = self.page.url().await.map_err(|e| eyre!("Failed to get URL: {e}"))?;
		Ok(url.unwrap_or_default())
	}

	async fn main_task_label(&self) -> Result<Option<String>> {
		let script = r#"
			(function() {
				const el = document.querySelector(
					'.pc-slider-menu-micro.pc-menu-activity .pc-menu-node-name, ' +
					'.pc-menu-activity .pc-menu-node-name, .pc-header-tasks-row .pc-task-title, .layoutHeaderStyle--title'
				);
				const text = el ? el.textContent.trim() : '';
				return text.length > 0 ? text : null;
			})()
		"#;
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to read main task label: {e}"))?;
		Ok(result.value().and_then(|v| v.as_str()).map(str::to_string))
	}

	async fn click_sub_tab(&self, label: &str) -> Result<bool> {
		let script = format!(
			r#"
			(function() {{
				const wanted = {};
				const tabs = document.querySelectorAll('.pc-tab-view-container .pc-tab-view-item, .pc-task .pc-tab-title, .ant-tabs-tab');
				for (const tab of tabs) {{
					if (tab.textContent.trim() === wanted) {{
						tab.click();
						return true;
					}}
				}}
				return false;
			}})()
			"#,
			js_string(label)
		);
		self.eval_bool(script, "click sub task tab").await
	}

	async fn has_video(&self) -> Result<bool> {
		self.eval_bool("document.querySelector('video') !== null".to_string(), "look for video").await
	}

	async fn video_ready(&self) -> Result<f64> {
		// Resolves on canplay (or immediately if the element is already ready)
		let script = r#"
			(async function() {
				const v = document.querySelector('video');
				if (!v) return 0;
				v.muted = true;
				if (v.readyState < 3) {
					await new Promise((resolve) => v.addEventListener('canplay', resolve, { once: true }));
				}
				return Number.isFinite(v.duration) ? v.duration : 0;
			})()
		"#;
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed waiting for video: {e}"))?;
		Ok(result.value().and_then(|v| v.as_f64()).unwrap_or(0.0))
	}

	async fn seek_and_play(&self, at_secs: f64) -> Result<()> {
		let script = format!(
			r#"
			(async function() {{
				const v = document.querySelector('video');
				if (!v) return false;
				v.muted = true;
				v.currentTime = {at_secs};
				try {{ await v.play(); }} catch (e) {{ return false; }}
				return true;
			}})()
			"#
		);
		if !self.eval_bool(script, "play video").await? {
			tracing::warn!("Video refused to play after seeking to {at_secs:.1}s");
		}
		Ok(())
	}

	async fn click_flashcard_next(&self) -> Result<bool> {
		let script = format!(
			r#"
			(function() {{
				{DOM_HELPERS_JS}
				const next = Array.from(document.querySelectorAll('.vocActions .action.next, .vocabulary-next, .card-next'))
					.find(el => isVisible(el) && isEnabled(el));
				if (!next) return false;
				next.click();
				return true;
			}})()
			"#
		);
		self.eval_bool(script, "click flashcard next").await
	}

	async fn quiz_view(&self) -> Result<QuizView> {
		let script = format!(
			r#"
			(function() {{
				{DOM_HELPERS_JS}
				const blocks = choiceBlocks().map(block => ({{
					options: choiceOptions(block).map(opt => {{
						const caption = (opt.querySelector('.caption, .option-index') || opt).textContent.trim();
						const input = opt.querySelector('input');
						const selected = opt.classList.contains('selected') ||
							opt.classList.contains('ant-radio-wrapper-checked') ||
							(input ? input.checked : false);
						return {{ caption: caption, selected: selected }};
					}})
				}}));
				const inputs = textInputs().map(el => ({{ value: el.value || '' }}));
				return JSON.stringify({{ blocks: blocks, inputs: inputs }});
			}})()
			"#
		);
		let view: Option<QuizView> = self.eval_json(script, "parse quiz view").await?;
		Ok(view.unwrap_or_default())
	}

	async fn click_choice(&self, block: usize, option: usize) -> Result<()> {
		let script = format!(
			r#"
			(function() {{
				{DOM_HELPERS_JS}
				const b = choiceBlocks()[{block}];
				if (!b) return false;
				const opt = choiceOptions(b)[{option}];
				if (!opt) return false;
				const input = opt.querySelector('input');
				(input || opt).click();
				return true;
			}})()
			"#
		);
		if !self.eval_bool(script, "click choice").await? {
			return Err(eyre!("Choice {option} of question {} is not on the page", block + 1));
		}
		Ok(())
	}

	async fn fill_input(&self, input: usize, text: &str) -> Result<()> {
		let script = format!(
			r#"
			(function() {{
				{DOM_HELPERS_JS}
				const el = textInputs()[{input}];
				if (!el) return false;
				const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
				// Framework-controlled inputs ignore plain `.value =` assignments
				Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {});
				el.dispatchEvent(new Event('input', {{ bubbles: true }}));
				el.dispatchEvent(new Event('change', {{ bubbles: true }}));
				return true;
			}})()
			"#,
			js_string(text)
		);
		if !self.eval_bool(script, "fill input").await? {
			return Err(eyre!("Input {} is not on the page", input + 1));
		}
		Ok(())
	}

	async fn click_next_question(&self) -> Result<bool> {
		let script = format!(
			r#"
			(function() {{
				{DOM_HELPERS_JS}
				const next = Array.from(document.querySelectorAll('.question-common-course-page .next, .btn-next-question, .ques-next'))
					.find(el => isVisible(el) && isEnabled(el));
				if (!next) return false;
				next.click();
				return true;
			}})()
			"#
		);
		self.eval_bool(script, "click next question").await
	}

	async fn click_submit(&self, captions: &[&str]) -> Result<Option<String>> {
		let allowed = serde_json::to_string(captions).map_err(|e| eyre!("Failed to encode captions: {e}"))?;
		let script = format!(
			r#"
			(function() {{
				{DOM_HELPERS_JS}
				const allowed = {allowed};
				const selectors = [
					'.btn-submit',
					'.submit-bar-pc--btn',
					'.question-common-course-page button.ant-btn-primary',
					'button.ant-btn-primary',
					'button[type="submit"]'
				];
				for (const selector of selectors) {{
					for (const btn of document.querySelectorAll(selector)) {{
						if (!isVisible(btn) || !isEnabled(btn)) continue;
						const caption = captionOf(btn);
						const lower = caption.toLowerCase();
						if (allowed.some(a => lower.startsWith(a))) {{
							btn.click();
							return JSON.stringify(caption);
						}}
					}}
				}}
				return null;
			}})()
			"#
		);
		self.eval_json(script, "click submit").await
	}

	async fn confirm_modal(&self) -> Result<bool> {
		let script = format!(
			r#"
			(function() {{
				{DOM_HELPERS_JS}
				const btn = Array.from(document.querySelectorAll(
					'.ant-modal-confirm-btns .ant-btn-primary, .ant-modal-footer .ant-btn-primary, [role="dialog"] button.ant-btn-primary'
				)).find(isVisible);
				if (!btn) return false;
				btn.click();
				return true;
			}})()
			"#
		);
		self.eval_bool(script, "confirm modal").await
	}

	async fn navigate_next_task(&self) -> Result<bool> {
		let script = r#"
			(function() {
				const items = Array.from(document.querySelectorAll('.pc-slider-menu-micro'));
				const active = items.findIndex(el => el.classList.contains('pc-menu-activity'));
				const next = active >= 0 ? items[active + 1] : null;
				if (!next) return false;
				(next.querySelector('.pc-menu-node-name') || next).click();
				return true;
			})()
		"#;
		self.eval_bool(script.to_string(), "navigate to next task").await
	}

	async fn dismiss_popups(&self) -> Result<usize> {
		let script = format!(
			r#"
			(function() {{
				{DOM_HELPERS_JS}
				const captions = ['知道了', '确定', '确认', 'Got it', 'OK'];
				let closed = 0;
				for (const btn of document.querySelectorAll('.dialog-header-pc--dialog-header button, .ant-modal button, .know-box .iKnow')) {{
					if (isVisible(btn) && captions.includes(captionOf(btn))) {{
						btn.click();
						closed += 1;
					}}
				}}
				return closed;
			}})()
			"#
		);
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to dismiss popups: {e}"))?;
		Ok(result.value().and_then(|v| v.as_u64()).unwrap_or(0) as usize)
	}
}
