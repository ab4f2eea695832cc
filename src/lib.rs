use std::fmt;

use serde::{Deserialize, Serialize};

pub mod answer_bank;
pub mod config;
pub mod handlers;
pub mod login;
pub mod matcher;
pub mod page;
pub mod sequencer;
pub mod state;
pub mod task_map;

#[cfg(test)]
pub(crate) mod testing;

/// Detects if a URL belongs to the course player (as opposed to SSO or the dashboard)
pub fn is_course_url(url: &str) -> bool {
	url.contains("ucontent.unipus.cn") || url.contains("/course/")
}

/// A single selectable option inside a choice question block
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChoiceOption {
	/// Caption as rendered next to the option, usually a single letter ("A", "B", ...)
	pub caption: String,
	/// Whether this option is currently selected
	#[serde(default)]
	pub selected: bool,
}

/// One multiple-choice question on the page: an ordered set of options
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ChoiceBlock {
	pub options: Vec<ChoiceOption>,
}

impl ChoiceBlock {
	/// Position of the option whose caption equals `letter`
	pub fn position_of(&self, letter: char) -> Option<usize> {
		self.options.iter().position(|o| {
			let mut chars = o.caption.trim().chars();
			chars.next() == Some(letter) && chars.next().is_none()
		})
	}
}

/// A free-text answer slot (text area or labeled input)
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TextInput {
	/// Current value, empty when unanswered
	#[serde(default)]
	pub value: String,
}

impl TextInput {
	pub fn is_filled(&self) -> bool {
		!self.value.trim().is_empty()
	}
}

/// Everything answerable that is currently rendered
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct QuizView {
	#[serde(default)]
	pub blocks: Vec<ChoiceBlock>,
	#[serde(default)]
	pub inputs: Vec<TextInput>,
}

impl fmt::Display for QuizView {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, block) in self.blocks.iter().enumerate() {
			write!(f, "{}.", i + 1)?;
			for option in &block.options {
				if option.selected {
					write!(f, " (x) {}", option.caption)?;
				} else {
					write!(f, " ( ) {}", option.caption)?;
				}
			}
			writeln!(f)?;
		}
		for (i, input) in self.inputs.iter().enumerate() {
			if input.is_filled() {
				writeln!(f, "[{}] {}", i + 1, input.value)?;
			} else {
				writeln!(f, "[{}] ____________________", i + 1)?;
			}
		}
		Ok(())
	}
}
