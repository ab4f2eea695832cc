//! Decides how an answer string maps onto what is rendered: letters onto choice blocks,
//! numbered lines onto free-text inputs.

use std::sync::LazyLock;

use regex::Regex;

use crate::QuizView;

static LETTERS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z](\s*[A-Z])*$").expect("static regex"));
static ORDINAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\s*[.)]\s*").expect("static regex"));

/// What kind of answer a bank entry is
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AnswerShape {
	/// "A B A B A": one letter per choice block
	Letters(Vec<char>),
	/// "1) prevails\n2) a variety of": one line per text input, ordinals stripped
	Lines(Vec<String>),
}

impl AnswerShape {
	pub fn classify(answer: &str) -> Self {
		let trimmed = answer.trim();
		if LETTERS_RE.is_match(trimmed) {
			return AnswerShape::Letters(trimmed.chars().filter(char::is_ascii_uppercase).collect());
		}
		AnswerShape::Lines(trimmed.lines().map(strip_ordinal).filter(|l| !l.is_empty()).map(str::to_string).collect())
	}
}

/// "12) crucial" -> "crucial", "3. To say..." -> "To say...", anything else is only trimmed
pub fn strip_ordinal(line: &str) -> &str {
	let line = line.trim();
	match ORDINAL_RE.find(line) {
		Some(m) => line[m.end()..].trim(),
		None => line,
	}
}

/// One click or one fill to perform on the page
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
	Choose { block: usize, option: usize, letter: char },
	Fill { input: usize, text: String },
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Plan {
	pub actions: Vec<Action>,
	/// Positions left alone because they already hold an answer
	pub already_answered: usize,
	/// Letters/lines that had no counterpart on the page (or no matching caption)
	pub unmatched: usize,
}

/// Why nothing could be planned
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mismatch {
	/// Nothing answerable is rendered
	EmptyView,
	/// Letter answer, but the page only has text inputs
	LettersForInputs,
	/// Text answer, but the page only has choice blocks
	LinesForChoices,
}

impl std::fmt::Display for Mismatch {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Mismatch::EmptyView => write!(f, "no choice blocks or inputs on the page"),
			Mismatch::LettersForInputs => write!(f, "letter answer but the page only has text inputs"),
			Mismatch::LinesForChoices => write!(f, "text answer but the page only has choice blocks"),
		}
	}
}

/// Plan how `answer` is applied to `view`.
///
/// Choice blocks win when both kinds are rendered; letters are never typed into inputs.
pub fn plan(answer: &str, view: &QuizView) -> Result<Plan, Mismatch> {
	let shape = AnswerShape::classify(answer);
	if !view.blocks.is_empty() {
		match shape {
			AnswerShape::Letters(letters) => Ok(plan_choices(&letters, view)),
			AnswerShape::Lines(_) => Err(Mismatch::LinesForChoices),
		}
	} else if !view.inputs.is_empty() {
		match shape {
			AnswerShape::Lines(lines) => Ok(plan_inputs(&lines, view)),
			AnswerShape::Letters(_) => Err(Mismatch::LettersForInputs),
		}
	} else {
		Err(Mismatch::EmptyView)
	}
}

/// Letter i selects the option captioned with it in block i
pub fn plan_choices(letters: &[char], view: &QuizView) -> Plan {
	let mut plan = Plan::default();
	for (i, &letter) in letters.iter().enumerate() {
		let Some(block) = view.blocks.get(i) else {
			plan.unmatched += letters.len() - i;
			break;
		};
		match block.position_of(letter) {
			Some(option) if block.options[option].selected => plan.already_answered += 1,
			Some(option) => plan.actions.push(Action::Choose { block: i, option, letter }),
			None => {
				tracing::warn!("Question {} has no option '{letter}'", i + 1);
				plan.unmatched += 1;
			}
		}
	}
	plan
}

/// Line i goes into input i; a filled input keeps its value and still consumes its line
pub fn plan_inputs(lines: &[String], view: &QuizView) -> Plan {
	let mut plan = Plan::default();
	for (i, line) in lines.iter().enumerate() {
		let Some(input) = view.inputs.get(i) else {
			plan.unmatched += lines.len() - i;
			break;
		};
		if input.is_filled() {
			plan.already_answered += 1;
		} else {
			plan.actions.push(Action::Fill { input: i, text: line.clone() });
		}
	}
	plan
}
