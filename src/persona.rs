//! Persona flavored response lines
//!
//! The assistant's persona card carries an `activity_responses` table keyed
//! by category and subcategory. Each entry is either a single line or a list
//! of lines to pick from at random, and may contain `{placeholder}`s. A line
//! that is missing, empty or references an unknown placeholder is treated as
//! absent and the caller's built-in fallback is used instead.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PersonaLine {
    /// Always the same line
    Single(String),
    /// One of several lines, picked at random
    Many(Vec<String>),
}

impl PersonaLine {
    fn pick(&self) -> Option<&str> {
        match self {
            PersonaLine::Single(line) => Some(line.as_str()),
            PersonaLine::Many(lines) if lines.is_empty() => None,
            PersonaLine::Many(lines) => Some(lines[fastrand::usize(..lines.len())].as_str()),
        }
    }
}

/// The situations the engine has something to say about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    /// A number guessing round started
    Start,
    /// Nothing to answer in this scope
    NoActiveGame,
    /// The participant won
    Win,
    /// The participant lost
    Lose,
    /// Nobody won a duel; `{choice}`
    Tie,
    /// A trivia question is revealed; `{question}`
    TriviaStart,
    /// A trivia round ended without a winner; `{answer}`
    TriviaTimeout,
    /// A trivia winner answered quickly; `{time}`
    TriviaFastCorrect,
    /// A trivia winner; `{time}`
    TriviaCorrect,
    /// The 8-ball is being shaken
    Magic8BallAction,
}

impl Line {
    fn key(self) -> (&'static str, &'static str) {
        match self {
            Line::Start => ("games", "start"),
            Line::NoActiveGame => ("games", "no_active_game"),
            Line::Win => ("games", "win"),
            Line::Lose => ("games", "lose"),
            Line::Tie => ("games", "tie"),
            Line::TriviaStart => ("games", "trivia_start"),
            Line::TriviaTimeout => ("games", "trivia_timeout"),
            Line::TriviaFastCorrect => ("games", "trivia_fast_correct"),
            Line::TriviaCorrect => ("games", "trivia_correct"),
            Line::Magic8BallAction => ("magic_8ball", "action"),
        }
    }
}

#[derive(Deserialize)]
struct PersonaCard {
    #[serde(default)]
    activity_responses: HashMap<String, HashMap<String, PersonaLine>>,
}

/// Persona response table
#[derive(Debug, Clone, Default)]
pub struct Persona {
    responses: HashMap<String, HashMap<String, PersonaLine>>,
}

impl Persona {
    /// Loads the `activity_responses` table of a persona card
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the card is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let card: PersonaCard = serde_json::from_str(json)?;
        Ok(Self {
            responses: card.activity_responses,
        })
    }

    /// The persona's line for `line` with `args` filled in, if usable
    pub fn line(&self, line: Line, args: &[(&str, &str)]) -> Option<String> {
        let (category, subcategory) = line.key();
        let template = self.responses.get(category)?.get(subcategory)?.pick()?;
        fill(template, args).filter(|text| !text.trim().is_empty())
    }

    /// Like [`Persona::line`], using `fallback` when the persona has nothing
    pub fn say(&self, line: Line, args: &[(&str, &str)], fallback: &str) -> String {
        self.line(line, args)
            .or_else(|| fill(fallback, args))
            .unwrap_or_else(|| fallback.to_owned())
    }

    /// A random magic 8-ball answer
    pub fn magic_8ball_answer(&self) -> String {
        self.responses
            .get("magic_8ball")
            .and_then(|lines| lines.get("answers"))
            .and_then(PersonaLine::pick)
            .unwrap_or("Maybe?")
            .to_owned()
    }
}

/// Substitutes `{name}` placeholders; `None` if one has no value
///
/// `{{` and `}}` are literal braces.
fn fill(template: &str, args: &[(&str, &str)]) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(['{', '}']) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            return None;
        }

        let end = tail.find('}')?;
        let name = &tail[1..end];
        let (_, value) = args.iter().find(|(key, _)| *key == name)?;
        out.push_str(value);
        rest = &tail[end + 1..];
    }

    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const CARD: &str = r#"{
        "name": "Tsundere",
        "activity_responses": {
            "games": {
                "start": "Hmph, fine, let's play.",
                "trivia_start": ["Answer this: {question}", "Try this one: {question}"],
                "trivia_timeout": "Time! It was {answer}, {who}.",
                "lose": []
            },
            "magic_8ball": {
                "action": "*shakes the ball*",
                "answers": ["Obviously.", "Ask again later."]
            }
        }
    }"#;

    #[test]
    fn test_single_and_many_lines() {
        let persona = Persona::from_json(CARD).unwrap();
        assert_eq!(
            persona.line(Line::Start, &[]),
            Some("Hmph, fine, let's play.".to_owned())
        );

        let started = persona
            .line(Line::TriviaStart, &[("question", "2 + 2?")])
            .unwrap();
        assert!(started == "Answer this: 2 + 2?" || started == "Try this one: 2 + 2?");
    }

    #[test]
    fn test_unknown_placeholder_falls_back() {
        let persona = Persona::from_json(CARD).unwrap();
        assert_eq!(persona.line(Line::TriviaTimeout, &[("answer", "tokyo")]), None);
        assert_eq!(
            persona.say(
                Line::TriviaTimeout,
                &[("answer", "tokyo")],
                "Time's up! The answer was {answer}."
            ),
            "Time's up! The answer was tokyo."
        );
    }

    #[test]
    fn test_missing_or_empty_lines_fall_back() {
        let persona = Persona::from_json(CARD).unwrap();
        assert_eq!(persona.line(Line::Lose, &[]), None);
        assert_eq!(persona.say(Line::Win, &[], "You won!"), "You won!");
        assert_eq!(
            Persona::default().say(Line::Tie, &[("choice", "rock")], "We both picked {choice}!"),
            "We both picked rock!"
        );
    }

    #[test]
    fn test_magic_8ball_answers() {
        let persona = Persona::from_json(CARD).unwrap();
        let answer = persona.magic_8ball_answer();
        assert!(answer == "Obviously." || answer == "Ask again later.");
        assert_eq!(Persona::default().magic_8ball_answer(), "Maybe?");
    }

    #[test]
    fn test_fill() {
        assert_eq!(fill("{a} and {b}", &[("a", "1"), ("b", "2")]), Some("1 and 2".to_owned()));
        assert_eq!(fill("{{literal}}", &[]), Some("{literal}".to_owned()));
        assert_eq!(fill("{missing}", &[]), None);
        assert_eq!(fill("unclosed {", &[]), None);
        assert_eq!(fill("stray }", &[]), None);
    }

    #[test]
    fn test_card_without_responses() {
        let persona = Persona::from_json(r#"{"name": "Plain"}"#).unwrap();
        assert_eq!(persona.line(Line::Start, &[]), None);
        assert!(Persona::from_json("[]").is_err());
    }
}
