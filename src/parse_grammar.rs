//! Recursive-descent parsing of grammar text into a [`BinarizedGrammar`].
//!
//! The format is one rule per line, `;`-terminated, with an optional
//! probability suffix (defaulting to 1.0):
//!
//! ```text
//! // take the block
//! VP -> V NP : 0.9;
//! NP -> DET N : 0.8;
//! NP -> N : 0.2;       // unary
//! X0 => DET N;         // pass-through rule introduced by binarization
//! DET -> the;          // lower-case initial = terminal word
//! ```

use regex::Regex;
use std::str::FromStr;

use crate::error::Error;
use crate::grammar::{BinarizedGrammar, Rule};

type Infallible<'a, T> = (T, &'a str);
type ParseResult<'a, T> = Result<(T, &'a str), Error>;

fn err(msg: impl Into<String>) -> Error {
  Error::GrammarParse(msg.into())
}

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex, returning None if it doesn't match
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> Infallible<'a, Option<&'a str>> {
  if let Some(caps) = re.captures(s) {
    let m = caps.get(0).unwrap();
    if m.start() > 0 {
      return (None, s);
    }
    let (_, rest) = s.split_at(m.end());
    (Some(m.as_str()), rest)
  } else {
    (None, s)
  }
}

/// Try to consume a regex, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(err(format!("couldn't match {} at {:?}", re, s)))
  }
}

/// Try to consume a char, returning None if it doesn't match
fn optional_char(c: char, s: &str) -> Infallible<'_, Option<char>> {
  let mut iter = s.char_indices().peekable();
  if let Some((_, c1)) = iter.next() {
    if c == c1 {
      let rest = if let Some((idx, _)) = iter.peek() {
        s.split_at(*idx).1
      } else {
        ""
      };
      return (Some(c), rest);
    }
  }
  (None, s)
}

/// Try to consume a char, failing if it doesn't match
fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  if let (Some(c), rest) = optional_char(c, s) {
    Ok((c, rest))
  } else {
    Err(err(format!("couldn't match {} at {:?}", c, s)))
  }
}

/// Tries to skip 1 or more \s characters and comments
fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE_OR_COMMENT, r"\s*(//.*?(\n|$)\s*)*");
  optional_re(&WHITESPACE_OR_COMMENT, s).1
}

/// Tries to parse a name made of letters, numbers, - and _
fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"[a-zA-Z0-9\-_]+");
  needed_re(&NAME, s).map_err(|e| err(format!("name: {}", e)))
}

fn parse_probability(s: &str) -> ParseResult<'_, f64> {
  regex_static!(PROB, r"[0-9]+(\.[0-9]+)?");
  let (text, s) = needed_re(&PROB, s).map_err(|e| err(format!("probability: {}", e)))?;
  let p: f64 = text
    .parse()
    .map_err(|e| err(format!("probability {:?}: {}", text, e)))?;
  if p <= 0.0 || p > 1.0 {
    return Err(err(format!("probability {} outside (0, 1]", p)));
  }
  Ok((p, s))
}

fn is_terminal_name(name: &str) -> bool {
  name.chars().next().is_some_and(|c| c.is_lowercase())
}

/// Lhs symbol, arrow, productions, optional `: p`, terminated by `;`
fn parse_rule(s: &str) -> ParseResult<'_, Rule> {
  regex_static!(ARROW, r"->|=>");

  let (lhs, s) = parse_name(s).map_err(|e| err(format!("rule symbol: {}", e)))?;
  if is_terminal_name(lhs) {
    return Err(err(format!(
      "rule symbol must be a nonterminal (upper-case): {}",
      lhs
    )));
  }
  let s = skip_whitespace(s);
  let (arrow, s) = needed_re(&ARROW, s).map_err(|e| err(format!("rule arrow: {}", e)))?;
  let pass_through = arrow == "=>";

  let mut rhs: Vec<String> = Vec::new();
  let mut probability = 1.0;
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), s) = optional_char(':', rem) {
      let (p, s) = parse_probability(skip_whitespace(s))?;
      probability = p;
      rem = skip_whitespace(s);
      let (_, s) = needed_char(';', rem)?;
      rem = s;
      break;
    }
    if let (Some(_), s) = optional_char(';', rem) {
      rem = s;
      break;
    }
    let (name, s) = parse_name(rem).map_err(|e| err(format!("rule production: {}", e)))?;
    rhs.push(name.to_string());
    rem = s;
  }

  let lhs = lhs.to_string();
  let rule = match (pass_through, rhs.len()) {
    (true, 2) => {
      if rhs.iter().any(|r| is_terminal_name(r)) {
        return Err(err(format!(
          "pass-through rule {} takes two nonterminals",
          lhs
        )));
      }
      Rule::X {
        lhs,
        left: rhs[0].clone(),
        right: rhs[1].clone(),
        probability,
      }
    }
    (true, n) => {
      return Err(err(format!(
        "pass-through rule {} needs exactly two productions, got {}",
        lhs, n
      )));
    }
    (false, 1) => {
      if is_terminal_name(&rhs[0]) {
        Rule::Lexical {
          lhs,
          word: rhs[0].clone(),
          probability,
        }
      } else {
        Rule::Unary {
          lhs,
          rhs: rhs[0].clone(),
          probability,
        }
      }
    }
    (false, 2) => {
      if rhs.iter().any(|r| is_terminal_name(r)) {
        return Err(err(format!(
          "terminals must appear alone on the right-hand side: {} -> {} {}",
          lhs, rhs[0], rhs[1]
        )));
      }
      Rule::Binary {
        lhs,
        left: rhs[0].clone(),
        right: rhs[1].clone(),
        probability,
      }
    }
    (false, 0) => return Err(err(format!("rule {} has no productions", lhs))),
    (false, n) => {
      return Err(err(format!(
        "rule {} is not binarized: {} productions",
        lhs, n
      )));
    }
  };

  Ok((rule, rem))
}

fn parse_rules(s: &str) -> Result<Vec<Rule>, Error> {
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      return Ok(rules);
    }
    let (rule, s) = parse_rule(rem)?;
    rules.push(rule);
    rem = s;
  }
}

impl FromStr for BinarizedGrammar {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let rules = parse_rules(s)?;
    if rules.is_empty() {
      return Err(err("empty ruleset"));
    }
    Ok(Self::new(rules))
  }
}
