//! Parser for the constrained call syntax the planner model must emit.
//!
//! Model output is untrusted text. Instead of evaluating it, we extract the
//! last fenced code block, find every `agent.<verb>(...)` call inside it,
//! and bind the arguments against the closed [`AgentAction`] set. Anything
//! outside that set, or with malformed arguments, is rejected with a
//! feedback message the worker can retry against.

use std::collections::{BTreeMap, VecDeque};

use regex::Regex;
use thiserror::Error;

use super::{AgentAction, MouseButton};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("`{verb}` is not a recognised agent action; use only the documented agent.* verbs")]
    UnknownVerb { verb: String },

    #[error("malformed agent call: {detail}")]
    MalformedCall { detail: String },

    #[error("bad argument `{arg}` for agent.{verb}: {detail}")]
    BadArgument {
        verb: String,
        arg: String,
        detail: String,
    },

    #[error("agent.{verb} is missing required argument `{arg}`")]
    MissingRequired { verb: String, arg: String },
}

impl ParseError {
    /// Feedback string appended to the conversation on a format retry.
    pub fn feedback(&self) -> String {
        self.to_string()
    }
}

/// Extracts the body of the *last* fenced code block in the model output.
/// The language tag is optional and discarded.
pub fn parse_code_block(output: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```(?:[a-zA-Z0-9_+-]*[ \t]*\r?\n)?(.*?)```").ok()?;
    re.captures_iter(output)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Finds every complete `agent.<name>(...)` call in `code`. A call is
/// complete when its parentheses balance; quoted strings are opaque to the
/// paren count, so a `)` inside a literal never closes the call.
pub fn extract_calls(code: &str) -> Vec<String> {
    let chars: Vec<char> = code.chars().collect();
    let mut calls = Vec::new();

    let mut i = 0usize;
    while i + 6 <= chars.len() {
        let is_marker = chars[i..].starts_with(&['a', 'g', 'e', 'n', 't', '.']);
        let preceded_by_ident = i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_');
        if !is_marker || preceded_by_ident {
            i += 1;
            continue;
        }

        let start = i;
        let mut j = i + 6;
        while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
            j += 1;
        }
        if j == i + 6 || j >= chars.len() || chars[j] != '(' {
            i += 1;
            continue;
        }

        // Balanced-paren scan, string-literal aware.
        let mut depth = 0i32;
        let mut in_string: Option<char> = None;
        let mut end = None;
        for (k, &c) in chars.iter().enumerate().skip(j) {
            match in_string {
                Some(quote) => {
                    if c == quote {
                        in_string = None;
                    }
                }
                None => match c {
                    '\'' | '"' => in_string = Some(c),
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(k);
                            break;
                        }
                    }
                    _ => {}
                },
            }
        }

        match end {
            Some(k) => {
                calls.push(chars[start..=k].iter().collect());
                i = k + 1;
            }
            None => {
                // Unbalanced call: never return a partial substring.
                i += 1;
            }
        }
    }

    calls
}

/// Convenience for the worker's format checkers: the model response must
/// contain a fenced block with exactly one call, and that call must bind.
pub fn parse_plan(output: &str) -> Result<(String, AgentAction), ParseError> {
    let code = parse_code_block(output).ok_or_else(|| ParseError::MalformedCall {
        detail: "no fenced code block found in the response".into(),
    })?;
    let calls = extract_calls(&code);
    match calls.len() {
        0 => Err(ParseError::MalformedCall {
            detail: "the code block contains no agent.<verb>(...) call".into(),
        }),
        1 => {
            let action = parse_call(&calls[0])?;
            Ok((calls[0].clone(), action))
        }
        n => Err(ParseError::MalformedCall {
            detail: format!("expected exactly one agent call, found {n}"),
        }),
    }
}

// ── Literal grammar ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Lit {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Lit>),
    Dict(Vec<(String, Lit)>),
    None,
}

impl Lit {
    fn type_name(&self) -> &'static str {
        match self {
            Lit::Str(_) => "string",
            Lit::Int(_) => "integer",
            Lit::Float(_) => "decimal",
            Lit::Bool(_) => "boolean",
            Lit::List(_) => "list",
            Lit::Dict(_) => "dict",
            Lit::None => "None",
        }
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(s: &str) -> Self {
        Self {
            chars: s.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn parse_ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        out
    }

    /// Quoted string; the only escape-adjacent behaviour is that the
    /// surrounding quote character terminates the literal.
    fn parse_string(&mut self, quote: char) -> Result<String, String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err("unterminated string literal".into()),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Lit, String> {
        let mut text = String::new();
        if let Some(sign @ ('-' | '+')) = self.peek() {
            text.push(sign);
            self.pos += 1;
        }
        let mut saw_dot = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.pos += 1;
            } else if c == '.' && !saw_dot {
                saw_dot = true;
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if saw_dot {
            text.parse::<f64>()
                .map(Lit::Float)
                .map_err(|_| format!("invalid decimal literal `{text}`"))
        } else {
            text.parse::<i64>()
                .map(Lit::Int)
                .map_err(|_| format!("invalid integer literal `{text}`"))
        }
    }

    fn parse_literal(&mut self) -> Result<Lit, String> {
        self.skip_ws();
        match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.pos += 1;
                self.parse_string(q).map(Lit::Str)
            }
            Some('[') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_ws();
                    if self.eat(']') {
                        return Ok(Lit::List(items));
                    }
                    items.push(self.parse_literal()?);
                    self.skip_ws();
                    if self.eat(',') {
                        continue;
                    }
                    if self.eat(']') {
                        return Ok(Lit::List(items));
                    }
                    return Err("expected `,` or `]` in list literal".into());
                }
            }
            Some('{') => {
                self.pos += 1;
                let mut entries = Vec::new();
                loop {
                    self.skip_ws();
                    if self.eat('}') {
                        return Ok(Lit::Dict(entries));
                    }
                    let key = match self.parse_literal()? {
                        Lit::Str(s) => s,
                        other => {
                            return Err(format!(
                                "dict keys must be strings, found {}",
                                other.type_name()
                            ))
                        }
                    };
                    self.skip_ws();
                    if !self.eat(':') {
                        return Err("expected `:` after dict key".into());
                    }
                    entries.push((key, self.parse_literal()?));
                    self.skip_ws();
                    if self.eat(',') {
                        continue;
                    }
                    if self.eat('}') {
                        return Ok(Lit::Dict(entries));
                    }
                    return Err("expected `,` or `}` in dict literal".into());
                }
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = self.parse_ident();
                match word.as_str() {
                    "True" | "true" => Ok(Lit::Bool(true)),
                    "False" | "false" => Ok(Lit::Bool(false)),
                    "None" | "null" => Ok(Lit::None),
                    other => Err(format!("unquoted identifier `{other}` is not a literal")),
                }
            }
            Some(c) => Err(format!("unexpected character `{c}`")),
            None => Err("unexpected end of call".into()),
        }
    }
}

// ── Argument binding ──────────────────────────────────────────────────────────

/// Keyword names are matched case-insensitively with underscores stripped,
/// so `num_clicks`, `numClicks` and `NumClicks` all bind the same parameter.
fn norm(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .collect::<String>()
        .to_ascii_lowercase()
}

struct Args {
    verb: String,
    positional: VecDeque<Lit>,
    keyword: Vec<(String, Lit)>,
}

impl Args {
    fn take(&mut self, aliases: &[&str]) -> Option<Lit> {
        for alias in aliases {
            let n = norm(alias);
            if let Some(i) = self.keyword.iter().position(|(k, _)| norm(k) == n) {
                return Some(self.keyword.remove(i).1);
            }
        }
        self.positional.pop_front()
    }

    fn require(&mut self, aliases: &[&str]) -> Result<Lit, ParseError> {
        self.take(aliases).ok_or_else(|| ParseError::MissingRequired {
            verb: self.verb.clone(),
            arg: aliases[0].to_string(),
        })
    }

    fn bad(&self, arg: &str, detail: impl Into<String>) -> ParseError {
        ParseError::BadArgument {
            verb: self.verb.clone(),
            arg: arg.to_string(),
            detail: detail.into(),
        }
    }

    fn str_of(&self, arg: &str, lit: Lit) -> Result<String, ParseError> {
        match lit {
            Lit::Str(s) => Ok(s),
            other => Err(self.bad(arg, format!("expected a string, found {}", other.type_name()))),
        }
    }

    fn opt_str_of(&self, arg: &str, lit: Lit) -> Result<Option<String>, ParseError> {
        match lit {
            Lit::None => Ok(None),
            other => self.str_of(arg, other).map(Some),
        }
    }

    fn int_of(&self, arg: &str, lit: Lit) -> Result<i64, ParseError> {
        match lit {
            Lit::Int(i) => Ok(i),
            other => Err(self.bad(arg, format!("expected an integer, found {}", other.type_name()))),
        }
    }

    fn float_of(&self, arg: &str, lit: Lit) -> Result<f64, ParseError> {
        match lit {
            Lit::Int(i) => Ok(i as f64),
            Lit::Float(f) => Ok(f),
            other => Err(self.bad(arg, format!("expected a number, found {}", other.type_name()))),
        }
    }

    fn bool_of(&self, arg: &str, lit: Lit) -> Result<bool, ParseError> {
        match lit {
            Lit::Bool(b) => Ok(b),
            other => Err(self.bad(arg, format!("expected a boolean, found {}", other.type_name()))),
        }
    }

    fn button_of(&self, arg: &str, lit: Lit) -> Result<MouseButton, ParseError> {
        let s = self.str_of(arg, lit)?;
        MouseButton::parse(&s)
            .ok_or_else(|| self.bad(arg, format!("`{s}` is not one of left|right|middle")))
    }

    /// A list of strings; a bare string is promoted to a one-element list.
    fn str_list_of(&self, arg: &str, lit: Lit) -> Result<Vec<String>, ParseError> {
        match lit {
            Lit::Str(s) => Ok(vec![s]),
            Lit::List(items) => items
                .into_iter()
                .map(|item| self.str_of(arg, item))
                .collect(),
            other => Err(self.bad(
                arg,
                format!("expected a list of strings, found {}", other.type_name()),
            )),
        }
    }

    fn scalar_map_of(
        &self,
        arg: &str,
        lit: Lit,
    ) -> Result<BTreeMap<String, serde_json::Value>, ParseError> {
        let entries = match lit {
            Lit::Dict(entries) => entries,
            other => {
                return Err(self.bad(
                    arg,
                    format!("expected a dict of cell -> value, found {}", other.type_name()),
                ))
            }
        };
        let mut map = BTreeMap::new();
        for (key, value) in entries {
            let scalar = match value {
                Lit::Str(s) => serde_json::Value::String(s),
                Lit::Int(i) => serde_json::Value::from(i),
                Lit::Float(f) => serde_json::Value::from(f),
                Lit::Bool(b) => serde_json::Value::Bool(b),
                Lit::None => serde_json::Value::Null,
                other => {
                    return Err(self.bad(
                        arg,
                        format!("cell values must be scalars, found {}", other.type_name()),
                    ))
                }
            };
            map.insert(key, scalar);
        }
        Ok(map)
    }

    /// All declared parameters consumed; anything left over is a mistake the
    /// model should hear about.
    fn finish(self) -> Result<(), ParseError> {
        if let Some((name, _)) = self.keyword.into_iter().next() {
            return Err(ParseError::BadArgument {
                verb: self.verb,
                arg: name,
                detail: "unexpected keyword argument".into(),
            });
        }
        if !self.positional.is_empty() {
            return Err(ParseError::MalformedCall {
                detail: format!("too many positional arguments for agent.{}", self.verb),
            });
        }
        Ok(())
    }
}

/// Parses a single extracted `agent.<verb>(...)` call into a typed action.
pub fn parse_call(call: &str) -> Result<AgentAction, ParseError> {
    let mut cur = Cursor::new(call.trim());

    for expected in ['a', 'g', 'e', 'n', 't', '.'] {
        if !cur.eat(expected) {
            return Err(ParseError::MalformedCall {
                detail: "call must start with `agent.`".into(),
            });
        }
    }

    let verb = cur.parse_ident();
    if verb.is_empty() {
        return Err(ParseError::MalformedCall {
            detail: "missing verb name after `agent.`".into(),
        });
    }

    cur.skip_ws();
    if !cur.eat('(') {
        return Err(ParseError::MalformedCall {
            detail: format!("expected `(` after agent.{verb}"),
        });
    }

    let mut positional = VecDeque::new();
    let mut keyword: Vec<(String, Lit)> = Vec::new();
    loop {
        cur.skip_ws();
        if cur.eat(')') {
            break;
        }
        let is_kw_start = matches!(cur.peek(), Some(c) if c.is_alphabetic() || c == '_');
        let mut bound = false;
        if is_kw_start {
            let snapshot = cur.pos;
            let name = cur.parse_ident();
            cur.skip_ws();
            if cur.eat('=') && cur.peek() != Some('=') {
                let lit = cur
                    .parse_literal()
                    .map_err(|detail| ParseError::MalformedCall { detail })?;
                keyword.push((name, lit));
                bound = true;
            } else {
                cur.pos = snapshot;
            }
        }
        if !bound {
            let lit = cur
                .parse_literal()
                .map_err(|detail| ParseError::MalformedCall { detail })?;
            positional.push_back(lit);
        }
        cur.skip_ws();
        if cur.eat(',') {
            continue;
        }
        if cur.eat(')') {
            break;
        }
        return Err(ParseError::MalformedCall {
            detail: "expected `,` or `)` in argument list".into(),
        });
    }
    cur.skip_ws();
    if !cur.at_end() {
        return Err(ParseError::MalformedCall {
            detail: "unexpected trailing characters after the call".into(),
        });
    }

    let args = Args {
        verb: verb.clone(),
        positional,
        keyword,
    };
    bind_action(&verb, args)
}

fn bind_action(verb: &str, mut args: Args) -> Result<AgentAction, ParseError> {
    let action = match verb {
        "click" => {
            let lit = args.require(&["description"])?;
            let description = args.str_of("description", lit)?;
            let num_clicks = match args.take(&["num_clicks"]) {
                Some(lit) => {
                    let n = args.int_of("num_clicks", lit)?;
                    if n < 1 {
                        return Err(args.bad("num_clicks", "must be at least 1"));
                    }
                    n as u32
                }
                None => 1,
            };
            let button = match args.take(&["button", "button_type"]) {
                Some(lit) => args.button_of("button", lit)?,
                None => MouseButton::Left,
            };
            let hold_keys = match args.take(&["hold_keys"]) {
                Some(lit) => args.str_list_of("hold_keys", lit)?,
                None => Vec::new(),
            };
            AgentAction::Click {
                description,
                num_clicks,
                button,
                hold_keys,
            }
        }
        "type" => {
            let description = match args.take(&["description", "element_description"]) {
                Some(lit) => args.opt_str_of("description", lit)?,
                None => None,
            };
            let lit = args.require(&["text"])?;
            let text = args.str_of("text", lit)?;
            let overwrite = match args.take(&["overwrite"]) {
                Some(lit) => args.bool_of("overwrite", lit)?,
                None => false,
            };
            let enter = match args.take(&["enter", "press_enter"]) {
                Some(lit) => args.bool_of("enter", lit)?,
                None => false,
            };
            AgentAction::Type {
                description,
                text,
                overwrite,
                enter,
            }
        }
        "scroll" => {
            let lit = args.require(&["description"])?;
            let description = args.str_of("description", lit)?;
            let lit = args.require(&["clicks"])?;
            let clicks = args.int_of("clicks", lit)? as i32;
            let horizontal = match args.take(&["horizontal", "shift"]) {
                Some(lit) => args.bool_of("horizontal", lit)?,
                None => false,
            };
            AgentAction::Scroll {
                description,
                clicks,
                horizontal,
            }
        }
        "drag_and_drop" => {
            let lit = args.require(&["start_desc", "start_description", "starting_description"])?;
            let start_description = args.str_of("start_desc", lit)?;
            let lit = args.require(&["end_desc", "end_description", "ending_description"])?;
            let end_description = args.str_of("end_desc", lit)?;
            let hold_keys = match args.take(&["hold_keys"]) {
                Some(lit) => args.str_list_of("hold_keys", lit)?,
                None => Vec::new(),
            };
            AgentAction::DragAndDrop {
                start_description,
                end_description,
                hold_keys,
            }
        }
        "highlight_text_span" => {
            let lit = args.require(&["start_phrase", "starting_phrase"])?;
            let start_phrase = args.str_of("start_phrase", lit)?;
            let lit = args.require(&["end_phrase", "ending_phrase"])?;
            let end_phrase = args.str_of("end_phrase", lit)?;
            let button = match args.take(&["button"]) {
                Some(lit) => args.button_of("button", lit)?,
                None => MouseButton::Left,
            };
            AgentAction::HighlightTextSpan {
                start_phrase,
                end_phrase,
                button,
            }
        }
        "hotkey" => {
            let lit = args.require(&["keys"])?;
            let mut keys = args.str_list_of("keys", lit)?;
            // Tolerate vararg style: agent.hotkey("ctrl", "t")
            while let Some(extra) = args.positional.pop_front() {
                keys.push(args.str_of("keys", extra)?);
            }
            if keys.is_empty() {
                return Err(args.bad("keys", "must contain at least one key"));
            }
            AgentAction::Hotkey { keys }
        }
        "hold_and_press" => {
            let lit = args.require(&["hold_keys"])?;
            let hold_keys = args.str_list_of("hold_keys", lit)?;
            let lit = args.require(&["press_keys"])?;
            let press_keys = args.str_list_of("press_keys", lit)?;
            AgentAction::HoldAndPress {
                hold_keys,
                press_keys,
            }
        }
        "wait" => {
            let lit = args.require(&["seconds", "time"])?;
            let seconds = args.float_of("seconds", lit)? as f32;
            if seconds < 0.0 {
                return Err(args.bad("seconds", "must be non-negative"));
            }
            AgentAction::Wait { seconds }
        }
        "done" => AgentAction::Done,
        "fail" => AgentAction::Fail,
        "call_code_agent" => {
            let task = match args.take(&["task", "task_instruction"]) {
                Some(lit) => args.opt_str_of("task", lit)?,
                None => None,
            };
            AgentAction::CallCodeAgent { task }
        }
        "switch_applications" => {
            let lit = args.require(&["app_code", "app_name", "app"])?;
            let app_code = args.str_of("app_code", lit)?;
            AgentAction::SwitchApplications { app_code }
        }
        "open" => {
            let lit = args.require(&["app_or_filename", "app_or_file_name", "name"])?;
            let app_or_filename = args.str_of("app_or_filename", lit)?;
            AgentAction::Open { app_or_filename }
        }
        "save_to_knowledge" => {
            let lit = args.require(&["notes", "text"])?;
            let notes = args.str_list_of("notes", lit)?;
            AgentAction::SaveToKnowledge { notes }
        }
        "set_cell_values" => {
            let lit = args.require(&["values", "cell_values"])?;
            let values = args.scalar_map_of("values", lit)?;
            let lit = args.require(&["app", "app_name"])?;
            let app = args.str_of("app", lit)?;
            let lit = args.require(&["sheet", "sheet_name"])?;
            let sheet = args.str_of("sheet", lit)?;
            AgentAction::SetCellValues { values, app, sheet }
        }
        other => {
            return Err(ParseError::UnknownVerb {
                verb: other.to_string(),
            })
        }
    };

    args.finish()?;
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_fenced_block_wins() {
        let output = "First:\n```python\nagent.fail()\n```\nThen:\n```\nagent.done()\n```";
        assert_eq!(parse_code_block(output).unwrap(), "agent.done()");
    }

    #[test]
    fn fenced_block_without_language_tag() {
        let output = "```\nagent.wait(1.0)\n```";
        assert_eq!(parse_code_block(output).unwrap(), "agent.wait(1.0)");
    }

    #[test]
    fn extract_ignores_parens_inside_strings() {
        let code = r#"agent.click("the (weird) button :)", 2)"#;
        let calls = extract_calls(code);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], code);
    }

    #[test]
    fn extract_skips_unbalanced_calls() {
        let calls = extract_calls("agent.click(\"oops\"");
        assert!(calls.is_empty());
    }

    #[test]
    fn extract_finds_multiple_calls() {
        let code = "agent.click(\"a\")\nagent.wait(2)";
        let calls = extract_calls(code);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], "agent.wait(2)");
    }

    #[test]
    fn extract_requires_agent_prefix_boundary() {
        let calls = extract_calls("my_agent.click(\"x\")");
        assert!(calls.is_empty());
    }

    #[test]
    fn click_defaults_round_trip() {
        let implicit = parse_call(r#"agent.click("the button")"#).unwrap();
        let explicit = parse_call(
            r#"agent.click(description="the button", num_clicks=1, button="left", hold_keys=[])"#,
        )
        .unwrap();
        assert_eq!(implicit, explicit);
    }

    #[test]
    fn type_defaults_round_trip() {
        let implicit = parse_call(r#"agent.type(None, "hello")"#).unwrap();
        let explicit =
            parse_call(r#"agent.type(description=None, text="hello", overwrite=False, enter=false)"#)
                .unwrap();
        assert_eq!(implicit, explicit);
        assert_eq!(
            implicit,
            AgentAction::Type {
                description: None,
                text: "hello".into(),
                overwrite: false,
                enter: false,
            }
        );
    }

    #[test]
    fn camel_case_keywords_bind() {
        let action = parse_call(r#"agent.click(description="x", numClicks=3)"#).unwrap();
        assert_eq!(
            action,
            AgentAction::Click {
                description: "x".into(),
                num_clicks: 3,
                button: MouseButton::Left,
                hold_keys: vec![],
            }
        );
    }

    #[test]
    fn unknown_verb_has_feedback() {
        let err = parse_call("agent.teleport()").unwrap_err();
        assert!(matches!(err, ParseError::UnknownVerb { .. }));
        assert!(!err.feedback().is_empty());
    }

    #[test]
    fn missing_required_argument() {
        let err = parse_call("agent.scroll(\"the list\")").unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingRequired {
                verb: "scroll".into(),
                arg: "clicks".into(),
            }
        );
    }

    #[test]
    fn zero_clicks_rejected() {
        let err = parse_call(r#"agent.click("x", num_clicks=0)"#).unwrap_err();
        assert!(matches!(err, ParseError::BadArgument { .. }));
    }

    #[test]
    fn hotkey_accepts_list_and_varargs() {
        let from_list = parse_call(r#"agent.hotkey(["ctrl", "t"])"#).unwrap();
        let from_varargs = parse_call(r#"agent.hotkey("ctrl", "t")"#).unwrap();
        assert_eq!(from_list, from_varargs);
    }

    #[test]
    fn empty_hotkey_rejected() {
        let err = parse_call("agent.hotkey([])").unwrap_err();
        assert!(matches!(err, ParseError::BadArgument { .. }));
    }

    #[test]
    fn wait_accepts_integer_and_decimal() {
        assert_eq!(
            parse_call("agent.wait(2)").unwrap(),
            AgentAction::Wait { seconds: 2.0 }
        );
        assert_eq!(
            parse_call("agent.wait(1.333)").unwrap(),
            AgentAction::Wait { seconds: 1.333 }
        );
        assert!(parse_call("agent.wait(-1)").is_err());
    }

    #[test]
    fn set_cell_values_binds_dict() {
        let action = parse_call(
            r#"agent.set_cell_values(values={"A1": 3, "B2": "total"}, app="calc", sheet="Sheet1")"#,
        )
        .unwrap();
        match action {
            AgentAction::SetCellValues { values, app, sheet } => {
                assert_eq!(values["A1"], serde_json::json!(3));
                assert_eq!(values["B2"], serde_json::json!("total"));
                assert_eq!(app, "calc");
                assert_eq!(sheet, "Sheet1");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn extra_keyword_rejected() {
        let err = parse_call(r#"agent.done(reason="because")"#).unwrap_err();
        assert!(matches!(err, ParseError::BadArgument { .. }));
    }

    #[test]
    fn parse_plan_requires_exactly_one_call() {
        let two = "```\nagent.click(\"a\")\nagent.wait(1)\n```";
        assert!(matches!(
            parse_plan(two),
            Err(ParseError::MalformedCall { .. })
        ));
        let one = "I will click the button.\n```\nagent.click(\"the button\")\n```";
        let (code, action) = parse_plan(one).unwrap();
        assert_eq!(code, "agent.click(\"the button\")");
        assert_eq!(action.verb(), "click");
    }
}
