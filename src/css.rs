//! Structural checks for generated CSS fragments.
//!
//! A fragment is a flat list of style rules plus `@keyframes`, `@media` and
//! `@supports` blocks. Block structure and declarations are checked here;
//! selectors are tokenized with simplecss. A fragment for one class may only
//! select that class and may not redefine keyframes owned by another block,
//! so merging it can never change how earlier classes render.
use crate::state::CLASS_BLOCK_ATTR;
use regex::Regex;
use simplecss::{AttributeOperator, SelectorToken, SelectorTokenizer};
use std::collections::BTreeSet;

/// Element names allowed as type selectors.
const ELEMENT_NAMES: &[&str] = &[
    "html",
    "body",
    "svg",
    "g",
    "path",
    "rect",
    "circle",
    "ellipse",
    "line",
    "polyline",
    "polygon",
    "text",
    "tspan",
    "textPath",
    "use",
    "image",
    "defs",
    "symbol",
    "marker",
    "clipPath",
    "mask",
    "pattern",
    "linearGradient",
    "radialGradient",
    "stop",
    "filter",
    "foreignObject",
    "a",
    "switch",
];

/// Names a fragment for one class must leave alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservedNames {
    /// Every other class in the document.
    pub classes: BTreeSet<String>,
    /// Keyframes defined by other classes' blocks.
    pub keyframes: BTreeSet<String>,
}

impl ReservedNames {
    /// Collect the names owned by everything except `class` in a document
    /// shaped like [`AnimationState::current_html`](crate::state::AnimationState::current_html).
    pub fn from_document(html: &str, class: &str) -> Result<Self, regex::Error> {
        let class_attr = Regex::new(r#"\bclass\s*=\s*["']([^"']*)["']"#)?;
        let block = Regex::new(&format!(
            r#"(?s)<style {CLASS_BLOCK_ATTR}="([^"]*)">(.*?)</style>"#
        ))?;
        let keyframes = Regex::new(r"@(?:-webkit-)?keyframes\s+(-?[A-Za-z_][A-Za-z0-9_-]*)")?;

        let mut reserved = Self::default();
        for caps in class_attr.captures_iter(html) {
            reserved.classes.extend(
                caps[1]
                    .split_whitespace()
                    .filter(|name| *name != class)
                    .map(str::to_string),
            );
        }
        for caps in block.captures_iter(html) {
            if &caps[1] == class {
                continue;
            }
            reserved
                .keyframes
                .extend(keyframes.captures_iter(&caps[2]).map(|k| k[1].to_string()));
        }
        Ok(reserved)
    }
}

/// Check one class's fragment; the error is a human-readable reason.
pub fn check_fragment(class: &str, css: &str, reserved: &ReservedNames) -> Result<(), String> {
    if css.trim().is_empty() {
        return Err("empty css".to_string());
    }
    if css.contains('<') {
        return Err("css contains markup".to_string());
    }
    let code = strip_comments_and_strings(css)?;
    let mut checker = Checker {
        class,
        reserved,
        has_style_rule: false,
    };
    checker.rule_list(&split_items(&code)?)?;
    if !checker.has_style_rule {
        return Err(format!("css never selects .{class}"));
    }
    Ok(())
}

struct Checker<'a> {
    class: &'a str,
    reserved: &'a ReservedNames,
    has_style_rule: bool,
}

impl Checker<'_> {
    fn rule_list(&mut self, items: &[Item<'_>]) -> Result<(), String> {
        for item in items {
            match *item {
                Item::Statement(text) => {
                    return Err(format!("unexpected statement `{}`", excerpt(text)));
                }
                Item::Block { prelude, body } => match prelude.strip_prefix('@') {
                    Some(at_rule) => self.at_rule(at_rule, body)?,
                    None => {
                        self.selector_list(prelude)?;
                        declarations(body)?;
                        self.has_style_rule = true;
                    }
                },
            }
        }
        Ok(())
    }

    fn at_rule(&mut self, at_rule: &str, body: &str) -> Result<(), String> {
        let (name, rest) = at_rule
            .split_once(char::is_whitespace)
            .unwrap_or((at_rule, ""));
        let rest = rest.trim();
        match name.to_ascii_lowercase().as_str() {
            "keyframes" | "-webkit-keyframes" => {
                if !is_ident(rest) {
                    return Err(format!("invalid @keyframes name `{}`", excerpt(rest)));
                }
                if self.reserved.keyframes.contains(rest) {
                    return Err(format!(
                        "@keyframes {rest} is already defined by another class"
                    ));
                }
                keyframe_blocks(body)
            }
            "media" | "supports" => {
                if rest.is_empty() {
                    return Err(format!("@{name} without a condition"));
                }
                self.rule_list(&split_items(body)?)
            }
            _ => Err(format!("unsupported at-rule @{name}")),
        }
    }

    fn selector_list(&self, prelude: &str) -> Result<(), String> {
        if prelude.is_empty() {
            return Err("style rule without a selector".to_string());
        }
        for selector in split_top_level(prelude, ',') {
            let selector = selector.trim();
            if selector.is_empty() {
                return Err(format!("empty selector in `{}`", excerpt(prelude)));
            }
            self.selector(selector)?;
        }
        Ok(())
    }

    fn selector(&self, selector: &str) -> Result<(), String> {
        // Pseudo-elements tokenize as pseudo-classes.
        let normalized = selector.replace("::", ":");
        let mut selects_own = false;
        for token in SelectorTokenizer::from(normalized.as_str()) {
            let token = token
                .map_err(|err| format!("invalid selector `{}`: {err}", excerpt(selector)))?;
            match token {
                SelectorToken::AttributeSelector("class", AttributeOperator::Contains(name)) => {
                    if name == self.class {
                        selects_own = true;
                    } else if self.reserved.classes.contains(name) {
                        return Err(format!("selector `{selector}` targets class `{name}`"));
                    }
                }
                SelectorToken::TypeSelector(name) if !ELEMENT_NAMES.iter().any(|e| *e == name) => {
                    return Err(format!(
                        "selector `{}` uses unknown element `{name}`",
                        excerpt(selector)
                    ));
                }
                _ => {}
            }
        }
        if !selects_own {
            return Err(format!(
                "selector `{}` does not select .{}",
                excerpt(selector),
                self.class
            ));
        }
        Ok(())
    }
}

/// Top-level pieces of a rule list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item<'a> {
    Block { prelude: &'a str, body: &'a str },
    Statement(&'a str),
}

fn split_items(code: &str) -> Result<Vec<Item<'_>>, String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut body_start = 0;
    for (i, ch) in code.char_indices() {
        match (ch, depth) {
            ('{', 0) => {
                body_start = i + 1;
                depth = 1;
            }
            ('{', _) => depth += 1,
            ('}', 0) => return Err("unbalanced braces: unexpected `}`".to_string()),
            ('}', 1) => {
                items.push(Item::Block {
                    prelude: code[start..body_start - 1].trim(),
                    body: &code[body_start..i],
                });
                depth = 0;
                start = i + 1;
            }
            ('}', _) => depth -= 1,
            (';', 0) => {
                let text = code[start..i].trim();
                if !text.is_empty() {
                    items.push(Item::Statement(text));
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced braces: missing `}`".to_string());
    }
    let tail = code[start..].trim();
    if !tail.is_empty() {
        return Err(format!("text outside any rule: `{}`", excerpt(tail)));
    }
    Ok(items)
}

fn keyframe_blocks(body: &str) -> Result<(), String> {
    for item in split_items(body)? {
        match item {
            Item::Statement(text) => {
                return Err(format!("unexpected statement in @keyframes `{}`", excerpt(text)));
            }
            Item::Block { prelude, body } => {
                for stop in prelude.split(',').map(str::trim) {
                    if !is_keyframe_stop(stop) {
                        return Err(format!("invalid keyframe selector `{}`", excerpt(stop)));
                    }
                }
                declarations(body)?;
            }
        }
    }
    Ok(())
}

fn is_keyframe_stop(stop: &str) -> bool {
    if stop.eq_ignore_ascii_case("from") || stop.eq_ignore_ascii_case("to") {
        return true;
    }
    stop.strip_suffix('%')
        .and_then(|number| number.trim().parse::<f32>().ok())
        .is_some_and(|percent| (0.0..=100.0).contains(&percent))
}

fn declarations(body: &str) -> Result<(), String> {
    if body.contains('{') {
        return Err("nested block inside a style rule".to_string());
    }
    for declaration in split_top_level(body, ';') {
        let declaration = declaration.trim();
        if declaration.is_empty() {
            continue;
        }
        let (name, value) = declaration
            .split_once(':')
            .ok_or_else(|| format!("declaration without `:`: `{}`", excerpt(declaration)))?;
        let name = name.trim();
        if !is_ident(name) {
            return Err(format!("invalid property name `{}`", excerpt(name)));
        }
        if value.trim().is_empty() {
            return Err(format!("property `{name}` has no value"));
        }
    }
    Ok(())
}

/// Split on `separator` outside parentheses and brackets.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn is_ident(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    let mut chars = body.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '-')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn excerpt(text: &str) -> String {
    crate::model::preview(text, 60)
}

/// Blank out comment and string bodies so structural checks see only code.
fn strip_comments_and_strings(css: &str) -> Result<String, String> {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err("unterminated comment".to_string());
                }
                out.push(' ');
            }
            '"' | '\'' => {
                let quote = ch;
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => {
                            chars.next();
                        }
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return Err("unterminated string".to_string());
                }
                out.push_str("\"\"");
            }
            _ => out.push(ch),
        }
    }
    Ok(out)
}
