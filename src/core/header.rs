//! Purpose: Read the function prototypes libyogrt's installed header declares.
//! Exports: `HeaderDecls`, `Prototype`.
//! Role: Gives the binder the declared signature of each symbol it binds.
//! Invariants: Parameter names are dropped; types are kept with pointer stars attached.
//! Invariants: Comments, preprocessor lines, and non-prototype statements are ignored.
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::core::error::{Error, ErrorKind};

const TYPE_WORDS: &[&str] = &[
    "void", "char", "short", "int", "long", "signed", "unsigned", "float", "double", "const",
    "size_t",
];
const STORAGE_WORDS: &[&str] = &["extern", "static", "inline"];
// Words that cannot form a parameter type alone; `const time_t` names no parameter.
const PREFIX_WORDS: &[&str] = &["const", "volatile", "struct", "enum", "union"];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Prototype {
    pub ret: String,
    pub params: Vec<String>,
}

impl Prototype {
    pub fn matches(&self, ret: &str, params: &[&str]) -> bool {
        self.ret == ret && self.params.iter().map(String::as_str).eq(params.iter().copied())
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}(void)", self.ret)
        } else {
            write!(f, "{}({})", self.ret, self.params.join(", "))
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct HeaderDecls {
    prototypes: HashMap<String, Prototype>,
}

impl HeaderDecls {
    pub fn read(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read header")
                .with_path(path)
                .with_source(err)
        })?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut prototypes = HashMap::new();
        let code = strip_preprocessor(&strip_comments(text));
        for statement in code.split(';') {
            // drop anything up to an enclosing `extern "C" {` or closing brace
            let statement = statement.rsplit(['{', '}']).next().unwrap_or(statement);
            if let Some((name, prototype)) = parse_prototype(statement) {
                prototypes.insert(name, prototype);
            }
        }
        Self { prototypes }
    }

    pub fn get(&self, name: &str) -> Option<&Prototype> {
        self.prototypes.get(name)
    }

    pub fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
            out.push(' ');
        } else if let Some(after) = rest.strip_prefix("//") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
            out.push('\n');
        } else {
            let mut chars = rest.chars();
            if let Some(ch) = chars.next() {
                out.push(ch);
            }
            rest = chars.as_str();
        }
    }
    out
}

fn strip_preprocessor(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut continued = false;
    for line in text.lines() {
        let directive = continued || line.trim_start().starts_with('#');
        continued = directive && line.trim_end().ends_with('\\');
        if !directive {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn parse_prototype(statement: &str) -> Option<(String, Prototype)> {
    let statement = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    let open = statement.find('(')?;
    let close = statement.rfind(')')?;
    if close < open || !statement[close + 1..].trim().is_empty() {
        return None;
    }

    let head = statement[..open].trim();
    let name_start = head
        .char_indices()
        .rev()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);
    let name = &head[name_start..];
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let ret = normalize_type(
        &head[..name_start]
            .split_whitespace()
            .filter(|word| !STORAGE_WORDS.contains(word))
            .collect::<Vec<_>>()
            .join(" "),
    );
    if ret.is_empty() {
        return None;
    }

    let params = statement[open + 1..close].trim();
    let params = if params.is_empty() || params == "void" {
        Vec::new()
    } else {
        params.split(',').map(normalize_param).collect()
    };

    Some((name.to_string(), Prototype { ret, params }))
}

fn normalize_param(param: &str) -> String {
    let mut words: Vec<&str> = param.split_whitespace().collect();
    let typed_prefix = words
        .split_last()
        .is_some_and(|(_, head)| head.iter().any(|word| !PREFIX_WORDS.contains(word)));
    if typed_prefix {
        if let Some(&last) = words.last() {
            let bare = last.trim_start_matches('*');
            if !bare.is_empty() && !TYPE_WORDS.contains(&bare) {
                let stars = &last[..last.len() - bare.len()];
                words.pop();
                if !stars.is_empty() {
                    words.push(stars);
                }
            }
        }
    }
    normalize_type(&words.join(" "))
}

fn normalize_type(ty: &str) -> String {
    ty.replace(" *", "*").replace("* ", "*").trim().to_string()
}
