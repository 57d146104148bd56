use crate::models::PageText;
use regex::{Captures, Regex};
use std::fmt;
use std::sync::OnceLock;

/// A pure text rewrite applied to every page.
pub type CleaningRule = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Applies an ordered list of rewrite rules to page text.
pub struct TextCleaner {
    rules: Vec<CleaningRule>,
}

impl TextCleaner {
    pub fn new(rules: Vec<CleaningRule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule<F>(mut self, rule: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn clean(&self, text: &str) -> String {
        self.rules
            .iter()
            .fold(text.to_string(), |current, rule| rule(&current))
    }

    pub fn clean_pages(&self, pages: Vec<PageText>) -> Vec<PageText> {
        pages
            .into_iter()
            .map(|page| PageText {
                number: page.number,
                text: self.clean(&page.text),
            })
            .collect()
    }
}

impl Default for TextCleaner {
    /// De-hyphenation, then single-newline folding, then newline-run collapsing.
    fn default() -> Self {
        Self::empty()
            .with_rule(merge_hyphenated_words)
            .with_rule(fix_newlines)
            .with_rule(remove_multiple_newlines)
    }
}

impl fmt::Debug for TextCleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextCleaner")
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn hyphen_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w)-\n(\w)").expect("hyphen break pattern is valid"))
}

fn newline_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n+").expect("newline run pattern is valid"))
}

fn multiple_newlines_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").expect("newline pattern is valid"))
}

/// Joins a word split across lines: `"exam-\nple"` becomes `"example"`.
pub fn merge_hyphenated_words(text: &str) -> String {
    hyphen_break_regex().replace_all(text, "$1$2").into_owned()
}

/// Turns a lone newline into a space and leaves newline runs untouched.
pub fn fix_newlines(text: &str) -> String {
    newline_run_regex()
        .replace_all(text, |caps: &Captures<'_>| {
            let run = &caps[0];
            if run.len() == 1 {
                " ".to_string()
            } else {
                run.to_string()
            }
        })
        .into_owned()
}

pub fn remove_multiple_newlines(text: &str) -> String {
    multiple_newlines_regex().replace_all(text, "\n").into_owned()
}
