use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub name: String,
    pub input: Vec<String>,
    pub expected: Vec<String>,
}

impl TestCase {
    pub fn new<I, E, S, T>(name: impl Into<String>, input: I, expected: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            input: input.into_iter().map(Into::into).collect(),
            expected: expected.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_text(name: impl Into<String>, input: &str, expected: &str) -> Self {
        Self {
            name: name.into(),
            input: split_lines(input),
            expected: split_lines(expected),
        }
    }
}

/// Bytes fed to the candidate's stdin: every line followed by `\n`.
pub fn encode_lines<S: AsRef<str>>(lines: &[S]) -> Vec<u8> {
    let cap = lines.iter().map(|s| s.as_ref().len() + 1).sum();
    let mut buf = Vec::with_capacity(cap);
    for line in lines {
        buf.extend_from_slice(line.as_ref().as_bytes());
        buf.push(b'\n');
    }
    buf
}

/// Splits text into lines with `\n` / `\r\n` terminators removed.
/// Trailing empty lines are dropped, so `"6\n"`, `"6"` and `"6\r\n\n"` all become `["6"]`.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_owned())
        .collect();
    while lines.last().map_or(false, |s| s.is_empty()) {
        lines.pop();
    }
    lines
}
