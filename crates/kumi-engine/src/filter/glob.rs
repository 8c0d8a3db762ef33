//! fnmatch-style pattern matching.
//!
//! - `*` any run of characters (including `/`)
//! - `?` exactly one character
//! - `[abc]`, `[a-z]`, `[!a-z]` / `[^a-z]` character classes
//! - `{a,b}` alternatives, nestable
//! - `\x` a literal `x`
//!
//! Matching is a single-backtrack-point scan, so it is O(pattern × input)
//! at worst. Both brace expansion and the scan are capped anyway, so a hostile
//! pattern from a config file costs bounded work and simply fails to match.

/// Upper bound on scan steps per expanded pattern.
const MAX_STEPS: usize = 100_000;

/// Upper bound on patterns produced by brace expansion.
const MAX_ALTERNATIVES: usize = 1_024;

/// True if `input` matches `pattern` in full.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let text: Vec<char> = input.chars().collect();
    expand_braces(pattern)
        .iter()
        .any(|alt| Pattern::parse(alt).matches(&text))
}

/// True if `s` contains any glob metacharacter.
pub fn is_glob(s: &str) -> bool {
    s.chars().any(|c| matches!(c, '*' | '?' | '[' | '{'))
}

/// Expand `{a,b}` groups into every alternative, left to right.
///
/// Unbalanced braces are kept literally. Expansion stops growing at an
/// internal cap.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let mut out = Vec::new();
    expand_into(pattern, &mut out);
    out
}

fn expand_into(pattern: &str, out: &mut Vec<String>) {
    if out.len() >= MAX_ALTERNATIVES {
        return;
    }
    let Some((open, close)) = first_group(pattern) else {
        out.push(pattern.to_string());
        return;
    };

    let head = &pattern[..open];
    let body = &pattern[open + 1..close];
    let tail = &pattern[close + 1..];
    for alt in split_top_level(body) {
        expand_into(&format!("{head}{alt}{tail}"), out);
    }
}

/// Byte offsets of the first balanced `{...}` group.
fn first_group(pattern: &str) -> Option<(usize, usize)> {
    let mut depth = 0usize;
    let mut open = None;
    let mut escaped = false;
    for (i, c) in pattern.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => {
                if depth == 0 {
                    open = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return open.map(|o| (o, i));
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyChar,
    AnyRun,
    Class { negated: bool, ranges: Vec<(char, char)> },
}

impl Token {
    fn accepts(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::AnyChar => true,
            Token::AnyRun => false,
            Token::Class { negated, ranges } => {
                let hit = ranges.iter().any(|(lo, hi)| *lo <= c && c <= *hi);
                hit != *negated
            }
        }
    }
}

#[derive(Debug)]
struct Pattern {
    tokens: Vec<Token>,
}

impl Pattern {
    /// Brace-free pattern to tokens.
    fn parse(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::with_capacity(chars.len());
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' => {
                    if tokens.last() != Some(&Token::AnyRun) {
                        tokens.push(Token::AnyRun);
                    }
                    i += 1;
                }
                '?' => {
                    tokens.push(Token::AnyChar);
                    i += 1;
                }
                '[' => match parse_class(&chars, i + 1) {
                    Some((token, next)) => {
                        tokens.push(token);
                        i = next;
                    }
                    None => {
                        tokens.push(Token::Literal('['));
                        i += 1;
                    }
                },
                '\\' if i + 1 < chars.len() => {
                    tokens.push(Token::Literal(chars[i + 1]));
                    i += 2;
                }
                c => {
                    tokens.push(Token::Literal(c));
                    i += 1;
                }
            }
        }
        Self { tokens }
    }

    fn matches(&self, text: &[char]) -> bool {
        let tokens = &self.tokens;
        let (mut p, mut t) = (0, 0);
        // Last `*` seen: (token index, text index it currently absorbs up to).
        let mut star: Option<(usize, usize)> = None;
        let mut steps = 0;

        while t < text.len() {
            steps += 1;
            if steps > MAX_STEPS {
                return false;
            }
            match tokens.get(p) {
                Some(Token::AnyRun) => {
                    star = Some((p, t));
                    p += 1;
                    continue;
                }
                Some(token) if token.accepts(text[t]) => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }
            match star {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            }
        }

        tokens[p..].iter().all(|tok| *tok == Token::AnyRun)
    }
}

/// Parse a class body starting just after `[`. Returns the token and the
/// index after the closing `]`, or `None` if the class never closes.
fn parse_class(chars: &[char], mut i: usize) -> Option<(Token, usize)> {
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }

    let mut ranges = Vec::new();
    let mut first = true;
    while i < chars.len() {
        let c = chars[i];
        // A `]` right after the opening bracket is a member, not the end.
        if c == ']' && !first {
            return Some((Token::Class { negated, ranges }, i + 1));
        }
        first = false;

        if chars.get(i + 1) == Some(&'-') && chars.get(i + 2).is_some_and(|&end| end != ']') {
            ranges.push((c, chars[i + 2]));
            i += 3;
        } else {
            ranges.push((c, c));
            i += 1;
        }
    }
    None
}
